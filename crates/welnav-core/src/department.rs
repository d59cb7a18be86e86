//! Coordinating departments: a static, read-only lookup table.

use serde::Serialize;

/// An organizational unit that coordinates collaborations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Department {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

/// All departments, in display order.
pub const DEPARTMENTS: &[Department] = &[
    Department {
        id: "care",
        name: "돌봄지원팀",
        icon: "🤝",
        description: "긴급돌봄, 노인맞춤돌봄 등 돌봄서비스 연계",
    },
    Department {
        id: "disability",
        name: "장애인지원팀",
        icon: "♿",
        description: "장애인 활동지원, 보조기기, 피해장애인 쉼터",
    },
    Department {
        id: "child",
        name: "아동·가족지원팀",
        icon: "👶",
        description: "아동 보호, 보육, 가족 상담",
    },
    Department {
        id: "health",
        name: "건강·의료지원팀",
        icon: "🏥",
        description: "의료비 지원, 방문 건강관리, 정신건강 연계",
    },
    Department {
        id: "livelihood",
        name: "생활안정지원팀",
        icon: "💰",
        description: "긴급복지 생계지원, 기초생활보장 신청 안내",
    },
    Department {
        id: "housing",
        name: "주거지원팀",
        icon: "🏠",
        description: "주거급여, 임시거처, 주거환경 개선",
    },
];

/// Look up a department by id.
#[must_use]
pub fn find(id: &str) -> Option<&'static Department> {
    DEPARTMENTS.iter().find(|d| d.id == id)
}

/// Display name for a department id, falling back to the raw id.
#[must_use]
pub fn display_name(id: &str) -> &str {
    find(id).map_or(id, |d| d.name)
}

//! Plain-text rendering of workflow notifications.

use std::fmt::Write as _;

use welnav_core::department;
use welnav_core::temporal::format_display;
use welnav_core::{Case, Linkage, LinkageCategory};

use crate::chain::ChainEntry;
use crate::notify::NotificationKind;

/// Subject line and body for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

/// Render a notification about `linkage` on `case`. `chain` is only
/// included for [`NotificationKind::Approved`] and is expected to be
/// truncated already.
#[must_use]
pub fn render(
    kind: NotificationKind,
    case: &Case,
    linkage: &Linkage,
    chain: &[ChainEntry],
) -> Rendered {
    let headline = match kind {
        NotificationKind::Submitted => "새 연계 요청 (부서 검토 필요)",
        NotificationKind::AwaitingAdmin => "부서 승인 완료 (관리자 최종 승인 필요)",
        NotificationKind::ReturnedToDepartment => "관리자 반려/보완 요청",
        NotificationKind::Approved => "연계 최종 승인",
    };
    let subject = format!(
        "[복지 내비게이터] {headline}: {} - {}",
        case.applicant_name,
        linkage.kind.label()
    );

    let mut body = String::new();
    let _ = writeln!(body, "{headline}");
    let _ = writeln!(body);
    write_case(&mut body, case);
    let _ = writeln!(body);
    write_linkage(&mut body, linkage);

    if let Some(last) = linkage.approval_history.last() {
        let _ = writeln!(body);
        let _ = writeln!(body, "■ 최근 처리");
        let _ = writeln!(
            body,
            "- {} / {} / {}",
            last.action,
            last.by,
            format_display(last.at)
        );
        if let Some(comment) = &last.comment {
            let _ = writeln!(body, "- 의견: {comment}");
        }
    }

    if kind == NotificationKind::Approved && !chain.is_empty() {
        let _ = writeln!(body);
        let _ = writeln!(body, "■ 의뢰 이력");
        write_chain(&mut body, chain);
    }

    Rendered {
        subject,
        body: body.trim_end().to_string(),
    }
}

fn write_case(out: &mut String, case: &Case) {
    let _ = writeln!(out, "■ 사례 정보");
    let _ = writeln!(out, "- 사례 번호: {}", case.id);
    let _ = writeln!(out, "- 신청자: {} ({})", case.applicant_name, case.applicant_phone);
    let _ = writeln!(out, "- 서비스: {}", case.service);
    let _ = writeln!(out, "- 접수 일시: {}", case.timestamp);
    let _ = writeln!(out, "- 상태: {}", case.status);
    if let Some(summary) = &case.ai_summary {
        let _ = writeln!(out, "- 상담 요약: {summary}");
    }
}

fn write_linkage(out: &mut String, linkage: &Linkage) {
    let _ = writeln!(out, "■ 연계 내용");
    let _ = writeln!(out, "- 유형: {}", linkage.kind.label());
    match linkage.category {
        LinkageCategory::Collaboration => {
            let from = linkage.from_dept.as_deref().map_or("-", department::display_name);
            let to = linkage.to_dept.as_deref().map_or("-", department::display_name);
            let _ = writeln!(out, "- 요청 부서: {from}");
            let _ = writeln!(out, "- 협력 부서: {to}");
        }
        LinkageCategory::Referral => {
            let target = linkage.target_service.as_deref().unwrap_or("-");
            let _ = writeln!(out, "- 의뢰 서비스: {target}");
        }
    }
    let _ = writeln!(out, "- 사유: {}", linkage.reason);
    let _ = writeln!(out, "- 승인 상태: {}", linkage.approval_status);
}

fn write_chain(out: &mut String, chain: &[ChainEntry]) {
    for (i, entry) in chain.iter().enumerate() {
        let marker = if entry.is_current { " ◀ 현재" } else { "" };
        let _ = write!(
            out,
            "{}. {} [{}] {}",
            i + 1,
            entry.service,
            entry.status,
            entry.timestamp
        );
        if let Some(reason) = &entry.reason {
            let _ = write!(out, " (사유: {reason})");
        }
        let _ = writeln!(out, "{marker}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use welnav_core::{CaseStatus, LinkageAction, LinkageDraft, LinkageType};

    fn case() -> Case {
        Case::new("노인맞춤돌봄서비스", "이영희", "010-2222-3333", Utc::now())
    }

    fn collaboration() -> Linkage {
        Linkage::submit(
            LinkageDraft {
                kind: Some(LinkageType::Joint),
                from_dept: Some("care".to_string()),
                to_dept: Some("housing".to_string()),
                reason: "주거환경 개선 병행".to_string(),
                ..LinkageDraft::default()
            },
            Some("긴급".to_string()),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn submitted_mentions_departments_and_comment() {
        let r = render(NotificationKind::Submitted, &case(), &collaboration(), &[]);
        assert!(r.subject.contains("이영희"));
        assert!(r.subject.contains("공동 사례관리"));
        assert!(r.body.contains("돌봄지원팀"));
        assert!(r.body.contains("주거지원팀"));
        assert!(r.body.contains("의견: 긴급"));
        assert!(!r.body.contains("의뢰 이력"));
    }

    #[test]
    fn approval_includes_chain_with_current_marker() {
        let c = case();
        let mut l = collaboration();
        l.apply(LinkageAction::DeptApproved, None, Utc::now()).unwrap();
        l.apply(LinkageAction::Approved, None, Utc::now()).unwrap();
        let chain = vec![ChainEntry {
            id: c.id.clone(),
            service: c.service.clone(),
            timestamp: c.timestamp.clone(),
            created_at: c.created_at,
            status: CaseStatus::Open,
            reason: None,
            is_current: true,
        }];
        let r = render(NotificationKind::Approved, &c, &l, &chain);
        assert!(r.body.contains("의뢰 이력"));
        assert!(r.body.contains("◀ 현재"));
        assert!(r.body.contains("approved"));
    }
}

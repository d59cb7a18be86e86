//! Query term extraction for Korean free text.
//!
//! Three passes turn an utterance into weighted term tiers:
//! 1. tokenize and strip grammatical suffixes (particles, formal endings,
//!    informal endings),
//! 2. expand everyday phrasing into service-taxonomy keywords through the
//!    concept map,
//! 3. decompose long terms into 2-character windows for compound words.

use std::collections::HashSet;

use serde::Serialize;

/// Suffix tiers, applied in order, at most one strip per tier. Each tier is
/// listed longest first.
const PARTICLES: &[&str] = &[
    "에게서", "한테서", "으로서", "으로써", "에서는", "께서는", "에게", "한테", "에서", "으로",
    "께서", "까지", "부터", "처럼", "보다", "이랑", "은", "는", "이", "가", "을", "를", "에",
    "의", "도", "만", "와", "과", "로", "랑",
];

const FORMAL_ENDINGS: &[&str] = &[
    "하십시오", "해주세요", "습니다", "합니다", "입니다", "십니다", "하세요", "주세요", "세요",
    "시오",
];

const INFORMAL_ENDINGS: &[&str] = &[
    "이에요", "해요", "어요", "아요", "워요", "예요", "에요", "해서", "셔서", "어서", "아서",
    "하게", "지요", "게", "요", "죠",
];

const SUFFIX_TIERS: [&[&str]; 3] = [PARTICLES, FORMAL_ENDINGS, INFORMAL_ENDINGS];

/// A stem must keep at least this many characters after stripping.
const MIN_STEM_CHARS: usize = 2;

/// Terms of at least this many characters are decomposed into bigrams.
const DECOMPOSE_MIN_CHARS: usize = 4;

/// Everyday phrase → formal service-taxonomy keywords.
const CONCEPTS: &[(&str, &[&str])] = &[
    ("혼자", &["독거", "독거노인", "1인가구"]),
    ("어르신", &["노인", "고령자", "독거노인"]),
    ("할머니", &["노인", "어르신"]),
    ("할아버지", &["노인", "어르신"]),
    ("노인", &["어르신", "고령자"]),
    ("외톨이", &["고독", "정서지원", "독거"]),
    ("아프", &["질병", "건강", "의료", "간병"]),
    ("아파", &["질병", "건강", "의료", "간병"]),
    ("병원", &["의료", "의료비", "진료"]),
    ("치매", &["인지", "치매안심"]),
    ("우울", &["정신건강", "심리상담"]),
    ("외로", &["고독", "정서지원", "독거"]),
    ("갑자기", &["긴급", "위기"]),
    ("급하", &["긴급"]),
    ("긴급", &["위기"]),
    ("돌봄", &["돌봄서비스", "요양", "간병"]),
    ("거동", &["거동불편", "방문요양", "이동지원"]),
    ("휠체어", &["장애인", "이동지원"]),
    ("장애", &["장애인", "장애인복지"]),
    ("아이", &["아동", "보육", "양육"]),
    ("어린이", &["아동", "보육"]),
    ("아기", &["영유아", "출산", "양육"]),
    ("임신", &["출산", "산모", "임산부"]),
    ("월세", &["주거", "주거급여", "임대"]),
    ("이사", &["주거", "주거이전"]),
    ("생활비", &["생계", "생계급여", "긴급복지"]),
    ("실직", &["실업", "생계", "긴급복지"]),
    ("일자리", &["취업", "고용", "일자리지원"]),
    ("식사", &["급식", "도시락", "식사배달"]),
];

/// A query broken into its three weighted tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryTerms {
    /// Stems of the user's own words.
    pub original: Vec<String>,
    /// Concept-map expansions of the originals.
    pub expanded: Vec<String>,
    /// 2-character windows of long originals and expansions.
    pub decomposed: Vec<String>,
}

impl QueryTerms {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.original.is_empty() && self.expanded.is_empty() && self.decomposed.is_empty()
    }
}

/// Run all three passes over `query`.
#[must_use]
pub fn extract(query: &str) -> QueryTerms {
    let mut seen: HashSet<String> = HashSet::new();
    let mut terms = QueryTerms::default();

    for token in tokenize(query) {
        let stem = strip_suffixes(&token);
        if is_concept_key(&token) && stem != token {
            push_unique(&mut terms.original, &mut seen, token);
        }
        if stem.chars().count() >= MIN_STEM_CHARS {
            push_unique(&mut terms.original, &mut seen, stem);
        }
    }

    for term in &terms.original {
        for expansion in expansions(term) {
            push_unique(&mut terms.expanded, &mut seen, expansion.to_string());
        }
    }

    let long: Vec<String> = terms
        .original
        .iter()
        .chain(&terms.expanded)
        .filter(|t| t.chars().count() >= DECOMPOSE_MIN_CHARS)
        .cloned()
        .collect();
    for term in long {
        for piece in bigrams(&term) {
            push_unique(&mut terms.decomposed, &mut seen, piece);
        }
    }

    terms
}

/// Lower-cased tokens split on whitespace and punctuation.
#[must_use]
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Strip at most one suffix per tier, longest first, never leaving a stem
/// shorter than two characters.
#[must_use]
pub fn strip_suffixes(token: &str) -> String {
    let mut stem = token.to_string();
    for tier in SUFFIX_TIERS {
        let stripped = tier.iter().find_map(|suffix| {
            stem.strip_suffix(suffix)
                .filter(|rest| rest.chars().count() >= MIN_STEM_CHARS)
        });
        if let Some(rest) = stripped {
            stem = rest.to_string();
        }
    }
    stem
}

fn is_concept_key(term: &str) -> bool {
    CONCEPTS.iter().any(|(key, _)| *key == term)
}

/// Expansions for a term: exact key matches plus keys overlapping the term
/// by at least two characters in either direction.
fn expansions(term: &str) -> impl Iterator<Item = &'static str> + '_ {
    CONCEPTS
        .iter()
        .filter(move |(key, _)| key_matches(key, term))
        .flat_map(|(_, values)| values.iter().copied())
}

fn key_matches(key: &str, term: &str) -> bool {
    if key == term {
        return true;
    }
    let (short, long) = if key.chars().count() <= term.chars().count() {
        (key, term)
    } else {
        (term, key)
    };
    short.chars().count() >= MIN_STEM_CHARS && long.contains(short)
}

fn bigrams(term: &str) -> Vec<String> {
    let chars: Vec<char> = term.chars().collect();
    chars.windows(2).map(|w| w.iter().collect()).collect()
}

fn push_unique(list: &mut Vec<String>, seen: &mut HashSet<String>, term: String) {
    if seen.insert(term.clone()) {
        list.push(term);
    }
}

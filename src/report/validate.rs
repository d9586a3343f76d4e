//! Acceptance checks for a generated report.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::budget::{min_section_length, visible_len};
use super::keys::{value_to_text, KeyAliases};
use crate::types::{ReportLanguage, Section};

fn re_cjk_or_kana() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fff}\x{3040}-\x{30ff}]").unwrap())
}

fn re_kana() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x{3040}-\x{30ff}]").unwrap())
}

fn re_hangul() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x{ac00}-\x{d7af}]").unwrap())
}

fn re_latin() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z\x{00c0}-\x{1ef9}]").unwrap())
}

fn re_cjk_kana_hangul() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\x{4e00}-\x{9fff}\x{3040}-\x{30ff}\x{ac00}-\x{d7af}]").unwrap()
    })
}

/// Script-presence check for the selected language.
///
/// This is a heuristic, not language identification: an English report
/// quoting a single kanji brand name is rejected, and that is accepted.
pub fn matches_language(text: &str, language: ReportLanguage) -> bool {
    match language {
        ReportLanguage::English => !re_cjk_or_kana().is_match(text),
        ReportLanguage::TraditionalChinese => !re_kana().is_match(text),
        ReportLanguage::Japanese => re_kana().is_match(text),
        ReportLanguage::Korean => re_hangul().is_match(text),
        ReportLanguage::Vietnamese => {
            re_latin().is_match(text) && !re_cjk_kana_hangul().is_match(text)
        }
    }
}

/// Why a candidate report was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    LanguageMismatch,
    SectionEmpty(Section),
    SectionTooShort(Section),
    ExceedsLimit { measured: usize, limit: usize },
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::LanguageMismatch => write!(f, "language mismatch"),
            ValidationReason::SectionEmpty(s) => write!(f, "{} empty", s),
            ValidationReason::SectionTooShort(s) => write!(f, "{} too short", s),
            ValidationReason::ExceedsLimit { measured, limit } => {
                write!(f, "exceeds limit ({}/{})", measured, limit)
            }
        }
    }
}

/// Outcome of validating one candidate.
///
/// `measured` is the non-whitespace length of all five sections together,
/// reported on failures too so the retry step can size its shrink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub reason: Option<ValidationReason>,
    pub measured: usize,
}

impl ValidationVerdict {
    pub fn is_valid(&self) -> bool {
        self.reason.is_none()
    }
}

/// Validate a candidate against language, completeness, per-section floor
/// and total ceiling, in that order. The first failure wins.
pub fn validate_report(
    candidate: &Map<String, Value>,
    language: ReportLanguage,
    total_budget: usize,
    aliases: &KeyAliases,
) -> ValidationVerdict {
    let sections = aliases.normalize(candidate);
    let texts: Vec<(Section, String)> = sections
        .iter()
        .map(|(section, value)| (section, value_to_text(value)))
        .collect();
    let combined = texts
        .iter()
        .map(|(_, t)| t.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let measured = visible_len(&combined);
    let fail = |reason| ValidationVerdict {
        reason: Some(reason),
        measured,
    };

    if !matches_language(&combined, language) {
        return fail(ValidationReason::LanguageMismatch);
    }

    let floor = min_section_length(total_budget);
    for (section, text) in &texts {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return fail(ValidationReason::SectionEmpty(*section));
        }
        if visible_len(trimmed) < floor {
            return fail(ValidationReason::SectionTooShort(*section));
        }
    }

    if measured > total_budget {
        return fail(ValidationReason::ExceedsLimit {
            measured,
            limit: total_budget,
        });
    }

    ValidationVerdict {
        reason: None,
        measured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn sentence(word: &str, times: usize) -> String {
        vec![word; times].join(" ")
    }

    fn english_report(per_section: usize) -> Map<String, Value> {
        let text = sentence("abcde", per_section / 5);
        as_map(json!({
            "maintenance": text, "tracking": text, "nutrition": text,
            "supplements": text, "lifestyle": text
        }))
    }

    #[test]
    fn test_valid_english_report() {
        let verdict = validate_report(
            &english_report(100),
            ReportLanguage::English,
            800,
            &KeyAliases::builtin(),
        );
        assert!(verdict.is_valid());
        assert_eq!(verdict.measured, 500);
    }

    #[test]
    fn test_empty_section_rejected_regardless_of_others() {
        for section in Section::ALL {
            let mut report = english_report(100);
            report.insert(section.key().to_string(), json!("   "));
            let verdict =
                validate_report(&report, ReportLanguage::English, 800, &KeyAliases::builtin());
            assert_eq!(verdict.reason, Some(ValidationReason::SectionEmpty(section)));
            assert_eq!(verdict.reason.unwrap().to_string(), format!("{} empty", section));
        }
    }

    #[test]
    fn test_missing_section_is_empty() {
        let mut report = english_report(100);
        report.remove("lifestyle");
        let verdict =
            validate_report(&report, ReportLanguage::English, 800, &KeyAliases::builtin());
        assert_eq!(
            verdict.reason,
            Some(ValidationReason::SectionEmpty(Section::Lifestyle))
        );
    }

    #[test]
    fn test_short_section_rejected() {
        let mut report = english_report(100);
        report.insert("nutrition".into(), json!("too short."));
        let verdict =
            validate_report(&report, ReportLanguage::English, 800, &KeyAliases::builtin());
        assert_eq!(
            verdict.reason,
            Some(ValidationReason::SectionTooShort(Section::Nutrition))
        );
        assert_eq!(verdict.reason.unwrap().to_string(), "nutrition too short");
    }

    #[test]
    fn test_english_with_cjk_rejected() {
        let mut report = english_report(100);
        report.insert(
            "tracking".into(),
            json!("Track vitamin D levels every three months. 維生素 matters."),
        );
        let verdict =
            validate_report(&report, ReportLanguage::English, 800, &KeyAliases::builtin());
        assert_eq!(verdict.reason, Some(ValidationReason::LanguageMismatch));
        assert_eq!(verdict.reason.unwrap().to_string(), "language mismatch");
    }

    #[test]
    fn test_japanese_without_kana_rejected() {
        let text = "維生素檢測很重要，每三個月追蹤一次血中濃度以確保足夠。";
        let report = as_map(json!({
            "maintenance": text, "tracking": text, "nutrition": text,
            "supplements": text, "lifestyle": text
        }));
        let verdict =
            validate_report(&report, ReportLanguage::Japanese, 800, &KeyAliases::builtin());
        assert_eq!(verdict.reason, Some(ValidationReason::LanguageMismatch));

        let verdict = validate_report(
            &report,
            ReportLanguage::TraditionalChinese,
            800,
            &KeyAliases::builtin(),
        );
        assert!(verdict.is_valid());
    }

    #[test]
    fn test_language_rules() {
        assert!(matches_language("ビタミンDを補う", ReportLanguage::Japanese));
        assert!(!matches_language("ビタミン", ReportLanguage::TraditionalChinese));
        assert!(matches_language("비타민 D 보충", ReportLanguage::Korean));
        assert!(!matches_language("vitamin D", ReportLanguage::Korean));
        assert!(matches_language("Bổ sung vitamin D", ReportLanguage::Vietnamese));
        assert!(!matches_language("Bổ sung 維生素", ReportLanguage::Vietnamese));
        assert!(!matches_language("12345", ReportLanguage::Vietnamese));
    }

    #[test]
    fn test_exceeds_limit_reports_measured_and_limit() {
        let verdict = validate_report(
            &english_report(190),
            ReportLanguage::English,
            800,
            &KeyAliases::builtin(),
        );
        assert_eq!(
            verdict.reason,
            Some(ValidationReason::ExceedsLimit {
                measured: 950,
                limit: 800
            })
        );
        assert_eq!(verdict.measured, 950);
        assert_eq!(verdict.reason.unwrap().to_string(), "exceeds limit (950/800)");
    }

    #[test]
    fn test_list_values_are_joined() {
        let item = sentence("abcde", 10);
        let report = as_map(json!({
            "maintenance": [item, item], "tracking": item, "nutrition": item,
            "supplements": {"a": item, "b": item}, "lifestyle": item
        }));
        let verdict =
            validate_report(&report, ReportLanguage::English, 800, &KeyAliases::builtin());
        assert!(verdict.is_valid());
        assert_eq!(verdict.measured, 350);
    }
}

//! Rendering accepted reports as localized plain text.

use std::collections::HashMap;

use serde_json::Value;

use super::keys::{value_to_text, ReportSections};
use crate::types::{ReportLanguage, Section};

/// Localized intro line and section headers for one language.
#[derive(Debug, Clone)]
pub struct SectionHeaders {
    /// Intro sentence; `{item}` is replaced with the item name.
    pub intro: String,
    pub headers: HashMap<Section, String>,
}

impl SectionHeaders {
    fn new(intro: &str, headers: [&str; 5]) -> Self {
        Self {
            intro: intro.to_string(),
            headers: Section::ALL
                .into_iter()
                .zip(headers)
                .map(|(s, h)| (s, h.to_string()))
                .collect(),
        }
    }

    pub fn header(&self, section: Section) -> &str {
        self.headers
            .get(&section)
            .map(String::as_str)
            .unwrap_or_else(|| section.key())
    }
}

/// Header tables for every supported language.
#[derive(Debug, Clone)]
pub struct ReportTemplates {
    by_language: HashMap<ReportLanguage, SectionHeaders>,
}

impl ReportTemplates {
    pub fn builtin() -> Self {
        let mut by_language = HashMap::new();
        by_language.insert(
            ReportLanguage::TraditionalChinese,
            SectionHeaders::new(
                "您的檢測結果【{item}】預防評分為低分。",
                [
                    "■ 細胞維護：",
                    "■ 主要追蹤項目：",
                    "■ 細胞營養：",
                    "■ 功能性營養群建議：",
                    "■ 生活策略小提醒：",
                ],
            ),
        );
        by_language.insert(
            ReportLanguage::English,
            SectionHeaders::new(
                "Your result for 【{item}】 is a low prevention score.",
                [
                    "■ Cellular maintenance:",
                    "■ Key tracking labs:",
                    "■ Cellular nutrition:",
                    "■ Functional nutrients & supplements:",
                    "■ Lifestyle tips:",
                ],
            ),
        );
        by_language.insert(
            ReportLanguage::Japanese,
            SectionHeaders::new(
                "検査結果【{item}】は低スコアです。",
                [
                    "■ 細胞メンテナンス：",
                    "■ 追跡すべき検査項目：",
                    "■ 細胞栄養：",
                    "■ 栄養補助（サプリ）提案：",
                    "■ 生活習慣のヒント：",
                ],
            ),
        );
        by_language.insert(
            ReportLanguage::Korean,
            SectionHeaders::new(
                "검사 결과【{item}】의 예방 점수가 낮습니다.",
                [
                    "■ 세포 유지:",
                    "■ 주요 추적 항목:",
                    "■ 세포 영양:",
                    "■ 기능성 영양소/보충제 제안:",
                    "■ 생활 전략 팁:",
                ],
            ),
        );
        by_language.insert(
            ReportLanguage::Vietnamese,
            SectionHeaders::new(
                "Kết quả kiểm tra【{item}】 có điểm phòng ngừa thấp.",
                [
                    "■ Duy trì tế bào:",
                    "■ Các chỉ số cần theo dõi:",
                    "■ Dinh dưỡng tế bào:",
                    "■ Gợi ý dưỡng chất/bổ sung:",
                    "■ Mẹo lối sống:",
                ],
            ),
        );
        Self { by_language }
    }

    /// Headers for `language`, falling back to Traditional Chinese.
    pub fn for_language(&self, language: ReportLanguage) -> Option<&SectionHeaders> {
        self.by_language
            .get(&language)
            .or_else(|| self.by_language.get(&ReportLanguage::TraditionalChinese))
    }

    /// Render one item's report. No validation happens here.
    pub fn assemble(
        &self,
        item_name: &str,
        report: &ReportSections,
        language: ReportLanguage,
    ) -> String {
        let Some(headers) = self.for_language(language) else {
            return render_with(&SectionHeaders::new("【{item}】", [""; 5]), item_name, report);
        };
        render_with(headers, item_name, report)
    }
}

fn render_with(headers: &SectionHeaders, item_name: &str, report: &ReportSections) -> String {
    let mut out = headers.intro.replace("{item}", item_name);
    out.push_str("\n\n");
    for (section, value) in report.iter() {
        let header = headers.header(section);
        if !header.is_empty() {
            out.push_str(header);
            out.push('\n');
        }
        out.push_str(&format_section_value(value));
        out.push_str("\n\n");
    }
    out
}

/// Lists become numbered lines (object entries joined by spaces); anything
/// else is flattened and trimmed.
pub fn format_section_value(value: &Value) -> String {
    match value {
        Value::Array(entries) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}. {}", i + 1, value_to_text(entry)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => value_to_text(other).trim().to_string(),
    }
}

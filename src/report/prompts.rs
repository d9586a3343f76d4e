//! Prompt construction for per-item report generation.
//!
//! One prompt carries everything the model needs: the background
//! instruction, the language lock, subject facts, budgets, the tracking
//! vocabulary, the output schema, lifestyle rules and, on retries, the reason
//! the previous answer was rejected.

use super::budget::LengthBudget;
use crate::types::{is_disclosed, FlaggedItem, ReportLanguage, Section, SubjectProfile};

/// Lab tests the "tracking" section may recommend. Nothing else is allowed.
pub const TRACKING_VOCABULARY: &[&str] = &[
    "RBC", "Hgb", "Hct", "MCV", "MCH", "MCHC", "Platelet", "WBC", "Neutrophil", "Lymphocyte",
    "Monocyte", "Eosinophil", "Basophil", "Cholesterol", "HDL-Cho", "LDL-Cho", "Triglyceride",
    "Glucose(Fasting/2hrPC)", "HbA1c", "T-Bilirubin", "D-Bilirubin", "Total Protein", "Albumin",
    "Globulin", "sGOT", "sGPT", "Alk-P", "r-GTP", "BUN", "Creatinine", "UA", "eGFR", "AFP", "CEA",
    "CA-199", "CA-125", "CA-153", "PSA", "CA-724", "NSE", "cyfra 21-1", "SCC", "LDH", "CPK",
    "HsCRP", "Homocysteine", "T4", "T3", "TSH", "Free T4", "Na", "K", "Cl", "Ca", "Phosphorus",
    "EBVCA-IgA", "RA", "CRP", "H. Pylori Ab",
];

/// Everything that varies between prompts.
#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub background: &'a str,
    pub language: ReportLanguage,
    /// Validation ceiling; never changes across retries.
    pub hard_limit: usize,
    /// Target the model is asked to hit; shrinks after overshoots.
    pub generation_limit: usize,
    pub budget: &'a LengthBudget,
    pub min_section: usize,
    pub subject: &'a SubjectProfile,
    pub item: &'a FlaggedItem,
    pub tracking_vocabulary: &'a [&'a str],
    /// Set on retries: why the previous response was rejected.
    pub retry_reason: Option<&'a str>,
}

/// Assemble the full prompt text.
pub fn build_report_prompt(input: &PromptInput<'_>) -> String {
    let mut blocks = Vec::new();
    let background = input.background.trim();
    if !background.is_empty() {
        blocks.push(background.to_string());
    }
    blocks.push(language_block(input.language, input.generation_limit));
    blocks.push(subject_block(input.subject, input.item));
    blocks.push(budget_block(input));
    blocks.push(tracking_block(input.tracking_vocabulary));
    blocks.push(format_block());
    blocks.push(lifestyle_block());
    if let Some(reason) = input.retry_reason {
        blocks.push(retry_block(reason, input.language));
    }
    blocks.join("\n\n")
}

/// Scripts the selected language must not contain, named for the model.
fn forbidden_scripts(language: ReportLanguage) -> &'static str {
    match language {
        ReportLanguage::English => "Chinese characters (漢字) and Japanese kana",
        ReportLanguage::TraditionalChinese => "Japanese kana (ひらがな/カタカナ)",
        ReportLanguage::Japanese => "Korean Hangul",
        ReportLanguage::Korean => "Chinese characters (漢字) and Japanese kana",
        ReportLanguage::Vietnamese => "Chinese characters, Japanese kana and Korean Hangul",
    }
}

/// Native-language restatement of the language rule.
fn native_language_rule(language: ReportLanguage) -> &'static str {
    match language {
        ReportLanguage::TraditionalChinese => "請全部使用繁體中文回答。",
        ReportLanguage::English => "Respond in English only.",
        ReportLanguage::Japanese => "すべて日本語で回答してください。",
        ReportLanguage::Korean => "모든 내용을 한국어로 작성하세요.",
        ReportLanguage::Vietnamese => "Trả lời hoàn toàn bằng tiếng Việt.",
    }
}

fn language_block(language: ReportLanguage, generation_limit: usize) -> String {
    format!(
        "# LANGUAGE CONSTRAINT — ABSOLUTE RULE (HIGHEST PRIORITY)\n\
         The selected output language is: {lang}\n\
         - Write EVERY JSON value strictly in {lang}. Any other language makes the response INVALID.\n\
         - Do NOT use {forbidden}.\n\
         - {native}\n\
         - Keep all JSON values together within {limit} characters (non-whitespace).\n\
         Return JSON ONLY. No text outside the JSON object.",
        lang = language.display_name(),
        forbidden = forbidden_scripts(language),
        native = native_language_rule(language),
        limit = generation_limit,
    )
}

fn subject_block(subject: &SubjectProfile, item: &FlaggedItem) -> String {
    let mut lines = vec!["# SUBJECT DATA".to_string()];
    if let Some(ref gender) = subject.gender {
        if !gender.trim().is_empty() {
            lines.push(format!("- Gender: {}", gender.trim()));
        }
    }
    if let Some(age) = subject.age_display() {
        lines.push(format!("- Age: {}", age));
    }
    if is_disclosed(&subject.personal_history) {
        lines.push(format!(
            "- Personal medical history: {}",
            subject.personal_history.trim()
        ));
    }
    if is_disclosed(&subject.family_history) {
        lines.push(format!(
            "- Family medical history: {}",
            subject.family_history.trim()
        ));
    }

    let habits: Vec<&str> = subject.affirmative_habits().map(|h| h.label()).collect();
    if !habits.is_empty() {
        lines.push(format!("- Current habits: {}", habits.join(", ")));
    }
    lines.push(
        "- Only mention a habit if it is listed under Current habits above. \
         Never mention, assume or advise on any other habit."
            .to_string(),
    );
    lines.push(format!("- Target item: {}", item.name));
    lines.join("\n")
}

fn budget_block(input: &PromptInput<'_>) -> String {
    format!(
        "# LENGTH BUDGET (non-whitespace characters)\n\
         - Hard maximum: {hard}\n\
         - Target limit (use this): {target}\n\
         - Section budgets: {hint}\n\
         - Minimum per section: {min}, with at least 2 sentences in every section.\n\
         Plan the length of each section before writing it.",
        hard = input.hard_limit,
        target = input.generation_limit,
        hint = input.budget.format_hint(),
        min = input.min_section,
    )
}

fn tracking_block(vocabulary: &[&str]) -> String {
    format!(
        "# REFERENCE DATA (TRACKING SECTION)\n\
         The \"tracking\" section may only recommend tests from this list:\n[{}]",
        vocabulary.join(", ")
    )
}

fn format_block() -> String {
    let keys = Section::ALL
        .iter()
        .map(|s| format!("  \"{}\": \"...\"", s.key()))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "# RESPONSE FORMAT\n\
         Return exactly one JSON object with this structure:\n{{\n{keys}\n}}\n\
         Keep these 5 keys in English exactly as shown, whatever the content language, \
         and give every key non-empty content."
    )
}

fn lifestyle_block() -> String {
    "# LIFESTYLE GUIDANCE (TOPIC-ALIGNED, QUANTIFIABLE)\n\
     - Give 3-6 actionable lifestyle tips tailored to the subject's age/gender and the target item.\n\
     - Every tip must be measurable: a frequency, duration, timing or quantity.\n\
     - Tie each tip explicitly to the mechanism of the target item.\n\
     - No vague or non-quantifiable advice (e.g. \"meditate\", \"breathe deeply\", \"sleep early\")."
        .to_string()
}

fn retry_block(reason: &str, language: ReportLanguage) -> String {
    format!(
        "# RETRY NOTICE\n\
         The previous response was invalid: {reason}.\n\
         Fix this and respond again strictly in {lang} and within the target limit.",
        lang = language.display_name(),
    )
}

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Report language
// =============================================================================

/// Output language selected by the operator.
///
/// The display name is what the model sees in prompts, so it is written in
/// the language itself.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ReportLanguage {
    #[default]
    #[serde(rename = "繁體中文", alias = "zh-TW")]
    TraditionalChinese,
    #[serde(rename = "English", alias = "en")]
    English,
    #[serde(rename = "日本語", alias = "ja")]
    Japanese,
    #[serde(rename = "한국어", alias = "ko")]
    Korean,
    #[serde(rename = "Tiếng Việt", alias = "vi")]
    Vietnamese,
}

impl ReportLanguage {
    pub const ALL: [ReportLanguage; 5] = [
        ReportLanguage::TraditionalChinese,
        ReportLanguage::English,
        ReportLanguage::Japanese,
        ReportLanguage::Korean,
        ReportLanguage::Vietnamese,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ReportLanguage::TraditionalChinese => "繁體中文",
            ReportLanguage::English => "English",
            ReportLanguage::Japanese => "日本語",
            ReportLanguage::Korean => "한국어",
            ReportLanguage::Vietnamese => "Tiếng Việt",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ReportLanguage::TraditionalChinese => "zh-TW",
            ReportLanguage::English => "en",
            ReportLanguage::Japanese => "ja",
            ReportLanguage::Korean => "ko",
            ReportLanguage::Vietnamese => "vi",
        }
    }
}

impl fmt::Display for ReportLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ReportLanguage {
    type Err = String;

    /// Accepts either the display name or the short code (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ReportLanguage::ALL
            .into_iter()
            .find(|lang| {
                lang.display_name() == wanted || lang.code().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| {
                format!(
                    "Unsupported language '{}'. Use one of: {}",
                    wanted,
                    ReportLanguage::ALL
                        .iter()
                        .map(|l| format!("{} ({})", l.display_name(), l.code()))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

// =============================================================================
// Report sections
// =============================================================================

/// The five canonical report sections, in render and budget order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Maintenance,
    Tracking,
    Nutrition,
    Supplements,
    Lifestyle,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Maintenance,
        Section::Tracking,
        Section::Nutrition,
        Section::Supplements,
        Section::Lifestyle,
    ];

    /// Canonical JSON key.
    pub fn key(self) -> &'static str {
        match self {
            Section::Maintenance => "maintenance",
            Section::Tracking => "tracking",
            Section::Nutrition => "nutrition",
            Section::Supplements => "supplements",
            Section::Lifestyle => "lifestyle",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// =============================================================================
// Subject data
// =============================================================================

/// Lifestyle habits tracked by the intake form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Habit {
    Smoking,
    Drinking,
    BetelNut,
}

impl Habit {
    pub const ALL: [Habit; 3] = [Habit::Smoking, Habit::Drinking, Habit::BetelNut];

    pub fn label(self) -> &'static str {
        match self {
            Habit::Smoking => "smoking",
            Habit::Drinking => "alcohol drinking",
            Habit::BetelNut => "betel nut chewing",
        }
    }
}

/// Reported status of a habit.
///
/// Only `Affirmative` habits may be mentioned to the model at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "raw", rename_all = "snake_case")]
pub enum HabitStatus {
    Affirmative(String),
    Negative(String),
    Unknown(String),
}

impl HabitStatus {
    /// Classify a raw form answer.
    ///
    /// Quit or negation markers anywhere in the answer win over an
    /// affirmative opening ("有，已戒" is a former habit).
    pub fn classify(raw: &str) -> Self {
        let text = raw.trim();
        let lower = text.to_lowercase();
        if text.is_empty() {
            return HabitStatus::Unknown(String::new());
        }
        const NEGATIVE_ANYWHERE: &[&str] = &[
            "已戒", "戒", "否", "無", "没有", "沒有", "從不", "never", "quit", "former", "stopped",
        ];
        // Short tokens that only negate at the start ("no" would hit "not sure").
        const NEGATIVE_PREFIX: &[&str] = &["不", "no", "none", "false"];
        const AFFIRMATIVE: &[&str] = &[
            "有", "是", "會", "偶爾", "經常", "每天", "yes", "y", "true", "occasionally",
            "daily", "current",
        ];
        if lower == "0"
            || NEGATIVE_ANYWHERE.iter().any(|n| lower.contains(n))
            || NEGATIVE_PREFIX.iter().any(|n| lower.starts_with(n))
        {
            return HabitStatus::Negative(text.to_string());
        }
        if lower == "1" || AFFIRMATIVE.iter().any(|a| lower.starts_with(a)) {
            return HabitStatus::Affirmative(text.to_string());
        }
        HabitStatus::Unknown(text.to_string())
    }

    pub fn is_affirmative(&self) -> bool {
        matches!(self, HabitStatus::Affirmative(_))
    }
}

/// Facts about the person the report is written for.
///
/// Partially filled from the workbook (gender, age) and optionally enriched
/// from the record table (histories, habits). Never mutated once a batch starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub personal_history: String,
    #[serde(default)]
    pub family_history: String,
    #[serde(default)]
    pub habits: BTreeMap<Habit, HabitStatus>,
}

/// Markers meaning "nothing to report" in free-text history fields.
const NOT_APPLICABLE: &[&str] = &[
    "無", "没有", "沒有", "否", "none", "no", "n/a", "na", "nil", "-", "nan", "null",
];

/// True when a history field carries an actual disclosure.
pub fn is_disclosed(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !NOT_APPLICABLE.contains(&trimmed.to_lowercase().as_str())
}

impl SubjectProfile {
    /// Habits the model may be told about.
    pub fn affirmative_habits(&self) -> impl Iterator<Item = Habit> + '_ {
        self.habits
            .iter()
            .filter(|(_, status)| status.is_affirmative())
            .map(|(habit, _)| *habit)
    }

    /// Age rendered without a trailing `.0` for whole years.
    pub fn age_display(&self) -> Option<String> {
        self.age.map(|a| {
            if a.fract() == 0.0 {
                format!("{}", a as i64)
            } else {
                format!("{}", a)
            }
        })
    }
}

/// A scored panel row from the workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub name: String,
    pub score: f64,
}

/// A panel item scoring below the active tier threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedItem {
    pub name: String,
    pub score: f64,
}

// =============================================================================
// Configuration
// =============================================================================

/// Application configuration (`~/.labreport/config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub language: ReportLanguage,
    /// Hard ceiling on non-whitespace characters per item report.
    #[serde(default = "default_char_limit")]
    pub char_limit: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Pause between items, to stay under the backend's rate limit.
    #[serde(default = "default_pacing_secs")]
    pub pacing_secs: u64,
    #[serde(default)]
    pub thresholds: TierThresholds,
    #[serde(default)]
    pub sheet_layout: SheetLayout,
    #[serde(default = "default_background_prompt_path")]
    pub background_prompt_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<RecordSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            request_timeout_secs: default_request_timeout_secs(),
            language: ReportLanguage::default(),
            char_limit: default_char_limit(),
            max_attempts: default_max_attempts(),
            pacing_secs: default_pacing_secs(),
            thresholds: TierThresholds::default(),
            sheet_layout: SheetLayout::default(),
            background_prompt_path: default_background_prompt_path(),
            records: None,
        }
    }
}

fn default_model() -> String {
    "gemma-3-27b-it".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.95
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_char_limit() -> usize {
    800
}

fn default_max_attempts() -> usize {
    3
}

fn default_pacing_secs() -> u64 {
    5
}

fn default_background_prompt_path() -> PathBuf {
    PathBuf::from("background_prompt.txt")
}

/// Score cut-offs for tier selection. Comparisons are strictly-below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierThresholds {
    pub low: f64,
    pub standard: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            low: 30.0,
            standard: 37.0,
        }
    }
}

/// Cell geometry of the lab-score workbook. All positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetLayout {
    pub age_cell: (u32, u32),
    pub gender_cell: (u32, u32),
    pub name_column: u32,
    pub score_column: u32,
    pub first_item_row: u32,
    pub row_step: u32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            age_cell: (2, 7),
            gender_cell: (2, 8),
            name_column: 1,
            score_column: 10,
            first_item_row: 2,
            row_step: 3,
        }
    }
}

/// Where subject records (medical history, habits) come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSource {
    pub path: PathBuf,
    #[serde(default = "RecordSource::default_id_column")]
    pub id_column: String,
}

impl RecordSource {
    pub fn default_id_column() -> String {
        "申請單編號".to_string()
    }
}

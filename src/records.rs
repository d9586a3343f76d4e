//! Subject record table: lookup by identifier and fuzzy field matching.
//!
//! Intake forms are exported with slightly different column names between
//! revisions ("個人疾病史（可複選）" vs "個人疾病史(可複選)"), so fields are
//! matched on a normalized key, first by known names and then by keyword
//! groups.

use std::path::Path;
use std::sync::OnceLock;

use calamine::{open_workbook_auto, Reader};
use regex::Regex;
use serde_json::Value;

use crate::error::RecordError;
use crate::sheet::cell_to_string;
use crate::types::{Habit, HabitStatus, SubjectProfile};

fn key_noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s\-_()（）\[\]{}:：/\\]+").expect("key noise regex"))
}

const PERSONAL_HISTORY_KEYS: &[&str] = &[
    "個人疾病史（可複選）",
    "個人疾病史(可複選)",
    "個人疾病史",
    "個人病史",
    "個人史",
    "過往病史",
    "既往病史",
];

const PERSONAL_HISTORY_GROUPS: &[&[&str]] = &[
    &["個人", "疾病", "史"],
    &["個人", "病", "史"],
    &["既往", "病", "史"],
    &["過往", "病", "史"],
];

const FAMILY_HISTORY_KEYS: &[&str] = &[
    "家族疾病史（可複選）",
    "家族疾病史(可複選)",
    "家族疾病史",
    "家族病史",
    "家族史",
];

const FAMILY_HISTORY_GROUPS: &[&[&str]] = &[
    &["家族", "疾病", "史"],
    &["家族", "病", "史"],
    &["家族", "史"],
];

/// Known column names per habit, tried before keyword matching.
fn habit_columns(habit: Habit) -> &'static [&'static str] {
    match habit {
        Habit::Smoking => &[
            "吸菸", "抽菸", "吸煙", "抽煙", "是否吸菸", "是否抽菸", "吸菸習慣", "抽菸習慣",
            "smoking", "smoker", "smokingstatus",
        ],
        Habit::Drinking => &[
            "飲酒", "喝酒", "是否飲酒", "是否喝酒", "飲酒習慣", "drinking", "alcohol",
            "alcoholuse",
        ],
        Habit::BetelNut => &[
            "檳榔", "嚼檳榔", "是否嚼檳榔", "嚼食檳榔", "betelnut", "betelnutchewing",
        ],
    }
}

/// Column-name keywords per habit; any one keyword is enough.
fn habit_keywords(habit: Habit) -> &'static [&'static [&'static str]] {
    match habit {
        Habit::Smoking => &[&["吸菸"], &["抽菸"], &["吸煙"], &["抽煙"], &["smok"]],
        Habit::Drinking => &[&["飲酒"], &["喝酒"], &["drink"], &["alcohol"]],
        Habit::BetelNut => &[&["檳榔"], &["betel"]],
    }
}

/// Columns about someone else's habit or passive exposure, never the subject's own.
const HABIT_EXCLUDED_KEYWORDS: &[&str] = &[
    "二手", "被動", "家人", "家族", "同住", "secondhand", "passive", "exposure", "family",
];

/// One row of the record table, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Keys are trimmed; a repeated key keeps the first value.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = key.trim();
        if self.fields.iter().any(|(k, _)| k == key) {
            return;
        }
        self.fields.push((key.to_string(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k.as_ref(), v.as_ref());
        }
        record
    }
}

/// Load every record from a spreadsheet (first sheet, header row) or a JSON
/// array of objects.
pub fn load_records(path: &Path) -> Result<Vec<Record>, RecordError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let records = match ext.as_str() {
        "json" => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| RecordError::Load(format!("{}: {}", path.display(), e)))?;
            records_from_json(&content)?
        }
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => records_from_workbook(path)?,
        _ => {
            return Err(RecordError::Load(format!(
                "Unsupported record file: {}",
                path.display()
            )))
        }
    };

    log::info!("Loaded {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

fn records_from_workbook(path: &Path) -> Result<Vec<Record>, RecordError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| RecordError::Load(format!("{}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| RecordError::Load("Record workbook has no worksheets".to_string()))?
        .map_err(|e| RecordError::Load(e.to_string()))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.iter().map(cell_to_string).collect();

    Ok(rows
        .map(|row| {
            header
                .iter()
                .zip(row.iter().map(cell_to_string))
                .filter(|(k, _)| !k.trim().is_empty())
                .collect::<Record>()
        })
        .collect())
}

/// Parse a JSON array of flat objects. Non-string values are stringified.
pub fn records_from_json(content: &str) -> Result<Vec<Record>, RecordError> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| RecordError::Load(e.to_string()))?;
    let Value::Array(rows) = value else {
        return Err(RecordError::Load(
            "Record JSON must be an array of objects".to_string(),
        ));
    };

    rows.into_iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| {
                    let text = match v {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k, text)
                })
                .collect::<Record>()),
            other => Err(RecordError::Load(format!(
                "Expected an object per record, got: {}",
                other
            ))),
        })
        .collect()
}

/// Find the record whose `id_column` equals `id` (both trimmed).
pub fn find_record<'a>(
    records: &'a [Record],
    id: &str,
    id_column: &str,
) -> Result<&'a Record, RecordError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(RecordError::MissingId);
    }
    records
        .iter()
        .find(|r| r.get(id_column).map(str::trim) == Some(id))
        .ok_or_else(|| RecordError::NotFound(id.to_string()))
}

/// Trim, and treat spreadsheet null spellings as empty.
pub fn safe_string(value: &str) -> String {
    let value = value.trim();
    match value.to_lowercase().as_str() {
        "nan" | "none" | "null" => String::new(),
        _ => value.to_string(),
    }
}

/// Strip separators and brackets, lowercase.
pub fn normalize_key(key: &str) -> String {
    key_noise_re()
        .replace_all(&safe_string(key), "")
        .to_lowercase()
}

/// First non-empty value whose normalized key equals a candidate key, else
/// the first whose normalized key contains every keyword of some group.
pub fn find_best_matched_value(
    record: &Record,
    candidate_keys: &[&str],
    keyword_groups: &[&[&str]],
) -> String {
    let normalized: Vec<(String, String)> = record
        .iter()
        .map(|(k, v)| (normalize_key(k), safe_string(v)))
        .collect();

    for candidate in candidate_keys {
        let candidate = normalize_key(candidate);
        if let Some((_, value)) = normalized.iter().find(|(k, _)| *k == candidate) {
            if !value.is_empty() {
                return value.clone();
            }
        }
    }

    normalized
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .find(|(key, _)| {
            keyword_groups
                .iter()
                .any(|group| group.iter().all(|kw| key.contains(kw)))
        })
        .map(|(_, value)| value.clone())
        .unwrap_or_default()
}

/// (personal, family) disease history text; empty when absent.
pub fn extract_medical_histories(record: &Record) -> (String, String) {
    (
        find_best_matched_value(record, PERSONAL_HISTORY_KEYS, PERSONAL_HISTORY_GROUPS),
        find_best_matched_value(record, FAMILY_HISTORY_KEYS, FAMILY_HISTORY_GROUPS),
    )
}

/// Classified status for every habit column present in the record.
///
/// Matching follows [`find_best_matched_value`]: exact column names first,
/// then keywords. Exposure and family columns are left out entirely.
pub fn extract_habits(record: &Record) -> Vec<(Habit, HabitStatus)> {
    let own: Record = record
        .iter()
        .filter(|(key, _)| {
            let key = normalize_key(key);
            !HABIT_EXCLUDED_KEYWORDS.iter().any(|kw| key.contains(kw))
        })
        .collect();

    Habit::ALL
        .into_iter()
        .filter_map(|habit| {
            let value = find_best_matched_value(&own, habit_columns(habit), habit_keywords(habit));
            (!value.is_empty()).then(|| (habit, HabitStatus::classify(&value)))
        })
        .collect()
}

/// Fill histories and habits from the record. Gender and age from the
/// workbook are left alone.
pub fn enrich_profile(profile: &mut SubjectProfile, record: &Record) {
    let (personal, family) = extract_medical_histories(record);
    profile.personal_history = personal;
    profile.family_history = family;
    for (habit, status) in extract_habits(record) {
        log::debug!("Habit {}: {:?}", habit.label(), status);
        profile.habits.insert(habit, status);
    }
}

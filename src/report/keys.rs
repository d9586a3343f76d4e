//! Section key normalization.
//!
//! The model is told to use the five English keys, but it sometimes
//! localizes them anyway (Vietnamese output is the usual offender). This maps
//! whatever it returned back onto the canonical sections.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::types::Section;

/// Known alternate spellings per canonical section, in lookup order.
#[derive(Debug, Clone)]
pub struct KeyAliases {
    aliases: BTreeMap<Section, Vec<String>>,
}

impl KeyAliases {
    /// The built-in alias table.
    pub fn builtin() -> Self {
        let table: [(Section, &[&str]); 5] = [
            (
                Section::Maintenance,
                &["maintenance", "cellular_maintenance", "duy_tri", "duy trì", "bảo trì"],
            ),
            (
                Section::Tracking,
                &[
                    "tracking",
                    "key_tracking",
                    "theo_doi",
                    "theo dõi",
                    "chi_so_theo_doi",
                    "chỉ số theo dõi",
                ],
            ),
            (
                Section::Nutrition,
                &["nutrition", "cellular_nutrition", "dinh_duong", "dinh dưỡng"],
            ),
            (
                Section::Supplements,
                &["supplements", "functional_supplements", "bo_sung", "bổ sung"],
            ),
            (
                Section::Lifestyle,
                &["lifestyle", "lifestyle_tips", "loi_song", "lối sống"],
            ),
        ];

        Self {
            aliases: table
                .into_iter()
                .map(|(section, names)| {
                    (section, names.iter().map(|n| n.to_string()).collect())
                })
                .collect(),
        }
    }

    /// Add an alias for a section (appended after the existing ones).
    pub fn with_alias(mut self, section: Section, alias: &str) -> Self {
        self.aliases
            .entry(section)
            .or_default()
            .push(alias.to_string());
        self
    }

    pub fn aliases_for(&self, section: Section) -> &[String] {
        self.aliases.get(&section).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Map a candidate object onto the five canonical sections.
    ///
    /// For each section the exact canonical key wins; otherwise aliases are
    /// tried in order against trimmed, lowercased candidate keys. JSON `null`
    /// counts as absent. Unmatched sections become empty strings.
    pub fn normalize(&self, candidate: &Map<String, Value>) -> ReportSections {
        let lowered: HashMap<String, &Value> = candidate
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();

        let mut sections = BTreeMap::new();
        for section in Section::ALL {
            let exact = candidate.get(section.key()).filter(|v| !v.is_null());
            let value = exact.or_else(|| {
                self.aliases_for(section)
                    .iter()
                    .find_map(|alias| {
                        lowered
                            .get(&alias.to_lowercase())
                            .copied()
                            .filter(|v| !v.is_null())
                    })
            });
            sections.insert(
                section,
                value.cloned().unwrap_or_else(|| Value::String(String::new())),
            );
        }
        ReportSections(sections)
    }
}

/// A report keyed by exactly the five canonical sections.
///
/// Values are kept as raw JSON so lists can render as numbered lines.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSections(BTreeMap<Section, Value>);

impl ReportSections {
    pub fn get(&self, section: Section) -> &Value {
        // Every section is inserted by `normalize`.
        &self.0[&section]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Section, &Value)> {
        self.0.iter().map(|(s, v)| (*s, v))
    }

    /// Back to a JSON object with canonical keys.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(s, v)| (s.key().to_string(), v.clone()))
                .collect(),
        )
    }
}

/// Flatten a section value to plain text.
///
/// Lists and objects collapse to their items joined by single spaces;
/// `null` and empty containers become the empty string.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => map
            .values()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

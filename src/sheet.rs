//! Lab-score workbook reading and tier selection.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::error::SheetError;
use crate::types::{FlaggedItem, ScoredItem, SheetLayout, SubjectProfile, TierThresholds};

const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Everything pulled from one workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetExtract {
    /// Gender and age only; histories come from the record table.
    pub profile: SubjectProfile,
    pub scored: Vec<ScoredItem>,
}

/// Which threshold produced the flagged items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Severe,
    Standard,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierSelection {
    pub tier: Tier,
    pub items: Vec<FlaggedItem>,
}

impl TierSelection {
    pub fn label(&self) -> &'static str {
        match self.tier {
            Tier::Severe => "severe",
            Tier::Standard => "standard",
            Tier::None => "",
        }
    }
}

/// Open the first worksheet of `path` and extract subject + scores.
pub fn read_workbook(path: &Path, layout: &SheetLayout) -> Result<SheetExtract, SheetError> {
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false);
    if !supported {
        return Err(SheetError::UnsupportedFormat(path.to_path_buf()));
    }

    let mut workbook =
        open_workbook_auto(path).map_err(|e| SheetError::Open(format!("{}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::NoWorksheet)?
        .map_err(|e| SheetError::Open(e.to_string()))?;

    let extract = extract_from_range(&range, layout);
    log::info!(
        "Read {} scored item(s) from {}",
        extract.scored.len(),
        path.display()
    );
    Ok(extract)
}

/// Pull subject fields and scored rows out of an already-loaded sheet.
pub fn extract_from_range(range: &Range<Data>, layout: &SheetLayout) -> SheetExtract {
    let gender = cell_at(range, layout.gender_cell.0, layout.gender_cell.1)
        .map(cell_to_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let age = cell_at(range, layout.age_cell.0, layout.age_cell.1).and_then(cell_to_f64);

    let mut scored = Vec::new();
    let last_row = range.end().map(|(r, _)| r).unwrap_or(0);
    let step = layout.row_step.max(1);
    let mut row = layout.first_item_row.max(1);
    while row - 1 <= last_row {
        let name = cell_at(range, row, layout.name_column)
            .map(cell_to_string)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let score = cell_at(range, row, layout.score_column).and_then(cell_to_f64);
        match score {
            Some(score) if !name.is_empty() => scored.push(ScoredItem { name, score }),
            _ => log::debug!("Skipping sheet row {}: missing name or score", row),
        }
        row += step;
    }

    SheetExtract {
        profile: SubjectProfile {
            gender,
            age,
            ..Default::default()
        },
        scored,
    }
}

/// Items strictly below `low` if any exist, otherwise strictly below
/// `standard`. Sheet order is preserved.
pub fn select_tier(scored: &[ScoredItem], thresholds: TierThresholds) -> TierSelection {
    let below = |limit: f64| -> Vec<FlaggedItem> {
        scored
            .iter()
            .filter(|item| item.score < limit)
            .map(|item| FlaggedItem {
                name: item.name.clone(),
                score: item.score,
            })
            .collect()
    };

    let severe = below(thresholds.low);
    if !severe.is_empty() {
        return TierSelection {
            tier: Tier::Severe,
            items: severe,
        };
    }
    let standard = below(thresholds.standard);
    if !standard.is_empty() {
        return TierSelection {
            tier: Tier::Standard,
            items: standard,
        };
    }
    TierSelection {
        tier: Tier::None,
        items: Vec::new(),
    }
}

/// 1-based (row, column) lookup.
fn cell_at(range: &Range<Data>, row: u32, column: u32) -> Option<&Data> {
    if row == 0 || column == 0 {
        return None;
    }
    range.get_value((row - 1, column - 1))
}

pub(crate) fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) => format!("{}", f),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERR({:?})", e),
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

fn cell_to_f64(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Float(f) => *f,
        Data::Int(n) => *n as f64,
        Data::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

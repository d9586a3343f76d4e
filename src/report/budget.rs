//! Character budgets for the five report sections.
//!
//! All lengths in this crate are counts of non-whitespace characters,
//! whatever the output language.

use std::collections::BTreeMap;

use crate::types::Section;

/// Share of the total budget per section, in allocation order.
const SECTION_WEIGHTS: [(Section, f64); 5] = [
    (Section::Maintenance, 0.20),
    (Section::Tracking, 0.15),
    (Section::Nutrition, 0.20),
    (Section::Supplements, 0.20),
    (Section::Lifestyle, 0.25),
];

/// Per-section character ceilings derived from one total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthBudget {
    allocations: BTreeMap<Section, usize>,
}

impl LengthBudget {
    /// Split `total` across sections by weight.
    ///
    /// Every section but the last gets `max(1, floor(total * weight))`, capped
    /// at what is left; the last absorbs the remainder. No section drops below
    /// 1, so totals under 5 allocate 5.
    pub fn for_total(total: usize) -> Self {
        let mut remaining = total;
        let mut allocations = BTreeMap::new();
        let (last, leading) = SECTION_WEIGHTS
            .split_last()
            .map(|(last, leading)| (last.0, leading))
            .unwrap_or((Section::Lifestyle, &[]));

        for (section, weight) in leading {
            let share = ((total as f64 * weight).floor() as usize).max(1);
            let share = share.min(remaining).max(1);
            allocations.insert(*section, share);
            remaining = remaining.saturating_sub(share);
        }
        allocations.insert(last, remaining.max(1));

        Self { allocations }
    }

    pub fn get(&self, section: Section) -> usize {
        self.allocations.get(&section).copied().unwrap_or(1)
    }

    /// Sum of all section ceilings.
    pub fn allocated(&self) -> usize {
        self.allocations.values().sum()
    }

    /// `maintenance≤160, tracking≤120, …` for the prompt.
    pub fn format_hint(&self) -> String {
        Section::ALL
            .iter()
            .map(|s| format!("{}≤{}", s.key(), self.get(*s)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Floor on each section's length: `max(20, floor(total * 0.03))`.
pub fn min_section_length(total: usize) -> usize {
    ((total as f64 * 0.03).floor() as usize).max(20)
}

/// Count of non-whitespace characters.
pub fn visible_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

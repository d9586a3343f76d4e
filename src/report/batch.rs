//! Sequential batch over all flagged items of one subject.

use std::time::Duration;

use super::assemble::ReportTemplates;
use super::generate::{AttemptFailure, GenerationOutcome, ReportGenerator};
use crate::error::GenerationError;
use crate::types::{FlaggedItem, ReportLanguage, SubjectProfile};

/// Rule line written after every rendered item.
pub const SEPARATOR: &str = "==================================================";

/// An item the loop gave up on. `index` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub index: usize,
    pub item: String,
    pub reason: AttemptFailure,
}

/// Concatenated report text plus counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub text: String,
    pub generated: usize,
    pub total: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!(
            "Generated {}/{} item reports ({} failed)",
            self.generated,
            self.total,
            self.failures.len()
        )
    }
}

/// Batch-wide inputs that do not change per item.
pub struct BatchOptions<'a> {
    pub language: ReportLanguage,
    pub char_limit: usize,
    /// Pause inserted between consecutive items.
    pub pacing: Duration,
    pub templates: &'a ReportTemplates,
}

/// Run the generation loop for every item, strictly in order.
///
/// Items that exhaust their attempts are recorded as failures and skipped.
/// A backend error aborts the whole batch.
pub async fn run_batch(
    generator: &ReportGenerator<'_>,
    subject: &SubjectProfile,
    items: &[FlaggedItem],
    options: &BatchOptions<'_>,
) -> Result<BatchReport, GenerationError> {
    let mut report = BatchReport {
        total: items.len(),
        ..Default::default()
    };

    for (index, item) in items.iter().enumerate() {
        if index > 0 && !options.pacing.is_zero() {
            tokio::time::sleep(options.pacing).await;
        }
        log::info!(
            "Analyzing item {}/{}: {} (score {})",
            index + 1,
            items.len(),
            item.name,
            item.score
        );

        match generator
            .run(subject, item, options.language, options.char_limit)
            .await?
        {
            GenerationOutcome::Accepted { report: sections, .. } => {
                let section =
                    options
                        .templates
                        .assemble(&item.name, &sections, options.language);
                report.text.push_str(&section);
                report.text.push_str(SEPARATOR);
                report.text.push_str("\n\n");
                report.generated += 1;
            }
            GenerationOutcome::Failed { reason, attempts } => {
                log::warn!(
                    "Item {} ({}) failed after {} attempt(s): {}",
                    index + 1,
                    item.name,
                    attempts.len(),
                    reason
                );
                report.failures.push(ItemFailure {
                    index: index + 1,
                    item: item.name.clone(),
                    reason,
                });
            }
        }
    }

    log::info!("{}", report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedGenerator;
    use crate::report::generate::GenerationSettings;
    use crate::report::keys::KeyAliases;
    use serde_json::json;

    fn english_json(per_section: usize) -> String {
        let text = vec!["abcde"; per_section / 5].join(" ");
        json!({
            "maintenance": text, "tracking": text, "nutrition": text,
            "supplements": text, "lifestyle": text
        })
        .to_string()
    }

    fn items(names: &[&str]) -> Vec<FlaggedItem> {
        names
            .iter()
            .map(|n| FlaggedItem {
                name: n.to_string(),
                score: 28.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batch_continues_past_failed_item() {
        // Item 1 accepted, item 2 exhausts three attempts, item 3 accepted.
        let backend = ScriptedGenerator::ok(vec![
            english_json(100),
            "no json".into(),
            "no json".into(),
            "no json".into(),
            english_json(100),
        ]);
        let settings = GenerationSettings::default();
        let aliases = KeyAliases::builtin();
        let templates = ReportTemplates::builtin();
        let generator = ReportGenerator::new(&backend, &settings, &aliases, "");
        let options = BatchOptions {
            language: ReportLanguage::English,
            char_limit: 800,
            pacing: Duration::ZERO,
            templates: &templates,
        };

        let report = run_batch(
            &generator,
            &SubjectProfile::default(),
            &items(&["Vitamin D", "Iron", "Zinc"]),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.generated, 2);
        assert_eq!(
            report.failures,
            vec![ItemFailure {
                index: 2,
                item: "Iron".into(),
                reason: AttemptFailure::NoJson,
            }]
        );
        assert_eq!(report.text.matches(SEPARATOR).count(), 2);
        assert!(report.text.starts_with("Your result for 【Vitamin D】"));
        assert!(report.text.contains("【Zinc】"));
        assert!(!report.text.contains("【Iron】"));
        assert_eq!(report.summary(), "Generated 2/3 item reports (1 failed)");
    }

    #[tokio::test]
    async fn test_backend_error_aborts_batch() {
        let backend = ScriptedGenerator::new(vec![
            Ok(english_json(100)),
            Err(GenerationError::Timeout(120)),
        ]);
        let settings = GenerationSettings::default();
        let aliases = KeyAliases::builtin();
        let templates = ReportTemplates::builtin();
        let generator = ReportGenerator::new(&backend, &settings, &aliases, "");
        let options = BatchOptions {
            language: ReportLanguage::English,
            char_limit: 800,
            pacing: Duration::ZERO,
            templates: &templates,
        };

        let result = run_batch(
            &generator,
            &SubjectProfile::default(),
            &items(&["Vitamin D", "Iron", "Zinc"]),
            &options,
        )
        .await;
        assert!(matches!(result, Err(GenerationError::Timeout(120))));
        assert_eq!(backend.prompts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_only_between_items() {
        let backend = ScriptedGenerator::ok(vec![english_json(100), english_json(100)]);
        let settings = GenerationSettings::default();
        let aliases = KeyAliases::builtin();
        let templates = ReportTemplates::builtin();
        let generator = ReportGenerator::new(&backend, &settings, &aliases, "");
        let options = BatchOptions {
            language: ReportLanguage::English,
            char_limit: 800,
            pacing: Duration::from_secs(5),
            templates: &templates,
        };

        let started = tokio::time::Instant::now();
        let report = run_batch(
            &generator,
            &SubjectProfile::default(),
            &items(&["Vitamin D", "Iron"]),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(report.generated, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let backend = ScriptedGenerator::ok(vec![]);
        let settings = GenerationSettings::default();
        let aliases = KeyAliases::builtin();
        let templates = ReportTemplates::builtin();
        let generator = ReportGenerator::new(&backend, &settings, &aliases, "");
        let options = BatchOptions {
            language: ReportLanguage::English,
            char_limit: 800,
            pacing: Duration::from_secs(5),
            templates: &templates,
        };
        let report = run_batch(&generator, &SubjectProfile::default(), &[], &options)
            .await
            .unwrap();
        assert_eq!(report, BatchReport::default());
    }
}

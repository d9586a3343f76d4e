//! Per-item generation loop: compose → invoke → extract → validate, with
//! bounded retries that shrink the length target after overshoots.

use std::fmt;

use super::budget::{min_section_length, LengthBudget};
use super::extract::{extract_json_object, JsonExtraction};
use super::keys::{KeyAliases, ReportSections};
use super::prompts::{build_report_prompt, PromptInput, TRACKING_VOCABULARY};
use super::validate::{validate_report, ValidationReason, ValidationVerdict};
use crate::error::GenerationError;
use crate::provider::{GenerationRequest, TextGenerator};
use crate::types::{Config, FlaggedItem, ReportLanguage, SubjectProfile};

/// Minimum amount the target shrinks by after an overshoot.
const MIN_SHRINK: usize = 10;

/// Model call parameters and retry bound.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_attempts: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_attempts: config.max_attempts,
        }
    }
}

/// Why a single attempt did not produce an accepted report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    NoJson,
    /// A brace span was found but did not parse as an object. Ends the item.
    MalformedJson(String),
    Invalid(ValidationReason),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::NoJson => write!(f, "no valid JSON returned"),
            AttemptFailure::MalformedJson(e) => write!(f, "malformed JSON returned: {}", e),
            AttemptFailure::Invalid(reason) => write!(f, "{}", reason),
        }
    }
}

/// Record of one attempt, kept only for the lifetime of one item's loop.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub index: usize,
    pub generation_limit: usize,
    pub prompt: String,
    pub raw_response: String,
    pub parsed: bool,
    pub verdict: Option<ValidationVerdict>,
    pub failure: Option<AttemptFailure>,
}

/// Final result for one item.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Accepted {
        report: ReportSections,
        attempts: Vec<GenerationAttempt>,
    },
    Failed {
        reason: AttemptFailure,
        attempts: Vec<GenerationAttempt>,
    },
}

impl GenerationOutcome {
    pub fn attempts(&self) -> &[GenerationAttempt] {
        match self {
            GenerationOutcome::Accepted { attempts, .. }
            | GenerationOutcome::Failed { attempts, .. } => attempts,
        }
    }
}

/// State threaded from one attempt to the next.
#[derive(Debug, Clone, PartialEq)]
struct LoopState {
    generation_limit: usize,
    budget: LengthBudget,
    /// Validator's per-section floor, fixed by the hard ceiling.
    min_section: usize,
    last_failure: Option<AttemptFailure>,
    last_measured: Option<usize>,
}

impl LoopState {
    fn new(hard_limit: usize) -> Self {
        Self {
            generation_limit: hard_limit,
            budget: LengthBudget::for_total(hard_limit),
            min_section: min_section_length(hard_limit),
            last_failure: None,
            last_measured: None,
        }
    }

    /// Shrink the target if the last measured output overshot the ceiling.
    fn prepare_retry(&mut self, hard_limit: usize) {
        let Some(measured) = self.last_measured else {
            return;
        };
        if measured <= hard_limit {
            return;
        }
        let shrink_by = (measured - hard_limit).max(MIN_SHRINK);
        self.generation_limit = self.generation_limit.saturating_sub(shrink_by).max(1);
        self.budget = LengthBudget::for_total(self.generation_limit);
        log::info!(
            "Output overshot by {} chars; target shrunk to {}",
            measured - hard_limit,
            self.generation_limit
        );
    }

    fn record_failure(&mut self, failure: AttemptFailure, measured: Option<usize>) {
        self.last_failure = Some(failure);
        self.last_measured = measured;
    }
}

/// Drives the generation loop for single items.
pub struct ReportGenerator<'a> {
    backend: &'a dyn TextGenerator,
    settings: &'a GenerationSettings,
    aliases: &'a KeyAliases,
    background: &'a str,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(
        backend: &'a dyn TextGenerator,
        settings: &'a GenerationSettings,
        aliases: &'a KeyAliases,
        background: &'a str,
    ) -> Self {
        Self {
            backend,
            settings,
            aliases,
            background,
        }
    }

    /// Generate a validated report for one item.
    ///
    /// `Err` means the backend call itself failed; callers treat that as
    /// fatal. Validation failures come back as `GenerationOutcome::Failed`.
    pub async fn run(
        &self,
        subject: &SubjectProfile,
        item: &FlaggedItem,
        language: ReportLanguage,
        hard_limit: usize,
    ) -> Result<GenerationOutcome, GenerationError> {
        let hard_limit = hard_limit.max(1);
        let max_attempts = self.settings.max_attempts.max(1);
        let mut state = LoopState::new(hard_limit);
        let mut attempts = Vec::with_capacity(max_attempts);

        for index in 0..max_attempts {
            if index > 0 {
                state.prepare_retry(hard_limit);
            }

            let retry_reason = state.last_failure.as_ref().map(|f| f.to_string());
            let prompt = build_report_prompt(&PromptInput {
                background: self.background,
                language,
                hard_limit,
                generation_limit: state.generation_limit,
                budget: &state.budget,
                min_section: state.min_section,
                subject,
                item,
                tracking_vocabulary: TRACKING_VOCABULARY,
                retry_reason: retry_reason.as_deref(),
            });
            log::debug!(
                "Item '{}' attempt {}/{}: prompt {} chars, target {}",
                item.name,
                index + 1,
                max_attempts,
                prompt.chars().count(),
                state.generation_limit
            );

            let request = GenerationRequest {
                model: self.settings.model.clone(),
                prompt,
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
            };
            let raw_response = self.backend.generate(&request).await?;

            let mut attempt = GenerationAttempt {
                index,
                generation_limit: state.generation_limit,
                prompt: request.prompt,
                raw_response,
                parsed: false,
                verdict: None,
                failure: None,
            };

            let candidate = match extract_json_object(&attempt.raw_response) {
                JsonExtraction::Parsed(map) => map,
                JsonExtraction::NotFound => {
                    log::warn!(
                        "Item '{}' attempt {}: no JSON object in response",
                        item.name,
                        index + 1
                    );
                    attempt.failure = Some(AttemptFailure::NoJson);
                    attempts.push(attempt);
                    state.record_failure(AttemptFailure::NoJson, None);
                    continue;
                }
                JsonExtraction::Unparseable { error, .. } => {
                    log::warn!(
                        "Item '{}' attempt {}: malformed JSON ({}); giving up on item",
                        item.name,
                        index + 1,
                        error
                    );
                    let failure = AttemptFailure::MalformedJson(error);
                    attempt.failure = Some(failure.clone());
                    attempts.push(attempt);
                    return Ok(GenerationOutcome::Failed {
                        reason: failure,
                        attempts,
                    });
                }
            };
            attempt.parsed = true;

            let report = self.aliases.normalize(&candidate);
            let verdict = validate_report(&candidate, language, hard_limit, self.aliases);
            attempt.verdict = Some(verdict.clone());

            match verdict.reason {
                None => {
                    log::info!(
                        "Item '{}' accepted on attempt {} ({} chars)",
                        item.name,
                        index + 1,
                        verdict.measured
                    );
                    attempts.push(attempt);
                    return Ok(GenerationOutcome::Accepted { report, attempts });
                }
                Some(reason) => {
                    log::warn!(
                        "Item '{}' attempt {} rejected: {}",
                        item.name,
                        index + 1,
                        reason
                    );
                    let failure = AttemptFailure::Invalid(reason);
                    attempt.failure = Some(failure.clone());
                    attempts.push(attempt);
                    state.record_failure(failure, Some(verdict.measured));
                }
            }
        }

        let reason = state.last_failure.unwrap_or(AttemptFailure::NoJson);
        Ok(GenerationOutcome::Failed { reason, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedGenerator;
    use crate::types::Section;
    use serde_json::json;

    fn english_json(per_section: usize) -> String {
        let text = vec!["abcde"; per_section / 5].join(" ");
        json!({
            "maintenance": text, "tracking": text, "nutrition": text,
            "supplements": text, "lifestyle": text
        })
        .to_string()
    }

    fn item() -> FlaggedItem {
        FlaggedItem {
            name: "Vitamin D".into(),
            score: 25.0,
        }
    }

    fn target_in(prompt: &str) -> usize {
        let line = prompt
            .lines()
            .find(|l| l.starts_with("- Target limit (use this): "))
            .expect("target line");
        line.trim_start_matches("- Target limit (use this): ")
            .parse()
            .expect("number")
    }

    async fn run_with(backend: &ScriptedGenerator, hard_limit: usize) -> GenerationOutcome {
        let settings = GenerationSettings::default();
        let aliases = KeyAliases::builtin();
        let generator = ReportGenerator::new(backend, &settings, &aliases, "background");
        generator
            .run(&SubjectProfile::default(), &item(), ReportLanguage::English, hard_limit)
            .await
            .expect("backend ok")
    }

    #[tokio::test]
    async fn test_accepts_first_valid_response() {
        let backend = ScriptedGenerator::ok(vec![format!(
            "Sure! Here it is:\n{}\nLet me know.",
            english_json(100)
        )]);
        let outcome = run_with(&backend, 800).await;

        match outcome {
            GenerationOutcome::Accepted { report, attempts } => {
                assert_eq!(attempts.len(), 1);
                assert!(attempts[0].parsed);
                assert!(report.get(Section::Tracking).is_string());
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(backend.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_overshoot_shrinks_target_then_accepts() {
        // 950 measured against 800: shrink by 150 to 650.
        let backend = ScriptedGenerator::ok(vec![english_json(190), english_json(120)]);
        let outcome = run_with(&backend, 800).await;

        let attempts = outcome.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(
            attempts[0].failure,
            Some(AttemptFailure::Invalid(ValidationReason::ExceedsLimit {
                measured: 950,
                limit: 800
            }))
        );
        assert!(matches!(outcome, GenerationOutcome::Accepted { .. }));

        let prompts = backend.prompts();
        assert_eq!(target_in(&prompts[0]), 800);
        assert_eq!(target_in(&prompts[1]), 650);
        assert_eq!(LengthBudget::for_total(650).allocated(), 650);
        assert!(prompts[1].contains("- Hard maximum: 800"));
        assert!(prompts[1].contains("The previous response was invalid: exceeds limit (950/800)."));
        assert!(!prompts[0].contains("RETRY NOTICE"));
    }

    #[tokio::test]
    async fn test_small_overshoot_shrinks_by_at_least_ten() {
        // 805 measured: overshoot 5, shrink 10.
        let mut text = vec!["abcde"; 32].join(" ");
        text.push_str(" a");
        let over = json!({
            "maintenance": text, "tracking": text, "nutrition": text,
            "supplements": text, "lifestyle": text
        })
        .to_string();
        let backend = ScriptedGenerator::ok(vec![over, english_json(100)]);
        run_with(&backend, 800).await;

        let prompts = backend.prompts();
        assert_eq!(target_in(&prompts[1]), 790);
    }

    #[tokio::test]
    async fn test_shrink_is_cumulative_across_retries() {
        let backend =
            ScriptedGenerator::ok(vec![english_json(190), english_json(190), english_json(190)]);
        let outcome = run_with(&backend, 800).await;

        match outcome {
            GenerationOutcome::Failed { reason, attempts } => {
                assert_eq!(attempts.len(), 3);
                assert_eq!(reason.to_string(), "exceeds limit (950/800)");
            }
            other => panic!("unexpected: {:?}", other),
        }
        let targets: Vec<usize> = backend.prompts().iter().map(|p| target_in(p)).collect();
        assert_eq!(targets, vec![800, 650, 500]);
    }

    #[tokio::test]
    async fn test_non_length_failure_keeps_target() {
        let backend = ScriptedGenerator::ok(vec![
            "I am unable to produce JSON today.".to_string(),
            json!({"maintenance": "x"}).to_string(),
            english_json(100),
        ]);
        let outcome = run_with(&backend, 800).await;

        let attempts = outcome.attempts();
        assert_eq!(attempts[0].failure, Some(AttemptFailure::NoJson));
        assert_eq!(
            attempts[1].failure,
            Some(AttemptFailure::Invalid(ValidationReason::SectionTooShort(
                Section::Maintenance
            )))
        );
        assert!(matches!(outcome, GenerationOutcome::Accepted { .. }));

        let prompts = backend.prompts();
        assert!(prompts[1].contains("invalid: no valid JSON returned."));
        assert!(prompts[2].contains("invalid: maintenance too short."));
        let targets: Vec<usize> = prompts.iter().map(|p| target_in(p)).collect();
        assert_eq!(targets, vec![800, 800, 800]);
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_reason() {
        let backend = ScriptedGenerator::ok(vec![
            "nothing".to_string(),
            "still nothing".to_string(),
            "nope".to_string(),
        ]);
        match run_with(&backend, 800).await {
            GenerationOutcome::Failed { reason, attempts } => {
                assert_eq!(reason, AttemptFailure::NoJson);
                assert_eq!(attempts.len(), 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_ends_item_without_retry() {
        let backend = ScriptedGenerator::ok(vec![
            "{\"maintenance\": \"a\",,}".to_string(),
            english_json(100),
        ]);
        match run_with(&backend, 800).await {
            GenerationOutcome::Failed { reason, attempts } => {
                assert!(matches!(reason, AttemptFailure::MalformedJson(_)));
                assert_eq!(attempts.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(backend.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let backend = ScriptedGenerator::new(vec![Err(GenerationError::RateLimited)]);
        let settings = GenerationSettings::default();
        let aliases = KeyAliases::builtin();
        let generator = ReportGenerator::new(&backend, &settings, &aliases, "");
        let result = generator
            .run(&SubjectProfile::default(), &item(), ReportLanguage::English, 800)
            .await;
        assert!(matches!(result, Err(GenerationError::RateLimited)));
    }

    #[tokio::test]
    async fn test_aliased_keys_are_normalized_in_accepted_report() {
        let text = vec!["abcde"; 20].join(" ");
        let response = json!({
            "duy_tri": text, "theo_doi": text, "dinh_duong": text,
            "bo_sung": text, "loi_song": text
        })
        .to_string();
        let backend = ScriptedGenerator::ok(vec![response]);
        match run_with(&backend, 800).await {
            GenerationOutcome::Accepted { report, .. } => {
                assert_eq!(report.get(Section::Lifestyle), &json!(text));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_loop_state_shrink_floors_at_one() {
        let mut state = LoopState::new(30);
        state.record_failure(
            AttemptFailure::Invalid(ValidationReason::ExceedsLimit {
                measured: 500,
                limit: 30,
            }),
            Some(500),
        );
        state.prepare_retry(30);
        assert_eq!(state.generation_limit, 1);
        assert_eq!(state.min_section, 20);
    }

    #[test]
    fn test_shrink_keeps_validator_section_floor() {
        // The prompt must never ask for less than the validator accepts.
        let mut state = LoopState::new(2000);
        state.record_failure(
            AttemptFailure::Invalid(ValidationReason::ExceedsLimit {
                measured: 2200,
                limit: 2000,
            }),
            Some(2200),
        );
        state.prepare_retry(2000);
        assert_eq!(state.generation_limit, 1800);
        assert_eq!(state.budget.allocated(), 1800);
        assert_eq!(state.min_section, min_section_length(2000));
        assert_eq!(state.min_section, 60);
    }

    #[test]
    fn test_request_carries_sampling_settings() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.model, "gemma-3-27b-it");
        assert!((settings.temperature - 0.3).abs() < f32::EPSILON);
        assert!((settings.top_p - 0.95).abs() < f32::EPSILON);
        assert_eq!(settings.max_attempts, 3);
    }
}

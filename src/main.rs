use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use labreport_lib::config::{load_background_instruction, load_config, validate_config};
use labreport_lib::error::{GenerationError, ReportError};
use labreport_lib::gemini::GeminiClient;
use labreport_lib::records::{enrich_profile, find_record, load_records};
use labreport_lib::report::{
    run_batch, BatchOptions, BatchReport, GenerationSettings, KeyAliases, ReportGenerator,
    ReportTemplates,
};
use labreport_lib::sheet::{read_workbook, select_tier};
use labreport_lib::types::{Config, RecordSource, ReportLanguage, SubjectProfile};

#[derive(Parser, Debug)]
#[command(
    name = "labreport",
    version,
    about = "Generate per-item reports for low-scoring lab panel items"
)]
struct Cli {
    /// Lab-score workbook (.xlsx/.xls/.ods)
    workbook: PathBuf,
    #[arg(long, help = "Config file (default ~/.labreport/config.json)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Output language: display name or code (zh-TW, en, ja, ko, vi)")]
    language: Option<ReportLanguage>,
    #[arg(long, help = "Hard ceiling on non-whitespace characters per item")]
    char_limit: Option<usize>,
    #[arg(long)]
    max_attempts: Option<usize>,
    #[arg(long, help = "Seconds to pause between items")]
    pacing_secs: Option<u64>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, help = "Gemini API key (default: GEMINI_API_KEY)")]
    api_key: Option<String>,
    #[arg(long, help = "Subject identifier in the record table")]
    subject_id: Option<String>,
    #[arg(long, help = "Record table (.xlsx or .json) with histories and habits")]
    records: Option<PathBuf>,
    #[arg(long, help = "Background instruction file prepended to every prompt")]
    background: Option<PathBuf>,
    #[arg(long, default_value = "report.txt")]
    output: PathBuf,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(language) = self.language {
            config.language = language;
        }
        if let Some(limit) = self.char_limit {
            config.char_limit = limit;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(secs) = self.pacing_secs {
            config.pacing_secs = secs;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(path) = &self.background {
            config.background_prompt_path = path.clone();
        }
        if let Some(path) = &self.records {
            let id_column = config
                .records
                .as_ref()
                .map(|r| r.id_column.clone())
                .unwrap_or_else(RecordSource::default_id_column);
            config.records = Some(RecordSource {
                path: path.clone(),
                id_column,
            });
        }
    }

    fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Histories and habits from the record table, when one is configured.
/// Lookup problems are warnings; the report is still generated.
fn lookup_subject(config: &Config, subject_id: Option<&str>, profile: &mut SubjectProfile) {
    let Some(id) = subject_id else {
        return;
    };
    let Some(source) = &config.records else {
        log::warn!("Subject id {} given but no record table configured", id);
        return;
    };
    let result = load_records(&source.path).and_then(|records| {
        let record = find_record(&records, id, &source.id_column)?;
        enrich_profile(profile, record);
        Ok(())
    });
    if let Err(e) = result {
        log::warn!("Record lookup failed: {}; continuing without histories", e);
    }
}

async fn run(cli: &Cli) -> Result<BatchReport, ReportError> {
    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    validate_config(&config)?;

    let extract = read_workbook(&cli.workbook, &config.sheet_layout)?;
    let selection = select_tier(&extract.scored, config.thresholds);
    if selection.items.is_empty() {
        log::warn!("No items scored below {}; nothing to report", config.thresholds.standard);
        let report = BatchReport::default();
        write_report(&cli.output, &report)?;
        return Ok(report);
    }
    log::info!(
        "Selected {} item(s) in the {} tier",
        selection.items.len(),
        selection.label()
    );

    let mut subject = extract.profile;
    lookup_subject(&config, cli.subject_id.as_deref(), &mut subject);

    let api_key = cli.api_key().ok_or(GenerationError::MissingApiKey)?;
    let backend = GeminiClient::new(&api_key, config.request_timeout_secs)?;

    let background = load_background_instruction(&config.background_prompt_path);
    let aliases = KeyAliases::builtin();
    let templates = ReportTemplates::builtin();
    let settings = GenerationSettings::from_config(&config);
    let generator = ReportGenerator::new(&backend, &settings, &aliases, &background);
    let options = BatchOptions {
        language: config.language,
        char_limit: config.char_limit,
        pacing: Duration::from_secs(config.pacing_secs),
        templates: &templates,
    };

    let report = run_batch(&generator, &subject, &selection.items, &options).await?;
    write_report(&cli.output, &report)?;
    Ok(report)
}

fn write_report(path: &Path, report: &BatchReport) -> Result<(), ReportError> {
    std::fs::write(path, &report.text)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(report) => {
            for failure in &report.failures {
                eprintln!(
                    "warning: item {} ({}) skipped: {}",
                    failure.index, failure.item, failure.reason
                );
            }
            println!("{}", report.text);
            println!("{}", report.summary());
        }
        Err(e) => {
            log::error!("{}", e);
            log::error!("{}", e.recovery_suggestion());
            if e.is_retryable() {
                log::error!("The failure looks transient; rerunning later may succeed.");
            }
            std::process::exit(1);
        }
    }
}

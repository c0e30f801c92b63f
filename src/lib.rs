pub mod cli;
pub mod config;
pub mod db;
pub mod pipeline;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use crate::config::JobConfig;
use pipeline::enrichment::{
    clean_text, decode_entities, notifier_for, DedupLedger, EnrichmentError, EnrichmentRunner,
    HttpNerClient, JobReport, NerClient, NewsTextNormalizer, SqliteNewsStore, COMPLETION_MESSAGE,
    DEFAULT_NER_TIMEOUT_SECS,
};

pub fn run() -> Result<(), EnrichmentError> {
    let cli = Cli::parse();

    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter(cli.verbose))),
        )
        .try_init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let job = config::load(&cli.config, &cli.overrides)?;

    match cli.command {
        None | Some(Commands::Run) => {
            let report = run_job(&job)?;
            tracing::debug!(report = %serde_json::to_string(&report)?, "Job report");
            Ok(())
        }
        Some(Commands::Tag(args)) => tag_text(&job, &args.text),
    }
}

/// Run the enrichment job once, then publish the completion signal.
///
/// A failed publish is logged and does not fail the job.
pub fn run_job(job: &JobConfig) -> Result<JobReport, EnrichmentError> {
    let conn = db::open_database(&job.database_path)?;
    let store = SqliteNewsStore::new(conn, job.tables()?)?;
    let ner = HttpNerClient::new(&job.ner_service_url, DEFAULT_NER_TIMEOUT_SECS)?;
    let normalizer = NewsTextNormalizer;
    tracing::info!(
        database = %job.database_path.display(),
        input = %store.tables().input,
        output = %store.tables().output,
        ner_url = ner.url(),
        "Job configured"
    );

    let mut ledger = DedupLedger::load(&store)?;
    let runner = EnrichmentRunner::new(&store, &store, &ner, &normalizer, job.enrichment());
    let report = runner.run(&mut ledger)?;

    match notifier_for(&job.publish_topic)
        .and_then(|notifier| notifier.publish(&job.publish_topic, COMPLETION_MESSAGE))
    {
        Ok(()) => {}
        Err(e) => tracing::warn!(topic = %job.publish_topic, error = %e, "Completion publish failed"),
    }

    Ok(report)
}

/// Tag one text and print its entity lists as JSON.
fn tag_text(job: &JobConfig, text: &str) -> Result<(), EnrichmentError> {
    let ner = HttpNerClient::new(&job.ner_service_url, DEFAULT_NER_TIMEOUT_SECS)?;
    let tokens = ner.predict(&clean_text(text))?;
    let entities = decode_entities(&tokens);
    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(())
}

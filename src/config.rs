//! Job configuration: JSON file, then `NER_ENRICHER__*` environment
//! variables, then command-line flags. Later sources win.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, ConfigBuilder, Environment, File, FileFormat};
use ::config::builder::DefaultState;
use clap::Args;
use serde::Deserialize;
use thiserror::Error;

use crate::db::{NewsTables, TableName};
use crate::pipeline::enrichment::EnrichmentConfig;

/// Application-level constants
pub const APP_NAME: &str = "ner-enricher";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_DATABASE_PATH: &str = "news.db";
pub const ENV_PREFIX: &str = "NER_ENRICHER";

#[derive(Debug, Error)]
pub enum JobConfigError {
    #[error(transparent)]
    Build(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a job run needs. All fields except `database_path` are required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub input_table_id: String,
    pub output_table_id: String,
    #[serde(alias = "output_topic")]
    pub publish_topic: String,
    pub input_rows_limit: u32,
    pub ner_service_url: String,
    /// Seconds.
    pub execution_timeout: f64,
    pub database_path: PathBuf,
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), JobConfigError> {
        if self.input_rows_limit == 0 {
            return Err(JobConfigError::Invalid("input_rows_limit must be > 0".into()));
        }
        if Duration::try_from_secs_f64(self.execution_timeout).is_err() {
            return Err(JobConfigError::Invalid(format!(
                "execution_timeout must be a non-negative, representable number of seconds, got {}",
                self.execution_timeout
            )));
        }
        if self.ner_service_url.trim().is_empty() {
            return Err(JobConfigError::Invalid("ner_service_url is empty".into()));
        }
        self.tables()?;
        Ok(())
    }

    /// Fully-qualified input/output table names.
    pub fn tables(&self) -> Result<NewsTables, JobConfigError> {
        let qualify = |table_id: &str| {
            TableName::qualified(&self.project_id, &self.dataset_id, table_id)
                .map_err(|e| JobConfigError::Invalid(e.to_string()))
        };
        Ok(NewsTables {
            input: qualify(&self.input_table_id)?,
            output: qualify(&self.output_table_id)?,
        })
    }

    pub fn enrichment(&self) -> EnrichmentConfig {
        EnrichmentConfig {
            input_rows_limit: self.input_rows_limit,
            execution_timeout: Duration::try_from_secs_f64(self.execution_timeout)
                .unwrap_or(Duration::MAX),
        }
    }
}

/// Command-line overrides, one per configuration key.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Project that owns the dataset.
    #[arg(long, global = true)]
    pub project_id: Option<String>,
    /// Dataset holding the input and output tables.
    #[arg(long, global = true)]
    pub dataset_id: Option<String>,
    /// Table with raw news records.
    #[arg(long, global = true)]
    pub input_table_id: Option<String>,
    /// Table receiving enriched records.
    #[arg(long, global = true)]
    pub output_table_id: Option<String>,
    /// Topic (or http(s) URL) to notify when the job finishes.
    #[arg(long, global = true)]
    pub publish_topic: Option<String>,
    /// Records fetched per page.
    #[arg(long, global = true)]
    pub input_rows_limit: Option<u32>,
    /// URL of the NER service backend.
    #[arg(long, global = true)]
    pub ner_service_url: Option<String>,
    /// Maximum execution time in seconds.
    #[arg(long, global = true)]
    pub execution_timeout: Option<f64>,
    /// SQLite database holding both tables.
    #[arg(long, global = true, value_name = "FILE")]
    pub database_path: Option<PathBuf>,
}

impl ConfigOverrides {
    fn apply(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, JobConfigError> {
        let builder = builder
            .set_override_option("project_id", self.project_id.clone())?
            .set_override_option("dataset_id", self.dataset_id.clone())?
            .set_override_option("input_table_id", self.input_table_id.clone())?
            .set_override_option("output_table_id", self.output_table_id.clone())?
            .set_override_option("publish_topic", self.publish_topic.clone())?
            .set_override_option("input_rows_limit", self.input_rows_limit.map(i64::from))?
            .set_override_option("ner_service_url", self.ner_service_url.clone())?
            .set_override_option("execution_timeout", self.execution_timeout)?
            .set_override_option(
                "database_path",
                self.database_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?;
        Ok(builder)
    }
}

/// Load and validate the job configuration.
pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<JobConfig, JobConfigError> {
    let builder = Config::builder()
        .set_default("database_path", DEFAULT_DATABASE_PATH)?
        .add_source(File::from(path).format(FileFormat::Json).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let cfg: JobConfig = overrides.apply(builder)?.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Default `tracing` filter for the given `-v` count.
pub fn default_log_filter(verbose: u8) -> String {
    match verbose {
        0 => "info".to_string(),
        1 => "info,ner_enricher_lib=debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"{
        "project_id": "news-project",
        "dataset_id": "mediastack",
        "input_table_id": "raw_news",
        "output_table_id": "ner_news",
        "output_topic": "ner-finished",
        "input_rows_limit": 200,
        "ner_service_url": "http://localhost:5000/predict",
        "execution_timeout": 530.5
    }"#;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_file_with_output_topic_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, FULL_CONFIG);

        let cfg = load(&path, &ConfigOverrides::default()).unwrap();

        assert_eq!(cfg.project_id, "news-project");
        assert_eq!(cfg.publish_topic, "ner-finished");
        assert_eq!(cfg.input_rows_limit, 200);
        assert!((cfg.execution_timeout - 530.5).abs() < f64::EPSILON);
        assert_eq!(cfg.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, FULL_CONFIG);
        let overrides = ConfigOverrides {
            input_rows_limit: Some(25),
            ner_service_url: Some("http://ner.internal/predict".into()),
            execution_timeout: Some(60.0),
            ..ConfigOverrides::default()
        };

        let cfg = load(&path, &overrides).unwrap();

        assert_eq!(cfg.input_rows_limit, 25);
        assert_eq!(cfg.ner_service_url, "http://ner.internal/predict");
        assert_eq!(cfg.enrichment().execution_timeout, Duration::from_secs(60));
        assert_eq!(cfg.dataset_id, "mediastack");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{"project_id": "p"}"#);
        assert!(load(&path, &ConfigOverrides::default()).is_err());
    }

    #[test]
    fn flags_alone_are_enough_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ConfigOverrides {
            project_id: Some("p".into()),
            dataset_id: Some("d".into()),
            input_table_id: Some("in".into()),
            output_table_id: Some("out".into()),
            publish_topic: Some("topic".into()),
            input_rows_limit: Some(10),
            ner_service_url: Some("http://localhost:5000".into()),
            execution_timeout: Some(30.0),
            database_path: Some(dir.path().join("news.db")),
        };

        let cfg = load(&dir.path().join("absent.json"), &overrides).unwrap();
        assert_eq!(cfg.tables().unwrap().input.as_str(), "p.d.in");
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, FULL_CONFIG);
        let overrides = ConfigOverrides {
            input_rows_limit: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            load(&path, &overrides),
            Err(JobConfigError::Invalid(_))
        ));
    }

    #[test]
    fn out_of_range_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, FULL_CONFIG);
        for timeout in [1e20, -1.0, f64::INFINITY] {
            let overrides = ConfigOverrides {
                execution_timeout: Some(timeout),
                ..ConfigOverrides::default()
            };
            assert!(
                matches!(load(&path, &overrides), Err(JobConfigError::Invalid(_))),
                "timeout {timeout} accepted"
            );
        }
    }

    #[test]
    fn bad_table_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, FULL_CONFIG);
        let overrides = ConfigOverrides {
            output_table_id: Some("out; DROP".into()),
            ..ConfigOverrides::default()
        };
        assert!(load(&path, &overrides).is_err());
    }

    #[test]
    fn log_filter_escalates_with_verbosity() {
        assert_eq!(default_log_filter(0), "info");
        assert!(default_log_filter(1).contains("debug"));
        assert_eq!(default_log_filter(3), "trace");
    }

    #[test]
    fn app_name_is_ner_enricher() {
        assert_eq!(APP_NAME, "ner-enricher");
    }
}

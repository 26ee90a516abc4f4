// Error taxonomy shared by every pipeline stage, the CSV reader and the trainer.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage}: required column `{column}` is missing from the input")]
    MissingColumn {
        stage: &'static str,
        column: &'static str,
    },

    #[error("{stage}: cannot parse `{value}` in column `{column}` as a timestamp")]
    TimestampParse {
        stage: &'static str,
        column: &'static str,
        value: String,
    },

    #[error("{stage}: timestamp `{value}` is {found} but the batch is {expected}")]
    TimezoneMismatch {
        stage: &'static str,
        expected: &'static str,
        found: &'static str,
        value: String,
    },

    #[error("{stage}: transform called before fit")]
    NotFitted { stage: &'static str },

    #[error("{stage}: column `{column}` has no values to impute from")]
    Imputation {
        stage: &'static str,
        column: &'static str,
    },

    #[error("{stage}: {samples} samples cannot be split into {clusters} clusters")]
    InsufficientSamples {
        stage: &'static str,
        samples: usize,
        clusters: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

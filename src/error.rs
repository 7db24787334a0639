use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid publication identifier: {0}")]
    InvalidIdentifier(String),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("failed to read input file at {0}")]
    InputRead(Utf8PathBuf),

    #[error("failed to parse JSON input: {0}")]
    InputParse(String),

    #[error("failed to parse CSV input: {0}")]
    CsvParse(String),

    #[error("no database credentials provided")]
    MissingCredentials,

    #[error("failed to read credentials file at {0}")]
    CredentialsRead(Utf8PathBuf),

    #[error("failed to read accession types file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid database target (expected host[:port]/dbname): {0}")]
    InvalidDbTarget(String),

    #[error("no resource mapping for {0}")]
    UnknownResource(String),

    #[error("EuropePMC request failed: {0}")]
    EpmcRequest(String),

    #[error("EuropePMC returned status {status}: {message}")]
    EpmcStatus { status: u16, message: String },

    #[error("no usable response from {url} after {retries} retries")]
    RetriesExhausted {
        url: String,
        retries: usize,
        graceful: bool,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

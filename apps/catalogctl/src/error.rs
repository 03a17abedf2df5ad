//! # CLI Error Types
//!
//! Every failure is printed to stderr as a JSON report and mapped to an
//! exit code by its [`ErrorKind`]:
//! ```json
//! { "kind": "DUPLICATE_KEY", "message": "Duplicate identity: '00845-P-1' already exists" }
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use catalog_core::{CoreError, ErrorKind, ValidationError};
use catalog_db::DbError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::Db(e) => e.kind(),
            CliError::Core(e) => e.kind(),
            CliError::Validation(_) | CliError::InvalidConfig(_) | CliError::ConfigParse(_) => {
                ErrorKind::InvalidField
            }
            CliError::ConfigRead { .. } | CliError::Output(_) => ErrorKind::Internal,
        }
    }

    /// Distinct exit status per kind so scripts can branch without parsing.
    pub fn exit_status(&self) -> u8 {
        match self.kind() {
            ErrorKind::Internal => 1,
            ErrorKind::InvalidField => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::DuplicateKey => 4,
            ErrorKind::CycleDetected => 5,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

pub type CliResult<T> = Result<T, CliError>;

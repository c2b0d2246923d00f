//! CLI error types with exit code handling
//!
//! Library errors are folded into a small set of diagnostics, each carrying
//! the exit code the process ends with.

use miette::Diagnostic;
use thiserror::Error;

use m2cache_core::CoreError;
use m2cache_repo::RepoError;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// The user asked for something malformed or unknown
    #[error("{message}")]
    #[diagnostic(code(m2cache::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(m2cache::cli::not_found))]
    NotFound { message: String },

    /// Publishing would overwrite something that already exists
    #[error("{message}")]
    #[diagnostic(code(m2cache::cli::conflict))]
    Conflict {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Repository error: {message}")]
    #[diagnostic(code(m2cache::cli::repository))]
    Repository { message: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(m2cache::cli::io))]
    Io { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(m2cache::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Conflict { .. } => exit_codes::CONFLICT,
            CliError::Repository { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::RepositoryNotFound { .. } => CliError::input_with_help(
                err.to_string(),
                "List configured repositories with 'm2cache repo list'",
            ),
            RepoError::RepositoryAlreadyExists { .. } => CliError::Conflict {
                message: err.to_string(),
                help: Some("Remove it first with 'm2cache repo remove'".to_string()),
            },
            RepoError::InvalidRepositoryUrl { .. }
            | RepoError::InvalidConfig { .. }
            | RepoError::InvalidRelease { .. }
            | RepoError::Coordinate(_) => CliError::input(err.to_string()),
            RepoError::RevisionAlreadyExists { .. } | RepoError::VersionAlreadyPublished { .. } => {
                CliError::Conflict {
                    message: err.to_string(),
                    help: Some("Pass --force to replace it".to_string()),
                }
            }
            RepoError::Io { .. } => CliError::Io {
                message: err.to_string(),
            },
            other => CliError::Repository {
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::input(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

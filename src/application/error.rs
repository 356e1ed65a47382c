use std::error::Error as StdError;

use thiserror::Error;

use crate::application::{controller::ControllerError, repos::RepoError};
use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Top-level failure of a binary command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("content cache rebuild recorded {failures} failure(s)")]
    Degraded { failures: usize },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

/// Messages of `error` and every error in its source chain, outermost first.
pub fn error_chain(error: &dyn StdError) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut current = error.source();
    while let Some(inner) = current {
        messages.push(inner.to_string());
        current = inner.source();
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_walks_sources() {
        let error = AppError::from(ControllerError::Restore(RepoError::Integrity {
            message: "truncated".into(),
        }));
        assert_eq!(
            error_chain(&error),
            vec![
                "failed to restore the persisted content cache".to_string(),
                "integrity error: truncated".to_string(),
            ]
        );
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    /// The node rejected the call or submission because execution reverted.
    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Classify a raw RPC error message, separating execution reverts from transport noise.
    pub fn from_rpc(context: &str, err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.to_ascii_lowercase().contains("revert") {
            AppError::Reverted(format!("{context}: {msg}"))
        } else {
            AppError::Connection(format!("{context}: {msg}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_errors_mentioning_revert_are_classified_as_reverts() {
        let err = AppError::from_rpc("redeem", "server returned: execution reverted: ERC4626");
        assert!(matches!(err, AppError::Reverted(msg) if msg.starts_with("redeem:")));

        let err = AppError::from_rpc("redeem", "connection reset by peer");
        assert!(matches!(err, AppError::Connection(_)));
    }
}

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    License,
    Product,
    Version,
}

impl SelectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::License => "license",
            Self::Product => "product",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy for the upgrade workflow. Every variant is surfaced to
/// the operator; none of them triggers an automatic retry.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("portal rejected the login (http status {status})")]
    AuthFailure { status: u16 },

    #[error("selected {kind} '{value}' is not in the available set")]
    InvalidSelection { kind: SelectionKind, value: String },

    #[error("no downloadable versions offered for product '{product}'")]
    EmptyCatalog { product: String },

    #[error("transfer failed while {stage}: {reason}")]
    TransferFailure { stage: &'static str, reason: String },

    #[error("remote deployment failed: {reason}")]
    DeploymentFailure { reason: String },
}

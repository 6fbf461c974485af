//! Error types for the Redeploy Controller

use cluster_client::{ClientError, RunError};
use thiserror::Error;

/// Errors that can occur in the controller
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Cluster client error: {0}")]
    Client(#[from] ClientError),

    #[error("Controller error: {0}")]
    Run(#[from] RunError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

use inflow_core::error::{InflowError, WorkError};

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error("inflow: {0}")]
    Inflow(#[from] InflowError),

    #[error("work manager: {0}")]
    Work(#[from] WorkError),

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("activation not found: {0}")]
    ActivationNotFound(String),

    #[error("resource adapter is stopped")]
    Stopped,
}

pub type AdapterResult<T> = Result<T, AdapterError>;

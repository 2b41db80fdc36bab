pub mod config;
pub mod error;
pub mod resource_adapter;

pub use config::ResourceAdapterConfig;
pub use error::{AdapterError, AdapterResult};
pub use resource_adapter::{ActivationKey, ResourceAdapter};

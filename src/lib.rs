pub mod aws;
pub mod bundle;
pub mod config;
pub mod deploy;
pub mod error;
pub mod handles;
pub mod hooks;
pub mod logging;
pub mod provision;
pub mod resources;
pub mod variables;

pub use config::DeploymentConfig;
pub use error::{DeployError, Result};

//! One module per infrastructure component. Each builds its stack templates from the
//! deployment configuration and deploys them through a [`StackDeployer`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_cfn_stack::StackSpec;

use crate::error::{DeployError, Result};

pub mod app_host;
pub mod certificate;
pub mod database;
pub mod dns;
pub mod static_site;

pub type Outputs = BTreeMap<String, String>;

/// creates or updates a stack and returns its outputs once it settles.
#[async_trait]
pub trait StackDeployer: Send + Sync {
    async fn deploy(&self, spec: &StackSpec) -> Result<Outputs>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

pub fn require_output(stack: &str, outputs: &Outputs, key: &str) -> Result<String> {
    outputs.get(key).cloned().ok_or_else(|| DeployError::MissingOutput {
        stack: stack.to_string(),
        output: key.to_string(),
    })
}

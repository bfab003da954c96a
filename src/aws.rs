//! The AWS-backed implementations of the provisioning traits.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_cfn_stack::client::{self as cfn, ResourceProgress, WaitOptions};
use aws_cfn_stack::StackSpec;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{DeployError, Result};
use crate::provision::certificate::{classify_certificate, CertificateState, CERTIFICATE_TYPE};
use crate::provision::{ObjectStore, Outputs, StackDeployer};

/// deploys stacks with CloudFormation, one client per region.
pub struct CfnDeployer {
    clients: Mutex<HashMap<String, aws_sdk_cloudformation::Client>>,
    wait: WaitOptions,
}

impl CfnDeployer {
    pub fn new(wait: WaitOptions) -> Self {
        Self { clients: Mutex::new(HashMap::new()), wait }
    }

    async fn client(&self, region: &str) -> aws_sdk_cloudformation::Client {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }
        let client = cfn::make_client(region).await;
        clients.insert(region.to_string(), client.clone());
        client
    }
}

/// logs a certificate's state each time it changes.
struct CertificateWatch<'a> {
    stack: &'a str,
    last: HashMap<String, CertificateState>,
}

impl CertificateWatch<'_> {
    fn observe(&mut self, progress: &ResourceProgress) {
        let state = classify_certificate(&progress.status, progress.reason.as_deref());
        if self.last.get(&progress.logical_id) == Some(&state) {
            return;
        }
        match &state {
            CertificateState::PendingValidation => info!(
                stack = %self.stack,
                certificate = %progress.logical_id,
                detail = progress.reason.as_deref().unwrap_or_default(),
                "Certificate is pending DNS validation"
            ),
            CertificateState::Issued => info!(stack = %self.stack, certificate = %progress.logical_id, "Certificate validated"),
            CertificateState::Failed(reason) => {
                error!(stack = %self.stack, certificate = %progress.logical_id, reason = %reason, "Certificate validation failed")
            }
        }
        self.last.insert(progress.logical_id.clone(), state);
    }
}

#[async_trait]
impl StackDeployer for CfnDeployer {
    async fn deploy(&self, spec: &StackSpec) -> Result<Outputs> {
        let client = self.client(&spec.region).await;
        let mut opts = self.wait.clone();
        opts.watch = spec.template.resources_of_type(CERTIFICATE_TYPE).map(str::to_string).collect();
        let mut watch = CertificateWatch { stack: &spec.name, last: HashMap::new() };
        let outputs = cfn::deploy(&client, spec, &opts, |progress| watch.observe(progress)).await?;
        Ok(outputs)
    }
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub async fn new(region: &str) -> Self {
        let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self { client: aws_sdk_s3::Client::new(&shared_config) }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| DeployError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: format!("{}", DisplayErrorContext(&e)),
            })?;
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, ResourceStatus, Stack, StackStatus};
use aws_sdk_cloudformation::Client;
use tracing::{debug, info, warn};

use crate::{StackError, StackSpec};

pub async fn make_client(region: &str) -> Client {
    let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await;
    Client::new(&shared_config)
}

/// where a stack status leaves us after we asked cloudformation to do something.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Succeeded,
    Pending,
    /// the stack is stable, but our change did not stick.
    RolledBack,
    Failed,
}

pub fn settle(status: &StackStatus) -> Settled {
    match status {
        // done and return success:
        StackStatus::CreateComplete |
        StackStatus::UpdateComplete |
        StackStatus::ImportComplete => Settled::Succeeded,

        // keep trying
        StackStatus::CreateInProgress |
        StackStatus::DeleteInProgress |
        StackStatus::ImportInProgress |
        StackStatus::ImportRollbackInProgress |
        StackStatus::ReviewInProgress |
        StackStatus::RollbackInProgress |
        StackStatus::UpdateCompleteCleanupInProgress |
        StackStatus::UpdateInProgress |
        StackStatus::UpdateRollbackCompleteCleanupInProgress |
        StackStatus::UpdateRollbackInProgress => Settled::Pending,

        StackStatus::UpdateRollbackComplete |
        StackStatus::RollbackComplete |
        StackStatus::ImportRollbackComplete |
        StackStatus::DeleteComplete => Settled::RolledBack,

        _ => Settled::Failed,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackAction {
    Created { stack_id: String },
    Updated { stack_id: String },
    Unchanged { stack_id: String },
}

impl StackAction {
    pub fn stack_id(&self) -> &str {
        match self {
            StackAction::Created { stack_id }
            | StackAction::Updated { stack_id }
            | StackAction::Unchanged { stack_id } => stack_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProgress {
    pub logical_id: String,
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// logical ids whose progress is reported on every poll.
    pub watch: Vec<String>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(5000),
            watch: vec![],
        }
    }
}

fn aws_error<E: std::error::Error>(stack: &str, e: E) -> StackError {
    StackError::Aws {
        stack: stack.to_string(),
        message: format!("{}", DisplayErrorContext(&e)),
    }
}

/// `Ok(None)` when the stack does not exist.
pub async fn describe_stack(client: &Client, name: &str) -> Result<Option<Stack>, StackError> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(d) => Ok(d.stacks().first().cloned()),
        Err(e) => {
            let e_str = format!("{}", DisplayErrorContext(&e));
            if e_str.contains("does not exist") {
                return Ok(None);
            }
            Err(StackError::Aws { stack: name.to_string(), message: e_str })
        }
    }
}

pub fn outputs_of(stack: &Stack) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for output in stack.outputs() {
        if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
            out.insert(key.to_string(), val.to_string());
        }
    }
    out
}

fn parameters_of(spec: &StackSpec) -> Vec<Parameter> {
    spec.parameters
        .iter()
        .map(|(k, v)| Parameter::builder().parameter_key(k).parameter_value(v).build())
        .collect()
}

pub async fn create_or_update_stack(client: &Client, spec: &StackSpec, exists: bool) -> Result<StackAction, StackError> {
    let name = &spec.name;
    let body = spec.template_body()?;
    if exists {
        info!(stack = %name, "Updating stack");
        match client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .set_parameters(Some(parameters_of(spec)))
            .send()
            .await
        {
            Ok(out) => Ok(StackAction::Updated {
                stack_id: out.stack_id().unwrap_or(name).to_string(),
            }),
            Err(e) => {
                let e_str = format!("{}", DisplayErrorContext(&e));
                if e_str.contains("No updates are to be performed") {
                    info!(stack = %name, "Stack is already up to date");
                    return Ok(StackAction::Unchanged { stack_id: name.to_string() });
                }
                Err(StackError::Aws { stack: name.to_string(), message: e_str })
            }
        }
    } else {
        info!(stack = %name, region = %spec.region, "Creating stack");
        let out = client
            .create_stack()
            .on_failure(OnFailure::Delete)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .set_parameters(Some(parameters_of(spec)))
            .send()
            .await
            .map_err(|e| aws_error(name, e))?;
        Ok(StackAction::Created {
            stack_id: out.stack_id().unwrap_or(name).to_string(),
        })
    }
}

pub async fn resource_progress(client: &Client, stack_id: &str, logical_id: &str) -> Option<ResourceProgress> {
    let out = client
        .describe_stack_resource()
        .stack_name(stack_id)
        .logical_resource_id(logical_id)
        .send()
        .await
        .ok()?;
    let detail = out.stack_resource_detail()?;
    Some(ResourceProgress {
        logical_id: logical_id.to_string(),
        status: detail.resource_status().map(|s| s.as_str().to_string()).unwrap_or_default(),
        reason: detail.resource_status_reason().map(str::to_string),
    })
}

/// the oldest resource failure recorded for a stack. Later failures are usually
/// "Resource creation cancelled" noise caused by the first one.
pub async fn first_failure_reason(client: &Client, stack_id: &str) -> Option<String> {
    let out = client.describe_stack_events().stack_name(stack_id).send().await.ok()?;
    out.stack_events()
        .iter()
        .rev()
        .find(|event| {
            matches!(
                event.resource_status(),
                Some(ResourceStatus::CreateFailed) | Some(ResourceStatus::UpdateFailed) | Some(ResourceStatus::DeleteFailed)
            ) && !event.resource_status_reason().unwrap_or_default().contains("Resource creation cancelled")
        })
        .map(|event| {
            format!(
                "{}: {}",
                event.logical_resource_id().unwrap_or("stack"),
                event.resource_status_reason().unwrap_or("no reason given")
            )
        })
}

/// poll until the stack settles, reporting progress of the watched resources.
pub async fn wait_for_output(
    client: &Client,
    name: &str,
    stack_id: &str,
    opts: &WaitOptions,
    mut on_progress: impl FnMut(&ResourceProgress),
) -> Result<BTreeMap<String, String>, StackError> {
    let started = Instant::now();
    loop {
        let stack = match describe_stack(client, stack_id).await? {
            Some(s) => s,
            None => {
                return Err(StackError::Failed {
                    stack: name.to_string(),
                    status: "DELETED".to_string(),
                    reason: first_failure_reason(client, stack_id).await.unwrap_or_else(|| "stack no longer exists".to_string()),
                })
            }
        };
        let status = stack.stack_status().cloned().unwrap_or(StackStatus::CreateInProgress);
        match settle(&status) {
            Settled::Succeeded => {
                info!(stack = %name, status = %status.as_str(), "Stack is ready");
                return Ok(outputs_of(&stack));
            }
            Settled::RolledBack | Settled::Failed => {
                let reason = match first_failure_reason(client, stack_id).await {
                    Some(r) => r,
                    None => stack.stack_status_reason().unwrap_or("Failed to get stack failure reason").to_string(),
                };
                return Err(StackError::Failed {
                    stack: name.to_string(),
                    status: status.as_str().to_string(),
                    reason,
                });
            }
            Settled::Pending => {
                debug!(stack = %name, status = %status.as_str(), "Still waiting");
            }
        }
        for logical_id in opts.watch.iter() {
            if let Some(progress) = resource_progress(client, stack_id, logical_id).await {
                on_progress(&progress);
            }
        }
        if started.elapsed() >= opts.timeout {
            return Err(StackError::Timeout {
                stack: name.to_string(),
                waited_secs: started.elapsed().as_secs(),
            });
        }
        tokio::time::sleep(opts.poll_interval).await;
    }
}

async fn wait_until_idle(client: &Client, name: &str, opts: &WaitOptions) -> Result<Option<Stack>, StackError> {
    let started = Instant::now();
    loop {
        let stack = describe_stack(client, name).await?;
        let pending = stack
            .as_ref()
            .and_then(|s| s.stack_status())
            .map(|status| settle(status) == Settled::Pending)
            .unwrap_or(false);
        if !pending {
            return Ok(stack);
        }
        if started.elapsed() >= opts.timeout {
            return Err(StackError::Timeout { stack: name.to_string(), waited_secs: started.elapsed().as_secs() });
        }
        info!(stack = %name, "Another operation is in progress on this stack, waiting");
        tokio::time::sleep(opts.poll_interval).await;
    }
}

async fn delete_failed_stack(client: &Client, name: &str, opts: &WaitOptions) -> Result<(), StackError> {
    warn!(stack = %name, "Stack never finished creating, deleting it before retrying");
    client.delete_stack().stack_name(name).send().await.map_err(|e| aws_error(name, e))?;
    let started = Instant::now();
    while describe_stack(client, name).await?.is_some() {
        if started.elapsed() >= opts.timeout {
            return Err(StackError::Timeout { stack: name.to_string(), waited_secs: started.elapsed().as_secs() });
        }
        tokio::time::sleep(opts.poll_interval).await;
    }
    Ok(())
}

/// create the stack if it doesn't exist, update it otherwise, and wait for its outputs.
pub async fn deploy(
    client: &Client,
    spec: &StackSpec,
    opts: &WaitOptions,
    on_progress: impl FnMut(&ResourceProgress),
) -> Result<BTreeMap<String, String>, StackError> {
    let missing = spec.missing_parameters();
    if !missing.is_empty() {
        return Err(StackError::MissingParameters { stack: spec.name.clone(), missing });
    }
    let mut existing = wait_until_idle(client, &spec.name, opts).await?;
    let never_created = existing
        .as_ref()
        .and_then(|s| s.stack_status())
        .map(|status| matches!(status, StackStatus::RollbackComplete | StackStatus::RollbackFailed))
        .unwrap_or(false);
    if never_created {
        delete_failed_stack(client, &spec.name, opts).await?;
        existing = None;
    }
    let action = create_or_update_stack(client, spec, existing.is_some()).await?;
    match action {
        StackAction::Unchanged { .. } => match existing {
            Some(stack) => Ok(outputs_of(&stack)),
            None => Ok(BTreeMap::new()),
        },
        action => wait_for_output(client, &spec.name, action.stack_id(), opts, on_progress).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_terminal_statuses() {
        assert_eq!(settle(&StackStatus::CreateComplete), Settled::Succeeded);
        assert_eq!(settle(&StackStatus::UpdateComplete), Settled::Succeeded);
        assert_eq!(settle(&StackStatus::CreateInProgress), Settled::Pending);
        assert_eq!(settle(&StackStatus::UpdateCompleteCleanupInProgress), Settled::Pending);
        assert_eq!(settle(&StackStatus::UpdateRollbackComplete), Settled::RolledBack);
        assert_eq!(settle(&StackStatus::DeleteComplete), Settled::RolledBack);
        assert_eq!(settle(&StackStatus::CreateFailed), Settled::Failed);
        assert_eq!(settle(&StackStatus::UpdateRollbackFailed), Settled::Failed);
    }

    #[test]
    fn action_exposes_stack_id() {
        let action = StackAction::Created { stack_id: "arn:aws:cloudformation:stack/x".into() };
        assert_eq!(action.stack_id(), "arn:aws:cloudformation:stack/x");
        assert_eq!(StackAction::Unchanged { stack_id: "x".into() }.stack_id(), "x");
    }
}

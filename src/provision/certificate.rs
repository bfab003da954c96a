use aws_cfn_stack::{get_ref, Input, StackError, StackSpec};
use aws_regions::{is_cloudfront_cert_region, CLOUDFRONT_CERT_REGION};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{require_output, StackDeployer};
use crate::config::DeploymentConfig;
use crate::error::{DeployError, Result};
use crate::resources::certificate::Certificate;

pub const CERTIFICATE_TYPE: &str = "AWS::CertificateManager::Certificate";

/// where a certificate is in its validation lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateState {
    PendingValidation,
    Issued,
    Failed(String),
}

/// classify a certificate resource from its CloudFormation resource status.
/// While ACM waits for the DNS records the resource sits in `CREATE_IN_PROGRESS`.
pub fn classify_certificate(status: &str, reason: Option<&str>) -> CertificateState {
    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" => CertificateState::Issued,
        s if s.ends_with("_FAILED") => {
            CertificateState::Failed(reason.unwrap_or("certificate request failed").to_string())
        }
        _ => CertificateState::PendingValidation,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificates {
    /// used by the distribution. Always issued in us-east-1.
    pub edge_arn: String,
    /// used by the load balancer listener in the deployment region.
    pub regional_arn: String,
}

struct CertificateStack {
    spec: StackSpec,
    domains: Vec<String>,
}

fn certificate_stack(name: &str, region: &str, domain: &str, sans: Vec<String>, zone: &str) -> Result<CertificateStack> {
    let cert = Certificate {
        domain_name: domain.to_string(),
        subject_alternative_names: sans,
        hosted_zone_id: zone.to_string(),
    };
    let domains = cert.all_names().map(str::to_string).collect();
    let mut input = Input::new(format!("TLS certificate for {domain}"));
    input.resource("Certificate", cert);
    input.output("CertificateArn", "ARN of the issued certificate", get_ref("Certificate"));
    Ok(CertificateStack {
        spec: StackSpec::new(name, region, input.into_template()?)?,
        domains,
    })
}

fn stacks(config: &DeploymentConfig) -> Result<Vec<CertificateStack>> {
    let zone = config.hosted_zone_id();
    if is_cloudfront_cert_region(&config.region) {
        let single = certificate_stack(
            &config.stack_name("certificate"),
            &config.region,
            &config.frontend_domain(),
            vec![config.backend_domain()],
            zone,
        )?;
        return Ok(vec![single]);
    }
    let edge = certificate_stack(
        &config.stack_name("edge-certificate"),
        CLOUDFRONT_CERT_REGION,
        &config.frontend_domain(),
        vec![],
        zone,
    )?;
    let regional = certificate_stack(&config.stack_name("certificate"), &config.region, &config.backend_domain(), vec![], zone)?;
    Ok(vec![edge, regional])
}

pub fn certificate_stacks(config: &DeploymentConfig) -> Result<Vec<StackSpec>> {
    Ok(stacks(config)?.into_iter().map(|s| s.spec).collect())
}

fn rejected(err: DeployError, domains: &[String]) -> DeployError {
    match err {
        DeployError::Stack(StackError::Failed { reason, .. }) => DeployError::CertificateRejected {
            domain: domains.join(", "),
            reason,
        },
        other => other,
    }
}

async fn issue(deployer: &dyn StackDeployer, stack: &CertificateStack) -> Result<String> {
    info!(stack = %stack.spec.name, domains = ?stack.domains, region = %stack.spec.region, "Requesting certificate");
    let outputs = deployer.deploy(&stack.spec).await.map_err(|e| rejected(e, &stack.domains))?;
    let arn = require_output(&stack.spec.name, &outputs, "CertificateArn")?;
    info!(arn = %arn, "Certificate issued");
    Ok(arn)
}

pub async fn provision_certificates(deployer: &dyn StackDeployer, config: &DeploymentConfig) -> Result<Certificates> {
    let stacks = stacks(config)?;
    match stacks.as_slice() {
        [single] => {
            let arn = issue(deployer, single).await?;
            Ok(Certificates { edge_arn: arn.clone(), regional_arn: arn })
        }
        [edge, regional] => {
            // both publish validation records into the same hosted zone
            let edge_arn = issue(deployer, edge).await?;
            let regional_arn = issue(deployer, regional).await?;
            Ok(Certificates { edge_arn, regional_arn })
        }
        _ => Err(DeployError::config("unexpected certificate layout")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::fakes::FakeDeployer;

    fn config(region: &str) -> DeploymentConfig {
        let mut config = DeploymentConfig::default();
        config.domain_name = "example.com".into();
        config.hosted_zone_id = "Z1".into();
        config.region = region.into();
        config
    }

    #[test]
    fn classifies_resource_statuses() {
        assert_eq!(classify_certificate("CREATE_IN_PROGRESS", None), CertificateState::PendingValidation);
        assert_eq!(classify_certificate("CREATE_COMPLETE", None), CertificateState::Issued);
        assert_eq!(
            classify_certificate("CREATE_FAILED", Some("CAA record does not allow amazon.com")),
            CertificateState::Failed("CAA record does not allow amazon.com".into())
        );
    }

    #[test]
    fn one_certificate_in_us_east_1() {
        let specs = certificate_stacks(&config("us-east-1")).unwrap();
        assert_eq!(specs.len(), 1);
        let props = &specs[0].template.resources["Certificate"].properties;
        assert_eq!(props["DomainName"], "www.example.com");
        assert_eq!(props["SubjectAlternativeNames"][0], "api.example.com");
    }

    #[test]
    fn edge_certificate_is_requested_in_us_east_1() {
        let specs = certificate_stacks(&config("eu-west-1")).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "web-app-edge-certificate");
        assert_eq!(specs[0].region, "us-east-1");
        assert_eq!(specs[1].region, "eu-west-1");
        assert_eq!(specs[1].template.resources["Certificate"].properties["DomainName"], "api.example.com");
    }

    #[tokio::test]
    async fn shares_the_single_certificate() {
        let deployer = FakeDeployer::default();
        let certs = provision_certificates(&deployer, &config("us-east-1")).await.unwrap();
        assert_eq!(certs.edge_arn, certs.regional_arn);
        assert_eq!(certs.edge_arn, "web-app-certificate/CertificateArn");
    }

    #[tokio::test]
    async fn certificates_are_issued_one_at_a_time() {
        let deployer = FakeDeployer::default().yielding();
        let certs = provision_certificates(&deployer, &config("eu-west-1")).await.unwrap();
        assert_eq!(certs.edge_arn, "web-app-edge-certificate/CertificateArn");
        assert_eq!(certs.regional_arn, "web-app-certificate/CertificateArn");
        assert_eq!(deployer.names(), vec!["web-app-edge-certificate", "web-app-certificate"]);
        assert!(deployer.overlaps().is_empty());
    }

    #[tokio::test]
    async fn failed_validation_is_a_rejection() {
        let deployer = FakeDeployer::default().failing("web-app-certificate", "Certificate: DNS validation failed");
        let err = provision_certificates(&deployer, &config("us-east-1")).await.unwrap_err();
        match err {
            DeployError::CertificateRejected { domain, reason } => {
                assert_eq!(domain, "www.example.com, api.example.com");
                assert!(reason.contains("DNS validation failed"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

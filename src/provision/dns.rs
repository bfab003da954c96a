use aws_cfn_stack::{get_ref, Input, StackSpec};
use aws_regions::{elastic_beanstalk_cname, elastic_beanstalk_hosted_zone, CLOUDFRONT_HOSTED_ZONE_ID};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::StackDeployer;
use crate::config::{DeploymentConfig, RecordType};
use crate::error::{DeployError, Result};
use crate::resources::logical_id;
use crate::resources::route53::AliasRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsHandles {
    pub frontend: String,
    pub backend: String,
}

/// both alias records in one stack, so every write to the zone happens in one place.
pub fn dns_stack(config: &DeploymentConfig) -> Result<StackSpec> {
    let beanstalk_zone = elastic_beanstalk_hosted_zone(&config.region)
        .ok_or_else(|| DeployError::config(format!("No Elastic Beanstalk hosted zone known for {}", config.region)))?;
    let frontend = config.frontend_domain();
    let backend = config.backend_domain();

    let mut input = Input::new(format!("DNS records for {}", config.domain_name));
    input.parameter("DistributionDomain", "cloudfront domain name of the site");
    let frontend_id = format!("Frontend{}", logical_id(&config.frontend_subdomain));
    // IPv6 adds an AAAA record next to the A record; IPv4 clients still need the A
    let mut frontend_types = vec![("", RecordType::A)];
    if config.dns.record_type == RecordType::Aaaa {
        frontend_types.push(("Ipv6", RecordType::Aaaa));
    }
    for (suffix, record_type) in frontend_types {
        input.resource(
            &format!("{frontend_id}{suffix}"),
            AliasRecord {
                name: frontend.clone(),
                record_type: record_type.as_str().to_string(),
                hosted_zone_id: config.hosted_zone_id().to_string(),
                target_dns_name: get_ref("DistributionDomain"),
                target_hosted_zone_id: json!(CLOUDFRONT_HOSTED_ZONE_ID),
            },
        );
    }
    input.resource(
        &format!("Backend{}", logical_id(&config.backend_subdomain)),
        AliasRecord {
            name: backend,
            record_type: "A".to_string(),
            hosted_zone_id: config.hosted_zone_id().to_string(),
            target_dns_name: json!(elastic_beanstalk_cname(&config.app.cname_prefix(), &config.region)),
            target_hosted_zone_id: json!(beanstalk_zone),
        },
    );
    Ok(StackSpec::new(&config.stack_name("dns"), &config.region, input.into_template()?)?)
}

pub async fn provision_dns(deployer: &dyn StackDeployer, config: &DeploymentConfig, distribution_domain: &str) -> Result<DnsHandles> {
    let spec = dns_stack(config)?.with_parameter("DistributionDomain", distribution_domain);
    deployer.deploy(&spec).await?;
    let handles = DnsHandles { frontend: config.frontend_domain(), backend: config.backend_domain() };
    info!(frontend = %handles.frontend, backend = %handles.backend, "DNS records are in place");
    Ok(handles)
}

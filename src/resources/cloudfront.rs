use aws_cfn_stack::CfnResource;
use serde_json::{json, Value};

/// maps an origin error to a successful response with a different page.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error_code: u16,
    pub response_code: u16,
    pub response_page_path: String,
    pub min_ttl: u32,
}

/// S3 website endpoints answer 403 or 404 for paths that are not objects.
/// Serve the index document with a 200 for those, so client-side routes resolve.
pub fn forbidden_remap(index_document: &str) -> Vec<ErrorResponse> {
    [403, 404]
        .into_iter()
        .map(|error_code| ErrorResponse {
            error_code,
            response_code: 200,
            response_page_path: format!("/{}", index_document.trim_start_matches('/')),
            min_ttl: 0,
        })
        .collect()
}

/// A distribution with a single custom origin and a single default behavior.
pub struct Distribution {
    pub comment: String,
    pub aliases: Vec<String>,
    /// ARN of a certificate issued in us-east-1.
    pub certificate_arn: Value,
    /// host only, no scheme.
    pub origin_domain: Value,
    pub origin_id: String,
    pub origin_protocol_policy: String,
    pub default_root_object: String,
    pub cache_policy_id: String,
    pub origin_request_policy_id: Option<String>,
    pub response_headers_policy_id: Option<String>,
    pub error_responses: Vec<ErrorResponse>,
    pub ipv6: bool,
}

impl Default for Distribution {
    fn default() -> Self {
        Self {
            comment: Default::default(),
            aliases: vec![],
            certificate_arn: Value::Null,
            origin_domain: Value::Null,
            origin_id: "default-origin".into(),
            origin_protocol_policy: "http-only".into(),
            default_root_object: "index.html".into(),
            cache_policy_id: String::new(),
            origin_request_policy_id: None,
            response_headers_policy_id: None,
            error_responses: vec![],
            ipv6: false,
        }
    }
}

impl CfnResource for Distribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }

    fn properties(&self) -> Value {
        let mut behavior = json!({
            "TargetOriginId": self.origin_id,
            "ViewerProtocolPolicy": "redirect-to-https",
            "AllowedMethods": ["GET", "HEAD"],
            "CachedMethods": ["GET", "HEAD"],
            "Compress": true,
            "CachePolicyId": self.cache_policy_id,
        });
        if let Some(id) = &self.origin_request_policy_id {
            behavior["OriginRequestPolicyId"] = json!(id);
        }
        if let Some(id) = &self.response_headers_policy_id {
            behavior["ResponseHeadersPolicyId"] = json!(id);
        }
        let error_responses: Vec<Value> = self
            .error_responses
            .iter()
            .map(|r| {
                json!({
                    "ErrorCode": r.error_code,
                    "ResponseCode": r.response_code,
                    "ResponsePagePath": r.response_page_path,
                    "ErrorCachingMinTTL": r.min_ttl,
                })
            })
            .collect();
        let mut config = json!({
            "Enabled": true,
            "HttpVersion": "http2",
            "IPV6Enabled": self.ipv6,
            "DefaultRootObject": self.default_root_object,
            "Aliases": self.aliases,
            "ViewerCertificate": {
                "AcmCertificateArn": self.certificate_arn,
                "MinimumProtocolVersion": "TLSv1.2_2021",
                "SslSupportMethod": "sni-only",
            },
            "DefaultCacheBehavior": behavior,
            "Origins": [{
                "Id": self.origin_id,
                "DomainName": self.origin_domain,
                "CustomOriginConfig": {
                    "HTTPPort": 80,
                    "HTTPSPort": 443,
                    "OriginProtocolPolicy": self.origin_protocol_policy,
                },
            }],
        });
        if !error_responses.is_empty() {
            config["CustomErrorResponses"] = json!(error_responses);
        }
        if !self.comment.is_empty() {
            config["Comment"] = json!(self.comment);
        }
        json!({ "DistributionConfig": config })
    }

    fn validate(&self) -> Result<(), String> {
        if self.origin_domain.is_null() {
            return Err("cloudfront distribution origin domain name is required".to_string());
        }
        if self.origin_id.is_empty() {
            return Err("cloudfront distribution origin id is required".to_string());
        }
        if self.cache_policy_id.is_empty() {
            return Err("cloudfront distribution needs a cache policy".to_string());
        }
        if !self.aliases.is_empty() && self.certificate_arn.is_null() {
            return Err("Aliases require a certificate that covers them".to_string());
        }
        if let Some(bad) = self.error_responses.iter().find(|r| !(400..600).contains(&r.error_code)) {
            return Err(format!("{} is not an error status code", bad.error_code));
        }
        Ok(())
    }
}

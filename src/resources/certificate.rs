use aws_cfn_stack::CfnResource;
use serde_json::{json, Value};

/// An ACM certificate validated through DNS records in a Route 53 zone of this account.
/// CloudFormation creates the validation records itself when every name has a `HostedZoneId`.
pub struct Certificate {
    /// Must be fully qualified. Can have 1 optional wildcard.
    /// Examples of valid values:
    /// - www.mysite.com
    /// - *.mysite.com
    /// Examples of invalid values:
    /// - *.something.*.mysite.com
    /// - cannotendwithdot.com.
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
    /// the actual ID, without the `/hostedzone/` prefix.
    pub hosted_zone_id: String,
}

impl Certificate {
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.domain_name.as_str()).chain(self.subject_alternative_names.iter().map(String::as_str))
    }
}

pub fn verify_certificate_domain(domain: &str) -> Result<(), String> {
    if domain.is_empty() {
        return Err("Must provide a domain name".to_string());
    }
    if domain.ends_with('.') || !domain.contains('.') {
        return Err(format!("{domain} is not a fully qualified domain name"));
    }
    if domain.contains('*') {
        if domain.matches('*').count() > 1 {
            return Err(format!("Must only provide 1 wildcard. {domain} is invalid."));
        }
        if !domain.starts_with("*.") {
            return Err(format!(
                "If using a wildcard, it must be the first component of your domain, eg: \"*.something.com\". {domain} is invalid."
            ));
        }
    }
    Ok(())
}

impl CfnResource for Certificate {
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }

    fn properties(&self) -> Value {
        let validation: Vec<Value> = self
            .all_names()
            .map(|name| json!({ "DomainName": name, "HostedZoneId": self.hosted_zone_id }))
            .collect();
        let mut props = json!({
            "DomainName": self.domain_name,
            "ValidationMethod": "DNS",
            "DomainValidationOptions": validation,
        });
        if !self.subject_alternative_names.is_empty() {
            props["SubjectAlternativeNames"] = json!(self.subject_alternative_names);
        }
        props
    }

    fn validate(&self) -> Result<(), String> {
        for name in self.all_names() {
            verify_certificate_domain(name)?;
        }
        if self.hosted_zone_id.is_empty() {
            return Err("Must provide the hosted zone ID of where your domain resides".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_gets_a_validation_option() {
        let cert = Certificate {
            domain_name: "www.example.com".into(),
            subject_alternative_names: vec!["api.example.com".into()],
            hosted_zone_id: "Z1".into(),
        };
        let props = cert.properties();
        assert_eq!(props["ValidationMethod"], "DNS");
        assert_eq!(props["SubjectAlternativeNames"], json!(["api.example.com"]));
        let options = props["DomainValidationOptions"].as_array().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[1], json!({ "DomainName": "api.example.com", "HostedZoneId": "Z1" }));
        assert!(cert.validate().is_ok());
    }

    #[test]
    fn single_name_has_no_alternative_names() {
        let cert = Certificate { domain_name: "api.example.com".into(), subject_alternative_names: vec![], hosted_zone_id: "Z1".into() };
        assert!(cert.properties().get("SubjectAlternativeNames").is_none());
    }

    #[test]
    fn wildcard_rules() {
        assert!(verify_certificate_domain("*.mysite.com").is_ok());
        assert!(verify_certificate_domain("multiple.sub.domains.mysite.com").is_ok());
        assert!(verify_certificate_domain("*.something.*.mysite.com").is_err());
        assert!(verify_certificate_domain("www.*.mysite.com").is_err());
        assert!(verify_certificate_domain("cannotendwithdot.com.").is_err());
        assert!(verify_certificate_domain("").is_err());
    }
}

use aws_cfn_stack::CfnResource;
use serde_json::{json, Value};

/// An alias record, eg: `www.example.com` -> a cloudfront distribution.
pub struct AliasRecord {
    pub name: String,
    /// A or AAAA
    pub record_type: String,
    pub hosted_zone_id: String,
    pub target_dns_name: Value,
    /// the zone of the target, not of the record.
    pub target_hosted_zone_id: Value,
}

impl CfnResource for AliasRecord {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }

    fn properties(&self) -> Value {
        json!({
            "HostedZoneId": self.hosted_zone_id,
            "Name": self.name,
            "Type": self.record_type,
            "Comment": self.name,
            "AliasTarget": {
                "DNSName": self.target_dns_name,
                "HostedZoneId": self.target_hosted_zone_id,
                "EvaluateTargetHealth": false,
            },
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Route53 record must have a name. Example mysubdomain.mywebsite.com".to_string());
        }
        if self.record_type != "A" && self.record_type != "AAAA" {
            return Err(format!("Alias records must be A or AAAA, not {}", self.record_type));
        }
        if self.hosted_zone_id.is_empty() {
            return Err(format!("Route53 record {} needs a hosted zone id", self.name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_record_targets_other_zone() {
        let record = AliasRecord {
            name: "www.example.com".into(),
            record_type: "A".into(),
            hosted_zone_id: "Z1".into(),
            target_dns_name: json!("d111111abcdef8.cloudfront.net"),
            target_hosted_zone_id: json!("Z2FDTNDATAQYW2"),
        };
        let props = record.properties();
        assert_eq!(props["HostedZoneId"], "Z1");
        assert_eq!(props["AliasTarget"]["HostedZoneId"], "Z2FDTNDATAQYW2");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn rejects_non_alias_types() {
        let record = AliasRecord {
            name: "www.example.com".into(),
            record_type: "CNAME".into(),
            hosted_zone_id: "Z1".into(),
            target_dns_name: json!("x"),
            target_hosted_zone_id: json!("y"),
        };
        assert!(record.validate().is_err());
    }
}

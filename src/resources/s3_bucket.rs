use std::net::Ipv4Addr;

use aws_cfn_stack::{get_ref, sub, CfnResource};
use serde_json::{json, Value};

/// checks the S3 general purpose bucket naming rules.
/// https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html
pub fn validate_bucket_name(name: &str) -> Result<(), String> {
    let invalid = |why: &str| Err(format!("Invalid bucket name {name:?}\n{why}"));
    if !(3..=63).contains(&name.len()) {
        return invalid("Must be between 3 and 63 characters long");
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-') {
        return invalid("Can consist only of lowercase letters, numbers, dots, and hyphens");
    }
    let alnum = |c: Option<char>| c.map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return invalid("Must begin and end with a letter or number");
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return invalid("Cannot contain two adjacent periods, or a period next to a hyphen");
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return invalid("Must not be formatted as an IP address");
    }
    if name.starts_with("xn--") || name.starts_with("sthree-") {
        return invalid("Must not start with a reserved prefix");
    }
    if name.ends_with("-s3alias") || name.ends_with("--ol-s3") {
        return invalid("Must not end with a reserved suffix");
    }
    Ok(())
}

/// A bucket configured for static website hosting. Objects are readable by anyone
/// once a [`PublicReadPolicy`] is attached, so every public access block flag is off.
pub struct WebsiteBucket {
    pub bucket_name: String,
    pub index_document: String,
    pub error_document: String,
}

impl CfnResource for WebsiteBucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Value {
        json!({
            "BucketName": self.bucket_name,
            "WebsiteConfiguration": {
                "IndexDocument": self.index_document,
                "ErrorDocument": self.error_document,
            },
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": false,
                "BlockPublicPolicy": false,
                "IgnorePublicAcls": false,
                "RestrictPublicBuckets": false,
            },
            "OwnershipControls": {
                "Rules": [{ "ObjectOwnership": "ObjectWriter" }]
            },
        })
    }

    fn validate(&self) -> Result<(), String> {
        validate_bucket_name(&self.bucket_name)?;
        if self.index_document.is_empty() {
            return Err("Website bucket needs an index document".to_string());
        }
        Ok(())
    }

    /// a non-empty bucket cannot be deleted by CloudFormation.
    fn deletion_policy(&self) -> Option<&'static str> {
        Some("Retain")
    }
}

/// grants `s3:GetObject` on every object of a bucket to everyone. Nothing else.
pub struct PublicReadPolicy {
    pub bucket_logical_id: String,
}

impl CfnResource for PublicReadPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }

    fn properties(&self) -> Value {
        json!({
            "Bucket": get_ref(&self.bucket_logical_id),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Sid": "PublicReadGetObject",
                    "Effect": "Allow",
                    "Principal": "*",
                    "Action": "s3:GetObject",
                    "Resource": sub(&format!("arn:aws:s3:::${{{}}}/*", self.bucket_logical_id)),
                }]
            }
        })
    }
}

/// private bucket that holds application bundles.
pub struct ArtifactBucket;

impl CfnResource for ArtifactBucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Value {
        json!({
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
            "BucketEncryption": {
                "ServerSideEncryptionConfiguration": [{
                    "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
                }]
            },
        })
    }

    fn deletion_policy(&self) -> Option<&'static str> {
        Some("Retain")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names() {
        assert!(validate_bucket_name("www.example.com").is_ok());
        assert!(validate_bucket_name("ra.ironcliff.ai").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("Www.example.com").is_err());
        assert!(validate_bucket_name("my..bucket").is_err());
        assert!(validate_bucket_name("my-.bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("192.168.5.4").is_err());
        assert!(validate_bucket_name("xn--bucket").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn website_bucket_is_publicly_readable() {
        let bucket = WebsiteBucket {
            bucket_name: "www.example.com".into(),
            index_document: "index.html".into(),
            error_document: "index.html".into(),
        };
        let props = bucket.properties();
        assert_eq!(props["WebsiteConfiguration"]["ErrorDocument"], "index.html");
        assert_eq!(props["PublicAccessBlockConfiguration"]["BlockPublicPolicy"], false);
        assert_eq!(props["OwnershipControls"]["Rules"][0]["ObjectOwnership"], "ObjectWriter");
        assert!(bucket.validate().is_ok());
    }

    #[test]
    fn policy_only_allows_get_object() {
        let policy = PublicReadPolicy { bucket_logical_id: "SiteBucket".into() };
        let statements = policy.properties()["PolicyDocument"]["Statement"].clone();
        assert_eq!(statements.as_array().unwrap().len(), 1);
        assert_eq!(statements[0]["Action"], "s3:GetObject");
        assert_eq!(statements[0]["Resource"], json!({ "Fn::Sub": "arn:aws:s3:::${SiteBucket}/*" }));
    }
}

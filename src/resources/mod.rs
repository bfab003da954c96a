//! CloudFormation resource definitions used by the stacks this tool deploys.

pub mod beanstalk;
pub mod certificate;
pub mod cloudfront;
pub mod rds;
pub mod route53;
pub mod s3_bucket;

/// a logical id derived from a human name, eg: `www.example.com` -> `wwwexamplecom`.
pub fn logical_id(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_ids_drop_punctuation() {
        assert_eq!(logical_id("www.example-site.com"), "wwwexamplesitecom");
        assert_eq!(logical_id("my_app"), "myapp");
        assert!(aws_cfn_stack::verify_resource_name(&logical_id("ra-api.ironcliff.ai")).is_ok());
    }
}

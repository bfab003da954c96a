use aws_cfn_stack::{get_ref, CfnResource};
use serde_json::{json, Value};

pub struct Application {
    pub name: String,
    pub description: String,
}

impl CfnResource for Application {
    fn type_string(&self) -> &'static str {
        "AWS::ElasticBeanstalk::Application"
    }

    fn properties(&self) -> Value {
        json!({ "ApplicationName": self.name, "Description": self.description })
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.len() > 100 {
            return Err(format!("Invalid application name {:?}\nMust be between 1 and 100 characters", self.name));
        }
        Ok(())
    }
}

/// an uploaded source bundle registered with an application.
pub struct ApplicationVersion {
    pub application: Value,
    pub bucket: Value,
    pub key: Value,
    pub description: String,
}

impl CfnResource for ApplicationVersion {
    fn type_string(&self) -> &'static str {
        "AWS::ElasticBeanstalk::ApplicationVersion"
    }

    fn properties(&self) -> Value {
        json!({
            "ApplicationName": self.application,
            "Description": self.description,
            "SourceBundle": { "S3Bucket": self.bucket, "S3Key": self.key },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionSetting {
    pub namespace: String,
    pub option_name: String,
    pub value: Value,
}

impl OptionSetting {
    pub fn new(namespace: &str, option_name: &str, value: impl Into<Value>) -> Self {
        Self {
            namespace: namespace.to_string(),
            option_name: option_name.to_string(),
            value: value.into(),
        }
    }
}

pub struct Environment {
    pub application: Value,
    pub environment_name: String,
    pub cname_prefix: String,
    pub solution_stack: String,
    pub version_label: Value,
    pub option_settings: Vec<OptionSetting>,
}

impl CfnResource for Environment {
    fn type_string(&self) -> &'static str {
        "AWS::ElasticBeanstalk::Environment"
    }

    fn properties(&self) -> Value {
        let settings: Vec<Value> = self
            .option_settings
            .iter()
            .map(|s| json!({ "Namespace": s.namespace, "OptionName": s.option_name, "Value": s.value }))
            .collect();
        json!({
            "ApplicationName": self.application,
            "EnvironmentName": self.environment_name,
            "CNAMEPrefix": self.cname_prefix,
            "SolutionStackName": self.solution_stack,
            "VersionLabel": self.version_label,
            "OptionSettings": settings,
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.solution_stack.is_empty() {
            return Err("Environment needs a solution stack".to_string());
        }
        let mut seen = std::collections::BTreeSet::new();
        for s in self.option_settings.iter() {
            if !seen.insert((&s.namespace, &s.option_name)) {
                return Err(format!("Option {}:{} is set twice", s.namespace, s.option_name));
            }
        }
        Ok(())
    }
}

/// role assumed by the environment's EC2 instances.
pub struct InstanceRole {
    /// secrets the application may read, eg: the database master secret.
    pub readable_secrets: Vec<Value>,
}

impl CfnResource for InstanceRole {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "ec2.amazonaws.com" },
                    "Action": ["sts:AssumeRole"],
                }]
            },
            "ManagedPolicyArns": [
                "arn:aws:iam::aws:policy/AWSElasticBeanstalkWebTier",
            ],
        });
        if !self.readable_secrets.is_empty() {
            props["Policies"] = json!([{
                "PolicyName": "read_application_secrets",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": "secretsmanager:GetSecretValue",
                        "Resource": self.readable_secrets,
                    }]
                }
            }]);
        }
        props
    }
}

pub struct InstanceProfile {
    pub role_logical_id: String,
}

impl CfnResource for InstanceProfile {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::InstanceProfile"
    }

    fn properties(&self) -> Value {
        json!({ "Roles": [get_ref(&self.role_logical_id)] })
    }
}

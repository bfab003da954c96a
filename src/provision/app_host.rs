use std::collections::BTreeMap;

use aws_cfn_stack::{get_att, get_ref, Input, StackSpec};
use aws_regions::elastic_beanstalk_cname;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::certificate::Certificates;
use super::database::DatabaseHandles;
use super::{require_output, ObjectStore, StackDeployer};
use crate::bundle::{bundle_app, Bundle};
use crate::config::{DeploymentConfig, ListenerProtocol};
use crate::error::{DeployError, Result};
use crate::hooks::run_command;
use crate::resources::beanstalk::{Application, ApplicationVersion, Environment, InstanceProfile, InstanceRole, OptionSetting};
use crate::resources::s3_bucket::ArtifactBucket;

const ENVIRONMENT_NS: &str = "aws:elasticbeanstalk:environment";
const LAUNCH_NS: &str = "aws:autoscaling:launchconfiguration";
const PROPERTIES_NS: &str = "aws:elasticbeanstalk:application:environment";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppHandles {
    pub environment_name: String,
    /// `{cname_prefix}.{region}.elasticbeanstalk.com`
    pub cname: String,
    pub endpoint_url: String,
    pub version_label: String,
    pub artifact_key: String,
}

pub fn artifacts_stack(config: &DeploymentConfig) -> Result<StackSpec> {
    let mut input = Input::new(format!("Application bundles for {}", config.app.app_name));
    input.resource("ArtifactBucket", ArtifactBucket);
    input.output("ArtifactBucketName", "bucket holding application bundles", get_ref("ArtifactBucket"));
    Ok(StackSpec::new(&config.stack_name("artifacts"), &config.region, input.into_template()?)?)
}

pub async fn provision_artifacts(deployer: &dyn StackDeployer, config: &DeploymentConfig) -> Result<String> {
    let spec = artifacts_stack(config)?;
    let outputs = deployer.deploy(&spec).await?;
    require_output(&spec.name, &outputs, "ArtifactBucketName")
}

pub fn listener_namespace(port: u16) -> String {
    format!("aws:elbv2:listener:{port}")
}

pub fn option_settings(config: &DeploymentConfig) -> Vec<OptionSetting> {
    let app = &config.app;
    let listener = listener_namespace(app.listener_port);
    let mut settings = vec![
        OptionSetting::new(ENVIRONMENT_NS, "EnvironmentType", "LoadBalanced"),
        OptionSetting::new(ENVIRONMENT_NS, "LoadBalancerType", "application"),
        OptionSetting::new(LAUNCH_NS, "InstanceType", app.instance_type.as_str()),
        OptionSetting::new(LAUNCH_NS, "IamInstanceProfile", get_ref("InstanceProfile")),
        OptionSetting::new(LAUNCH_NS, "SecurityGroups", get_ref("AppSecurityGroupId")),
        OptionSetting::new(&listener, "ListenerEnabled", "true"),
        OptionSetting::new(&listener, "Protocol", app.listener_protocol.as_str()),
    ];
    if app.listener_protocol == ListenerProtocol::Https {
        settings.push(OptionSetting::new(&listener, "SSLCertificateArns", get_ref("CertificateArn")));
    }

    let mut properties: BTreeMap<String, Value> =
        app.environment.iter().map(|(k, v)| (k.clone(), Value::from(v.as_str()))).collect();
    properties.insert("RDS_HOSTNAME".into(), get_ref("DatabaseHost"));
    properties.insert("RDS_PORT".into(), get_ref("DatabasePort"));
    properties.insert("RDS_DB_NAME".into(), Value::from(config.database.db_name.as_str()));
    properties.insert("RDS_USERNAME".into(), Value::from(config.database.master_username.as_str()));
    properties.insert("RDS_SECRET_ARN".into(), get_ref("DatabaseSecretArn"));
    settings.extend(properties.into_iter().map(|(k, v)| OptionSetting::new(PROPERTIES_NS, &k, v)));
    settings
}

/// Everything that changes between deploys comes in through `ArtifactKey`,
/// so the template itself stays the same for a given configuration.
pub fn app_stack(config: &DeploymentConfig) -> Result<StackSpec> {
    let app = &config.app;
    let mut input = Input::new(format!("{} environment {}", app.app_name, app.env_name));
    input.parameter("ArtifactBucket", "bucket holding application bundles");
    input.parameter("ArtifactKey", "key of the bundle to deploy");
    input.parameter("AppSecurityGroupId", "security group allowed to reach the database");
    input.parameter("DatabaseHost", "database endpoint address");
    input.parameter("DatabasePort", "database endpoint port");
    input.parameter("DatabaseSecretArn", "database master user secret");
    if app.listener_protocol == ListenerProtocol::Https {
        input.parameter("CertificateArn", "regional certificate for the listener");
    }
    input.resource("Application", Application { name: app.app_name.clone(), description: config.backend_domain() });
    input.resource(
        "ApplicationVersion",
        ApplicationVersion {
            application: get_ref("Application"),
            bucket: get_ref("ArtifactBucket"),
            key: get_ref("ArtifactKey"),
            description: "deployed by tierdeploy".into(),
        },
    );
    input.resource("InstanceRole", InstanceRole { readable_secrets: vec![get_ref("DatabaseSecretArn")] });
    input.resource("InstanceProfile", InstanceProfile { role_logical_id: "InstanceRole".into() });
    input.resource(
        "Environment",
        Environment {
            application: get_ref("Application"),
            environment_name: app.env_name.clone(),
            cname_prefix: app.cname_prefix(),
            solution_stack: app.solution_stack.clone(),
            version_label: get_ref("ApplicationVersion"),
            option_settings: option_settings(config),
        },
    );
    input.output("EnvironmentName", "elastic beanstalk environment", get_ref("Environment"));
    input.output("EndpointURL", "load balancer address", get_att("Environment", "EndpointURL"));
    Ok(StackSpec::new(&config.stack_name("app"), &config.region, input.into_template()?)?)
}

async fn bundle(config: &DeploymentConfig) -> Result<Bundle> {
    let app_path = config.app.app_path.clone();
    let app_name = config.app.app_name.clone();
    let mysql_family = config.database.is_mysql_family();
    let path = app_path.clone();
    tokio::task::spawn_blocking(move || bundle_app(&path, &app_name, mysql_family))
        .await
        .map_err(|e| DeployError::Bundle { path: app_path, message: e.to_string() })?
}

pub async fn provision_app(
    deployer: &dyn StackDeployer,
    store: &dyn ObjectStore,
    config: &DeploymentConfig,
    certificates: &Certificates,
    database: &DatabaseHandles,
    artifact_bucket: &str,
) -> Result<AppHandles> {
    if let Some(command) = &config.app.pre_deploy_command {
        run_command(command, &config.app.app_path).await?;
    }
    let bundle = bundle(config).await?;
    store.put_object(artifact_bucket, &bundle.key, bundle.bytes, "application/zip").await?;
    info!(bucket = %artifact_bucket, key = %bundle.key, "Uploaded application bundle");

    let mut spec = app_stack(config)?
        .with_parameter("ArtifactBucket", artifact_bucket)
        .with_parameter("ArtifactKey", bundle.key.as_str())
        .with_parameter("AppSecurityGroupId", database.app_security_group_id.as_str())
        .with_parameter("DatabaseHost", database.host.as_str())
        .with_parameter("DatabasePort", database.port.as_str())
        .with_parameter("DatabaseSecretArn", database.secret_arn.as_str());
    match config.app.listener_protocol {
        ListenerProtocol::Https => spec = spec.with_parameter("CertificateArn", certificates.regional_arn.as_str()),
        ListenerProtocol::Http => warn!(port = config.app.listener_port, "Listener is plain HTTP, traffic to the backend is not encrypted"),
    }

    info!(environment = %config.app.env_name, version = %bundle.version_label, "Deploying application");
    let outputs = deployer.deploy(&spec).await?;
    let handles = AppHandles {
        environment_name: require_output(&spec.name, &outputs, "EnvironmentName")?,
        cname: elastic_beanstalk_cname(&config.app.cname_prefix(), &config.region),
        endpoint_url: require_output(&spec.name, &outputs, "EndpointURL")?,
        version_label: bundle.version_label,
        artifact_key: bundle.key,
    };
    info!(cname = %handles.cname, "Application is ready");
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::fakes::{FakeDeployer, FakeStore};
    use serde_json::json;

    fn config(app_path: &std::path::Path) -> DeploymentConfig {
        let mut config = DeploymentConfig::default();
        config.domain_name = "example.com".into();
        config.hosted_zone_id = "Z1".into();
        config.app.app_path = app_path.to_path_buf();
        config.app.environment.insert("DJANGO_SETTINGS_MODULE".into(), "mysite.settings".into());
        config
    }

    fn database() -> DatabaseHandles {
        DatabaseHandles {
            host: "db.local".into(),
            port: "3306".into(),
            db_name: "appdb".into(),
            username: "admin".into(),
            secret_arn: "arn:secret".into(),
            app_security_group_id: "sg-123".into(),
        }
    }

    fn certs() -> Certificates {
        Certificates { edge_arn: "arn:edge".into(), regional_arn: "arn:regional".into() }
    }

    #[test]
    fn https_listener_uses_the_certificate() {
        let config = config(std::path::Path::new("."));
        let spec = app_stack(&config).unwrap();
        let env = &spec.template.resources["Environment"].properties;
        let settings = env["OptionSettings"].as_array().unwrap();
        let find = |ns: &str, name: &str| {
            settings.iter().find(|s| s["Namespace"] == ns && s["OptionName"] == name).map(|s| s["Value"].clone())
        };
        assert_eq!(find("aws:elbv2:listener:443", "Protocol"), Some(json!("HTTPS")));
        assert_eq!(find("aws:elbv2:listener:443", "SSLCertificateArns"), Some(json!({ "Ref": "CertificateArn" })));
        assert_eq!(find(ENVIRONMENT_NS, "EnvironmentType"), Some(json!("LoadBalanced")));
        assert_eq!(find(PROPERTIES_NS, "RDS_HOSTNAME"), Some(json!({ "Ref": "DatabaseHost" })));
        assert_eq!(find(PROPERTIES_NS, "DJANGO_SETTINGS_MODULE"), Some(json!("mysite.settings")));
        assert_eq!(env["CNAMEPrefix"], "web-env");
        assert_eq!(env["VersionLabel"], json!({ "Ref": "ApplicationVersion" }));
        assert!(spec.template.parameters.contains_key("CertificateArn"));
    }

    #[test]
    fn http_listener_has_no_certificate() {
        let mut config = config(std::path::Path::new("."));
        config.app.listener_protocol = ListenerProtocol::Http;
        config.app.listener_port = 80;
        let spec = app_stack(&config).unwrap();
        assert!(!spec.template.parameters.contains_key("CertificateArn"));
        let body = spec.template_body().unwrap();
        assert!(body.contains("aws:elbv2:listener:80"));
        assert!(!body.contains("SSLCertificateArns"));
    }

    #[tokio::test]
    async fn uploads_bundle_then_deploys_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "app = None\n").unwrap();
        let config = config(dir.path());
        let deployer = FakeDeployer::default();
        let store = FakeStore::default();
        let handles = provision_app(&deployer, &store, &config, &certs(), &database(), "artifacts-bucket").await.unwrap();

        assert_eq!(store.keys("artifacts-bucket"), vec![handles.artifact_key.clone()]);
        assert_eq!(handles.cname, "web-env.us-east-1.elasticbeanstalk.com");
        let spec = deployer.spec("web-app-app").unwrap();
        assert_eq!(spec.parameters["ArtifactKey"], handles.artifact_key);
        assert_eq!(spec.parameters["CertificateArn"], "arn:regional");
        assert_eq!(spec.parameters["AppSecurityGroupId"], "sg-123");
    }

    #[tokio::test]
    async fn failing_pre_deploy_command_stops_the_deploy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.app.pre_deploy_command = Some("exit 1".into());
        let deployer = FakeDeployer::default();
        let store = FakeStore::default();
        let result = provision_app(&deployer, &store, &config, &certs(), &database(), "b").await;
        assert!(matches!(result, Err(DeployError::Command { .. })));
        assert!(deployer.names().is_empty());
    }
}

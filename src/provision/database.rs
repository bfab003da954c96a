use aws_cfn_stack::{get_att, Input, StackSpec};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{require_output, StackDeployer};
use crate::config::DeploymentConfig;
use crate::error::Result;
use crate::resources::rds::{DbInstance, Ingress, IngressSource, SecurityGroup};

const APP_GROUP: &str = "AppSecurityGroup";
const DATABASE_GROUP: &str = "DatabaseSecurityGroup";
const DATABASE: &str = "Database";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseHandles {
    pub host: String,
    pub port: String,
    pub db_name: String,
    pub username: String,
    /// Secrets Manager secret holding the generated master password.
    pub secret_arn: String,
    /// attached to the application host so it can reach the database.
    pub app_security_group_id: String,
}

/// settings that open the database wider than the application host.
pub fn network_warnings(config: &DeploymentConfig) -> Vec<String> {
    let db = &config.database;
    let mut warnings = vec![];
    for cidr in db.allowed_cidrs.iter() {
        if cidr == "0.0.0.0/0" || cidr == "::/0" {
            warnings.push(format!("Database port {} is open to every address ({cidr})", db.port));
        }
    }
    if db.public_access {
        warnings.push(format!("Database {} is publicly accessible", db.db_name));
    }
    warnings
}

pub fn database_stack(config: &DeploymentConfig) -> Result<StackSpec> {
    let db = &config.database;
    let mut ingress = vec![Ingress {
        port: db.port,
        source: IngressSource::Group(get_att(APP_GROUP, "GroupId")),
        description: "application host".into(),
    }];
    ingress.extend(db.allowed_cidrs.iter().map(|cidr| Ingress {
        port: db.port,
        source: IngressSource::Cidr(cidr.clone()),
        description: "operator network".into(),
    }));

    let mut input = Input::new(format!("{} database for {}", db.engine, config.app.app_name));
    input.resource(
        APP_GROUP,
        SecurityGroup { description: format!("{} application hosts", config.app.app_name), ingress: vec![] },
    );
    input.resource(
        DATABASE_GROUP,
        SecurityGroup { description: format!("{} database access", config.app.app_name), ingress },
    );
    input.resource(
        DATABASE,
        DbInstance {
            db_name: db.db_name.clone(),
            engine: db.engine.clone(),
            engine_version: db.engine_version.clone(),
            instance_class: db.instance_class.clone(),
            storage_gb: db.storage_gb,
            master_username: db.master_username.clone(),
            port: db.port,
            public_access: db.public_access,
            backup_retention_days: db.backup_retention_days,
            security_groups: vec![get_att(DATABASE_GROUP, "GroupId")],
        },
    );
    input.output("DatabaseHost", "endpoint address", get_att(DATABASE, "Endpoint.Address"));
    input.output("DatabasePort", "endpoint port", get_att(DATABASE, "Endpoint.Port"));
    input.output("DatabaseSecretArn", "master user secret", get_att(DATABASE, "MasterUserSecret.SecretArn"));
    input.output("AppSecurityGroupId", "group for application hosts", get_att(APP_GROUP, "GroupId"));
    Ok(StackSpec::new(&config.stack_name("database"), &config.region, input.into_template()?)?)
}

pub async fn provision_database(deployer: &dyn StackDeployer, config: &DeploymentConfig) -> Result<DatabaseHandles> {
    for warning in network_warnings(config) {
        warn!("{warning}");
    }
    let spec = database_stack(config)?;
    info!(stack = %spec.name, engine = %config.database.engine, class = %config.database.instance_class, "Provisioning database");
    let outputs = deployer.deploy(&spec).await?;
    let handles = DatabaseHandles {
        host: require_output(&spec.name, &outputs, "DatabaseHost")?,
        port: require_output(&spec.name, &outputs, "DatabasePort")?,
        db_name: config.database.db_name.clone(),
        username: config.database.master_username.clone(),
        secret_arn: require_output(&spec.name, &outputs, "DatabaseSecretArn")?,
        app_security_group_id: require_output(&spec.name, &outputs, "AppSecurityGroupId")?,
    };
    info!(host = %handles.host, port = %handles.port, "Database is ready");
    Ok(handles)
}

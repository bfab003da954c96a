use aws_cfn_stack::CfnResource;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum IngressSource {
    /// IPv4 or IPv6 CIDR
    Cidr(String),
    /// id of another security group
    Group(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ingress {
    pub port: u16,
    pub source: IngressSource,
    pub description: String,
}

impl Ingress {
    fn to_value(&self) -> Value {
        let mut rule = json!({
            "IpProtocol": "tcp",
            "FromPort": self.port,
            "ToPort": self.port,
            "Description": self.description,
        });
        match &self.source {
            IngressSource::Cidr(cidr) if cidr.contains(':') => rule["CidrIpv6"] = json!(cidr),
            IngressSource::Cidr(cidr) => rule["CidrIp"] = json!(cidr),
            IngressSource::Group(id) => rule["SourceSecurityGroupId"] = id.clone(),
        }
        rule
    }
}

/// security group in the account's default VPC.
pub struct SecurityGroup {
    pub description: String,
    pub ingress: Vec<Ingress>,
}

impl CfnResource for SecurityGroup {
    fn type_string(&self) -> &'static str {
        "AWS::EC2::SecurityGroup"
    }

    fn properties(&self) -> Value {
        let mut props = json!({ "GroupDescription": self.description });
        if !self.ingress.is_empty() {
            props["SecurityGroupIngress"] = self.ingress.iter().map(Ingress::to_value).collect();
        }
        props
    }

    fn validate(&self) -> Result<(), String> {
        if self.description.is_empty() {
            return Err("Security groups need a description".to_string());
        }
        Ok(())
    }
}

/// A database instance whose master password is generated and kept in Secrets Manager.
/// Replacing or deleting it leaves a final snapshot behind.
pub struct DbInstance {
    pub db_name: String,
    pub engine: String,
    pub engine_version: Option<String>,
    pub instance_class: String,
    pub storage_gb: u32,
    pub master_username: String,
    pub port: u16,
    pub public_access: bool,
    pub backup_retention_days: u32,
    pub security_groups: Vec<Value>,
}

impl CfnResource for DbInstance {
    fn type_string(&self) -> &'static str {
        "AWS::RDS::DBInstance"
    }

    fn properties(&self) -> Value {
        let mut props = json!({
            "DBName": self.db_name,
            "Engine": self.engine,
            "DBInstanceClass": self.instance_class,
            "AllocatedStorage": self.storage_gb.to_string(),
            "StorageType": "gp2",
            "MasterUsername": self.master_username,
            "ManageMasterUserPassword": true,
            "Port": self.port.to_string(),
            "PubliclyAccessible": self.public_access,
            "BackupRetentionPeriod": self.backup_retention_days,
            "VPCSecurityGroups": self.security_groups,
        });
        if let Some(version) = &self.engine_version {
            props["EngineVersion"] = json!(version);
        }
        props
    }

    fn validate(&self) -> Result<(), String> {
        if self.master_username.is_empty() || !self.master_username.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(format!("Invalid master username {:?}", self.master_username));
        }
        if !self.instance_class.starts_with("db.") {
            return Err(format!("Invalid instance class {:?}\nMust start with `db.`", self.instance_class));
        }
        if self.security_groups.is_empty() {
            return Err("Database needs at least one security group".to_string());
        }
        Ok(())
    }

    fn deletion_policy(&self) -> Option<&'static str> {
        Some("Snapshot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_cfn_stack::get_att;

    #[test]
    fn ingress_picks_the_right_source_field() {
        let group = SecurityGroup {
            description: "database".into(),
            ingress: vec![
                Ingress { port: 3306, source: IngressSource::Group(get_att("AppSecurityGroup", "GroupId")), description: "app".into() },
                Ingress { port: 3306, source: IngressSource::Cidr("203.0.113.0/24".into()), description: "office".into() },
                Ingress { port: 3306, source: IngressSource::Cidr("2001:db8::/32".into()), description: "office v6".into() },
            ],
        };
        let rules = group.properties()["SecurityGroupIngress"].clone();
        assert_eq!(rules[0]["SourceSecurityGroupId"], get_att("AppSecurityGroup", "GroupId"));
        assert_eq!(rules[1]["CidrIp"], "203.0.113.0/24");
        assert_eq!(rules[2]["CidrIpv6"], "2001:db8::/32");
        assert_eq!(rules[1]["FromPort"], 3306);
    }

    #[test]
    fn database_manages_its_own_password() {
        let db = DbInstance {
            db_name: "appdb".into(),
            engine: "mariadb".into(),
            engine_version: None,
            instance_class: "db.t3.medium".into(),
            storage_gb: 20,
            master_username: "admin".into(),
            port: 3306,
            public_access: false,
            backup_retention_days: 7,
            security_groups: vec![get_att("DatabaseSecurityGroup", "GroupId")],
        };
        let props = db.properties();
        assert_eq!(props["ManageMasterUserPassword"], true);
        assert!(props.get("MasterUserPassword").is_none());
        assert_eq!(props["AllocatedStorage"], "20");
        assert_eq!(db.deletion_policy(), Some("Snapshot"));
        assert!(db.validate().is_ok());
    }
}

//! Deployment configuration.
//!
//! Priority order, lowest first:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, else `./tierdeploy.toml` when present)
//! 3. dotenv file
//! 4. Process environment

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_cfn_stack::client::WaitOptions;
use aws_cfn_stack::validate_stack_name;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};
use crate::resources::s3_bucket::validate_bucket_name;
use crate::variables::Variables;

pub const CONFIG_FILE: &str = "tierdeploy.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationMethod {
    Dns,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    Disabled,
    Optimized,
}

impl CachePolicy {
    /// ids of the AWS managed cache policies.
    /// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html
    pub fn id(&self) -> &'static str {
        match self {
            CachePolicy::Disabled => "4135ea2d-6df8-44a3-9df3-4b5a84be39ad",
            CachePolicy::Optimized => "658327ea-f89d-4fab-a63d-7e88639e58f6",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Https,
    Http,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Https => "HTTPS",
            ListenerProtocol::Http => "HTTP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    pub validation_method: ValidationMethod,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self { validation_method: ValidationMethod::Dns }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// directory whose contents are published to the bucket root.
    pub build_path: PathBuf,
    /// served for `/` and for every path that is not an object, so client-side routing works.
    pub index_document: String,
    pub default_root_object: String,
    pub cache_policy: CachePolicy,
    pub origin_request_policy_id: Option<String>,
    pub response_headers_policy_id: Option<String>,
    /// run before publishing, from the parent of `build_path`.
    pub build_command: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            build_path: PathBuf::from("build"),
            index_document: "index.html".into(),
            default_root_object: "index.html".into(),
            cache_policy: CachePolicy::Disabled,
            origin_request_policy_id: None,
            response_headers_policy_id: None,
            build_command: None,
        }
    }
}

impl SiteConfig {
    /// always the index document.
    pub fn error_document(&self) -> &str {
        &self.index_document
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app_name: String,
    pub env_name: String,
    pub app_path: PathBuf,
    pub solution_stack: String,
    pub instance_type: String,
    pub listener_port: u16,
    pub listener_protocol: ListenerProtocol,
    /// extra environment properties, e.g. DJANGO_SETTINGS_MODULE.
    pub environment: BTreeMap<String, String>,
    pub pre_deploy_command: Option<String>,
    pub cname_prefix: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "web-app".into(),
            env_name: "web-env".into(),
            app_path: PathBuf::from("."),
            solution_stack: "64bit Amazon Linux 2023 v4.3.0 running Python 3.11".into(),
            instance_type: "t2.micro".into(),
            listener_port: 443,
            listener_protocol: ListenerProtocol::Https,
            environment: BTreeMap::new(),
            pre_deploy_command: None,
            cname_prefix: None,
        }
    }
}

impl AppConfig {
    pub fn cname_prefix(&self) -> String {
        self.cname_prefix.clone().unwrap_or_else(|| self.env_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_name: String,
    pub engine: String,
    pub engine_version: Option<String>,
    pub instance_class: String,
    pub storage_gb: u32,
    pub public_access: bool,
    pub port: u16,
    pub master_username: String,
    pub backup_retention_days: u32,
    /// operator networks allowed to reach the database, besides the application host.
    pub allowed_cidrs: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_name: "appdb".into(),
            engine: "mariadb".into(),
            engine_version: None,
            instance_class: "db.t3.medium".into(),
            storage_gb: 20,
            public_access: false,
            port: 3306,
            master_username: "admin".into(),
            backup_retention_days: 7,
            allowed_cidrs: vec![],
        }
    }
}

impl DatabaseConfig {
    pub fn is_mysql_family(&self) -> bool {
        matches!(self.engine.as_str(), "mariadb" | "mysql" | "aurora-mysql")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub record_type: RecordType,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self { record_type: RecordType::A }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self { timeout_secs: 3600, poll_interval_ms: 5000 }
    }
}

impl WaitConfig {
    pub fn options(&self) -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            watch: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into(), dir: PathBuf::from("logs") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub domain_name: String,
    pub frontend_subdomain: String,
    pub backend_subdomain: String,
    pub region: String,
    /// the Route 53 zone that holds `domain_name`.
    pub hosted_zone_id: String,
    pub stack_prefix: Option<String>,
    pub certificate: CertificateConfig,
    pub site: SiteConfig,
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub dns: DnsConfig,
    pub wait: WaitConfig,
    pub log: LogConfig,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            domain_name: String::new(),
            frontend_subdomain: "www".into(),
            backend_subdomain: "api".into(),
            region: "us-east-1".into(),
            hosted_zone_id: String::new(),
            stack_prefix: None,
            certificate: Default::default(),
            site: Default::default(),
            app: Default::default(),
            database: Default::default(),
            dns: Default::default(),
            wait: Default::default(),
            log: Default::default(),
        }
    }
}

impl DeploymentConfig {
    pub fn frontend_domain(&self) -> String {
        format!("{}.{}", self.frontend_subdomain, self.domain_name)
    }

    pub fn backend_domain(&self) -> String {
        format!("{}.{}", self.backend_subdomain, self.domain_name)
    }

    pub fn bucket_name(&self) -> String {
        self.frontend_domain()
    }

    pub fn stack_prefix(&self) -> &str {
        self.stack_prefix.as_deref().unwrap_or(&self.app.app_name)
    }

    pub fn stack_name(&self, component: &str) -> String {
        format!("{}-{}", self.stack_prefix(), component)
    }

    /// the zone id without the `/hostedzone/` prefix the console shows.
    pub fn hosted_zone_id(&self) -> &str {
        self.hosted_zone_id.trim_start_matches("/hostedzone/")
    }

    pub fn apply_env_overrides(&mut self, vars: &Variables) -> Result<()> {
        let set = |target: &mut String, key: &str| {
            if let Some(v) = vars.get(key) {
                *target = v.to_string();
            }
        };
        set(&mut self.domain_name, "DOMAIN_NAME");
        set(&mut self.frontend_subdomain, "FRONTEND_SUBDOMAIN");
        set(&mut self.backend_subdomain, "BACKEND_SUBDOMAIN");
        set(&mut self.region, "AWS_REGION");
        set(&mut self.hosted_zone_id, "HOSTED_ZONE_ID");
        set(&mut self.app.app_name, "EB_APP_NAME");
        set(&mut self.app.env_name, "EB_ENV_NAME");
        set(&mut self.database.db_name, "DB_NAME");
        set(&mut self.database.instance_class, "DB_INSTANCE_CLASS");
        if let Some(v) = vars.get("REACT_BUILD_PATH") {
            self.site.build_path = PathBuf::from(v);
        }
        if let Some(v) = vars.get("APP_PATH") {
            self.app.app_path = PathBuf::from(v);
        }
        if let Some(v) = vars.get("DB_STORAGE_SIZE") {
            self.database.storage_gb = v
                .parse()
                .map_err(|_| DeployError::config(format!("DB_STORAGE_SIZE must be a number of GB, got {v:?}")))?;
        }
        if let Some(v) = vars.get("DB_PUBLIC_ACCESS") {
            self.database.public_access = parse_bool(v)
                .ok_or_else(|| DeployError::config(format!("DB_PUBLIC_ACCESS must be true or false, got {v:?}")))?;
        }
        if let Some(v) = vars.get("DB_ALLOWED_CIDRS") {
            self.database.allowed_cidrs = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain_name.is_empty() {
            return Err(DeployError::config("Must provide a domain name (DOMAIN_NAME)"));
        }
        if !self.domain_name.contains('.') || self.domain_name.ends_with('.') {
            return Err(DeployError::config(format!("{:?} is not a fully qualified domain name", self.domain_name)));
        }
        for (what, label) in [("frontend", &self.frontend_subdomain), ("backend", &self.backend_subdomain)] {
            if !is_dns_label(label) {
                return Err(DeployError::config(format!("Invalid {what} subdomain {label:?}")));
            }
        }
        if self.frontend_subdomain == self.backend_subdomain {
            return Err(DeployError::config("Frontend and backend subdomains must differ"));
        }
        aws_regions::verify_region(&self.region).map_err(DeployError::Config)?;
        if self.hosted_zone_id().is_empty() {
            return Err(DeployError::config("Must provide the hosted zone id of the domain (HOSTED_ZONE_ID)"));
        }
        validate_bucket_name(&self.bucket_name()).map_err(DeployError::Config)?;
        if self.certificate.validation_method != ValidationMethod::Dns {
            return Err(DeployError::config("Only DNS certificate validation can be automated"));
        }
        validate_stack_name(&self.stack_name("edge-certificate")).map_err(|e| DeployError::config(e.to_string()))?;

        if self.site.index_document.is_empty() || self.site.index_document.starts_with('/') {
            return Err(DeployError::config(format!("Invalid index document {:?}", self.site.index_document)));
        }

        if self.app.app_name.is_empty() || self.app.app_name.len() > 100 {
            return Err(DeployError::config("Application name must be between 1 and 100 characters"));
        }
        for (what, name) in [("environment name", self.app.env_name.clone()), ("CNAME prefix", self.app.cname_prefix())] {
            if !is_beanstalk_name(&name) {
                return Err(DeployError::config(format!(
                    "Invalid {what} {name:?}\nMust be 4 to 40 letters, digits and hyphens, and cannot start or end with a hyphen"
                )));
            }
        }
        if self.app.listener_port == 0 {
            return Err(DeployError::config("Listener port cannot be 0"));
        }

        validate_db_name(&self.database.db_name).map_err(DeployError::Config)?;
        if !(20..=65536).contains(&self.database.storage_gb) {
            return Err(DeployError::config(format!(
                "Invalid storage size {} GB\nMust be between 20 and 65536",
                self.database.storage_gb
            )));
        }
        if self.database.port == 0 {
            return Err(DeployError::config("Database port cannot be 0"));
        }
        for cidr in self.database.allowed_cidrs.iter() {
            validate_cidr(cidr).map_err(DeployError::Config)?;
        }
        if self.wait.poll_interval_ms == 0 {
            return Err(DeployError::config("Poll interval cannot be 0"));
        }
        Ok(())
    }
}

pub fn load(config_path: Option<&Path>, vars: &Variables) -> Result<DeploymentConfig> {
    let mut config = match config_path {
        Some(path) => read_file(path)?,
        None if Path::new(CONFIG_FILE).exists() => read_file(Path::new(CONFIG_FILE))?,
        None => DeploymentConfig::default(),
    };
    config.apply_env_overrides(vars)?;
    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<DeploymentConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DeployError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| DeployError::config(format!("Failed to parse config file {}: {}", path.display(), e)))
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}

fn is_beanstalk_name(name: &str) -> bool {
    (4..=40).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

pub fn validate_db_name(name: &str) -> std::result::Result<(), String> {
    let restriction = "Must start with a letter, contain only letters and digits, and be at most 63 characters";
    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(format!("Invalid database name {name:?}\n{restriction}")),
    }
    if name.len() > 63 || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Invalid database name {name:?}\n{restriction}"));
    }
    Ok(())
}

pub fn validate_cidr(cidr: &str) -> std::result::Result<(), String> {
    let invalid = || format!("Invalid CIDR {cidr:?}");
    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        let process = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Variables::from_maps(HashMap::new(), process)
    }

    fn valid() -> DeploymentConfig {
        let mut config = DeploymentConfig::default();
        config.domain_name = "example.com".into();
        config.hosted_zone_id = "Z123".into();
        config
    }

    #[test]
    fn bucket_is_named_after_the_frontend_domain() {
        let mut config = DeploymentConfig::default();
        config
            .apply_env_overrides(&vars(&[("DOMAIN_NAME", "example.com"), ("FRONTEND_SUBDOMAIN", "www"), ("HOSTED_ZONE_ID", "Z1")]))
            .unwrap();
        config.validate().unwrap();
        assert_eq!(config.bucket_name(), "www.example.com");
        assert_eq!(config.dns.record_type.as_str(), "A");
    }

    #[test]
    fn error_document_is_the_index_document() {
        let mut config = valid();
        config.site.index_document = "app.html".into();
        assert_eq!(config.site.error_document(), "app.html");
    }

    #[test]
    fn env_overrides_parse_types() {
        let mut config = valid();
        config
            .apply_env_overrides(&vars(&[
                ("DB_STORAGE_SIZE", "50"),
                ("DB_PUBLIC_ACCESS", "yes"),
                ("DB_ALLOWED_CIDRS", "10.0.0.0/16, 203.0.113.7/32"),
                ("EB_APP_NAME", "ra-app"),
            ]))
            .unwrap();
        assert_eq!(config.database.storage_gb, 50);
        assert!(config.database.public_access);
        assert_eq!(config.database.allowed_cidrs, vec!["10.0.0.0/16", "203.0.113.7/32"]);
        assert_eq!(config.stack_name("site"), "ra-app-site");

        let mut config = valid();
        assert!(config.apply_env_overrides(&vars(&[("DB_STORAGE_SIZE", "lots")])).is_err());
        assert!(config.apply_env_overrides(&vars(&[("DB_PUBLIC_ACCESS", "maybe")])).is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(valid().validate().is_ok());
        assert!(DeploymentConfig::default().validate().is_err());

        let mut config = valid();
        config.region = "mars-1".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.hosted_zone_id = "".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.certificate.validation_method = ValidationMethod::Email;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.database.db_name = "my-db".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.database.storage_gb = 5;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.database.allowed_cidrs = vec!["10.0.0.0/40".into()];
        assert!(config.validate().is_err());

        let mut config = valid();
        config.app.env_name = "env".into();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.backend_subdomain = "www".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn hosted_zone_prefix_is_stripped() {
        let mut config = valid();
        config.hosted_zone_id = "/hostedzone/Z0123".into();
        assert_eq!(config.hosted_zone_id(), "Z0123");
    }

    #[test]
    fn cidrs_accept_both_families() {
        assert!(validate_cidr("0.0.0.0/0").is_ok());
        assert!(validate_cidr("::/0").is_ok());
        assert!(validate_cidr("2001:db8::/129").is_err());
        assert!(validate_cidr("10.0.0.1").is_err());
    }

    #[test]
    fn loads_toml_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tierdeploy.toml");
        std::fs::write(
            &path,
            r#"
domain_name = "ironcliff.ai"
frontend_subdomain = "ra"
backend_subdomain = "ra-api"
hosted_zone_id = "Z9"

[app]
app_name = "ra-app"
env_name = "ra-env"

[app.environment]
DJANGO_SETTINGS_MODULE = "mysite.settings"

[site]
cache_policy = "optimized"

[database]
db_name = "ra"
allowed_cidrs = ["198.51.100.0/24"]
"#,
        )
        .unwrap();
        let config = load(Some(&path), &vars(&[("AWS_REGION", "us-west-2")])).unwrap();
        assert_eq!(config.frontend_domain(), "ra.ironcliff.ai");
        assert_eq!(config.backend_domain(), "ra-api.ironcliff.ai");
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.site.cache_policy, CachePolicy::Optimized);
        assert_eq!(config.app.environment["DJANGO_SETTINGS_MODULE"], "mysite.settings");
        assert_eq!(config.database.instance_class, "db.t3.medium");
        assert!(load(Some(&dir.path().join("missing.toml")), &vars(&[])).is_err());
    }
}

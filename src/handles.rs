//! Identifiers handed back by AWS, cached between runs for `status`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provision::app_host::AppHandles;
use crate::provision::certificate::Certificates;
use crate::provision::database::DatabaseHandles;
use crate::provision::dns::DnsHandles;
use crate::provision::static_site::SiteHandles;

pub const STATE_DIR: &str = ".tierdeploy";
const HANDLES_FILE: &str = "handles.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceHandles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Certificates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteHandles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHandles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppHandles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsHandles>,
    #[serde(default)]
    pub updated_at: String,
}

impl ResourceHandles {
    pub fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(HANDLES_FILE)
    }

    /// an empty set when nothing was cached yet.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = Self::path(state_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(state_dir)?;
        std::fs::write(Self::path(state_dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// newer values win; components not touched by this run keep their cached handles.
    pub fn merge(&mut self, newer: ResourceHandles) {
        if newer.certificates.is_some() {
            self.certificates = newer.certificates;
        }
        if newer.site.is_some() {
            self.site = newer.site;
        }
        if newer.database.is_some() {
            self.database = newer.database;
        }
        if newer.artifact_bucket.is_some() {
            self.artifact_bucket = newer.artifact_bucket;
        }
        if newer.app.is_some() {
            self.app = newer.app;
        }
        if newer.dns.is_some() {
            self.dns = newer.dns;
        }
        self.updated_at = newer.updated_at;
    }
}

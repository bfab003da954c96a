use std::collections::HashMap;
use std::path::Path;

use crate::error::{DeployError, Result};

/// variables visible to the config loader: a dotenv file layered under the process environment.
#[derive(Debug, Default, Clone)]
pub struct Variables {
    dot_env: HashMap<String, String>,
    process: HashMap<String, String>,
}

impl Variables {
    pub fn from_process() -> Self {
        Self {
            dot_env: HashMap::new(),
            process: std::env::vars().collect(),
        }
    }

    pub fn from_maps(dot_env: HashMap<String, String>, process: HashMap<String, String>) -> Self {
        Self { dot_env, process }
    }

    pub fn with_dot_env(mut self, path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DeployError::config(format!("Failed to load .env file {}: {}", path.display(), e)))?;
        self.dot_env = parse_dot_env(&contents);
        Ok(self)
    }

    /// process environment wins over the dotenv file.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.process
            .get(key)
            .or_else(|| self.dot_env.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

pub fn parse_dot_env(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, val)) = line.split_once('=') {
            let val = val.trim();
            let val = val
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| val.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(val);
            map.insert(key.trim().to_string(), val.to_string());
        }
    }
    map
}

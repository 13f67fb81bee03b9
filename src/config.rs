use crate::error::GatewayError;
use crate::filter::Filter;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_names: Option<Vec<String>>,
    pub error_pages: Option<HashMap<u16, String>>,
    /// Directory served for paths no gateway claims (stylesheets and the like).
    pub static_root: Option<String>,
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,
}

/// One proxied CGI script, reachable under `path`.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Entry point every rewritten link points back to.
    pub path: String,
    pub script_filename: String,
    pub script_name: Option<String>,
    pub request_uri: String,
    pub document_root: Option<String>,
    /// Run the script through this program instead of executing it directly.
    pub interpreter: Option<String>,
    /// Pre-encoded query string kept on every rewritten URL and form.
    pub get: Option<String>,
    pub filter: Option<Filter>,
    #[serde(default)]
    pub highlight_rows: bool,
    #[serde(default = "default_lenient")]
    pub lenient_html: bool,
    pub title: Option<String>,
    pub stylesheet: Option<String>,
}

fn default_lenient() -> bool {
    true
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| GatewayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, GatewayError> {
        let config: Config = serde_yaml::from_str(content)?;
        for gateway in config.servers.iter().flat_map(|s| &s.gateways) {
            if let Some(filter) = &gateway.filter {
                filter.regex()?;
            }
        }
        Ok(config)
    }
}

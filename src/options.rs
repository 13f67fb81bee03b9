use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::filter::Filter;
use std::collections::HashMap;

/// Request details handed to a [`Gateway`](crate::gateway::Gateway).
///
/// Anything left `None` may still be filled from the [`RequestContext`]
/// when the child environment is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub script_filename: Option<String>,
    pub request_uri: Option<String>,
    /// Path of the proxying entry point.
    pub php_script: Option<String>,
    pub script_name: Option<String>,
    pub query_string: Option<String>,
    pub path_info: Option<String>,
    pub document_root: Option<String>,
    pub get: Option<String>,
    pub filter: Option<Filter>,
}

impl Options {
    pub fn from_config(cfg: &GatewayConfig) -> Self {
        Options {
            script_filename: Some(cfg.script_filename.clone()),
            request_uri: Some(cfg.request_uri.clone()),
            php_script: Some(cfg.path.clone()),
            script_name: cfg.script_name.clone(),
            document_root: cfg.document_root.clone(),
            get: cfg.get.clone(),
            filter: cfg.filter.clone(),
            ..Options::default()
        }
    }

    /// Folds the `href` query parameter into the options.
    ///
    /// The fragment is dropped, the remainder is appended to `request_uri`,
    /// and an embedded query string replaces `query_string`. Without an
    /// `href`, the requested path is the root.
    pub fn apply_href(&mut self, href: Option<&str>) {
        let Some(href) = href else {
            self.path_info = Some("/".to_string());
            return;
        };

        let href = href.split('#').next().unwrap_or_default();
        match self.request_uri.as_mut() {
            Some(uri) => uri.push_str(href),
            None => self.request_uri = Some(href.to_string()),
        }

        let mut parts = href.split('?');
        let path = parts.next().unwrap_or_default();
        if let Some(query) = parts.next() {
            self.query_string = Some(query.to_string());
        }
        self.path_info = Some(path.to_string());
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        let required = [
            ("SCRIPT_FILENAME", &self.script_filename),
            ("REQUEST_URI", &self.request_uri),
            ("PHP_SCRIPT", &self.php_script),
        ];
        for (name, value) in required {
            if value.as_deref().map_or(true, str::is_empty) {
                return Err(GatewayError::MissingOption(name));
            }
        }
        Ok(())
    }

    /// Value of a whitelisted CGI variable, by its environment name.
    pub fn var(&self, key: &str) -> Option<&str> {
        let value = match key {
            "DOCUMENT_ROOT" => &self.document_root,
            "SCRIPT_FILENAME" => &self.script_filename,
            "SCRIPT_NAME" => &self.script_name,
            "REQUEST_URI" => &self.request_uri,
            "QUERY_STRING" => &self.query_string,
            "PATH_INFO" => &self.path_info,
            _ => return None,
        };
        value.as_deref()
    }

    pub fn path_info(&self) -> &str {
        self.path_info.as_deref().unwrap_or_default()
    }
}

/// Read-only view of the HTTP request currently being served.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    vars: HashMap<String, String>,
    params: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Decodes `query` into the request parameters. The first occurrence of
    /// a key wins.
    pub fn with_query(mut self, query: &str) -> Self {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            self.params
                .entry(decode_component(key))
                .or_insert_with(|| decode_component(value));
        }
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

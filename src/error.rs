use crate::config::ServerConfig;
use crate::http::Response;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("CGI script '{}' not found", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("required option '{0}' not set")]
    MissingOption(&'static str),

    #[error("failed to run CGI script: {0}")]
    Spawn(#[from] io::Error),

    #[error("invalid filter pattern: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("failed to rewrite HTML: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),

    #[error("failed to read configuration {}: {source}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::ScriptNotFound(_) => 404,
            _ => 500,
        }
    }
}

pub fn generate_error_response(status_code: u16, server_cfg: &ServerConfig) -> Response {
    let mut res = Response::new(status_code);

    if let Some(path) = server_cfg.error_pages.as_ref().and_then(|p| p.get(&status_code)) {
        match fs::read(path) {
            Ok(content) => {
                res.set_body(content, "text/html");
                return res;
            }
            Err(e) => log::warn!("error page {} unreadable: {}", path, e),
        }
    }

    res.set_body(format!("<h1>{} Error</h1>", status_code).into_bytes(), "text/html");
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn server(error_pages: Option<HashMap<u16, String>>) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            ports: vec![8080],
            server_names: None,
            error_pages,
            static_root: None,
            gateways: Vec::new(),
        }
    }

    #[test]
    fn missing_script_maps_to_not_found() {
        let err = GatewayError::ScriptNotFound(PathBuf::from("/nope.cgi"));
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "CGI script '/nope.cgi' not found");
        assert_eq!(GatewayError::MissingOption("PHP_SCRIPT").status_code(), 500);
    }

    #[test]
    fn default_error_body() {
        let res = generate_error_response(500, &server(None));
        assert_eq!(res.status_code, 500);
        assert_eq!(res.body, b"<h1>500 Error</h1>");
        assert_eq!(res.headers.get("Content-Type").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn configured_error_page() {
        let mut page = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut page, b"<p>gone</p>").unwrap();
        let mut pages = HashMap::new();
        pages.insert(404, page.path().to_string_lossy().into_owned());

        let res = generate_error_response(404, &server(Some(pages)));
        assert_eq!(res.body, b"<p>gone</p>");
        assert_eq!(res.headers.get("Content-Length").map(String::as_str), Some("11"));
    }
}

use crate::config::{Config, GatewayConfig, ServerConfig};
use crate::error::generate_error_response;
use crate::gateway::Gateway;
use crate::http::{Method, Request, Response};
use crate::options::{Options, RequestContext};
use crate::render::escape_html;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub struct Router {
    config: Config,
}

impl Router {
    pub fn new(config: Config) -> Self {
        Router { config }
    }

    pub fn handle(&self, request: &Request) -> Response {
        let host = request.header("Host").unwrap_or_default();
        let Some(server_cfg) = self.select_server(host) else {
            return Response::new(500);
        };

        if !matches!(request.method, Method::GET | Method::HEAD) {
            return generate_error_response(405, server_cfg);
        }

        let mut res = match self.find_gateway(server_cfg, &request.path) {
            Some(gateway) => self.handle_gateway(request, gateway, server_cfg),
            None => self.serve_static(request, server_cfg),
        };
        if request.method == Method::HEAD {
            res.body.clear();
        }
        res
    }

    fn select_server(&self, host: &str) -> Option<&ServerConfig> {
        self.config
            .servers
            .iter()
            .find(|s| match &s.server_names {
                Some(names) => names.iter().any(|n| host.contains(n.as_str())),
                None => true,
            })
            .or_else(|| self.config.servers.first())
    }

    // Longest prefix match
    fn find_gateway<'a>(&self, server: &'a ServerConfig, path: &str) -> Option<&'a GatewayConfig> {
        server
            .gateways
            .iter()
            .filter(|g| path.starts_with(&g.path))
            .max_by_key(|g| g.path.len())
    }

    fn handle_gateway(
        &self,
        request: &Request,
        gateway_cfg: &GatewayConfig,
        server_cfg: &ServerConfig,
    ) -> Response {
        let mut context = RequestContext::new()
            .with_var("REQUEST_URI", request.target.as_str())
            .with_var("QUERY_STRING", request.query.as_str())
            .with_var("SCRIPT_NAME", gateway_cfg.path.as_str())
            .with_query(&request.query);
        if let Some(root) = &server_cfg.static_root {
            context = context.with_var("DOCUMENT_ROOT", root.as_str());
        }

        let gateway = match Gateway::with_interpreter(
            Options::from_config(gateway_cfg),
            &context,
            gateway_cfg.interpreter.clone(),
            gateway_cfg.lenient_html,
        ) {
            Ok(gateway) => gateway,
            Err(e) => {
                log::error!("{} {}: {}", gateway_cfg.path, request.target, e);
                return generate_error_response(e.status_code(), server_cfg);
            }
        };
        log::info!(
            "{} -> {} ({})",
            request.target,
            gateway.options().path_info(),
            gateway.content_type()
        );
        log::debug!("cgi env: {}", gateway.env());
        log::trace!("cgi header: {:?}", gateway.header());

        let mut res = Response::new(200);
        // Embedded fetches (images and the like) go out as the script sent them.
        if let Some(embedded) = gateway.response_content_type() {
            res.set_body(gateway.raw_body().to_vec(), embedded);
            return res;
        }
        match gateway.content_type() {
            "text/html" | "text/plain" => match gateway.div(gateway_cfg.highlight_rows) {
                Ok(div) => res.set_body(host_page(gateway_cfg, &div).into_bytes(), "text/html"),
                Err(e) => {
                    log::error!("{}: {}", request.target, e);
                    return generate_error_response(e.status_code(), server_cfg);
                }
            },
            other => res.set_body(gateway.raw_body().to_vec(), other),
        }
        res
    }

    fn serve_static(&self, request: &Request, server_cfg: &ServerConfig) -> Response {
        let Some(root) = &server_cfg.static_root else {
            return generate_error_response(404, server_cfg);
        };
        let Some(path) = resolve_static(Path::new(root), &request.path) else {
            return generate_error_response(404, server_cfg);
        };

        match fs::read(&path) {
            Ok(content) => {
                let mime = match path.extension().and_then(|e| e.to_str()) {
                    Some("html") => "text/html",
                    Some("css") => "text/css",
                    Some("js") => "application/javascript",
                    Some("png") => "image/png",
                    Some("gif") => "image/gif",
                    _ => "application/octet-stream",
                };
                let mut res = Response::new(200);
                res.set_body(content, mime);
                res
            }
            Err(_) => generate_error_response(404, server_cfg),
        }
    }
}

/// Maps a request path below `root`, refusing anything that climbs out.
fn resolve_static(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    let path = root.join(relative);
    path.is_file().then_some(path)
}

fn host_page(cfg: &GatewayConfig, content: &str) -> String {
    let title = escape_html(cfg.title.as_deref().unwrap_or("cgi-gateway"));
    let stylesheet = cfg
        .stylesheet
        .as_deref()
        .map(|href| {
            format!(
                r#"    <link rel="stylesheet" href="{}" type="text/css">"#,
                escape_html(href)
            ) + "\n"
        })
        .unwrap_or_default();
    format!(
        "<html>\n<head>\n    <title>{}</title>\n{}</head>\n<body>\n{}\n</body>\n</html>\n",
        title, stylesheet, content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Parser;

    fn request(raw: &str) -> Request {
        let mut parser = Parser::new();
        parser.parse(raw.as_bytes());
        parser.request
    }

    fn config(gateways: &str, static_root: &str) -> Config {
        Config::from_yaml(&format!(
            "servers:\n  - host: 127.0.0.1\n    ports: [8080]\n    static_root: {}\n    gateways:\n{}",
            static_root, gateways
        ))
        .unwrap()
    }

    #[test]
    fn unknown_script_is_not_found() {
        let router = Router::new(config(
            "      - path: /cvsweb\n        script_filename: /no/such.cgi\n        request_uri: /cgi-bin/x.cgi\n",
            "/nonexistent",
        ));
        let res = router.handle(&request("GET /cvsweb HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert_eq!(res.status_code, 404);
    }

    #[test]
    fn post_is_refused() {
        let router = Router::new(config("      []\n", "/nonexistent"));
        let res = router.handle(&request("POST /cvsweb HTTP/1.1\r\n\r\n"));
        assert_eq!(res.status_code, 405);
    }

    #[test]
    fn static_paths_stay_under_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("style.css"), "body{}").unwrap();
        assert_eq!(
            resolve_static(dir.path(), "/style.css"),
            Some(dir.path().join("style.css"))
        );
        assert_eq!(resolve_static(dir.path(), "/../etc/passwd"), None);
        assert_eq!(resolve_static(dir.path(), "/missing.css"), None);
    }

    #[test]
    fn serves_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("style.css"), "body{}").unwrap();
        let router = Router::new(config("      []\n", &dir.path().to_string_lossy()));

        let res = router.handle(&request("GET /style.css HTTP/1.1\r\n\r\n"));
        assert_eq!(res.status_code, 200);
        assert_eq!(res.body, b"body{}");
        assert_eq!(res.headers["Content-Type"], "text/css");
    }

    #[cfg(unix)]
    #[test]
    fn wraps_html_in_host_page() {
        use std::io::Write;

        let mut script = tempfile::NamedTempFile::new().unwrap();
        writeln!(script, "printf 'Content-Type: text/html\\n\\n<body><a href=\"x.c\">x</a></body>'").unwrap();
        script.flush().unwrap();

        let gateways = format!(
            "      - path: /cvsweb\n        script_filename: {}\n        request_uri: /cgi-bin/x.cgi\n        interpreter: /bin/sh\n        title: cvsweb\n        stylesheet: /style.css\n",
            script.path().display()
        );
        let router = Router::new(config(&gateways, "/nonexistent"));
        let res = router.handle(&request("GET /cvsweb?href=%2Fsrc%2F HTTP/1.1\r\n\r\n"));

        assert_eq!(res.status_code, 200);
        let page = String::from_utf8(res.body).unwrap();
        assert!(page.contains("<title>cvsweb</title>"));
        assert!(page.contains(r#"<link rel="stylesheet" href="/style.css" type="text/css">"#));
        assert!(page.contains(
            r#"<div id="cgi_wrapper"><a href="/cvsweb?href=%2Fsrc%2Fx.c">x</a></div>"#
        ));
    }

    #[cfg(unix)]
    #[test]
    fn embedded_text_keeps_its_type() {
        use std::io::Write;

        let mut script = tempfile::NamedTempFile::new().unwrap();
        writeln!(script, "printf 'Content-Type: text/plain\\n\\nplain <text>'").unwrap();
        script.flush().unwrap();

        let gateways = format!(
            "      - path: /cvsweb\n        script_filename: {}\n        request_uri: /cgi-bin/x.cgi\n        interpreter: /bin/sh\n",
            script.path().display()
        );
        let router = Router::new(config(&gateways, "/nonexistent"));

        let res = router.handle(&request(
            "GET /cvsweb?href=%2Fa.txt&wrapper_embedded=true HTTP/1.1\r\n\r\n",
        ));
        assert_eq!(res.status_code, 200);
        assert_eq!(res.headers["Content-Type"], "text/plain");
        assert_eq!(res.body, b"plain <text>");

        let res = router.handle(&request("GET /cvsweb?href=%2Fa.txt HTTP/1.1\r\n\r\n"));
        assert_eq!(res.headers["Content-Type"], "text/html");
        assert!(String::from_utf8(res.body).unwrap().contains("<pre>plain &lt;text&gt;</pre>"));
    }
}

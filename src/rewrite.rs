use crate::options::decode_component;
use crate::proxy_url::ProxyUrl;
use crate::render::escape_html;
use lol_html::errors::RewritingError;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};

/// Query marker added to rewritten image sources.
pub const EMBEDDED_MARKER: &str = "wrapper_embedded=true";

/// Points links, form actions and relative images of `html` back at the
/// proxy.
///
/// Forms additionally get hidden inputs carrying the current path and every
/// pair of the persisted query string, so a submission lands on the same
/// page.
pub fn rewrite_document(
    html: &str,
    proxy: &ProxyUrl<'_>,
    path_info: &str,
    get: Option<&str>,
) -> Result<String, RewritingError> {
    let hidden = hidden_inputs(path_info, get);

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("a[href]", |el| {
                    let href = unescape_attr(&el.get_attribute("href").unwrap_or_default());
                    if !is_external(&href) {
                        el.set_attribute("href", &proxy.make_url(&href))?;
                    }
                    Ok(())
                }),
                element!("form", |el| {
                    let action = unescape_attr(&el.get_attribute("action").unwrap_or_default());
                    el.set_attribute("action", &proxy.make_url(&action))?;
                    el.append(&hidden, ContentType::Html);
                    Ok(())
                }),
                element!("img[src]", |el| {
                    let src = unescape_attr(&el.get_attribute("src").unwrap_or_default());
                    if !src.starts_with('/') {
                        let url = format!("{}&{}", proxy.make_url(&src), EMBEDDED_MARKER);
                        el.set_attribute("src", &url)?;
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
}

fn is_external(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    href.is_empty() || lower.starts_with("mailto") || lower.starts_with("http")
}

fn hidden_inputs(path_info: &str, get: Option<&str>) -> String {
    let mut inputs = hidden_input("href", path_info);
    for pair in get.into_iter().flat_map(|g| g.split('&')).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        inputs.push_str(&hidden_input(&decode_component(key), &decode_component(value)));
    }
    inputs
}

fn hidden_input(name: &str, value: &str) -> String {
    format!(
        r#"<input name="{}" value="{}" type="hidden">"#,
        escape_html(name),
        escape_html(value)
    )
}

// Attribute values come back exactly as written in the source.
fn unescape_attr(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

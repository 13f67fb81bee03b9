//! Turns a parsed CGI result into markup for a host page.

use crate::response::CgiResult;
use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, EndTag};
use lol_html::{element, rewrite_str, text, RewriteStrSettings};
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::LazyLock;

pub const WRAPPER_OPEN: &str = r#"<div id="cgi_wrapper">"#;
const ROW_CLASSES: [&str; 2] = ["even", "odd"];
const HEAD_ONLY: [&str; 4] = ["title", "meta", "link", "base"];

static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*<!doctype[^>]*>\s*").expect("doctype pattern is valid"));

/// Query strings asking for a view that must not be split into rows.
pub fn suppresses_highlight(query_string: Option<&str>) -> bool {
    query_string.is_some_and(|qs| qs.contains("content-type=text/plain") || qs.contains("annotate"))
}

/// Markup for `result`: HTML bodies and plain text are wrapped in the
/// `cgi_wrapper` div, anything else is returned untouched.
pub fn div(
    result: &CgiResult,
    document: Option<&str>,
    highlight: bool,
) -> Result<String, RewritingError> {
    match result.content_type.as_str() {
        "text/html" => match document {
            Some(doc) => Ok(format!("{}{}</div>", WRAPPER_OPEN, body_fragment(doc, highlight)?)),
            None => Ok(format!("{}</div>", WRAPPER_OPEN)),
        },
        "text/plain" => {
            let escaped = escape_html(&result.body);
            let inner = if highlight {
                lines_to_list(&escaped)
            } else {
                format!("<pre>{}</pre>", escaped)
            };
            Ok(format!("{}{}</div>", WRAPPER_OPEN, inner))
        }
        _ => Ok(result.body.clone()),
    }
}

/// Children of `<body>`, optionally with every `<pre>` turned into rows.
/// Head-only elements met before `<body>` are dropped even when the
/// document has no `<head>` tag.
pub fn body_fragment(document: &str, highlight: bool) -> Result<String, RewritingError> {
    let pre_text = Rc::new(RefCell::new(String::new()));
    let in_body = Rc::new(Cell::new(false));

    let body_seen = Rc::clone(&in_body);
    let mut handlers = vec![
        element!("html", |el| {
            el.remove_and_keep_content();
            Ok(())
        }),
        element!("body", move |el| {
            body_seen.set(true);
            el.remove_and_keep_content();
            Ok(())
        }),
        element!("head", |el| {
            el.remove();
            Ok(())
        }),
    ];
    for selector in HEAD_ONLY {
        let in_body = Rc::clone(&in_body);
        handlers.push(element!(selector, move |el| {
            if !in_body.get() {
                el.remove();
            }
            Ok(())
        }));
    }

    if highlight {
        let collected = Rc::clone(&pre_text);
        handlers.push(element!("pre", move |el| {
            let names: Vec<String> = el.attributes().iter().map(|a| a.name()).collect();
            for name in names {
                el.remove_attribute(&name);
            }
            el.set_tag_name("div")?;
            collected.borrow_mut().clear();

            let rows = Rc::clone(&collected);
            if let Some(end_handlers) = el.end_tag_handlers() {
                end_handlers.push(Box::new(move |end: &mut EndTag<'_>| {
                    let text = rows.borrow();
                    let text = text
                        .strip_prefix("\r\n")
                        .or_else(|| text.strip_prefix('\n'))
                        .unwrap_or(text.as_str());
                    end.before(&lines_to_list(text), ContentType::Html);
                    Ok(())
                }));
            }
            Ok(())
        }));
        handlers.push(element!("pre *", |el| {
            el.remove_and_keep_content();
            Ok(())
        }));

        // Text of nested elements may reach either handler; the first one
        // to see a chunk takes it.
        for selector in ["pre", "pre *"] {
            let collected = Rc::clone(&pre_text);
            handlers.push(text!(selector, move |chunk| {
                if !chunk.removed() {
                    collected.borrow_mut().push_str(chunk.as_str());
                    chunk.remove();
                }
                Ok(())
            }));
        }
    }

    let out = rewrite_str(
        document,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )?;
    Ok(DOCTYPE.replace(&out, "").into_owned())
}

/// One `<li>` per line with alternating `even`/`odd` classes, blank lines
/// shown as `&nbsp;`. A single line is returned without list markup.
pub fn lines_to_list(text: &str) -> String {
    let rows: Vec<&str> = text.split('\n').collect();
    if rows.len() == 1 {
        return format!(r#"<div id="div_pre">{}</div>"#, text);
    }

    let items: Vec<String> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let row = if row.trim().is_empty() { "&nbsp;" } else { row };
            format!(r#"<li class="{}">{}</li>"#, ROW_CLASSES[i % 2], row)
        })
        .collect();
    format!(r#"<div id="div_pre">{}</div>"#, items.join("\n"))
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

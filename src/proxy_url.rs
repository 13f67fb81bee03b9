//! Maps links found in CGI output back onto the proxying entry point.
//!
//! Every rewritten URL has the form `<entry>?[<get>&]href=<path>`, where
//! `<path>` is the target resolved against the page currently shown.

use crate::options::Options;

pub struct ProxyUrl<'a> {
    entry: &'a str,
    get: Option<&'a str>,
    script_name: &'a str,
    current: &'a str,
}

impl<'a> ProxyUrl<'a> {
    pub fn new(entry: &'a str, get: Option<&'a str>, script_name: &'a str, current: &'a str) -> Self {
        ProxyUrl {
            entry,
            get,
            script_name,
            current,
        }
    }

    pub fn from_options(options: &'a Options) -> Self {
        ProxyUrl::new(
            options.php_script.as_deref().unwrap_or_default(),
            options.get.as_deref(),
            options.script_name.as_deref().unwrap_or_default(),
            options.path_info(),
        )
    }

    pub fn make_url(&self, href: &str) -> String {
        let mut url = self.entry.to_string();
        if let Some(get) = self.get {
            url.push('?');
            url.push_str(get);
        }
        if href.is_empty() {
            return url;
        }

        url.push(if self.get.is_some() { '&' } else { '?' });
        url.push_str("href=");
        url.push_str(&urlencoding::encode(&self.make_path(href)));
        url
    }

    /// Resolves `href` to a path below the CGI root.
    ///
    /// `..` only ever climbs one level and whatever follows it is dropped.
    pub fn make_path(&self, href: &str) -> String {
        let dir = self.current;

        if href.starts_with('/') {
            return href
                .strip_prefix(self.script_name)
                .unwrap_or(href)
                .to_string();
        }
        if href.starts_with("..") {
            return parent_dir(dir).to_string();
        }

        let href = href.strip_prefix("./").unwrap_or(href);
        if dir.ends_with('/') {
            return format!("{}{}", dir, href);
        }
        if let Some(pos) = href.find('?').or_else(|| href.find('#')) {
            return format!("{}{}", dir, &href[pos..]);
        }
        format!("{}/{}", dirname(dir), href)
    }
}

// "/a/b/c" and "/a/b/c/" both give "/a/b/".
fn parent_dir(dir: &str) -> &str {
    let trimmed = dir.strip_suffix('/').unwrap_or(dir);
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[..=pos],
        None => "",
    }
}

fn dirname(path: &str) -> &str {
    if path.is_empty() {
        return "";
    }
    match path.rfind('/') {
        Some(0) => "",
        Some(pos) => &path[..pos],
        None => ".",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "/cgi-bin/cvsweb.cgi";

    fn at(current: &str) -> ProxyUrl<'_> {
        ProxyUrl::new("/cvsweb", None, SCRIPT, current)
    }

    #[test]
    fn root_relative_strips_script_name() {
        assert_eq!(at("/").make_path("/cgi-bin/cvsweb.cgi/foo"), "/foo");
        assert_eq!(at("/").make_path("/icons/dir.gif"), "/icons/dir.gif");
    }

    #[test]
    fn parent_strips_one_segment() {
        assert_eq!(at("/a/b/c").make_path(".."), "/a/b/");
        assert_eq!(at("/a/b/c/").make_path("../"), "/a/b/");
        assert_eq!(at("/a/b/c").make_path("../x/y"), "/a/b/");
        assert_eq!(at("/").make_path("../"), "");
    }

    #[test]
    fn relative_to_directory() {
        assert_eq!(at("/src/").make_path("main.c"), "/src/main.c");
        assert_eq!(at("/src/").make_path("./main.c"), "/src/main.c");
    }

    #[test]
    fn relative_to_file() {
        assert_eq!(at("/src/main.c").make_path("util.c"), "/src/util.c");
        assert_eq!(at("/main.c").make_path("util.c"), "/util.c");
        assert_eq!(at("/src/main.c").make_path("main.c?rev=1.1"), "/src/main.c?rev=1.1");
        assert_eq!(at("/src/main.c").make_path("#top"), "/src/main.c#top");
    }

    #[test]
    fn urls_encode_the_path() {
        assert_eq!(at("/").make_url("a b/c.c"), "/cvsweb?href=%2Fa%20b%2Fc.c");
        assert_eq!(at("/").make_url(""), "/cvsweb");
    }

    #[test]
    fn persisted_query_comes_first() {
        let proxy = ProxyUrl::new("/cvsweb", Some("cvsroot=main"), SCRIPT, "/src/");
        assert_eq!(proxy.make_url(""), "/cvsweb?cvsroot=main");
        assert_eq!(
            proxy.make_url("x.c"),
            "/cvsweb?cvsroot=main&href=%2Fsrc%2Fx.c"
        );
    }
}

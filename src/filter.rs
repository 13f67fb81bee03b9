//! Find/replace applied to a CGI response body before it is rewritten.
//!
//! Patterns use the delimited `/expr/flags` form, so `"/foo/i"` matches
//! `foo` case-insensitively. A pattern that does not open with a
//! delimiter is taken as a plain expression.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Deserialize, Clone)]
pub struct Filter {
    pub pattern: String,
    pub replacement: String,
    #[serde(skip)]
    compiled: OnceLock<Regex>,
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.replacement == other.replacement
    }
}

impl Filter {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Filter {
            pattern: pattern.into(),
            replacement: replacement.into(),
            compiled: OnceLock::new(),
        }
    }

    /// The compiled pattern, built on first use and kept for later calls.
    /// Clones made after this keep the compiled copy.
    pub fn regex(&self) -> Result<&Regex, regex::Error> {
        if let Some(re) = self.compiled.get() {
            return Ok(re);
        }
        let re = self.compile()?;
        Ok(self.compiled.get_or_init(|| re))
    }

    #[cfg(test)]
    pub(crate) fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    pub fn compile(&self) -> Result<Regex, regex::Error> {
        let (expr, flags) = split_delimited(&self.pattern);
        let inline: String = flags
            .chars()
            .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'U'))
            .collect();
        if inline.is_empty() {
            Regex::new(expr)
        } else {
            Regex::new(&format!("(?{}){}", inline, expr))
        }
    }

    /// Replaces every match in `text`.
    pub fn apply(&self, text: &str) -> Result<String, regex::Error> {
        let re = self.regex()?;
        let replacement = translate_replacement(&self.replacement);
        Ok(re.replace_all(text, replacement.as_str()).into_owned())
    }
}

fn split_delimited(pattern: &str) -> (&str, &str) {
    let mut chars = pattern.chars();
    let open = match chars.next() {
        Some(c) if !c.is_alphanumeric() && !c.is_whitespace() && c != '\\' => c,
        _ => return (pattern, ""),
    };
    let close = match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        c => c,
    };
    let start = open.len_utf8();
    match pattern[start..].rfind(close) {
        Some(end) => {
            let end = start + end;
            (&pattern[start..end], &pattern[end + close.len_utf8()..])
        }
        None => (pattern, ""),
    }
}

// `\1` and `$1` become `${1}`; any other `$` is literal.
fn translate_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' | '$' if chars.peek().is_some_and(|n| n.is_ascii_digit()) => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    group.push(d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", group));
            }
            '$' if chars.peek() == Some(&'{') => out.push('$'),
            '$' => out.push_str("$$"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_occurrence() {
        let filter = Filter::new("/foo/", "bar");
        assert_eq!(filter.apply("foo food foo").unwrap(), "bar bard bar");
    }

    #[test]
    fn honours_flags() {
        let filter = Filter::new("#FOO#i", "x");
        assert_eq!(filter.apply("Foo fOO").unwrap(), "x x");
    }

    #[test]
    fn backreferences() {
        let filter = Filter::new(r"/(\w+)@(\w+)/", r"\2 at $1");
        assert_eq!(filter.apply("me@host").unwrap(), "host at me");
    }

    #[test]
    fn dollar_is_literal() {
        let filter = Filter::new("/cost/", "$price");
        assert_eq!(filter.apply("cost").unwrap(), "$price");
    }

    #[test]
    fn undelimited_pattern() {
        let filter = Filter::new("a+", "a");
        assert_eq!(filter.apply("caaat").unwrap(), "cat");
    }

    #[test]
    fn compiled_pattern_is_kept() {
        let filter = Filter::new("/foo/", "bar");
        assert!(filter.compiled.get().is_none());
        assert_eq!(filter.apply("foo").unwrap(), "bar");
        let first = filter.compiled.get().unwrap() as *const Regex;

        assert_eq!(filter.apply("a foo").unwrap(), "a bar");
        assert!(std::ptr::eq(first, filter.regex().unwrap()));

        let copy = filter.clone();
        assert!(copy.compiled.get().is_some());
        assert_eq!(copy, Filter::new("/foo/", "bar"));
    }

    #[test]
    fn bad_pattern_is_not_cached() {
        let filter = Filter::new("/(open/", "");
        assert!(filter.apply("x").is_err());
        assert!(filter.compiled.get().is_none());
    }

    #[test]
    fn bracket_delimiters() {
        assert_eq!(split_delimited("{a/b}i"), ("a/b", "i"));
        assert_eq!(split_delimited("/unterminated"), ("/unterminated", ""));
    }
}

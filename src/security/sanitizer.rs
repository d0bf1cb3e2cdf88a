//! Pluggable HTML sanitization.
//!
//! Both the validator and the escaper accept an optional [`HtmlSanitizer`].
//! When none is configured they fall back to plain entity escaping.
//! [`TagStripper`] is the bundled implementation: it removes forbidden
//! elements together with their contents, rebuilds allowed tags with only
//! their allowed attributes, and drops every other tag while keeping its
//! text.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::error::{Result, ShieldError};

/// Options passed to a sanitizer call
#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions {
    /// Tags kept in the output
    pub allowed_tags: Vec<String>,
    /// Attributes kept on allowed tags
    pub allowed_attr: Vec<String>,
    /// Tags always removed
    pub forbid_tags: Vec<String>,
    /// Attributes always removed
    pub forbid_attr: Vec<String>,
    /// Tags removed together with their contents
    pub forbid_contents: Vec<String>,
}

impl SanitizeOptions {
    /// Strip every tag, keep text content
    pub fn strip_all() -> Self {
        Self {
            forbid_contents: vec!["script".into(), "style".into()],
            ..Self::default()
        }
    }

    /// Keep the given tags, forbid the executable ones
    pub fn allow(tags: &[&str]) -> Self {
        let forbidden = ["script", "style", "iframe", "object", "embed", "form"];
        Self {
            allowed_tags: tags.iter().map(|t| (*t).to_string()).collect(),
            allowed_attr: vec!["class".into(), "title".into()],
            forbid_tags: forbidden.iter().map(|t| (*t).to_string()).collect(),
            forbid_attr: vec!["style".into()],
            forbid_contents: vec!["script".into(), "style".into()],
        }
    }

    fn is_allowed_tag(&self, tag: &str) -> bool {
        let tag = tag.to_ascii_lowercase();
        !self.forbid_tags.iter().any(|t| t.eq_ignore_ascii_case(&tag))
            && self.allowed_tags.iter().any(|t| t.eq_ignore_ascii_case(&tag))
    }

    fn is_allowed_attr(&self, attr: &str) -> bool {
        let attr = attr.to_ascii_lowercase();
        !attr.starts_with("on")
            && !self.forbid_attr.iter().any(|a| a.eq_ignore_ascii_case(&attr))
            && self.allowed_attr.iter().any(|a| a.eq_ignore_ascii_case(&attr))
    }
}

/// A DOM-sanitization collaborator
pub trait HtmlSanitizer: Send + Sync {
    /// Sanitize an HTML fragment
    fn sanitize(&self, html: &str, options: &SanitizeOptions) -> Result<String>;
}

lazy_static! {
    static ref TAG: Regex =
        Regex::new(r"(?s)<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>").expect("static regex");
    static ref ATTR: Regex = Regex::new(
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*("[^"]*"|'[^']*'|[^\s"'>]+)"#
    )
    .expect("static regex");
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").expect("static regex");
}

/// Regex-based sanitizer
#[derive(Debug, Clone, Default)]
pub struct TagStripper {
    /// Maximum input size accepted (bytes)
    pub max_input: Option<usize>,
}

impl TagStripper {
    /// Create a stripper with no size limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse inputs above `max` bytes
    pub fn with_max_input(mut self, max: usize) -> Self {
        self.max_input = Some(max);
        self
    }

    fn remove_contents(html: &str, tag: &str) -> Result<String> {
        let escaped = regex::escape(tag);
        let block = Regex::new(&format!(
            r"(?is)<\s*{escaped}\b[^>]*>.*?<\s*/\s*{escaped}\s*>"
        ))?;
        let unclosed = Regex::new(&format!(r"(?is)<\s*{escaped}\b[^>]*>.*$"))?;
        let html = block.replace_all(html, "");
        Ok(unclosed.replace_all(&html, "").into_owned())
    }

    fn rebuild_tag(caps: &Captures<'_>, options: &SanitizeOptions) -> String {
        let closing = &caps[1];
        let name = caps[2].to_ascii_lowercase();

        if !options.is_allowed_tag(&name) {
            return String::new();
        }
        if !closing.is_empty() {
            return format!("</{name}>");
        }

        let mut rebuilt = format!("<{name}");
        for attr in ATTR.captures_iter(&caps[3]) {
            let attr_name = attr[1].to_ascii_lowercase();
            let value = attr[2].trim_matches(|c| c == '"' || c == '\'');
            if options.is_allowed_attr(&attr_name)
                && !value.to_ascii_lowercase().contains("javascript:")
            {
                rebuilt.push_str(&format!(" {attr_name}=\"{}\"", value.replace('"', "&quot;")));
            }
        }
        rebuilt.push('>');
        rebuilt
    }
}

impl HtmlSanitizer for TagStripper {
    fn sanitize(&self, html: &str, options: &SanitizeOptions) -> Result<String> {
        if let Some(max) = self.max_input {
            if html.len() > max {
                return Err(ShieldError::Sanitizer(format!(
                    "input exceeds sanitizer limit: {} > {max}",
                    html.len()
                )));
            }
        }

        let mut out = COMMENT.replace_all(html, "").into_owned();
        for tag in &options.forbid_contents {
            out = Self::remove_contents(&out, tag)?;
        }

        let out = TAG.replace_all(&out, |caps: &Captures<'_>| Self::rebuild_tag(caps, options));

        // Anything left that still opens a tag is treated as text.
        Ok(out.replace('<', "&lt;"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_all_keeps_text() {
        let stripper = TagStripper::new();
        let out = stripper
            .sanitize("<b>Hello</b> <i>world</i>", &SanitizeOptions::strip_all())
            .unwrap();
        assert_eq!(out, "Hello world");
    }

    #[test]
    fn test_script_contents_removed() {
        let stripper = TagStripper::new();
        let out = stripper
            .sanitize(
                "before<script>alert('x')</script>after",
                &SanitizeOptions::strip_all(),
            )
            .unwrap();
        assert_eq!(out, "beforeafter");
    }

    #[test]
    fn test_unclosed_script_removed() {
        let stripper = TagStripper::new();
        let out = stripper
            .sanitize("ok<script>alert(1)", &SanitizeOptions::strip_all())
            .unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_allowed_tag_loses_handlers() {
        let stripper = TagStripper::new();
        let out = stripper
            .sanitize(
                r#"<b class="x" onclick="steal()">bold</b>"#,
                &SanitizeOptions::allow(&["b"]),
            )
            .unwrap();
        assert_eq!(out, r#"<b class="x">bold</b>"#);
    }

    #[test]
    fn test_forbidden_tag_dropped_even_if_allowed() {
        let stripper = TagStripper::new();
        let mut options = SanitizeOptions::allow(&["iframe"]);
        options.forbid_contents.clear();
        let out = stripper
            .sanitize(r#"<iframe src="x"></iframe>text"#, &options)
            .unwrap();
        assert_eq!(out, "text");
    }

    #[test]
    fn test_size_limit() {
        let stripper = TagStripper::new().with_max_input(4);
        assert!(stripper
            .sanitize("too long", &SanitizeOptions::strip_all())
            .is_err());
    }
}

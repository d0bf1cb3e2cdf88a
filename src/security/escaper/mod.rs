//! Context-aware output escaping.
//!
//! Escaping is table driven: every [`EscapeContext`] maps to a fixed
//! character table plus a fallback rule. After escaping, the output is
//! re-scanned with the same dangerous-pattern subset that was used to
//! inspect the input. A hit means the table failed to neutralize a live
//! construct; the result is then flagged `ESCAPE_INCOMPLETE` and forced to
//! [`SecurityLevel::Dangerous`].
//!
//! # Escaping Rules
//!
//! | Context  | Form                                   |
//! |----------|----------------------------------------|
//! | html     | `&amp;` entities, decimal `&#NNN;`     |
//! | js       | backslash escapes, `\uXXXX`            |
//! | css      | `\HH ` hex with trailing space         |
//! | url      | RFC 3986 `%HH`, uppercase              |
//! | xml      | predefined entities                    |
//! | plantuml | `~` escapes, decimal refs, `\n`        |
//! | json     | JSON string escapes, HTML-safe         |

mod context;
mod tables;

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

pub use context::{ContextDetection, ContextDetector, EscapeContext, DETECTION_PRIORITY};

use super::sanitizer::{HtmlSanitizer, SanitizeOptions};
use super::types::{Issue, IssueKind, SecurityLevel, Severity};
use crate::error::Result;

/// A construct that is live when embedded in the listed contexts.
///
/// An empty `contexts` slice means every context.
#[derive(Debug, Clone)]
pub struct DangerousPattern {
    /// Pattern name
    pub name: &'static str,
    /// Regex pattern
    pub pattern: &'static str,
    /// Contexts the pattern applies to
    pub contexts: &'static [EscapeContext],
}

impl DangerousPattern {
    fn applies_to(&self, context: EscapeContext) -> bool {
        self.contexts.is_empty() || self.contexts.contains(&context)
    }
}

/// Dangerous constructs checked before and after escaping
pub static DANGEROUS_PATTERNS: &[DangerousPattern] = &[
    DangerousPattern {
        name: "script_tag",
        pattern: r"(?i)<\s*/?\s*script",
        contexts: &[],
    },
    DangerousPattern {
        name: "active_tag",
        pattern: r"(?i)<\s*(iframe|object|embed|svg|img|style|link|meta|base|form|math)\b",
        contexts: &[],
    },
    DangerousPattern {
        name: "tag_event_handler",
        pattern: r"(?i)<[^>]*\son[a-z]+\s*=",
        contexts: &[],
    },
    DangerousPattern {
        name: "tag_script_uri",
        pattern: r"(?i)<[^>]*(javascript|vbscript)\s*:",
        contexts: &[],
    },
    DangerousPattern {
        name: "markup_comment",
        pattern: r"<!--|<!\[CDATA\[",
        contexts: &[],
    },
    DangerousPattern {
        name: "script_uri",
        pattern: r"(?i)(javascript|vbscript)\s*:",
        contexts: &[EscapeContext::Url, EscapeContext::Css],
    },
    DangerousPattern {
        name: "data_html_uri",
        pattern: r"(?i)data\s*:\s*text/html",
        contexts: &[EscapeContext::Url, EscapeContext::Css],
    },
    DangerousPattern {
        name: "css_expression",
        pattern: r"(?i)expression\s*\(",
        contexts: &[EscapeContext::Css],
    },
    DangerousPattern {
        name: "css_import",
        pattern: r"(?i)@import\b",
        contexts: &[EscapeContext::Css],
    },
    DangerousPattern {
        name: "plantuml_directive",
        pattern: r"(?im)^\s*!(include\w*|import|define|pragma|theme)\b",
        contexts: &[EscapeContext::PlantUml],
    },
    DangerousPattern {
        name: "plantuml_builtin",
        pattern: r"(?i)(^|[^~])%(getenv|load_json|filename|dirpath|file_exists|get_variable_value)\b",
        contexts: &[EscapeContext::PlantUml],
    },
    DangerousPattern {
        name: "plantuml_block",
        pattern: r"(?im)^\s*@(startuml|enduml)\b",
        contexts: &[EscapeContext::PlantUml],
    },
];

lazy_static! {
    static ref DANGEROUS_REGEX: Vec<(Regex, &'static DangerousPattern)> = DANGEROUS_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p.pattern).ok().map(|r| (r, p)))
        .collect();
}

/// A dangerous pattern found in a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DangerousMatch {
    /// Pattern name
    pub pattern: String,
    /// Number of matches
    pub matches: usize,
    /// Up to three matched substrings
    pub examples: Vec<String>,
}

/// Scan content with the patterns live in `context`
pub fn scan_dangerous(content: &str, context: EscapeContext) -> Vec<DangerousMatch> {
    DANGEROUS_REGEX
        .iter()
        .filter(|(_, p)| p.applies_to(context))
        .filter_map(|(regex, p)| {
            let found: Vec<&str> = regex.find_iter(content).map(|m| m.as_str()).collect();
            (!found.is_empty()).then(|| DangerousMatch {
                pattern: p.name.to_string(),
                matches: found.len(),
                examples: found.iter().take(3).map(|s| (*s).to_string()).collect(),
            })
        })
        .collect()
}

/// Per-call escaping options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeOptions {
    /// Add bracket/backslash/equals escapes in HTML
    pub advanced: bool,
    /// Pre-sanitize HTML when a sanitizer is configured
    pub sanitize: bool,
}

impl Default for EscapeOptions {
    fn default() -> Self {
        Self {
            advanced: false,
            sanitize: true,
        }
    }
}

impl EscapeOptions {
    /// Advanced HTML escaping
    pub fn advanced() -> Self {
        Self {
            advanced: true,
            ..Self::default()
        }
    }
}

/// Outcome of [`OutputEscaper::escape`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscapeResult {
    /// Escaped output
    pub escaped: String,
    /// Input length in characters
    pub original_length: usize,
    /// Context requested by the caller
    pub context: EscapeContext,
    /// Context chosen when `auto` was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_context: Option<EscapeContext>,
    /// Number of characters replaced
    pub escaped_chars: usize,
    /// Safe, moderate (neutralized) or dangerous (incomplete)
    pub security_level: SecurityLevel,
    /// Findings
    pub warnings: Vec<Issue>,
    /// Dangerous constructs present in the input
    pub dangerous_patterns_found: Vec<DangerousMatch>,
    /// Whether the HTML sanitizer ran
    #[serde(rename = "domPurifyUsed")]
    pub sanitizer_used: bool,
}

impl EscapeResult {
    /// Whether the fixed-point check failed
    pub fn is_incomplete(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| w.kind == IssueKind::EscapeIncomplete)
    }
}

/// Context-aware escaper.
#[derive(Clone, Default)]
pub struct OutputEscaper {
    sanitizer: Option<Arc<dyn HtmlSanitizer>>,
    detector: ContextDetector,
    defaults: EscapeOptions,
}

impl std::fmt::Debug for OutputEscaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputEscaper")
            .field("sanitizer", &self.sanitizer.is_some())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl OutputEscaper {
    /// Create an escaper without a sanitizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sanitize HTML with the given sanitizer
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn HtmlSanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// Default options for [`escape_with_defaults`](Self::escape_with_defaults)
    pub fn with_defaults(mut self, defaults: EscapeOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Escape with the configured default options
    pub fn escape_with_defaults(&self, input: &str, context: EscapeContext) -> Result<EscapeResult> {
        self.escape(input, context, &self.defaults)
    }

    /// Escape `input` for embedding in `context`
    pub fn escape(
        &self,
        input: &str,
        context: EscapeContext,
        options: &EscapeOptions,
    ) -> Result<EscapeResult> {
        let (target, detected_context) = if context == EscapeContext::Auto {
            let detection = self.detector.detect(input);
            debug!(context = %detection.context, "auto-detected output context");
            (detection.context, Some(detection.context))
        } else {
            (context, None)
        };

        let dangerous_patterns_found = scan_dangerous(input, target);
        let mut warnings: Vec<Issue> = dangerous_patterns_found
            .iter()
            .map(|m| {
                Issue::new(
                    IssueKind::DangerousPattern,
                    Severity::Medium,
                    format!("Dangerous construct '{}' in {target} output", m.pattern),
                )
                .with_matches(&m.pattern, m.examples.clone())
            })
            .collect();

        let mut sanitizer_used = false;
        let mut source = std::borrow::Cow::Borrowed(input);
        if options.sanitize && matches!(context, EscapeContext::Html | EscapeContext::Auto) {
            if let Some(sanitizer) = &self.sanitizer {
                source = std::borrow::Cow::Owned(
                    sanitizer.sanitize(input, &SanitizeOptions::strip_all())?,
                );
                sanitizer_used = true;
            }
        }

        let (escaped, escaped_chars) = escape_for(&source, target, options.advanced);

        let mut security_level = if dangerous_patterns_found.is_empty() {
            SecurityLevel::Safe
        } else {
            SecurityLevel::Moderate
        };

        let residual = scan_dangerous(&escaped, target);
        if !residual.is_empty() {
            warn!(
                context = %target,
                patterns = ?residual.iter().map(|m| &m.pattern).collect::<Vec<_>>(),
                "escaped output still matches dangerous patterns"
            );
            for m in &residual {
                warnings.push(
                    Issue::new(
                        IssueKind::EscapeIncomplete,
                        Severity::Critical,
                        format!("Escaped {target} output still matches '{}'", m.pattern),
                    )
                    .with_matches(&m.pattern, m.examples.clone()),
                );
            }
            security_level = SecurityLevel::Dangerous;
        }

        Ok(EscapeResult {
            escaped,
            original_length: input.chars().count(),
            context,
            detected_context,
            escaped_chars,
            security_level,
            warnings,
            dangerous_patterns_found,
            sanitizer_used,
        })
    }

    /// Escape a batch of inputs for one context
    pub fn escape_many<'a, I>(&self, inputs: I, context: EscapeContext) -> Result<Vec<EscapeResult>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        inputs
            .into_iter()
            .map(|input| self.escape(input, context, &self.defaults))
            .collect()
    }

    /// Detect the output context of `input`
    pub fn detect_context(&self, input: &str) -> ContextDetection {
        self.detector.detect(input)
    }
}

/// Basic HTML entity escaping, as used for validator sanitization
pub fn escape_html(input: &str) -> String {
    escape_for(input, EscapeContext::Html, false).0
}

/// Apply the table for `context`; returns the output and the number of
/// characters replaced.
fn escape_for(input: &str, context: EscapeContext, advanced: bool) -> (String, usize) {
    match context {
        EscapeContext::Html | EscapeContext::Auto => escape_chars(input, |c| {
            tables::HTML_BASIC
                .get(&c)
                .or_else(|| advanced.then(|| tables::HTML_ADVANCED.get(&c)).flatten())
                .copied()
                .map(Replacement::Static)
        }),
        EscapeContext::JavaScript => escape_chars(input, |c| {
            tables::JAVASCRIPT
                .get(&c)
                .copied()
                .map(Replacement::Static)
                .or_else(|| c.is_control().then(|| Replacement::Owned(unicode_escape(c))))
        }),
        EscapeContext::Css => escape_chars(input, |c| {
            tables::CSS.get(&c).copied().map(Replacement::Static).or_else(|| {
                ((c.is_ascii() && !c.is_ascii_alphanumeric() && c != '_') || c.is_control())
                    .then(|| Replacement::Owned(format!("\\{:x} ", c as u32)))
            })
        }),
        EscapeContext::Url => {
            let escaped = urlencoding::encode(input).into_owned();
            let replaced = input
                .chars()
                .filter(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')))
                .count();
            (escaped, replaced)
        },
        EscapeContext::Xml => escape_chars(input, |c| {
            tables::XML.get(&c).copied().map(Replacement::Static).or_else(|| {
                (c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
                    .then_some(Replacement::Static(""))
            })
        }),
        EscapeContext::PlantUml => escape_chars(input, |c| {
            tables::PLANTUML.get(&c).copied().map(Replacement::Static).or_else(|| {
                (c.is_control() && c != '\t').then_some(Replacement::Static(""))
            })
        }),
        EscapeContext::Json => escape_chars(input, |c| {
            tables::JSON
                .get(&c)
                .copied()
                .map(Replacement::Static)
                .or_else(|| c.is_control().then(|| Replacement::Owned(unicode_escape(c))))
        }),
    }
}

enum Replacement {
    Static(&'static str),
    Owned(String),
}

fn escape_chars<F>(input: &str, mut lookup: F) -> (String, usize)
where
    F: FnMut(char) -> Option<Replacement>,
{
    let mut out = String::with_capacity(input.len() + input.len() / 4);
    let mut replaced = 0;
    for c in input.chars() {
        match lookup(c) {
            Some(Replacement::Static(s)) => {
                out.push_str(s);
                replaced += 1;
            },
            Some(Replacement::Owned(s)) => {
                out.push_str(&s);
                replaced += 1;
            },
            None => out.push(c),
        }
    }
    (out, replaced)
}

fn unicode_escape(c: char) -> String {
    let mut buf = [0u16; 2];
    c.encode_utf16(&mut buf)
        .iter()
        .map(|unit| format!("\\u{unit:04X}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::sanitizer::TagStripper;

    fn esc(input: &str, context: EscapeContext) -> EscapeResult {
        OutputEscaper::new()
            .escape(input, context, &EscapeOptions::default())
            .unwrap()
    }

    #[test]
    fn test_html_basic() {
        let r = esc(r#"<a href="x">Tom & 'Jerry'</a>"#, EscapeContext::Html);
        assert_eq!(
            r.escaped,
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;&#47;a&gt;"
        );
        assert_eq!(r.escaped_chars, 10);
    }

    #[test]
    fn test_html_advanced() {
        let r = OutputEscaper::new()
            .escape("a=(b)", EscapeContext::Html, &EscapeOptions::advanced())
            .unwrap();
        assert_eq!(r.escaped, "a&#61;&#40;b&#41;");
    }

    #[test]
    fn test_plain_text_untouched() {
        let r = esc("safe plain text", EscapeContext::Html);
        assert_eq!(r.escaped, "safe plain text");
        assert_eq!(r.escaped_chars, 0);
        assert_eq!(r.security_level, SecurityLevel::Safe);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn test_javascript_escapes() {
        let r = esc("it's </script>\u{2028}", EscapeContext::JavaScript);
        assert_eq!(r.escaped, "it\\'s \\u003C\\/script\\u003E\\u2028");
    }

    #[test]
    fn test_javascript_control_fallback() {
        let r = esc("\u{1}", EscapeContext::JavaScript);
        assert_eq!(r.escaped, "\\u0001");
    }

    #[test]
    fn test_css_hex_escapes() {
        let r = esc("a b;", EscapeContext::Css);
        assert_eq!(r.escaped, "a\\20 b\\3b ");
        let r = esc("expression(alert(1))", EscapeContext::Css);
        assert!(r.escaped.starts_with("expression\\28 "));
        assert!(!r.is_incomplete());
        assert_eq!(r.security_level, SecurityLevel::Moderate);
    }

    #[test]
    fn test_url_uppercase_percent() {
        let r = esc("a b/ü?x=1", EscapeContext::Url);
        assert_eq!(r.escaped, "a%20b%2F%C3%BC%3Fx%3D1");
        assert_eq!(r.escaped_chars, 5);
    }

    #[test]
    fn test_url_neutralizes_script_uri() {
        let r = esc("javascript:alert(1)", EscapeContext::Url);
        assert_eq!(r.dangerous_patterns_found.len(), 1);
        assert!(!r.is_incomplete());
        assert!(r.escaped.contains("%3A"));
    }

    #[test]
    fn test_xml_entities() {
        let r = esc("<a>'x'</a>\u{7}", EscapeContext::Xml);
        assert_eq!(r.escaped, "&lt;a&gt;&apos;x&apos;&lt;/a&gt;");
    }

    #[test]
    fn test_plantuml_directive_neutralized() {
        let r = esc("label\n!include /etc/passwd", EscapeContext::PlantUml);
        assert_eq!(r.escaped, "label\\n~!include /etc/passwd");
        assert_eq!(r.dangerous_patterns_found[0].pattern, "plantuml_directive");
        assert!(!r.is_incomplete());
    }

    #[test]
    fn test_plantuml_builtin_neutralized() {
        let r = esc("%getenv(\"HOME\")", EscapeContext::PlantUml);
        assert!(r.escaped.starts_with("~%getenv"));
        assert!(!r.is_incomplete());
    }

    #[test]
    fn test_json_escapes() {
        let r = esc("\"</script>\"\n", EscapeContext::Json);
        assert_eq!(r.escaped, "\\\"\\u003c/script\\u003e\\\"\\n");
    }

    #[test]
    fn test_auto_detects_context() {
        let r = esc("@startuml\nAlice -> Bob\n@enduml", EscapeContext::Auto);
        assert_eq!(r.context, EscapeContext::Auto);
        assert_eq!(r.detected_context, Some(EscapeContext::PlantUml));
    }

    #[test]
    fn test_script_found_then_neutralized() {
        let r = esc("<script>alert(1)</script>", EscapeContext::Html);
        assert!(!r.dangerous_patterns_found.is_empty());
        assert!(!r.is_incomplete());
        assert_eq!(r.security_level, SecurityLevel::Moderate);
        assert!(r
            .warnings
            .iter()
            .all(|w| w.kind == IssueKind::DangerousPattern));
    }

    #[test]
    fn test_double_escape_stays_closed() {
        let once = esc("<img src=x onerror=alert(1)>", EscapeContext::Html);
        let twice = esc(&once.escaped, EscapeContext::Html);
        assert!(scan_dangerous(&twice.escaped, EscapeContext::Html).is_empty());
        assert!(twice.escaped.contains("&amp;lt;img"));
    }

    #[test]
    fn test_sanitizer_pre_pass() {
        let escaper = OutputEscaper::new().with_sanitizer(Arc::new(TagStripper::new()));
        let r = escaper
            .escape(
                "<b>bold</b><script>x()</script>",
                EscapeContext::Html,
                &EscapeOptions::default(),
            )
            .unwrap();
        assert!(r.sanitizer_used);
        assert_eq!(r.escaped, "bold");
    }

    #[test]
    fn test_sanitizer_skipped_for_js() {
        let escaper = OutputEscaper::new().with_sanitizer(Arc::new(TagStripper::new()));
        let r = escaper
            .escape("<b>x</b>", EscapeContext::JavaScript, &EscapeOptions::default())
            .unwrap();
        assert!(!r.sanitizer_used);
    }

    #[test]
    fn test_escape_many() {
        let results = OutputEscaper::new()
            .escape_many(["<a>", "b"], EscapeContext::Html)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].escaped, "&lt;a&gt;");
    }
}

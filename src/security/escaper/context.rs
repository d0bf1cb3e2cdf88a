//! Output context detection.
//!
//! Scores input against per-context pattern sets and picks the context
//! with the most matches. Ties go to the earlier entry in
//! [`DETECTION_PRIORITY`].

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::ShieldError;

/// Destination syntax for escaped output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EscapeContext {
    /// HTML body or attribute
    #[default]
    Html,
    /// JavaScript string literal
    #[serde(rename = "js")]
    JavaScript,
    /// CSS value
    Css,
    /// URL component
    Url,
    /// XML text or attribute
    Xml,
    /// PlantUML label
    PlantUml,
    /// JSON string
    Json,
    /// Detect from content
    Auto,
}

impl FromStr for EscapeContext {
    type Err = ShieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(EscapeContext::Html),
            "js" | "javascript" => Ok(EscapeContext::JavaScript),
            "css" => Ok(EscapeContext::Css),
            "url" => Ok(EscapeContext::Url),
            "xml" => Ok(EscapeContext::Xml),
            "plantuml" => Ok(EscapeContext::PlantUml),
            "json" => Ok(EscapeContext::Json),
            "auto" => Ok(EscapeContext::Auto),
            _ => Err(ShieldError::InvalidContext(s.to_string())),
        }
    }
}

impl fmt::Display for EscapeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeContext::Html => write!(f, "html"),
            EscapeContext::JavaScript => write!(f, "js"),
            EscapeContext::Css => write!(f, "css"),
            EscapeContext::Url => write!(f, "url"),
            EscapeContext::Xml => write!(f, "xml"),
            EscapeContext::PlantUml => write!(f, "plantuml"),
            EscapeContext::Json => write!(f, "json"),
            EscapeContext::Auto => write!(f, "auto"),
        }
    }
}

/// Tie-break order for detection
pub const DETECTION_PRIORITY: [EscapeContext; 6] = [
    EscapeContext::Html,
    EscapeContext::JavaScript,
    EscapeContext::Css,
    EscapeContext::Json,
    EscapeContext::PlantUml,
    EscapeContext::Url,
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

lazy_static! {
    static ref HTML_SIGNS: Vec<Regex> = compile(&[
        r"<[a-zA-Z][^>]*>",
        r"</[a-zA-Z][a-zA-Z0-9]*\s*>",
        r"&[a-zA-Z]+;|&#[0-9]+;",
        r"(?i)<!DOCTYPE",
    ]);
    static ref JS_SIGNS: Vec<Regex> = compile(&[
        r"\b(function|var|let|const|return|typeof|new)\b",
        r"=>",
        r"\b(document|window|console|JSON|Math)\s*\.",
        r"\w+\s*\([^()]*\)\s*;",
    ]);
    static ref CSS_SIGNS: Vec<Regex> = compile(&[
        r"[.#]?[a-zA-Z][\w-]*\s*\{[^{}]*\}",
        r"\b[a-z-]+\s*:\s*[^;{}\n]+;",
        r"@(media|import|font-face|keyframes)\b",
        r"\b\d+(px|em|rem|vh|vw)\b",
    ]);
    static ref JSON_SIGNS: Vec<Regex> = compile(&[
        r"^\s*[\{\[]",
        r#""[^"]*"\s*:"#,
        r"[\}\]]\s*$",
    ]);
    static ref PLANTUML_SIGNS: Vec<Regex> = compile(&[
        r"@startuml|@enduml",
        r"\b(participant|actor|usecase|activate|deactivate|skinparam|note|boundary|entity|database)\b",
        r"-+>|<-+",
        r"(?m)^\s*:[^;\n]*;",
    ]);
    static ref URL_SIGNS: Vec<Regex> = compile(&[
        r"^[a-zA-Z][a-zA-Z0-9+.-]*://",
        r"[?&][\w%.-]+=",
        r"%[0-9A-Fa-f]{2}",
    ]);
}

fn signs(context: EscapeContext) -> &'static [Regex] {
    match context {
        EscapeContext::Html => &HTML_SIGNS,
        EscapeContext::JavaScript => &JS_SIGNS,
        EscapeContext::Css => &CSS_SIGNS,
        EscapeContext::Json => &JSON_SIGNS,
        EscapeContext::PlantUml => &PLANTUML_SIGNS,
        EscapeContext::Url => &URL_SIGNS,
        EscapeContext::Xml | EscapeContext::Auto => &[],
    }
}

/// Detection outcome with per-context scores
#[derive(Debug, Clone, Serialize)]
pub struct ContextDetection {
    /// Winning context
    pub context: EscapeContext,
    /// Match count per candidate, in priority order
    pub scores: Vec<(EscapeContext, usize)>,
}

/// Scores content against per-context patterns.
#[derive(Debug, Clone, Default)]
pub struct ContextDetector;

impl ContextDetector {
    /// Create a detector
    pub fn new() -> Self {
        Self
    }

    /// Score every candidate and pick the best
    pub fn detect(&self, input: &str) -> ContextDetection {
        let scores: Vec<(EscapeContext, usize)> = DETECTION_PRIORITY
            .iter()
            .map(|&ctx| {
                let score = signs(ctx)
                    .iter()
                    .map(|re| re.find_iter(input).count())
                    .sum();
                (ctx, score)
            })
            .collect();

        // Strictly-greater keeps the earliest context on ties.
        let mut best = (EscapeContext::Html, 0);
        for &(ctx, score) in &scores {
            if score > best.1 {
                best = (ctx, score);
            }
        }

        ContextDetection {
            context: best.0,
            scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_html() {
        let d = ContextDetector::new().detect("<div class=\"x\"><b>hi</b></div>");
        assert_eq!(d.context, EscapeContext::Html);
    }

    #[test]
    fn test_detect_plantuml() {
        let d = ContextDetector::new()
            .detect("@startuml\nactor User\nUser -> System: ログイン\n@enduml");
        assert_eq!(d.context, EscapeContext::PlantUml);
    }

    #[test]
    fn test_detect_url() {
        let d = ContextDetector::new().detect("https://example.com/a?b=1&c=%20");
        assert_eq!(d.context, EscapeContext::Url);
    }

    #[test]
    fn test_detect_json() {
        let d = ContextDetector::new().detect(r#"{"name": "value", "n": 1}"#);
        assert_eq!(d.context, EscapeContext::Json);
    }

    #[test]
    fn test_plain_text_defaults_to_html() {
        let d = ContextDetector::new().detect("plain words");
        assert_eq!(d.context, EscapeContext::Html);
        assert!(d.scores.iter().all(|(_, s)| *s == 0));
    }

    fn score(d: &ContextDetection, ctx: EscapeContext) -> usize {
        d.scores.iter().find(|(c, _)| *c == ctx).map_or(0, |(_, s)| *s)
    }

    #[test]
    fn test_ties_go_to_earlier_context() {
        let detector = ContextDetector::new();

        let d = detector.detect("10px ]");
        assert_eq!(score(&d, EscapeContext::Css), 1);
        assert_eq!(score(&d, EscapeContext::Json), 1);
        assert_eq!(d.context, EscapeContext::Css);

        let d = detector.detect("a -> b => c");
        assert_eq!(score(&d, EscapeContext::JavaScript), 1);
        assert_eq!(score(&d, EscapeContext::PlantUml), 1);
        assert_eq!(d.context, EscapeContext::JavaScript);

        let d = detector.detect("&amp;%20");
        assert_eq!(score(&d, EscapeContext::Html), 1);
        assert_eq!(score(&d, EscapeContext::Url), 1);
        assert_eq!(d.context, EscapeContext::Html);
    }

    #[test]
    fn test_parse_context() {
        assert_eq!("javascript".parse::<EscapeContext>().unwrap(), EscapeContext::JavaScript);
        assert_eq!("JS".parse::<EscapeContext>().unwrap(), EscapeContext::JavaScript);
        assert!("yaml".parse::<EscapeContext>().is_err());
    }
}

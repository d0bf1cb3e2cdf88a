//! Threat patterns for rule-based input validation.
//!
//! Contains regex patterns for detecting common attack types in text
//! headed for a PlantUML editor page:
//! - Cross-site scripting (markup, URI schemes)
//! - SQL-like injection
//! - Dynamic code evaluation
//! - Prototype pollution and protected properties
//! - DOM manipulation and inline event handlers
//! - Shell command injection

use lazy_static::lazy_static;
use regex::Regex;

use super::types::{IssueKind, Severity};

/// A threat detection pattern
#[derive(Debug, Clone)]
pub struct ThreatPattern {
    /// Pattern name
    pub name: &'static str,
    /// Regex pattern
    pub pattern: &'static str,
    /// Issue tag raised on match
    pub kind: IssueKind,
    /// Severity
    pub severity: Severity,
    /// Description
    pub description: &'static str,
}

/// Cross-site scripting patterns
pub static XSS_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "script_tag",
        pattern: r"(?i)<\s*/?\s*script\b",
        kind: IssueKind::XssDetected,
        severity: Severity::Critical,
        description: "Script tag",
    },
    ThreatPattern {
        name: "javascript_uri",
        pattern: r"(?i)javascript\s*:",
        kind: IssueKind::XssDetected,
        severity: Severity::High,
        description: "javascript: URI scheme",
    },
    ThreatPattern {
        name: "vbscript_uri",
        pattern: r"(?i)vbscript\s*:",
        kind: IssueKind::XssDetected,
        severity: Severity::High,
        description: "vbscript: URI scheme",
    },
    ThreatPattern {
        name: "data_html_uri",
        pattern: r"(?i)data\s*:\s*text/html",
        kind: IssueKind::XssDetected,
        severity: Severity::High,
        description: "data: URI carrying HTML",
    },
    ThreatPattern {
        name: "embedding_tag",
        pattern: r"(?i)<\s*(iframe|object|embed|applet|frame|frameset|meta|base|link)\b",
        kind: IssueKind::XssDetected,
        severity: Severity::High,
        description: "Embedding or document-altering tag",
    },
    ThreatPattern {
        name: "style_tag",
        pattern: r"(?i)<\s*style\b",
        kind: IssueKind::XssDetected,
        severity: Severity::Medium,
        description: "Inline style block",
    },
    ThreatPattern {
        name: "css_expression",
        pattern: r"(?i)expression\s*\(",
        kind: IssueKind::XssDetected,
        severity: Severity::High,
        description: "CSS expression()",
    },
    ThreatPattern {
        name: "svg_script",
        pattern: r"(?i)<\s*svg\b[^>]*\bon[a-z]+\s*=",
        kind: IssueKind::XssDetected,
        severity: Severity::Critical,
        description: "SVG with inline handler",
    },
];

/// SQL-like injection patterns
pub static SQL_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "tautology",
        pattern: r#"(?i)['"]\s*(or|and)\s*['"]?\w+['"]?\s*=\s*['"]?\w+"#,
        kind: IssueKind::InjectionDetected,
        severity: Severity::High,
        description: "Boolean tautology",
    },
    ThreatPattern {
        name: "union_select",
        pattern: r"(?i)\bunion\b(\s+all)?\s+select\b",
        kind: IssueKind::InjectionDetected,
        severity: Severity::High,
        description: "UNION SELECT",
    },
    ThreatPattern {
        name: "stacked_statement",
        pattern: r"(?i);\s*(drop|delete|truncate|alter|insert|update|create)\s+(table|database|from|into|schema)\b",
        kind: IssueKind::InjectionDetected,
        severity: Severity::Critical,
        description: "Stacked destructive statement",
    },
    ThreatPattern {
        name: "comment_terminator",
        pattern: r"(?i)'\s*(--|#|/\*)",
        kind: IssueKind::InjectionDetected,
        severity: Severity::Medium,
        description: "Quote followed by comment",
    },
    ThreatPattern {
        name: "time_based",
        pattern: r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(|\bwaitfor\s+delay\b",
        kind: IssueKind::InjectionDetected,
        severity: Severity::High,
        description: "Time-based blind probe",
    },
];

/// Dynamic evaluation patterns
pub static EVAL_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "eval_call",
        pattern: r"\beval\s*\(",
        kind: IssueKind::EvalDetected,
        severity: Severity::High,
        description: "eval() call",
    },
    ThreatPattern {
        name: "function_constructor",
        pattern: r"\b(new\s+)?Function\s*\(",
        kind: IssueKind::EvalDetected,
        severity: Severity::High,
        description: "Function constructor",
    },
    ThreatPattern {
        name: "string_timer",
        pattern: r#"\b(setTimeout|setInterval)\s*\(\s*['"`]"#,
        kind: IssueKind::EvalDetected,
        severity: Severity::High,
        description: "Timer with string body",
    },
];

/// Prototype pollution patterns
pub static PROTOTYPE_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "proto_key",
        pattern: r"__proto__",
        kind: IssueKind::PrototypePollution,
        severity: Severity::Critical,
        description: "__proto__ access",
    },
    ThreatPattern {
        name: "constructor_prototype",
        pattern: r#"constructor\s*(\.\s*prototype|\[\s*['"]prototype['"]\s*\])"#,
        kind: IssueKind::PrototypePollution,
        severity: Severity::Critical,
        description: "constructor.prototype access",
    },
    ThreatPattern {
        name: "prototype_member",
        pattern: r#"\.\s*prototype\s*(\.|\[)|\[\s*['"]prototype['"]\s*\]"#,
        kind: IssueKind::PrototypePollution,
        severity: Severity::Critical,
        description: "Write through a prototype object",
    },
];

/// Protected property names
pub static PROTECTED_PROPERTY_PATTERNS: &[ThreatPattern] = &[ThreatPattern {
    name: "protected_property",
    pattern: r"__(defineGetter|defineSetter|lookupGetter|lookupSetter)__",
    kind: IssueKind::ProtectedPropertyAccess,
    severity: Severity::High,
    description: "Legacy accessor definition",
}];

/// DOM manipulation patterns
pub static DOM_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "document_write",
        pattern: r"\bdocument\s*\.\s*(write|writeln)\s*\(",
        kind: IssueKind::DomManipulation,
        severity: Severity::High,
        description: "document.write",
    },
    ThreatPattern {
        name: "html_sink",
        pattern: r"\.\s*(innerHTML|outerHTML)\s*=",
        kind: IssueKind::DomManipulation,
        severity: Severity::High,
        description: "HTML sink assignment",
    },
    ThreatPattern {
        name: "insert_adjacent",
        pattern: r"\.\s*insertAdjacentHTML\s*\(",
        kind: IssueKind::DomManipulation,
        severity: Severity::High,
        description: "insertAdjacentHTML",
    },
    ThreatPattern {
        name: "cookie_access",
        pattern: r"\bdocument\s*\.\s*cookie\b",
        kind: IssueKind::DomManipulation,
        severity: Severity::High,
        description: "Cookie access",
    },
    ThreatPattern {
        name: "script_element",
        pattern: r#"createElement\s*\(\s*['"]script['"]"#,
        kind: IssueKind::DomManipulation,
        severity: Severity::Critical,
        description: "Dynamic script element",
    },
    ThreatPattern {
        name: "location_assign",
        pattern: r"\b(window|document)\s*\.\s*location\s*(\.\s*href\s*)?=",
        kind: IssueKind::DomManipulation,
        severity: Severity::Medium,
        description: "Navigation by assignment",
    },
];

/// Inline event handler patterns
pub static EVENT_HANDLER_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "inline_handler",
        pattern: r"(?i)<[^>]*\son[a-z]+\s*=",
        kind: IssueKind::EventHandlerXss,
        severity: Severity::High,
        description: "Inline event handler attribute",
    },
    ThreatPattern {
        name: "handler_attribute",
        pattern: r#"(?i)\bon(load|error|click|mouseover|focus|blur|submit|toggle|animationstart)\s*=\s*['"]"#,
        kind: IssueKind::EventHandlerXss,
        severity: Severity::Medium,
        description: "Event handler attribute fragment",
    },
];

/// Shell command injection patterns
pub static COMMAND_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "command_chain",
        pattern: r"(;|&&|\|\|)\s*(rm|cat|curl|wget|sh|bash|zsh|nc|ncat|python[0-9.]*|perl|ruby|php|chmod|chown|kill|whoami|id|uname|ls|powershell|cmd)\b",
        kind: IssueKind::CommandInjection,
        severity: Severity::High,
        description: "Chained shell command",
    },
    ThreatPattern {
        name: "pipe_to_shell",
        pattern: r"\|\s*(sh|bash|zsh|nc|ncat|python[0-9.]*|perl|tee)\b",
        kind: IssueKind::CommandInjection,
        severity: Severity::High,
        description: "Pipe into interpreter",
    },
    ThreatPattern {
        name: "command_substitution",
        pattern: r"\$\([^)]*\)|`[^`]+`",
        kind: IssueKind::CommandInjection,
        severity: Severity::High,
        description: "Command substitution",
    },
    ThreatPattern {
        name: "variable_expansion",
        pattern: r"\$\{[A-Za-z_][A-Za-z0-9_]*\}",
        kind: IssueKind::CommandInjection,
        severity: Severity::Medium,
        description: "Shell variable expansion",
    },
];

/// Compile a pattern table, dropping entries that fail to compile.
pub(crate) fn compile(patterns: &'static [ThreatPattern]) -> Vec<(Regex, &'static ThreatPattern)> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p.pattern).ok().map(|r| (r, p)))
        .collect()
}

lazy_static! {
    /// Compiled XSS patterns
    pub static ref XSS_REGEX: Vec<(Regex, &'static ThreatPattern)> = compile(XSS_PATTERNS);

    /// Compiled SQL patterns
    pub static ref SQL_REGEX: Vec<(Regex, &'static ThreatPattern)> = compile(SQL_PATTERNS);

    /// Compiled eval patterns
    pub static ref EVAL_REGEX: Vec<(Regex, &'static ThreatPattern)> = compile(EVAL_PATTERNS);

    /// Compiled prototype pollution patterns
    pub static ref PROTOTYPE_REGEX: Vec<(Regex, &'static ThreatPattern)> =
        compile(PROTOTYPE_PATTERNS);

    /// Compiled protected property patterns
    pub static ref PROTECTED_REGEX: Vec<(Regex, &'static ThreatPattern)> =
        compile(PROTECTED_PROPERTY_PATTERNS);

    /// Compiled DOM manipulation patterns
    pub static ref DOM_REGEX: Vec<(Regex, &'static ThreatPattern)> = compile(DOM_PATTERNS);

    /// Compiled event handler patterns
    pub static ref EVENT_HANDLER_REGEX: Vec<(Regex, &'static ThreatPattern)> =
        compile(EVENT_HANDLER_PATTERNS);

    /// Compiled command injection patterns
    pub static ref COMMAND_REGEX: Vec<(Regex, &'static ThreatPattern)> =
        compile(COMMAND_PATTERNS);
}

/// A pattern hit with the substrings it matched
#[derive(Debug, Clone)]
pub struct PatternHit {
    /// The pattern that fired
    pub pattern: &'static ThreatPattern,
    /// Matched substrings, capped at five
    pub matches: Vec<String>,
}

/// Sweep one compiled table over the content
pub fn sweep(table: &[(Regex, &'static ThreatPattern)], content: &str) -> Vec<PatternHit> {
    table
        .iter()
        .filter_map(|(regex, pattern)| {
            let matches: Vec<String> = regex
                .find_iter(content)
                .take(5)
                .map(|m| m.as_str().to_string())
                .collect();
            (!matches.is_empty()).then_some(PatternHit { pattern, matches })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tables() -> [&'static [ThreatPattern]; 8] {
        [
            XSS_PATTERNS,
            SQL_PATTERNS,
            EVAL_PATTERNS,
            PROTOTYPE_PATTERNS,
            PROTECTED_PROPERTY_PATTERNS,
            DOM_PATTERNS,
            EVENT_HANDLER_PATTERNS,
            COMMAND_PATTERNS,
        ]
    }

    #[test]
    fn test_all_patterns_compile() {
        for table in all_tables() {
            for pattern in table {
                assert!(
                    Regex::new(pattern.pattern).is_ok(),
                    "pattern {} failed to compile",
                    pattern.name
                );
            }
        }
    }

    #[test]
    fn test_script_tag_detection() {
        let hits = sweep(&XSS_REGEX, "<script>alert(1)</script>");
        assert!(hits.iter().any(|h| h.pattern.name == "script_tag"));
        assert_eq!(hits[0].matches.len(), 2);
    }

    #[test]
    fn test_prototype_word_in_prose_is_clean() {
        let hits = sweep(&PROTOTYPE_REGEX, "We built a prototype of the login flow");
        assert!(hits.is_empty());
    }

    #[test]
    fn test_prototype_pollution_detection() {
        assert!(!sweep(&PROTOTYPE_REGEX, r#"{"__proto__": {"admin": true}}"#).is_empty());
        assert!(!sweep(&PROTOTYPE_REGEX, "a.constructor.prototype.polluted = 1").is_empty());
        assert!(!sweep(&PROTOTYPE_REGEX, "Object.prototype.isAdmin = true").is_empty());
    }

    #[test]
    fn test_activity_diagram_semicolons_are_clean() {
        let content = "@startuml\nstart\n:ユーザーがログイン;\n:データを保存;\nstop\n@enduml";
        assert!(sweep(&COMMAND_REGEX, content).is_empty());
        assert!(sweep(&SQL_REGEX, content).is_empty());
    }

    #[test]
    fn test_command_chain_detection() {
        let hits = sweep(&COMMAND_REGEX, "diagram.png; rm -rf /");
        assert!(hits.iter().any(|h| h.pattern.name == "command_chain"));
    }

    #[test]
    fn test_sql_detection() {
        assert!(!sweep(&SQL_REGEX, "' OR '1'='1").is_empty());
        assert!(!sweep(&SQL_REGEX, "1; DROP TABLE users").is_empty());
    }
}

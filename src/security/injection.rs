//! Shell, SQL, path and PlantUML-preprocessor injection checks.
//!
//! The validator sweeps for broad signatures; these checks go deeper on
//! one attack class each and produce a sanitized variant of the input.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::patterns::{compile, sweep, ThreatPattern, COMMAND_REGEX, SQL_REGEX};
use super::types::{Issue, IssueKind, SecurityLevel, Severity};

/// Extra shell patterns beyond the validator sweep
pub static SHELL_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "sensitive_redirect",
        pattern: r">\s*/(etc|dev|proc|sys|boot)/",
        kind: IssueKind::CommandInjection,
        severity: Severity::Critical,
        description: "Redirection into a system path",
    },
    ThreatPattern {
        name: "download_and_run",
        pattern: r"(?i)\b(curl|wget)\b[^|;&]*(\||;|&&)\s*(sh|bash)\b",
        kind: IssueKind::CommandInjection,
        severity: Severity::Critical,
        description: "Download piped into a shell",
    },
    ThreatPattern {
        name: "destructive_command",
        pattern: r"\brm\s+-[a-zA-Z]*[rf][a-zA-Z]*\s+/",
        kind: IssueKind::CommandInjection,
        severity: Severity::Critical,
        description: "Recursive delete from root",
    },
    ThreatPattern {
        name: "background_job",
        pattern: r"&\s*$",
        kind: IssueKind::CommandInjection,
        severity: Severity::Medium,
        description: "Trailing background operator",
    },
    ThreatPattern {
        name: "newline_command",
        pattern: r"[\r\n]\s*(rm|curl|wget|sh|bash|nc)\s",
        kind: IssueKind::CommandInjection,
        severity: Severity::High,
        description: "Command on a new line",
    },
];

/// Path traversal patterns
pub static PATH_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "dot_dot_slash",
        pattern: r"\.\.[/\\]",
        kind: IssueKind::PathTraversal,
        severity: Severity::High,
        description: "Parent directory reference",
    },
    ThreatPattern {
        name: "encoded_traversal",
        pattern: r"(?i)(%2e%2e|%252e%252e|\.\.%2f|%2e%2e%2f|%c0%ae)",
        kind: IssueKind::PathTraversal,
        severity: Severity::High,
        description: "Encoded parent directory reference",
    },
    ThreatPattern {
        name: "sensitive_file",
        pattern: r"(?i)(/etc/(passwd|shadow|hosts)|/proc/self|c:\\windows\\|\.ssh/|\.env\b)",
        kind: IssueKind::PathTraversal,
        severity: Severity::Critical,
        description: "Sensitive system file",
    },
    ThreatPattern {
        name: "null_byte_path",
        pattern: r"(%00|\x00)",
        kind: IssueKind::PathTraversal,
        severity: Severity::High,
        description: "Null byte truncation",
    },
];

/// PlantUML preprocessor abuse
pub static PLANTUML_PATTERNS: &[ThreatPattern] = &[
    ThreatPattern {
        name: "include_directive",
        pattern: r"(?im)^\s*!(include|includeurl|includesub|includedef|import)\b.*$",
        kind: IssueKind::PlantumlDirective,
        severity: Severity::High,
        description: "File or URL inclusion",
    },
    ThreatPattern {
        name: "env_builtin",
        pattern: r"(?i)%(getenv|get_variable_value)\s*\(",
        kind: IssueKind::PlantumlDirective,
        severity: Severity::High,
        description: "Environment access from the preprocessor",
    },
    ThreatPattern {
        name: "file_builtin",
        pattern: r"(?i)%(load_json|file_exists|filename|dirpath|filenameNoExtension)\s*\(",
        kind: IssueKind::PlantumlDirective,
        severity: Severity::High,
        description: "Filesystem access from the preprocessor",
    },
    ThreatPattern {
        name: "dangerous_define",
        pattern: r#"(?im)^\s*!(define|definelong)\s+\S+.*(<\s*script|javascript:|%getenv|!include|@startuml|@enduml).*$"#,
        kind: IssueKind::PlantumlDirective,
        severity: Severity::Critical,
        description: "Macro definition carrying a payload",
    },
];

lazy_static! {
    static ref SHELL_REGEX: Vec<(Regex, &'static ThreatPattern)> = compile(SHELL_PATTERNS);
    static ref PATH_REGEX: Vec<(Regex, &'static ThreatPattern)> = compile(PATH_PATTERNS);
    static ref PLANTUML_REGEX: Vec<(Regex, &'static ThreatPattern)> = compile(PLANTUML_PATTERNS);
    static ref SHELL_META: Regex = Regex::new(r"[;&|`$<>\\]").expect("static regex");
}

/// A pattern that fired during an injection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedPattern {
    /// Pattern name
    pub name: String,
    /// Issue tag
    #[serde(rename = "type")]
    pub kind: IssueKind,
    /// Severity
    pub severity: Severity,
    /// Matched substrings
    pub matches: Vec<String>,
}

impl DetectedPattern {
    /// Convert into a validation issue
    pub fn to_issue(&self) -> Issue {
        Issue::new(
            self.kind,
            self.severity,
            format!("{} pattern '{}' detected", self.kind, self.name),
        )
        .with_matches(&self.name, self.matches.clone())
    }
}

/// Outcome of an injection check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionCheckResult {
    /// No pattern fired
    pub is_safe: bool,
    /// Patterns that fired
    pub detected_patterns: Vec<DetectedPattern>,
    /// Input with the offending constructs removed
    pub sanitized: String,
    /// Level implied by the worst pattern
    pub security_level: SecurityLevel,
}

impl InjectionCheckResult {
    fn from_hits(
        hits: Vec<(&'static ThreatPattern, Vec<String>)>,
        sanitized: String,
    ) -> Self {
        let mut security_level = SecurityLevel::Safe;
        let detected_patterns: Vec<DetectedPattern> = hits
            .into_iter()
            .map(|(p, matches)| {
                security_level.escalate(p.severity.implied_level());
                DetectedPattern {
                    name: p.name.to_string(),
                    kind: p.kind,
                    severity: p.severity,
                    matches,
                }
            })
            .collect();

        Self {
            is_safe: detected_patterns.is_empty(),
            detected_patterns,
            sanitized,
            security_level,
        }
    }

    /// Issues for every detected pattern
    pub fn issues(&self) -> Vec<Issue> {
        self.detected_patterns
            .iter()
            .map(DetectedPattern::to_issue)
            .collect()
    }
}

fn collect_hits(
    tables: &[&[(Regex, &'static ThreatPattern)]],
    input: &str,
) -> Vec<(&'static ThreatPattern, Vec<String>)> {
    tables
        .iter()
        .flat_map(|table| sweep(table, input))
        .map(|hit| (hit.pattern, hit.matches))
        .collect()
}

/// Shell command injection checks.
#[derive(Debug, Clone, Default)]
pub struct CommandInjectionProtector;

impl CommandInjectionProtector {
    /// Create a protector
    pub fn new() -> Self {
        Self
    }

    /// Check text that may reach a shell or a renderer command line
    pub fn validate_command(&self, input: &str) -> InjectionCheckResult {
        let hits = collect_hits(&[COMMAND_REGEX.as_slice(), SHELL_REGEX.as_slice()], input);
        let sanitized = if hits.is_empty() {
            input.to_string()
        } else {
            SHELL_META.replace_all(input, "").into_owned()
        };

        if !hits.is_empty() {
            debug!(count = hits.len(), "command injection patterns detected");
        }
        InjectionCheckResult::from_hits(hits, sanitized)
    }

    /// Quote an argument for a POSIX shell
    pub fn quote_argument(&self, arg: &str) -> String {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// SQL, path traversal and PlantUML preprocessor checks.
#[derive(Debug, Clone, Default)]
pub struct InjectionPrevention;

impl InjectionPrevention {
    /// Create the checker
    pub fn new() -> Self {
        Self
    }

    /// SQL-like injection
    pub fn check_sql_injection(&self, input: &str) -> InjectionCheckResult {
        let hits = collect_hits(&[SQL_REGEX.as_slice()], input);
        let sanitized = if hits.is_empty() {
            input.to_string()
        } else {
            input
                .replace('\'', "''")
                .replace("--", "")
                .replace(';', "")
        };
        InjectionCheckResult::from_hits(hits, sanitized)
    }

    /// Path traversal
    pub fn check_path_traversal(&self, input: &str) -> InjectionCheckResult {
        let hits = collect_hits(&[PATH_REGEX.as_slice()], input);
        let sanitized = if hits.is_empty() {
            input.to_string()
        } else {
            let mut out = input.replace('\0', "").replace("%00", "");
            while out.contains("../") || out.contains("..\\") {
                out = out.replace("../", "").replace("..\\", "");
            }
            out
        };
        InjectionCheckResult::from_hits(hits, sanitized)
    }

    /// PlantUML preprocessor abuse
    pub fn check_plantuml_injection(&self, input: &str) -> InjectionCheckResult {
        let hits = collect_hits(&[PLANTUML_REGEX.as_slice()], input);
        let sanitized = if hits.is_empty() {
            input.to_string()
        } else {
            strip_plantuml_directives(input)
        };
        InjectionCheckResult::from_hits(hits, sanitized)
    }
}

/// Drop include directives and payload-carrying macro definitions, and
/// disarm preprocessor builtins.
pub fn strip_plantuml_directives(input: &str) -> String {
    let mut out = input.to_string();
    for (regex, pattern) in PLANTUML_REGEX.iter() {
        out = match pattern.name {
            "include_directive" | "dangerous_define" => regex.replace_all(&out, "").into_owned(),
            _ => regex
                .replace_all(&out, |caps: &regex::Captures<'_>| caps[0].replacen('%', "", 1))
                .into_owned(),
        };
    }
    out
}

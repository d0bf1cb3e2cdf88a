//! Shared result and classification types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ShieldError;

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Suspicious
    Medium,
    /// Likely attack
    High,
    /// Confirmed attack signature
    Critical,
}

impl Severity {
    /// Weight contributed to the middleware threat score
    pub fn threat_weight(self) -> u32 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 10,
            Severity::High => 20,
            Severity::Critical => 30,
        }
    }

    /// Lowest security level implied by a single issue of this severity
    pub fn implied_level(self) -> SecurityLevel {
        match self {
            Severity::Low => SecurityLevel::Safe,
            Severity::Medium => SecurityLevel::Moderate,
            Severity::High => SecurityLevel::Risky,
            Severity::Critical => SecurityLevel::Dangerous,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Overall security level of a piece of content.
///
/// Levels only ever move upwards while issues accumulate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Nothing detected
    #[default]
    Safe,
    /// Minor findings
    Moderate,
    /// At least one likely attack
    Risky,
    /// Attack signatures present
    Dangerous,
    /// Threat score in the critical band
    Critical,
}

impl SecurityLevel {
    /// Base threat score for this level
    pub fn base_score(self) -> u32 {
        match self {
            SecurityLevel::Safe => 0,
            SecurityLevel::Moderate => 25,
            SecurityLevel::Risky => 50,
            SecurityLevel::Dangerous => 75,
            SecurityLevel::Critical => 100,
        }
    }

    /// Band a 0-100 threat score into a level
    pub fn from_threat_score(score: u32) -> Self {
        match score {
            80.. => SecurityLevel::Critical,
            60..=79 => SecurityLevel::Dangerous,
            40..=59 => SecurityLevel::Risky,
            20..=39 => SecurityLevel::Moderate,
            _ => SecurityLevel::Safe,
        }
    }

    /// Raise to `other` if it is more severe
    pub fn escalate(&mut self, other: SecurityLevel) {
        if other > *self {
            *self = other;
        }
    }

    /// Dangerous or critical
    pub fn is_unsafe(self) -> bool {
        self >= SecurityLevel::Dangerous
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityLevel::Safe => write!(f, "safe"),
            SecurityLevel::Moderate => write!(f, "moderate"),
            SecurityLevel::Risky => write!(f, "risky"),
            SecurityLevel::Dangerous => write!(f, "dangerous"),
            SecurityLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Issue taxonomy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    /// Input was null / absent
    NullInput,
    /// Input was not a string
    InvalidType,
    /// Input exceeded a length limit
    InvalidLength,
    /// Input failed the encoding round trip
    InvalidEncoding,
    /// Input contains blacklisted characters
    InvalidCharacters,
    /// Input is missing required structure
    InvalidFormat,
    /// Cross-site scripting signature
    XssDetected,
    /// Generic injection signature
    InjectionDetected,
    /// SQL injection signature
    SqlInjection,
    /// Shell command injection signature
    CommandInjection,
    /// Path traversal signature
    PathTraversal,
    /// PlantUML preprocessor directive abuse
    PlantumlDirective,
    /// Dynamic code evaluation
    EvalDetected,
    /// Prototype pollution attempt
    PrototypePollution,
    /// Access to a protected object property
    ProtectedPropertyAccess,
    /// DOM manipulation call
    DomManipulation,
    /// Inline event handler attribute
    EventHandlerXss,
    /// Configured or escaper dangerous pattern
    DangerousPattern,
    /// Escaped output still matches a dangerous pattern
    EscapeIncomplete,
    /// A validation check failed internally
    ValidationError,
    /// The middleware pipeline failed internally
    MiddlewareError,
    /// Output withheld by quarantine policy
    Quarantined,
    /// Rejected by strict mode
    StrictModeViolation,
}

impl IssueKind {
    /// Taxonomy tag as it appears in logs and JSON
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::NullInput => "NULL_INPUT",
            IssueKind::InvalidType => "INVALID_TYPE",
            IssueKind::InvalidLength => "INVALID_LENGTH",
            IssueKind::InvalidEncoding => "INVALID_ENCODING",
            IssueKind::InvalidCharacters => "INVALID_CHARACTERS",
            IssueKind::InvalidFormat => "INVALID_FORMAT",
            IssueKind::XssDetected => "XSS_DETECTED",
            IssueKind::InjectionDetected => "INJECTION_DETECTED",
            IssueKind::SqlInjection => "SQL_INJECTION",
            IssueKind::CommandInjection => "COMMAND_INJECTION",
            IssueKind::PathTraversal => "PATH_TRAVERSAL",
            IssueKind::PlantumlDirective => "PLANTUML_DIRECTIVE",
            IssueKind::EvalDetected => "EVAL_DETECTED",
            IssueKind::PrototypePollution => "PROTOTYPE_POLLUTION",
            IssueKind::ProtectedPropertyAccess => "PROTECTED_PROPERTY_ACCESS",
            IssueKind::DomManipulation => "DOM_MANIPULATION",
            IssueKind::EventHandlerXss => "EVENT_HANDLER_XSS",
            IssueKind::DangerousPattern => "DANGEROUS_PATTERN",
            IssueKind::EscapeIncomplete => "ESCAPE_INCOMPLETE",
            IssueKind::ValidationError => "VALIDATION_ERROR",
            IssueKind::MiddlewareError => "MIDDLEWARE_ERROR",
            IssueKind::Quarantined => "QUARANTINED",
            IssueKind::StrictModeViolation => "STRICT_MODE_VIOLATION",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Taxonomy tag
    #[serde(rename = "type")]
    pub kind: IssueKind,
    /// Human readable message
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// Name of the pattern that fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Matched substrings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
}

impl Issue {
    /// Create an issue without pattern details
    pub fn new(kind: IssueKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            severity,
            pattern: None,
            matches: Vec::new(),
        }
    }

    /// Attach the pattern name and matched substrings
    pub fn with_matches(mut self, pattern: &str, matches: Vec<String>) -> Self {
        self.pattern = Some(pattern.to_string());
        self.matches = matches;
        self
    }
}

/// Outcome of [`InputValidator::validate`](super::InputValidator::validate).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// No critical issue and fewer than three high issues
    pub is_valid: bool,
    /// High and critical issues
    pub errors: Vec<Issue>,
    /// Low and medium issues
    pub warnings: Vec<Issue>,
    /// Best-effort destructive rewrite of the input
    pub sanitized_input: String,
    /// Aggregated level
    pub security_level: SecurityLevel,
    /// `eval(` and friends
    pub eval_detected: bool,
    /// `__proto__`, `constructor.prototype`
    pub prototype_pollution_detected: bool,
    /// DOM manipulation or inline event handlers
    #[serde(rename = "advancedXSSDetected")]
    pub advanced_xss_detected: bool,
    /// Shell metacharacter chains
    pub command_injection_detected: bool,
    /// When the result was produced
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    pub(crate) fn new(sanitized_input: String) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            sanitized_input,
            security_level: SecurityLevel::Safe,
            eval_detected: false,
            prototype_pollution_detected: false,
            advanced_xss_detected: false,
            command_injection_detected: false,
            timestamp: Utc::now(),
        }
    }

    /// Route an issue to `errors` or `warnings` by severity
    pub(crate) fn push(&mut self, issue: Issue) {
        if issue.severity >= Severity::High {
            self.errors.push(issue);
        } else {
            self.warnings.push(issue);
        }
    }

    /// All issues, errors first
    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// Whether any issue carries the given tag
    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues().any(|i| i.kind == kind)
    }
}

/// What kind of text is being validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// Full PlantUML source
    PlantUml,
    /// Actor / participant name
    Actor,
    /// Action or message text
    Action,
    /// Free text (Japanese natural-language descriptions)
    #[default]
    General,
    /// Text that may reach a shell
    Command,
    /// Text that may reach a query
    Query,
}

impl InputType {
    /// Command injection check applies
    pub fn needs_command_check(self) -> bool {
        matches!(
            self,
            InputType::Command | InputType::PlantUml | InputType::General
        )
    }

    /// SQL injection check applies
    pub fn needs_sql_check(self) -> bool {
        matches!(self, InputType::Query | InputType::General)
    }
}

impl FromStr for InputType {
    type Err = ShieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plantuml" => Ok(InputType::PlantUml),
            "actor" => Ok(InputType::Actor),
            "action" => Ok(InputType::Action),
            "general" => Ok(InputType::General),
            "command" => Ok(InputType::Command),
            "query" => Ok(InputType::Query),
            _ => Err(ShieldError::InvalidInputType(s.to_string())),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputType::PlantUml => write!(f, "plantuml"),
            InputType::Actor => write!(f, "actor"),
            InputType::Action => write!(f, "action"),
            InputType::General => write!(f, "general"),
            InputType::Command => write!(f, "command"),
            InputType::Query => write!(f, "query"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bands() {
        assert_eq!(SecurityLevel::from_threat_score(0), SecurityLevel::Safe);
        assert_eq!(SecurityLevel::from_threat_score(19), SecurityLevel::Safe);
        assert_eq!(SecurityLevel::from_threat_score(20), SecurityLevel::Moderate);
        assert_eq!(SecurityLevel::from_threat_score(40), SecurityLevel::Risky);
        assert_eq!(SecurityLevel::from_threat_score(60), SecurityLevel::Dangerous);
        assert_eq!(SecurityLevel::from_threat_score(80), SecurityLevel::Critical);
        assert_eq!(SecurityLevel::from_threat_score(100), SecurityLevel::Critical);
    }

    #[test]
    fn test_escalate_is_monotonic() {
        let mut level = SecurityLevel::Risky;
        level.escalate(SecurityLevel::Moderate);
        assert_eq!(level, SecurityLevel::Risky);
        level.escalate(SecurityLevel::Dangerous);
        assert_eq!(level, SecurityLevel::Dangerous);
    }

    #[test]
    fn test_issue_routing() {
        let mut result = ValidationResult::new(String::new());
        result.push(Issue::new(IssueKind::InvalidFormat, Severity::Low, "x"));
        result.push(Issue::new(IssueKind::XssDetected, Severity::Critical, "y"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.has(IssueKind::XssDetected));
    }

    #[test]
    fn test_input_type_parse() {
        assert_eq!("PlantUML".parse::<InputType>().unwrap(), InputType::PlantUml);
        assert!("shellcode".parse::<InputType>().is_err());
    }

    #[test]
    fn test_issue_kind_serializes_as_tag() {
        let json = serde_json::to_string(&IssueKind::PrototypePollution).unwrap();
        assert_eq!(json, "\"PROTOTYPE_POLLUTION\"");
        assert_eq!(IssueKind::EventHandlerXss.to_string(), "EVENT_HANDLER_XSS");
    }
}

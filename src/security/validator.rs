//! Input validation.
//!
//! [`InputValidator::validate`] runs three stages over one input string:
//!
//! 1. Basic checks (null, type, length, encoding). A null, type or length
//!    failure returns immediately with `is_valid = false`. An encoding
//!    failure invalidates the result, but the offending characters are
//!    dropped and the remaining stages still run on what is left.
//! 2. Type-specific checks for PlantUML sources, actor names and action
//!    text.
//! 3. Regex sweeps over the pattern tables in [`super::patterns`], plus any
//!    custom patterns from configuration.
//!
//! The sanitized input is a destructive rewrite: a type-specific pass
//! (directive removal for PlantUML, character stripping for actor names),
//! entity escaping (or the configured [`HtmlSanitizer`]), then removal of
//! protected property names and code-evaluation call prefixes.
//!
//! Validation never fails. Internal errors become a `VALIDATION_ERROR`
//! issue on an invalid result.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::escaper::escape_html;
use super::injection::{strip_plantuml_directives, InjectionPrevention};
use super::patterns::{
    sweep, PatternHit, COMMAND_REGEX, DOM_REGEX, EVAL_REGEX, EVENT_HANDLER_REGEX, PROTECTED_REGEX,
    PROTOTYPE_REGEX, SQL_REGEX, XSS_REGEX,
};
use super::sanitizer::{HtmlSanitizer, SanitizeOptions};
use super::types::{InputType, Issue, IssueKind, SecurityLevel, Severity, ValidationResult};
use crate::config::ValidatorConfig;
use crate::error::Result;

/// Characters not allowed in actor names
pub const ACTOR_BLACKLIST: &[char] = &[
    '<', '>', '"', '\'', '&', ';', '{', '}', '(', ')', '[', ']', '`', '$', '|',
];

/// Number of high issues that invalidates a result
const HIGH_ISSUE_LIMIT: usize = 3;

lazy_static! {
    static ref PROTECTED_STRIP: Regex = Regex::new(
        r"__proto__|__(defineGetter|defineSetter|lookupGetter|lookupSetter)__|constructor\s*\.\s*prototype"
    )
    .expect("static regex");

    static ref CALL_PREFIX_STRIP: Regex = Regex::new(
        r#"\beval\s*\(|\b(new\s+)?Function\s*\(|\b(setTimeout|setInterval)\s*\(\s*(&quot;|&#39;|&#96;|["'`])"#
    )
    .expect("static regex");

    static ref START_TAG: Regex = Regex::new(r"(?im)^\s*@startuml\b").expect("static regex");
    static ref END_TAG: Regex = Regex::new(r"(?im)^\s*@enduml\b").expect("static regex");
}

/// Pattern-based validator and sanitizer for a single input.
#[derive(Clone)]
pub struct InputValidator {
    config: ValidatorConfig,
    blocked: Vec<Regex>,
    sanitizer: Option<Arc<dyn HtmlSanitizer>>,
    injection: InjectionPrevention,
}

impl std::fmt::Debug for InputValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputValidator")
            .field("config", &self.config)
            .field("blocked", &self.blocked.len())
            .field("sanitizer", &self.sanitizer.is_some())
            .finish()
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl InputValidator {
    /// Create a validator with default limits and no custom patterns
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
            blocked: Vec::new(),
            sanitizer: None,
            injection: InjectionPrevention::new(),
        }
    }

    /// Create a validator from configuration
    ///
    /// Fails if a custom blocked pattern does not compile.
    pub fn with_config(config: ValidatorConfig) -> Result<Self> {
        let blocked = config
            .blocked_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            blocked,
            sanitizer: None,
            injection: InjectionPrevention::new(),
        })
    }

    /// Sanitize through `sanitizer` instead of entity escaping
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn HtmlSanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate an optional input. `None` stands for a missing value.
    pub fn validate(&self, input: Option<&str>, input_type: InputType) -> ValidationResult {
        let Some(input) = input else {
            return rejected(Issue::new(
                IssueKind::NullInput,
                Severity::Medium,
                "Input is null or undefined",
            ));
        };

        match self.run(input, input_type) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, input_type = %input_type, "validation failed");
                rejected(Issue::new(
                    IssueKind::ValidationError,
                    Severity::Critical,
                    format!("Validation error: {e}"),
                ))
            },
        }
    }

    /// Validate a dynamically typed value; non-strings are `INVALID_TYPE`
    pub fn validate_value(&self, value: &Value, input_type: InputType) -> ValidationResult {
        match value {
            Value::Null => self.validate(None, input_type),
            Value::String(s) => self.validate(Some(s), input_type),
            other => rejected(Issue::new(
                IssueKind::InvalidType,
                Severity::Medium,
                format!("Expected a string, got {}", json_type_name(other)),
            )),
        }
    }

    fn run(&self, input: &str, input_type: InputType) -> Result<ValidationResult> {
        if let Some(issue) = self.length_check(input) {
            debug!(kind = %issue.kind, "basic check failed");
            return Ok(rejected(issue));
        }

        let mut result = ValidationResult::new(String::new());
        let encoding = encoding_check(input);
        let cleaned: String;
        let input = match encoding {
            Some(issue) => {
                debug!(kind = %issue.kind, "dropping suspicious characters");
                result.push(issue);
                cleaned = input.chars().filter(|c| !is_suspicious_char(*c)).collect();
                cleaned.as_str()
            },
            None => input,
        };

        self.type_checks(input, input_type, &mut result);
        self.sweep_patterns(input, &mut result);
        result.sanitized_input = self.sanitize(input, input_type)?;
        finalize(&mut result);
        if result.has(IssueKind::InvalidEncoding) {
            result.is_valid = false;
        }

        debug!(
            input_type = %input_type,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            level = %result.security_level,
            "validation complete"
        );
        Ok(result)
    }

    fn length_check(&self, input: &str) -> Option<Issue> {
        let len = input.chars().count();
        if len > self.config.max_length {
            return Some(Issue::new(
                IssueKind::InvalidLength,
                Severity::High,
                format!(
                    "Input length {len} exceeds maximum {}",
                    self.config.max_length
                ),
            ));
        }
        None
    }

    fn type_checks(&self, input: &str, input_type: InputType, result: &mut ValidationResult) {
        match input_type {
            InputType::PlantUml => {
                if !START_TAG.is_match(input) || !END_TAG.is_match(input) {
                    result.push(Issue::new(
                        IssueKind::InvalidFormat,
                        Severity::Low,
                        "PlantUML source should be wrapped in @startuml/@enduml",
                    ));
                }
                for detected in self.injection.check_plantuml_injection(input).detected_patterns {
                    result.push(detected.to_issue());
                }
            },
            InputType::Actor => {
                let len = input.chars().count();
                if len > self.config.max_actor_length {
                    result.push(Issue::new(
                        IssueKind::InvalidLength,
                        Severity::Medium,
                        format!(
                            "Actor name length {len} exceeds maximum {}",
                            self.config.max_actor_length
                        ),
                    ));
                }
                let found: Vec<String> = input
                    .chars()
                    .filter(|c| ACTOR_BLACKLIST.contains(c))
                    .map(String::from)
                    .collect();
                if !found.is_empty() {
                    result.push(
                        Issue::new(
                            IssueKind::InvalidCharacters,
                            Severity::Medium,
                            "Actor name contains forbidden characters",
                        )
                        .with_matches("actor_blacklist", found),
                    );
                }
            },
            InputType::Action => {
                let len = input.chars().count();
                if len > self.config.max_action_length {
                    result.push(Issue::new(
                        IssueKind::InvalidLength,
                        Severity::Medium,
                        format!(
                            "Action text length {len} exceeds maximum {}",
                            self.config.max_action_length
                        ),
                    ));
                }
            },
            InputType::General | InputType::Command | InputType::Query => {},
        }
    }

    fn sweep_patterns(&self, input: &str, result: &mut ValidationResult) {
        let xss = sweep(&XSS_REGEX, input);
        let sql = sweep(&SQL_REGEX, input);
        let eval = sweep(&EVAL_REGEX, input);
        let proto = sweep(&PROTOTYPE_REGEX, input);
        let protected = sweep(&PROTECTED_REGEX, input);
        let dom = sweep(&DOM_REGEX, input);
        let events = sweep(&EVENT_HANDLER_REGEX, input);
        let command = sweep(&COMMAND_REGEX, input);

        result.eval_detected = !eval.is_empty();
        result.prototype_pollution_detected = !proto.is_empty();
        result.advanced_xss_detected = !dom.is_empty() || !events.is_empty();
        result.command_injection_detected = !command.is_empty();

        for hit in [xss, sql, eval, proto, protected, dom, events, command]
            .into_iter()
            .flatten()
        {
            result.push(hit_issue(&hit));
        }

        for regex in &self.blocked {
            let matches: Vec<String> = regex
                .find_iter(input)
                .take(5)
                .map(|m| m.as_str().to_string())
                .collect();
            if !matches.is_empty() {
                result.push(
                    Issue::new(
                        IssueKind::DangerousPattern,
                        Severity::High,
                        format!("Blocked pattern '{}' matched", regex.as_str()),
                    )
                    .with_matches(regex.as_str(), matches),
                );
            }
        }
    }

    fn sanitize(&self, input: &str, input_type: InputType) -> Result<String> {
        // Type-specific rewrites run on the raw text: escaping would hide
        // directive payloads and turn entities into blacklisted characters.
        let source = match input_type {
            InputType::Actor => input.chars().filter(|c| !ACTOR_BLACKLIST.contains(c)).collect(),
            InputType::PlantUml => strip_plantuml_directives(input),
            _ => input.to_string(),
        };

        let out = match &self.sanitizer {
            Some(sanitizer) => {
                let tags: Vec<&str> = self.config.allowed_tags.iter().map(String::as_str).collect();
                sanitizer.sanitize(&source, &SanitizeOptions::allow(&tags))?
            },
            None => escape_html(&source),
        };

        let out = strip_until_stable(&PROTECTED_STRIP, out);
        Ok(strip_until_stable(&CALL_PREFIX_STRIP, out))
    }
}

/// Remove every match, repeating until removal cannot splice a new match
/// together.
fn strip_until_stable(regex: &Regex, mut text: String) -> String {
    while regex.is_match(&text) {
        text = regex.replace_all(&text, "").into_owned();
    }
    text
}

fn hit_issue(hit: &PatternHit) -> Issue {
    Issue::new(hit.pattern.kind, hit.pattern.severity, hit.pattern.description)
        .with_matches(hit.pattern.name, hit.matches.clone())
}

/// Derive `is_valid` and `security_level` from the collected issues.
fn finalize(result: &mut ValidationResult) {
    let mut level = SecurityLevel::Safe;
    let mut critical = 0;
    let mut high = 0;
    for issue in result.issues() {
        level.escalate(issue.severity.implied_level());
        match issue.severity {
            Severity::Critical => critical += 1,
            Severity::High => high += 1,
            _ => {},
        }
    }

    if high >= HIGH_ISSUE_LIMIT || result.prototype_pollution_detected {
        level.escalate(SecurityLevel::Dangerous);
    }
    result.security_level = level.min(SecurityLevel::Dangerous);
    result.is_valid = critical == 0 && high < HIGH_ISSUE_LIMIT;
}

/// An invalid result carrying a single issue and no sanitized output.
fn rejected(issue: Issue) -> ValidationResult {
    let mut result = ValidationResult::new(String::new());
    let level = issue.severity.implied_level();
    result.push(issue);
    result.is_valid = false;
    result.security_level = level.min(SecurityLevel::Dangerous);
    result
}

/// Percent-encoding round trip plus a scan for NUL, U+FFFD and bidi
/// controls.
fn encoding_check(input: &str) -> Option<Issue> {
    let round_trip = urlencoding::decode(&urlencoding::encode(input))
        .map(|decoded| decoded == input)
        .unwrap_or(false);
    let bad: Vec<String> = input
        .chars()
        .filter(|c| is_suspicious_char(*c))
        .map(|c| format!("U+{:04X}", c as u32))
        .take(5)
        .collect();

    if round_trip && bad.is_empty() {
        return None;
    }
    Some(
        Issue::new(
            IssueKind::InvalidEncoding,
            Severity::High,
            "Input contains invalid or deceptive characters",
        )
        .with_matches("encoding", bad),
    )
}

fn is_suspicious_char(c: char) -> bool {
    matches!(
        c,
        '\0' | '\u{FFFD}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}'
    )
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

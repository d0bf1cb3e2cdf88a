//! Security middleware.
//!
//! [`SecurityMiddleware::process_securely`] composes the validator, the
//! injection checks and the escaper into one pipeline:
//!
//! ```text
//! input ─► validate ─► command check? ─► SQL check? ─► escape(sanitized)
//!                                                         │
//!          incidents ◄─ logging ◄─ policy ◄─ threat score ◄┘
//! ```
//!
//! # Threat Score
//!
//! | Source                                | Points |
//! |---------------------------------------|--------|
//! | critical issue                        | 30     |
//! | high issue                            | 20     |
//! | medium issue                          | 10     |
//! | command/SQL pattern                   | 15     |
//! | aggregated level (safe..critical)     | 0..100 |
//!
//! The total is capped at 100 and mapped back onto a [`SecurityLevel`]
//! (≥80 critical, ≥60 dangerous, ≥40 risky, ≥20 moderate).
//!
//! Processing never fails: any error inside the pipeline yields an insecure
//! result carrying a `MIDDLEWARE_ERROR` issue.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::escaper::{EscapeContext, EscapeOptions, EscapeResult, OutputEscaper};
use super::injection::{CommandInjectionProtector, InjectionCheckResult, InjectionPrevention};
use super::log::{PerformanceSample, SecurityIncident, SecurityLog, SecurityStats, ThreatLogEntry};
use super::sanitizer::TagStripper;
use super::types::{InputType, Issue, IssueKind, SecurityLevel, Severity, ValidationResult};
use super::validator::InputValidator;
use crate::config::{Config, MiddlewareConfig};
use crate::error::{Result, ShieldError};

/// Points per pattern detected by the command and SQL checks
const DETECTION_WEIGHT: u32 = 15;

/// Highest possible threat score
pub const MAX_THREAT_SCORE: u32 = 100;

/// Callback invoked for every incident
pub type IncidentHandler = Arc<dyn Fn(&SecurityIncident) + Send + Sync>;

/// Aggregated outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProcessingResult {
    /// Raw input
    pub processed_input: String,
    /// Escaped output, empty when quarantined
    pub processed_output: String,
    /// Overall verdict
    pub is_secure: bool,
    /// 0-100
    pub threat_score: u32,
    /// Level derived from the threat score
    pub security_level: SecurityLevel,
    /// One line per finding
    pub risk_factors: Vec<String>,
    /// Suggested remediations
    pub recommendations: Vec<String>,
    /// Wall-clock pipeline duration
    pub processing_time: Duration,
    /// Output withheld
    pub quarantined: bool,
    /// Issues raised by the middleware itself
    pub issues: Vec<Issue>,
    /// Validator result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    /// Command injection check, when it applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_check: Option<InjectionCheckResult>,
    /// SQL injection check, when it applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_check: Option<InjectionCheckResult>,
    /// Escaper result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escape: Option<EscapeResult>,
}

impl SecurityProcessingResult {
    fn failed(input: &str, err: &ShieldError) -> Self {
        let issue = Issue::new(
            IssueKind::MiddlewareError,
            Severity::High,
            format!("Security processing failed: {err}"),
        );
        Self {
            processed_input: input.to_string(),
            processed_output: String::new(),
            is_secure: false,
            threat_score: 0,
            security_level: SecurityLevel::Safe,
            risk_factors: vec![risk_factor(&issue)],
            recommendations: vec!["Retry with a smaller or well-formed input".to_string()],
            processing_time: Duration::ZERO,
            quarantined: false,
            issues: vec![issue],
            validation: None,
            command_check: None,
            sql_check: None,
            escape: None,
        }
    }

    /// Whether any stage raised an issue of `kind`
    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
            || self.validation.as_ref().is_some_and(|v| v.has(kind))
            || self
                .escape
                .as_ref()
                .is_some_and(|e| e.warnings.iter().any(|w| w.kind == kind))
            || self
                .command_check
                .iter()
                .chain(self.sql_check.iter())
                .flat_map(|c| c.detected_patterns.iter())
                .any(|p| p.kind == kind)
    }
}

/// Validation, injection checks, escaping and threat policy in one call.
pub struct SecurityMiddleware {
    config: MiddlewareConfig,
    validator: InputValidator,
    escaper: OutputEscaper,
    command: CommandInjectionProtector,
    injection: InjectionPrevention,
    log: Arc<SecurityLog>,
    handlers: RwLock<Vec<IncidentHandler>>,
}

impl std::fmt::Debug for SecurityMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityMiddleware")
            .field("config", &self.config)
            .field("validator", &self.validator)
            .field("escaper", &self.escaper)
            .finish_non_exhaustive()
    }
}

impl Default for SecurityMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityMiddleware {
    /// Create a middleware with default policy
    pub fn new() -> Self {
        Self::with_policy(MiddlewareConfig::default())
    }

    /// Create a middleware with the given policy and default stages
    pub fn with_policy(config: MiddlewareConfig) -> Self {
        let log = Arc::new(SecurityLog::new(config.max_log_entries));
        Self {
            config,
            validator: InputValidator::new(),
            escaper: OutputEscaper::new(),
            command: CommandInjectionProtector::new(),
            injection: InjectionPrevention::new(),
            log,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Build every stage from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let validator = InputValidator::with_config(config.validator.clone())?;
        let mut escaper = OutputEscaper::new().with_defaults(EscapeOptions {
            advanced: config.escaper.advanced,
            sanitize: config.escaper.strip_tags,
        });
        if config.escaper.strip_tags {
            escaper = escaper.with_sanitizer(Arc::new(TagStripper::new()));
        }

        Ok(Self::with_policy(config.middleware.clone())
            .with_validator(validator)
            .with_escaper(escaper))
    }

    /// Replace the validator
    pub fn with_validator(mut self, validator: InputValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Replace the escaper
    pub fn with_escaper(mut self, escaper: OutputEscaper) -> Self {
        self.escaper = escaper;
        self
    }

    /// Write into a shared log store
    pub fn with_log(mut self, log: Arc<SecurityLog>) -> Self {
        self.log = log;
        self
    }

    /// Active policy
    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    /// Log store
    pub fn log(&self) -> &Arc<SecurityLog> {
        &self.log
    }

    /// Register a handler called for every incident
    pub fn on_incident<F>(&self, handler: F)
    where
        F: Fn(&SecurityIncident) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Run the full pipeline. `None` stands for a missing value.
    #[allow(clippy::unused_async)]
    pub async fn process_securely(
        &self,
        input: Option<&str>,
        input_type: InputType,
        context: EscapeContext,
    ) -> SecurityProcessingResult {
        self.process(input, input_type, context)
    }

    /// Blocking form of [`process_securely`](Self::process_securely)
    pub fn process(
        &self,
        input: Option<&str>,
        input_type: InputType,
        context: EscapeContext,
    ) -> SecurityProcessingResult {
        let start = Instant::now();
        let text = input.unwrap_or_default();

        let mut result = match self.run_pipeline(input, input_type, context) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, input_type = %input_type, "security pipeline failed");
                self.log.record_error();
                SecurityProcessingResult::failed(text, &e)
            },
        };
        result.processing_time = start.elapsed();

        self.record(&result, input_type, text);
        result
    }

    fn run_pipeline(
        &self,
        input: Option<&str>,
        input_type: InputType,
        context: EscapeContext,
    ) -> Result<SecurityProcessingResult> {
        let text = input.unwrap_or_default();
        if text.len() > self.config.max_input_size {
            return Err(ShieldError::InputTooLarge {
                len: text.len(),
                max: self.config.max_input_size,
            });
        }

        let validation = self.validator.validate(input, input_type);
        let command_check = input_type
            .needs_command_check()
            .then(|| self.command.validate_command(text));
        let sql_check = input_type
            .needs_sql_check()
            .then(|| self.injection.check_sql_injection(text));
        let escape = self
            .escaper
            .escape_with_defaults(&validation.sanitized_input, context)?;

        let checks: Vec<&InjectionCheckResult> =
            command_check.iter().chain(sql_check.iter()).collect();
        let detections: usize = checks.iter().map(|c| c.detected_patterns.len()).sum();

        let issue_points: u32 = validation
            .issues()
            .chain(escape.warnings.iter())
            .map(|i| i.severity.threat_weight())
            .sum();

        let mut aggregated = validation.security_level;
        aggregated.escalate(escape.security_level);
        for check in &checks {
            aggregated.escalate(check.security_level);
        }

        let threat_score = (issue_points
            + detections as u32 * DETECTION_WEIGHT
            + aggregated.base_score())
        .min(MAX_THREAT_SCORE);
        let security_level = SecurityLevel::from_threat_score(threat_score);

        let mut risk_factors: Vec<String> = validation
            .issues()
            .chain(escape.warnings.iter())
            .map(risk_factor)
            .collect();
        for check in &checks {
            risk_factors.extend(check.issues().iter().map(risk_factor));
        }
        risk_factors.dedup();

        let mut is_secure = validation.is_valid
            && detections == 0
            && !security_level.is_unsafe()
            && !escape.is_incomplete();

        let mut issues = Vec::new();
        let mut processed_output = escape.escaped.clone();
        let mut quarantined = false;

        if self.config.quarantine_mode && threat_score >= self.config.max_threat_score {
            processed_output.clear();
            quarantined = true;
            is_secure = false;
            issues.push(Issue::new(
                IssueKind::Quarantined,
                Severity::High,
                format!(
                    "Output quarantined: threat score {threat_score} >= {}",
                    self.config.max_threat_score
                ),
            ));
        }

        if self.config.strict_mode && security_level != SecurityLevel::Safe {
            is_secure = false;
            issues.push(Issue::new(
                IssueKind::StrictModeViolation,
                Severity::High,
                format!("Strict mode rejects security level {security_level}"),
            ));
        }

        let recommendations = recommendations(
            validation
                .issues()
                .chain(escape.warnings.iter())
                .map(|i| i.kind)
                .chain(
                    checks
                        .iter()
                        .flat_map(|c| c.detected_patterns.iter().map(|p| p.kind)),
                ),
            threat_score >= self.config.max_threat_score,
        );

        debug!(
            input_type = %input_type,
            context = %context,
            threat_score,
            level = %security_level,
            is_secure,
            "security pipeline complete"
        );

        Ok(SecurityProcessingResult {
            processed_input: text.to_string(),
            processed_output,
            is_secure,
            threat_score,
            security_level,
            risk_factors,
            recommendations,
            processing_time: Duration::ZERO,
            quarantined,
            issues,
            validation: Some(validation),
            command_check,
            sql_check,
            escape: Some(escape),
        })
    }

    fn record(&self, result: &SecurityProcessingResult, input_type: InputType, text: &str) {
        self.log.record_processed(result.is_secure, result.quarantined);

        if self.config.performance_logging {
            self.log.performance.push(PerformanceSample {
                timestamp: Utc::now(),
                duration: result.processing_time,
                input_length: text.chars().count(),
            });
        }

        if result.processing_time > self.config.max_processing_time() {
            warn!(
                elapsed_ms = result.processing_time.as_millis() as u64,
                budget_ms = self.config.max_processing_time_ms,
                "security processing exceeded time budget"
            );
        }

        if self.config.threat_logging && result.threat_score > 0 {
            self.log.threats.push(ThreatLogEntry {
                timestamp: Utc::now(),
                input_type,
                threat_score: result.threat_score,
                security_level: result.security_level,
                risk_factors: result.risk_factors.clone(),
                input_preview: text.chars().take(100).collect(),
            });
        }

        if result.threat_score >= self.config.alert_threshold {
            self.raise_incident(result);
        }
    }

    fn raise_incident(&self, result: &SecurityProcessingResult) {
        let incident = SecurityIncident {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            threat_score: result.threat_score,
            security_level: result.security_level,
            risk_factors: result.risk_factors.clone(),
            quarantined: result.quarantined,
        };

        warn!(
            incident_id = %incident.id,
            threat_score = incident.threat_score,
            level = %incident.security_level,
            "security incident"
        );

        self.log.record_incident(incident.clone());
        // Snapshot so handlers may register further handlers.
        let handlers: Vec<IncidentHandler> = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in &handlers {
            handler(&incident);
        }
    }

    /// Counters and log sizes
    pub fn stats(&self) -> SecurityStats {
        self.log.summary()
    }

    /// Newest `n` threat log entries
    pub fn recent_threats(&self, n: usize) -> Vec<ThreatLogEntry> {
        self.log.threats.recent(n)
    }

    /// All held incidents, oldest first
    pub fn incidents(&self) -> Vec<SecurityIncident> {
        self.log.incidents.snapshot()
    }

    /// Reset logs and counters
    pub fn clear_logs(&self) {
        self.log.clear();
        info!("security logs cleared");
    }
}

fn risk_factor(issue: &Issue) -> String {
    format!("{}: {}", issue.kind, issue.message)
}

fn recommendations(kinds: impl Iterator<Item = IssueKind>, reject: bool) -> Vec<String> {
    let mut out: Vec<&'static str> = Vec::new();
    for kind in kinds {
        let advice = match kind {
            IssueKind::XssDetected | IssueKind::EventHandlerXss | IssueKind::DomManipulation => {
                "Remove HTML tags and script content from the input"
            },
            IssueKind::InjectionDetected | IssueKind::SqlInjection => {
                "Pass values as query parameters instead of building query text"
            },
            IssueKind::CommandInjection => {
                "Never hand the input to a shell; quote it as a single argument"
            },
            IssueKind::EvalDetected => "Remove code evaluation constructs",
            IssueKind::PrototypePollution | IssueKind::ProtectedPropertyAccess => {
                "Reject object keys such as __proto__ and constructor"
            },
            IssueKind::PlantumlDirective => {
                "Render diagrams with preprocessor includes and file access disabled"
            },
            IssueKind::PathTraversal => "Resolve paths against a fixed base directory",
            IssueKind::InvalidEncoding => "Normalize the input to plain UTF-8 text",
            IssueKind::InvalidLength => "Shorten the input",
            IssueKind::InvalidCharacters => "Use letters, digits and spaces only",
            IssueKind::EscapeIncomplete => "Escape the output for a stricter context",
            IssueKind::DangerousPattern => "Review the input for blocked content",
            _ => continue,
        };
        if !out.contains(&advice) {
            out.push(advice);
        }
    }
    if reject {
        out.push("Reject this input");
    }
    out.into_iter().map(String::from).collect()
}

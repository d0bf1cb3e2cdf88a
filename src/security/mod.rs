//! Input validation and output escaping for diagram editors.
//!
//! This module sanitizes untrusted text on its way into PlantUML sources
//! and back out into HTML, scripts, styles, URLs and diagram labels.
//!
//! # Threat Categories
//!
//! | Category             | Example                           | Severity |
//! |----------------------|-----------------------------------|----------|
//! | `XSS_DETECTED`       | `<script>`, `javascript:` URIs    | Critical |
//! | `EVENT_HANDLER_XSS`  | `<img onerror=...>`               | High     |
//! | `DOM_MANIPULATION`   | `document.write(`, `.innerHTML =` | High     |
//! | `EVAL_DETECTED`      | `eval(`, `new Function(`          | High     |
//! | `PROTOTYPE_POLLUTION`| `__proto__`, `constructor.prototype` | Critical |
//! | `INJECTION_DETECTED` | `' OR 1=1`, `UNION SELECT`        | High     |
//! | `COMMAND_INJECTION`  | `; rm -rf /`, `$(...)`            | High     |
//! | `PLANTUML_DIRECTIVE` | `!include`, `%getenv(`            | High     |
//!
//! # Components
//!
//! - [`InputValidator`]: pattern sweeps plus a destructive sanitized copy
//! - [`RealtimeValidator`]: debounced validation for editors
//! - [`OutputEscaper`]: table-driven escaping per output context
//! - [`CommandInjectionProtector`], [`InjectionPrevention`]: focused checks
//! - [`SecurityMiddleware`]: the full pipeline with threat scoring
//!
//! # Usage
//!
//! ```rust,ignore
//! use umlshield::security::{EscapeContext, InputType, SecurityMiddleware};
//!
//! let middleware = SecurityMiddleware::new();
//! let result = middleware
//!     .process_securely(Some("<script>alert(1)</script>"), InputType::General, EscapeContext::Html)
//!     .await;
//!
//! assert!(!result.is_secure);
//! assert_eq!(result.threat_score, 100);
//! ```
//!
//! ## Escaping Only
//!
//! ```rust,ignore
//! use umlshield::security::{EscapeContext, OutputEscaper};
//!
//! let escaper = OutputEscaper::new();
//! let result = escaper.escape_with_defaults("a < b", EscapeContext::Html).unwrap();
//! assert_eq!(result.escaped, "a &lt; b");
//! ```

pub mod escaper;
mod injection;
mod log;
mod middleware;
pub mod patterns;
mod realtime;
mod sanitizer;
mod types;
mod validator;

pub use escaper::{
    scan_dangerous, ContextDetection, ContextDetector, DangerousMatch, EscapeContext,
    EscapeOptions, EscapeResult, OutputEscaper,
};
pub use injection::{
    strip_plantuml_directives, CommandInjectionProtector, DetectedPattern, InjectionCheckResult,
    InjectionPrevention,
};
pub use log::{
    BoundedLog, PerformanceSample, SecurityIncident, SecurityLog, SecurityStats, ThreatLogEntry,
};
pub use middleware::{IncidentHandler, SecurityMiddleware, SecurityProcessingResult};
pub use realtime::RealtimeValidator;
pub use sanitizer::{HtmlSanitizer, SanitizeOptions, TagStripper};
pub use types::{InputType, Issue, IssueKind, SecurityLevel, Severity, ValidationResult};
pub use validator::{InputValidator, ACTOR_BLACKLIST};

/// Pattern table version
pub const SECURITY_VERSION: &str = "1.0.0";

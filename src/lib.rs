//! # UML Shield - Input Sanitization for PlantUML Editors
//!
//! Validation, context-aware escaping and threat scoring for text that
//! flows between a natural-language diagram editor, PlantUML sources and
//! rendered previews.
//!
//! ## Features
//!
//! - **Input validation**: XSS, SQL-like, eval, prototype pollution, DOM,
//!   event handler and shell command signatures
//! - **Output escaping**: HTML, JavaScript, CSS, URL, XML, PlantUML and JSON
//!   tables with a fixed-point safety check
//! - **Injection checks**: shell commands, SQL, path traversal, PlantUML
//!   preprocessor directives
//! - **Middleware**: one-call pipeline with threat scoring, quarantine,
//!   strict mode, bounded logs and incident callbacks
//!
//! ## Pipeline
//!
//! ```text
//!   input
//!     │
//!     v
//! [InputValidator] ──> [CommandInjectionProtector]? ──> [SQL check]?
//!     │ sanitized
//!     v
//! [OutputEscaper] ──> threat score ──> policy ──> logs / incidents
//!     │
//!     v
//!   output
//! ```
//!
//! ### Security Levels
//!
//! | Level       | Threat score | Secure |
//! |-------------|--------------|--------|
//! | `safe`      | 0-19         | yes    |
//! | `moderate`  | 20-39        | yes    |
//! | `risky`     | 40-59        | yes    |
//! | `dangerous` | 60-79        | no     |
//! | `critical`  | 80-100       | no     |
//!
//! "Secure" additionally requires a valid validation result and no
//! command or SQL detections.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use umlshield::{EscapeContext, InputType, SecurityMiddleware};
//!
//! let middleware = SecurityMiddleware::new();
//! let result = middleware.process(Some("ユーザーがログインする"), InputType::General, EscapeContext::Html);
//! assert!(result.is_secure);
//! ```
//!
//! ### Validation Only
//!
//! ```rust,ignore
//! use umlshield::{InputType, InputValidator};
//!
//! let validator = InputValidator::new();
//! let result = validator.validate(Some("obj.__proto__.admin = true"), InputType::General);
//! assert!(result.prototype_pollution_detected);
//! ```
//!
//! ## Modules
//!
//! - [`security`]: Validators, escaper, injection checks and middleware
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod config;
pub mod error;
pub mod security;

// Re-exports for convenience
pub use config::Config;
pub use error::{Result, ShieldError};
pub use security::{
    EscapeContext, EscapeResult, InputType, InputValidator, OutputEscaper, SecurityLevel,
    SecurityMiddleware, SecurityProcessingResult, ValidationResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

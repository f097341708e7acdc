
use runtime_test_utils::{check_fails, evaluate};
use sprig_runtime::VmSettings;
use sprig_shell::{DiagnosticKind, SessionSettings};
use sprig_test_utils::{check_session, make_session_with_settings};

mod runtime_failures {
    use super::*;

    #[test]
    fn division_by_zero() {
        check_fails(&[], "10 / (5 - 5)", DiagnosticKind::Runtime, "division by zero");
    }

    #[test]
    fn integer_overflow() {
        check_fails(
            &[],
            "9223372036854775807 + 1",
            DiagnosticKind::Runtime,
            "integer overflow",
        );
    }

    #[test]
    fn index_out_of_bounds() {
        check_fails(
            &["int[] values = [1, 2, 3];"],
            "values[5]",
            DiagnosticKind::Runtime,
            "index 5 is out of bounds for a list with 3 elements",
        );
    }

    #[test]
    fn unexpected_type_at_a_return() {
        check_fails(
            &["function toInt(any value) returns int { return value; }"],
            "toInt(\"x\")",
            DiagnosticKind::Runtime,
            "expected int, but found 'string'",
        );
    }

    #[test]
    fn native_argument_mismatch() {
        check_fails(
            &["import sprig/string;", "any value = 42;"],
            "string:length(value)",
            DiagnosticKind::Runtime,
            "expected |string|, but found 'int'",
        );
    }

    #[test]
    fn panic() {
        check_fails(
            &[],
            "interop:panic(\"boom\")",
            DiagnosticKind::Runtime,
            "panic: boom",
        );
    }

    #[test]
    fn call_depth_limit() {
        let (mut session, _) = make_session_with_settings(
            SessionSettings::default(),
            VmSettings {
                max_call_depth: 32,
                ..Default::default()
            },
        );

        let result = evaluate(
            &mut session,
            "function down(int n) returns int { return down(n + 1); }",
        );
        assert!(result.committed);

        let result = evaluate(&mut session, "down(0)");
        assert!(!result.committed);
        assert!(
            result.diagnostics[0]
                .message
                .contains("the call depth limit of 32 was exceeded")
        );
    }
}

mod state_after_failures {
    use super::*;

    #[test]
    fn module_variables_are_unchanged_after_a_failure() {
        let (mut session, _) = check_session(&[
            ("int total = 0;", None),
            (
                "function addAndFail() { total = 10; int zero = 0; total = total / zero; }",
                None,
            ),
        ]);

        let result = evaluate(&mut session, "addAndFail();");
        assert!(!result.committed);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Runtime);

        let result = evaluate(&mut session, "total");
        assert!(result.committed);
        assert_eq!(result.value.as_deref(), Some("0"));
    }

    #[test]
    fn failed_declarations_are_committed_by_default() {
        let (mut session, _) = make_session_with_settings(
            SessionSettings::default(),
            VmSettings::default(),
        );

        let result = evaluate(
            &mut session,
            "function broken() returns int { return 1 / 0; }\nint value = broken();",
        );
        assert!(result.committed);
        assert!(result.has_errors());
        assert!(session.store().lookup(&"value".into()).is_some());
    }

    #[test]
    fn failed_declarations_can_be_rolled_back() {
        let (mut session, _) = make_session_with_settings(
            SessionSettings::default().with_commit_definitions_on_runtime_failure(false),
            VmSettings::default(),
        );

        let result = evaluate(
            &mut session,
            "function broken() returns int { return 1 / 0; }\nint value = broken();",
        );
        assert!(!result.committed);
        assert_eq!(result.committed_snippets, 0);
        assert!(session.store().lookup(&"broken".into()).is_none());
        assert!(session.store().lookup(&"value".into()).is_none());
    }

    #[test]
    fn variables_are_restored_when_later_snippets_fail() {
        let (mut session, _) = check_session(&[("int counter = 1;", None)]);

        let result = evaluate(&mut session, "counter = 5;\nint total = counter;\ncounter / 0;");
        assert!(!result.committed);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Runtime);
        assert!(session.store().lookup(&"total".into()).is_none());
        assert!(session.loader().get("total").is_none());

        let result = evaluate(&mut session, "counter");
        assert_eq!(result.value.as_deref(), Some("1"));
    }

    #[test]
    fn the_session_is_usable_after_a_failure() {
        let (mut session, _) = check_session(&[("int x = 1;", None)]);

        let result = evaluate(&mut session, "x / 0");
        assert!(!result.committed);

        let result = evaluate(&mut session, "x + 1");
        assert_eq!(result.value.as_deref(), Some("2"));
        assert_eq!(session.execution_count(), 2);
    }
}

//! Tests that drive a [Sprig] instance the way the REPL does
//!
//! Each input is evaluated in the same session, with the expected stdout output and the expected
//! value of the final expression.

use sprig::prelude::*;
use sprig_test_utils::{OutputCapture, render_diagnostics};
use std::io::Write;

fn make_sprig() -> (Sprig, OutputCapture) {
    let output = OutputCapture::default();
    let sprig = Sprig::with_settings(SprigSettings::default().with_stdout(output.clone()));
    (sprig, output)
}

fn run_repl_mode_test(inputs_and_expected_outputs: &[(&str, &str, Option<&str>)]) -> Sprig {
    let (mut sprig, output) = make_sprig();

    for (input, expected_output, expected_value) in inputs_and_expected_outputs {
        let result = match sprig.evaluate(input) {
            Ok(result) => result,
            Err(error) => panic!("{error}"),
        };

        if !result.committed || result.has_errors() {
            panic!("{}", render_diagnostics(input, &result));
        }

        assert_eq!(output.captured_output().trim(), expected_output.trim());
        assert_eq!(result.value.as_deref(), *expected_value);

        output.clear();
    }

    sprig
}

mod repl_mode {
    use super::*;

    #[test]
    fn variables_and_functions() {
        run_repl_mode_test(&[
            ("import sprig/io;", "", None),
            ("int x = 42;", "", None),
            ("function show(int n) { io:println(\"n: \", n); }", "", None),
            ("show(x);", "n: 42", None),
            ("x + 1", "", Some("43")),
        ]);
    }

    #[test]
    fn multiple_snippets_in_one_input() {
        let sprig = run_repl_mode_test(&[(
            "import sprig/io;\nint a = 1;\nint b = a + 1;\nio:println(a + b);",
            "3",
            None,
        )]);

        let names: Vec<_> = sprig
            .declarations()
            .iter()
            .map(|declaration| declaration.name.to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn imports_are_available_to_later_snippets() {
        let sprig = run_repl_mode_test(&[
            ("import sprig/string as s;", "", None),
            ("function shout(string text) returns string { return s:to_upper(text); }", "", None),
        ]);
        assert!(
            sprig
                .imports_in_scope()
                .contains(&"import sprig/string as s;".to_string())
        );
    }

    #[test]
    fn rebinding_a_prefix() {
        let (mut sprig, _) = make_sprig();

        sprig.evaluate("import sprig/math as m;").unwrap();
        sprig.evaluate("import sprig/string as m;").unwrap();

        assert_eq!(
            sprig.imports_in_scope(),
            [
                "import sprig/interop as interop;",
                "import sprig/string as m;"
            ]
        );
        let result = sprig.evaluate("m:to_lower(\"ABC\")").unwrap();
        assert_eq!(result.value.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn units_only_include_dependencies() {
        let (mut sprig, _) = make_sprig();

        sprig.evaluate("int unrelated = 1;").unwrap();
        sprig.evaluate("int base = 2;").unwrap();
        sprig
            .evaluate("function double(int n) returns int { return n * 2; }")
            .unwrap();

        let result = sprig.evaluate("double(base)").unwrap();
        assert_eq!(result.value.as_deref(), Some("4"));

        let unit = sprig.last_unit().unwrap();
        assert!(unit.source.contains("int base = 2;"));
        assert!(unit.source.contains("function double"));
        assert!(!unit.source.contains("unrelated"));
    }
}

mod session_state {
    use super::*;

    #[test]
    fn failed_snippets_leave_no_trace() {
        let (mut sprig, _) = make_sprig();
        sprig.evaluate("import sprig/io;\nint x = 1;").unwrap();

        let declarations_before = sprig.declarations();
        let imports_before = sprig.imports_in_scope();

        let result = sprig.evaluate("import sprig/math;\nint y = \"nope\";").unwrap();
        assert!(!result.committed);
        assert_eq!(result.committed_snippets, 0);

        // The import succeeded on its own, but it's undone along with the failed declaration
        assert_eq!(sprig.imports_in_scope(), imports_before);

        let result = sprig.evaluate("int z = missing;").unwrap();
        assert!(!result.committed);
        assert_eq!(sprig.declarations(), declarations_before);
    }

    #[test]
    fn redefinitions_shadow_earlier_declarations() {
        let (mut sprig, _) = make_sprig();
        sprig.evaluate("int x = 1;").unwrap();
        let before = sprig.session().store().len();

        sprig.evaluate("int x = 2;").unwrap();
        assert_eq!(sprig.session().store().len(), before + 1);
        assert_eq!(sprig.declarations().len(), 1);
        assert_eq!(sprig.variable("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn module_variables() {
        let (mut sprig, _) = make_sprig();
        sprig
            .evaluate("int count = 3;\nstring label = \"items\";\nfunction f() {}")
            .unwrap();

        assert_eq!(
            sprig.module_variables(),
            [
                ("count".to_string(), "3".to_string()),
                ("label".to_string(), "\"items\"".to_string())
            ]
        );
    }

    #[test]
    fn remove() {
        let (mut sprig, _) = make_sprig();
        sprig.evaluate("int a = 1;\nint b = 2;").unwrap();

        let result = sprig.remove(["a"]).unwrap();
        assert!(result.committed);
        assert!(sprig.variable("a").is_none());

        let result = sprig.evaluate("a + b").unwrap();
        assert!(!result.committed);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Semantic);

        let result = sprig.remove(["b", "unknown"]).unwrap();
        assert!(!result.committed);
        assert_eq!(sprig.declarations().len(), 1);
    }

    #[test]
    fn reset() {
        let (mut sprig, _) = make_sprig();
        sprig.evaluate("import sprig/io;\nint x = 1;").unwrap();

        sprig.reset();

        assert!(sprig.declarations().is_empty());
        assert!(sprig.module_variables().is_empty());
        assert_eq!(
            sprig.imports_in_scope(),
            ["import sprig/interop as interop;"]
        );
        let result = sprig.evaluate("x").unwrap();
        assert!(!result.committed);
    }

    #[test]
    fn runtime_failures_can_roll_back_definitions() {
        let mut sprig = Sprig::with_settings(
            SprigSettings::default().with_commit_definitions_on_runtime_failure(false),
        );

        sprig.evaluate("int[] empty = [];").unwrap();
        let result = sprig.evaluate("int first = empty[0];").unwrap();
        assert!(!result.committed);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Runtime);
        assert_eq!(sprig.declarations().len(), 1);

        // Earlier snippets in the same input are undone too
        let result = sprig.evaluate("int second = 2;\nint third = empty[2];").unwrap();
        assert!(!result.committed);
        assert_eq!(sprig.declarations().len(), 1);
        assert!(sprig.variable("second").is_none());
    }
}

mod load_file {
    use super::*;

    #[test]
    fn evaluates_each_snippet() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "\
import sprig/io;

function greet(string name) {{
    io:println(\"hello, \", name);
}}

greet(\"file\");
"
        )?;

        let (mut sprig, output) = make_sprig();
        let result = sprig.load_file(file.path())?;

        assert!(result.committed);
        assert_eq!(result.committed_snippets, 3);
        assert_eq!(*output.captured_output(), "hello, file\n");

        let result = sprig.evaluate("greet(\"repl\");")?;
        assert!(result.committed);
        assert_eq!(*output.captured_output(), "hello, file\nhello, repl\n");

        Ok(())
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut sprig, _) = make_sprig();

        let error = sprig.load_file(dir.path().join("missing.sprig")).unwrap_err();
        assert!(matches!(error, sprig::Error::ReadFailed { .. }));
        assert!(!error.requires_reset());
    }
}

use std::{
    env,
    io::Write,
    process::{Command, Output, Stdio},
};

fn run_sprig(args: &[&str], input: &str) -> Output {
    // Avoid picking up a user's config file
    let home = tempfile::tempdir().expect("failed to create a temporary home dir");

    let mut process = Command::new(env!("CARGO_BIN_EXE_sprig"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("SPRIG_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to execute child");

    let stdin = process.stdin.as_mut().expect("failed to get stdin");
    stdin
        .write_all(input.as_bytes())
        .expect("Failed to write to stdin");

    process
        .wait_with_output()
        .expect("Failed to wait for output")
}

fn run_piped_stdio_test(input: &str, expected_output: &str) {
    let output = run_sprig(&[], input);
    let stdout = String::from_utf8(output.stdout).expect("Invalid output in stdout");
    let stderr = String::from_utf8(output.stderr).expect("Invalid output in stderr");

    assert!(
        output.status.success(),
        "Process exited with error code {:?}
stdout:
{stdout}

stderr:
{stderr}",
        output.status.code(),
    );
    assert_eq!(stdout, expected_output);
}

fn run_failing_stdio_test(input: &str, expected_error: &str) {
    let output = run_sprig(&[], input);
    let stderr = String::from_utf8(output.stderr).expect("Invalid output in stderr");

    assert!(!output.status.success(), "Process unexpectedly succeeded");
    assert!(
        stderr.contains(expected_error),
        "Expected '{expected_error}' in stderr:\n{stderr}"
    );
}

mod stdin_tests {
    use super::*;

    #[test]
    fn empty_output() {
        run_piped_stdio_test("int x = 1;", "");
    }

    #[test]
    fn expression_results_are_printed() {
        run_piped_stdio_test("1 + 1", "2\n");
    }

    #[test]
    fn multiline_output() {
        let script = r#"
import sprig/io;
io:println("Hello");
io:println("World!");
"#;
        let expected_output = "\
Hello
World!
";
        run_piped_stdio_test(script, expected_output);
    }

    #[test]
    fn final_expression_is_printed() {
        let script = r#"
int x = 20;
function double(int n) returns int {
    return n * 2;
}
double(x) + 2
"#;
        run_piped_stdio_test(script, "42\n");
    }

    #[test]
    fn print_without_newline() {
        let script = r#"
import sprig/io;
io:print("Hello");
io:print(", World!");
"#;
        run_piped_stdio_test(script, "Hello, World!");
    }

    #[test]
    fn semantic_error() {
        run_failing_stdio_test("int x = \"one\";", "incompatible types");
    }

    #[test]
    fn runtime_error() {
        run_failing_stdio_test("1 / 0", "division by zero");
    }

    #[test]
    fn parse_error() {
        run_failing_stdio_test("function f( {", "parse error");
    }
}

mod flags {
    use super::*;

    #[test]
    fn eval() {
        let output = run_sprig(&["-e", "math:max(1, 5, 3)\n"], "");
        assert!(!output.status.success());

        let output = run_sprig(&["-e", "import sprig/math;\nmath:max(1, 5, 3)"], "");
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "5\n");
    }

    #[test]
    fn show_unit() {
        let output = run_sprig(&["-u"], "int x = 1;\nx");
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("function __run() returns any"));
        assert!(stdout.ends_with("\n1\n"));
    }

    #[test]
    fn timeout() {
        let script = "function spin() { while true {} }\nspin();";
        let output = run_sprig(&["--timeout", "100"], script);
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("timed out"));
    }

    #[test]
    fn config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "commit_definitions_on_runtime_failure = 1\n").unwrap();

        let output = run_sprig(&["-c", config_path.to_str().unwrap()], "1");
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("Error while loading config"));
    }

    #[test]
    fn unsupported_argument() {
        let output = run_sprig(&["script.sprig", "extra"], "");
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported argument: extra"));
    }
}

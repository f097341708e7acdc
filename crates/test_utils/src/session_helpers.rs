use crate::OutputCapture;
use sprig_runtime::{Checker, Compiler, Vm, VmSettings};
use sprig_shell::{EvaluationResult, Session, SessionSettings};
use std::rc::Rc;

/// A session that uses the reference checker, compiler, and VM
pub type RuntimeSession = Session<Checker, Compiler, Vm>;

/// Makes a session with the VM's output captured by an instance of [OutputCapture]
pub fn make_session_with_output_capture() -> (RuntimeSession, OutputCapture) {
    make_session_with_settings(SessionSettings::default(), VmSettings::default())
}

/// Makes a session with the given settings, overriding the VM's stdout with an [OutputCapture]
pub fn make_session_with_settings(
    session_settings: SessionSettings,
    vm_settings: VmSettings,
) -> (RuntimeSession, OutputCapture) {
    let output_capture = OutputCapture::default();
    let vm = Vm::with_settings(VmSettings {
        stdout: Rc::new(output_capture.clone()),
        ..vm_settings
    });

    let session = Session::with_settings(
        session_settings,
        Checker::default(),
        Compiler::default(),
        vm,
    );

    (session, output_capture)
}

/// Renders an evaluation's diagnostics against the input that produced them
pub fn render_diagnostics(input: &str, result: &EvaluationResult) -> String {
    result
        .diagnostics
        .iter()
        .map(|diagnostic| diagnostic.render(input))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Evaluates each input in turn in a single session, checking the results
///
/// Each input must be committed, and its value must match the expected value. The session is
/// returned so that tests can make further checks.
pub fn check_session(snippets: &[(&str, Option<&str>)]) -> (RuntimeSession, OutputCapture) {
    let (mut session, output) = make_session_with_output_capture();

    for (input, expected) in snippets {
        let result = match session.evaluate(input) {
            Ok(result) => result,
            Err(error) => panic!("session error while evaluating '{input}': {error}"),
        };

        if !result.committed || result.has_errors() {
            let captured = output.captured_output();
            if !captured.is_empty() {
                println!("Stdout:\n-------\n\n{captured}\n-------\n");
            }
            panic!(
                "'{input}' wasn't committed:\n{}",
                render_diagnostics(input, &result)
            );
        }

        assert_eq!(
            result.value.as_deref(),
            *expected,
            "unexpected value for '{input}'"
        );
    }

    (session, output)
}

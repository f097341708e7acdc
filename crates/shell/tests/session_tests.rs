use sprig_shell::{
    ArtifactLoader, Backend, CompilationUnit, Declaration, DeclarationKind, Diagnostic,
    DiagnosticKind, DiagnosticOrigin, Error, ImportRecord, ImportSeed, ModuleReference, Owner,
    RuntimeFailure, SemanticAnalyzer, Session, SessionSettings, SessionState, SnippetKind,
};
use sprig_parser::{Position, QuotedIdentifier, Span};
use std::{
    collections::BTreeSet,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

// Reports an error wherever `bad_semantics` appears in the unit
struct MockAnalyzer;

impl SemanticAnalyzer for MockAnalyzer {
    fn check(&self, unit: &CompilationUnit, _visible: &[Arc<Declaration>]) -> Vec<Diagnostic> {
        const MARKER: &str = "bad_semantics";

        unit.source
            .lines()
            .enumerate()
            .filter_map(|(line, text)| {
                text.find(MARKER).map(|column| {
                    let at = |column: usize| Position {
                        line: line as u32,
                        column: column as u32,
                    };
                    Diagnostic::error(DiagnosticKind::Semantic, "bad semantics").with_span(
                        Span {
                            start: at(column),
                            end: at(column + MARKER.len()),
                        },
                        DiagnosticOrigin::Unit,
                    )
                })
            })
            .collect()
    }
}

struct MockArtifact {
    snippet: String,
    kind: SnippetKind,
}

// Refuses to compile any unit containing `bad_compile`
#[derive(Default)]
struct MockBackend {
    units: Vec<String>,
}

impl Backend for MockBackend {
    type Artifact = MockArtifact;

    fn compile(&mut self, unit: &CompilationUnit) -> Result<MockArtifact, Vec<Diagnostic>> {
        self.units.push(unit.source.clone());

        if unit.source.contains("bad_compile") {
            return Err(vec![Diagnostic::error(DiagnosticKind::Compile, "bad compile")]);
        }

        let snippet = unit
            .snippet_lines()
            .map(|lines| {
                unit.source
                    .lines()
                    .skip(lines.start as usize)
                    .take(lines.len())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        Ok(MockArtifact {
            snippet,
            kind: unit.snippet_kind,
        })
    }
}

// Fails with `boom`, panics with `panic_now`, and renders expressions as their own source
#[derive(Default)]
struct MockLoader {
    loaded: usize,
    unloaded: usize,
    resets: usize,
    restores: usize,
    forgotten: Vec<QuotedIdentifier>,
}

impl ArtifactLoader for MockLoader {
    type Artifact = MockArtifact;
    type Handle = MockArtifact;
    type Checkpoint = ();

    fn load(&mut self, artifact: MockArtifact) -> Result<MockArtifact, RuntimeFailure> {
        if artifact.snippet.contains("load_fails") {
            return Err(RuntimeFailure::error("failed to load"));
        }
        self.loaded += 1;
        Ok(artifact)
    }

    fn invoke(&mut self, handle: &mut MockArtifact) -> Result<Option<String>, RuntimeFailure> {
        if handle.snippet.contains("panic_now") {
            panic!("the executor panicked");
        }
        if handle.snippet.contains("boom") {
            return Err(RuntimeFailure::error("boom"));
        }
        match handle.kind {
            SnippetKind::Expression => Ok(Some(handle.snippet.trim().to_string())),
            _ => Ok(None),
        }
    }

    fn unload(&mut self, _handle: MockArtifact) {
        self.unloaded += 1;
    }

    fn reset(&mut self) {
        self.resets += 1;
    }

    fn forget(&mut self, names: &[QuotedIdentifier]) {
        self.forgotten.extend(names.iter().cloned());
    }

    fn checkpoint(&self) {}

    fn restore(&mut self, _checkpoint: ()) {
        self.restores += 1;
    }
}

type MockSession = Session<MockAnalyzer, MockBackend, MockLoader>;

fn session() -> MockSession {
    Session::new(MockAnalyzer, MockBackend::default(), MockLoader::default())
}

fn session_with_settings(settings: SessionSettings) -> MockSession {
    Session::with_settings(settings, MockAnalyzer, MockBackend::default(), MockLoader::default())
}

fn id(name: &str) -> QuotedIdentifier {
    QuotedIdentifier::new(name)
}

fn evaluate(session: &mut MockSession, input: &str) -> sprig_shell::EvaluationResult {
    let result = session.evaluate(input).expect("evaluation failed");
    assert_eq!(session.state(), SessionState::Idle);
    result
}

fn assert_committed(session: &mut MockSession, input: &str) {
    let result = evaluate(session, input);
    assert!(
        result.committed,
        "expected '{input}' to be committed, diagnostics: {:?}",
        result.diagnostics
    );
}

fn assert_no_leaks(session: &MockSession) {
    let loader = session.loader();
    assert_eq!(loader.loaded, loader.unloaded, "artifacts were leaked");
}

mod evaluation {
    use super::*;

    #[test]
    fn expression_value() {
        let mut session = session();
        let result = evaluate(&mut session, "1 + 2");

        assert!(result.committed);
        assert_eq!(result.value.as_deref(), Some("1 + 2"));
        assert!(result.diagnostics.is_empty());
        assert_eq!(session.execution_count(), 1);
    }

    #[test]
    fn statements_have_no_value() {
        let mut session = session();
        let result = evaluate(&mut session, "x = 1;");

        assert!(result.committed);
        assert_eq!(result.value, None);
        let slot = session.store().iter().last().expect("missing statement");
        assert_eq!(slot.kind, DeclarationKind::Statement);
        assert_eq!(slot.name.as_str(), "$0");
    }

    #[test]
    fn empty_input_commits_nothing() {
        let mut session = session();
        let result = evaluate(&mut session, "  // nothing here\n");

        assert!(!result.committed);
        assert!(result.diagnostics.is_empty());
        assert_eq!(session.execution_count(), 0);
    }

    #[test]
    fn multiple_snippets_stop_at_the_first_failure() {
        let mut session = session();
        let result = evaluate(
            &mut session,
            "int a = 1;\nint b = bad_compile;\nint c = 3;",
        );

        assert!(!result.committed);
        assert_eq!(result.committed_snippets, 0);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(session.store().lookup(&id("a")).is_none());
        assert!(session.store().lookup(&id("b")).is_none());
        assert!(session.store().lookup(&id("c")).is_none());
        assert_eq!(session.execution_count(), 0);
        assert_eq!(session.loader().restores, 1);
    }

    #[test]
    fn failed_input_is_undone_as_a_whole() {
        let mut session = session();
        assert_committed(&mut session, "int keep = 1;");

        let names_before: Vec<_> = session.store().iter().map(|d| d.name.clone()).collect();
        let imports_before = session.imports_in_scope();
        let count_before = session.execution_count();
        let implicit_usage_before = session.registry().usage_of(&Owner::Anonymous).cloned();

        let result = evaluate(
            &mut session,
            "import sprig/io;\nint a = 1;\nio:println(a);\nint b = bad_semantics;",
        );
        assert!(!result.committed);
        assert_eq!(result.committed_snippets, 0);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Semantic);

        let names_after: Vec<_> = session.store().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names_after, names_before);
        assert_eq!(session.imports_in_scope(), imports_before);
        assert_eq!(session.execution_count(), count_before);
        assert!(!session.registry().has_prefix(&id("io")));
        assert_eq!(
            session.registry().usage_of(&Owner::Anonymous).cloned(),
            implicit_usage_before
        );
        assert!(session.registry().usage_of(&Owner::Name(id("a"))).is_none());

        // The undone snippets can be entered again
        assert_committed(&mut session, "import sprig/io;\nint a = 1;");
        assert_eq!(session.execution_count(), count_before + 2);
    }

    #[test]
    fn a_failing_first_snippet_restores_nothing() {
        let mut session = session();
        let result = evaluate(&mut session, "int b = bad_compile;\nint c = 3;");

        assert!(!result.committed);
        assert_eq!(session.loader().restores, 0);
        assert!(session.store().is_empty());
    }

    #[test]
    fn value_of_the_final_snippet() {
        let mut session = session();
        let result = evaluate(&mut session, "int a = 1;\na * 2");

        assert!(result.committed);
        assert_eq!(result.committed_snippets, 2);
        assert_eq!(result.value.as_deref(), Some("a * 2"));
    }

    #[test]
    fn closure_is_minimal() {
        let mut session = session();
        assert_committed(&mut session, "int unrelated = 99;");
        assert_committed(&mut session, "int base = 1;");
        assert_committed(&mut session, "function f() returns int { return base; }");

        evaluate(&mut session, "f()");
        let unit = session.last_unit().expect("missing unit");
        assert!(unit.source.contains("int base = 1;"));
        assert!(unit.source.contains("function f()"));
        assert!(!unit.source.contains("unrelated"));
    }

    #[test]
    fn redefinition_shadows_in_later_units() {
        let mut session = session();
        assert_committed(&mut session, "function f() returns int { return 1; }");
        assert_committed(&mut session, "function g() returns int { return f(); }");
        assert_committed(&mut session, "function f() returns int { return 2; }");

        evaluate(&mut session, "g()");
        let unit = session.last_unit().expect("missing unit");
        assert!(unit.source.contains("return 2;"));
        assert!(!unit.source.contains("return 1;"));
    }

    #[test]
    fn unterminated_declaration_is_committed_with_a_terminator() {
        let mut session = session();
        assert_committed(&mut session, "int x = 1");
        let declaration = session.store().lookup(&id("x")).expect("missing x");
        assert_eq!(declaration.source.as_ref(), "int x = 1;");
    }
}

mod idempotence {
    use super::*;

    #[test]
    fn redeclaring_a_name_adds_a_shadowing_declaration() {
        let mut session = session();

        assert_committed(&mut session, "int x = 1;");
        let first = session.store().lookup(&id("x")).map(|d| d.id);
        assert_eq!(session.store().len(), 1);

        assert_committed(&mut session, "int x = 1;");
        let second = session.store().lookup(&id("x")).map(|d| d.id);
        assert_eq!(session.store().len(), 2);

        assert_ne!(first, second);
        assert_eq!(session.store().all_names(), vec![id("x"), id("x")]);
        assert_eq!(session.declarations().len(), 1);
    }

    #[test]
    fn reimporting_a_bound_module_skips_compilation() {
        let mut session = session();
        assert_committed(&mut session, "import sprig/io;");
        let compiled = session.backend().units.len();

        assert_committed(&mut session, "import sprig/io as io;");
        assert_eq!(session.backend().units.len(), compiled);
        assert_eq!(session.execution_count(), 2);
        assert_no_leaks(&session);
    }
}

mod rollback {
    use super::*;

    struct Snapshot {
        names: Vec<QuotedIdentifier>,
        imports: Vec<String>,
        implicit: BTreeSet<String>,
        execution_count: usize,
    }

    fn snapshot(session: &MockSession) -> Snapshot {
        Snapshot {
            names: session.store().all_names(),
            imports: session.imports_in_scope(),
            implicit: session.registry().implicit_imports(),
            execution_count: session.execution_count(),
        }
    }

    fn assert_unchanged(session: &MockSession, before: &Snapshot) {
        let after = snapshot(session);
        assert_eq!(after.names, before.names);
        assert_eq!(after.imports, before.imports);
        assert_eq!(after.implicit, before.implicit);
        assert_eq!(after.execution_count, before.execution_count);
    }

    fn prepared_session() -> MockSession {
        let mut session = session();
        assert_committed(&mut session, "import sprig/io;");
        assert_committed(&mut session, "function show(int n) { io:println(n); }");
        session
    }

    #[test]
    fn compile_failure() {
        let mut session = prepared_session();
        let before = snapshot(&session);

        let result = evaluate(&mut session, "function show(int n) { bad_compile(n); }");
        assert!(!result.committed);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Compile);
        assert_unchanged(&session, &before);
        assert_no_leaks(&session);
    }

    #[test]
    fn compile_failure_of_a_statement_leaves_usage_untouched() {
        let mut session = prepared_session();
        let before = snapshot(&session);

        let result = evaluate(&mut session, "io:bad_compile();");
        assert!(!result.committed);
        assert_unchanged(&session, &before);
        assert_eq!(
            session.registry().usage_of(&Owner::Anonymous),
            Some(&BTreeSet::from([id("interop")]))
        );
    }

    #[test]
    fn semantic_failure_points_into_the_input() {
        let mut session = prepared_session();
        let before = snapshot(&session);

        let result = evaluate(&mut session, "show(1) +\n  bad_semantics");
        assert!(!result.committed);
        assert_unchanged(&session, &before);

        let diagnostic = &result.diagnostics[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::Semantic);
        assert_eq!(diagnostic.origin, DiagnosticOrigin::Input);
        assert_eq!(
            diagnostic.span,
            Some(Span {
                start: Position { line: 1, column: 2 },
                end: Position { line: 1, column: 15 },
            })
        );
    }

    #[test]
    fn parse_failure() {
        let mut session = prepared_session();
        let before = snapshot(&session);

        let result = evaluate(&mut session, "function broken( {");
        assert!(!result.committed);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Parse);
        assert_unchanged(&session, &before);
    }

    #[test]
    fn failed_import_leaves_the_binding_alone() {
        let mut session = prepared_session();
        let before = snapshot(&session);

        let result = evaluate(&mut session, "import net/bad_compile as io;");
        assert!(!result.committed);
        assert_unchanged(&session, &before);
        assert_eq!(
            session.registry().module_of(&id("io")),
            ModuleReference::parse("sprig/io").as_ref()
        );
    }

    #[test]
    fn runtime_failure_of_a_statement() {
        let mut session = prepared_session();
        let before = snapshot(&session);

        let result = evaluate(&mut session, "boom();");
        assert!(!result.committed);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Runtime);
        assert_unchanged(&session, &before);
        assert_no_leaks(&session);
    }
}

mod runtime_failure_policy {
    use super::*;

    #[test]
    fn definitions_are_committed_by_default() {
        let mut session = session();
        let result = evaluate(&mut session, "int x = boom();");

        assert!(result.committed);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Runtime);
        assert!(session.store().lookup(&id("x")).is_some());
        assert_eq!(session.execution_count(), 1);
    }

    #[test]
    fn definitions_can_be_rolled_back() {
        let mut session = session_with_settings(
            SessionSettings::default().with_commit_definitions_on_runtime_failure(false),
        );
        let result = evaluate(&mut session, "int x = boom();");

        assert!(!result.committed);
        assert!(session.store().lookup(&id("x")).is_none());
        assert_eq!(session.execution_count(), 0);
    }

    #[test]
    fn expressions_are_never_committed() {
        let mut session = session();
        let result = evaluate(&mut session, "boom()");

        assert!(!result.committed);
        assert_eq!(result.value, None);
        assert!(session.store().is_empty());
    }

    #[test]
    fn load_failure_is_a_runtime_failure() {
        let mut session = session();
        let result = evaluate(&mut session, "load_fails()");

        assert!(!result.committed);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Runtime);
        assert_eq!(session.loader().loaded, 0);
        assert_no_leaks(&session);
    }
}

mod imports {
    use super::*;

    fn seed_without_implicit_imports() -> ImportSeed {
        ImportSeed {
            bootstrap: ImportRecord::new(
                "interop",
                ModuleReference::parse("sprig/interop").expect("invalid module"),
            ),
            implicit_prefixes: Vec::new(),
        }
    }

    #[test]
    fn rebinding_a_prefix_updates_dependent_units() {
        let mut session = session_with_settings(
            SessionSettings::default().with_import_seed(seed_without_implicit_imports()),
        );
        let fetch_all = Owner::Name(id("fetchAll"));

        assert_committed(&mut session, "import net/http as io;");
        assert_committed(&mut session, "function fetchAll() { io:get(); }");
        assert_eq!(
            session.registry().imports_needed_for([&fetch_all]),
            BTreeSet::from(["import net/http as io;".to_string()])
        );

        assert_committed(&mut session, "import net/https as io;");
        assert_eq!(
            session.registry().imports_needed_for([&fetch_all]),
            BTreeSet::from(["import net/https as io;".to_string()])
        );

        evaluate(&mut session, "fetchAll();");
        let unit = session.last_unit().expect("missing unit");
        assert!(unit.source.starts_with("import net/https as io;\n"));
        assert!(!unit.source.contains("net/http "));
    }

    #[test]
    fn statement_prefixes_become_implicit() {
        let mut session = session();
        assert_committed(&mut session, "import sprig/io;");
        assert_committed(&mut session, "io:println(1);");

        assert!(
            session
                .registry()
                .implicit_imports()
                .contains("import sprig/io as io;")
        );
    }

    #[test]
    fn imports_in_scope_are_ordered_by_prefix() {
        let mut session = session();
        assert_committed(&mut session, "import sprig/math;");
        assert_committed(&mut session, "import sprig/io as a;");

        assert_eq!(
            session.imports_in_scope(),
            vec![
                "import sprig/io as a;",
                "import sprig/interop as interop;",
                "import sprig/math as math;",
            ]
        );
    }

    #[test]
    fn redefinition_replaces_usage() {
        let mut session = session();
        assert_committed(&mut session, "import sprig/io;");
        assert_committed(&mut session, "function f() { io:println(1); }");
        assert_committed(&mut session, "function f() {}");

        assert_eq!(
            session.registry().usage_of(&Owner::Name(id("f"))),
            Some(&BTreeSet::new())
        );
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn reset_restores_the_seeded_state() {
        let mut session = session();
        let seeded = session.imports_in_scope();

        assert_committed(&mut session, "import sprig/io;");
        assert_committed(&mut session, "io:println(1);");
        assert_committed(&mut session, "int x = 1;");

        session.reset();
        assert_eq!(session.imports_in_scope(), seeded);
        assert_eq!(
            session.registry().implicit_imports(),
            BTreeSet::from(["import sprig/interop as interop;".to_string()])
        );
        assert!(session.store().is_empty());
        assert_eq!(session.execution_count(), 0);
        assert_eq!(session.loader().resets, 1);
        assert!(session.last_unit().is_none());
    }

    #[test]
    fn artifacts_are_released_on_every_path() {
        let mut session = session();
        evaluate(&mut session, "1");
        evaluate(&mut session, "boom()");
        evaluate(&mut session, "bad_compile()");
        evaluate(&mut session, "bad_semantics()");
        evaluate(&mut session, "int x = boom();");

        assert_eq!(session.loader().loaded, 3);
        assert_no_leaks(&session);
    }

    #[test]
    fn panicking_executor_poisons_the_session() {
        let mut session = session();
        assert_committed(&mut session, "int x = 1;");

        let result = catch_unwind(AssertUnwindSafe(|| session.evaluate("panic_now()")));
        assert!(result.is_err());
        assert_no_leaks(&session);
        assert_eq!(session.state(), SessionState::Executing);

        assert_eq!(
            session.evaluate("1"),
            Err(Error::Busy(SessionState::Executing))
        );
        assert!(session.is_poisoned());
        assert_eq!(session.evaluate("1"), Err(Error::Poisoned));
        assert_eq!(session.remove(&[id("x")]), Err(Error::Poisoned));

        session.reset();
        assert!(!session.is_poisoned());
        assert!(evaluate(&mut session, "1").committed);
    }

    #[test]
    fn reset_recovers_a_session_that_was_left_mid_evaluation() {
        let mut session = session();
        assert_committed(&mut session, "int x = 1;");

        let result = catch_unwind(AssertUnwindSafe(|| session.evaluate("panic_now()")));
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Executing);

        // No other call is made before resetting
        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_poisoned());
        assert!(session.store().is_empty());
        assert!(evaluate(&mut session, "1").committed);
    }

    #[test]
    fn deeply_nested_input_is_a_parse_error() {
        let mut session = session();
        assert_committed(&mut session, "int x = 1;");

        let input = format!("{}1{}", "(".repeat(2_000), ")".repeat(2_000));
        let result = evaluate(&mut session, &input);
        assert!(!result.committed);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::Parse);
        assert!(!session.is_poisoned());

        assert!(evaluate(&mut session, "x").committed);
        assert_eq!(session.execution_count(), 2);
    }

    #[test]
    fn remove_declarations() {
        let mut session = session();
        assert_committed(&mut session, "import sprig/io;");
        assert_committed(&mut session, "function f() { io:println(1); }");
        assert_committed(&mut session, "int x = 1;");

        let result = session.remove(&[id("f"), id("x")]).expect("remove failed");
        assert!(result.committed);
        assert!(session.declarations().is_empty());
        assert_eq!(session.registry().usage_of(&Owner::Name(id("f"))), None);
        assert_eq!(session.loader().forgotten, vec![id("f"), id("x")]);
        assert_eq!(session.store().len(), 3, "history is kept");
    }

    #[test]
    fn removing_an_unknown_name_removes_nothing() {
        let mut session = session();
        assert_committed(&mut session, "int x = 1;");

        let result = session.remove(&[id("x"), id("nope")]).expect("remove failed");
        assert!(!result.committed);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("nope"));
        assert!(session.store().lookup(&id("x")).is_some());
        assert!(session.loader().forgotten.is_empty());
    }
}

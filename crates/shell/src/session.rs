use crate::{
    ArtifactLoader, Backend, ClassifiedSnippet, CompilationUnit, CompilationUnitAssembler,
    Declaration, DeclarationKind, DeclarationStore, DependencyResolver, Diagnostic,
    DiagnosticKind, DiagnosticOrigin, Error, ImportRegistry, ImportSeed, InternalError, Owner,
    Result, SemanticAnalyzer, SnippetClassifier, SnippetKind, backend::LoadedArtifact,
};
use sprig_parser::{Parser, QuotedIdentifier, TopLevel, TopLevelKind};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The states that a [Session] moves through while evaluating a snippet
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SessionState {
    Idle,
    Classifying,
    Resolving,
    Assembling,
    Compiling,
    Executing,
    Committing,
    RollingBack,
}

impl SessionState {
    /// Returns true if the session can move from this state to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Classifying)
                | (Classifying, Resolving)
                // A re-import of an existing binding skips compilation
                | (Classifying, Committing)
                | (Classifying, RollingBack)
                | (Resolving, Assembling)
                | (Assembling, Compiling)
                | (Compiling, Executing)
                | (Compiling, RollingBack)
                | (Executing, Committing)
                | (Executing, RollingBack)
                | (Committing, Idle)
                | (RollingBack, Idle)
        )
    }
}

/// Settings used to control the behaviour of a [Session]
#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// Whether or not a declaration is committed when executing it fails
    ///
    /// Only snippets that define names are affected, statements and expressions are never
    /// committed when they fail.
    ///
    /// Default: `true`
    pub commit_definitions_on_runtime_failure: bool,
    /// The imports that the session starts with, and that are restored on reset
    pub import_seed: ImportSeed,
}

impl SessionSettings {
    /// Helper for conveniently defining the runtime failure commit policy
    #[must_use]
    pub fn with_commit_definitions_on_runtime_failure(self, enabled: bool) -> Self {
        Self {
            commit_definitions_on_runtime_failure: enabled,
            ..self
        }
    }

    /// Helper for conveniently defining a custom import seed
    #[must_use]
    pub fn with_import_seed(self, import_seed: ImportSeed) -> Self {
        Self {
            import_seed,
            ..self
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            commit_definitions_on_runtime_failure: true,
            import_seed: ImportSeed::default(),
        }
    }
}

/// The result of evaluating some input
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvaluationResult {
    /// The rendered value of the final snippet, if it was an expression that produced a value
    pub value: Option<String>,
    /// Diagnostics produced while evaluating the input, in the order they were produced
    pub diagnostics: Vec<Diagnostic>,
    /// True if every snippet in the input was committed
    ///
    /// Empty input commits nothing, so `committed` is false.
    pub committed: bool,
    /// The number of snippets that were committed
    ///
    /// The input is committed as a whole, so this is either the number of snippets in the input
    /// or zero.
    pub committed_snippets: usize,
}

impl EvaluationResult {
    /// Returns true if any of the diagnostics has error severity
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    fn rejected(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            ..Self::default()
        }
    }
}

// The session's state before evaluating input with more than one snippet
struct Checkpoint<C> {
    registry: ImportRegistry,
    store: DeclarationStore,
    execution_count: usize,
    loader: C,
}

// The outcome of a single snippet's transaction
struct SnippetOutcome {
    value: Option<String>,
    diagnostics: Vec<Diagnostic>,
    committed: bool,
}

impl SnippetOutcome {
    fn committed(value: Option<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            value,
            diagnostics,
            committed: true,
        }
    }

    fn rolled_back(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            value: None,
            diagnostics,
            committed: false,
        }
    }
}

/// An incremental evaluation session
///
/// Each snippet of input is evaluated as a transaction. The snippet is classified, the
/// declarations and imports that it depends on are resolved, and a compilation unit is assembled
/// that contains only what the snippet needs. The unit is checked, compiled, loaded and
/// executed, and then if everything succeeded the snippet is committed to the session's state.
/// If anything fails then the session is left exactly as it was before the snippet.
///
/// The session knows nothing about the language's semantics, those are provided by the
/// [SemanticAnalyzer], [Backend], and [ArtifactLoader] collaborators.
pub struct Session<A, B, L>
where
    A: SemanticAnalyzer,
    B: Backend,
    L: ArtifactLoader<Artifact = B::Artifact>,
{
    analyzer: A,
    backend: B,
    loader: L,
    settings: SessionSettings,
    registry: ImportRegistry,
    store: DeclarationStore,
    execution_count: usize,
    state: SessionState,
    poisoned: bool,
    last_unit: Option<CompilationUnit>,
}

impl<A, B, L> Session<A, B, L>
where
    A: SemanticAnalyzer,
    B: Backend,
    L: ArtifactLoader<Artifact = B::Artifact>,
{
    /// Makes a new session with default settings
    pub fn new(analyzer: A, backend: B, loader: L) -> Self {
        Self::with_settings(SessionSettings::default(), analyzer, backend, loader)
    }

    /// Makes a new session with the given settings
    pub fn with_settings(settings: SessionSettings, analyzer: A, backend: B, loader: L) -> Self {
        let registry = ImportRegistry::new(settings.import_seed.clone());
        Self {
            analyzer,
            backend,
            loader,
            settings,
            registry,
            store: DeclarationStore::new(),
            execution_count: 0,
            state: SessionState::Idle,
            poisoned: false,
            last_unit: None,
        }
    }

    /// Evaluates the input, snippet by snippet
    ///
    /// Each top-level item in the input is evaluated in order, with later snippets able to refer
    /// to earlier ones. Evaluation stops at the first snippet that isn't committed, and then the
    /// snippets that were already committed are undone, so that the session is left as it was
    /// before the call. Output that was written while running the earlier snippets isn't undone.
    ///
    /// Problems with the input are reported in the result's diagnostics, an error is only
    /// returned if the session's own invariants are broken, after which the session is unusable
    /// until it's reset.
    pub fn evaluate(&mut self, input: &str) -> Result<EvaluationResult> {
        self.check_usable()?;

        let syntax = match Parser::parse(input) {
            Ok(syntax) => syntax,
            Err(error) => {
                let diagnostic = Diagnostic::error(DiagnosticKind::Parse, error.to_string())
                    .with_span(error.span, DiagnosticOrigin::Input);
                let outcome = self.run_transaction(|session| {
                    session.transition(SessionState::Classifying)?;
                    session.roll_back(vec![diagnostic])
                })?;
                return Ok(EvaluationResult::rejected(outcome.diagnostics));
            }
        };

        let mut result = EvaluationResult::default();
        let snippet_count = syntax.items.len();
        let mut checkpoint = (snippet_count > 1).then(|| self.checkpoint());

        for node in syntax.items {
            let outcome = self.run_transaction(|session| session.evaluate_snippet(node))?;
            result.diagnostics.extend(outcome.diagnostics);
            if !outcome.committed {
                let committed_snippets = result.committed_snippets;
                if let Some(checkpoint) = checkpoint.take().filter(|_| committed_snippets > 0) {
                    self.restore(checkpoint);
                }
                result.value = None;
                result.committed_snippets = 0;
                return Ok(result);
            }
            result.value = outcome.value;
            result.committed_snippets += 1;
        }

        result.committed = snippet_count > 0;
        Ok(result)
    }

    /// Discards everything that has been committed
    ///
    /// The registry is returned to its seeded state, the loader discards its state, and a
    /// poisoned session becomes usable again.
    ///
    /// Unlike the other operations, `reset` can be called from any state. Normally the session is
    /// idle whenever it's reachable, but after an evaluation has unwound, or after an internal
    /// error, resetting is the only way to get back to a usable session, so the state is forced
    /// back to idle.
    pub fn reset(&mut self) {
        self.store.clear();
        self.registry.reset();
        self.loader.reset();
        self.execution_count = 0;
        self.last_unit = None;
        self.poisoned = false;
        self.state = SessionState::Idle;
        debug!("session reset");
    }

    /// Removes committed declarations by name
    ///
    /// Either every name is removed, or if any of the names isn't a visible declaration then
    /// nothing is removed and a diagnostic is returned.
    pub fn remove(&mut self, names: &[QuotedIdentifier]) -> Result<EvaluationResult> {
        self.check_usable()?;

        match self.store.remove(names) {
            Ok(removed) => {
                for declaration in &removed {
                    self.registry
                        .remove_usage(&Owner::Name(declaration.name.clone()));
                }
                self.loader.forget(names);
                debug!(count = removed.len(), "declarations removed");
                Ok(EvaluationResult {
                    committed: true,
                    ..EvaluationResult::default()
                })
            }
            Err(unknown) => Ok(EvaluationResult::rejected(vec![Diagnostic::error(
                DiagnosticKind::Semantic,
                format!("'{unknown}' isn't a declaration in this session"),
            )])),
        }
    }

    /// The import statements that are currently bound, ordered by prefix
    pub fn imports_in_scope(&self) -> Vec<String> {
        self.registry
            .records()
            .iter()
            .map(|record| record.to_string())
            .collect()
    }

    /// The declarations that can currently be referred to by name, in commit order
    pub fn declarations(&self) -> Vec<Arc<Declaration>> {
        self.store.visible().cloned().collect()
    }

    /// The number of snippets that have been committed since the session was created or reset
    pub fn execution_count(&self) -> usize {
        self.execution_count
    }

    /// The session's current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if the session has been poisoned by an internal error
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The session's declaration store
    pub fn store(&self) -> &DeclarationStore {
        &self.store
    }

    /// The session's import registry
    pub fn registry(&self) -> &ImportRegistry {
        &self.registry
    }

    /// The compilation unit that was most recently assembled
    pub fn last_unit(&self) -> Option<&CompilationUnit> {
        self.last_unit.as_ref()
    }

    /// The session's settings
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The session's backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The session's artifact loader
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// A mutable reference to the session's artifact loader
    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    fn checkpoint(&self) -> Checkpoint<L::Checkpoint> {
        Checkpoint {
            registry: self.registry.clone(),
            store: self.store.clone(),
            execution_count: self.execution_count,
            loader: self.loader.checkpoint(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint<L::Checkpoint>) {
        debug!(
            undone = self.execution_count - checkpoint.execution_count,
            "input rolled back"
        );
        self.registry = checkpoint.registry;
        self.store = checkpoint.store;
        self.execution_count = checkpoint.execution_count;
        self.loader.restore(checkpoint.loader);
    }

    fn check_usable(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        if self.state != SessionState::Idle {
            // A previous evaluation unwound before returning to idle
            let state = self.state;
            return Err(self.poison(Error::Busy(state)));
        }
        Ok(())
    }

    fn poison(&mut self, error: Error) -> Error {
        warn!(%error, "session poisoned");
        self.poisoned = true;
        self.state = SessionState::Idle;
        error
    }

    // Runs a snippet's transaction, making sure that the session is back to idle afterwards
    fn run_transaction<T>(
        &mut self,
        transaction: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        match transaction(self).and_then(|result| {
            self.transition(SessionState::Idle)?;
            Ok(result)
        }) {
            Ok(result) => Ok(result),
            Err(error) => Err(self.poison(error)),
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(InternalError::InvalidTransition {
                from: self.state,
                to: next,
            }
            .into());
        }

        trace!(from = ?self.state, to = ?next, "session state");
        self.state = next;
        Ok(())
    }

    fn evaluate_snippet(&mut self, node: TopLevel) -> Result<SnippetOutcome> {
        self.transition(SessionState::Classifying)?;
        let snippet = SnippetClassifier::classify(node);
        trace!(kind = ?snippet.kind, "snippet classified");

        if let Some(record) = snippet.import_record() {
            if self.registry.module_of(&record.prefix) == Some(&record.module) {
                trace!(%record, "import is already bound");
                self.transition(SessionState::Committing)?;
                self.commit(&snippet)?;
                return Ok(SnippetOutcome::committed(None, Vec::new()));
            }
        }

        self.transition(SessionState::Resolving)?;
        let resolution = DependencyResolver::resolve(&snippet, &self.registry, &self.store);

        self.transition(SessionState::Assembling)?;
        let unit = CompilationUnitAssembler::assemble(&self.registry, &resolution, &snippet);
        self.last_unit = Some(unit.clone());

        self.transition(SessionState::Compiling)?;
        let mut diagnostics: Vec<Diagnostic> = self
            .analyzer
            .check(&unit, &resolution.declarations)
            .into_iter()
            .map(|diagnostic| unit.locate(diagnostic))
            .collect();
        if diagnostics.iter().any(Diagnostic::is_error) {
            return self.roll_back(diagnostics);
        }

        let artifact = match self.backend.compile(&unit) {
            Ok(artifact) => artifact,
            Err(errors) => {
                diagnostics.extend(errors.into_iter().map(|error| unit.locate(error)));
                return self.roll_back(diagnostics);
            }
        };

        self.transition(SessionState::Executing)?;
        // The artifact is unloaded when the guard is dropped at the end of the closure
        let execution = LoadedArtifact::load(&mut self.loader, artifact)
            .and_then(|mut loaded| loaded.invoke());

        match execution {
            Ok(value) => {
                self.transition(SessionState::Committing)?;
                self.commit(&snippet)?;
                Ok(SnippetOutcome::committed(value, diagnostics))
            }
            Err(failure) => {
                diagnostics.push(unit.locate(failure.into_diagnostic()));
                if self.settings.commit_definitions_on_runtime_failure
                    && snippet.kind.is_declaration()
                {
                    debug!("committing definitions despite a runtime failure");
                    self.transition(SessionState::Committing)?;
                    self.commit(&snippet)?;
                    Ok(SnippetOutcome::committed(None, diagnostics))
                } else {
                    self.roll_back(diagnostics)
                }
            }
        }
    }

    fn roll_back(&mut self, diagnostics: Vec<Diagnostic>) -> Result<SnippetOutcome> {
        self.transition(SessionState::RollingBack)?;
        debug!(diagnostics = diagnostics.len(), "snippet rolled back");
        Ok(SnippetOutcome::rolled_back(diagnostics))
    }

    fn commit(&mut self, snippet: &ClassifiedSnippet) -> Result<()> {
        let source = snippet.terminated_source();

        match snippet.kind {
            SnippetKind::ImportDeclaration => {
                if let Some(record) = snippet.import_record() {
                    let prefix = self.registry.register_import(record.prefix, record.module);
                    self.store
                        .define(Declaration::new(prefix, DeclarationKind::Import, source));
                }
            }
            SnippetKind::ModuleLevelDeclaration | SnippetKind::ModuleVariableDeclaration => {
                if let Some(name) = snippet.declared_name() {
                    let kind = match &snippet.node.kind {
                        TopLevelKind::Type(_) => DeclarationKind::Type,
                        TopLevelKind::Function(_) => DeclarationKind::Function,
                        _ => DeclarationKind::ModuleVariable,
                    };

                    // A redefinition replaces the usage of the previous definition
                    let owner = Owner::Name(name.clone());
                    self.registry.remove_usage(&owner);
                    self.registry
                        .record_usage(owner, snippet.used_prefixes.iter().cloned());

                    let id = self.store.define(
                        Declaration::new(name.clone(), kind, source)
                            .with_defined_names(snippet.defined_names.iter().cloned())
                            .with_free_names(snippet.free_names.iter().cloned())
                            .with_used_prefixes(snippet.used_prefixes.iter().cloned()),
                    );

                    if self.store.lookup(name).map(|declaration| declaration.id) != Some(id) {
                        return Err(InternalError::MissingCommittedDeclaration(name.clone()).into());
                    }
                }
            }
            SnippetKind::Statement | SnippetKind::Expression => {
                self.registry
                    .record_implicit_usage(snippet.used_prefixes.iter().cloned());
                let slot = QuotedIdentifier::from_canonical(format!("${}", self.execution_count));
                self.store.define(
                    Declaration::new(slot, DeclarationKind::Statement, source)
                        .with_free_names(snippet.free_names.iter().cloned())
                        .with_used_prefixes(snippet.used_prefixes.iter().cloned()),
                );
            }
        }

        self.execution_count += 1;

        if !self.registry.is_consistent() {
            return Err(InternalError::BrokenImportBijection.into());
        }

        debug!(
            kind = ?snippet.kind,
            execution_count = self.execution_count,
            "snippet committed"
        );
        Ok(())
    }
}

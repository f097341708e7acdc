//! The collaborators that a [Session](crate::Session) drives
//!
//! The session doesn't know how a compilation unit is checked, compiled, or executed. It only
//! knows the traits defined here, so that a frontend can plug in an interpreter, a native code
//! generator, or an external worker process.

use crate::{CompilationUnit, Declaration, Diagnostic, DiagnosticKind, DiagnosticOrigin};
use sprig_parser::{QuotedIdentifier, Span};
use std::{fmt, sync::Arc};
use tracing::trace;

/// Checks an assembled unit before it's compiled
pub trait SemanticAnalyzer {
    /// Returns the diagnostics found in the unit
    ///
    /// `visible` contains the committed declarations that the unit was assembled with.
    /// Any diagnostic with error severity prevents the snippet from being compiled.
    fn check(&self, unit: &CompilationUnit, visible: &[Arc<Declaration>]) -> Vec<Diagnostic>;
}

/// Compiles an assembled unit into an artifact that can be loaded
pub trait Backend {
    /// The backend's compiled output
    type Artifact;

    /// Compiles the unit, or returns the diagnostics that explain why it couldn't be compiled
    fn compile(&mut self, unit: &CompilationUnit) -> Result<Self::Artifact, Vec<Diagnostic>>;
}

/// Loads and invokes compiled artifacts
///
/// The loader owns whatever state outlives a single evaluation, e.g. the values of module
/// variables.
pub trait ArtifactLoader {
    /// The artifact type that the loader accepts
    type Artifact;
    /// A loaded artifact
    type Handle;
    /// A saved copy of the state that carries over between evaluations
    type Checkpoint;

    /// Loads an artifact, making it ready to be invoked
    fn load(&mut self, artifact: Self::Artifact) -> Result<Self::Handle, RuntimeFailure>;

    /// Runs a loaded artifact, returning its rendered result if it produced one
    fn invoke(&mut self, handle: &mut Self::Handle) -> Result<Option<String>, RuntimeFailure>;

    /// Releases a loaded artifact
    fn unload(&mut self, handle: Self::Handle);

    /// Discards all state that was carried over between evaluations
    fn reset(&mut self);

    /// Discards any state associated with the given names
    fn forget(&mut self, names: &[QuotedIdentifier]);

    /// Saves the state that carries over between evaluations
    fn checkpoint(&self) -> Self::Checkpoint;

    /// Returns to the state that was saved by [ArtifactLoader::checkpoint]
    fn restore(&mut self, checkpoint: Self::Checkpoint);
}

/// The reason that a runtime failure occurred
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuntimeFailureKind {
    /// The executed code produced an error
    Error,
    /// The execution limit was exceeded
    Timeout,
    /// Execution was interrupted
    Interrupted,
}

/// An error that occurred while loading or invoking an artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeFailure {
    /// The kind of failure
    pub kind: RuntimeFailureKind,
    /// The failure's message
    pub message: String,
    /// The location in the compilation unit where the failure occurred
    pub span: Option<Span>,
}

impl RuntimeFailure {
    /// Makes a runtime error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: RuntimeFailureKind::Error,
            message: message.into(),
            span: None,
        }
    }

    /// Makes a failure of the given kind
    pub fn with_kind(kind: RuntimeFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            ..Self::error(message)
        }
    }

    /// Sets the location of the failure in the compilation unit
    #[must_use]
    pub fn with_span(self, span: Span) -> Self {
        Self {
            span: Some(span),
            ..self
        }
    }

    /// Converts the failure into a runtime diagnostic with a span in the unit
    pub fn into_diagnostic(self) -> Diagnostic {
        let diagnostic = Diagnostic::error(DiagnosticKind::Runtime, self.to_string());
        match self.span {
            Some(span) => diagnostic.with_span(span, DiagnosticOrigin::Unit),
            None => diagnostic,
        }
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RuntimeFailureKind::Error => f.write_str(&self.message),
            RuntimeFailureKind::Timeout => write!(f, "execution timed out ({})", self.message),
            RuntimeFailureKind::Interrupted => write!(f, "execution interrupted ({})", self.message),
        }
    }
}

impl std::error::Error for RuntimeFailure {}

/// A loaded artifact that's unloaded when dropped
///
/// The guard makes sure that the artifact is released on every exit path out of an evaluation,
/// including unwinding.
pub(crate) struct LoadedArtifact<'a, L: ArtifactLoader> {
    loader: &'a mut L,
    handle: Option<L::Handle>,
}

impl<'a, L: ArtifactLoader> LoadedArtifact<'a, L> {
    pub fn load(loader: &'a mut L, artifact: L::Artifact) -> Result<Self, RuntimeFailure> {
        let handle = loader.load(artifact)?;
        trace!("artifact loaded");
        Ok(Self {
            loader,
            handle: Some(handle),
        })
    }

    pub fn invoke(&mut self) -> Result<Option<String>, RuntimeFailure> {
        match self.handle.as_mut() {
            Some(handle) => self.loader.invoke(handle),
            None => Err(RuntimeFailure::error("the artifact has already been unloaded")),
        }
    }
}

impl<L: ArtifactLoader> Drop for LoadedArtifact<'_, L> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.loader.unload(handle);
            trace!("artifact unloaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingLoader {
        loaded: usize,
        unloaded: usize,
    }

    impl ArtifactLoader for CountingLoader {
        type Artifact = bool;
        type Handle = bool;
        type Checkpoint = ();

        fn load(&mut self, artifact: bool) -> Result<bool, RuntimeFailure> {
            self.loaded += 1;
            Ok(artifact)
        }

        fn invoke(&mut self, handle: &mut bool) -> Result<Option<String>, RuntimeFailure> {
            if *handle {
                Ok(Some("ok".into()))
            } else {
                panic!("invoked a failing artifact")
            }
        }

        fn unload(&mut self, _handle: bool) {
            self.unloaded += 1;
        }

        fn reset(&mut self) {}

        fn forget(&mut self, _names: &[QuotedIdentifier]) {}

        fn checkpoint(&self) {}

        fn restore(&mut self, _checkpoint: ()) {}
    }

    #[test]
    fn guard_unloads_on_drop() {
        let mut loader = CountingLoader::default();
        {
            let mut loaded = LoadedArtifact::load(&mut loader, true).unwrap();
            assert_eq!(loaded.invoke(), Ok(Some("ok".into())));
        }
        assert_eq!((loader.loaded, loader.unloaded), (1, 1));
    }

    #[test]
    fn guard_unloads_while_unwinding() {
        let mut loader = CountingLoader::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut loaded = LoadedArtifact::load(&mut loader, false).unwrap();
            let _ = loaded.invoke();
        }));
        assert!(result.is_err());
        assert_eq!((loader.loaded, loader.unloaded), (1, 1));
    }

    #[test]
    fn failure_display() {
        let failure = RuntimeFailure::with_kind(RuntimeFailureKind::Timeout, "limit: 1s");
        assert_eq!(failure.to_string(), "execution timed out (limit: 1s)");
        let diagnostic = failure.into_diagnostic();
        assert_eq!(diagnostic.kind, DiagnosticKind::Runtime);
        assert!(diagnostic.span.is_none());
    }
}

use crate::{Error, Result};
use sprig_parser::QuotedIdentifier;
use sprig_runtime::{Checker, Compiler, CoreLib, SprigWrite, Value, Vm, VmSettings};
use sprig_shell::{CompilationUnit, Declaration, EvaluationResult, Session, SessionSettings};
use std::{
    fs,
    path::Path,
    rc::Rc,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};
use tracing::debug;

/// A session driven by the reference checker, compiler, and VM
pub type SprigSession = Session<Checker, Compiler, Vm>;

/// The main interface for evaluating Sprig snippets
///
/// Each call to [evaluate](Sprig::evaluate) is checked, compiled, and run against the
/// declarations and imports that earlier calls committed.
///
/// Example:
///
/// ```
/// use sprig::prelude::*;
///
/// fn main() -> sprig::Result<()> {
///     let mut sprig = Sprig::default();
///
///     sprig.evaluate("function square(int n) returns int { return n * n; }")?;
///     let result = sprig.evaluate("square(9)")?;
///     assert_eq!(result.value.as_deref(), Some("81"));
///
///     Ok(())
/// }
/// ```
pub struct Sprig {
    session: SprigSession,
}

impl Default for Sprig {
    fn default() -> Self {
        Self::new()
    }
}

impl Sprig {
    /// Creates a new instance of Sprig with default settings
    pub fn new() -> Self {
        Self::with_settings(SprigSettings::default())
    }

    /// Creates a new instance of Sprig with the given settings
    pub fn with_settings(settings: SprigSettings) -> Self {
        let core_lib = CoreLib::default();
        Self {
            session: Session::with_settings(
                settings.session_settings,
                Checker::with_core_lib(core_lib.clone()),
                Compiler::with_core_lib(core_lib),
                Vm::with_settings(settings.vm_settings),
            ),
        }
    }

    /// Evaluates the input, committing each snippet that succeeds
    ///
    /// Evaluation stops at the first snippet that isn't committed, the reasons are reported in
    /// the result's diagnostics.
    pub fn evaluate(&mut self, input: &str) -> Result<EvaluationResult> {
        self.session.evaluate(input).map_err(Error::from)
    }

    /// Reads a file and evaluates its contents
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<EvaluationResult> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| Error::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loading file");
        self.evaluate(&source)
    }

    /// Discards all declarations, imports, and variable values
    pub fn reset(&mut self) {
        self.session.reset();
    }

    /// Removes the declarations with the given names
    ///
    /// If any of the names doesn't refer to a declaration then nothing is removed.
    pub fn remove<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<EvaluationResult> {
        let names: Vec<QuotedIdentifier> = names.into_iter().map(QuotedIdentifier::from).collect();
        self.session.remove(&names).map_err(Error::from)
    }

    /// The import statements that are currently in scope
    pub fn imports_in_scope(&self) -> Vec<String> {
        self.session.imports_in_scope()
    }

    /// The declarations that are currently visible, in the order they were committed
    pub fn declarations(&self) -> Vec<Arc<Declaration>> {
        self.session.declarations()
    }

    /// The module variables that currently have values, with their rendered values
    pub fn module_variables(&self) -> Vec<(String, String)> {
        self.session
            .loader()
            .memory()
            .iter()
            .map(|(name, value)| (name.to_string(), value.render()))
            .collect()
    }

    /// Returns the current value of a module variable
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.session.loader().get(name)
    }

    /// The compilation unit that was assembled for the most recent snippet
    pub fn last_unit(&self) -> Option<&CompilationUnit> {
        self.session.last_unit()
    }

    /// Returns true if the session needs to be reset before it can be used again
    pub fn is_poisoned(&self) -> bool {
        self.session.is_poisoned()
    }

    /// The underlying session
    pub fn session(&self) -> &SprigSession {
        &self.session
    }

    /// The underlying session, mutably
    pub fn session_mut(&mut self) -> &mut SprigSession {
        &mut self.session
    }
}

/// Settings used to control the behaviour of a [Sprig] session
#[derive(Default)]
pub struct SprigSettings {
    /// Settings that apply to the session
    pub session_settings: SessionSettings,
    /// Settings that apply to the runtime
    pub vm_settings: VmSettings,
}

impl SprigSettings {
    /// Helper for conveniently defining a maximum execution duration
    #[must_use]
    pub fn with_execution_limit(self, limit: Duration) -> Self {
        Self {
            vm_settings: VmSettings {
                execution_limit: Some(limit),
                ..self.vm_settings
            },
            ..self
        }
    }

    /// Helper for conveniently defining an interrupt flag
    #[must_use]
    pub fn with_interrupt(self, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            vm_settings: VmSettings {
                interrupt: Some(interrupt),
                ..self.vm_settings
            },
            ..self
        }
    }

    /// Helper for conveniently defining a custom stdout implementation
    #[must_use]
    pub fn with_stdout(self, stdout: impl SprigWrite + 'static) -> Self {
        Self {
            vm_settings: VmSettings {
                stdout: Rc::new(stdout),
                ..self.vm_settings
            },
            ..self
        }
    }

    /// Helper for conveniently defining the runtime failure commit policy
    #[must_use]
    pub fn with_commit_definitions_on_runtime_failure(self, enabled: bool) -> Self {
        Self {
            session_settings: self
                .session_settings
                .with_commit_definitions_on_runtime_failure(enabled),
            ..self
        }
    }
}

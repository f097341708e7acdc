//! A collection of useful items to make it easier to work with `sprig`

pub use crate::{Sprig, SprigSession, SprigSettings};
pub use sprig_runtime::prelude::*;
pub use sprig_shell::{
    CompilationUnit, Declaration, DeclarationKind, Diagnostic, DiagnosticKind, EvaluationResult,
    ImportSeed, SessionSettings, Severity,
};

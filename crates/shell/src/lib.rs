//! The incremental session engine behind the Sprig REPL
//!
//! A [Session] evaluates snippets of input one at a time. Each snippet is compiled together with
//! only the previously committed declarations and imports that it depends on, and is committed
//! to the session's state only if it was evaluated successfully.

#![warn(missing_docs)]

mod assembler;
pub mod backend;
mod bimap;
mod classifier;
mod declarations;
mod diagnostics;
mod error;
mod imports;
mod resolver;
mod session;

pub use crate::{
    assembler::{CompilationUnit, CompilationUnitAssembler, ENTRY_POINT, Segment, SegmentOrigin},
    backend::{ArtifactLoader, Backend, RuntimeFailure, RuntimeFailureKind, SemanticAnalyzer},
    bimap::{BiMap, Evicted},
    classifier::{ClassifiedSnippet, SnippetClassifier, SnippetKind},
    declarations::{Declaration, DeclarationId, DeclarationKind, DeclarationStore},
    diagnostics::{Diagnostic, DiagnosticKind, DiagnosticOrigin, Severity},
    error::{Error, InternalError, Result},
    imports::{ImportRecord, ImportRegistry, ImportSeed, ModuleReference, Owner},
    resolver::{DependencyResolver, Resolution},
    session::{EvaluationResult, Session, SessionSettings, SessionState},
};

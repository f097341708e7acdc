//! Contains the reference collaborators that run Sprig sessions
//!
//! - [Checker] analyzes assembled units before they're compiled.
//! - [Compiler] turns assembled units into [Program]s.
//! - [Vm] loads and runs programs, and keeps the values of module variables between evaluations.

#![warn(missing_docs)]

mod checker;
mod compiler;
mod error;
mod io;
mod types;
mod value;
mod vm;

pub mod core_lib;
pub mod prelude;

pub use crate::{
    checker::Checker,
    compiler::{Compiler, Program},
    core_lib::{CallContext, CoreLib, NativeFunction, NativeModule},
    error::{Error, ErrorKind, Result, unexpected_args, unexpected_type},
    io::{DefaultStderr, DefaultStdout, SprigWrite, map_io_err},
    types::{Type, TypeError, TypeTable},
    value::Value,
    vm::{LoadedProgram, Vm, VmSettings},
};

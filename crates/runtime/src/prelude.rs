//! A collection of useful items to make it easier to work with `sprig_runtime`

#[doc(inline)]
pub use crate::{
    CallContext, Checker, Compiler, CoreLib, NativeModule, Program, SprigWrite, Type, Value, Vm,
    VmSettings, runtime_error, unexpected_args, unexpected_type,
};

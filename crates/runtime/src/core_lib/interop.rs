//! The `sprig/interop` module
//!
//! The module is bound to the `interop` prefix in every session.

use super::NativeModule;
use crate::{ErrorKind, Type, Value, runtime_error, unexpected_args};

/// Initializes the `sprig/interop` module
pub fn make_module() -> NativeModule {
    let mut result = NativeModule::new("sprig/interop");

    result.add_fn("type_of", &[Type::Any], Type::String, |ctx| {
        match ctx.args() {
            [value] => Ok(value.type_name().into()),
            unexpected => unexpected_args("any", unexpected),
        }
    });

    result.add_fn("to_string", &[Type::Any], Type::String, |ctx| {
        match ctx.args() {
            [value] => Ok(value.to_string().into()),
            unexpected => unexpected_args("any", unexpected),
        }
    });

    result.add_fn("panic", &[Type::String], Type::Nil, |ctx| match ctx.args() {
        [Value::Str(message)] => runtime_error!(ErrorKind::Panic(message.to_string())),
        unexpected => unexpected_args("string", unexpected),
    });

    result
}

//! The `sprig/io` module

use super::NativeModule;
use crate::{Type, Value};

/// Initializes the `sprig/io` module
pub fn make_module() -> NativeModule {
    let mut result = NativeModule::new("sprig/io");

    result.add_variadic_fn("print", &[], Type::Any, Type::Nil, |ctx| {
        let output = concat(ctx.args());
        ctx.stdout.write(output.as_bytes())?;
        ctx.stdout.flush()?;
        Ok(Value::Nil)
    });

    result.add_variadic_fn("println", &[], Type::Any, Type::Nil, |ctx| {
        let output = concat(ctx.args());
        ctx.stdout.write_line(&output)?;
        Ok(Value::Nil)
    });

    result
}

// Values are printed one after another without separators
fn concat(values: &[Value]) -> String {
    values.iter().map(Value::to_string).collect()
}

//! The `sprig/string` module

use super::NativeModule;
use crate::{ErrorKind, Type, Value, runtime_error, unexpected_args};

/// Initializes the `sprig/string` module
pub fn make_module() -> NativeModule {
    use Value::{Bool, Int, List, Str};

    let mut result = NativeModule::new("sprig/string");

    result.add_fn("length", &[Type::String], Type::Int, |ctx| match ctx.args() {
        [Str(s)] => Ok(Int(s.chars().count() as i64)),
        unexpected => unexpected_args("string", unexpected),
    });

    result.add_fn("to_upper", &[Type::String], Type::String, |ctx| {
        match ctx.args() {
            [Str(s)] => Ok(s.to_uppercase().into()),
            unexpected => unexpected_args("string", unexpected),
        }
    });

    result.add_fn("to_lower", &[Type::String], Type::String, |ctx| {
        match ctx.args() {
            [Str(s)] => Ok(s.to_lowercase().into()),
            unexpected => unexpected_args("string", unexpected),
        }
    });

    result.add_fn("trim", &[Type::String], Type::String, |ctx| match ctx.args() {
        [Str(s)] => Ok(s.trim().into()),
        unexpected => unexpected_args("string", unexpected),
    });

    result.add_fn(
        "contains",
        &[Type::String, Type::String],
        Type::Boolean,
        |ctx| match ctx.args() {
            [Str(s), Str(pattern)] => Ok(Bool(s.contains(pattern.as_ref()))),
            unexpected => unexpected_args("string, string", unexpected),
        },
    );

    // Indices count chars rather than bytes, the end index is exclusive
    result.add_fn(
        "substring",
        &[Type::String, Type::Int, Type::Int],
        Type::String,
        |ctx| match ctx.args() {
            [Str(s), Int(start), Int(end)] => {
                let len = s.chars().count();
                let in_bounds = |i: i64| usize::try_from(i).ok().filter(|&i| i <= len);
                match (in_bounds(*start), in_bounds(*end)) {
                    (Some(start), Some(end)) if start <= end => {
                        Ok(s.chars().skip(start).take(end - start).collect::<String>().into())
                    }
                    (Some(_), Some(_)) => {
                        runtime_error!("the start index {start} is greater than the end index {end}")
                    }
                    (None, _) => runtime_error!(ErrorKind::IndexOutOfBounds { index: *start, len }),
                    (_, None) => runtime_error!(ErrorKind::IndexOutOfBounds { index: *end, len }),
                }
            }
            unexpected => unexpected_args("string, int, int", unexpected),
        },
    );

    result.add_fn(
        "join",
        &[Type::String, Type::array(Type::Any)],
        Type::String,
        |ctx| match ctx.args() {
            [Str(separator), List(values)] => {
                let parts: Vec<_> = values.iter().map(Value::to_string).collect();
                Ok(parts.join(separator).into())
            }
            unexpected => unexpected_args("string, any[]", unexpected),
        },
    );

    result.add_fn("from", &[Type::Any], Type::String, |ctx| match ctx.args() {
        [value] => Ok(value.to_string().into()),
        unexpected => unexpected_args("any", unexpected),
    });

    result
}

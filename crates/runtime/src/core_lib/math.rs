//! The `sprig/math` module

use super::{NativeModule, number};
use crate::{ErrorKind, Result, Type, Value, runtime_error, unexpected_args};

/// Initializes the `sprig/math` module
pub fn make_module() -> NativeModule {
    use Value::{Float, Int};

    let mut result = NativeModule::new("sprig/math");

    result.add_fn("abs", &[number()], Type::Any, |ctx| match ctx.args() {
        [Int(n)] => n.checked_abs().map(Int).ok_or_else(|| ErrorKind::Overflow.into()),
        [Float(n)] => Ok(Float(n.abs())),
        unexpected => unexpected_args("int|float", unexpected),
    });

    result.add_variadic_fn("max", &[number()], number(), Type::Any, |ctx| {
        fold_numbers(ctx.args(), |a, b| if b > a { b } else { a })
    });

    result.add_variadic_fn("min", &[number()], number(), Type::Any, |ctx| {
        fold_numbers(ctx.args(), |a, b| if b < a { b } else { a })
    });

    result.add_fn("sqrt", &[number()], Type::Float, |ctx| match ctx.args() {
        [Int(n)] => Ok(Float((*n as f64).sqrt())),
        [Float(n)] => Ok(Float(n.sqrt())),
        unexpected => unexpected_args("int|float", unexpected),
    });

    result.add_fn("pow", &[number(), number()], Type::Any, |ctx| {
        match ctx.args() {
            [Int(base), Int(exponent)] => {
                let Ok(exponent) = u32::try_from(*exponent) else {
                    return runtime_error!("negative exponents require a float base");
                };
                base.checked_pow(exponent)
                    .map(Int)
                    .ok_or_else(|| ErrorKind::Overflow.into())
            }
            [Float(base), Int(exponent)] => Ok(Float(base.powf(*exponent as f64))),
            [Int(base), Float(exponent)] => Ok(Float((*base as f64).powf(*exponent))),
            [Float(base), Float(exponent)] => Ok(Float(base.powf(*exponent))),
            unexpected => unexpected_args("int|float, int|float", unexpected),
        }
    });

    result.add_fn("floor", &[Type::Float], Type::Int, |ctx| match ctx.args() {
        [Float(n)] => float_to_int(n.floor()),
        unexpected => unexpected_args("float", unexpected),
    });

    result.add_fn("ceil", &[Type::Float], Type::Int, |ctx| match ctx.args() {
        [Float(n)] => float_to_int(n.ceil()),
        unexpected => unexpected_args("float", unexpected),
    });

    result
}

// Values of mixed types are compared as floats, the winning value keeps its type
fn fold_numbers(args: &[Value], pick: fn(f64, f64) -> f64) -> Result<Value> {
    let mut result: Option<(f64, &Value)> = None;

    for arg in args {
        let n = match arg {
            Value::Int(n) => *n as f64,
            Value::Float(n) => *n,
            _ => return unexpected_args("int|float...", args),
        };
        result = match result {
            Some((current, value)) if pick(current, n) == current => Some((current, value)),
            _ => Some((n, arg)),
        };
    }

    match result {
        Some((_, value)) => Ok(value.clone()),
        None => unexpected_args("int|float...", args),
    }
}

fn float_to_int(n: f64) -> Result<Value> {
    if n.is_finite() && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Ok(Value::Int(n as i64))
    } else {
        runtime_error!(ErrorKind::Overflow)
    }
}

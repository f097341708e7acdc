//! The `sprig/lists` module
//!
//! Lists have value semantics, so functions that modify a list return the modified copy.

use super::{NativeModule, any_list, number};
use crate::{ErrorKind, Result, Type, Value, runtime_error, unexpected_args};
use std::cmp::Ordering;

/// Initializes the `sprig/lists` module
pub fn make_module() -> NativeModule {
    use Value::{Int, List};

    let mut result = NativeModule::new("sprig/lists");

    result.add_fn("length", &[any_list()], Type::Int, |ctx| match ctx.args() {
        [List(values)] => Ok(Int(values.len() as i64)),
        unexpected => unexpected_args("any[]", unexpected),
    });

    result.add_fn("push", &[any_list(), Type::Any], any_list(), |ctx| {
        match ctx.args() {
            [List(values), value] => {
                let mut values = values.as_ref().clone();
                values.push(value.clone());
                Ok(Value::list(values))
            }
            unexpected => unexpected_args("any[], any", unexpected),
        }
    });

    result.add_fn("reverse", &[any_list()], any_list(), |ctx| {
        match ctx.args() {
            [List(values)] => Ok(Value::list(values.iter().rev().cloned().collect())),
            unexpected => unexpected_args("any[]", unexpected),
        }
    });

    result.add_fn("sort", &[any_list()], any_list(), |ctx| match ctx.args() {
        [List(values)] => {
            let mut sorted = values.as_ref().clone();
            let mut error = None;
            sorted.sort_by(|a, b| match compare_values(a, b) {
                Ok(ordering) => ordering,
                Err(e) => {
                    error.get_or_insert(e);
                    Ordering::Equal
                }
            });
            match error {
                Some(error) => Err(error),
                None => Ok(Value::list(sorted)),
            }
        }
        unexpected => unexpected_args("any[]", unexpected),
    });

    result.add_fn("sum", &[Type::array(number())], Type::Any, |ctx| {
        match ctx.args() {
            [List(values)] => values.iter().try_fold(Int(0), |total, value| match (total, value) {
                (Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or(ErrorKind::Overflow.into()),
                (Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
                (Value::Float(a), Int(b)) => Ok(Value::Float(a + *b as f64)),
                (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
                (_, unexpected) => unexpected_args("int|float", std::slice::from_ref(unexpected)),
            }),
            unexpected => unexpected_args("(int|float)[]", unexpected),
        }
    });

    result.add_fn("range", &[Type::Int, Type::Int], Type::array(Type::Int), |ctx| {
        match ctx.args() {
            [Int(start), Int(end)] => Ok(Value::list((*start..*end).map(Int).collect())),
            unexpected => unexpected_args("int, int", unexpected),
        }
    });

    result
}

/// Compares two values of the same orderable type
pub(crate) fn compare_values(a: &Value, b: &Value) -> Result<Ordering> {
    use Value::*;

    match (a, b) {
        (Int(a), Int(b)) => Ok(a.cmp(b)),
        (Float(a), Float(b)) => Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
        (Str(a), Str(b)) => Ok(a.cmp(b)),
        (Bool(a), Bool(b)) => Ok(a.cmp(b)),
        _ => runtime_error!(
            "unable to compare '{}' with '{}'",
            a.type_name(),
            b.type_name()
        ),
    }
}

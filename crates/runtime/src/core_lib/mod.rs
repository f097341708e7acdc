//! The native modules that Sprig programs can import
//!
//! Each module is registered under a `sprig/<name>` path, e.g. `import sprig/io;`.

pub mod interop;
pub mod io;
pub mod lists;
pub mod math;
pub mod string;

use crate::{Result, SprigWrite, Type, Value, unexpected_args};
use indexmap::IndexMap;
use std::{fmt, rc::Rc};

/// The signature of a native function's implementation
pub type NativeFn = fn(&mut CallContext) -> Result<Value>;

/// The context that's provided to native functions when they're called
pub struct CallContext<'a> {
    /// The sink that program output is written to
    pub stdout: &'a dyn SprigWrite,
    args: &'a [Value],
}

impl<'a> CallContext<'a> {
    /// Makes a new call context
    pub fn new(stdout: &'a dyn SprigWrite, args: &'a [Value]) -> Self {
        Self { stdout, args }
    }

    /// The arguments that the function was called with
    pub fn args(&self) -> &'a [Value] {
        self.args
    }
}

/// A function provided by a native module
#[derive(Clone)]
pub struct NativeFunction {
    /// The types of the required parameters
    pub params: Vec<Type>,
    /// The type of any further arguments, when the function is variadic
    pub rest: Option<Type>,
    /// The type of the function's result
    pub returns: Type,
    function: NativeFn,
}

impl NativeFunction {
    /// Returns true if the function can be called with the given number of arguments
    pub fn accepts_arg_count(&self, count: usize) -> bool {
        count == self.params.len() || (self.rest.is_some() && count > self.params.len())
    }

    /// The expected type of the argument at the given position
    pub fn param_type(&self, index: usize) -> Option<&Type> {
        self.params.get(index).or(self.rest.as_ref())
    }

    /// Describes the expected arguments, e.g. `|int, int|`
    pub fn describe_params(&self) -> String {
        let mut params: Vec<_> = self.params.iter().map(Type::to_string).collect();
        if let Some(rest) = &self.rest {
            params.push(format!("{rest}..."));
        }
        params.join(", ")
    }

    /// Calls the function after checking its arguments
    pub fn call(&self, ctx: &mut CallContext) -> Result<Value> {
        let args = ctx.args();
        let valid = self.accepts_arg_count(args.len())
            && args.iter().enumerate().all(|(i, arg)| {
                self.param_type(i)
                    .is_some_and(|expected| expected.matches(arg))
            });

        if valid {
            (self.function)(ctx)
        } else {
            unexpected_args(&self.describe_params(), args)
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}| -> {}", self.describe_params(), self.returns)
    }
}

/// A module of native functions
#[derive(Debug)]
pub struct NativeModule {
    path: &'static str,
    functions: IndexMap<&'static str, NativeFunction>,
}

impl NativeModule {
    /// Makes an empty module with the given path
    pub fn new(path: &'static str) -> Self {
        Self {
            path,
            functions: IndexMap::new(),
        }
    }

    /// The module's path, e.g. `sprig/io`
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Adds a function with a fixed number of arguments
    pub fn add_fn(&mut self, name: &'static str, params: &[Type], returns: Type, function: NativeFn) {
        self.functions.insert(
            name,
            NativeFunction {
                params: params.to_vec(),
                rest: None,
                returns,
                function,
            },
        );
    }

    /// Adds a function that accepts any number of further arguments of the `rest` type
    pub fn add_variadic_fn(
        &mut self,
        name: &'static str,
        params: &[Type],
        rest: Type,
        returns: Type,
        function: NativeFn,
    ) {
        self.functions.insert(
            name,
            NativeFunction {
                params: params.to_vec(),
                rest: Some(rest),
                returns,
                function,
            },
        );
    }

    /// Returns the function with the given name
    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    /// The names of the module's functions, in the order they were added
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

/// The native modules that are available to Sprig programs
#[derive(Clone)]
pub struct CoreLib {
    modules: IndexMap<&'static str, Rc<NativeModule>>,
}

impl CoreLib {
    /// Returns the module with the given path
    pub fn get(&self, path: &str) -> Option<Rc<NativeModule>> {
        self.modules.get(path).cloned()
    }

    /// The paths of the available modules
    pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }
}

impl Default for CoreLib {
    fn default() -> Self {
        let modules = [
            interop::make_module(),
            io::make_module(),
            lists::make_module(),
            math::make_module(),
            string::make_module(),
        ]
        .into_iter()
        .map(|module| (module.path(), Rc::new(module)))
        .collect();

        Self { modules }
    }
}

/// Used by the lists and math modules for numeric arguments
pub(crate) fn number() -> Type {
    Type::Union(vec![Type::Int, Type::Float])
}

/// Used for functions that accept lists with any element type
pub(crate) fn any_list() -> Type {
    Type::array(Type::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultStdout;

    #[test]
    fn arguments_are_checked_before_calling() {
        let core_lib = CoreLib::default();
        let string = core_lib.get("sprig/string").unwrap();
        let length = string.get("length").unwrap();

        let stdout = DefaultStdout;
        let args = [Value::from("abc")];
        assert_eq!(length.call(&mut CallContext::new(&stdout, &args)), Ok(Value::Int(3)));

        let args = [Value::Int(1)];
        let error = length.call(&mut CallContext::new(&stdout, &args)).unwrap_err();
        assert_eq!(error.to_string(), "expected |string|, but found 'int'");
    }

    #[test]
    fn variadic_arg_counts() {
        let core_lib = CoreLib::default();
        let math = core_lib.get("sprig/math").unwrap();
        let max = math.get("max").unwrap();
        assert!(!max.accepts_arg_count(0));
        assert!(max.accepts_arg_count(1));
        assert!(max.accepts_arg_count(5));
    }
}

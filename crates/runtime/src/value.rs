use std::{fmt, rc::Rc};

/// The core Value type for Sprig
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The default type representing the absence of a value
    #[default]
    Nil,
    /// A boolean, can be either true or false
    Bool(bool),
    /// A 64-bit signed integer
    Int(i64),
    /// A 64-bit float
    Float(f64),
    /// A string
    Str(Rc<str>),
    /// A list of values
    ///
    /// Lists have value semantics, they're copied on write when shared.
    List(Rc<Vec<Value>>),
}

impl Value {
    /// Returns the name of the value's type, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }

    /// Returns true if the value is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Makes a list value
    pub fn list(values: Vec<Value>) -> Self {
        Self::List(Rc::new(values))
    }

    /// Renders the value the way it would be written in source
    ///
    /// Unlike the `Display` implementation, strings are quoted.
    pub fn render(&self) -> String {
        match self {
            Self::Str(s) => format!("{s:?}"),
            _ => self.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;

        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e16 {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Str(s) => f.write_str(s),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&value.render())?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::list(values)
    }
}

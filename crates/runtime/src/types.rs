use crate::Value;
use rustc_hash::FxHashMap;
use sprig_parser::{QualifiedName, QuotedIdentifier, Span, TypeDescriptor};
use std::fmt;
use thiserror::Error;

/// A resolved type, with all named references replaced by the types they alias
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Type {
    Int,
    Float,
    String,
    Boolean,
    Nil,
    Any,
    Array(Box<Type>),
    Optional(Box<Type>),
    Union(Vec<Type>),
}

impl Type {
    /// Makes an array type with the given element type
    pub fn array(element: Type) -> Self {
        Self::Array(Box::new(element))
    }

    /// Returns true if the value conforms to the type
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _)
            | (Self::Nil, Value::Nil)
            | (Self::Boolean, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::String, Value::Str(_)) => true,
            (Self::Optional(inner), value) => value.is_nil() || inner.matches(value),
            (Self::Union(members), value) => members.iter().any(|member| member.matches(value)),
            (Self::Array(element), Value::List(values)) => {
                values.iter().all(|value| element.matches(value))
            }
            _ => false,
        }
    }

    /// Returns true if a value of the `source` type can be stored in a location of this type
    ///
    /// `any` is accepted everywhere, it's checked when the program runs.
    pub fn accepts(&self, source: &Type) -> bool {
        use Type::*;

        match (self, source) {
            (Any, _) | (_, Any) => true,
            (_, Union(members)) => members.iter().all(|member| self.accepts(member)),
            (Optional(_), Nil) => true,
            (Optional(inner), Optional(source)) => inner.accepts(source),
            (Optional(inner), source) => inner.accepts(source),
            (_, Optional(source)) => self.accepts(&Nil) && self.accepts(source),
            (Union(members), source) => members.iter().any(|member| member.accepts(source)),
            (Array(element), Array(source)) => element.accepts(source),
            (target, source) => target == source,
        }
    }

    /// The type produced by indexing or iterating over a value of this type
    pub fn element_type(&self) -> Option<Type> {
        match self {
            Self::Any => Some(Self::Any),
            Self::Array(element) => Some(element.as_ref().clone()),
            Self::String => Some(Self::String),
            _ => None,
        }
    }

    /// Returns true if the type is `int` or `float`
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::Boolean => f.write_str("boolean"),
            Self::Nil => f.write_str("nil"),
            Self::Any => f.write_str("any"),
            Self::Array(element) => match element.as_ref() {
                Self::Union(_) | Self::Optional(_) => write!(f, "({element})[]"),
                _ => write!(f, "{element}[]"),
            },
            Self::Optional(inner) => match inner.as_ref() {
                Self::Union(_) => write!(f, "({inner})?"),
                _ => write!(f, "{inner}?"),
            },
            Self::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

/// An error that occurred while resolving a type descriptor
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TypeError {
    #[error("unknown type '{0}'")]
    Unknown(QualifiedName),
    #[error("module prefix '{}' doesn't provide types", .0.prefix.as_ref().map_or("", |p| p.as_str()))]
    Qualified(QualifiedName),
    #[error("the definition of type '{0}' refers to itself")]
    Recursive(QualifiedName),
}

impl TypeError {
    /// The span of the type reference that couldn't be resolved
    pub fn span(&self) -> Span {
        match self {
            Self::Unknown(name) | Self::Qualified(name) | Self::Recursive(name) => name.span,
        }
    }
}

/// The type definitions available to a program
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    definitions: FxHashMap<QuotedIdentifier, TypeDescriptor>,
}

impl TypeTable {
    /// Adds a type definition, replacing any existing definition with the same name
    pub fn define(&mut self, name: QuotedIdentifier, descriptor: TypeDescriptor) {
        self.definitions.insert(name, descriptor);
    }

    /// Returns true if a type with the given name is defined
    pub fn contains(&self, name: &QuotedIdentifier) -> bool {
        self.definitions.contains_key(name)
    }

    /// Resolves a descriptor, following named references through the table
    pub fn resolve(&self, descriptor: &TypeDescriptor) -> Result<Type, TypeError> {
        self.resolve_inner(descriptor, &mut Vec::new())
    }

    fn resolve_inner<'a>(
        &'a self,
        descriptor: &'a TypeDescriptor,
        visiting: &mut Vec<&'a QuotedIdentifier>,
    ) -> Result<Type, TypeError> {
        let result = match descriptor {
            TypeDescriptor::Int => Type::Int,
            TypeDescriptor::Float => Type::Float,
            TypeDescriptor::String => Type::String,
            TypeDescriptor::Boolean => Type::Boolean,
            TypeDescriptor::Nil => Type::Nil,
            TypeDescriptor::Any => Type::Any,
            TypeDescriptor::Named(name) => {
                if name.prefix.is_some() {
                    return Err(TypeError::Qualified(name.clone()));
                }
                let Some(aliased) = self.definitions.get(&name.name) else {
                    return Err(TypeError::Unknown(name.clone()));
                };
                if visiting.contains(&&name.name) {
                    return Err(TypeError::Recursive(name.clone()));
                }
                visiting.push(&name.name);
                let resolved = self.resolve_inner(aliased, visiting)?;
                visiting.pop();
                resolved
            }
            TypeDescriptor::Array(element) => Type::array(self.resolve_inner(element, visiting)?),
            TypeDescriptor::Optional(inner) => {
                Type::Optional(Box::new(self.resolve_inner(inner, visiting)?))
            }
            TypeDescriptor::Union(members) => Type::Union(
                members
                    .iter()
                    .map(|member| self.resolve_inner(member, visiting))
                    .collect::<Result<_, _>>()?,
            ),
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn named(name: &str) -> TypeDescriptor {
        TypeDescriptor::Named(QualifiedName {
            prefix: None,
            name: name.into(),
            span: Span::default(),
        })
    }

    #[test]
    fn resolve_aliases() {
        let mut table = TypeTable::default();
        table.define("Id".into(), TypeDescriptor::Int);
        table.define("Ids".into(), TypeDescriptor::Array(Box::new(named("Id"))));

        assert_eq!(table.resolve(&named("Ids")), Ok(Type::array(Type::Int)));
        assert!(matches!(
            table.resolve(&named("Missing")),
            Err(TypeError::Unknown(_))
        ));
    }

    #[test]
    fn recursive_alias() {
        let mut table = TypeTable::default();
        table.define("A".into(), named("B"));
        table.define("B".into(), TypeDescriptor::Optional(Box::new(named("A"))));

        assert!(matches!(
            table.resolve(&named("A")),
            Err(TypeError::Recursive(_))
        ));
    }

    #[test_case(Type::Int, Type::Int, true; "same type")]
    #[test_case(Type::Float, Type::Int, false; "no implicit conversion")]
    #[test_case(Type::Optional(Box::new(Type::Int)), Type::Nil, true; "nil into optional")]
    #[test_case(Type::Int, Type::Optional(Box::new(Type::Int)), false; "optional into plain")]
    #[test_case(
        Type::Union(vec![Type::Int, Type::String]),
        Type::String,
        true;
        "member of union"
    )]
    #[test_case(
        Type::Int,
        Type::Union(vec![Type::Int, Type::String]),
        false;
        "union into member"
    )]
    #[test_case(Type::array(Type::Int), Type::array(Type::Any), true; "any elements")]
    #[test_case(Type::String, Type::Any, true; "any is checked at runtime")]
    fn accepts(target: Type, source: Type, expected: bool) {
        assert_eq!(target.accepts(&source), expected);
    }

    #[test]
    fn matches_values() {
        let ints = Type::array(Type::Int);
        assert!(ints.matches(&Value::list(vec![Value::Int(1), Value::Int(2)])));
        assert!(!ints.matches(&Value::list(vec![Value::Int(1), "x".into()])));
        assert!(Type::Optional(Box::new(Type::String)).matches(&Value::Nil));
        assert!(!Type::Float.matches(&Value::Int(1)));
    }
}

use crate::{QuotedIdentifier, Span};
use smallvec::SmallVec;
use std::fmt;

/// The Vec type used for small lists in the syntax tree, e.g. call arguments
pub type AstVec<T> = SmallVec<[T; 4]>;

/// A convenience macro for initializing an [`AstVec`]
pub use smallvec::smallvec as astvec;

/// The identifier type used throughout the syntax tree
pub type Id = QuotedIdentifier;

/// The output of the parser: a sequence of top-level items in source order
#[derive(Clone, Debug, Default)]
pub struct SyntaxUnit {
    /// The parsed items
    pub items: Vec<TopLevel>,
}

impl SyntaxUnit {
    /// Returns true if there are no items in the unit
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A top-level item along with its span and the source text it was parsed from
#[derive(Clone, Debug)]
pub struct TopLevel {
    /// The item
    pub kind: TopLevelKind,
    /// The item's span in the parsed source
    pub span: Span,
    /// The item's source text, from its first token up to and including its last token
    pub text: String,
}

/// The kinds of item that can appear at the top level
#[derive(Clone, Debug, derive_name::VariantName)]
#[allow(missing_docs)]
pub enum TopLevelKind {
    Import(ImportDeclaration),
    Type(TypeDefinition),
    Function(FunctionDefinition),
    Variable(VariableDeclaration),
    Statement(Statement),
    /// An expression that isn't terminated with a `;`, its value is the item's result
    Expression(Expr),
}

/// `import org/name.sub as prefix;`
#[derive(Clone, Debug)]
pub struct ImportDeclaration {
    /// The imported module's path
    pub module: ModulePath,
    /// The prefix given with `as`
    pub prefix: Option<Id>,
    /// The declaration's span
    pub span: Span,
}

impl ImportDeclaration {
    /// The prefix that the import binds, either explicit or the module's default prefix
    pub fn effective_prefix(&self) -> Id {
        self.prefix
            .clone()
            .unwrap_or_else(|| self.module.default_prefix())
    }
}

/// A module path, e.g. `sprig/lang.value`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModulePath {
    /// The organization
    pub org: Id,
    /// The module's dotted name components, there's always at least one
    pub names: AstVec<Id>,
}

impl ModulePath {
    /// The prefix that's used when an import doesn't provide one: the last name component
    pub fn default_prefix(&self) -> Id {
        self.names.last().cloned().unwrap_or_else(|| self.org.clone())
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.org)?;
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

/// `type Name <descriptor>;`
#[derive(Clone, Debug)]
pub struct TypeDefinition {
    /// The type's name
    pub name: Id,
    /// The aliased type
    pub descriptor: TypeDescriptor,
    /// The span of the name
    pub name_span: Span,
}

/// `function name(T a, ...) returns T { ... }`
#[derive(Clone, Debug)]
pub struct FunctionDefinition {
    /// The function's name
    pub name: Id,
    /// The function's parameters
    pub params: AstVec<Parameter>,
    /// The return type, `None` when no `returns` clause is given
    pub returns: Option<TypeDescriptor>,
    /// The function's body
    pub body: Block,
    /// The span of the name
    pub name_span: Span,
}

/// A function parameter
#[derive(Clone, Debug)]
pub struct Parameter {
    /// The parameter's type
    pub ty: TypeDescriptor,
    /// The parameter's name
    pub name: Id,
    /// The span of the parameter
    pub span: Span,
}

/// A variable declaration, `[final] T x = e;` or `var x = e;`
///
/// Used both at the top level (module variables) and in blocks (locals).
#[derive(Clone, Debug)]
pub struct VariableDeclaration {
    /// True when declared with `final`
    pub is_final: bool,
    /// The declared type, `None` for `var`
    pub ty: Option<TypeDescriptor>,
    /// The variable's name
    pub name: Id,
    /// The initializer
    pub value: Expr,
    /// The span of the name
    pub name_span: Span,
}

/// A sequence of statements in braces
#[derive(Clone, Debug, Default)]
pub struct Block {
    /// The block's statements
    pub statements: Vec<Statement>,
    /// The span from the opening brace to the closing brace
    pub span: Span,
}

/// A statement with its span
#[derive(Clone, Debug)]
pub struct Statement {
    /// The statement
    pub kind: StatementKind,
    /// The statement's span
    pub span: Span,
}

/// The kinds of statement
#[derive(Clone, Debug, derive_name::VariantName)]
#[allow(missing_docs)]
pub enum StatementKind {
    Variable(VariableDeclaration),
    Assign {
        target: AssignTarget,
        op: AssignOp,
        value: Expr,
    },
    If {
        condition: Expr,
        then_block: Block,
        /// `else if` chains are represented as an else block containing a single `if`
        else_block: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Foreach {
        /// The loop variable's type, `None` for `var`
        ty: Option<TypeDescriptor>,
        name: Id,
        iterable: Expr,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Block(Block),
    Expression(Expr),
}

/// The target of an assignment
#[derive(Clone, Debug)]
pub enum AssignTarget {
    /// `x = ...`
    Name(Id),
    /// `x[i][j] = ...`
    Index {
        /// The indexed variable
        name: Id,
        /// The index expressions, outermost first
        indices: Vec<Expr>,
    },
}

impl AssignTarget {
    /// The name of the variable that gets assigned
    pub fn name(&self) -> &Id {
        match self {
            Self::Name(name) | Self::Index { name, .. } => name,
        }
    }
}

/// Assignment operators
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

impl AssignOp {
    /// The binary operation performed by a compound assignment
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            Self::Assign => None,
            Self::Add => Some(BinaryOp::Add),
            Self::Subtract => Some(BinaryOp::Subtract),
            Self::Multiply => Some(BinaryOp::Multiply),
            Self::Divide => Some(BinaryOp::Divide),
            Self::Remainder => Some(BinaryOp::Remainder),
        }
    }
}

/// An expression with its span
#[derive(Clone, Debug)]
pub struct Expr {
    /// The expression
    pub kind: ExprKind,
    /// The expression's span
    pub span: Span,
}

/// The kinds of expression
#[derive(Clone, Debug, derive_name::VariantName)]
#[allow(missing_docs)]
pub enum ExprKind {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    /// A reference to a variable, optionally qualified with a module prefix
    Name(QualifiedName),
    Call {
        function: QualifiedName,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `start ..< end`
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
}

/// A name that may be qualified with a module prefix, e.g. `io:println`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    /// The module prefix
    pub prefix: Option<Id>,
    /// The name
    pub name: Id,
    /// The span of the whole reference
    pub span: Span,
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Unary operators
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// Binary operators
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOp {
    /// The operator's precedence, higher binds tighter
    pub fn precedence(self) -> u8 {
        use BinaryOp::*;
        match self {
            Or => 1,
            And => 2,
            Equal | NotEqual => 3,
            Less | LessOrEqual | Greater | GreaterOrEqual => 4,
            Add | Subtract => 6,
            Multiply | Divide | Remainder => 7,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOp::*;
        f.write_str(match self {
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Remainder => "%",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            And => "&&",
            Or => "||",
        })
    }
}

/// A type descriptor, e.g. `int`, `string[]`, `Point?`, `int|string`
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TypeDescriptor {
    Int,
    Float,
    String,
    Boolean,
    Nil,
    Any,
    /// A reference to a type definition, optionally from a module
    Named(QualifiedName),
    /// `T[]`
    Array(Box<TypeDescriptor>),
    /// `T?`, equivalent to `T|nil`
    Optional(Box<TypeDescriptor>),
    /// `A|B|...`
    Union(Vec<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Returns the built-in type with the given name
    pub fn builtin(name: &str) -> Option<Self> {
        let result = match name {
            "int" => Self::Int,
            "float" => Self::Float,
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "any" => Self::Any,
            _ => return None,
        };
        Some(result)
    }

    /// Visits each named type reference in the descriptor
    pub fn visit_named(&self, visitor: &mut impl FnMut(&QualifiedName)) {
        match self {
            Self::Named(name) => visitor(name),
            Self::Array(inner) | Self::Optional(inner) => inner.visit_named(visitor),
            Self::Union(members) => {
                for member in members {
                    member.visit_named(visitor);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::Boolean => f.write_str("boolean"),
            Self::Nil => f.write_str("nil"),
            Self::Any => f.write_str("any"),
            Self::Named(name) => write!(f, "{name}"),
            Self::Array(inner) => match inner.as_ref() {
                Self::Union(_) | Self::Optional(_) => write!(f, "({inner})[]"),
                _ => write!(f, "{inner}[]"),
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

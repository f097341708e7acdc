use crate::{ImportRecord, ModuleReference};
use rustc_hash::FxHashSet;
use sprig_parser::{
    AssignTarget, Block, Expr, ExprKind, FunctionDefinition, QualifiedName, QuotedIdentifier, Span,
    Statement, StatementKind, TopLevel, TopLevelKind, TypeDescriptor, VariableDeclaration,
};
use std::collections::BTreeSet;

/// The kind of a snippet, decided by the shape of its syntax tree
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SnippetKind {
    /// `import org/module as prefix;`
    ImportDeclaration,
    /// A type or function definition
    ModuleLevelDeclaration,
    /// A top-level variable declaration
    ModuleVariableDeclaration,
    /// A statement that's executed for its effects
    Statement,
    /// An expression that's evaluated for its value
    Expression,
}

impl SnippetKind {
    /// Returns true if the snippet introduces a name or an import binding
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            Self::ImportDeclaration | Self::ModuleLevelDeclaration | Self::ModuleVariableDeclaration
        )
    }

    /// Returns true if the snippet needs an entry point to be executed
    pub fn is_executable(self) -> bool {
        matches!(self, Self::Statement | Self::Expression)
    }
}

/// A parsed snippet along with the names it defines and depends on
#[derive(Clone, Debug)]
pub struct ClassifiedSnippet {
    /// The snippet's kind
    pub kind: SnippetKind,
    /// The parsed snippet
    pub node: TopLevel,
    /// The names defined by the snippet
    pub defined_names: BTreeSet<QuotedIdentifier>,
    /// Unqualified names referred to by the snippet that aren't bound within it
    pub free_names: BTreeSet<QuotedIdentifier>,
    /// Module prefixes used in qualified references, e.g. `io` in `io:println`
    pub used_prefixes: BTreeSet<QuotedIdentifier>,
}

impl ClassifiedSnippet {
    /// The snippet's source text
    pub fn source(&self) -> &str {
        &self.node.text
    }

    /// The snippet's source text with a trailing `;` added where one is needed
    ///
    /// The final item of an input may leave out its `;`, but once it's committed the source is
    /// re-emitted in front of other code.
    pub fn terminated_source(&self) -> String {
        let text = self.source();
        if self.kind == SnippetKind::Expression || text.ends_with([';', '}']) {
            text.to_string()
        } else {
            format!("{text};")
        }
    }

    /// The snippet's span in the evaluated input
    pub fn span(&self) -> Span {
        self.node.span
    }

    /// The import binding introduced by an import snippet
    pub fn import_record(&self) -> Option<ImportRecord> {
        match &self.node.kind {
            TopLevelKind::Import(import) => Some(ImportRecord::new(
                import.effective_prefix(),
                ModuleReference::from(&import.module),
            )),
            _ => None,
        }
    }

    /// The single name defined by a declaration snippet
    pub fn declared_name(&self) -> Option<&QuotedIdentifier> {
        match &self.node.kind {
            TopLevelKind::Type(definition) => Some(&definition.name),
            TopLevelKind::Function(definition) => Some(&definition.name),
            TopLevelKind::Variable(declaration) => Some(&declaration.name),
            _ => None,
        }
    }
}

/// Classifies parsed snippets
pub struct SnippetClassifier;

impl SnippetClassifier {
    /// Tags a parsed top-level item with its kind, defined names, free names, and used prefixes
    pub fn classify(node: TopLevel) -> ClassifiedSnippet {
        let mut walker = NameWalker::default();
        let mut defined_names = BTreeSet::new();

        let kind = match &node.kind {
            TopLevelKind::Import(_) => SnippetKind::ImportDeclaration,
            TopLevelKind::Type(definition) => {
                defined_names.insert(definition.name.clone());
                walker.visit_type(&definition.descriptor);
                SnippetKind::ModuleLevelDeclaration
            }
            TopLevelKind::Function(definition) => {
                defined_names.insert(definition.name.clone());
                walker.visit_function(definition);
                SnippetKind::ModuleLevelDeclaration
            }
            TopLevelKind::Variable(declaration) => {
                defined_names.insert(declaration.name.clone());
                walker.visit_variable_declaration(declaration, false);
                SnippetKind::ModuleVariableDeclaration
            }
            TopLevelKind::Statement(statement) => {
                walker.visit_statement(statement);
                SnippetKind::Statement
            }
            TopLevelKind::Expression(expression) => {
                walker.visit_expr(expression);
                SnippetKind::Expression
            }
        };

        // A self-referencing definition (e.g. a recursive function) doesn't depend on earlier
        // definitions with the same name.
        let free_names = walker
            .free_names
            .difference(&defined_names)
            .cloned()
            .collect();

        ClassifiedSnippet {
            kind,
            node,
            defined_names,
            free_names,
            used_prefixes: walker.used_prefixes,
        }
    }
}

// Collects free names and used prefixes while tracking local scopes
#[derive(Default)]
struct NameWalker {
    scopes: Vec<FxHashSet<QuotedIdentifier>>,
    free_names: BTreeSet<QuotedIdentifier>,
    used_prefixes: BTreeSet<QuotedIdentifier>,
}

impl NameWalker {
    fn is_local(&self, name: &QuotedIdentifier) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn declare_local(&mut self, name: &QuotedIdentifier) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.clone());
        }
    }

    fn visit_name(&mut self, name: &QualifiedName) {
        match &name.prefix {
            Some(prefix) => {
                self.used_prefixes.insert(prefix.clone());
            }
            None if !self.is_local(&name.name) => {
                self.free_names.insert(name.name.clone());
            }
            None => {}
        }
    }

    fn visit_type(&mut self, descriptor: &TypeDescriptor) {
        descriptor.visit_named(&mut |name| self.visit_name(name));
    }

    fn visit_function(&mut self, function: &FunctionDefinition) {
        for param in &function.params {
            self.visit_type(&param.ty);
        }
        if let Some(returns) = &function.returns {
            self.visit_type(returns);
        }

        self.scopes
            .push(function.params.iter().map(|param| param.name.clone()).collect());
        self.visit_block_contents(&function.body);
        self.scopes.pop();
    }

    // Module variables aren't locals, `declare` is true for declarations inside blocks
    fn visit_variable_declaration(&mut self, declaration: &VariableDeclaration, declare: bool) {
        if let Some(ty) = &declaration.ty {
            self.visit_type(ty);
        }
        self.visit_expr(&declaration.value);
        if declare {
            self.declare_local(&declaration.name);
        }
    }

    fn visit_block(&mut self, block: &Block) {
        self.scopes.push(FxHashSet::default());
        self.visit_block_contents(block);
        self.scopes.pop();
    }

    fn visit_block_contents(&mut self, block: &Block) {
        for statement in &block.statements {
            self.visit_statement(statement);
        }
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Variable(declaration) => {
                // A variable declared in a top-level statement block is a local, but a
                // top-level variable declaration is classified separately.
                self.visit_variable_declaration(declaration, true)
            }
            StatementKind::Assign { target, value, .. } => {
                if !self.is_local(target.name()) {
                    self.free_names.insert(target.name().clone());
                }
                if let AssignTarget::Index { indices, .. } = target {
                    for index in indices {
                        self.visit_expr(index);
                    }
                }
                self.visit_expr(value);
            }
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.visit_expr(condition);
                self.visit_block(then_block);
                if let Some(else_block) = else_block {
                    self.visit_block(else_block);
                }
            }
            StatementKind::While { condition, body } => {
                self.visit_expr(condition);
                self.visit_block(body);
            }
            StatementKind::Foreach {
                ty,
                name,
                iterable,
                body,
            } => {
                if let Some(ty) = ty {
                    self.visit_type(ty);
                }
                self.visit_expr(iterable);
                self.scopes.push(FxHashSet::from_iter([name.clone()]));
                self.visit_block(body);
                self.scopes.pop();
            }
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            StatementKind::Block(block) => self.visit_block(block),
            StatementKind::Expression(expression) => self.visit_expr(expression),
            StatementKind::Break | StatementKind::Continue => {}
        }
    }

    fn visit_expr(&mut self, expression: &Expr) {
        match &expression.kind {
            ExprKind::Nil
            | ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_) => {}
            ExprKind::List(entries) => {
                for entry in entries {
                    self.visit_expr(entry);
                }
            }
            ExprKind::Name(name) => self.visit_name(name),
            ExprKind::Call { function, args } => {
                self.visit_name(function);
                for arg in args {
                    self.visit_expr(arg);
                }
            }
            ExprKind::Index { target, index } => {
                self.visit_expr(target);
                self.visit_expr(index);
            }
            ExprKind::Unary { operand, .. } => self.visit_expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.visit_expr(lhs);
                self.visit_expr(rhs);
            }
            ExprKind::Range { start, end } => {
                self.visit_expr(start);
                self.visit_expr(end);
            }
        }
    }
}

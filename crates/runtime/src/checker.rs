use crate::{NativeModule, Type, TypeError, TypeTable, compiler::module_path, core_lib::CoreLib};
use rustc_hash::FxHashMap;
use sprig_parser::{
    AssignTarget, BinaryOp, Block, Expr, ExprKind, FunctionDefinition, Id, Parser, QualifiedName,
    Span, Statement, StatementKind, TopLevelKind, TypeDescriptor, UnaryOp, VariableDeclaration,
};
use sprig_shell::{
    CompilationUnit, Declaration, Diagnostic, DiagnosticKind, DiagnosticOrigin, SemanticAnalyzer,
};
use std::{rc::Rc, sync::Arc};

/// Checks assembled units for errors that can be found before running them
///
/// The checker reports undefined names and prefixes, unknown modules and types, invalid calls,
/// assignments to functions and `final` variables, misplaced `break`/`continue`, reserved names,
/// and type mismatches found by inferring the types of expressions.
#[derive(Clone, Default)]
pub struct Checker {
    core_lib: CoreLib,
}

impl Checker {
    /// Makes a checker that resolves imports with the given core library
    pub fn with_core_lib(core_lib: CoreLib) -> Self {
        Self { core_lib }
    }
}

impl SemanticAnalyzer for Checker {
    fn check(&self, unit: &CompilationUnit, _visible: &[Arc<Declaration>]) -> Vec<Diagnostic> {
        let syntax = match Parser::parse(&unit.source) {
            Ok(syntax) => syntax,
            Err(error) => {
                return vec![
                    Diagnostic::error(DiagnosticKind::Parse, error.to_string())
                        .with_span(error.span, DiagnosticOrigin::Unit),
                ];
            }
        };

        let mut context = CheckContext::new(unit.entry_point.as_ref());
        let mut functions = Vec::new();
        let mut variables = Vec::new();

        for item in &syntax.items {
            match &item.kind {
                TopLevelKind::Import(import) => {
                    let prefix = import.effective_prefix();
                    let path = module_path(&import.module);
                    if context.modules.contains_key(&prefix) {
                        context.error(format!("duplicate import prefix '{prefix}'"), import.span);
                    } else if let Some(module) = self.core_lib.get(&path) {
                        context.modules.insert(prefix, module);
                    } else {
                        context.error(format!("unknown module '{path}'"), import.span);
                    }
                }
                TopLevelKind::Type(definition) => {
                    context.check_name(&definition.name, definition.name_span);
                    context
                        .types
                        .define(definition.name.clone(), definition.descriptor.clone());
                }
                TopLevelKind::Function(definition) => functions.push(definition),
                TopLevelKind::Variable(declaration) => variables.push(declaration),
                TopLevelKind::Statement(_) | TopLevelKind::Expression(_) => {}
            }
        }

        for item in &syntax.items {
            if let TopLevelKind::Type(definition) = &item.kind {
                context.resolve_type(&definition.descriptor);
            }
        }

        for definition in &functions {
            context.declare_function(definition);
        }

        for declaration in variables {
            context.check_module_variable(declaration);
        }

        for definition in functions {
            context.check_function(definition);
        }

        context.diagnostics
    }
}

struct Signature {
    params: Vec<Type>,
    returns: Type,
}

#[derive(Clone)]
struct Variable {
    ty: Type,
    is_final: bool,
}

struct CheckContext<'a> {
    entry_point: Option<&'a Id>,
    modules: FxHashMap<Id, Rc<NativeModule>>,
    types: TypeTable,
    functions: FxHashMap<Id, Signature>,
    globals: FxHashMap<Id, Variable>,
    scopes: Vec<FxHashMap<Id, Variable>>,
    loop_depth: usize,
    returns: Type,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> CheckContext<'a> {
    fn new(entry_point: Option<&'a Id>) -> Self {
        Self {
            entry_point,
            modules: FxHashMap::default(),
            types: TypeTable::default(),
            functions: FxHashMap::default(),
            globals: FxHashMap::default(),
            scopes: Vec::new(),
            loop_depth: 0,
            returns: Type::Nil,
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(
            Diagnostic::error(DiagnosticKind::Semantic, message)
                .with_span(span, DiagnosticOrigin::Unit),
        );
    }

    fn mismatch(&mut self, expected: &Type, found: &Type, span: Span) {
        self.error(
            format!("incompatible types: expected '{expected}', found '{found}'"),
            span,
        );
    }

    fn check_name(&mut self, name: &Id, span: Span) {
        if name.as_str().starts_with("__") && self.entry_point != Some(name) {
            self.error(
                format!("'{name}' is reserved, names starting with '__' can't be declared"),
                span,
            );
        }
    }

    // Unknown types are reported and treated as `any`
    //
    // Recursive definitions are left for the compiler to report.
    fn resolve_type(&mut self, descriptor: &TypeDescriptor) -> Type {
        match self.types.resolve(descriptor) {
            Ok(resolved) => resolved,
            Err(TypeError::Recursive(_)) => Type::Any,
            Err(error) => {
                self.error(error.to_string(), error.span());
                Type::Any
            }
        }
    }

    fn declare_function(&mut self, definition: &FunctionDefinition) {
        self.check_name(&definition.name, definition.name_span);
        let params = definition
            .params
            .iter()
            .map(|param| self.resolve_type(&param.ty))
            .collect();
        let returns = match &definition.returns {
            Some(returns) => self.resolve_type(returns),
            None => Type::Nil,
        };
        self.functions
            .insert(definition.name.clone(), Signature { params, returns });
    }

    fn check_module_variable(&mut self, declaration: &VariableDeclaration) {
        let variable = self.check_variable(declaration);
        self.globals.insert(declaration.name.clone(), variable);
    }

    fn check_variable(&mut self, declaration: &VariableDeclaration) -> Variable {
        self.check_name(&declaration.name, declaration.name_span);
        let value = self.infer(&declaration.value);
        let ty = match &declaration.ty {
            Some(descriptor) => {
                let ty = self.resolve_type(descriptor);
                if !ty.accepts(&value) {
                    self.mismatch(&ty, &value, declaration.value.span);
                }
                ty
            }
            None => value,
        };
        Variable {
            ty,
            is_final: declaration.is_final,
        }
    }

    fn check_function(&mut self, definition: &FunctionDefinition) {
        let Some(signature) = self.functions.get(&definition.name) else {
            return;
        };
        self.returns = signature.returns.clone();

        let mut scope = FxHashMap::default();
        for (param, ty) in definition.params.iter().zip(signature.params.clone()) {
            scope.insert(
                param.name.clone(),
                Variable {
                    ty,
                    is_final: false,
                },
            );
        }
        for param in &definition.params {
            self.check_name(&param.name, param.span);
        }

        self.scopes.push(scope);
        self.check_block(&definition.body);
        self.scopes.pop();
    }

    fn lookup(&self, name: &Id) -> Option<&Variable> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
    }

    fn declare_local(&mut self, name: Id, variable: Variable) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, variable);
        }
    }

    fn check_block(&mut self, block: &Block) {
        self.scopes.push(FxHashMap::default());
        for statement in &block.statements {
            self.check_statement(statement);
        }
        self.scopes.pop();
    }

    fn check_loop_body(&mut self, body: &Block) {
        self.loop_depth += 1;
        self.check_block(body);
        self.loop_depth -= 1;
    }

    fn check_condition(&mut self, condition: &Expr) {
        let ty = self.infer(condition);
        if !Type::Boolean.accepts(&ty) {
            self.mismatch(&Type::Boolean, &ty, condition.span);
        }
    }

    fn check_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Variable(declaration) => {
                let variable = self.check_variable(declaration);
                self.declare_local(declaration.name.clone(), variable);
            }
            StatementKind::Assign { target, op, value } => {
                self.check_assignment(target, op.binary_op(), value, statement.span);
            }
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.check_condition(condition);
                self.check_block(then_block);
                if let Some(else_block) = else_block {
                    self.check_block(else_block);
                }
            }
            StatementKind::While { condition, body } => {
                self.check_condition(condition);
                self.check_loop_body(body);
            }
            StatementKind::Foreach {
                ty,
                name,
                iterable,
                body,
            } => {
                self.check_name(name, statement.span);
                let iterable_type = self.infer(iterable);
                let element = match iterable_type.element_type() {
                    Some(element) => element,
                    None => {
                        self.error(
                            format!("a value of type '{iterable_type}' can't be iterated over"),
                            iterable.span,
                        );
                        Type::Any
                    }
                };
                let ty = match ty {
                    Some(descriptor) => {
                        let ty = self.resolve_type(descriptor);
                        if !ty.accepts(&element) {
                            self.mismatch(&ty, &element, iterable.span);
                        }
                        ty
                    }
                    None => element,
                };

                self.scopes.push(FxHashMap::default());
                self.declare_local(
                    name.clone(),
                    Variable {
                        ty,
                        is_final: false,
                    },
                );
                self.check_loop_body(body);
                self.scopes.pop();
            }
            StatementKind::Break | StatementKind::Continue => {
                if self.loop_depth == 0 {
                    let keyword = match statement.kind {
                        StatementKind::Break => "break",
                        _ => "continue",
                    };
                    self.error(
                        format!("'{keyword}' can only be used inside a loop"),
                        statement.span,
                    );
                }
            }
            StatementKind::Return(value) => {
                let (found, span) = match value {
                    Some(value) => (self.infer(value), value.span),
                    None => (Type::Nil, statement.span),
                };
                let expected = self.returns.clone();
                if !expected.accepts(&found) {
                    self.mismatch(&expected, &found, span);
                }
            }
            StatementKind::Block(block) => self.check_block(block),
            StatementKind::Expression(expr) => {
                self.infer(expr);
            }
        }
    }

    fn check_assignment(
        &mut self,
        target: &AssignTarget,
        op: Option<BinaryOp>,
        value: &Expr,
        span: Span,
    ) {
        let value_type = self.infer(value);
        let name = target.name();

        let Some(variable) = self.lookup(name).cloned() else {
            if self.functions.contains_key(name) {
                self.error(format!("cannot assign to the function '{name}'"), span);
            } else {
                self.error(format!("undefined symbol '{name}'"), span);
            }
            return;
        };

        if variable.is_final {
            self.error(
                format!("cannot assign to the final variable '{name}'"),
                span,
            );
        }

        let mut target_type = variable.ty;
        if let AssignTarget::Index { indices, .. } = target {
            for index in indices {
                self.check_index(index);
                target_type = match target_type {
                    Type::Any => Type::Any,
                    Type::Array(element) => *element,
                    other => {
                        self.error(
                            format!("a value of type '{other}' can't be assigned to by index"),
                            span,
                        );
                        return;
                    }
                };
            }
        }

        let result_type = match op {
            Some(op) => self.binary_result(op, &target_type, &value_type, span),
            None => value_type,
        };
        if !target_type.accepts(&result_type) {
            self.mismatch(&target_type, &result_type, value.span);
        }
    }

    fn check_index(&mut self, index: &Expr) {
        let ty = self.infer(index);
        if !Type::Int.accepts(&ty) {
            self.mismatch(&Type::Int, &ty, index.span);
        }
    }

    fn infer(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::Nil => Type::Nil,
            ExprKind::Bool(_) => Type::Boolean,
            ExprKind::Int(_) => Type::Int,
            ExprKind::Float(_) => Type::Float,
            ExprKind::Str(_) => Type::String,
            ExprKind::List(elements) => {
                let mut members: Vec<Type> = Vec::new();
                for element in elements {
                    let ty = self.infer(element);
                    if !members.contains(&ty) {
                        members.push(ty);
                    }
                }
                let element = match members.len() {
                    0 => Type::Any,
                    1 => members.remove(0),
                    _ => Type::Union(members),
                };
                Type::array(element)
            }
            ExprKind::Name(name) => self.infer_name(name),
            ExprKind::Call { function, args } => {
                let arg_types: Vec<_> = args.iter().map(|arg| self.infer(arg)).collect();
                self.infer_call(function, args, &arg_types, expr.span)
            }
            ExprKind::Index { target, index } => {
                let target_type = self.infer(target);
                self.check_index(index);
                match target_type.element_type() {
                    Some(element) => element,
                    None => {
                        self.error(
                            format!("a value of type '{target_type}' can't be indexed"),
                            target.span,
                        );
                        Type::Any
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.infer(operand);
                match op {
                    UnaryOp::Negate if ty.is_numeric() || ty == Type::Any => ty,
                    UnaryOp::Not if Type::Boolean.accepts(&ty) => Type::Boolean,
                    UnaryOp::Negate => {
                        self.error(format!("operator '-' is not defined for '{ty}'"), expr.span);
                        Type::Any
                    }
                    UnaryOp::Not => {
                        self.mismatch(&Type::Boolean, &ty, operand.span);
                        Type::Boolean
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.infer(lhs);
                let rhs = self.infer(rhs);
                self.binary_result(*op, &lhs, &rhs, expr.span)
            }
            ExprKind::Range { start, end } => {
                for bound in [start, end] {
                    let ty = self.infer(bound);
                    if !Type::Int.accepts(&ty) {
                        self.mismatch(&Type::Int, &ty, bound.span);
                    }
                }
                Type::array(Type::Int)
            }
        }
    }

    fn infer_name(&mut self, name: &QualifiedName) -> Type {
        if let Some(prefix) = &name.prefix {
            if self.modules.contains_key(prefix) {
                self.error(format!("'{name}' can't be used as a value"), name.span);
            } else {
                self.error(format!("undefined module prefix '{prefix}'"), name.span);
            }
            return Type::Any;
        }

        if let Some(variable) = self.lookup(&name.name) {
            return variable.ty.clone();
        }

        if self.functions.contains_key(&name.name) {
            self.error(
                format!("the function '{name}' can't be used as a value"),
                name.span,
            );
        } else {
            self.error(format!("undefined symbol '{name}'"), name.span);
        }
        Type::Any
    }

    fn infer_call(
        &mut self,
        function: &QualifiedName,
        args: &[Expr],
        arg_types: &[Type],
        span: Span,
    ) -> Type {
        let (params, rest, returns) = match &function.prefix {
            Some(prefix) => {
                let Some(module) = self.modules.get(prefix).cloned() else {
                    self.error(format!("undefined module prefix '{prefix}'"), function.span);
                    return Type::Any;
                };
                let Some(native) = module.get(function.name.as_str()) else {
                    self.error(
                        format!(
                            "'{}' is not defined in module '{}'",
                            function.name,
                            module.path()
                        ),
                        function.span,
                    );
                    return Type::Any;
                };
                (native.params.clone(), native.rest.clone(), native.returns.clone())
            }
            None => match self.functions.get(&function.name) {
                Some(signature) => (signature.params.clone(), None, signature.returns.clone()),
                None => {
                    if self.lookup(&function.name).is_some() {
                        self.error(format!("'{function}' is not a function"), function.span);
                    } else {
                        self.error(format!("undefined function '{function}'"), function.span);
                    }
                    return Type::Any;
                }
            },
        };

        let arity_matches = match rest {
            Some(_) => args.len() >= params.len(),
            None => args.len() == params.len(),
        };
        if !arity_matches {
            let expected = match rest {
                Some(_) => format!("at least {}", params.len()),
                None => params.len().to_string(),
            };
            self.error(
                format!(
                    "'{function}' expects {expected} arguments, but {} were provided",
                    args.len()
                ),
                span,
            );
            return returns;
        }

        for (i, (arg, found)) in args.iter().zip(arg_types).enumerate() {
            if let Some(expected) = params.get(i).or(rest.as_ref()) {
                if !expected.accepts(found) {
                    self.mismatch(expected, found, arg.span);
                }
            }
        }

        returns
    }

    fn binary_result(&mut self, op: BinaryOp, lhs: &Type, rhs: &Type, span: Span) -> Type {
        use BinaryOp::*;

        let result = match op {
            Equal | NotEqual => Some(Type::Boolean),
            And | Or => {
                if Type::Boolean.accepts(lhs) && Type::Boolean.accepts(rhs) {
                    Some(Type::Boolean)
                } else {
                    None
                }
            }
            _ if *lhs == Type::Any || *rhs == Type::Any => match op {
                Less | LessOrEqual | Greater | GreaterOrEqual => Some(Type::Boolean),
                _ => Some(Type::Any),
            },
            Less | LessOrEqual | Greater | GreaterOrEqual => match (lhs, rhs) {
                (Type::Int, Type::Int)
                | (Type::Float, Type::Float)
                | (Type::String, Type::String)
                | (Type::Boolean, Type::Boolean) => Some(Type::Boolean),
                _ => None,
            },
            Add | Subtract | Multiply | Divide | Remainder => match (lhs, rhs) {
                (Type::Int, Type::Int) => Some(Type::Int),
                (Type::Float, Type::Float) => Some(Type::Float),
                (Type::String, Type::String) if op == Add => Some(Type::String),
                _ => None,
            },
        };

        result.unwrap_or_else(|| {
            self.error(
                format!("operator '{op}' is not defined for '{lhs}' and '{rhs}'"),
                span,
            );
            Type::Any
        })
    }
}

use crate::{NativeModule, Type, TypeTable, core_lib::CoreLib};
use rustc_hash::FxHashMap;
use sprig_parser::{
    FunctionDefinition, Id, ModulePath, Parser, Position, QualifiedName, Span, TopLevelKind,
    TypeDescriptor, VariableDeclaration,
};
use sprig_shell::{
    Backend, CompilationUnit, Diagnostic, DiagnosticKind, DiagnosticOrigin, ModuleReference,
    SnippetKind,
};
use std::{collections::BTreeSet, rc::Rc};
use tracing::trace;

/// A compiled compilation unit, ready to be loaded by the [Vm](crate::Vm)
#[derive(Debug)]
pub struct Program {
    pub(crate) modules: FxHashMap<Id, Rc<NativeModule>>,
    pub(crate) types: TypeTable,
    pub(crate) functions: FxHashMap<Id, Rc<Function>>,
    pub(crate) variables: Vec<ModuleVariable>,
    pub(crate) entry_point: Option<Id>,
    pub(crate) fresh_names: BTreeSet<Id>,
    pub(crate) kind: SnippetKind,
}

impl Program {
    /// The function that's called when the program is invoked
    pub fn entry_point(&self) -> Option<&Id> {
        self.entry_point.as_ref()
    }

    /// The kind of snippet that the program was compiled for
    pub fn kind(&self) -> SnippetKind {
        self.kind
    }

    /// The names of the program's module variables, in initialization order
    pub fn variable_names(&self) -> impl Iterator<Item = &Id> {
        self.variables.iter().map(|variable| &variable.declaration.name)
    }

    /// Returns true if the program defines a function with the given name
    pub fn has_function(&self, name: &Id) -> bool {
        self.functions.contains_key(name)
    }

    /// Returns true if the name is defined by the snippet that the program was compiled for
    pub fn is_fresh(&self, name: &Id) -> bool {
        self.fresh_names.contains(name)
    }
}

#[derive(Debug)]
pub(crate) struct Function {
    pub definition: FunctionDefinition,
    pub params: Vec<Type>,
    pub returns: Type,
}

#[derive(Debug)]
pub(crate) struct ModuleVariable {
    pub declaration: VariableDeclaration,
    pub ty: Type,
}

/// Compiles assembled units into [Program]s
#[derive(Clone, Default)]
pub struct Compiler {
    core_lib: CoreLib,
}

impl Compiler {
    /// Makes a compiler that resolves imports with the given core library
    pub fn with_core_lib(core_lib: CoreLib) -> Self {
        Self { core_lib }
    }

    /// The native modules available to compiled programs
    pub fn core_lib(&self) -> &CoreLib {
        &self.core_lib
    }
}

impl Backend for Compiler {
    type Artifact = Program;

    fn compile(&mut self, unit: &CompilationUnit) -> Result<Program, Vec<Diagnostic>> {
        let syntax = Parser::parse(&unit.source).map_err(|error| {
            vec![compile_error(error.to_string(), error.span)]
        })?;

        let mut errors = Vec::new();
        let mut modules = FxHashMap::default();
        let mut types = TypeTable::default();
        let mut definitions = Vec::new();
        let mut declarations = Vec::new();

        for item in syntax.items {
            match item.kind {
                TopLevelKind::Import(import) => {
                    let path = module_path(&import.module);
                    match self.core_lib.get(&path) {
                        Some(module) => {
                            modules.insert(import.effective_prefix(), module);
                        }
                        None => errors.push(compile_error(
                            format!("module '{path}' not found"),
                            import.span,
                        )),
                    }
                }
                TopLevelKind::Type(definition) => {
                    types.define(definition.name, definition.descriptor);
                }
                TopLevelKind::Function(definition) => definitions.push(definition),
                TopLevelKind::Variable(declaration) => declarations.push(declaration),
                TopLevelKind::Statement(_) | TopLevelKind::Expression(_) => {
                    errors.push(compile_error(
                        "statements are only allowed inside functions",
                        item.span,
                    ));
                }
            }
        }

        let mut resolve = |descriptor: &TypeDescriptor| match types.resolve(descriptor) {
            Ok(resolved) => resolved,
            Err(error) => {
                errors.push(compile_error(error.to_string(), error.span()));
                Type::Any
            }
        };

        let mut functions = FxHashMap::default();
        for definition in definitions {
            let params = definition
                .params
                .iter()
                .map(|param| resolve(&param.ty))
                .collect();
            let returns = definition.returns.as_ref().map_or(Type::Nil, &mut resolve);
            functions.insert(
                definition.name.clone(),
                Rc::new(Function {
                    definition,
                    params,
                    returns,
                }),
            );
        }

        let variables = declarations
            .into_iter()
            .map(|declaration| {
                let ty = declaration.ty.as_ref().map_or(Type::Any, &mut resolve);
                ModuleVariable { declaration, ty }
            })
            .collect();

        // Aliases that aren't referenced by any signature still need to be valid
        for name in unit.fresh_names.iter().filter(|name| types.contains(name)) {
            let reference = TypeDescriptor::Named(QualifiedName {
                prefix: None,
                name: name.clone(),
                span: Span::default(),
            });
            if let Err(error) = types.resolve(&reference) {
                let span = snippet_span(unit).unwrap_or_else(|| error.span());
                errors.push(compile_error(error.to_string(), span));
            }
        }

        if !errors.is_empty() {
            trace!(errors = errors.len(), "compilation failed");
            return Err(errors);
        }

        Ok(Program {
            modules,
            types,
            functions,
            variables,
            entry_point: unit.entry_point.clone(),
            fresh_names: unit.fresh_names.clone(),
            kind: unit.snippet_kind,
        })
    }
}

/// Renders a module path as it's written in an import
pub(crate) fn module_path(path: &ModulePath) -> String {
    ModuleReference::from(path).to_string()
}

fn compile_error(message: impl Into<String>, span: Span) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::Compile, message).with_span(span, DiagnosticOrigin::Unit)
}

// The span of the unit's snippet, used when an error has no meaningful span of its own
fn snippet_span(unit: &CompilationUnit) -> Option<Span> {
    unit.snippet_lines().map(|lines| Span {
        start: Position {
            line: lines.start,
            column: 0,
        },
        end: Position {
            line: lines.end.saturating_sub(1),
            column: 0,
        },
    })
}

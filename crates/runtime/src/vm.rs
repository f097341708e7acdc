use crate::{
    CallContext, DefaultStdout, Error, ErrorKind, Program, Result, SprigWrite, Type, Value,
    compiler::{Function, ModuleVariable},
    core_lib::lists::compare_values,
    runtime_error, unexpected_type,
};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use sprig_parser::{
    AssignTarget, BinaryOp, Block, Expr, ExprKind, Id, QualifiedName, Statement, StatementKind,
    TypeDescriptor, UnaryOp,
};
use sprig_shell::{ArtifactLoader, RuntimeFailure, SnippetKind};
use std::{
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::trace;

/// The configurable settings that should be used by the Sprig runtime
pub struct VmSettings {
    /// An optional duration that limits how long a single invocation is allowed to take
    ///
    /// If the limit is reached without execution ending,
    /// then a [Timeout](ErrorKind::Timeout) error will be returned.
    ///
    /// The deadline is checked between statements and loop iterations, so native functions will
    /// still be able to block execution.
    pub execution_limit: Option<Duration>,

    /// An optional flag that interrupts execution when it's set
    ///
    /// The flag is cleared when the interruption is reported.
    pub interrupt: Option<Arc<AtomicBool>>,

    /// The maximum depth of nested function calls
    pub max_call_depth: usize,

    /// The runtime's stdout
    pub stdout: Rc<dyn SprigWrite>,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            execution_limit: None,
            interrupt: None,
            max_call_depth: 128,
            stdout: Rc::new(DefaultStdout),
        }
    }
}

/// A [Program] that has been loaded by the [Vm]
pub struct LoadedProgram {
    program: Program,
}

impl LoadedProgram {
    /// The loaded program
    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// The Sprig runtime's interpreter
///
/// The VM owns the values of module variables, which outlive the programs that define them.
/// Values are only written back to the VM's memory after a program has run successfully.
#[derive(Default)]
pub struct Vm {
    settings: VmSettings,
    memory: IndexMap<Id, Value>,
}

impl Vm {
    /// Initializes a VM with the given settings
    pub fn with_settings(settings: VmSettings) -> Self {
        Self {
            settings,
            memory: IndexMap::new(),
        }
    }

    /// The VM's settings
    pub fn settings(&self) -> &VmSettings {
        &self.settings
    }

    /// The runtime's stdout
    pub fn stdout(&self) -> &Rc<dyn SprigWrite> {
        &self.settings.stdout
    }

    /// The current values of module variables, in the order they were first defined
    pub fn memory(&self) -> &IndexMap<Id, Value> {
        &self.memory
    }

    /// Returns the current value of a module variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.memory.get(name)
    }

    /// Runs a program, returning the value produced by its entry point
    pub fn run(&mut self, program: &Program) -> Result<Value> {
        let mut execution = Execution::new(program, &self.settings);

        for variable in &program.variables {
            let name = &variable.declaration.name;
            let value = match self.memory.get(name) {
                Some(value) if !program.is_fresh(name) => value.clone(),
                _ => execution.initialize(variable)?,
            };
            execution.globals.insert(
                name.clone(),
                Slot::new(value, variable.ty.clone(), variable.declaration.is_final),
            );
        }

        let result = match &program.entry_point {
            Some(entry_point) => execution.call_function(entry_point, Vec::new())?,
            None => Value::Nil,
        };

        for (name, slot) in execution.globals {
            self.memory.insert(name, slot.value);
        }

        Ok(result)
    }
}

impl ArtifactLoader for Vm {
    type Artifact = Program;
    type Handle = LoadedProgram;
    type Checkpoint = IndexMap<Id, Value>;

    fn load(&mut self, program: Program) -> std::result::Result<LoadedProgram, RuntimeFailure> {
        trace!(
            functions = program.functions.len(),
            variables = program.variables.len(),
            "program loaded"
        );
        Ok(LoadedProgram { program })
    }

    fn invoke(
        &mut self,
        handle: &mut LoadedProgram,
    ) -> std::result::Result<Option<String>, RuntimeFailure> {
        let value = self.run(&handle.program)?;
        let result = match handle.program.kind {
            SnippetKind::Expression if !value.is_nil() => Some(value.render()),
            _ => None,
        };
        Ok(result)
    }

    fn unload(&mut self, _handle: LoadedProgram) {}

    fn reset(&mut self) {
        self.memory.clear();
    }

    fn forget(&mut self, names: &[Id]) {
        for name in names {
            self.memory.shift_remove(name);
        }
    }

    fn checkpoint(&self) -> IndexMap<Id, Value> {
        self.memory.clone()
    }

    fn restore(&mut self, memory: IndexMap<Id, Value>) {
        self.memory = memory;
    }
}

struct Slot {
    value: Value,
    ty: Type,
    is_final: bool,
}

impl Slot {
    fn new(value: Value, ty: Type, is_final: bool) -> Self {
        Self {
            value,
            ty,
            is_final,
        }
    }
}

#[derive(Default)]
struct Frame {
    scopes: Vec<FxHashMap<Id, Slot>>,
}

enum Flow {
    Next,
    Break,
    Continue,
    Return(Value),
}

// The state of a single invocation of a program
struct Execution<'a> {
    program: &'a Program,
    settings: &'a VmSettings,
    globals: IndexMap<Id, Slot>,
    frames: Vec<Frame>,
    timeout: Option<ExecutionTimeout>,
}

impl<'a> Execution<'a> {
    fn new(program: &'a Program, settings: &'a VmSettings) -> Self {
        Self {
            program,
            settings,
            globals: IndexMap::new(),
            frames: Vec::new(),
            timeout: settings.execution_limit.map(ExecutionTimeout::new),
        }
    }

    fn initialize(&mut self, variable: &ModuleVariable) -> Result<Value> {
        let declaration = &variable.declaration;
        trace!(name = %declaration.name, "initializing module variable");

        self.frames.push(Frame::default());
        let value = self.eval(&declaration.value);
        self.frames.pop();

        let value = value?;
        check_type(&variable.ty, &value).map_err(|e| e.with_span(declaration.name_span))?;
        Ok(value)
    }

    fn tick(&mut self) -> Result<()> {
        if let Some(interrupt) = &self.settings.interrupt {
            if interrupt.swap(false, Ordering::Relaxed) {
                return runtime_error!(ErrorKind::Interrupted);
            }
        }
        if let Some(timeout) = &mut self.timeout {
            if timeout.check_for_timeout() {
                return runtime_error!(ErrorKind::Timeout(timeout.execution_limit));
            }
        }
        Ok(())
    }

    fn call_function(&mut self, name: &Id, args: Vec<Value>) -> Result<Value> {
        let program = self.program;
        let Some(function) = program.functions.get(name) else {
            return runtime_error!(ErrorKind::UndefinedSymbol(name.clone()));
        };
        let function: &Function = function;

        if self.frames.len() >= self.settings.max_call_depth {
            return runtime_error!(ErrorKind::CallDepthExceeded(self.settings.max_call_depth));
        }
        if args.len() != function.params.len() {
            return runtime_error!(
                "'{name}' expects {} arguments, but {} were provided",
                function.params.len(),
                args.len()
            );
        }
        self.tick()?;

        let mut scope = FxHashMap::default();
        for ((param, ty), value) in function
            .definition
            .params
            .iter()
            .zip(&function.params)
            .zip(args)
        {
            check_type(ty, &value)?;
            scope.insert(param.name.clone(), Slot::new(value, ty.clone(), false));
        }

        self.frames.push(Frame {
            scopes: vec![scope],
        });
        let flow = self.exec_statements(&function.definition.body.statements);
        self.frames.pop();

        let value = match flow? {
            Flow::Return(value) => value,
            _ => Value::Nil,
        };
        check_type(&function.returns, &value).map_err(|e| e.with_span(function.definition.name_span))?;
        Ok(value)
    }

    fn resolve_type(&self, descriptor: Option<&TypeDescriptor>) -> Result<Type> {
        match descriptor {
            Some(descriptor) => self
                .program
                .types
                .resolve(descriptor)
                .map_err(|error| Error::from(error.to_string())),
            None => Ok(Type::Any),
        }
    }

    fn lookup(&self, name: &Id) -> Option<&Slot> {
        self.frames
            .last()
            .and_then(|frame| frame.scopes.iter().rev().find_map(|scope| scope.get(name)))
            .or_else(|| self.globals.get(name))
    }

    fn lookup_mut(&mut self, name: &Id) -> Option<&mut Slot> {
        let local = self.frames.last_mut().and_then(|frame| {
            frame
                .scopes
                .iter_mut()
                .rev()
                .find_map(|scope| scope.get_mut(name))
        });
        match local {
            Some(slot) => Some(slot),
            None => self.globals.get_mut(name),
        }
    }

    fn declare_local(&mut self, name: Id, slot: Slot) {
        if let Some(scope) = self
            .frames
            .last_mut()
            .and_then(|frame| frame.scopes.last_mut())
        {
            scope.insert(name, slot);
        }
    }

    fn push_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.push(FxHashMap::default());
        }
    }

    fn pop_scope(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.pop();
        }
    }

    fn exec_block(&mut self, block: &Block) -> Result<Flow> {
        self.push_scope();
        let result = self.exec_statements(&block.statements);
        self.pop_scope();
        result
    }

    fn exec_statements(&mut self, statements: &[Statement]) -> Result<Flow> {
        for statement in statements {
            match self.exec(statement)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, statement: &Statement) -> Result<Flow> {
        self.tick()?;
        self.exec_inner(statement)
            .map_err(|e| e.with_span(statement.span))
    }

    fn exec_inner(&mut self, statement: &Statement) -> Result<Flow> {
        match &statement.kind {
            StatementKind::Variable(declaration) => {
                let ty = self.resolve_type(declaration.ty.as_ref())?;
                let value = self.eval(&declaration.value)?;
                check_type(&ty, &value).map_err(|e| e.with_span(declaration.name_span))?;
                self.declare_local(
                    declaration.name.clone(),
                    Slot::new(value, ty, declaration.is_final),
                );
            }
            StatementKind::Assign { target, op, value } => {
                let value = self.eval(value)?;
                match target {
                    AssignTarget::Name(name) => {
                        let value = match op.binary_op() {
                            Some(op) => {
                                let current = self.read(name)?.clone();
                                binary_op(op, current, value)?
                            }
                            None => value,
                        };
                        self.assign(name, |slot| {
                            slot.value = value;
                            Ok(())
                        })?;
                    }
                    AssignTarget::Index { name, indices } => {
                        let indices = indices
                            .iter()
                            .map(|index| match self.eval(index)? {
                                Value::Int(i) => Ok(i),
                                unexpected => {
                                    unexpected_type("int", &unexpected).map_err(|e| e.with_span(index.span))
                                }
                            })
                            .collect::<Result<Vec<_>>>()?;

                        let value = match op.binary_op() {
                            Some(op) => {
                                let mut current = self.read(name)?.clone();
                                for index in &indices {
                                    current = index_value(&current, &Value::Int(*index))?;
                                }
                                binary_op(op, current, value)?
                            }
                            None => value,
                        };
                        self.assign(name, |slot| set_index(&mut slot.value, &indices, value))?;
                    }
                }
            }
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                if self.eval_condition(condition)? {
                    return self.exec_block(then_block);
                } else if let Some(else_block) = else_block {
                    return self.exec_block(else_block);
                }
            }
            StatementKind::While { condition, body } => {
                while self.eval_condition(condition)? {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Next | Flow::Continue => self.tick()?,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StatementKind::Foreach {
                ty,
                name,
                iterable,
                body,
            } => {
                let ty = self.resolve_type(ty.as_ref())?;
                let items: Vec<Value> = match self.eval(iterable)? {
                    Value::List(values) => values.as_ref().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
                    unexpected => {
                        return unexpected_type("list or string", &unexpected)
                            .map_err(|e| e.with_span(iterable.span));
                    }
                };

                for item in items {
                    self.tick()?;
                    check_type(&ty, &item)?;
                    self.push_scope();
                    self.declare_local(name.clone(), Slot::new(item, ty.clone(), false));
                    let flow = self.exec_block(body);
                    self.pop_scope();
                    match flow? {
                        Flow::Break => break,
                        Flow::Next | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StatementKind::Break => return Ok(Flow::Break),
            StatementKind::Continue => return Ok(Flow::Continue),
            StatementKind::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            StatementKind::Block(block) => return self.exec_block(block),
            StatementKind::Expression(expr) => {
                self.eval(expr)?;
            }
        }

        Ok(Flow::Next)
    }

    fn read(&self, name: &Id) -> Result<&Value> {
        match self.lookup(name) {
            Some(slot) => Ok(&slot.value),
            None => runtime_error!(ErrorKind::UndefinedSymbol(name.clone())),
        }
    }

    // Modifies a variable, checking that its new value still matches its type
    fn assign(&mut self, name: &Id, modify: impl FnOnce(&mut Slot) -> Result<()>) -> Result<()> {
        let Some(slot) = self.lookup_mut(name) else {
            return runtime_error!(ErrorKind::UndefinedSymbol(name.clone()));
        };
        if slot.is_final {
            return runtime_error!("cannot assign to the final variable '{name}'");
        }
        modify(&mut *slot)?;
        check_type(&slot.ty, &slot.value)
    }

    fn eval_condition(&mut self, condition: &Expr) -> Result<bool> {
        match self.eval(condition)? {
            Value::Bool(b) => Ok(b),
            unexpected => unexpected_type("boolean", &unexpected).map_err(|e| e.with_span(condition.span)),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        self.eval_inner(expr).map_err(|e| e.with_span(expr.span))
    }

    fn eval_inner(&mut self, expr: &Expr) -> Result<Value> {
        let result = match &expr.kind {
            ExprKind::Nil => Value::Nil,
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Int(n) => Value::Int(*n),
            ExprKind::Float(n) => Value::Float(*n),
            ExprKind::Str(s) => Value::from(s.as_str()),
            ExprKind::List(elements) => Value::list(
                elements
                    .iter()
                    .map(|element| self.eval(element))
                    .collect::<Result<_>>()?,
            ),
            ExprKind::Name(name) => self.eval_name(name)?,
            ExprKind::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.call(function, args)?
            }
            ExprKind::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)?
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                unary_op(*op, operand)?
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    let lhs = match self.eval(lhs)? {
                        Value::Bool(b) => b,
                        unexpected => return unexpected_type("boolean", &unexpected),
                    };
                    // Short-circuiting
                    if (*op == BinaryOp::And) != lhs {
                        Value::Bool(lhs)
                    } else {
                        match self.eval(rhs)? {
                            Value::Bool(b) => Value::Bool(b),
                            unexpected => return unexpected_type("boolean", &unexpected),
                        }
                    }
                }
                _ => {
                    let lhs = self.eval(lhs)?;
                    let rhs = self.eval(rhs)?;
                    binary_op(*op, lhs, rhs)?
                }
            },
            ExprKind::Range { start, end } => match (self.eval(start)?, self.eval(end)?) {
                (Value::Int(start), Value::Int(end)) => {
                    Value::list((start..end).map(Value::Int).collect())
                }
                (start, end) => {
                    return runtime_error!(
                        "expected int bounds for the range, but found '{}' and '{}'",
                        start.type_name(),
                        end.type_name()
                    );
                }
            },
        };

        Ok(result)
    }

    fn eval_name(&mut self, name: &QualifiedName) -> Result<Value> {
        if name.prefix.is_some() {
            return runtime_error!("'{name}' can't be used as a value");
        }
        match self.lookup(&name.name) {
            Some(slot) => Ok(slot.value.clone()),
            None if self.program.has_function(&name.name) => {
                runtime_error!("the function '{name}' can't be used as a value")
            }
            None => runtime_error!(ErrorKind::UndefinedSymbol(name.name.clone())),
        }
    }

    fn call(&mut self, function: &QualifiedName, args: Vec<Value>) -> Result<Value> {
        let Some(prefix) = &function.prefix else {
            return self.call_function(&function.name, args);
        };

        let program = self.program;
        let Some(module) = program.modules.get(prefix) else {
            return runtime_error!("the module prefix '{prefix}' isn't bound to a module");
        };
        let Some(native) = module.get(function.name.as_str()) else {
            return runtime_error!(ErrorKind::UndefinedSymbol(function.name.clone()));
        };

        self.tick()?;
        let stdout = self.settings.stdout.as_ref();
        native.call(&mut CallContext::new(stdout, &args))
    }
}

fn check_type(ty: &Type, value: &Value) -> Result<()> {
    if ty.matches(value) {
        Ok(())
    } else {
        runtime_error!(ErrorKind::UnexpectedType {
            expected: ty.to_string(),
            found: value.type_name().into(),
        })
    }
}

fn list_index(index: i64, len: usize) -> Result<usize> {
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => runtime_error!(ErrorKind::IndexOutOfBounds { index, len }),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value> {
    match (target, index) {
        (Value::List(values), Value::Int(i)) => {
            let i = list_index(*i, values.len())?;
            Ok(values[i].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let len = s.chars().count();
            let i = list_index(*i, len)?;
            Ok(s.chars().nth(i).map(String::from).unwrap_or_default().into())
        }
        (Value::List(_) | Value::Str(_), unexpected) => unexpected_type("int", unexpected),
        (unexpected, _) => unexpected_type("list or string", unexpected),
    }
}

fn set_index(target: &mut Value, indices: &[i64], value: Value) -> Result<()> {
    let Some((first, rest)) = indices.split_first() else {
        *target = value;
        return Ok(());
    };

    match target {
        Value::List(values) => {
            let i = list_index(*first, values.len())?;
            // Copy on write when the list is shared
            let values = Rc::make_mut(values);
            set_index(&mut values[i], rest, value)
        }
        unexpected => unexpected_type("list", unexpected),
    }
}

fn unary_op(op: UnaryOp, operand: Value) -> Result<Value> {
    match (op, operand) {
        (UnaryOp::Negate, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ErrorKind::Overflow.into()),
        (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, unexpected) => unexpected_type("int or float", &unexpected),
        (UnaryOp::Not, unexpected) => unexpected_type("boolean", &unexpected),
    }
}

fn binary_op(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    use BinaryOp::*;
    use Value::*;

    let checked = |result: Option<i64>| -> Result<Value> {
        result.map(Int).ok_or_else(|| ErrorKind::Overflow.into())
    };

    match (op, &lhs, &rhs) {
        (Add, Int(a), Int(b)) => checked(a.checked_add(*b)),
        (Subtract, Int(a), Int(b)) => checked(a.checked_sub(*b)),
        (Multiply, Int(a), Int(b)) => checked(a.checked_mul(*b)),
        (Divide | Remainder, Int(_), Int(0)) => runtime_error!(ErrorKind::DivideByZero),
        (Divide, Int(a), Int(b)) => checked(a.checked_div(*b)),
        (Remainder, Int(a), Int(b)) => checked(a.checked_rem(*b)),
        (Add, Float(a), Float(b)) => Ok(Float(a + b)),
        (Subtract, Float(a), Float(b)) => Ok(Float(a - b)),
        (Multiply, Float(a), Float(b)) => Ok(Float(a * b)),
        (Divide, Float(a), Float(b)) => Ok(Float(a / b)),
        (Remainder, Float(a), Float(b)) => Ok(Float(a % b)),
        (Add, Str(a), Str(b)) => Ok(Value::from(format!("{a}{b}"))),
        (Equal, _, _) => Ok(Bool(lhs == rhs)),
        (NotEqual, _, _) => Ok(Bool(lhs != rhs)),
        (Less | LessOrEqual | Greater | GreaterOrEqual, _, _)
            if lhs.type_name() == rhs.type_name()
                && matches!(lhs, Int(_) | Float(_) | Str(_) | Bool(_)) =>
        {
            let ordering = compare_values(&lhs, &rhs)?;
            let result = match op {
                Less => ordering.is_lt(),
                LessOrEqual => ordering.is_le(),
                Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Bool(result))
        }
        _ => runtime_error!(ErrorKind::InvalidBinaryOp {
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
            op,
        }),
    }
}

struct ExecutionTimeout {
    // The instant at which the deadline was last checked
    last_check: Instant,
    // The time at which a timeout will be reached
    deadline: Instant,
    // The target number of seconds to wait between deadline checks
    interval_seconds: f64,
    // The number of ticks that should elapse before the next check
    interval_ticks: usize,
    // The number of ticks that have elapsed since the last check
    ticks_since_last_check: usize,
    // The maximum amount of time that execution is allowed to take
    execution_limit: Duration,
}

impl ExecutionTimeout {
    fn new(execution_limit: Duration) -> Self {
        let now = Instant::now();
        let interval_seconds = (execution_limit / 10).as_secs_f64();

        // A rough baseline tick rate that gets adjusted per interval based on the actual
        // execution duration.
        let first_interval_ticks = if cfg!(debug_assertions) {
            1_000_000.0
        } else {
            10_000_000.0
        } * interval_seconds;

        Self {
            last_check: now,
            deadline: now + execution_limit,
            interval_seconds,
            interval_ticks: first_interval_ticks as usize,
            ticks_since_last_check: 0,
            execution_limit,
        }
    }

    // Returns true if the deadline has been reached, and false otherwise
    fn check_for_timeout(&mut self) -> bool {
        if self.ticks_since_last_check < self.interval_ticks {
            self.ticks_since_last_check += 1;
            return false;
        }

        let now = Instant::now();
        if now >= self.deadline {
            return true;
        }

        // Use the remaining time as the next interval's duration when the deadline is near
        let remaining = (self.deadline - now).as_secs_f64();
        let next_interval_duration = self.interval_seconds.min(remaining);

        let elapsed = (now - self.last_check).as_secs_f64().max(f64::EPSILON);
        let interval_adjustment = next_interval_duration / elapsed;
        self.interval_ticks = ((self.interval_ticks as f64 * interval_adjustment) as usize).max(1);

        self.ticks_since_last_check = 0;
        self.last_check = now;
        false
    }
}

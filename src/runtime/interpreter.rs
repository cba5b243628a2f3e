use crate::diagnostics;
use crate::language::ast::*;
use crate::language::parser::parse_program;
use crate::runtime::environment::{Environment, infer_type};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::heap::Heap;
use crate::runtime::platform::platform;
use crate::runtime::value::{
    ClassRef, FunctionValue, ListValue, MapValue, NativeFn, PointerValue, StructValue, Value,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

type TypeTable = Arc<Mutex<HashMap<String, TypeDecl>>>;
type MethodTable = Arc<Mutex<HashMap<String, HashMap<String, FunctionDecl>>>>;

/// Where `print` writes. Stdout normally; a shared capture buffer
/// under test. Spawned tasks and modules inherit the handle.
#[derive(Clone, Default)]
pub struct Output {
    buffer: Option<Arc<Mutex<String>>>,
}

impl Output {
    pub fn stdout() -> Self {
        Self { buffer: None }
    }

    /// Output handle writing into a buffer the caller can inspect.
    pub fn captured() -> (Self, Arc<Mutex<String>>) {
        let buffer = Arc::new(Mutex::new(String::new()));
        (
            Self {
                buffer: Some(buffer.clone()),
            },
            buffer,
        )
    }

    fn writeln(&self, line: &str) {
        match &self.buffer {
            Some(buffer) => {
                let mut buffer = buffer.lock().unwrap();
                buffer.push_str(line);
                buffer.push('\n');
            }
            None => println!("{line}"),
        }
    }
}

/// Non-local exit threaded upward through statement evaluation until
/// the nearest call frame consumes it.
enum FlowSignal {
    Return(Option<Value>),
}

/// Tree-walking evaluator. Each interpreter owns its scope chain;
/// the heap, type table, and method table are shared with every
/// module and spawned task of the same engine.
pub struct Interpreter {
    environment: Environment,
    heap: Arc<Heap>,
    types: TypeTable,
    methods: MethodTable,
    output: Output,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Output::stdout())
    }

    pub fn with_output(output: Output) -> Self {
        Self::with_shared(
            Arc::new(Heap::new()),
            Arc::new(Mutex::new(HashMap::new())),
            Arc::new(Mutex::new(HashMap::new())),
            output,
        )
    }

    fn with_shared(heap: Arc<Heap>, types: TypeTable, methods: MethodTable, output: Output) -> Self {
        let interpreter = Self {
            environment: Environment::new(),
            heap,
            types,
            methods,
            output,
        };
        interpreter.register_natives();
        interpreter
    }

    fn register_natives(&self) {
        for native in [
            NativeFn::Time,
            NativeFn::Len,
            NativeFn::Push,
            NativeFn::Get,
            NativeFn::Sleep,
            NativeFn::Spawn,
        ] {
            self.environment
                .define(native.name(), Value::Native(native), false);
        }
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// Runs a top-level statement sequence. A runtime error aborts the
    /// remaining statements and is reported on the diagnostic channel;
    /// a top-level `return` simply ends the sequence.
    pub fn interpret(&mut self, statements: &[Stmt]) {
        for statement in statements {
            match self.execute(statement) {
                Ok(None) => {}
                Ok(Some(FlowSignal::Return(_))) => break,
                Err(error) => {
                    diagnostics::report_runtime_error(&error);
                    break;
                }
            }
        }
    }

    fn execute(&mut self, statement: &Stmt) -> RuntimeResult<Option<FlowSignal>> {
        match statement {
            Stmt::Expression(stmt) => {
                self.evaluate(&stmt.expr)?;
                Ok(None)
            }
            Stmt::Let(stmt) => {
                let value = self.evaluate(&stmt.initializer)?;
                let stored = value.copy();
                stored.retain(&self.heap);
                if let Some(prior) = self.environment.define(&stmt.name, stored, stmt.mutable) {
                    prior.release(&self.heap)?;
                }
                Ok(None)
            }
            Stmt::Block(statements) => {
                let scope = Environment::with_enclosing(self.environment.clone());
                self.execute_block(statements, scope)
            }
            Stmt::If(stmt) => {
                if self.evaluate(&stmt.condition)?.is_truthy() {
                    self.execute(&stmt.then_branch)
                } else if let Some(else_branch) = &stmt.else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(None)
                }
            }
            Stmt::While(stmt) => {
                while self.evaluate(&stmt.condition)?.is_truthy() {
                    if let Some(flow) = self.execute(&stmt.body)? {
                        return Ok(Some(flow));
                    }
                }
                Ok(None)
            }
            Stmt::Print(stmt) => {
                let value = self.evaluate(&stmt.expr)?;
                self.output.writeln(&value.to_string());
                Ok(None)
            }
            Stmt::Type(decl) => {
                self.types
                    .lock()
                    .unwrap()
                    .insert(decl.name.clone(), decl.clone());
                Ok(None)
            }
            Stmt::Impl(block) => {
                let mut methods = self.methods.lock().unwrap();
                let table = methods.entry(block.type_name.clone()).or_default();
                for method in &block.methods {
                    table.insert(method.name.clone(), method.clone());
                }
                Ok(None)
            }
            Stmt::Function(decl) => {
                let function = Value::Function(FunctionValue {
                    params: Arc::new(decl.params.clone()),
                    body: Arc::new(decl.body.clone()),
                    closure: self.environment.clone(),
                });
                if let Some(prior) = self.environment.define(&decl.name, function, false) {
                    prior.release(&self.heap)?;
                }
                Ok(None)
            }
            Stmt::Return(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => Some(self.evaluate(expr)?),
                    None => None,
                };
                Ok(Some(FlowSignal::Return(value)))
            }
            Stmt::Delete(_) => {
                eprintln!("Manual delete command ignored in ARC mode.");
                Ok(None)
            }
            Stmt::Import(stmt) => self.import_module(stmt),
        }
    }

    /// Runs `statements` in `scope`, then releases every value the
    /// scope accumulated, even when unwinding on an error or a return.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        scope: Environment,
    ) -> RuntimeResult<Option<FlowSignal>> {
        let previous = std::mem::replace(&mut self.environment, scope);
        let result = self.run_statements(statements);
        let locals = self.environment.take_locals();
        self.environment = previous;

        let mut release_error = None;
        for value in locals {
            if let Err(error) = value.release(&self.heap) {
                release_error = Some(error);
            }
        }
        match (result, release_error) {
            (Err(error), _) => Err(error),
            (Ok(_), Some(error)) => Err(error),
            (Ok(flow), None) => Ok(flow),
        }
    }

    fn run_statements(&mut self, statements: &[Stmt]) -> RuntimeResult<Option<FlowSignal>> {
        for statement in statements {
            if let Some(flow) = self.execute(statement)? {
                return Ok(Some(flow));
            }
        }
        Ok(None)
    }

    fn evaluate(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Literal(Literal::Int(value, _)) => Ok(Value::Int(*value)),
            Expr::Literal(Literal::Str(value, _)) => Ok(Value::Str(value.clone())),
            Expr::Variable(name) => self.environment.get(&name.name),
            Expr::Grouping(inner) => self.evaluate(inner),
            Expr::Atom { name, .. } => Ok(Value::Atom(name.clone())),
            Expr::This(_) => self.environment.get("this"),
            Expr::Tuple { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Value::Tuple(values))
            }
            Expr::ListLit { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.evaluate(element)?.copy());
                }
                Ok(Value::List(ListValue::from_vec(items)))
            }
            Expr::MapLit { keys, values, .. } => {
                let mut map = MapValue::new();
                for (key, value) in keys.iter().zip(values) {
                    let key = self.evaluate(key)?.copy();
                    let value = self.evaluate(value)?.copy();
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            Expr::Unary { op, expr, .. } => {
                let value = self.evaluate(expr)?;
                match op {
                    UnaryOp::Neg => match value {
                        Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
                        _ => Err(RuntimeError::OperandType {
                            message: "Operand must be a number.".to_string(),
                        }),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                }
            }
            Expr::Binary { op, left, right, .. } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                eval_binary(*op, left, right)
            }
            Expr::Assign { name, value } => {
                let value = self.evaluate(value)?;
                let stored = value.copy();
                stored.retain(&self.heap);
                match self.environment.assign(&name.name, stored.clone()) {
                    Ok(old) => {
                        old.release(&self.heap)?;
                        Ok(stored)
                    }
                    Err(error) => {
                        stored.release(&self.heap)?;
                        Err(error)
                    }
                }
            }
            Expr::AddressOf(name) => match self.environment.resolve(&name.name) {
                Some(scope) => Ok(Value::Pointer(PointerValue {
                    scope,
                    name: name.name.clone(),
                })),
                None => Err(RuntimeError::UndefinedVariable {
                    name: name.name.clone(),
                }),
            },
            Expr::Dereference { expr, .. } => match self.evaluate(expr)? {
                Value::Pointer(pointer) => pointer.scope.get(&pointer.name),
                _ => Err(RuntimeError::NotAPointer),
            },
            Expr::PointerSet { pointer, value, .. } => {
                let Value::Pointer(pointer) = self.evaluate(pointer)? else {
                    return Err(RuntimeError::PointerAssignTarget);
                };
                let value = self.evaluate(value)?;
                let stored = value.copy();
                stored.retain(&self.heap);
                match pointer.scope.assign(&pointer.name, stored.clone()) {
                    Ok(old) => {
                        old.release(&self.heap)?;
                        Ok(stored)
                    }
                    Err(error) => {
                        stored.release(&self.heap)?;
                        Err(error)
                    }
                }
            }
            Expr::New { type_name, args, .. } => self.eval_new(type_name, args),
            Expr::Get { object, name } => {
                let object = self.evaluate(object)?;
                let instance = self.resolve_struct(&object)?;
                instance
                    .get(&name.name)
                    .ok_or_else(|| RuntimeError::UndefinedProperty {
                        name: name.name.clone(),
                    })
            }
            Expr::Set { object, name, value } => {
                let object = self.evaluate(object)?;
                let instance = self.resolve_struct(&object)?;
                let value = self.evaluate(value)?;
                let stored = value.copy();
                stored.retain(&self.heap);
                let old = instance.set(&name.name, stored.clone());
                if let Some(old) = old {
                    old.release(&self.heap)?;
                }
                Ok(stored)
            }
            Expr::Call { callee, args, .. } => self.eval_call(callee, args),
            Expr::Lambda(lambda) => self.eval_lambda(lambda),
        }
    }

    fn eval_new(&mut self, type_name: &Identifier, args: &[Expr]) -> RuntimeResult<Value> {
        let decl = self
            .types
            .lock()
            .unwrap()
            .get(&type_name.name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedType {
                name: type_name.name.clone(),
            })?;

        if args.len() != decl.fields.len() {
            return Err(RuntimeError::FieldArity {
                expected: decl.fields.len(),
                received: args.len(),
            });
        }

        // Fields are copies of the arguments; ownership stays with the
        // binding the reference eventually lands in, so no retain here.
        let instance = StructValue::new(decl.name.clone());
        for (field, arg) in decl.fields.iter().zip(args) {
            let value = self.evaluate(arg)?.copy();
            instance.set(field, value);
        }

        match decl.kind {
            TypeKind::Class => {
                let address = self.heap.allocate(instance);
                Ok(Value::ClassRef(ClassRef {
                    address,
                    type_name: decl.name,
                }))
            }
            TypeKind::Struct => Ok(Value::Struct(instance)),
        }
    }

    fn resolve_struct(&self, value: &Value) -> RuntimeResult<StructValue> {
        match value {
            Value::Struct(instance) => Ok(instance.clone()),
            Value::ClassRef(reference) => self.heap.dereference(reference.address),
            _ => Err(RuntimeError::NotAnInstance),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> RuntimeResult<Value> {
        // `obj.name(...)`: a callable field wins over a method.
        if let Expr::Get { object, name } = callee {
            let object = self.evaluate(object)?;
            let instance = self.resolve_struct(&object)?;
            if let Some(field) = instance.get(&name.name) {
                return match field {
                    Value::Function(_) | Value::Native(_) => self.call_value(field, args),
                    _ => Err(RuntimeError::PropertyNotCallable {
                        name: name.name.clone(),
                    }),
                };
            }
            return self.call_method(&object, &name.name, args);
        }

        let callee = self.evaluate(callee)?;
        self.call_value(callee, args)
    }

    fn call_value(&mut self, callee: Value, args: &[Expr]) -> RuntimeResult<Value> {
        match callee {
            Value::Native(native) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                self.call_native(native, values)
            }
            Value::Function(function) => self.call_lambda(&function, args),
            _ => Err(RuntimeError::NotCallable),
        }
    }

    fn call_lambda(&mut self, function: &FunctionValue, args: &[Expr]) -> RuntimeResult<Value> {
        if args.len() != function.params.len() {
            return Err(RuntimeError::LambdaArity {
                expected: function.params.len(),
            });
        }

        let scope = Environment::with_enclosing(function.closure.clone());
        for (param, arg) in function.params.iter().zip(args) {
            let value = self.evaluate(arg)?.copy();
            value.retain(&self.heap);
            if let Some(prior) = scope.define(param, value, false) {
                prior.release(&self.heap)?;
            }
        }

        let body = function.body.clone();
        match self.execute_block(&body, scope)? {
            Some(FlowSignal::Return(value)) => Ok(value.unwrap_or(Value::Null)),
            None => Ok(Value::Null),
        }
    }

    fn call_method(
        &mut self,
        object: &Value,
        method_name: &str,
        args: &[Expr],
    ) -> RuntimeResult<Value> {
        let type_name = infer_type(object).to_string();
        let method = self
            .methods
            .lock()
            .unwrap()
            .get(&type_name)
            .and_then(|table| table.get(method_name))
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedMethod {
                name: method_name.to_string(),
                type_name: type_name.clone(),
            })?;

        if args.len() != method.params.len() {
            return Err(RuntimeError::MethodArity {
                name: method_name.to_string(),
                expected: method.params.len(),
            });
        }

        let scope = Environment::with_enclosing(self.environment.clone());
        let this_value = object.copy();
        this_value.retain(&self.heap);
        scope.define("this", this_value, false);

        for (param, arg) in method.params.iter().zip(args) {
            let value = self.evaluate(arg)?.copy();
            value.retain(&self.heap);
            scope.define(param, value, false);
        }

        match self.execute_block(&method.body, scope)? {
            Some(FlowSignal::Return(value)) => Ok(value.unwrap_or(Value::Null)),
            None => Ok(Value::Null),
        }
    }

    fn eval_lambda(&mut self, lambda: &LambdaExpr) -> RuntimeResult<Value> {
        let closure = Environment::with_enclosing(self.environment.clone());
        for capture in &lambda.captures {
            match capture {
                Capture::ByValue(name) => {
                    let value = self.environment.get(&name.name)?;
                    let captured = value.copy();
                    captured.retain(&self.heap);
                    closure.define(&name.name, captured, false);
                }
                Capture::ByAddress(name) => {
                    let scope = self.environment.resolve(&name.name).ok_or_else(|| {
                        RuntimeError::UndefinedVariable {
                            name: name.name.clone(),
                        }
                    })?;
                    closure.define(
                        &name.name,
                        Value::Pointer(PointerValue {
                            scope,
                            name: name.name.clone(),
                        }),
                        false,
                    );
                }
            }
        }

        Ok(Value::Function(FunctionValue {
            params: Arc::new(lambda.params.clone()),
            body: Arc::new(lambda.body.clone()),
            closure,
        }))
    }

    fn call_native(&mut self, native: NativeFn, args: Vec<Value>) -> RuntimeResult<Value> {
        match native {
            NativeFn::Time => Ok(Value::Int(platform().now_secs() as i32)),
            NativeFn::Len => {
                if args.len() != 1 {
                    return Err(native_error("len() takes 1 argument."));
                }
                match &args[0] {
                    Value::List(list) => Ok(Value::Int(list.len() as i32)),
                    _ => Err(native_error("len() argument must be a list.")),
                }
            }
            NativeFn::Push => {
                if args.len() != 2 {
                    return Err(native_error("push() takes 2 arguments (list, item)."));
                }
                match &args[0] {
                    Value::List(list) => {
                        let item = args[1].copy();
                        item.retain(&self.heap);
                        list.push(item);
                        Ok(Value::Null)
                    }
                    _ => Err(native_error("push() first argument must be a list.")),
                }
            }
            NativeFn::Get => {
                if args.len() != 2 {
                    return Err(native_error("get() takes 2 arguments (list, index)."));
                }
                match (&args[0], &args[1]) {
                    (Value::List(list), Value::Int(index)) => {
                        if *index < 0 {
                            return Err(RuntimeError::IndexOutOfBounds { index: *index });
                        }
                        list.get(*index as usize)
                            .ok_or(RuntimeError::IndexOutOfBounds { index: *index })
                    }
                    _ => Err(native_error("get() expects (list, int).")),
                }
            }
            NativeFn::Sleep => {
                if args.len() != 1 {
                    return Err(native_error("sleep() takes 1 argument (ms)."));
                }
                match &args[0] {
                    Value::Int(millis) => {
                        platform().sleep_ms(*millis as i64);
                        Ok(Value::Null)
                    }
                    _ => Err(native_error("sleep() argument must be an integer.")),
                }
            }
            NativeFn::Spawn => {
                if args.len() != 1 {
                    return Err(native_error("spawn() takes 1 argument (lambda)."));
                }
                match &args[0] {
                    Value::Function(function) => {
                        self.spawn_task(function.clone());
                        Ok(Value::Null)
                    }
                    _ => Err(native_error("spawn() expects a function/lambda.")),
                }
            }
        }
    }

    /// Launches a detached task on a host thread. The task gets its
    /// own evaluator sharing this engine's heap and tables, and runs
    /// the closure body directly against the captured scope.
    fn spawn_task(&self, function: FunctionValue) {
        let mut task = Interpreter::with_shared(
            self.heap.clone(),
            self.types.clone(),
            self.methods.clone(),
            self.output.clone(),
        );
        thread::spawn(move || {
            let body = function.body.clone();
            if let Err(error) = task.execute_block(&body, function.closure.clone()) {
                eprintln!("Thread Error: {error}");
            }
        });
    }

    fn import_module(&mut self, stmt: &ImportStmt) -> RuntimeResult<Option<FlowSignal>> {
        let source =
            platform()
                .read_source(&stmt.path)
                .map_err(|reason| RuntimeError::ImportFailed {
                    path: stmt.path.clone(),
                    reason,
                })?;

        let statements = match parse_program(&source) {
            Ok(statements) => statements,
            Err(errors) => {
                diagnostics::emit_syntax_errors(&stmt.path, &source, &errors);
                return Err(RuntimeError::ImportFailed {
                    path: stmt.path.clone(),
                    reason: format!("{} syntax error(s)", errors.errors.len()),
                });
            }
        };

        // The module runs against a fresh root scope but shares this
        // engine's heap and tables.
        let mut module = Interpreter::with_shared(
            self.heap.clone(),
            self.types.clone(),
            self.methods.clone(),
            self.output.clone(),
        );
        module.interpret(&statements);

        let module_value = StructValue::new("Module");
        for (name, value) in module.environment.exports() {
            module_value.set(&name, value);
        }
        if let Some(prior) =
            self.environment
                .define(&stmt.alias, Value::Struct(module_value), false)
        {
            prior.release(&self.heap)?;
        }
        Ok(None)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> RuntimeResult<Value> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => Err(RuntimeError::OperandType {
                message: "Operands must be two numbers or two strings.".to_string(),
            }),
        },
        BinaryOp::Eq => Ok(Value::Bool(left.eq_value(&right))),
        BinaryOp::NotEq => Ok(Value::Bool(!left.eq_value(&right))),
        _ => {
            let (a, b) = match (left, right) {
                (Value::Int(a), Value::Int(b)) => (a, b),
                _ => {
                    return Err(RuntimeError::OperandType {
                        message: format!("'{}' operands must be numbers.", op.symbol()),
                    });
                }
            };
            match op {
                BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(b))),
                BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(b))),
                BinaryOp::Div => {
                    if b == 0 {
                        Err(RuntimeError::DivisionByZero)
                    } else {
                        Ok(Value::Int(a.wrapping_div(b)))
                    }
                }
                BinaryOp::Less => Ok(Value::Bool(a < b)),
                BinaryOp::LessEq => Ok(Value::Bool(a <= b)),
                BinaryOp::Greater => Ok(Value::Bool(a > b)),
                BinaryOp::GreaterEq => Ok(Value::Bool(a >= b)),
                BinaryOp::Add | BinaryOp::Eq | BinaryOp::NotEq => unreachable!(),
            }
        }
    }
}

fn native_error(message: &str) -> RuntimeError {
    RuntimeError::Native {
        message: message.to_string(),
    }
}

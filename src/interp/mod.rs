pub(crate) mod convert;
pub(crate) mod frame;
pub(crate) mod props;
mod step_expr;
mod step_stmt;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crate::ast::{Node, NodeKind, SourceKind};
use crate::globals::regexp::RegexFinish;
use crate::globals::Protos;
use crate::parser::parse_program;
use crate::regex_backend::{RegexResponse, RegexpMode};
use crate::scope::{ScopeArena, ScopeData, ScopeRef};
use crate::value::{
    Attributes, Callable, ClassTag, Heap, JsObject, JsStr, ObjectRef, Property, Value,
    NONENUMERABLE, READONLY_NONENUMERABLE, VARIABLE,
};
use crate::{Error, Result};

use frame::{Completion, CompletionKind, Frame, Outcome, Scratch};

/// Tunable limits; the exact knob set of the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub regexp_mode: RegexpMode,
    /// Wall-clock bound for one sandboxed regex call.
    pub regexp_thread_timeout: Duration,
    /// Budget for coalescing polyfill micro-steps inside one `step`.
    pub polyfill_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            regexp_mode: RegexpMode::default(),
            regexp_thread_timeout: Duration::from_millis(1000),
            polyfill_timeout: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Runnable,
    Paused,
    Done,
}

/// Completion token for an async native function; the host finishes the
/// suspended call through `Interpreter::resolve_async` / `reject_async`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncHandle {
    pub(crate) id: u64,
}

/// Arguments delivered to a native function.
#[derive(Debug, Clone)]
pub struct NativeCall {
    pub this: Value,
    pub args: Vec<Value>,
    pub called_with_new: bool,
}

impl NativeCall {
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Undefined)
    }
}

/// Control-flow sentinel: an interpreted throw has already been routed
/// through `unwind`; the step loop simply continues.
#[derive(Debug, Clone, Copy)]
pub struct Abort;

pub(crate) enum StepOutcome {
    Push(Frame),
    Replace(Frame),
    Pop(Option<Outcome>),
    Stay,
}

pub(crate) type StepResult = std::result::Result<StepOutcome, Abort>;

/// Bounded debug log in the shape of the harness trace ring.
#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
    pub(crate) to_stderr: bool,
}

impl Default for TraceState {
    fn default() -> Self {
        TraceState {
            enabled: false,
            logs: VecDeque::new(),
            log_limit: 10_000,
            to_stderr: false,
        }
    }
}

impl TraceState {
    fn push(&mut self, message: String) {
        if !self.enabled {
            return;
        }
        if self.to_stderr {
            eprintln!("[sandscript] {}", message);
        }
        if self.logs.len() >= self.log_limit {
            self.logs.pop_front();
        }
        self.logs.push_back(message);
    }
}

pub(crate) struct PendingRegexJob {
    pub(crate) task_id: u64,
    pub(crate) deadline: Instant,
    pub(crate) rx: Receiver<RegexResponse>,
    pub(crate) finish: RegexFinish,
}

/// An async native staged for invocation once its call frame is back on the
/// stack (so a synchronous resolve can find it).
pub(crate) struct PendingInvoke {
    pub(crate) func: Rc<crate::value::AsyncFnBox>,
    pub(crate) call: NativeCall,
    pub(crate) handle: AsyncHandle,
}

/// `Function.prototype.apply`/`call` rewrite the active call frame instead
/// of invoking anything themselves.
pub(crate) struct Reinvoke {
    pub(crate) func: Value,
    pub(crate) this: Value,
    pub(crate) args: Vec<Value>,
}

pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) scopes: ScopeArena,
    pub(crate) stack: Vec<Frame>,
    pub(crate) global_scope: ScopeRef,
    pub(crate) global_object: ObjectRef,
    pub(crate) protos: Protos,
    pub(crate) value: Value,
    pub(crate) paused: bool,
    pub(crate) pending_throw: Option<Value>,
    pub(crate) fatal: Option<Error>,
    pub(crate) config: Config,
    pub(crate) next_wrapper_id: u64,
    pub(crate) next_task_id: u64,
    pub(crate) pending_regex: Option<PendingRegexJob>,
    pub(crate) pending_async_invoke: Option<PendingInvoke>,
    pub(crate) pending_reinvoke: Option<Reinvoke>,
    pub(crate) string_cycles: Vec<ObjectRef>,
    pub(crate) rng_state: u64,
    pub(crate) trace: TraceState,
}

pub type InitHook<'a> = Box<dyn FnOnce(&mut Interpreter, ObjectRef) + 'a>;

impl Interpreter {
    pub fn new(code: &str) -> Result<Interpreter> {
        Self::build(code, Config::default(), None)
    }

    pub fn with_config(code: &str, config: Config) -> Result<Interpreter> {
        Self::build(code, config, None)
    }

    /// `init` runs after the built-in world exists and before any user code
    /// evaluates; use it to wire host functions onto the global object.
    pub fn new_with_init(code: &str, init: InitHook<'_>) -> Result<Interpreter> {
        Self::build(code, Config::default(), Some(init))
    }

    pub fn with_config_and_init(
        code: &str,
        config: Config,
        init: InitHook<'_>,
    ) -> Result<Interpreter> {
        Self::build(code, config, Some(init))
    }

    /// Accepts a pre-parsed program instead of source text.
    pub fn from_ast(program: Rc<Node>, config: Config) -> Result<Interpreter> {
        if !matches!(program.kind, NodeKind::Program { .. }) {
            return Err(Error::Syntax("expected a program root node".to_string()));
        }
        let mut interp = Self::empty(config);
        crate::globals::init(&mut interp);
        interp.run_polyfills()?;
        interp.prepare_program(&program);
        Ok(interp)
    }

    fn build(code: &str, config: Config, init: Option<InitHook<'_>>) -> Result<Interpreter> {
        let program = parse_program(code, SourceKind::User)
            .map_err(|err| Error::Syntax(err.to_string()))?;
        let mut interp = Self::empty(config);
        crate::globals::init(&mut interp);
        if let Some(init) = init {
            let global = interp.global_object;
            init(&mut interp, global);
        }
        interp.run_polyfills()?;
        interp.prepare_program(&program);
        Ok(interp)
    }

    fn empty(config: Config) -> Interpreter {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e3779b97f4a7c15)
            | 1;
        Interpreter {
            heap: Heap::default(),
            scopes: ScopeArena::default(),
            stack: Vec::new(),
            global_scope: ScopeRef(0),
            global_object: ObjectRef(0),
            protos: Protos::placeholder(),
            value: Value::Undefined,
            paused: false,
            pending_throw: None,
            fatal: None,
            config,
            next_wrapper_id: 1,
            next_task_id: 1,
            pending_regex: None,
            pending_async_invoke: None,
            pending_reinvoke: None,
            string_cycles: Vec::new(),
            rng_state: seed,
            trace: TraceState::default(),
        }
    }

    fn run_polyfills(&mut self) -> Result<()> {
        for source in crate::globals::polyfills::SOURCES {
            let program = parse_program(source, SourceKind::Polyfill)
                .map_err(|err| Error::Syntax(format!("startup code: {}", err)))?;
            self.populate_scope(&program, self.global_scope);
            self.stack = vec![Frame::for_node(&program, self.global_scope)];
            while self.step()? {}
        }
        self.stack.clear();
        self.value = Value::Undefined;
        Ok(())
    }

    fn prepare_program(&mut self, program: &Rc<Node>) {
        if let NodeKind::Program { body } = &program.kind {
            if body
                .first()
                .map(|stmt| stmt.kind.is_use_strict_directive())
                .unwrap_or(false)
            {
                self.scopes.get_mut(self.global_scope).strict = true;
            }
        }
        self.populate_scope(program, self.global_scope);
        self.stack = vec![Frame::for_node(program, self.global_scope)];
    }

    /// Parses more source and extends the never-popped program frame, so a
    /// finished interpreter can pick up additional statements.
    pub fn append_code(&mut self, code: &str) -> Result<()> {
        let program = parse_program(code, SourceKind::User)
            .map_err(|err| Error::Syntax(err.to_string()))?;
        let NodeKind::Program { body } = &program.kind else {
            unreachable!();
        };
        let appended = body.clone();
        self.populate_scope(&program, self.global_scope);
        let Some(Frame {
            scratch: Scratch::Program { body, done, .. },
            ..
        }) = self.stack.first_mut()
        else {
            return Err(Error::Runtime(
                "cannot append code: no program frame".to_string(),
            ));
        };
        body.extend(appended);
        *done = false;
        self.trace.push(format!("appended {} statements", body.len()));
        Ok(())
    }

    pub fn status(&self) -> Status {
        if self.paused {
            Status::Paused
        } else if self.terminated() {
            Status::Done
        } else {
            Status::Runnable
        }
    }

    /// The value of the last completed expression statement.
    pub fn value(&self) -> Value {
        self.value.clone()
    }

    pub fn global_object(&self) -> ObjectRef {
        self.global_object
    }

    pub fn global_scope(&self) -> ScopeRef {
        self.global_scope
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.trace.enabled = enabled;
    }

    pub fn trace_logs(&self) -> Vec<String> {
        self.trace.logs.iter().cloned().collect()
    }

    pub(crate) fn terminated(&self) -> bool {
        match self.stack.last() {
            Some(Frame {
                scratch: Scratch::Program { done, .. },
                ..
            }) => *done,
            Some(_) => false,
            None => true,
        }
    }

    /// Advances until the program ends or suspends; `true` means paused.
    pub fn run(&mut self) -> Result<bool> {
        loop {
            if !self.step()? {
                return Ok(false);
            }
            if self.paused && self.pending_regex.is_none() {
                return Ok(true);
            }
        }
    }

    /// Executes one user-visible statement, absorbing polyfill micro-steps
    /// up to the configured budget. `false` means the program terminated.
    pub fn step(&mut self) -> Result<bool> {
        if self.paused {
            self.service_pending_regex()?;
            if self.paused {
                return Ok(true);
            }
        }
        if let Some(thrown) = self.pending_throw.take() {
            let _ = self.throw_value(thrown);
        }
        if let Some(error) = self.fatal.take() {
            return Err(error);
        }
        if self.terminated() {
            return Ok(false);
        }

        let deadline = Instant::now() + self.config.polyfill_timeout;
        loop {
            if self.paused || self.terminated() {
                break;
            }
            let Some(mut current) = self.stack.pop() else {
                break;
            };
            let was_polyfill = current.polyfill;
            let result = self.dispatch(&mut current);
            match result {
                Ok(StepOutcome::Push(child)) => {
                    self.stack.push(current);
                    self.stack.push(child);
                }
                Ok(StepOutcome::Replace(child)) => {
                    self.stack.push(child);
                }
                Ok(StepOutcome::Stay) => {
                    self.stack.push(current);
                }
                Ok(StepOutcome::Pop(deposit)) => {
                    if let Some(outcome) = deposit {
                        if let Some(parent) = self.stack.last_mut() {
                            parent.value = outcome;
                        }
                    }
                }
                Err(Abort) => {
                    // The completion has been unwound; the frame is gone.
                }
            }
            if let Some(invoke) = self.pending_async_invoke.take() {
                if (invoke.func)(self, invoke.call, invoke.handle).is_err() {
                    // The throw already unwound past the suspended call.
                    self.paused = false;
                }
            }
            if let Some(error) = self.fatal.take() {
                return Err(error);
            }
            if !(was_polyfill && Instant::now() < deadline) {
                break;
            }
        }
        Ok(true)
    }

    fn dispatch(&mut self, frame: &mut Frame) -> StepResult {
        match &frame.scratch {
            Scratch::Program { .. } => self.step_program(frame),
            Scratch::EvalProgram { .. } => self.step_eval_program(frame),
            Scratch::Block { .. } => self.step_block(frame),
            Scratch::ExpressionStatement { .. } => self.step_expression_statement(frame),
            Scratch::NoOp => Ok(StepOutcome::Pop(None)),
            Scratch::VarDecl { .. } => self.step_variable_declaration(frame),
            Scratch::Conditional { .. } => self.step_conditional(frame),
            Scratch::Logical { .. } => self.step_logical(frame),
            Scratch::Binary { .. } => self.step_binary(frame),
            Scratch::Unary { .. } => self.step_unary(frame),
            Scratch::Update { .. } => self.step_update(frame),
            Scratch::Assign { .. } => self.step_assignment(frame),
            Scratch::Member { .. } => self.step_member(frame),
            Scratch::Sequence { .. } => self.step_sequence(frame),
            Scratch::ArrayLit { .. } => self.step_array_literal(frame),
            Scratch::ObjectLit(_) => self.step_object_literal(frame),
            Scratch::FunctionExpr => self.step_function_expression(frame),
            Scratch::Identifier { .. } => self.step_identifier(frame),
            Scratch::Literal => self.step_literal(frame),
            Scratch::This => self.step_this(frame),
            Scratch::Call(_) => self.step_call(frame),
            Scratch::While { .. } => self.step_while(frame),
            Scratch::For { .. } => self.step_for(frame),
            Scratch::ForIn(_) => self.step_for_in(frame),
            Scratch::Switch(_) => self.step_switch(frame),
            Scratch::Try(_) => self.step_try(frame),
            Scratch::Catch { .. } => self.step_catch(frame),
            Scratch::Return { .. } => self.step_return(frame),
            Scratch::Throw { .. } => self.step_throw(frame),
            Scratch::BreakStatement => self.step_break(frame),
            Scratch::ContinueStatement => self.step_continue(frame),
            Scratch::Labeled => self.step_labeled(frame),
            Scratch::With { .. } => self.step_with(frame),
        }
    }

    // ---- completions -----------------------------------------------------

    pub(crate) fn throw_value(&mut self, value: Value) -> Abort {
        self.unwind(Completion {
            kind: CompletionKind::Throw,
            value,
            label: None,
        });
        Abort
    }

    pub(crate) fn unwind(&mut self, completion: Completion) {
        while let Some(top) = self.stack.last_mut() {
            match &mut top.scratch {
                Scratch::Try(try_scratch) => {
                    try_scratch.cv = Some(completion);
                    return;
                }
                Scratch::Call(_) => match completion.kind {
                    CompletionKind::Return => {
                        top.value = Outcome::Value(completion.value);
                        return;
                    }
                    CompletionKind::Throw => {}
                    _ => {
                        self.fatal = Some(Error::Runtime(
                            "break or continue crossed a call boundary".to_string(),
                        ));
                        return;
                    }
                },
                Scratch::Program { done, .. } => {
                    *done = true;
                    break;
                }
                _ => {}
            }
            match completion.kind {
                CompletionKind::Break => {
                    let handles = match &completion.label {
                        Some(label) => top.labels.iter().any(|l| l == label),
                        None => top.is_loop() || top.is_switch(),
                    };
                    if handles {
                        self.stack.pop();
                        return;
                    }
                }
                CompletionKind::Continue => {
                    let handles = match &completion.label {
                        Some(label) => {
                            top.labels.iter().any(|l| l == label) && top.is_loop()
                        }
                        None => top.is_loop(),
                    };
                    if handles {
                        // The loop frame stays; its step resumes at the
                        // update/test phase.
                        return;
                    }
                }
                _ => {}
            }
            self.stack.pop();
        }
        // Nothing handled the completion; the program is over.
        let error = match completion.kind {
            CompletionKind::Throw => self.thrown_to_error(&completion.value),
            other => Error::Runtime(format!("unhandled completion: {:?}", other)),
        };
        self.trace.push(format!("terminated: {}", error));
        self.fatal = Some(error);
    }

    /// Maps an uncaught interpreted value onto the matching host error.
    fn thrown_to_error(&mut self, value: &Value) -> Error {
        if let Value::Object(obj) = value {
            if self.heap.get(*obj).class == ClassTag::Error {
                let name = self
                    .peek_through_proto(*obj, "name")
                    .map(|v| self.to_display(&v))
                    .unwrap_or_default();
                let message = self
                    .peek_through_proto(*obj, "message")
                    .map(|v| self.to_display(&v))
                    .unwrap_or_default();
                return match name.as_str() {
                    "TypeError" => Error::Type(message),
                    "RangeError" => Error::Range(message),
                    "ReferenceError" => Error::Reference(message),
                    "SyntaxError" => Error::Syntax(message),
                    "EvalError" => Error::Eval(message),
                    "URIError" => Error::Uri(message),
                    _ => Error::Runtime(format!("{}: {}", name, message)),
                };
            }
        }
        Error::Runtime(self.to_display(value))
    }

    pub(crate) fn throw_error_object(&mut self, proto: ObjectRef, message: String) -> Abort {
        let error = self.create_error(proto, &message);
        self.throw_value(Value::Object(error))
    }

    pub(crate) fn throw_type_error(&mut self, message: impl Into<String>) -> Abort {
        let proto = self.protos.type_error_proto;
        self.throw_error_object(proto, message.into())
    }

    pub(crate) fn throw_range_error(&mut self, message: impl Into<String>) -> Abort {
        let proto = self.protos.range_error_proto;
        self.throw_error_object(proto, message.into())
    }

    pub(crate) fn throw_reference_error(&mut self, message: impl Into<String>) -> Abort {
        let proto = self.protos.reference_error_proto;
        self.throw_error_object(proto, message.into())
    }

    pub(crate) fn throw_syntax_error(&mut self, message: impl Into<String>) -> Abort {
        let proto = self.protos.syntax_error_proto;
        self.throw_error_object(proto, message.into())
    }

    pub(crate) fn throw_uri_error(&mut self, message: impl Into<String>) -> Abort {
        let proto = self.protos.uri_error_proto;
        self.throw_error_object(proto, message.into())
    }

    pub(crate) fn throw_plain_error(&mut self, message: impl Into<String>) -> Abort {
        let proto = self.protos.error_proto;
        self.throw_error_object(proto, message.into())
    }

    // ---- async suspension ------------------------------------------------

    pub(crate) fn allocate_task_id(&mut self) -> u64 {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    /// Deposits the value into the suspended call and clears the pause
    /// latch. Returns false when nothing was waiting on this handle.
    pub fn resolve_async(&mut self, handle: AsyncHandle, value: Value) -> bool {
        self.resolve_task(handle.id, value)
    }

    /// Like `resolve_async`, but the value is raised into the interpreted
    /// world at the next resumed step.
    pub fn reject_async(&mut self, handle: AsyncHandle, value: Value) -> bool {
        if self.resolve_task(handle.id, Value::Undefined) {
            self.pending_throw = Some(value);
            true
        } else {
            false
        }
    }

    pub(crate) fn resolve_task(&mut self, id: u64, value: Value) -> bool {
        for frame in self.stack.iter_mut().rev() {
            if let Scratch::Call(call) = &mut frame.scratch {
                if call.waiting_task == Some(id) {
                    call.waiting_task = None;
                    frame.value = Outcome::Value(value);
                    self.paused = false;
                    self.trace.push(format!("resumed task {}", id));
                    return true;
                }
            }
        }
        false
    }

    /// Blocks on the internal regex worker up to its deadline, resuming the
    /// interpreter with either the result or a timeout error.
    fn service_pending_regex(&mut self) -> Result<()> {
        let Some(job) = self.pending_regex.take() else {
            return Ok(());
        };
        let remaining = job.deadline.saturating_duration_since(Instant::now());
        let outcome = job.rx.recv_timeout(remaining);
        match outcome {
            Ok(RegexResponse::Budget) | Err(_) => {
                self.resolve_task(job.task_id, Value::Null);
                let proto = self.protos.error_proto;
                let error = self.create_error(proto, "RegExp Timeout");
                self.pending_throw = Some(Value::Object(error));
                self.trace.push("regexp timeout".to_string());
            }
            Ok(RegexResponse::Error(message)) => {
                self.resolve_task(job.task_id, Value::Null);
                let proto = self.protos.error_proto;
                let error = self.create_error(proto, &message);
                self.pending_throw = Some(Value::Object(error));
            }
            Ok(response) => {
                let value = crate::globals::regexp::finish(self, job.finish, response);
                self.resolve_task(job.task_id, value);
            }
        }
        Ok(())
    }

    // ---- scopes ----------------------------------------------------------

    /// A function or program scope: fresh null-proto variable object, strict
    /// if the parent is strict or the body opens with "use strict".
    pub(crate) fn create_scope(&mut self, body: &Rc<Node>, parent: Option<ScopeRef>) -> ScopeRef {
        let directive = match &body.kind {
            NodeKind::Program { body } | NodeKind::BlockStatement { body } => body
                .first()
                .map(|stmt| stmt.kind.is_use_strict_directive())
                .unwrap_or(false),
            _ => false,
        };
        let strict = parent.map(|p| self.scopes.get(p).strict).unwrap_or(false) || directive;
        let object = match parent {
            Some(_) => self.heap.alloc(JsObject::with_proto(None)),
            None => self.global_object,
        };
        self.scopes.alloc(ScopeData {
            parent,
            strict,
            object,
            with_scope: false,
        })
    }

    /// Catch and with scopes: no hoisting, object supplied or fresh.
    pub(crate) fn create_special_scope(
        &mut self,
        parent: ScopeRef,
        object: Option<ObjectRef>,
        with_scope: bool,
    ) -> ScopeRef {
        let strict = self.scopes.get(parent).strict;
        let object = object.unwrap_or_else(|| self.heap.alloc(JsObject::with_proto(None)));
        self.scopes.alloc(ScopeData {
            parent: Some(parent),
            strict,
            object,
            with_scope,
        })
    }

    /// Hoisting pre-walk: installs `undefined` for every `var` declarator
    /// and a constructed function object for every function declaration,
    /// without descending into nested function bodies.
    pub(crate) fn populate_scope(&mut self, node: &Rc<Node>, scope: ScopeRef) {
        match &node.kind {
            NodeKind::VariableDeclaration { declarations } => {
                for declarator in declarations {
                    self.declare_variable(scope, &declarator.name, Value::Undefined, false);
                }
            }
            NodeKind::FunctionDeclaration { name, .. } => {
                let func = self.create_function(node, scope, None);
                self.declare_variable(scope, name, Value::Object(func), true);
            }
            NodeKind::Program { body } | NodeKind::BlockStatement { body } => {
                for stmt in body {
                    self.populate_scope(stmt, scope);
                }
            }
            NodeKind::IfStatement {
                consequent,
                alternate,
                ..
            } => {
                self.populate_scope(consequent, scope);
                if let Some(alternate) = alternate {
                    self.populate_scope(alternate, scope);
                }
            }
            NodeKind::LabeledStatement { body, .. }
            | NodeKind::WithStatement { body, .. }
            | NodeKind::WhileStatement { body, .. }
            | NodeKind::DoWhileStatement { body, .. } => {
                self.populate_scope(body, scope);
            }
            NodeKind::ForStatement { init, body, .. } => {
                if let Some(init) = init {
                    self.populate_scope(init, scope);
                }
                self.populate_scope(body, scope);
            }
            NodeKind::ForInStatement { left, body, .. } => {
                self.populate_scope(left, scope);
                self.populate_scope(body, scope);
            }
            NodeKind::SwitchStatement { cases, .. } => {
                for case in cases {
                    for stmt in &case.consequent {
                        self.populate_scope(stmt, scope);
                    }
                }
            }
            NodeKind::TryStatement {
                block,
                handler,
                finalizer,
            } => {
                self.populate_scope(block, scope);
                if let Some(handler) = handler {
                    if let NodeKind::CatchClause { body, .. } = &handler.kind {
                        self.populate_scope(body, scope);
                    }
                }
                if let Some(finalizer) = finalizer {
                    self.populate_scope(finalizer, scope);
                }
            }
            _ => {}
        }
    }

    /// Raw scope-object write for declarations: never trips setters.
    pub(crate) fn declare_variable(
        &mut self,
        scope: ScopeRef,
        name: &str,
        value: Value,
        overwrite: bool,
    ) {
        let object = self.scopes.get(scope).object;
        let properties = &mut self.heap.get_mut(object).properties;
        if properties.contains(name) {
            if let Some(existing) = properties.get_mut(name) {
                if overwrite && existing.writable {
                    existing.value = value;
                    existing.getter = None;
                    existing.setter = None;
                }
            }
        } else {
            // Bindings are enumerable and writable but never deletable.
            properties.set(Rc::from(name), Property::with_attributes(value, VARIABLE));
        }
    }

    // ---- object construction --------------------------------------------

    pub(crate) fn create_object(&mut self, proto: Option<ObjectRef>) -> ObjectRef {
        self.heap.alloc(JsObject::with_proto(proto))
    }

    pub(crate) fn create_plain_object(&mut self) -> ObjectRef {
        let proto = self.protos.object_proto;
        self.create_object(Some(proto))
    }

    pub(crate) fn create_array(&mut self) -> ObjectRef {
        let proto = self.protos.array_proto;
        let array = self.create_object(Some(proto));
        self.heap.get_mut(array).class = ClassTag::Array;
        self.heap.get_mut(array).properties.set(
            Rc::from("length"),
            Property {
                value: Value::Number(0.0),
                writable: true,
                enumerable: false,
                configurable: false,
                getter: None,
                setter: None,
            },
        );
        array
    }

    pub(crate) fn create_error(&mut self, proto: ObjectRef, message: &str) -> ObjectRef {
        let error = self.create_object(Some(proto));
        self.heap.get_mut(error).class = ClassTag::Error;
        if !message.is_empty() {
            self.define_property(
                error,
                Rc::from("message"),
                Value::string(message),
                NONENUMERABLE,
            );
        }
        error
    }

    pub(crate) fn define_property(
        &mut self,
        obj: ObjectRef,
        name: JsStr,
        value: Value,
        attributes: Attributes,
    ) {
        self.heap
            .get_mut(obj)
            .properties
            .set(name, Property::with_attributes(value, attributes));
    }

    /// Builds a function object over an AST node closed over `scope`.
    pub(crate) fn create_function(
        &mut self,
        node: &Rc<Node>,
        scope: ScopeRef,
        display_name: Option<JsStr>,
    ) -> ObjectRef {
        let (name, param_count) = match &node.kind {
            NodeKind::FunctionDeclaration { name, params, .. } => {
                (Some(Rc::clone(name)), params.len())
            }
            NodeKind::FunctionExpression { name, params, .. } => {
                (name.clone().or(display_name), params.len())
            }
            _ => (display_name, 0),
        };
        let proto = self.protos.function_proto;
        let func = self.create_object(Some(proto));
        {
            let object = self.heap.get_mut(func);
            object.class = ClassTag::Function;
            object.callable = Some(Callable::Ast {
                node: Rc::clone(node),
                parent_scope: scope,
            });
        }
        self.define_property(
            func,
            Rc::from("length"),
            Value::Number(param_count as f64),
            READONLY_NONENUMERABLE,
        );
        self.define_property(
            func,
            Rc::from("name"),
            Value::String(name.unwrap_or_else(|| Rc::from(""))),
            READONLY_NONENUMERABLE,
        );
        let prototype = self.create_plain_object();
        self.define_property(
            prototype,
            Rc::from("constructor"),
            Value::Object(func),
            NONENUMERABLE,
        );
        self.define_property(
            func,
            Rc::from("prototype"),
            Value::Object(prototype),
            NONENUMERABLE,
        );
        func
    }

    pub(crate) fn allocate_wrapper_id(&mut self) -> u64 {
        let id = self.next_wrapper_id;
        self.next_wrapper_id += 1;
        id
    }

    pub(crate) fn next_random(&mut self) -> f64 {
        // xorshift64*, seeded at construction.
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        let bits = x.wrapping_mul(0x2545f4914f6cdd1d) >> 11;
        bits as f64 / (1u64 << 53) as f64
    }

    // ---- host-facing property access ------------------------------------

    /// Prototype-aware read for host wiring; accessors yield their stored
    /// slot rather than running interpreted code.
    pub fn get_property(&mut self, obj: ObjectRef, name: &str) -> Value {
        self.peek_through_proto(obj, name).unwrap_or(Value::Undefined)
    }

    /// Defines a plain data property from the host, maintaining array
    /// length bookkeeping.
    pub fn set_property(&mut self, obj: ObjectRef, name: &str, value: Value) {
        self.define_data_property(obj, Rc::from(name), value);
    }
}

use std::rc::Rc;

use super::convert::to_boolean;
use super::frame::{
    Completion, CompletionKind, ForInStage, Frame, Outcome, RefBase, Reference, Scratch,
};
use super::props::PropSet;
use super::{Abort, Interpreter, StepOutcome, StepResult};
use crate::ast::NodeKind;
use crate::value::{JsStr, Value};

impl Interpreter {
    pub(crate) fn step_program(&mut self, frame: &mut Frame) -> StepResult {
        let scope = frame.scope;
        let Scratch::Program { body, index, done } = &mut frame.scratch else {
            unreachable!();
        };
        if let Some(node) = body.get(*index) {
            let node = Rc::clone(node);
            *index += 1;
            *done = false;
            return Ok(StepOutcome::Push(Frame::for_node(&node, scope)));
        }
        *done = true;
        // The program frame stays put so appended code can run later.
        Ok(StepOutcome::Stay)
    }

    pub(crate) fn step_eval_program(&mut self, frame: &mut Frame) -> StepResult {
        let scope = frame.scope;
        let Scratch::EvalProgram { body, index } = &mut frame.scratch else {
            unreachable!();
        };
        if let Some(node) = body.get(*index) {
            let node = Rc::clone(node);
            *index += 1;
            return Ok(StepOutcome::Push(Frame::for_node(&node, scope)));
        }
        // eval's result is the interpreter-level last expression value.
        Ok(StepOutcome::Pop(Some(Outcome::Value(self.value.clone()))))
    }

    pub(crate) fn step_block(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let scope = frame.scope;
        let NodeKind::BlockStatement { body } = &node.kind else {
            unreachable!();
        };
        let Scratch::Block { index } = &mut frame.scratch else {
            unreachable!();
        };
        if let Some(stmt) = body.get(*index) {
            *index += 1;
            return Ok(StepOutcome::Push(Frame::for_node(stmt, scope)));
        }
        Ok(StepOutcome::Pop(None))
    }

    pub(crate) fn step_expression_statement(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::ExpressionStatement { expression } = &node.kind else {
            unreachable!();
        };
        let Scratch::ExpressionStatement { done } = &mut frame.scratch else {
            unreachable!();
        };
        if !*done {
            *done = true;
            return Ok(StepOutcome::Push(Frame::for_node(expression, frame.scope)));
        }
        // Every completed expression statement is observable through
        // `value`, which is also how eval results surface.
        self.value = incoming.into_value();
        Ok(StepOutcome::Pop(None))
    }

    pub(crate) fn step_variable_declaration(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let NodeKind::VariableDeclaration { declarations } = &node.kind else {
            unreachable!();
        };
        let (mut index, pending) = match &frame.scratch {
            Scratch::VarDecl { index, pending } => (*index, *pending),
            _ => unreachable!(),
        };
        if pending {
            let name = Rc::clone(&declarations[index].name);
            // Declarations write the scope binding directly; setters on
            // same-named global properties never fire here.
            self.scope_declare_assign(scope, &name, incoming.into_value());
            index += 1;
        }
        while let Some(declarator) = declarations.get(index) {
            if let Some(init) = &declarator.init {
                frame.scratch = Scratch::VarDecl {
                    index,
                    pending: true,
                };
                let mut child = Frame::for_node(init, scope);
                child.destination_name = Some(Rc::clone(&declarator.name));
                return Ok(StepOutcome::Push(child));
            }
            index += 1;
        }
        Ok(StepOutcome::Pop(None))
    }

    /// Shared by `if` and the ternary operator; only the latter produces a
    /// value.
    pub(crate) fn step_conditional(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let (test, consequent, alternate, is_expression) = match &node.kind {
            NodeKind::IfStatement {
                test,
                consequent,
                alternate,
            } => (test, consequent, alternate.as_ref(), false),
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => (test, consequent, Some(alternate), true),
            _ => unreachable!(),
        };
        let Scratch::Conditional { mode } = &mut frame.scratch else {
            unreachable!();
        };
        match *mode {
            0 => {
                *mode = 1;
                Ok(StepOutcome::Push(Frame::for_node(test, scope)))
            }
            1 => {
                *mode = 2;
                if to_boolean(&incoming.into_value()) {
                    Ok(StepOutcome::Push(Frame::for_node(consequent, scope)))
                } else if let Some(alternate) = alternate {
                    Ok(StepOutcome::Push(Frame::for_node(alternate, scope)))
                } else if is_expression {
                    Ok(StepOutcome::Pop(Some(Outcome::undefined())))
                } else {
                    Ok(StepOutcome::Pop(None))
                }
            }
            _ => {
                if is_expression {
                    Ok(StepOutcome::Pop(Some(incoming)))
                } else {
                    Ok(StepOutcome::Pop(None))
                }
            }
        }
    }

    pub(crate) fn step_while(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let (test, body, is_do) = match &node.kind {
            NodeKind::WhileStatement { test, body } => (test, body, false),
            NodeKind::DoWhileStatement { body, test } => (test, body, true),
            _ => unreachable!(),
        };
        let Scratch::While {
            started,
            test_pending,
        } = &mut frame.scratch
        else {
            unreachable!();
        };
        if is_do && !*started {
            // do-while runs the body once before the first test.
            *started = true;
            return Ok(StepOutcome::Push(Frame::for_node(body, scope)));
        }
        if !*test_pending {
            *started = true;
            *test_pending = true;
            return Ok(StepOutcome::Push(Frame::for_node(test, scope)));
        }
        *test_pending = false;
        if to_boolean(&incoming.into_value()) {
            Ok(StepOutcome::Push(Frame::for_node(body, scope)))
        } else {
            Ok(StepOutcome::Pop(None))
        }
    }

    pub(crate) fn step_for(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let NodeKind::ForStatement {
            init,
            test,
            update,
            body,
        } = &node.kind
        else {
            unreachable!();
        };
        let Scratch::For { mode } = &mut frame.scratch else {
            unreachable!();
        };
        match *mode {
            0 => {
                *mode = 1;
                if let Some(init) = init {
                    return Ok(StepOutcome::Push(Frame::for_node(init, scope)));
                }
                Ok(StepOutcome::Stay)
            }
            1 => {
                *mode = 2;
                if let Some(test) = test {
                    return Ok(StepOutcome::Push(Frame::for_node(test, scope)));
                }
                Ok(StepOutcome::Stay)
            }
            2 => {
                *mode = 3;
                if test.is_some() && !to_boolean(&incoming.into_value()) {
                    return Ok(StepOutcome::Pop(None));
                }
                Ok(StepOutcome::Push(Frame::for_node(body, scope)))
            }
            _ => {
                *mode = 1;
                if let Some(update) = update {
                    return Ok(StepOutcome::Push(Frame::for_node(update, scope)));
                }
                Ok(StepOutcome::Stay)
            }
        }
    }

    pub(crate) fn step_for_in(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let NodeKind::ForInStatement { left, right, body } = &node.kind else {
            unreachable!();
        };

        let stage = match &frame.scratch {
            Scratch::ForIn(s) => s.stage,
            _ => unreachable!(),
        };

        match stage {
            ForInStage::Right => {
                if let Scratch::ForIn(s) = &mut frame.scratch {
                    s.stage = ForInStage::Init;
                }
                Ok(StepOutcome::Push(Frame::for_node(right, scope)))
            }
            ForInStage::Init => {
                let iteratee = incoming.into_value();
                match &iteratee {
                    Value::Undefined | Value::Null => return Ok(StepOutcome::Pop(None)),
                    Value::String(s) => {
                        let count = s.chars().count();
                        let proto = self.protos.string_proto;
                        if let Scratch::ForIn(scratch) = &mut frame.scratch {
                            scratch.level = None;
                            scratch.next = Some(proto);
                            scratch.pending =
                                (0..count).map(|i| JsStr::from(i.to_string())).collect();
                        }
                    }
                    Value::Object(obj) => {
                        let next = self.heap.get(*obj).proto;
                        let keys: std::collections::VecDeque<JsStr> =
                            self.heap.get(*obj).properties.keys().cloned().collect();
                        if let Scratch::ForIn(scratch) = &mut frame.scratch {
                            scratch.level = Some(*obj);
                            scratch.next = next;
                            scratch.pending = keys;
                        }
                    }
                    _ => {
                        // Numbers and booleans have no own enumerable
                        // properties and their prototypes expose none.
                        return Ok(StepOutcome::Pop(None));
                    }
                }
                self.for_in_advance(frame, left, body)
            }
            ForInStage::Ref => {
                let reference = incoming.into_ref();
                if let Scratch::ForIn(s) = &mut frame.scratch {
                    s.target = Some(reference);
                }
                self.for_in_store(frame, body)
            }
            ForInStage::Setter => {
                if let Scratch::ForIn(s) = &mut frame.scratch {
                    s.stage = ForInStage::Body;
                }
                Ok(StepOutcome::Push(Frame::for_node(body, frame.scope)))
            }
            ForInStage::Body => self.for_in_advance(frame, left, body),
        }
    }

    /// Pulls the next enumerable name, climbing the prototype chain and
    /// re-checking presence so mid-loop deletion is observed.
    fn for_in_advance(
        &mut self,
        frame: &mut Frame,
        left: &Rc<crate::ast::Node>,
        body: &Rc<crate::ast::Node>,
    ) -> StepResult {
        let produced: Option<JsStr> = loop {
            let Scratch::ForIn(s) = &mut frame.scratch else {
                unreachable!();
            };
            if s.exhausted {
                break None;
            }
            let Some(name) = s.pending.pop_front() else {
                match s.next.take() {
                    Some(obj) => {
                        s.level = Some(obj);
                        let object = self.heap.get(obj);
                        s.next = object.proto;
                        s.pending = object.properties.keys().cloned().collect();
                        continue;
                    }
                    None => {
                        s.exhausted = true;
                        break None;
                    }
                }
            };
            if s.visited.contains(&name) {
                continue;
            }
            s.visited.insert(Rc::clone(&name));
            match s.level {
                Some(owner) => {
                    // Names deleted since the snapshot are skipped; only
                    // enumerable survivors are produced.
                    if let Some(property) = self.heap.get(owner).properties.get(&name) {
                        if property.enumerable {
                            break Some(name);
                        }
                    }
                }
                None => break Some(name),
            }
        };

        let Some(name) = produced else {
            return Ok(StepOutcome::Pop(None));
        };
        if let Scratch::ForIn(s) = &mut frame.scratch {
            s.name = Some(name);
        }

        // Bind the produced name to the loop target.
        match &left.kind {
            NodeKind::VariableDeclaration { declarations } => {
                let target = Reference {
                    base: RefBase::Scope,
                    name: Rc::clone(&declarations[0].name),
                };
                if let Scratch::ForIn(s) = &mut frame.scratch {
                    s.target = Some(target);
                }
                self.for_in_store(frame, body)
            }
            _ => {
                if let Scratch::ForIn(s) = &mut frame.scratch {
                    s.stage = ForInStage::Ref;
                }
                let mut child = Frame::for_node(left, frame.scope);
                child.want_ref = true;
                Ok(StepOutcome::Push(child))
            }
        }
    }

    fn for_in_store(&mut self, frame: &mut Frame, body: &Rc<crate::ast::Node>) -> StepResult {
        let scope = frame.scope;
        let (target, name) = match &frame.scratch {
            Scratch::ForIn(s) => (
                s.target.clone().expect("for-in target"),
                s.name.clone().expect("for-in name"),
            ),
            _ => unreachable!(),
        };
        match self.ref_set(&target, Value::String(Rc::clone(&name)), scope)? {
            PropSet::Done => {
                if let Scratch::ForIn(s) = &mut frame.scratch {
                    s.stage = ForInStage::Body;
                }
                Ok(StepOutcome::Push(Frame::for_node(body, scope)))
            }
            PropSet::Setter {
                setter,
                this,
                value,
            } => {
                if let Scratch::ForIn(s) = &mut frame.scratch {
                    s.stage = ForInStage::Setter;
                }
                let child =
                    Frame::prepared_call(&frame.node, scope, Value::Object(setter), this, vec![value]);
                Ok(StepOutcome::Push(child))
            }
        }
    }

    pub(crate) fn step_switch(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let NodeKind::SwitchStatement {
            discriminant,
            cases,
        } = &node.kind
        else {
            unreachable!();
        };
        let Scratch::Switch(s) = &mut frame.scratch else {
            unreachable!();
        };

        if !s.discriminant_done {
            s.discriminant_done = true;
            return Ok(StepOutcome::Push(Frame::for_node(discriminant, scope)));
        }
        let mut incoming = Some(incoming);
        if !s.captured {
            s.captured = true;
            s.discriminant = incoming.take().map(Outcome::into_value).unwrap_or(Value::Undefined);
        }

        loop {
            let Some(case) = cases.get(s.index) else {
                if !s.matched {
                    if let Some(default_index) = s.default_index {
                        s.matched = true;
                        s.index = default_index;
                        s.stmt_index = 0;
                        continue;
                    }
                }
                return Ok(StepOutcome::Pop(None));
            };
            if !s.matched {
                match &case.test {
                    None => {
                        s.default_index = Some(s.index);
                        s.index += 1;
                        continue;
                    }
                    Some(test) => {
                        if !s.test_pending {
                            s.test_pending = true;
                            return Ok(StepOutcome::Push(Frame::for_node(test, scope)));
                        }
                        s.test_pending = false;
                        let test_value = incoming
                            .take()
                            .map(Outcome::into_value)
                            .unwrap_or(Value::Undefined);
                        if super::convert::strict_equals(&test_value, &s.discriminant) {
                            s.matched = true;
                            s.stmt_index = 0;
                        } else {
                            s.index += 1;
                        }
                        continue;
                    }
                }
            }
            if let Some(stmt) = case.consequent.get(s.stmt_index) {
                s.stmt_index += 1;
                return Ok(StepOutcome::Push(Frame::for_node(stmt, scope)));
            }
            s.index += 1;
            s.stmt_index = 0;
        }
    }

    pub(crate) fn step_try(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let scope = frame.scope;
        let NodeKind::TryStatement {
            block,
            handler,
            finalizer,
        } = &node.kind
        else {
            unreachable!();
        };
        let Scratch::Try(t) = &mut frame.scratch else {
            unreachable!();
        };

        if !t.block_done {
            t.block_done = true;
            return Ok(StepOutcome::Push(Frame::for_node(block, scope)));
        }
        let caught_throw = matches!(
            &t.cv,
            Some(Completion {
                kind: CompletionKind::Throw,
                ..
            })
        );
        if caught_throw && !t.handler_done && handler.is_some() {
            t.handler_done = true;
            let thrown = t.cv.take().map(|cv| cv.value).unwrap_or(Value::Undefined);
            let handler = handler.as_ref().expect("handler checked above");
            let mut child = Frame::for_node(handler, scope);
            if let Scratch::Catch { thrown: slot, .. } = &mut child.scratch {
                *slot = thrown;
            }
            return Ok(StepOutcome::Push(child));
        }
        if !t.finalizer_done {
            if let Some(finalizer) = finalizer {
                t.finalizer_done = true;
                return Ok(StepOutcome::Push(Frame::for_node(finalizer, scope)));
            }
        }
        if let Some(cv) = t.cv.take() {
            // No handler took it (or the handler/finalizer raised anew);
            // keep unwinding from here.
            self.unwind(cv);
            return Err(Abort);
        }
        Ok(StepOutcome::Pop(None))
    }

    pub(crate) fn step_catch(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let scope = frame.scope;
        let NodeKind::CatchClause { param, body } = &node.kind else {
            unreachable!();
        };
        let Scratch::Catch { thrown, done } = &mut frame.scratch else {
            unreachable!();
        };
        if !*done {
            *done = true;
            let thrown = std::mem::replace(thrown, Value::Undefined);
            // The binding lives in its own scope and is invisible outside
            // the catch block.
            let catch_scope = self.create_special_scope(scope, None, false);
            self.declare_variable(catch_scope, param, thrown, true);
            return Ok(StepOutcome::Push(Frame::for_node(body, catch_scope)));
        }
        Ok(StepOutcome::Pop(None))
    }

    pub(crate) fn step_return(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::ReturnStatement { argument } = &node.kind else {
            unreachable!();
        };
        let Scratch::Return { done } = &mut frame.scratch else {
            unreachable!();
        };
        if let Some(argument) = argument {
            if !*done {
                *done = true;
                return Ok(StepOutcome::Push(Frame::for_node(argument, frame.scope)));
            }
        }
        let value = if argument.is_some() {
            incoming.into_value()
        } else {
            Value::Undefined
        };
        self.unwind(Completion {
            kind: CompletionKind::Return,
            value,
            label: None,
        });
        Err(Abort)
    }

    pub(crate) fn step_throw(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::ThrowStatement { argument } = &node.kind else {
            unreachable!();
        };
        let Scratch::Throw { done } = &mut frame.scratch else {
            unreachable!();
        };
        if !*done {
            *done = true;
            return Ok(StepOutcome::Push(Frame::for_node(argument, frame.scope)));
        }
        let _ = self.throw_value(incoming.into_value());
        Err(Abort)
    }

    pub(crate) fn step_break(&mut self, frame: &mut Frame) -> StepResult {
        let NodeKind::BreakStatement { label } = &frame.node.kind else {
            unreachable!();
        };
        self.unwind(Completion {
            kind: CompletionKind::Break,
            value: Value::Undefined,
            label: label.clone(),
        });
        Err(Abort)
    }

    pub(crate) fn step_continue(&mut self, frame: &mut Frame) -> StepResult {
        let NodeKind::ContinueStatement { label } = &frame.node.kind else {
            unreachable!();
        };
        self.unwind(Completion {
            kind: CompletionKind::Continue,
            value: Value::Undefined,
            label: label.clone(),
        });
        Err(Abort)
    }

    pub(crate) fn step_labeled(&mut self, frame: &mut Frame) -> StepResult {
        let NodeKind::LabeledStatement { label, body } = &frame.node.kind else {
            unreachable!();
        };
        // The label set rides on the body frame; nothing to do on the way
        // back up, so this frame is replaced outright.
        let mut child = Frame::for_node(body, frame.scope);
        child.labels = frame.labels.clone();
        child.labels.push(Rc::clone(label));
        Ok(StepOutcome::Replace(child))
    }

    pub(crate) fn step_with(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let NodeKind::WithStatement { object, body } = &node.kind else {
            unreachable!();
        };
        let Scratch::With { mode } = &mut frame.scratch else {
            unreachable!();
        };
        match *mode {
            0 => {
                *mode = 1;
                Ok(StepOutcome::Push(Frame::for_node(object, scope)))
            }
            1 => {
                *mode = 2;
                let value = incoming.into_value();
                let Some(obj) = value.as_object() else {
                    return Err(self.throw_type_error("'with' requires an object"));
                };
                let with_scope = self.create_special_scope(scope, Some(obj), true);
                Ok(StepOutcome::Push(Frame::for_node(body, with_scope)))
            }
            _ => Ok(StepOutcome::Pop(None)),
        }
    }
}

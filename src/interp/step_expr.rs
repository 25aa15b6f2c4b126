use std::rc::Rc;

use super::convert::{strict_equals, to_boolean, to_int32, to_uint32, Coerced};
use super::frame::{
    AssignStage, CallStage, CoercePending, Frame, IdentifierStage, LitProp, MemberStage, Outcome,
    RefBase, Reference, Scratch, UpdateStage,
};
use super::props::{PropGet, PropSet};
use super::{Abort, Interpreter, PendingInvoke, StepOutcome, StepResult};
use crate::ast::{
    AssignOp, BinaryOp, LiteralValue, LogicalOp, Node, NodeKind, PropertyKind, UnaryOp, UpdateOp,
};
use crate::value::{Callable, Descriptor, JsStr, Value, READONLY};

impl Interpreter {
    pub(crate) fn step_identifier(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::Identifier { name } = &node.kind else {
            unreachable!();
        };
        if frame.want_ref {
            return Ok(StepOutcome::Pop(Some(Outcome::Ref(Reference {
                base: RefBase::Scope,
                name: Rc::clone(name),
            }))));
        }
        let Scratch::Identifier { stage } = &mut frame.scratch else {
            unreachable!();
        };
        match stage {
            IdentifierStage::Start => {
                // `typeof x` may look at unbound names without raising.
                let typeof_ok = matches!(
                    self.stack.last().map(|parent| &parent.node.kind),
                    Some(NodeKind::UnaryExpression {
                        operator: UnaryOp::TypeOf,
                        ..
                    })
                );
                match self.scope_get(frame.scope, name, typeof_ok)? {
                    PropGet::Value(value) => Ok(StepOutcome::Pop(Some(Outcome::Value(value)))),
                    PropGet::Getter { getter, this } => {
                        *stage = IdentifierStage::Getter;
                        let child = Frame::prepared_call(
                            &node,
                            frame.scope,
                            Value::Object(getter),
                            this,
                            Vec::new(),
                        );
                        Ok(StepOutcome::Push(child))
                    }
                }
            }
            IdentifierStage::Getter => {
                Ok(StepOutcome::Pop(Some(Outcome::Value(incoming.into_value()))))
            }
        }
    }

    pub(crate) fn step_literal(&mut self, frame: &mut Frame) -> StepResult {
        let NodeKind::Literal { value } = &frame.node.kind else {
            unreachable!();
        };
        let value = match value {
            LiteralValue::Null => Value::Null,
            LiteralValue::Boolean(b) => Value::Boolean(*b),
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::String(s) => Value::String(Rc::clone(s)),
            LiteralValue::Regex { pattern, flags } => {
                let pattern = Rc::clone(pattern);
                let flags = Rc::clone(flags);
                let obj = self.create_regexp_object(&pattern, &flags)?;
                Value::Object(obj)
            }
        };
        Ok(StepOutcome::Pop(Some(Outcome::Value(value))))
    }

    pub(crate) fn step_this(&mut self, frame: &mut Frame) -> StepResult {
        let value = match self.scope_get(frame.scope, "this", true)? {
            PropGet::Value(value) => value,
            PropGet::Getter { .. } => Value::Undefined,
        };
        Ok(StepOutcome::Pop(Some(Outcome::Value(value))))
    }

    pub(crate) fn step_sequence(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::SequenceExpression { expressions } = &node.kind else {
            unreachable!();
        };
        let Scratch::Sequence { index } = &mut frame.scratch else {
            unreachable!();
        };
        if let Some(expr) = expressions.get(*index) {
            *index += 1;
            return Ok(StepOutcome::Push(Frame::for_node(expr, frame.scope)));
        }
        Ok(StepOutcome::Pop(Some(incoming)))
    }

    pub(crate) fn step_logical(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::LogicalExpression {
            operator,
            left,
            right,
        } = &node.kind
        else {
            unreachable!();
        };
        let Scratch::Logical { mode } = &mut frame.scratch else {
            unreachable!();
        };
        match *mode {
            0 => {
                *mode = 1;
                Ok(StepOutcome::Push(Frame::for_node(left, frame.scope)))
            }
            1 => {
                let value = incoming.into_value();
                let truthy = to_boolean(&value);
                let short_circuit = match operator {
                    LogicalOp::And => !truthy,
                    LogicalOp::Or => truthy,
                };
                if short_circuit {
                    return Ok(StepOutcome::Pop(Some(Outcome::Value(value))));
                }
                *mode = 2;
                Ok(StepOutcome::Push(Frame::for_node(right, frame.scope)))
            }
            _ => Ok(StepOutcome::Pop(Some(incoming))),
        }
    }

    pub(crate) fn step_binary(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::BinaryExpression {
            operator,
            left,
            right,
        } = &node.kind
        else {
            unreachable!();
        };
        let operator = *operator;
        let mode = match &frame.scratch {
            Scratch::Binary { mode, .. } => *mode,
            _ => unreachable!(),
        };
        match mode {
            0 => {
                if let Scratch::Binary { mode, .. } = &mut frame.scratch {
                    *mode = 1;
                }
                Ok(StepOutcome::Push(Frame::for_node(left, frame.scope)))
            }
            1 => {
                if let Scratch::Binary { mode, left: slot, .. } = &mut frame.scratch {
                    *mode = 2;
                    *slot = incoming.into_value();
                }
                Ok(StepOutcome::Push(Frame::for_node(right, frame.scope)))
            }
            _ => {
                if mode == 2 {
                    if let Scratch::Binary { mode, right: slot, .. } = &mut frame.scratch {
                        *mode = 3;
                        *slot = incoming.into_value();
                    }
                } else if let Some(step) = self.binary_consume_coercion(frame, &node, incoming)? {
                    return Ok(step);
                }
                if let Some(step) = self.binary_coerce_operands(frame, &node, operator)? {
                    return Ok(step);
                }
                let (left_value, right_value) = match &mut frame.scratch {
                    Scratch::Binary { left, right, .. } => (
                        std::mem::replace(left, Value::Undefined),
                        std::mem::replace(right, Value::Undefined),
                    ),
                    _ => unreachable!(),
                };
                let result = self.binary_op(operator, &left_value, &right_value)?;
                Ok(StepOutcome::Pop(Some(Outcome::Value(result))))
            }
        }
    }

    /// Folds a returned `valueOf`/`toString` result back into the pending
    /// operand; a non-primitive result issues the next probe.
    fn binary_consume_coercion(
        &mut self,
        frame: &mut Frame,
        node: &Rc<Node>,
        incoming: Outcome,
    ) -> Result<Option<StepOutcome>, Abort> {
        let pending = match &mut frame.scratch {
            Scratch::Binary { coercing, .. } => coercing.take(),
            _ => unreachable!(),
        };
        let Some(pending) = pending else {
            return Ok(None);
        };
        let result = incoming.into_value();
        let value = if result.is_object() {
            let operand = match &frame.scratch {
                Scratch::Binary { left, right, .. } => {
                    if pending.target == 0 {
                        left.clone()
                    } else {
                        right.clone()
                    }
                }
                _ => unreachable!(),
            };
            let Value::Object(obj) = operand else {
                unreachable!("coercion pending on a primitive operand");
            };
            match self.to_primitive_step(obj, pending.hint_string, pending.attempt)? {
                Coerced::Done(value) => value,
                Coerced::Call {
                    func,
                    this,
                    next_attempt,
                } => {
                    if let Scratch::Binary { coercing, .. } = &mut frame.scratch {
                        *coercing = Some(CoercePending {
                            attempt: next_attempt,
                            ..pending
                        });
                    }
                    return Ok(Some(StepOutcome::Push(Frame::prepared_call(
                        node,
                        frame.scope,
                        Value::Object(func),
                        this,
                        Vec::new(),
                    ))));
                }
            }
        } else {
            result
        };
        if let Scratch::Binary { left, right, .. } = &mut frame.scratch {
            if pending.target == 0 {
                *left = value;
            } else {
                *right = value;
            }
        }
        Ok(None)
    }

    /// ES5 operand coercion ahead of the operator itself; `Some` means an
    /// interpreted `valueOf`/`toString` call was pushed and the frame will
    /// resume here.
    fn binary_coerce_operands(
        &mut self,
        frame: &mut Frame,
        node: &Rc<Node>,
        operator: BinaryOp,
    ) -> Result<Option<StepOutcome>, Abort> {
        loop {
            let (left_value, right_value) = match &frame.scratch {
                Scratch::Binary { left, right, .. } => (left.clone(), right.clone()),
                _ => unreachable!(),
            };
            let plan = self.binary_coercion_plan(operator, &left_value, &right_value);
            let mut progressed = false;
            for target in 0..2u8 {
                let Some(hint_string) = plan[target as usize] else {
                    continue;
                };
                let operand = if target == 0 { &left_value } else { &right_value };
                let Value::Object(obj) = operand else {
                    continue;
                };
                match self.to_primitive_step(*obj, hint_string, 0)? {
                    Coerced::Done(value) => {
                        if let Scratch::Binary { left, right, .. } = &mut frame.scratch {
                            if target == 0 {
                                *left = value;
                            } else {
                                *right = value;
                            }
                        }
                        progressed = true;
                        break;
                    }
                    Coerced::Call {
                        func,
                        this,
                        next_attempt,
                    } => {
                        if let Scratch::Binary { coercing, .. } = &mut frame.scratch {
                            *coercing = Some(CoercePending {
                                target,
                                hint_string,
                                attempt: next_attempt,
                            });
                        }
                        return Ok(Some(StepOutcome::Push(Frame::prepared_call(
                            node,
                            frame.scope,
                            Value::Object(func),
                            this,
                            Vec::new(),
                        ))));
                    }
                }
            }
            if !progressed {
                return Ok(None);
            }
        }
    }

    /// Which operands an operator converts to primitives, and with which
    /// hint. `None` = leave the operand alone.
    fn binary_coercion_plan(
        &self,
        operator: BinaryOp,
        left: &Value,
        right: &Value,
    ) -> [Option<bool>; 2] {
        let is_plain_primitive = |value: &Value| {
            matches!(
                value,
                Value::Number(_) | Value::String(_) | Value::Boolean(_)
            )
        };
        let mut plan = [None, None];
        match operator {
            BinaryOp::Add => {
                if left.is_object() {
                    plan[0] = Some(self.default_hint_is_string(left));
                }
                if right.is_object() {
                    plan[1] = Some(self.default_hint_is_string(right));
                }
            }
            BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::ShiftLeft
            | BinaryOp::ShiftRight
            | BinaryOp::UnsignedShiftRight
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                if left.is_object() {
                    plan[0] = Some(false);
                }
                if right.is_object() {
                    plan[1] = Some(false);
                }
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                // Only the object-versus-primitive comparisons coerce;
                // object/object is identity and object/null is false.
                if left.is_object() && is_plain_primitive(right) {
                    plan[0] = Some(self.default_hint_is_string(left));
                }
                if right.is_object() && is_plain_primitive(left) {
                    plan[1] = Some(self.default_hint_is_string(right));
                }
            }
            BinaryOp::In => {
                // The key stringifies only after the container check, so a
                // bad right side surfaces its TypeError first.
                if left.is_object() && right.is_object() {
                    plan[0] = Some(true);
                }
            }
            _ => {}
        }
        plan
    }

    pub(crate) fn binary_op(
        &mut self,
        operator: BinaryOp,
        left: &Value,
        right: &Value,
    ) -> Result<Value, Abort> {
        use std::cmp::Ordering;
        Ok(match operator {
            BinaryOp::Add => {
                let pl = self.to_primitive(left);
                let pr = self.to_primitive(right);
                if matches!(pl, Value::String(_)) || matches!(pr, Value::String(_)) {
                    let mut out = self.to_display(&pl);
                    out.push_str(&self.to_display(&pr));
                    Value::string(out)
                } else {
                    Value::Number(self.to_number(&pl) + self.to_number(&pr))
                }
            }
            BinaryOp::Sub => Value::Number(self.to_number(left) - self.to_number(right)),
            BinaryOp::Mul => Value::Number(self.to_number(left) * self.to_number(right)),
            BinaryOp::Div => Value::Number(self.to_number(left) / self.to_number(right)),
            BinaryOp::Mod => Value::Number(self.to_number(left) % self.to_number(right)),
            BinaryOp::ShiftLeft => {
                let shift = to_uint32(self.to_number(right)) & 31;
                Value::Number((to_int32(self.to_number(left)) << shift) as f64)
            }
            BinaryOp::ShiftRight => {
                let shift = to_uint32(self.to_number(right)) & 31;
                Value::Number((to_int32(self.to_number(left)) >> shift) as f64)
            }
            BinaryOp::UnsignedShiftRight => {
                let shift = to_uint32(self.to_number(right)) & 31;
                Value::Number((to_uint32(self.to_number(left)) >> shift) as f64)
            }
            BinaryOp::BitAnd => Value::Number(
                (to_int32(self.to_number(left)) & to_int32(self.to_number(right))) as f64,
            ),
            BinaryOp::BitOr => Value::Number(
                (to_int32(self.to_number(left)) | to_int32(self.to_number(right))) as f64,
            ),
            BinaryOp::BitXor => Value::Number(
                (to_int32(self.to_number(left)) ^ to_int32(self.to_number(right))) as f64,
            ),
            BinaryOp::Eq => Value::Boolean(self.loose_equals(left, right)),
            BinaryOp::Ne => Value::Boolean(!self.loose_equals(left, right)),
            BinaryOp::StrictEq => Value::Boolean(strict_equals(left, right)),
            BinaryOp::StrictNe => Value::Boolean(!strict_equals(left, right)),
            BinaryOp::Lt => Value::Boolean(matches!(
                self.loose_compare(left, right),
                Some(Ordering::Less)
            )),
            BinaryOp::Gt => Value::Boolean(matches!(
                self.loose_compare(left, right),
                Some(Ordering::Greater)
            )),
            BinaryOp::Le => Value::Boolean(matches!(
                self.loose_compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Ge => Value::Boolean(matches!(
                self.loose_compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::In => {
                if !right.is_object() {
                    let shown = self.to_display(right);
                    return Err(self.throw_type_error(format!(
                        "'in' expects an object, not '{}'",
                        shown
                    )));
                }
                let name = self.to_display(left);
                Value::Boolean(self.has_property(right, &name))
            }
            BinaryOp::InstanceOf => {
                let Some(ctor) = right.as_object() else {
                    return Err(self.throw_type_error(
                        "Right-hand side of 'instanceof' is not an object",
                    ));
                };
                if !self.heap.get(ctor).is_callable() {
                    return Err(self.throw_type_error(
                        "Right-hand side of 'instanceof' is not callable",
                    ));
                }
                let prototype = self.heap.get(ctor).peek("prototype").cloned();
                let Some(Value::Object(prototype)) = prototype else {
                    return Err(self.throw_type_error(
                        "Function has non-object prototype in instanceof check",
                    ));
                };
                let mut cursor = match left {
                    Value::Object(obj) => self.heap.get(*obj).proto,
                    _ => None,
                };
                let mut found = false;
                while let Some(link) = cursor {
                    if link == prototype {
                        found = true;
                        break;
                    }
                    cursor = self.heap.get(link).proto;
                }
                Value::Boolean(found)
            }
        })
    }

    pub(crate) fn step_unary(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::UnaryExpression { operator, argument } = &node.kind else {
            unreachable!();
        };
        let operator = *operator;
        {
            let Scratch::Unary { done, .. } = &mut frame.scratch else {
                unreachable!();
            };
            if !*done {
                *done = true;
                let mut child = Frame::for_node(argument, frame.scope);
                if operator == UnaryOp::Delete {
                    child.want_ref = true;
                }
                return Ok(StepOutcome::Push(child));
            }
        }
        let result = match operator {
            UnaryOp::Not => Value::Boolean(!to_boolean(&incoming.into_value())),
            UnaryOp::TypeOf => Value::string(self.type_of(&incoming.into_value())),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Delete => {
                let strict = self.scopes.get(frame.scope).strict;
                match incoming {
                    Outcome::Ref(reference) => match &reference.base {
                        RefBase::Scope => {
                            let deleted =
                                self.delete_scope_binding(frame.scope, &reference.name, strict)?;
                            Value::Boolean(deleted)
                        }
                        RefBase::Value(base) => {
                            let base = base.clone();
                            Value::Boolean(self.delete_prop(&base, &reference.name, strict)?)
                        }
                    },
                    // `delete 1` and friends: not a reference, trivially true.
                    Outcome::Value(_) => Value::Boolean(true),
                }
            }
            UnaryOp::Minus | UnaryOp::Plus | UnaryOp::BitNot => {
                // ToNumber starts with a number-hint ToPrimitive, which may
                // need an interpreted valueOf/toString round trip.
                let pending = match &mut frame.scratch {
                    Scratch::Unary { coercing, .. } => coercing.take(),
                    _ => unreachable!(),
                };
                let incoming_value = incoming.into_value();
                let primitive = if let Some(pending) = pending {
                    if incoming_value.is_object() {
                        let operand = match &frame.scratch {
                            Scratch::Unary { operand, .. } => operand.clone(),
                            _ => unreachable!(),
                        };
                        let Value::Object(obj) = operand else {
                            unreachable!("coercion pending on a primitive operand");
                        };
                        match self.to_primitive_step(obj, pending.hint_string, pending.attempt)? {
                            Coerced::Done(value) => value,
                            Coerced::Call {
                                func,
                                this,
                                next_attempt,
                            } => {
                                if let Scratch::Unary { coercing, .. } = &mut frame.scratch {
                                    *coercing = Some(CoercePending {
                                        attempt: next_attempt,
                                        ..pending
                                    });
                                }
                                return Ok(StepOutcome::Push(Frame::prepared_call(
                                    &node,
                                    frame.scope,
                                    Value::Object(func),
                                    this,
                                    Vec::new(),
                                )));
                            }
                        }
                    } else {
                        incoming_value
                    }
                } else if let Value::Object(obj) = incoming_value {
                    match self.to_primitive_step(obj, false, 0)? {
                        Coerced::Done(value) => value,
                        Coerced::Call {
                            func,
                            this,
                            next_attempt,
                        } => {
                            if let Scratch::Unary {
                                operand, coercing, ..
                            } = &mut frame.scratch
                            {
                                *operand = Value::Object(obj);
                                *coercing = Some(CoercePending {
                                    target: 0,
                                    hint_string: false,
                                    attempt: next_attempt,
                                });
                            }
                            return Ok(StepOutcome::Push(Frame::prepared_call(
                                &node,
                                frame.scope,
                                Value::Object(func),
                                this,
                                Vec::new(),
                            )));
                        }
                    }
                } else {
                    incoming_value
                };
                let n = self.to_number(&primitive);
                match operator {
                    UnaryOp::Minus => Value::Number(-n),
                    UnaryOp::Plus => Value::Number(n),
                    _ => Value::Number(!to_int32(n) as f64),
                }
            }
        };
        Ok(StepOutcome::Pop(Some(Outcome::Value(result))))
    }

    fn delete_scope_binding(
        &mut self,
        start: crate::scope::ScopeRef,
        name: &str,
        strict: bool,
    ) -> Result<bool, Abort> {
        let mut cursor = Some(start);
        while let Some(scope_ref) = cursor {
            let scope = self.scopes.get(scope_ref);
            let object = scope.object;
            let parent = scope.parent;
            if self.heap.get(object).properties.contains(name) {
                return self.delete_prop(&Value::Object(object), name, strict);
            }
            cursor = parent;
        }
        Ok(true)
    }

    pub(crate) fn step_update(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::UpdateExpression {
            operator, prefix, ..
        } = &node.kind
        else {
            unreachable!();
        };
        let stage = match &frame.scratch {
            Scratch::Update { stage, .. } => *stage,
            _ => unreachable!(),
        };
        match stage {
            UpdateStage::Start => {
                let NodeKind::UpdateExpression { argument, .. } = &node.kind else {
                    unreachable!();
                };
                if let Scratch::Update { stage, .. } = &mut frame.scratch {
                    *stage = UpdateStage::Ref;
                }
                let mut child = Frame::for_node(argument, frame.scope);
                child.want_ref = true;
                Ok(StepOutcome::Push(child))
            }
            UpdateStage::Ref => {
                let reference = incoming.into_ref();
                let fetched = self.ref_get(&reference, frame.scope, false)?;
                if let Scratch::Update { reference: slot, .. } = &mut frame.scratch {
                    *slot = Some(reference);
                }
                match fetched {
                    PropGet::Value(value) => {
                        self.update_store(frame, &node, *operator, *prefix, value)
                    }
                    PropGet::Getter { getter, this } => {
                        if let Scratch::Update { stage, .. } = &mut frame.scratch {
                            *stage = UpdateStage::FetchGetter;
                        }
                        let child = Frame::prepared_call(
                            &node,
                            frame.scope,
                            Value::Object(getter),
                            this,
                            Vec::new(),
                        );
                        Ok(StepOutcome::Push(child))
                    }
                }
            }
            UpdateStage::FetchGetter => {
                let value = incoming.into_value();
                self.update_store(frame, &node, *operator, *prefix, value)
            }
            UpdateStage::StoreSetter => {
                let result = match &frame.scratch {
                    Scratch::Update { result, .. } => result.clone(),
                    _ => unreachable!(),
                };
                Ok(StepOutcome::Pop(Some(Outcome::Value(result))))
            }
        }
    }

    fn update_store(
        &mut self,
        frame: &mut Frame,
        node: &Rc<Node>,
        operator: UpdateOp,
        prefix: bool,
        current: Value,
    ) -> StepResult {
        let old = self.to_number(&current);
        let new = match operator {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        let result = Value::Number(if prefix { new } else { old });
        let reference = match &frame.scratch {
            Scratch::Update { reference, .. } => reference.clone().expect("update reference"),
            _ => unreachable!(),
        };
        match self.ref_set(&reference, Value::Number(new), frame.scope)? {
            PropSet::Done => Ok(StepOutcome::Pop(Some(Outcome::Value(result)))),
            PropSet::Setter {
                setter,
                this,
                value,
            } => {
                if let Scratch::Update {
                    stage,
                    result: slot,
                    ..
                } = &mut frame.scratch
                {
                    *stage = UpdateStage::StoreSetter;
                    *slot = result;
                }
                let child = Frame::prepared_call(
                    node,
                    frame.scope,
                    Value::Object(setter),
                    this,
                    vec![value],
                );
                Ok(StepOutcome::Push(child))
            }
        }
    }

    pub(crate) fn step_assignment(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::AssignmentExpression {
            operator,
            left,
            right,
        } = &node.kind
        else {
            unreachable!();
        };
        let stage = match &frame.scratch {
            Scratch::Assign { stage, .. } => *stage,
            _ => unreachable!(),
        };
        match stage {
            AssignStage::Start => {
                if let Scratch::Assign { stage, .. } = &mut frame.scratch {
                    *stage = AssignStage::Ref;
                }
                let mut child = Frame::for_node(left, frame.scope);
                child.want_ref = true;
                Ok(StepOutcome::Push(child))
            }
            AssignStage::Ref => {
                let reference = incoming.into_ref();
                if *operator == AssignOp::Assign {
                    if let Scratch::Assign {
                        stage,
                        reference: slot,
                        ..
                    } = &mut frame.scratch
                    {
                        *stage = AssignStage::Right;
                        *slot = Some(reference);
                    }
                    return Ok(StepOutcome::Push(self.assignment_rhs(&node, left, right, frame)));
                }
                // Compound operators read the current value first, honoring
                // getters.
                let fetched = self.ref_get(&reference, frame.scope, false)?;
                if let Scratch::Assign {
                    reference: slot, ..
                } = &mut frame.scratch
                {
                    *slot = Some(reference);
                }
                match fetched {
                    PropGet::Value(value) => {
                        if let Scratch::Assign { stage, old, .. } = &mut frame.scratch {
                            *stage = AssignStage::Right;
                            *old = Some(value);
                        }
                        Ok(StepOutcome::Push(self.assignment_rhs(&node, left, right, frame)))
                    }
                    PropGet::Getter { getter, this } => {
                        if let Scratch::Assign { stage, .. } = &mut frame.scratch {
                            *stage = AssignStage::FetchGetter;
                        }
                        let child = Frame::prepared_call(
                            &node,
                            frame.scope,
                            Value::Object(getter),
                            this,
                            Vec::new(),
                        );
                        Ok(StepOutcome::Push(child))
                    }
                }
            }
            AssignStage::FetchGetter => {
                if let Scratch::Assign { stage, old, .. } = &mut frame.scratch {
                    *stage = AssignStage::Right;
                    *old = Some(incoming.into_value());
                }
                Ok(StepOutcome::Push(self.assignment_rhs(&node, left, right, frame)))
            }
            AssignStage::Right => {
                let rhs = incoming.into_value();
                let (reference, old) = match &frame.scratch {
                    Scratch::Assign { reference, old, .. } => {
                        (reference.clone().expect("assignment target"), old.clone())
                    }
                    _ => unreachable!(),
                };
                let value = match operator {
                    AssignOp::Assign => rhs,
                    compound => {
                        let old = old.unwrap_or(Value::Undefined);
                        let binary = compound_to_binary(*compound);
                        self.binary_op(binary, &old, &rhs)?
                    }
                };
                match self.ref_set(&reference, value.clone(), frame.scope)? {
                    PropSet::Done => Ok(StepOutcome::Pop(Some(Outcome::Value(value)))),
                    PropSet::Setter {
                        setter,
                        this,
                        value: setter_value,
                    } => {
                        if let Scratch::Assign { stage, stored, .. } = &mut frame.scratch {
                            *stage = AssignStage::StoreSetter;
                            *stored = value;
                        }
                        let child = Frame::prepared_call(
                            &node,
                            frame.scope,
                            Value::Object(setter),
                            this,
                            vec![setter_value],
                        );
                        Ok(StepOutcome::Push(child))
                    }
                }
            }
            AssignStage::StoreSetter => {
                let stored = match &frame.scratch {
                    Scratch::Assign { stored, .. } => stored.clone(),
                    _ => unreachable!(),
                };
                Ok(StepOutcome::Pop(Some(Outcome::Value(stored))))
            }
        }
    }

    /// The right-hand side inherits a display name when assigning a
    /// function expression to a plain identifier.
    fn assignment_rhs(
        &self,
        _node: &Rc<Node>,
        left: &Rc<Node>,
        right: &Rc<Node>,
        frame: &Frame,
    ) -> Frame {
        let mut child = Frame::for_node(right, frame.scope);
        if let NodeKind::Identifier { name } = &left.kind {
            child.destination_name = Some(Rc::clone(name));
        }
        child
    }

    pub(crate) fn step_member(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::MemberExpression {
            object,
            property,
            computed,
        } = &node.kind
        else {
            unreachable!();
        };
        let stage = match &frame.scratch {
            Scratch::Member { stage, .. } => *stage,
            _ => unreachable!(),
        };
        match stage {
            MemberStage::Start => {
                if let Scratch::Member { stage, .. } = &mut frame.scratch {
                    *stage = MemberStage::Object;
                }
                Ok(StepOutcome::Push(Frame::for_node(object, frame.scope)))
            }
            MemberStage::Object => {
                let base = incoming.into_value();
                if *computed {
                    if let Scratch::Member { stage, object } = &mut frame.scratch {
                        *stage = MemberStage::Property;
                        *object = base;
                    }
                    return Ok(StepOutcome::Push(Frame::for_node(property, frame.scope)));
                }
                let NodeKind::Identifier { name } = &property.kind else {
                    unreachable!();
                };
                let name = Rc::clone(name);
                self.member_finish(frame, &node, base, name)
            }
            MemberStage::Property => {
                let key = incoming.into_value();
                let name: JsStr = Rc::from(self.to_display(&key).as_str());
                let base = match &mut frame.scratch {
                    Scratch::Member { object, .. } => {
                        std::mem::replace(object, Value::Undefined)
                    }
                    _ => unreachable!(),
                };
                self.member_finish(frame, &node, base, name)
            }
            MemberStage::Getter => {
                Ok(StepOutcome::Pop(Some(Outcome::Value(incoming.into_value()))))
            }
        }
    }

    fn member_finish(
        &mut self,
        frame: &mut Frame,
        node: &Rc<Node>,
        base: Value,
        name: JsStr,
    ) -> StepResult {
        if frame.want_ref {
            return Ok(StepOutcome::Pop(Some(Outcome::Ref(Reference {
                base: RefBase::Value(base),
                name,
            }))));
        }
        match self.prop_get(&base, &name)? {
            PropGet::Value(value) => Ok(StepOutcome::Pop(Some(Outcome::Value(value)))),
            PropGet::Getter { getter, this } => {
                if let Scratch::Member { stage, .. } = &mut frame.scratch {
                    *stage = MemberStage::Getter;
                }
                let child = Frame::prepared_call(
                    node,
                    frame.scope,
                    Value::Object(getter),
                    this,
                    Vec::new(),
                );
                Ok(StepOutcome::Push(child))
            }
        }
    }

    pub(crate) fn step_array_literal(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let NodeKind::ArrayExpression { elements } = &node.kind else {
            unreachable!();
        };
        let (array, mut index) = match &frame.scratch {
            Scratch::ArrayLit { array, index } => (*array, *index),
            _ => unreachable!(),
        };
        let array = match array {
            Some(array) => {
                let name: JsStr = Rc::from(index.to_string().as_str());
                self.define_data_property(array, name, incoming.into_value());
                index += 1;
                array
            }
            None => self.create_array(),
        };
        while index < elements.len() {
            match &elements[index] {
                Some(element) => {
                    frame.scratch = Scratch::ArrayLit {
                        array: Some(array),
                        index,
                    };
                    return Ok(StepOutcome::Push(Frame::for_node(element, frame.scope)));
                }
                None => index += 1,
            }
        }
        // Trailing holes still count toward length.
        self.define_data_property(
            array,
            Rc::from("length"),
            Value::Number(elements.len() as f64),
        );
        Ok(StepOutcome::Pop(Some(Outcome::Value(Value::Object(array)))))
    }

    pub(crate) fn step_object_literal(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let incoming = frame.take_value();
        let scope = frame.scope;
        let NodeKind::ObjectExpression { properties } = &node.kind else {
            unreachable!();
        };
        let Scratch::ObjectLit(s) = &mut frame.scratch else {
            unreachable!();
        };
        let object = match s.object {
            Some(object) => {
                let entry = &properties[s.index];
                let kind = match entry.kind {
                    PropertyKind::Init => LitProp::Init,
                    PropertyKind::Get => LitProp::Get,
                    PropertyKind::Set => LitProp::Set,
                };
                s.collected
                    .push((Rc::clone(&entry.key), kind, incoming.into_value()));
                s.index += 1;
                object
            }
            None => {
                let object = self.create_plain_object();
                if let Scratch::ObjectLit(s) = &mut frame.scratch {
                    s.object = Some(object);
                }
                object
            }
        };
        let Scratch::ObjectLit(s) = &mut frame.scratch else {
            unreachable!();
        };
        if let Some(entry) = properties.get(s.index) {
            return Ok(StepOutcome::Push(Frame::for_node(&entry.value, scope)));
        }

        // Merge repeated keys: later data entries win outright, while
        // get/set pairs fold into one accessor property.
        let collected = std::mem::take(&mut s.collected);
        let mut merged: Vec<(JsStr, Option<Value>, Option<Value>, Option<Value>)> = Vec::new();
        for (key, kind, value) in collected {
            let index = match merged.iter().position(|(k, ..)| *k == key) {
                Some(index) => index,
                None => {
                    merged.push((key, None, None, None));
                    merged.len() - 1
                }
            };
            let slot = &mut merged[index];
            match kind {
                LitProp::Init => {
                    slot.1 = Some(value);
                    slot.2 = None;
                    slot.3 = None;
                }
                LitProp::Get => {
                    slot.1 = None;
                    slot.2 = Some(value);
                }
                LitProp::Set => {
                    slot.1 = None;
                    slot.3 = Some(value);
                }
            }
        }
        for (key, value, getter, setter) in merged {
            if getter.is_some() || setter.is_some() {
                let descriptor = Descriptor {
                    value: None,
                    writable: None,
                    enumerable: Some(true),
                    configurable: Some(true),
                    getter,
                    setter,
                };
                self.prop_set(
                    &Value::Object(object),
                    &key,
                    Value::Undefined,
                    Some(descriptor),
                    false,
                )?;
            } else {
                self.define_data_property(object, key, value.unwrap_or(Value::Undefined));
            }
        }
        Ok(StepOutcome::Pop(Some(Outcome::Value(Value::Object(object)))))
    }

    pub(crate) fn step_function_expression(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let display_name = frame.destination_name.clone();
        let func = self.create_function(&node, frame.scope, display_name);
        Ok(StepOutcome::Pop(Some(Outcome::Value(Value::Object(func)))))
    }

    // ---- calls -----------------------------------------------------------

    pub(crate) fn step_call(&mut self, frame: &mut Frame) -> StepResult {
        let node = Rc::clone(&frame.node);
        let mut incoming = Some(frame.take_value());
        loop {
            let stage = match &frame.scratch {
                Scratch::Call(call) => call.stage,
                _ => unreachable!(),
            };
            match stage {
                CallStage::Start => {
                    let callee = match &node.kind {
                        NodeKind::CallExpression { callee, .. }
                        | NodeKind::NewExpression { callee, .. } => callee,
                        _ => unreachable!(),
                    };
                    if let Scratch::Call(call) = &mut frame.scratch {
                        call.stage = CallStage::Callee;
                    }
                    let mut child = Frame::for_node(callee, frame.scope);
                    child.want_ref = true;
                    return Ok(StepOutcome::Push(child));
                }
                CallStage::Callee => {
                    let outcome = incoming.take().expect("callee outcome");
                    match outcome {
                        Outcome::Ref(reference) => {
                            let is_eval_name =
                                matches!(reference.base, RefBase::Scope) && &*reference.name == "eval";
                            let this = match &reference.base {
                                RefBase::Value(base) => Some(base.clone()),
                                RefBase::Scope => None,
                            };
                            let fetched = self.ref_get(&reference, frame.scope, false)?;
                            if let Scratch::Call(call) = &mut frame.scratch {
                                call.direct_eval = is_eval_name;
                                call.func_this = this;
                            }
                            match fetched {
                                PropGet::Value(func) => {
                                    if let Scratch::Call(call) = &mut frame.scratch {
                                        call.func = func;
                                        call.stage = CallStage::Args;
                                    }
                                }
                                PropGet::Getter { getter, this } => {
                                    if let Scratch::Call(call) = &mut frame.scratch {
                                        call.stage = CallStage::CalleeGetter;
                                    }
                                    let child = Frame::prepared_call(
                                        &node,
                                        frame.scope,
                                        Value::Object(getter),
                                        this,
                                        Vec::new(),
                                    );
                                    return Ok(StepOutcome::Push(child));
                                }
                            }
                        }
                        Outcome::Value(func) => {
                            if let Scratch::Call(call) = &mut frame.scratch {
                                call.func = func;
                                call.stage = CallStage::Args;
                            }
                        }
                    }
                }
                CallStage::CalleeGetter => {
                    let func = incoming.take().expect("getter result").into_value();
                    if let Scratch::Call(call) = &mut frame.scratch {
                        call.func = func;
                        call.stage = CallStage::Args;
                    }
                }
                CallStage::Args => {
                    let arguments = match &node.kind {
                        NodeKind::CallExpression { arguments, .. }
                        | NodeKind::NewExpression { arguments, .. } => arguments,
                        _ => unreachable!(),
                    };
                    let Scratch::Call(call) = &mut frame.scratch else {
                        unreachable!();
                    };
                    if call.arg_pending {
                        call.arg_pending = false;
                        let value = incoming
                            .take()
                            .map(Outcome::into_value)
                            .unwrap_or(Value::Undefined);
                        call.args.push(value);
                    }
                    if let Some(argument) = arguments.get(call.next_arg) {
                        call.next_arg += 1;
                        call.arg_pending = true;
                        return Ok(StepOutcome::Push(Frame::for_node(argument, frame.scope)));
                    }
                    call.stage = CallStage::Dispatch;
                }
                CallStage::Dispatch => {
                    let outcome = self.call_dispatch(frame, &node)?;
                    match outcome {
                        Some(step) => return Ok(step),
                        // A reinvocation (apply/call) looped back to
                        // Dispatch with new callee state.
                        None => continue,
                    }
                }
                CallStage::Body => {
                    let Scratch::Call(call) = &mut frame.scratch else {
                        unreachable!();
                    };
                    if call.waiting_task.is_some() {
                        // Still suspended; nothing to do until the host
                        // resolves the handle.
                        return Ok(StepOutcome::Stay);
                    }
                    let mut result = incoming
                        .take()
                        .map(Outcome::into_value)
                        .unwrap_or(Value::Undefined);
                    if call.is_new && !result.is_object() {
                        result = call.func_this.clone().unwrap_or(Value::Undefined);
                    }
                    return Ok(StepOutcome::Pop(Some(Outcome::Value(result))));
                }
            }
        }
    }

    /// Resolves `this`, then dispatches on the callee kind. Returns `None`
    /// when an apply/call native rewrote the frame for re-dispatch.
    fn call_dispatch(
        &mut self,
        frame: &mut Frame,
        node: &Rc<Node>,
    ) -> Result<Option<StepOutcome>, Abort> {
        let (func, is_new, mut func_this, direct_eval, args) = match &frame.scratch {
            Scratch::Call(call) => (
                call.func.clone(),
                call.is_new,
                call.func_this.clone(),
                call.direct_eval,
                call.args.clone(),
            ),
            _ => unreachable!(),
        };

        let callee_summary = || match &node.kind {
            NodeKind::CallExpression { callee, .. } | NodeKind::NewExpression { callee, .. } => {
                callee.kind.summary()
            }
            _ => "function".to_string(),
        };

        let Some(fobj) = func.as_object() else {
            return Err(
                self.throw_type_error(format!("{} is not a function", callee_summary()))
            );
        };
        if !self.heap.get(fobj).is_callable() {
            return Err(
                self.throw_type_error(format!("{} is not a function", callee_summary()))
            );
        }

        if is_new {
            if self.heap.get(fobj).illegal_constructor {
                return Err(self.throw_type_error(format!(
                    "{} is not a constructor",
                    callee_summary()
                )));
            }
            let proto = match self.heap.get(fobj).peek("prototype") {
                Some(Value::Object(proto)) => *proto,
                _ => self.protos.object_proto,
            };
            let this_obj = self.create_object(Some(proto));
            func_this = Some(Value::Object(this_obj));
        } else if func_this.is_none() {
            // Plain calls bind `this` to the global object outside strict
            // mode.
            func_this = if self.scopes.get(frame.scope).strict {
                Some(Value::Undefined)
            } else {
                Some(Value::Object(self.global_object))
            };
        }
        if let Scratch::Call(call) = &mut frame.scratch {
            call.func_this = func_this.clone();
        }
        let this_value = func_this.unwrap_or(Value::Undefined);

        if self.heap.get(fobj).is_eval {
            return self
                .dispatch_eval(frame, node, args, direct_eval)
                .map(Some);
        }

        let callable = self.heap.get(fobj).callable.clone().expect("checked callable");
        match callable {
            Callable::Ast {
                node: func_node,
                parent_scope,
            } => {
                let (params, body, fn_name) = match &func_node.kind {
                    NodeKind::FunctionDeclaration { name, params, body } => {
                        (params, body, Some(Rc::clone(name)))
                    }
                    NodeKind::FunctionExpression { name, params, body } => {
                        (params, body, name.clone())
                    }
                    _ => unreachable!(),
                };
                let scope = self.create_scope(body, Some(parent_scope));
                self.populate_scope(body, scope);
                for (i, param) in params.iter().enumerate() {
                    let value = args.get(i).cloned().unwrap_or(Value::Undefined);
                    self.declare_variable(scope, param, value, true);
                }
                let arguments_obj = self.create_array();
                for (i, value) in args.iter().enumerate() {
                    let key: JsStr = Rc::from(i.to_string().as_str());
                    self.define_data_property(arguments_obj, key, value.clone());
                }
                self.declare_variable(scope, "arguments", Value::Object(arguments_obj), true);
                if let Some(fn_name) = fn_name {
                    // The function's own name resolves inside its body
                    // unless a declaration shadows it.
                    self.declare_variable(scope, &fn_name, Value::Object(fobj), false);
                }
                let scope_object = self.scopes.get(scope).object;
                self.define_property(scope_object, Rc::from("this"), this_value, READONLY);
                if let Scratch::Call(call) = &mut frame.scratch {
                    call.stage = CallStage::Body;
                }
                Ok(Some(StepOutcome::Push(Frame::for_node(body, scope))))
            }
            Callable::Native { func: native, .. } => {
                let result = native(
                    self,
                    super::NativeCall {
                        this: this_value,
                        args,
                        called_with_new: is_new,
                    },
                )?;
                if let Some(reinvoke) = self.pending_reinvoke.take() {
                    if let Scratch::Call(call) = &mut frame.scratch {
                        call.func = reinvoke.func;
                        call.func_this = Some(reinvoke.this);
                        call.args = reinvoke.args;
                        call.direct_eval = false;
                        call.stage = CallStage::Dispatch;
                    }
                    return Ok(None);
                }
                let final_value = if is_new && !result.is_object() {
                    match &frame.scratch {
                        Scratch::Call(call) => call.func_this.clone().unwrap_or(Value::Undefined),
                        _ => unreachable!(),
                    }
                } else {
                    result
                };
                Ok(Some(StepOutcome::Pop(Some(Outcome::Value(final_value)))))
            }
            Callable::Async { func: async_fn, .. } => {
                let id = self.allocate_task_id();
                if let Scratch::Call(call) = &mut frame.scratch {
                    call.stage = CallStage::Body;
                    call.waiting_task = Some(id);
                }
                self.paused = true;
                self.trace.push(format!("paused on task {}", id));
                // Invoked only after the frame is back on the stack, so a
                // synchronous resolve can find it.
                self.pending_async_invoke = Some(PendingInvoke {
                    func: async_fn,
                    call: super::NativeCall {
                        this: this_value,
                        args,
                        called_with_new: is_new,
                    },
                    handle: super::AsyncHandle { id },
                });
                Ok(Some(StepOutcome::Stay))
            }
        }
    }

    fn dispatch_eval(
        &mut self,
        frame: &mut Frame,
        node: &Rc<Node>,
        args: Vec<Value>,
        direct_eval: bool,
    ) -> Result<StepOutcome, Abort> {
        let code = args.first().cloned().unwrap_or(Value::Undefined);
        let Value::String(source) = code else {
            // Non-string arguments come straight back.
            return Ok(StepOutcome::Pop(Some(Outcome::Value(code))));
        };
        let kind = if node.polyfill {
            crate::ast::SourceKind::Polyfill
        } else {
            crate::ast::SourceKind::User
        };
        let program = match crate::parser::parse_program(&source, kind) {
            Ok(program) => program,
            Err(err) => {
                return Err(self.throw_syntax_error(format!("Invalid code: {}", err)));
            }
        };
        let NodeKind::Program { body } = &program.kind else {
            unreachable!();
        };
        let body = body.clone();
        let base_scope = if direct_eval {
            frame.scope
        } else {
            self.global_scope
        };
        let scope = if self.scopes.get(base_scope).strict {
            // Strict eval gets its own scope instead of polluting the
            // caller's.
            let scope = self.create_scope(&program, Some(base_scope));
            self.populate_scope(&program, scope);
            scope
        } else {
            self.populate_scope(&program, base_scope);
            base_scope
        };
        self.value = Value::Undefined;
        if let Scratch::Call(call) = &mut frame.scratch {
            call.stage = CallStage::Body;
        }
        let eval_frame = Frame {
            node: Rc::clone(node),
            scope,
            value: Outcome::undefined(),
            want_ref: false,
            labels: Vec::new(),
            destination_name: None,
            polyfill: node.polyfill,
            scratch: Scratch::EvalProgram { body, index: 0 },
        };
        Ok(StepOutcome::Push(eval_frame))
    }
}

fn compound_to_binary(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::Assign => unreachable!("plain assignment has no binary half"),
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Div => BinaryOp::Div,
        AssignOp::Mod => BinaryOp::Mod,
        AssignOp::ShiftLeft => BinaryOp::ShiftLeft,
        AssignOp::ShiftRight => BinaryOp::ShiftRight,
        AssignOp::UnsignedShiftRight => BinaryOp::UnsignedShiftRight,
        AssignOp::BitOr => BinaryOp::BitOr,
        AssignOp::BitXor => BinaryOp::BitXor,
        AssignOp::BitAnd => BinaryOp::BitAnd,
    }
}


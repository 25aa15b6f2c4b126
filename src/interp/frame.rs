use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::ast::{Node, NodeKind};
use crate::scope::ScopeRef;
use crate::value::{JsStr, ObjectRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionKind {
    Break,
    Continue,
    Return,
    Throw,
}

#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub(crate) kind: CompletionKind,
    pub(crate) value: Value,
    pub(crate) label: Option<JsStr>,
}

/// A left-hand-side result: either a scope binding or an object property.
#[derive(Debug, Clone)]
pub(crate) struct Reference {
    pub(crate) base: RefBase,
    pub(crate) name: JsStr,
}

#[derive(Debug, Clone)]
pub(crate) enum RefBase {
    Scope,
    Value(Value),
}

/// What a popped frame deposits into its parent's slot.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Value(Value),
    Ref(Reference),
}

impl Outcome {
    pub(crate) fn undefined() -> Outcome {
        Outcome::Value(Value::Undefined)
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Outcome::Value(value) => value,
            Outcome::Ref(_) => panic!("reference produced where a value was required"),
        }
    }

    pub(crate) fn into_ref(self) -> Reference {
        match self {
            Outcome::Ref(reference) => reference,
            Outcome::Value(_) => panic!("value produced where a reference was required"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallStage {
    Start,
    Callee,
    CalleeGetter,
    Args,
    Dispatch,
    Body,
}

#[derive(Debug)]
pub(crate) struct CallScratch {
    pub(crate) stage: CallStage,
    pub(crate) is_new: bool,
    pub(crate) func: Value,
    pub(crate) func_this: Option<Value>,
    pub(crate) direct_eval: bool,
    pub(crate) args: Vec<Value>,
    pub(crate) next_arg: usize,
    pub(crate) arg_pending: bool,
    pub(crate) waiting_task: Option<u64>,
}

impl CallScratch {
    pub(crate) fn new(is_new: bool) -> CallScratch {
        CallScratch {
            stage: CallStage::Start,
            is_new,
            func: Value::Undefined,
            func_this: None,
            direct_eval: false,
            args: Vec::new(),
            next_arg: 0,
            arg_pending: false,
            waiting_task: None,
        }
    }

    /// A ready-to-dispatch call with no AST callee: accessor re-entry and
    /// host-initiated invocations.
    pub(crate) fn prepared(func: Value, this: Value, args: Vec<Value>) -> CallScratch {
        CallScratch {
            stage: CallStage::Dispatch,
            is_new: false,
            func,
            func_this: Some(this),
            direct_eval: false,
            args,
            next_arg: 0,
            arg_pending: false,
            waiting_task: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberStage {
    Start,
    Object,
    Property,
    Getter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignStage {
    Start,
    Ref,
    FetchGetter,
    Right,
    StoreSetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateStage {
    Start,
    Ref,
    FetchGetter,
    StoreSetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentifierStage {
    Start,
    Getter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForInStage {
    Right,
    Init,
    Ref,
    Setter,
    Body,
}

#[derive(Debug)]
pub(crate) struct ForInScratch {
    pub(crate) stage: ForInStage,
    /// Owner of the names currently in `pending`; `None` for the virtual
    /// index level of a primitive string.
    pub(crate) level: Option<ObjectRef>,
    /// Next prototype link to drain after `pending` empties.
    pub(crate) next: Option<ObjectRef>,
    pub(crate) exhausted: bool,
    pub(crate) pending: VecDeque<JsStr>,
    pub(crate) visited: HashSet<JsStr>,
    pub(crate) name: Option<JsStr>,
    pub(crate) target: Option<Reference>,
}

#[derive(Debug)]
pub(crate) struct SwitchScratch {
    pub(crate) discriminant_done: bool,
    pub(crate) captured: bool,
    pub(crate) discriminant: Value,
    pub(crate) index: usize,
    pub(crate) default_index: Option<usize>,
    pub(crate) matched: bool,
    pub(crate) test_pending: bool,
    pub(crate) stmt_index: usize,
}

#[derive(Debug)]
pub(crate) struct TryScratch {
    pub(crate) block_done: bool,
    pub(crate) handler_done: bool,
    pub(crate) finalizer_done: bool,
    pub(crate) cv: Option<Completion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LitProp {
    Init,
    Get,
    Set,
}

#[derive(Debug)]
pub(crate) struct ObjectLitScratch {
    pub(crate) index: usize,
    pub(crate) object: Option<ObjectRef>,
    pub(crate) collected: Vec<(JsStr, LitProp, Value)>,
}

/// An in-flight ToPrimitive conversion: which operand is being coerced,
/// the hint order, and how many of `valueOf`/`toString` have been tried.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoercePending {
    pub(crate) target: u8,
    pub(crate) hint_string: bool,
    pub(crate) attempt: u8,
}

/// Frame-local continuation state, one variant per node kind plus the
/// synthetic call used for accessor re-entry. Dispatch switches on this tag.
#[derive(Debug)]
pub(crate) enum Scratch {
    Program {
        body: Vec<Rc<Node>>,
        index: usize,
        done: bool,
    },
    EvalProgram {
        body: Vec<Rc<Node>>,
        index: usize,
    },
    Block {
        index: usize,
    },
    ExpressionStatement {
        done: bool,
    },
    NoOp,
    VarDecl {
        index: usize,
        pending: bool,
    },
    Conditional {
        mode: u8,
    },
    Logical {
        mode: u8,
    },
    Binary {
        mode: u8,
        left: Value,
        right: Value,
        coercing: Option<CoercePending>,
    },
    Unary {
        done: bool,
        operand: Value,
        coercing: Option<CoercePending>,
    },
    Update {
        stage: UpdateStage,
        reference: Option<Reference>,
        result: Value,
    },
    Assign {
        stage: AssignStage,
        reference: Option<Reference>,
        old: Option<Value>,
        stored: Value,
    },
    Member {
        stage: MemberStage,
        object: Value,
    },
    Sequence {
        index: usize,
    },
    ArrayLit {
        index: usize,
        array: Option<ObjectRef>,
    },
    ObjectLit(ObjectLitScratch),
    FunctionExpr,
    Identifier {
        stage: IdentifierStage,
    },
    Literal,
    This,
    Call(CallScratch),
    While {
        started: bool,
        test_pending: bool,
    },
    For {
        mode: u8,
    },
    ForIn(ForInScratch),
    Switch(SwitchScratch),
    Try(TryScratch),
    Catch {
        thrown: Value,
        done: bool,
    },
    Return {
        done: bool,
    },
    Throw {
        done: bool,
    },
    BreakStatement,
    ContinueStatement,
    Labeled,
    With {
        mode: u8,
    },
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) node: Rc<Node>,
    pub(crate) scope: ScopeRef,
    pub(crate) value: Outcome,
    pub(crate) want_ref: bool,
    pub(crate) labels: Vec<JsStr>,
    pub(crate) destination_name: Option<JsStr>,
    pub(crate) polyfill: bool,
    pub(crate) scratch: Scratch,
}

impl Frame {
    pub(crate) fn for_node(node: &Rc<Node>, scope: ScopeRef) -> Frame {
        let scratch = match &node.kind {
            NodeKind::Program { body } => Scratch::Program {
                body: body.clone(),
                index: 0,
                done: false,
            },
            NodeKind::BlockStatement { .. } => Scratch::Block { index: 0 },
            NodeKind::ExpressionStatement { .. } => {
                Scratch::ExpressionStatement { done: false }
            }
            NodeKind::EmptyStatement
            | NodeKind::DebuggerStatement
            | NodeKind::FunctionDeclaration { .. } => Scratch::NoOp,
            NodeKind::VariableDeclaration { .. } => Scratch::VarDecl {
                index: 0,
                pending: false,
            },
            NodeKind::IfStatement { .. } | NodeKind::ConditionalExpression { .. } => {
                Scratch::Conditional { mode: 0 }
            }
            NodeKind::LogicalExpression { .. } => Scratch::Logical { mode: 0 },
            NodeKind::BinaryExpression { .. } => Scratch::Binary {
                mode: 0,
                left: Value::Undefined,
                right: Value::Undefined,
                coercing: None,
            },
            NodeKind::UnaryExpression { .. } => Scratch::Unary {
                done: false,
                operand: Value::Undefined,
                coercing: None,
            },
            NodeKind::UpdateExpression { .. } => Scratch::Update {
                stage: UpdateStage::Start,
                reference: None,
                result: Value::Undefined,
            },
            NodeKind::AssignmentExpression { .. } => Scratch::Assign {
                stage: AssignStage::Start,
                reference: None,
                old: None,
                stored: Value::Undefined,
            },
            NodeKind::MemberExpression { .. } => Scratch::Member {
                stage: MemberStage::Start,
                object: Value::Undefined,
            },
            NodeKind::SequenceExpression { .. } => Scratch::Sequence { index: 0 },
            NodeKind::ArrayExpression { .. } => Scratch::ArrayLit {
                index: 0,
                array: None,
            },
            NodeKind::ObjectExpression { .. } => Scratch::ObjectLit(ObjectLitScratch {
                index: 0,
                object: None,
                collected: Vec::new(),
            }),
            NodeKind::FunctionExpression { .. } => Scratch::FunctionExpr,
            NodeKind::Identifier { .. } => Scratch::Identifier {
                stage: IdentifierStage::Start,
            },
            NodeKind::Literal { .. } => Scratch::Literal,
            NodeKind::ThisExpression => Scratch::This,
            NodeKind::CallExpression { .. } => Scratch::Call(CallScratch::new(false)),
            NodeKind::NewExpression { .. } => Scratch::Call(CallScratch::new(true)),
            NodeKind::WhileStatement { .. } | NodeKind::DoWhileStatement { .. } => {
                Scratch::While {
                    started: false,
                    test_pending: false,
                }
            }
            NodeKind::ForStatement { .. } => Scratch::For { mode: 0 },
            NodeKind::ForInStatement { .. } => Scratch::ForIn(ForInScratch {
                stage: ForInStage::Right,
                level: None,
                next: None,
                exhausted: false,
                pending: VecDeque::new(),
                visited: HashSet::new(),
                name: None,
                target: None,
            }),
            NodeKind::SwitchStatement { .. } => Scratch::Switch(SwitchScratch {
                discriminant_done: false,
                captured: false,
                discriminant: Value::Undefined,
                index: 0,
                default_index: None,
                matched: false,
                test_pending: false,
                stmt_index: 0,
            }),
            NodeKind::TryStatement { .. } => Scratch::Try(TryScratch {
                block_done: false,
                handler_done: false,
                finalizer_done: false,
                cv: None,
            }),
            NodeKind::CatchClause { .. } => Scratch::Catch {
                thrown: Value::Undefined,
                done: false,
            },
            NodeKind::ReturnStatement { .. } => Scratch::Return { done: false },
            NodeKind::ThrowStatement { .. } => Scratch::Throw { done: false },
            NodeKind::BreakStatement { .. } => Scratch::BreakStatement,
            NodeKind::ContinueStatement { .. } => Scratch::ContinueStatement,
            NodeKind::LabeledStatement { .. } => Scratch::Labeled,
            NodeKind::WithStatement { .. } => Scratch::With { mode: 0 },
        };
        Frame {
            node: Rc::clone(node),
            scope,
            value: Outcome::undefined(),
            want_ref: false,
            labels: Vec::new(),
            destination_name: None,
            polyfill: node.polyfill,
            scratch,
        }
    }

    /// Synthetic frame invoking an accessor or host-prepared call; marked
    /// polyfill so it coalesces into the surrounding step.
    pub(crate) fn prepared_call(
        node: &Rc<Node>,
        scope: ScopeRef,
        func: Value,
        this: Value,
        args: Vec<Value>,
    ) -> Frame {
        Frame {
            node: Rc::clone(node),
            scope,
            value: Outcome::undefined(),
            want_ref: false,
            labels: Vec::new(),
            destination_name: None,
            polyfill: true,
            scratch: Scratch::Call(CallScratch::prepared(func, this, args)),
        }
    }

    pub(crate) fn is_loop(&self) -> bool {
        matches!(
            self.scratch,
            Scratch::While { .. } | Scratch::For { .. } | Scratch::ForIn(_)
        )
    }

    pub(crate) fn is_switch(&self) -> bool {
        matches!(self.scratch, Scratch::Switch(_))
    }

    pub(crate) fn take_value(&mut self) -> Outcome {
        std::mem::replace(&mut self.value, Outcome::undefined())
    }
}

//! A sandboxed, step-wise ES5 interpreter.
//!
//! Programs run against an isolated heap of interpreted objects; the host
//! advances execution one statement at a time, may pause around async
//! work, and exchanges values by copy-conversion.

use std::error::Error as StdError;
use std::fmt;

pub mod ast;
mod bridge;
mod globals;
mod interp;
mod lexer;
mod parser;
mod regex_backend;
mod scope;
mod value;

pub use bridge::{HostFn, NativeValue};
pub use interp::{Abort, AsyncHandle, Config, InitHook, Interpreter, NativeCall, Status};
pub use parser::{parse_program, ParseError};
pub use regex_backend::RegexpMode;
pub use scope::ScopeRef;
pub use value::{ObjectRef, Value};

pub type Result<T> = std::result::Result<T, Error>;

/// Host-side failures: parse errors at construction and uncaught
/// interpreted completions, mapped by error name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Syntax(String),
    Reference(String),
    Type(String),
    Range(String),
    Eval(String),
    Uri(String),
    Runtime(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "SyntaxError: {msg}"),
            Self::Reference(msg) => write!(f, "ReferenceError: {msg}"),
            Self::Type(msg) => write!(f, "TypeError: {msg}"),
            Self::Range(msg) => write!(f, "RangeError: {msg}"),
            Self::Eval(msg) => write!(f, "EvalError: {msg}"),
            Self::Uri(msg) => write!(f, "URIError: {msg}"),
            Self::Runtime(msg) => write!(f, "uncaught: {msg}"),
        }
    }
}

impl StdError for Error {}

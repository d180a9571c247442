//! Error taxonomy for the interpreter core.
//!
//! Errors fall into two families: user failures (`Failure`, raised by the
//! `Fail` opcode and the assertion builtins, carrying a source span and a
//! rendered message) and everything else, which indicates either semantic
//! misuse caught at dispatch time (`InvalidArgument`), an interpreter
//! invariant violation (`Internal`), an empty channel on receive
//! (`Unavailable`), or a builtin with no handler yet (`Unimplemented`).
//!
//! Errors propagate immediately and abort the dispatch loop; no opcode
//! catches or retries.

use std::borrow::Cow;
use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::Span;

pub type InterpResult<T> = Result<T, InterpError>;

/// The kind of an [`InterpError`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    InvalidArgument,
    Internal,
    Unavailable,
    Failure,
    Unimplemented,
}

/// A runtime error produced while interpreting bytecode.
#[derive(Debug, Clone)]
pub enum InterpError {
    /// Semantic misuse detected at dispatch time: bad cast shapes,
    /// non-boolean logical operands, indexing a non-aggregate.
    InvalidArgument(Cow<'static, str>),
    /// Interpreter invariant violated: stack underflow, slot out of range,
    /// missing payload, a jump landing off a jump destination.
    Internal(Cow<'static, str>),
    /// Channel empty on receive.
    Unavailable(Cow<'static, str>),
    /// User-level failure (`fail!`, assertion builtins, `Fail` opcode);
    /// carries the opcode's source span and the rendered message.
    Failure { span: Span, message: String },
    /// Builtin not yet handled.
    Unimplemented(Cow<'static, str>),
}

impl InterpError {
    pub fn invalid_argument(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn unavailable(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn failure(span: Span, message: impl Into<String>) -> Self {
        Self::Failure {
            span,
            message: message.into(),
        }
    }

    pub fn unimplemented(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unimplemented(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Failure { .. } => ErrorKind::Failure,
            Self::Unimplemented(_) => ErrorKind::Unimplemented,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }

    pub fn is_unavailable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    pub fn is_failure(&self) -> bool {
        self.kind() == ErrorKind::Failure
    }
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg)
            | Self::Internal(msg)
            | Self::Unavailable(msg)
            | Self::Unimplemented(msg) => write!(f, "{}: {msg}", self.kind()),
            Self::Failure { span, message } => write!(f, "{span}: Failure: {message}"),
        }
    }
}

impl std::error::Error for InterpError {}

//! The flat bytecode consumed by the interpreter.
//!
//! Each [`Bytecode`] is an opcode plus a source span and an opcode-specific
//! payload. A [`BytecodeFunction`] bundles a linear sequence of bytecodes
//! with the originating function handle and its type info. Bytecode is
//! produced by an external emitter (or synthesized inside the interpreter
//! for `map`); this module only represents it.

pub mod cache;

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::{FunctionId, InvocationId, ParametricEnv, Span, TypeInfoId};
use crate::error::{InterpError, InterpResult};
use crate::format::FormatPreference;
use crate::types::ConcreteType;
use crate::value::InterpValue;

/// Index of a local slot within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotIndex(pub usize);

impl SlotIndex {
    pub fn value(self) -> usize {
        self.0
    }
}

/// Signed relative displacement for jumps, added to the current PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget(pub isize);

impl JumpTarget {
    pub fn value(self) -> isize {
        self.0
    }
}

/// Payload for `Call`: the invocation site plus the caller's parametric
/// bindings, used to resolve the callee's specialized type info.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationData {
    pub invocation: InvocationId,
    pub env: Option<ParametricEnv>,
}

/// One item of a match-arm pattern.
///
/// `Store` always matches and writes the candidate into a slot; a failing
/// `Tuple` pattern keeps the writes of any `Store` sub-items already
/// visited.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchArmItem {
    /// Matches iff the candidate equals the value.
    Value(InterpValue),
    /// Matches iff the candidate equals the slot's current value (a
    /// previously-bound name).
    Load(SlotIndex),
    /// Always matches; stores the candidate into the slot.
    Store(SlotIndex),
    /// Always matches.
    Wildcard,
    /// Element-wise recursion over a tuple candidate.
    Tuple(Vec<MatchArmItem>),
}

/// One piece of a trace or failure message.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceItem {
    Literal(String),
    /// Consumes one stack value, rendered with the given preference.
    Format(FormatPreference),
}

pub type TraceData = Vec<TraceItem>;

/// The closed set of opcodes. Dispatch is a flat match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    Add,
    And,
    Call,
    Cast,
    Concat,
    CreateArray,
    CreateTuple,
    Div,
    Dup,
    Eq,
    ExpandTuple,
    Fail,
    Ge,
    Gt,
    Index,
    Invert,
    JumpDest,
    JumpRel,
    JumpRelIf,
    Le,
    Literal,
    Load,
    LogicalAnd,
    LogicalOr,
    Lt,
    MatchArm,
    Mul,
    Ne,
    Negate,
    Or,
    Pop,
    Recv,
    Send,
    Shl,
    Shr,
    Slice,
    Store,
    Sub,
    Swap,
    Trace,
    WidthSlice,
    Xor,
}

/// Opcode-specific operand payload.
#[derive(Debug, Clone, PartialEq)]
pub enum BytecodeData {
    Slot(SlotIndex),
    Jump(JumpTarget),
    NumElements(usize),
    Value(InterpValue),
    Type(ConcreteType),
    Invocation(InvocationData),
    MatchArm(MatchArmItem),
    Trace(TraceData),
}

/// A single instruction: opcode, source span, optional payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    span: Span,
    op: Opcode,
    data: Option<BytecodeData>,
}

impl Bytecode {
    pub fn new(span: Span, op: Opcode) -> Self {
        Self { span, op, data: None }
    }

    pub fn with_data(span: Span, op: Opcode, data: BytecodeData) -> Self {
        Self {
            span,
            op,
            data: Some(data),
        }
    }

    // Convenience constructors for the payload-carrying opcodes.

    pub fn literal(span: Span, value: InterpValue) -> Self {
        Self::with_data(span, Opcode::Literal, BytecodeData::Value(value))
    }

    pub fn load(span: Span, slot: SlotIndex) -> Self {
        Self::with_data(span, Opcode::Load, BytecodeData::Slot(slot))
    }

    pub fn store(span: Span, slot: SlotIndex) -> Self {
        Self::with_data(span, Opcode::Store, BytecodeData::Slot(slot))
    }

    pub fn jump_dest(span: Span) -> Self {
        Self::new(span, Opcode::JumpDest)
    }

    pub fn jump_rel(span: Span, target: JumpTarget) -> Self {
        Self::with_data(span, Opcode::JumpRel, BytecodeData::Jump(target))
    }

    pub fn jump_rel_if(span: Span, target: JumpTarget) -> Self {
        Self::with_data(span, Opcode::JumpRelIf, BytecodeData::Jump(target))
    }

    pub fn create_array(span: Span, count: usize) -> Self {
        Self::with_data(span, Opcode::CreateArray, BytecodeData::NumElements(count))
    }

    pub fn create_tuple(span: Span, count: usize) -> Self {
        Self::with_data(span, Opcode::CreateTuple, BytecodeData::NumElements(count))
    }

    pub fn call(span: Span, data: InvocationData) -> Self {
        Self::with_data(span, Opcode::Call, BytecodeData::Invocation(data))
    }

    pub fn cast(span: Span, to: ConcreteType) -> Self {
        Self::with_data(span, Opcode::Cast, BytecodeData::Type(to))
    }

    pub fn width_slice(span: Span, to: ConcreteType) -> Self {
        Self::with_data(span, Opcode::WidthSlice, BytecodeData::Type(to))
    }

    pub fn match_arm(span: Span, item: MatchArmItem) -> Self {
        Self::with_data(span, Opcode::MatchArm, BytecodeData::MatchArm(item))
    }

    pub fn trace(span: Span, data: TraceData) -> Self {
        Self::with_data(span, Opcode::Trace, BytecodeData::Trace(data))
    }

    pub fn fail(span: Span, data: TraceData) -> Self {
        Self::with_data(span, Opcode::Fail, BytecodeData::Trace(data))
    }

    pub fn op(&self) -> Opcode {
        self.op
    }

    pub fn source_span(&self) -> Span {
        self.span
    }

    pub fn data(&self) -> Option<&BytecodeData> {
        self.data.as_ref()
    }

    fn payload_error(&self, wanted: &str) -> InterpError {
        InterpError::internal(format!("{} op requires {wanted} data", self.op))
    }

    // Typed payload accessors; a missing or mismatched payload is an
    // interpreter invariant violation, not a user error.

    pub fn slot_index(&self) -> InterpResult<SlotIndex> {
        match &self.data {
            Some(BytecodeData::Slot(slot)) => Ok(*slot),
            _ => Err(self.payload_error("slot index")),
        }
    }

    pub fn jump_target(&self) -> InterpResult<JumpTarget> {
        match &self.data {
            Some(BytecodeData::Jump(target)) => Ok(*target),
            _ => Err(self.payload_error("jump target")),
        }
    }

    pub fn num_elements(&self) -> InterpResult<usize> {
        match &self.data {
            Some(BytecodeData::NumElements(n)) => Ok(*n),
            _ => Err(self.payload_error("element count")),
        }
    }

    pub fn value_data(&self) -> InterpResult<&InterpValue> {
        match &self.data {
            Some(BytecodeData::Value(value)) => Ok(value),
            _ => Err(self.payload_error("value")),
        }
    }

    pub fn type_data(&self) -> InterpResult<&ConcreteType> {
        match &self.data {
            Some(BytecodeData::Type(ty)) => Ok(ty),
            _ => Err(self.payload_error("type")),
        }
    }

    pub fn invocation_data(&self) -> InterpResult<&InvocationData> {
        match &self.data {
            Some(BytecodeData::Invocation(data)) => Ok(data),
            _ => Err(self.payload_error("invocation")),
        }
    }

    pub fn match_arm_item(&self) -> InterpResult<&MatchArmItem> {
        match &self.data {
            Some(BytecodeData::MatchArm(item)) => Ok(item),
            _ => Err(self.payload_error("match arm")),
        }
    }

    pub fn trace_data(&self) -> InterpResult<&TraceData> {
        match &self.data {
            Some(BytecodeData::Trace(data)) => Ok(data),
            _ => Err(self.payload_error("trace")),
        }
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            None => write!(f, "{}", self.op),
            Some(BytecodeData::Slot(slot)) => write!(f, "{} {}", self.op, slot.value()),
            Some(BytecodeData::Jump(target)) => write!(f, "{} {:+}", self.op, target.value()),
            Some(BytecodeData::NumElements(n)) => write!(f, "{} {n}", self.op),
            Some(BytecodeData::Value(value)) => write!(f, "{} {value}", self.op),
            Some(BytecodeData::Type(ty)) => write!(f, "{} {ty}", self.op),
            Some(BytecodeData::Invocation(_)) => write!(f, "{} <invocation>", self.op),
            Some(BytecodeData::MatchArm(_)) => write!(f, "{} <pattern>", self.op),
            Some(BytecodeData::Trace(_)) => write!(f, "{} <trace>", self.op),
        }
    }
}

/// An immutable bytecode body plus its provenance.
///
/// `source` is absent for bodies synthesized inside the interpreter.
#[derive(Debug)]
pub struct BytecodeFunction {
    source: Option<FunctionId>,
    type_info: TypeInfoId,
    bytecodes: Vec<Bytecode>,
}

impl BytecodeFunction {
    pub fn create(
        source: Option<FunctionId>,
        type_info: TypeInfoId,
        bytecodes: Vec<Bytecode>,
    ) -> Self {
        Self {
            source,
            type_info,
            bytecodes,
        }
    }

    pub fn source(&self) -> Option<FunctionId> {
        self.source
    }

    pub fn type_info(&self) -> TypeInfoId {
        self.type_info
    }

    pub fn bytecodes(&self) -> &[Bytecode] {
        &self.bytecodes
    }
}

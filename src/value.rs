//! Runtime values for the bytecode interpreter.
//!
//! [`InterpValue`] is a tagged sum over everything a Silica expression can
//! evaluate to: signed/unsigned bit vectors, enum values, fixed-size arrays,
//! tuples, the sequencing `Token`, channel handles, and function references.
//!
//! Values are immutable by convention: every operation returns a fresh value.
//! The one exception to value semantics is [`ChannelRef`], which is a shared
//! handle - cloning a channel value aliases the same FIFO.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ast::FunctionId;
use crate::bits::Bits;
use crate::builtins::Builtin;
use crate::error::{InterpError, InterpResult};
use crate::format::FormatPreference;

/// An enum declaration handle, used for diagnostics when rendering enum
/// values. Identity does not participate in structural equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> EnumRef {
        Rc::new(Self { name: name.into() })
    }
}

pub type EnumRef = Rc<EnumDef>;

/// A shared handle onto an unbounded FIFO of values.
///
/// Channels are the sole value kind with sharing semantics: cloning the
/// handle aliases the same queue, and equality is handle identity.
#[derive(Debug, Clone, Default)]
pub struct ChannelRef(Rc<RefCell<VecDeque<InterpValue>>>);

impl ChannelRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, value: InterpValue) {
        self.0.borrow_mut().push_back(value);
    }

    pub fn pop_front(&self) -> Option<InterpValue> {
        self.0.borrow_mut().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

/// A callable value: either a user-defined function handle or a builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnValue {
    User(FunctionId),
    Builtin(Builtin),
}

/// The runtime value representation.
#[derive(Debug, Clone)]
pub enum InterpValue {
    /// Unsigned bit vector.
    UBits(Bits),
    /// Signed bit vector. Same storage as `UBits`; the tag governs
    /// comparison, extension, shift, and division semantics.
    SBits(Bits),
    /// Enum value; value-compatible with a same-width bits value.
    Enum {
        is_signed: bool,
        bits: Bits,
        def: EnumRef,
    },
    /// Fixed-length homogeneous array.
    Array(Vec<InterpValue>),
    /// Fixed-length heterogeneous tuple.
    Tuple(Vec<InterpValue>),
    /// Unit-like sentinel used for sequencing side effects.
    Token,
    /// Shared FIFO handle.
    Channel(ChannelRef),
    /// Function reference.
    Function(FnValue),
}

impl InterpValue {
    // -- constructors ---------------------------------------------------

    pub fn make_ubits(width: usize, value: u64) -> Self {
        Self::UBits(Bits::from_u64(width, value))
    }

    pub fn make_sbits(width: usize, value: i64) -> Self {
        Self::SBits(Bits::from_i64(width, value))
    }

    /// Wraps raw bits with the given signedness tag.
    pub fn make_bits(is_signed: bool, bits: Bits) -> Self {
        if is_signed {
            Self::SBits(bits)
        } else {
            Self::UBits(bits)
        }
    }

    pub fn make_bool(value: bool) -> Self {
        Self::make_ubits(1, u64::from(value))
    }

    pub fn make_u32(value: u32) -> Self {
        Self::make_ubits(32, u64::from(value))
    }

    pub fn make_token() -> Self {
        Self::Token
    }

    pub fn make_enum(is_signed: bool, bits: Bits, def: EnumRef) -> Self {
        Self::Enum { is_signed, bits, def }
    }

    /// Builds an array, checking element homogeneity.
    pub fn make_array(elements: Vec<InterpValue>) -> InterpResult<Self> {
        if let Some(first) = elements.first() {
            let kind = first.kind_name();
            if let Some(bad) = elements.iter().find(|e| e.kind_name() != kind) {
                return Err(InterpError::invalid_argument(format!(
                    "array elements must be homogeneous; found {kind} and {}",
                    bad.kind_name()
                )));
            }
        }
        Ok(Self::Array(elements))
    }

    pub fn make_tuple(elements: Vec<InterpValue>) -> Self {
        Self::Tuple(elements)
    }

    pub fn make_channel() -> Self {
        Self::Channel(ChannelRef::new())
    }

    pub fn make_user_fn(function: FunctionId) -> Self {
        Self::Function(FnValue::User(function))
    }

    pub fn make_builtin_fn(builtin: Builtin) -> Self {
        Self::Function(FnValue::Builtin(builtin))
    }

    // -- predicates and accessors ---------------------------------------

    /// A short label for the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::UBits(_) => "ubits",
            Self::SBits(_) => "sbits",
            Self::Enum { .. } => "enum",
            Self::Array(_) => "array",
            Self::Tuple(_) => "tuple",
            Self::Token => "token",
            Self::Channel(_) => "channel",
            Self::Function(_) => "function",
        }
    }

    /// True for plain bit vectors (not enums).
    pub fn is_bits(&self) -> bool {
        matches!(self, Self::UBits(_) | Self::SBits(_))
    }

    /// True for any bits-carrying value, including enums.
    pub fn has_bits(&self) -> bool {
        matches!(self, Self::UBits(_) | Self::SBits(_) | Self::Enum { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Self::Enum { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    pub fn is_builtin_function(&self) -> bool {
        matches!(self, Self::Function(FnValue::Builtin(_)))
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::SBits(_)) || matches!(self, Self::Enum { is_signed: true, .. })
    }

    /// True iff the value is bits-typed and equal to one.
    pub fn is_true(&self) -> bool {
        match self.bits() {
            Ok(b) => b.to_u64() == Some(1),
            Err(_) => false,
        }
    }

    /// True iff the value is bits-typed and zero.
    pub fn is_false(&self) -> bool {
        match self.bits() {
            Ok(b) => b.is_zero(),
            Err(_) => false,
        }
    }

    /// The underlying bits of a bits-carrying value.
    pub fn bits(&self) -> InterpResult<&Bits> {
        match self {
            Self::UBits(b) | Self::SBits(b) | Self::Enum { bits: b, .. } => Ok(b),
            other => Err(InterpError::invalid_argument(format!(
                "expected a bits-typed value, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn bit_count(&self) -> InterpResult<usize> {
        Ok(self.bits()?.width())
    }

    /// The elements of an array or tuple.
    pub fn values(&self) -> InterpResult<&[InterpValue]> {
        match self {
            Self::Array(v) | Self::Tuple(v) => Ok(v),
            other => Err(InterpError::invalid_argument(format!(
                "expected an aggregate value, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn get_channel(&self) -> InterpResult<&ChannelRef> {
        match self {
            Self::Channel(c) => Ok(c),
            other => Err(InterpError::invalid_argument(format!(
                "expected a channel value, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn get_function(&self) -> InterpResult<FnValue> {
        match self {
            Self::Function(f) => Ok(*f),
            other => Err(InterpError::invalid_argument(format!(
                "expected a function value, got {}",
                other.kind_name()
            ))),
        }
    }

    fn binop_bits<'a>(&'a self, rhs: &'a Self, op: &str) -> InterpResult<(&'a Bits, &'a Bits)> {
        if !self.is_bits() || !rhs.is_bits() {
            return Err(InterpError::invalid_argument(format!(
                "{op} requires bits-typed operands; got {} and {}",
                self.kind_name(),
                rhs.kind_name()
            )));
        }
        let (lhs_bits, rhs_bits) = (self.bits()?, rhs.bits()?);
        if lhs_bits.width() != rhs_bits.width() {
            return Err(InterpError::invalid_argument(format!(
                "{op} requires equal widths; got {} and {}",
                lhs_bits.width(),
                rhs_bits.width()
            )));
        }
        Ok((lhs_bits, rhs_bits))
    }

    // -- arithmetic (width-preserving, signedness from the lhs tag) -----

    pub fn add(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "add")?;
        Ok(Self::make_bits(self.is_signed(), l.add(r)))
    }

    pub fn sub(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "sub")?;
        Ok(Self::make_bits(self.is_signed(), l.sub(r)))
    }

    pub fn mul(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "mul")?;
        Ok(Self::make_bits(self.is_signed(), l.mul(r)))
    }

    pub fn floor_div(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "div")?;
        let result = if self.is_signed() { l.sdiv(r) } else { l.udiv(r) };
        Ok(Self::make_bits(self.is_signed(), result))
    }

    /// Unsigned addition yielding `(carry: u1, sum: uN)`.
    pub fn add_with_carry(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "add_with_carry")?;
        let wide = l.zero_ext(l.width() + 1).add(&r.zero_ext(r.width() + 1));
        let carry = Self::make_ubits(1, u64::from(wide.msb()));
        let sum = Self::UBits(wide.slice(0, l.width()));
        Ok(Self::make_tuple(vec![carry, sum]))
    }

    // -- bitwise --------------------------------------------------------

    pub fn bitwise_and(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "and")?;
        Ok(Self::make_bits(self.is_signed(), l.and(r)))
    }

    pub fn bitwise_or(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "or")?;
        Ok(Self::make_bits(self.is_signed(), l.or(r)))
    }

    pub fn bitwise_xor(&self, rhs: &Self) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, "xor")?;
        Ok(Self::make_bits(self.is_signed(), l.xor(r)))
    }

    pub fn bitwise_negate(&self) -> InterpResult<Self> {
        if !self.is_bits() {
            return Err(InterpError::invalid_argument(format!(
                "invert requires a bits-typed operand, got {}",
                self.kind_name()
            )));
        }
        Ok(Self::make_bits(self.is_signed(), self.bits()?.not()))
    }

    pub fn arithmetic_negate(&self) -> InterpResult<Self> {
        if !self.is_bits() {
            return Err(InterpError::invalid_argument(format!(
                "negate requires a bits-typed operand, got {}",
                self.kind_name()
            )));
        }
        Ok(Self::make_bits(self.is_signed(), self.bits()?.negate()))
    }

    // -- shifts ---------------------------------------------------------

    fn shift_amount(rhs: &Self) -> InterpResult<u64> {
        // Amounts too large for u64 are far past any real width; saturate.
        Ok(rhs.bits()?.to_u64().unwrap_or(u64::MAX))
    }

    /// Logical shift left.
    pub fn shl(&self, rhs: &Self) -> InterpResult<Self> {
        let amount = Self::shift_amount(rhs)?;
        Ok(Self::make_bits(self.is_signed(), self.bits()?.shll(amount)))
    }

    /// Logical shift right.
    pub fn shrl(&self, rhs: &Self) -> InterpResult<Self> {
        let amount = Self::shift_amount(rhs)?;
        Ok(Self::make_bits(self.is_signed(), self.bits()?.shrl(amount)))
    }

    /// Arithmetic shift right.
    pub fn shra(&self, rhs: &Self) -> InterpResult<Self> {
        let amount = Self::shift_amount(rhs)?;
        Ok(Self::make_bits(self.is_signed(), self.bits()?.shra(amount)))
    }

    // -- structure ------------------------------------------------------

    /// Concatenation: bits concatenate with `self` in the high-order
    /// position; arrays append.
    pub fn concat(&self, rhs: &Self) -> InterpResult<Self> {
        match (self, rhs) {
            (Self::UBits(l) | Self::SBits(l), Self::UBits(r) | Self::SBits(r)) => {
                Ok(Self::UBits(l.concat(r)))
            }
            (Self::Array(l), Self::Array(r)) => {
                let mut elements = l.clone();
                elements.extend(r.iter().cloned());
                Self::make_array(elements)
            }
            _ => Err(InterpError::invalid_argument(format!(
                "concat requires two bits-typed or two array operands; got {} and {}",
                self.kind_name(),
                rhs.kind_name()
            ))),
        }
    }

    // -- comparisons ----------------------------------------------------

    /// Structural equality. Signedness is ignored for the bit-pattern
    /// comparison; channels compare by handle identity.
    pub fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::UBits(l) | Self::SBits(l) | Self::Enum { bits: l, .. },
                Self::UBits(r) | Self::SBits(r) | Self::Enum { bits: r, .. },
            ) => l == r,
            (Self::Array(l), Self::Array(r)) | (Self::Tuple(l), Self::Tuple(r)) => {
                l.len() == r.len() && l.iter().zip(r.iter()).all(|(a, b)| a.eq(b))
            }
            (Self::Token, Self::Token) => true,
            (Self::Channel(l), Self::Channel(r)) => l.ptr_eq(r),
            (Self::Function(l), Self::Function(r)) => l == r,
            _ => false,
        }
    }

    pub fn ne(&self, other: &Self) -> bool {
        !self.eq(other)
    }

    fn ordered_cmp(
        &self,
        rhs: &Self,
        op: &str,
        signed: fn(&Bits, &Bits) -> bool,
        unsigned: fn(&Bits, &Bits) -> bool,
    ) -> InterpResult<Self> {
        let (l, r) = self.binop_bits(rhs, op)?;
        let result = if self.is_signed() { signed(l, r) } else { unsigned(l, r) };
        Ok(Self::make_bool(result))
    }

    pub fn lt(&self, rhs: &Self) -> InterpResult<Self> {
        self.ordered_cmp(rhs, "lt", Bits::slt, Bits::ult)
    }

    pub fn le(&self, rhs: &Self) -> InterpResult<Self> {
        self.ordered_cmp(rhs, "le", Bits::sle, Bits::ule)
    }

    pub fn gt(&self, rhs: &Self) -> InterpResult<Self> {
        self.ordered_cmp(rhs, "gt", Bits::sgt, Bits::ugt)
    }

    pub fn ge(&self, rhs: &Self) -> InterpResult<Self> {
        self.ordered_cmp(rhs, "ge", Bits::sge, Bits::uge)
    }

    // -- aggregate access -----------------------------------------------

    /// Indexes into an array or tuple.
    pub fn index(&self, index: &Self) -> InterpResult<Self> {
        let elements = self.values()?;
        let i = index
            .bits()?
            .to_u64()
            .ok_or_else(|| InterpError::invalid_argument("index does not fit in u64"))?;
        let i = usize::try_from(i)
            .map_err(|_| InterpError::invalid_argument("index does not fit in usize"))?;
        elements.get(i).cloned().ok_or_else(|| {
            InterpError::invalid_argument(format!(
                "index {i} out of bounds for length {}",
                elements.len()
            ))
        })
    }

    /// Returns a copy of an array with one element replaced.
    pub fn update(&self, index: &Self, new_value: &Self) -> InterpResult<Self> {
        let Self::Array(elements) = self else {
            return Err(InterpError::invalid_argument(format!(
                "update requires an array, got {}",
                self.kind_name()
            )));
        };
        let i = index
            .bits()?
            .to_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| InterpError::invalid_argument("update index does not fit in usize"))?;
        if i >= elements.len() {
            return Err(InterpError::invalid_argument(format!(
                "update index {i} out of bounds for length {}",
                elements.len()
            )));
        }
        let mut elements = elements.clone();
        elements[i] = new_value.clone();
        Ok(Self::Array(elements))
    }

    /// Flattens an array (recursively) into a single unsigned bits value,
    /// with element 0 occupying the high-order position.
    pub fn flatten(&self) -> InterpResult<Self> {
        match self {
            Self::UBits(b) | Self::SBits(b) | Self::Enum { bits: b, .. } => {
                Ok(Self::UBits(b.clone()))
            }
            Self::Array(elements) => {
                let mut accum = Bits::zero(0);
                for element in elements {
                    let flat = element.flatten()?;
                    accum = accum.concat(flat.bits()?);
                }
                Ok(Self::UBits(accum))
            }
            other => Err(InterpError::invalid_argument(format!(
                "cannot flatten a {} value",
                other.kind_name()
            ))),
        }
    }

    /// Slices `self` starting at `start`, with the result's shape taken
    /// from `proto`: a bits `proto` gives the slice width, an array
    /// `proto` gives the element count.
    pub fn slice(&self, start: &Self, proto: &Self) -> InterpResult<Self> {
        let start_index = start
            .bits()?
            .to_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| InterpError::invalid_argument("slice start does not fit in usize"))?;
        match self {
            Self::UBits(b) | Self::SBits(b) => {
                let width = proto.bit_count()?;
                Ok(Self::UBits(b.slice(start_index, width)))
            }
            Self::Array(elements) => {
                let len = proto.values()?.len();
                if start_index + len > elements.len() {
                    return Err(InterpError::invalid_argument(format!(
                        "array slice [{start_index}, {}) out of bounds for length {}",
                        start_index + len,
                        elements.len()
                    )));
                }
                Ok(Self::Array(elements[start_index..start_index + len].to_vec()))
            }
            other => Err(InterpError::invalid_argument(format!(
                "cannot slice a {} value",
                other.kind_name()
            ))),
        }
    }

    // -- extension ------------------------------------------------------

    /// Sign extension (or truncation); the result keeps the operand's tag.
    pub fn sign_ext(&self, new_width: usize) -> InterpResult<Self> {
        Ok(Self::make_bits(self.is_signed(), self.bits()?.sign_ext(new_width)))
    }

    /// Zero extension (or truncation); the result keeps the operand's tag.
    pub fn zero_ext(&self, new_width: usize) -> InterpResult<Self> {
        Ok(Self::make_bits(self.is_signed(), self.bits()?.zero_ext(new_width)))
    }

    /// One-hot encoding of a bits value; see [`Bits::one_hot`].
    pub fn one_hot(&self, lsb_priority: bool) -> InterpResult<Self> {
        Ok(Self::UBits(self.bits()?.one_hot(lsb_priority)))
    }

    // -- rendering ------------------------------------------------------

    /// Renders the value for trace and failure messages.
    pub fn to_human_string(&self, preference: FormatPreference) -> String {
        match self {
            Self::UBits(b) => Self::bits_string(b, false, preference),
            Self::SBits(b) => Self::bits_string(b, true, preference),
            Self::Enum { is_signed, bits, def } => {
                format!("{}:{}", def.name, Self::bits_string(bits, *is_signed, preference))
            }
            Self::Array(elements) => {
                let parts: Vec<String> =
                    elements.iter().map(|e| e.to_human_string(preference)).collect();
                format!("[{}]", parts.join(", "))
            }
            Self::Tuple(elements) => {
                let parts: Vec<String> =
                    elements.iter().map(|e| e.to_human_string(preference)).collect();
                format!("({})", parts.join(", "))
            }
            Self::Token => "token".to_string(),
            Self::Channel(c) => format!("channel(len={})", c.len()),
            Self::Function(FnValue::User(id)) => format!("fn#{}", id.index()),
            Self::Function(FnValue::Builtin(b)) => format!("builtin:{b}"),
        }
    }

    fn bits_string(bits: &Bits, is_signed: bool, preference: FormatPreference) -> String {
        match preference {
            FormatPreference::Default => {
                if is_signed {
                    bits.signed_decimal_string()
                } else {
                    bits.unsigned_decimal_string()
                }
            }
            FormatPreference::Binary => bits.binary_string(),
            FormatPreference::SignedDecimal => bits.signed_decimal_string(),
            FormatPreference::UnsignedDecimal => bits.unsigned_decimal_string(),
            FormatPreference::Hex => bits.hex_string(),
        }
    }
}

impl PartialEq for InterpValue {
    fn eq(&self, other: &Self) -> bool {
        InterpValue::eq(self, other)
    }
}

impl Eq for InterpValue {}

impl Hash for InterpValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            // All bits-carrying kinds hash identically so that structural
            // equality (which ignores signedness) stays consistent.
            Self::UBits(b) | Self::SBits(b) | Self::Enum { bits: b, .. } => {
                0u8.hash(state);
                b.hash(state);
            }
            Self::Array(elements) => {
                1u8.hash(state);
                elements.hash(state);
            }
            Self::Tuple(elements) => {
                2u8.hash(state);
                elements.hash(state);
            }
            Self::Token => 3u8.hash(state),
            Self::Channel(c) => {
                4u8.hash(state);
                c.addr().hash(state);
            }
            Self::Function(f) => {
                5u8.hash(state);
                f.hash(state);
            }
        }
    }
}

impl fmt::Display for InterpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_string(FormatPreference::Default))
    }
}

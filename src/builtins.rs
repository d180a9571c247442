//! Builtin function identifiers.
//!
//! Builtins are callable values dispatched by the interpreter without a
//! bytecode body (`map` being the exception: it synthesizes one at call
//! time). The enum is closed; handlers live in the interpreter.

use strum::{Display, EnumString, IntoStaticStr};

/// Identifier of a builtin function.
///
/// The string form is the name users write at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Builtin {
    AddWithCarry,
    AndReduce,
    AssertEq,
    AssertLt,
    BitSlice,
    BitSliceUpdate,
    Clz,
    Cover,
    Ctz,
    Enumerate,
    Fail,
    Gate,
    Map,
    OneHot,
    OneHotSel,
    OrReduce,
    Range,
    Rev,
    Signex,
    Slice,
    Trace,
    Update,
    XorReduce,
}

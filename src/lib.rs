//! Bytecode interpreter core for the Silica hardware-description DSL.
//!
//! Silica is a strongly-typed, expression-oriented language whose values
//! are finite-width bit vectors, fixed-size arrays, tuples, enums, typed
//! functions, and ordered channels. This crate executes the flat,
//! stack-based bytecode an external emitter produces from a typechecked
//! AST, yielding one runtime value.
//!
//! The execution model is a single value stack shared by a stack of call
//! frames; each frame holds a program counter, local slots, and a handle
//! onto an immutable [`BytecodeFunction`]. Bytecode for parametric and
//! cross-module callees is materialized just in time through the
//! [`BytecodeCache`]; the `map` builtin synthesizes a private loop body at
//! call time instead.
//!
//! The entry point is [`interpret`]:
//!
//! ```
//! use std::rc::Rc;
//! use silica::{interpret, Bytecode, BytecodeFunction, ImportData, InterpValue, Span};
//!
//! # struct NoEmit;
//! # impl silica::BytecodeEmitter for NoEmit {
//! #     fn emit(
//! #         &self,
//! #         _: silica::FunctionId,
//! #         _: silica::TypeInfoId,
//! #         _: Option<&silica::ParametricEnv>,
//! #     ) -> silica::InterpResult<BytecodeFunction> {
//! #         unimplemented!()
//! #     }
//! # }
//! let mut import_data = ImportData::new(Box::new(NoEmit));
//! let module = import_data.add_module("top");
//! let type_info = import_data.root_type_info(module);
//! let bf = Rc::new(BytecodeFunction::create(
//!     None,
//!     type_info,
//!     vec![Bytecode::literal(Span::default(), InterpValue::make_u32(42))],
//! ));
//! let result = interpret(&mut import_data, &bf, vec![]).unwrap();
//! assert_eq!(result, InterpValue::make_u32(42));
//! ```

mod ast;
mod bits;
mod builtins;
mod bytecode;
mod error;
mod format;
mod interpreter;
mod types;
mod value;

pub use crate::{
    ast::{
        BytecodeEmitter, FunctionData, FunctionId, ImportData, InvocationId, ModuleId,
        ParametricEnv, Pos, Span, TypeInfoId,
    },
    bits::Bits,
    builtins::Builtin,
    bytecode::{
        cache::BytecodeCache, Bytecode, BytecodeData, BytecodeFunction, InvocationData, JumpTarget,
        MatchArmItem, Opcode, SlotIndex, TraceData, TraceItem,
    },
    error::{ErrorKind, InterpError, InterpResult},
    format::FormatPreference,
    interpreter::interpret,
    types::ConcreteType,
    value::{ChannelRef, EnumDef, EnumRef, FnValue, InterpValue},
};

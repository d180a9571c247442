//! Memoized bytecode materialization.
//!
//! Parametric and cross-module callees have their bytecode emitted at most
//! once per `(function, type info, parametric env)` triple; all frames
//! executing the same specialization share one immutable body. Bodies
//! synthesized inside the interpreter (the `map` loop) bypass the cache on
//! purpose, so the cache does not grow with every distinct array length.

use std::rc::Rc;

use ahash::AHashMap;
use tracing::debug;

use crate::ast::{BytecodeEmitter, FunctionId, ParametricEnv, TypeInfoId};
use crate::bytecode::BytecodeFunction;
use crate::error::InterpResult;

type CacheKey = (FunctionId, TypeInfoId, Option<ParametricEnv>);

/// Process-wide (per-`ImportData`) memoization of emitted bytecode.
#[derive(Debug, Default)]
pub struct BytecodeCache {
    entries: AHashMap<CacheKey, Rc<BytecodeFunction>>,
}

impl BytecodeCache {
    /// Returns the cached body for the triple, emitting and storing it on a
    /// miss. Equal keys always yield the same (pointer-equal) body.
    pub fn get_or_create(
        &mut self,
        emitter: &dyn BytecodeEmitter,
        function: FunctionId,
        type_info: TypeInfoId,
        env: Option<&ParametricEnv>,
    ) -> InterpResult<Rc<BytecodeFunction>> {
        let key = (function, type_info, env.cloned());
        if let Some(bf) = self.entries.get(&key) {
            return Ok(Rc::clone(bf));
        }
        debug!(function = function.index(), type_info = type_info.index(), "bytecode cache miss");
        let bf = Rc::new(emitter.emit(function, type_info, env)?);
        self.entries.insert(key, Rc::clone(&bf));
        Ok(bf)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Shared test scaffolding: a table-driven bytecode emitter and helpers
//! for running raw bytecode sequences through the interpreter.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use silica::{
    interpret, Bytecode, BytecodeEmitter, BytecodeFunction, FunctionId, ImportData, InterpError,
    InterpResult, InterpValue, ParametricEnv, TypeInfoId,
};

type BodyFn = Rc<dyn Fn(Option<&ParametricEnv>) -> Vec<Bytecode>>;

#[derive(Default)]
struct Inner {
    bodies: HashMap<usize, BodyFn>,
    /// `(function index, type info index)` per emission, for asserting on
    /// cache behavior and type-info resolution.
    emitted: Vec<(usize, usize)>,
}

/// An emitter whose bodies are installed by the test after the functions
/// are registered. Clones share state, so tests can keep a handle while
/// `ImportData` owns the boxed copy.
#[derive(Clone, Default)]
pub struct TableEmitter {
    inner: Rc<RefCell<Inner>>,
}

impl TableEmitter {
    pub fn install(
        &self,
        function: FunctionId,
        body: impl Fn(Option<&ParametricEnv>) -> Vec<Bytecode> + 'static,
    ) {
        self.inner
            .borrow_mut()
            .bodies
            .insert(function.index(), Rc::new(body));
    }

    pub fn install_fixed(&self, function: FunctionId, body: Vec<Bytecode>) {
        self.install(function, move |_| body.clone());
    }

    pub fn emit_count(&self) -> usize {
        self.inner.borrow().emitted.len()
    }

    pub fn emitted(&self) -> Vec<(usize, usize)> {
        self.inner.borrow().emitted.clone()
    }
}

impl BytecodeEmitter for TableEmitter {
    fn emit(
        &self,
        function: FunctionId,
        type_info: TypeInfoId,
        env: Option<&ParametricEnv>,
    ) -> InterpResult<BytecodeFunction> {
        let body = {
            let mut inner = self.inner.borrow_mut();
            inner.emitted.push((function.index(), type_info.index()));
            inner.bodies.get(&function.index()).cloned()
        };
        let body = body.ok_or_else(|| {
            InterpError::internal(format!("no body installed for function {}", function.index()))
        })?;
        Ok(BytecodeFunction::create(Some(function), type_info, body(env)))
    }
}

pub fn import_data() -> (ImportData, TableEmitter) {
    let emitter = TableEmitter::default();
    (ImportData::new(Box::new(emitter.clone())), emitter)
}

/// Runs a raw bytecode sequence as a sourceless body and returns the final
/// stack top.
pub fn run(bytecodes: Vec<Bytecode>, args: Vec<InterpValue>) -> InterpResult<InterpValue> {
    let (mut import_data, _emitter) = import_data();
    let module = import_data.add_module("test");
    let type_info = import_data.root_type_info(module);
    let bf = Rc::new(BytecodeFunction::create(None, type_info, bytecodes));
    interpret(&mut import_data, &bf, args)
}

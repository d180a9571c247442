//! Call handling: builtin dispatch and user-function frame setup.

use std::rc::Rc;

use tracing::debug;

use super::{BytecodeInterpreter, Frame};
use crate::ast::FunctionId;
use crate::bytecode::{Bytecode, BytecodeFunction, InvocationData};
use crate::error::{InterpError, InterpResult};
use crate::value::FnValue;

impl BytecodeInterpreter<'_> {
    /// Stack shape on entry: `[..., arg0, .., arg{n-1}, callee]`.
    ///
    /// For a builtin callee the caller's PC is advanced to the return site
    /// and the handler runs in place on the current frame (it may still
    /// push a frame - `map` does). For a user callee the resolved bytecode
    /// gets a fresh frame with the arguments as its initial slots.
    pub(super) fn eval_call(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let callee = self.pop()?;
        match callee.get_function()? {
            FnValue::Builtin(builtin) => {
                self.current_frame_mut()?.pc += 1;
                self.run_builtin(builtin, bytecode)
            }
            FnValue::User(function) => {
                let data = bytecode.invocation_data()?.clone();
                let bf = self.resolve_callee_bytecode(function, &data)?;
                debug!(callee = %self.import_data.function(function).name, "call");

                // Store the return PC before the callee frame goes on top.
                self.current_frame_mut()?.pc += 1;

                let param_count = self.import_data.function(function).param_count;
                let args = self.pop_n(param_count)?;
                let type_info = bf.type_info();
                self.frames.push(Frame::new(bf, args, type_info, data.env));
                Ok(())
            }
        }
    }

    /// Resolves the callee's bytecode through the cache.
    ///
    /// The type info used for resolution is, in order: the caller frame's
    /// instantiation for a parametric callee (absence is fatal), the root
    /// type info of the callee's module for a non-parametric cross-module
    /// call, and otherwise the caller's own type info. The bindings come
    /// from the invocation payload alone.
    fn resolve_callee_bytecode(
        &mut self,
        function: FunctionId,
        data: &InvocationData,
    ) -> InterpResult<Rc<BytecodeFunction>> {
        let caller_type_info = self.current_frame()?.type_info;
        let (is_parametric, callee_module) = {
            let fdata = self.import_data.function(function);
            (fdata.is_parametric, fdata.module)
        };

        let type_info = if is_parametric {
            let env = data.env.as_ref().ok_or_else(|| {
                InterpError::internal("parametric callee invoked without caller bindings")
            })?;
            self.import_data
                .type_info(caller_type_info)
                .instantiation(data.invocation, env)
                .ok_or_else(|| {
                    let span = self.import_data.invocation(data.invocation).span;
                    InterpError::internal(format!(
                        "could not find type info for invocation at {span} with env {env}"
                    ))
                })?
        } else if callee_module != self.import_data.type_info(caller_type_info).module() {
            self.import_data.root_type_info(callee_module)
        } else {
            caller_type_info
        };

        self.import_data
            .get_or_create_bytecode(function, type_info, data.env.as_ref())
    }
}

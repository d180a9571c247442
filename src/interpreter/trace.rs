//! Trace and failure message rendering.
//!
//! Trace data interleaves literal strings with format directives. Format
//! directives consume stack values right-to-left (the last directive takes
//! the top of stack); the rendered pieces are then concatenated in source
//! order, with a single space after each literal that has a following
//! item.

use tracing::info;

use super::BytecodeInterpreter;
use crate::bytecode::{Bytecode, TraceData, TraceItem};
use crate::error::{InterpError, InterpResult};
use crate::value::InterpValue;

impl BytecodeInterpreter<'_> {
    pub(super) fn trace_data_to_string(&mut self, trace_data: &TraceData) -> InterpResult<String> {
        let mut pieces: Vec<String> = vec![String::new(); trace_data.len()];
        for i in (0..trace_data.len()).rev() {
            match &trace_data[i] {
                TraceItem::Literal(s) => pieces[i].clone_from(s),
                TraceItem::Format(preference) => {
                    let value = self.pop()?;
                    pieces[i] = value.to_human_string(*preference);
                }
            }
        }

        let mut out = String::new();
        for (i, piece) in pieces.iter().enumerate() {
            out.push_str(piece);
            if matches!(trace_data[i], TraceItem::Literal(_)) && i + 1 < trace_data.len() {
                out.push(' ');
            }
        }
        Ok(out)
    }

    /// `Trace`: renders the message, logs it at INFO, and pushes a token.
    pub(super) fn eval_trace(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let trace_data = bytecode.trace_data()?;
        let message = self.trace_data_to_string(trace_data)?;
        info!("{message}");
        self.push(InterpValue::make_token());
        Ok(())
    }

    /// `Fail`: renders the message and returns it as a failure error
    /// carrying the opcode's source span.
    pub(super) fn eval_fail(&mut self, bytecode: &Bytecode) -> InterpError {
        let trace_data = match bytecode.trace_data() {
            Ok(data) => data,
            Err(err) => return err,
        };
        match self.trace_data_to_string(trace_data) {
            Ok(message) => InterpError::failure(bytecode.source_span(), message),
            Err(err) => err,
        }
    }
}

//! The stack-machine execution engine.
//!
//! A single value stack is shared by all frames; each [`Frame`] owns its
//! program counter, local slots, and a handle onto the bytecode it runs.
//! Dispatch is a flat match on the closed opcode set. Exactly one frame
//! executes at a time; the only control transfer is `Call` pushing a frame
//! and end-of-bytecodes popping one.

mod builtins;
mod call;
mod cast;
mod matcher;
mod trace;

use std::rc::Rc;

use tracing::trace;

use crate::ast::{ImportData, ParametricEnv, TypeInfoId};
use crate::bytecode::{Bytecode, BytecodeFunction, Opcode, SlotIndex};
use crate::error::{InterpError, InterpResult};
use crate::value::InterpValue;

/// One activation record.
///
/// The `Rc` body handle covers both cached functions (shared with the
/// cache) and synthetic bodies (sole owner; discarded when the frame pops).
pub(crate) struct Frame {
    pc: usize,
    slots: Vec<InterpValue>,
    bf: Rc<BytecodeFunction>,
    type_info: TypeInfoId,
    /// The bindings this frame's body was specialized under, carried for
    /// the lifetime of the call. Callee resolution reads bindings from
    /// the `Call` payload, never from here.
    #[expect(dead_code)]
    env: Option<ParametricEnv>,
}

impl Frame {
    fn new(
        bf: Rc<BytecodeFunction>,
        args: Vec<InterpValue>,
        type_info: TypeInfoId,
        env: Option<ParametricEnv>,
    ) -> Self {
        Self {
            pc: 0,
            slots: args,
            bf,
            type_info,
            env,
        }
    }

    /// Writes `value` into `slot`, padding any gap with `Token` values.
    ///
    /// Slots are assigned in ascending order of first use, so growth is
    /// normally by a single slot.
    fn store_slot(&mut self, slot: SlotIndex, value: InterpValue) {
        while self.slots.len() <= slot.value() {
            self.slots.push(InterpValue::make_token());
        }
        self.slots[slot.value()] = value;
    }
}

/// Interprets `bf` with the given arguments pre-placed in the bottom
/// frame's slots, returning the final stack top.
///
/// The bottom frame's type info comes from the root type info of the
/// source function's module when the body has a source, and from the body
/// itself otherwise (synthetic or test-constructed bytecode).
pub fn interpret(
    import_data: &mut ImportData,
    bf: &Rc<BytecodeFunction>,
    args: Vec<InterpValue>,
) -> InterpResult<InterpValue> {
    let type_info = match bf.source() {
        Some(function) => {
            let module = import_data.function(function).module;
            import_data.root_type_info(module)
        }
        None => bf.type_info(),
    };

    let mut interpreter = BytecodeInterpreter {
        import_data,
        stack: Vec::with_capacity(64),
        frames: Vec::with_capacity(8),
    };
    interpreter
        .frames
        .push(Frame::new(Rc::clone(bf), args, type_info, None));
    interpreter.run()?;
    interpreter
        .stack
        .pop()
        .ok_or_else(|| InterpError::internal("value stack was empty at end of interpretation"))
}

/// The value-stack machine.
pub(crate) struct BytecodeInterpreter<'a> {
    import_data: &'a mut ImportData,
    stack: Vec<InterpValue>,
    frames: Vec<Frame>,
}

impl BytecodeInterpreter<'_> {
    /// Main dispatch loop.
    ///
    /// Runs the top frame until its PC passes the end of its bytecodes,
    /// then pops it and resumes the caller. After any instruction that is
    /// neither a `Call` nor a straight-line step, the landing instruction
    /// must be a `jump_dest`.
    fn run(&mut self) -> InterpResult<()> {
        while let Some(frame) = self.frames.last() {
            if frame.pc >= frame.bf.bytecodes().len() {
                self.frames.pop();
                continue;
            }

            let bf = Rc::clone(&frame.bf);
            let old_pc = frame.pc;
            let bytecode = &bf.bytecodes()[old_pc];
            trace!(pc = old_pc, depth = self.stack.len(), "dispatch {bytecode}");
            self.eval_instruction(bytecode)?;

            if bytecode.op() == Opcode::Call {
                // The callee's frame (or, for a builtin, the caller with
                // its PC already at the return site) is now current.
                continue;
            }

            let frame = self
                .frames
                .last()
                .ok_or_else(|| InterpError::internal("frame stack empty after instruction"))?;
            if frame.pc != old_pc + 1 {
                match frame.bf.bytecodes().get(frame.pc) {
                    Some(landing) if landing.op() == Opcode::JumpDest => {}
                    Some(landing) => {
                        return Err(InterpError::internal(format!(
                            "jump from PC {old_pc} to PC {} landed on {landing}, not a jump destination",
                            frame.pc
                        )));
                    }
                    None => {
                        return Err(InterpError::internal(format!(
                            "jump from PC {old_pc} to PC {} overran the bytecode",
                            frame.pc
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Executes one instruction and leaves the PC at the next instruction
    /// to run. `Call` and taken jumps set the PC themselves; every other
    /// opcode falls through to the increment at the bottom.
    fn eval_instruction(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        match bytecode.op() {
            Opcode::Add => self.eval_binop(InterpValue::add)?,
            Opcode::And => self.eval_binop(InterpValue::bitwise_and)?,
            Opcode::Call => {
                self.eval_call(bytecode)?;
                return Ok(());
            }
            Opcode::Cast => self.eval_cast(bytecode)?,
            Opcode::Concat => self.eval_binop(InterpValue::concat)?,
            Opcode::CreateArray => self.eval_create_array(bytecode)?,
            Opcode::CreateTuple => self.eval_create_tuple(bytecode)?,
            Opcode::Div => self.eval_binop(InterpValue::floor_div)?,
            Opcode::Dup => {
                let top = self.peek()?.clone();
                self.push(top);
            }
            Opcode::Eq => self.eval_binop(|l, r| Ok(InterpValue::make_bool(l.eq(r))))?,
            Opcode::ExpandTuple => self.eval_expand_tuple()?,
            Opcode::Fail => return Err(self.eval_fail(bytecode)),
            Opcode::Ge => self.eval_binop(InterpValue::ge)?,
            Opcode::Gt => self.eval_binop(InterpValue::gt)?,
            Opcode::Index => self.eval_index()?,
            Opcode::Invert => self.eval_unop(InterpValue::bitwise_negate)?,
            Opcode::JumpDest => {}
            Opcode::JumpRel => {
                let target = bytecode.jump_target()?;
                self.jump_by(target.value())?;
                return Ok(());
            }
            Opcode::JumpRelIf => {
                let condition = self.pop()?;
                if condition.is_true() {
                    let target = bytecode.jump_target()?;
                    self.jump_by(target.value())?;
                    return Ok(());
                }
            }
            Opcode::Le => self.eval_binop(InterpValue::le)?,
            Opcode::Literal => {
                let value = bytecode.value_data()?.clone();
                self.push(value);
            }
            Opcode::Load => self.eval_load(bytecode)?,
            Opcode::LogicalAnd => self.eval_logical("logical and", InterpValue::bitwise_and)?,
            Opcode::LogicalOr => self.eval_logical("logical or", InterpValue::bitwise_or)?,
            Opcode::Lt => self.eval_binop(InterpValue::lt)?,
            Opcode::MatchArm => self.eval_match_arm(bytecode)?,
            Opcode::Mul => self.eval_binop(InterpValue::mul)?,
            Opcode::Ne => self.eval_binop(|l, r| Ok(InterpValue::make_bool(l.ne(r))))?,
            Opcode::Negate => self.eval_unop(InterpValue::arithmetic_negate)?,
            Opcode::Or => self.eval_binop(InterpValue::bitwise_or)?,
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Recv => self.eval_recv()?,
            Opcode::Send => self.eval_send()?,
            Opcode::Shl => self.eval_binop(InterpValue::shl)?,
            Opcode::Shr => self.eval_binop(|l, r| {
                // Arithmetic shift for a signed lhs, logical otherwise.
                if l.is_signed() {
                    l.shra(r)
                } else {
                    l.shrl(r)
                }
            })?,
            Opcode::Slice => self.eval_slice()?,
            Opcode::Store => {
                let slot = bytecode.slot_index()?;
                let value = self.pop()?;
                self.current_frame_mut()?.store_slot(slot, value);
            }
            Opcode::Sub => self.eval_binop(InterpValue::sub)?,
            Opcode::Swap => {
                let tos0 = self.pop()?;
                let tos1 = self.pop()?;
                self.push(tos0);
                self.push(tos1);
            }
            Opcode::Trace => self.eval_trace(bytecode)?,
            Opcode::WidthSlice => self.eval_width_slice(bytecode)?,
            Opcode::Xor => self.eval_binop(InterpValue::bitwise_xor)?,
        }

        self.current_frame_mut()?.pc += 1;
        Ok(())
    }

    // -- stack and frame plumbing ---------------------------------------

    fn push(&mut self, value: InterpValue) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> InterpResult<InterpValue> {
        self.stack
            .pop()
            .ok_or_else(|| InterpError::internal("tried to pop off an empty stack"))
    }

    fn peek(&self) -> InterpResult<&InterpValue> {
        self.stack
            .last()
            .ok_or_else(|| InterpError::internal("tried to peek at an empty stack"))
    }

    /// Pops `n` values, returned in their original push order.
    fn pop_n(&mut self, n: usize) -> InterpResult<Vec<InterpValue>> {
        if self.stack.len() < n {
            return Err(InterpError::internal(format!(
                "needed {n} stack values, had {}",
                self.stack.len()
            )));
        }
        let start = self.stack.len() - n;
        Ok(self.stack.split_off(start))
    }

    fn current_frame(&self) -> InterpResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| InterpError::internal("no active frame"))
    }

    fn current_frame_mut(&mut self) -> InterpResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| InterpError::internal("no active frame"))
    }

    /// Applies a relative displacement to the current frame's PC.
    fn jump_by(&mut self, delta: isize) -> InterpResult<()> {
        let frame = self.current_frame_mut()?;
        let new_pc = isize::try_from(frame.pc)
            .ok()
            .map(|pc| pc + delta)
            .filter(|pc| *pc >= 0)
            .ok_or_else(|| {
                InterpError::internal(format!("jump by {delta} from PC {} underflows", frame.pc))
            })?;
        frame.pc = usize::try_from(new_pc).expect("non-negative PC fits usize");
        Ok(())
    }

    // -- generic operand shapes -----------------------------------------

    /// Pops `rhs` then `lhs` (rhs-on-top convention), pushes the result.
    fn eval_binop(
        &mut self,
        op: impl Fn(&InterpValue, &InterpValue) -> InterpResult<InterpValue>,
    ) -> InterpResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let result = op(&lhs, &rhs)?;
        self.push(result);
        Ok(())
    }

    fn eval_unop(
        &mut self,
        op: impl Fn(&InterpValue) -> InterpResult<InterpValue>,
    ) -> InterpResult<()> {
        let operand = self.pop()?;
        let result = op(&operand)?;
        self.push(result);
        Ok(())
    }

    // -- simple opcode handlers -----------------------------------------

    fn eval_load(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let slot = bytecode.slot_index()?;
        let frame = self.current_frame()?;
        let value = frame.slots.get(slot.value()).cloned().ok_or_else(|| {
            InterpError::internal(format!(
                "load from slot {} is out of range ({} slots)",
                slot.value(),
                frame.slots.len()
            ))
        })?;
        self.push(value);
        Ok(())
    }

    /// Both operands of a logical op must be 1-bit values.
    fn eval_logical(
        &mut self,
        op_name: &str,
        op: impl Fn(&InterpValue, &InterpValue) -> InterpResult<InterpValue>,
    ) -> InterpResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        for (side, value) in [("lhs", &lhs), ("rhs", &rhs)] {
            let ok = value.has_bits() && value.bit_count()? == 1;
            if !ok {
                return Err(InterpError::invalid_argument(format!(
                    "{op_name} arguments must be boolean; {side} was {}",
                    value.kind_name()
                )));
            }
        }
        let result = op(&lhs, &rhs)?;
        self.push(result);
        Ok(())
    }

    fn eval_create_array(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let count = bytecode.num_elements()?;
        let elements = self.pop_n(count)?;
        let array = InterpValue::make_array(elements)?;
        self.push(array);
        Ok(())
    }

    fn eval_create_tuple(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let count = bytecode.num_elements()?;
        let elements = self.pop_n(count)?;
        self.push(InterpValue::make_tuple(elements));
        Ok(())
    }

    /// Pops a tuple and pushes its elements such that element 0 ends up on
    /// top of the stack.
    fn eval_expand_tuple(&mut self) -> InterpResult<()> {
        let tuple = self.pop()?;
        let InterpValue::Tuple(elements) = tuple else {
            return Err(InterpError::invalid_argument(format!(
                "stack top for expand_tuple was not a tuple, was {}",
                tuple.kind_name()
            )));
        };
        for element in elements.into_iter().rev() {
            self.push(element);
        }
        Ok(())
    }

    fn eval_index(&mut self) -> InterpResult<()> {
        let index = self.pop()?;
        let basis = self.pop()?;
        if !basis.is_array() && !basis.is_tuple() {
            return Err(InterpError::invalid_argument(format!(
                "can only index on array or tuple values, got {}",
                basis.kind_name()
            )));
        }
        let result = basis.index(&index)?;
        self.push(result);
        Ok(())
    }

    fn eval_send(&mut self) -> InterpResult<()> {
        let payload = self.pop()?;
        let channel_value = self.pop()?;
        channel_value.get_channel()?.push_back(payload);
        Ok(())
    }

    fn eval_recv(&mut self) -> InterpResult<()> {
        let channel_value = self.pop()?;
        let head = channel_value
            .get_channel()?
            .pop_front()
            .ok_or_else(|| InterpError::unavailable("channel is empty"))?;
        self.push(head);
        Ok(())
    }
}

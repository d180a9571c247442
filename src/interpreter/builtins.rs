//! Builtin function handlers.
//!
//! Builtins execute in place on the caller's frame: the `Call` handler has
//! already advanced the caller's PC to the return site and popped the
//! callee, so each handler just consumes its arguments from the stack and
//! pushes its result. `map` is special: it synthesizes a bytecode loop and
//! pushes a frame for it.

use std::rc::Rc;

use tracing::debug;

use super::{BytecodeInterpreter, Frame};
use crate::bits::Bits;
use crate::builtins::Builtin;
use crate::bytecode::{Bytecode, BytecodeFunction, JumpTarget, Opcode, SlotIndex};
use crate::error::{InterpError, InterpResult};
use crate::format::FormatPreference;
use crate::value::InterpValue;

impl BytecodeInterpreter<'_> {
    pub(super) fn run_builtin(&mut self, builtin: Builtin, bytecode: &Bytecode) -> InterpResult<()> {
        debug!("running builtin {builtin}");
        match builtin {
            Builtin::AddWithCarry => self.run_binary_builtin(|a, b| a.add_with_carry(b)),
            Builtin::AndReduce => {
                self.run_unary_builtin(|v| Ok(InterpValue::make_bool(v.bits()?.and_reduce())))
            }
            Builtin::AssertEq => self.run_builtin_assert_eq(bytecode),
            Builtin::AssertLt => self.run_builtin_assert_lt(bytecode),
            Builtin::BitSlice => self.run_ternary_builtin(|subject, start, width| {
                let subject_bits = subject.bits()?;
                let start_index = start
                    .bits()?
                    .to_u64()
                    .and_then(|v| usize::try_from(v).ok())
                    .map_or(subject_bits.width(), |v| v.min(subject_bits.width()));
                Ok(InterpValue::UBits(
                    subject_bits.slice(start_index, width.bit_count()?),
                ))
            }),
            Builtin::BitSliceUpdate => self.run_ternary_builtin(|subject, start, update| {
                let subject_bits = subject.bits()?;
                let Some(start_index) = start
                    .bits()?
                    .to_u64()
                    .and_then(|v| usize::try_from(v).ok())
                    .filter(|v| *v < subject_bits.width())
                else {
                    // Update entirely out of bounds; the subject is unchanged.
                    return Ok(InterpValue::UBits(subject_bits.clone()));
                };
                Ok(InterpValue::UBits(
                    subject_bits.update_slice(start_index, update.bits()?),
                ))
            }),
            Builtin::Clz => self.run_unary_builtin(|v| {
                let bits = v.bits()?;
                Ok(InterpValue::make_ubits(
                    bits.width(),
                    bits.leading_zeros() as u64,
                ))
            }),
            Builtin::Cover => {
                // Discard the label and condition; coverpoints are only
                // meaningful to downstream codegen.
                self.pop()?;
                self.pop()?;
                self.push(InterpValue::make_token());
                Ok(())
            }
            Builtin::Ctz => self.run_unary_builtin(|v| {
                let bits = v.bits()?;
                Ok(InterpValue::make_ubits(
                    bits.width(),
                    bits.trailing_zeros() as u64,
                ))
            }),
            Builtin::Enumerate => self.run_unary_builtin(|v| {
                let elements = v.values()?;
                let pairs = elements
                    .iter()
                    .enumerate()
                    .map(|(i, element)| {
                        InterpValue::make_tuple(vec![
                            InterpValue::make_u32(u32::try_from(i).expect("array length fits u32")),
                            element.clone(),
                        ])
                    })
                    .collect();
                InterpValue::make_array(pairs)
            }),
            Builtin::Fail => {
                let value = self.pop()?;
                Err(InterpError::failure(
                    bytecode.source_span(),
                    value.to_human_string(FormatPreference::Default),
                ))
            }
            Builtin::Gate => self.run_binary_builtin(|pass_value, value| {
                if pass_value.is_true() {
                    Ok(value.clone())
                } else {
                    zero_value_of(value)
                }
            }),
            Builtin::Map => self.run_builtin_map(bytecode),
            Builtin::OneHot => {
                self.run_binary_builtin(|input, lsb_priority| input.one_hot(lsb_priority.is_true()))
            }
            Builtin::OneHotSel => self.run_binary_builtin(|selector, cases_array| {
                let selector_bits = selector.bits()?;
                let cases = cases_array.values()?;
                let Some(first) = cases.first() else {
                    return Err(InterpError::internal(
                        "at least one case must be specified for one_hot_sel",
                    ));
                };
                let mut result = Bits::zero(first.bit_count()?);
                for (i, case) in cases.iter().enumerate() {
                    if selector_bits.bit(i) {
                        result = result.or(case.bits()?);
                    }
                }
                Ok(InterpValue::make_bits(first.is_signed(), result))
            }),
            Builtin::OrReduce => {
                self.run_unary_builtin(|v| Ok(InterpValue::make_bool(v.bits()?.or_reduce())))
            }
            Builtin::Range => self.run_binary_builtin(|start, end| {
                let width = start.bit_count()?;
                let one = if start.is_signed() {
                    InterpValue::make_sbits(width, 1)
                } else {
                    InterpValue::make_ubits(width, 1)
                };
                let mut elements = Vec::new();
                let mut current = start.clone();
                while current.ge(end)?.is_false() {
                    elements.push(current.clone());
                    current = current.add(&one)?;
                }
                InterpValue::make_array(elements)
            }),
            Builtin::Rev => self.run_unary_builtin(|v| {
                if !v.is_bits() || v.is_signed() {
                    return Err(InterpError::invalid_argument(
                        "argument to rev must be an unsigned bits-typed value",
                    ));
                }
                Ok(InterpValue::UBits(v.bits()?.reverse()))
            }),
            Builtin::Signex => self.run_binary_builtin(|value, type_value| {
                let old_width = value.bit_count()?;
                let new_width = type_value.bit_count()?;
                if old_width > new_width {
                    return Err(InterpError::internal(format!(
                        "old bit count must be less than or equal to the new: {old_width} vs {new_width}"
                    )));
                }
                value.sign_ext(new_width)
            }),
            Builtin::Slice => {
                self.run_ternary_builtin(|basis, start, type_value| basis.slice(start, type_value))
            }
            Builtin::Trace => Err(InterpError::internal(
                "trace! builtin calls should be lowered into trace opcodes",
            )),
            Builtin::Update => {
                self.run_ternary_builtin(|array, index, new_value| array.update(index, new_value))
            }
            Builtin::XorReduce => {
                self.run_unary_builtin(|v| Ok(InterpValue::make_bool(v.bits()?.xor_reduce())))
            }
        }
    }

    // -- argument shapes ------------------------------------------------

    fn run_unary_builtin(
        &mut self,
        op: impl Fn(&InterpValue) -> InterpResult<InterpValue>,
    ) -> InterpResult<()> {
        let a = self.pop()?;
        let result = op(&a)?;
        self.push(result);
        Ok(())
    }

    fn run_binary_builtin(
        &mut self,
        op: impl Fn(&InterpValue, &InterpValue) -> InterpResult<InterpValue>,
    ) -> InterpResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = op(&a, &b)?;
        self.push(result);
        Ok(())
    }

    fn run_ternary_builtin(
        &mut self,
        op: impl Fn(&InterpValue, &InterpValue, &InterpValue) -> InterpResult<InterpValue>,
    ) -> InterpResult<()> {
        let c = self.pop()?;
        let b = self.pop()?;
        let a = self.pop()?;
        let result = op(&a, &b, &c)?;
        self.push(result);
        Ok(())
    }

    // -- assertions -----------------------------------------------------

    fn run_builtin_assert_eq(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        // Keep copies for the failure message; the comparison consumes the
        // operands and leaves the boolean as the call's result.
        let (lhs, rhs) = self.peek_two()?;
        self.eval_binop(|l, r| Ok(InterpValue::make_bool(l.eq(r))))?;
        if self.peek()?.is_false() {
            let mut message = format!("\n  lhs: {lhs}\n  rhs: {rhs}\n  were not equal");
            if lhs.is_array() && rhs.is_array() {
                if let Some(i) = first_differing_index(lhs.values()?, rhs.values()?) {
                    message.push_str(&format!(
                        "; first differing index: {i} :: {} vs {}",
                        lhs.values()?[i],
                        rhs.values()?[i]
                    ));
                }
            }
            return Err(InterpError::failure(bytecode.source_span(), message));
        }
        Ok(())
    }

    fn run_builtin_assert_lt(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let (lhs, rhs) = self.peek_two()?;
        self.eval_binop(InterpValue::lt)?;
        if self.peek()?.is_false() {
            return Err(InterpError::failure(
                bytecode.source_span(),
                format!("\n  want: {lhs} < {rhs}"),
            ));
        }
        Ok(())
    }

    fn peek_two(&self) -> InterpResult<(InterpValue, InterpValue)> {
        let n = self.stack.len();
        if n < 2 {
            return Err(InterpError::internal(format!(
                "needed 2 stack values, had {n}"
            )));
        }
        Ok((self.stack[n - 2].clone(), self.stack[n - 1].clone()))
    }

    // -- map ------------------------------------------------------------

    /// Lowers `map(array, fn)` into a synthetic bytecode loop so the body
    /// size stays constant as the input array grows.
    ///
    /// Slot 0 holds the input array (the frame's sole argument) and slot 1
    /// the element index. Each iteration leaves one mapped element on the
    /// shared stack; the trailing `create_array` collects them. The
    /// synthetic body is owned by its frame, not cached.
    fn run_builtin_map(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let data = bytecode.invocation_data()?.clone();
        let mapper = self.pop()?;
        if !mapper.is_function() {
            return Err(InterpError::internal(
                "map requires a function value as its second argument",
            ));
        }
        let inputs = self.pop()?;
        let element_count = inputs.values()?.len();
        let span = self.import_data.invocation(data.invocation).span;

        let mut bytecodes = Vec::new();
        // Initialize the element index.
        bytecodes.push(Bytecode::literal(span, InterpValue::make_u32(0)));
        bytecodes.push(Bytecode::store(span, SlotIndex(1)));

        let top_of_loop = bytecodes.len();
        bytecodes.push(Bytecode::jump_dest(span));

        // Push array[index], then the mapper, and call it.
        bytecodes.push(Bytecode::load(span, SlotIndex(0)));
        bytecodes.push(Bytecode::load(span, SlotIndex(1)));
        bytecodes.push(Bytecode::new(span, Opcode::Index));
        bytecodes.push(Bytecode::literal(span, mapper));
        bytecodes.push(Bytecode::call(span, data.clone()));

        // Increment the index.
        bytecodes.push(Bytecode::load(span, SlotIndex(1)));
        bytecodes.push(Bytecode::literal(span, InterpValue::make_u32(1)));
        bytecodes.push(Bytecode::new(span, Opcode::Add));
        bytecodes.push(Bytecode::store(span, SlotIndex(1)));

        // Loop while index < element count.
        bytecodes.push(Bytecode::load(span, SlotIndex(1)));
        bytecodes.push(Bytecode::literal(
            span,
            InterpValue::make_u32(u32::try_from(element_count).expect("array length fits u32")),
        ));
        bytecodes.push(Bytecode::new(span, Opcode::Lt));
        let delta = isize::try_from(top_of_loop).expect("loop head index fits isize")
            - isize::try_from(bytecodes.len()).expect("body length fits isize");
        bytecodes.push(Bytecode::jump_rel_if(span, JumpTarget(delta)));

        // The loop body left one element per iteration on the stack.
        bytecodes.push(Bytecode::create_array(span, element_count));

        let type_info = self.current_frame()?.type_info;
        let bf = Rc::new(BytecodeFunction::create(None, type_info, bytecodes));
        self.frames
            .push(Frame::new(bf, vec![inputs], type_info, data.env));
        Ok(())
    }
}

/// The index of the first position where both sequences have an element
/// and the elements differ.
fn first_differing_index(lhs: &[InterpValue], rhs: &[InterpValue]) -> Option<usize> {
    lhs.iter().zip(rhs.iter()).position(|(l, r)| l.ne(r))
}

/// The zero value of a value's shape: zero bits, element-wise zero
/// aggregates, and `Token` for tokens.
fn zero_value_of(value: &InterpValue) -> InterpResult<InterpValue> {
    match value {
        InterpValue::UBits(b) => Ok(InterpValue::UBits(Bits::zero(b.width()))),
        InterpValue::SBits(b) => Ok(InterpValue::SBits(Bits::zero(b.width()))),
        InterpValue::Enum { is_signed, bits, def } => Ok(InterpValue::make_enum(
            *is_signed,
            Bits::zero(bits.width()),
            def.clone(),
        )),
        InterpValue::Array(elements) => {
            let zeroed: InterpResult<Vec<_>> = elements.iter().map(zero_value_of).collect();
            Ok(InterpValue::Array(zeroed?))
        }
        InterpValue::Tuple(elements) => {
            let zeroed: InterpResult<Vec<_>> = elements.iter().map(zero_value_of).collect();
            Ok(InterpValue::Tuple(zeroed?))
        }
        InterpValue::Token => Ok(InterpValue::Token),
        other => Err(InterpError::invalid_argument(format!(
            "cannot create a zero value for a {} value",
            other.kind_name()
        ))),
    }
}

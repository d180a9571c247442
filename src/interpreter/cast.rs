//! Casting and bit-slicing opcodes.
//!
//! Casts move values between the array, enum, and bits representations;
//! the two slice opcodes carve windows out of a bits basis, differing in
//! how the window is described (start/limit values vs. a target width
//! type) and in their out-of-range behavior.

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use super::BytecodeInterpreter;
use crate::bits::Bits;
use crate::bytecode::Bytecode;
use crate::error::{InterpError, InterpResult};
use crate::types::ConcreteType;
use crate::value::InterpValue;

impl BytecodeInterpreter<'_> {
    pub(super) fn eval_cast(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let to = bytecode.type_data()?;
        let from = self.pop()?;
        let result = cast_value(&from, to)?;
        self.push(result);
        Ok(())
    }

    /// `Slice`: pop `limit`, `start`, `basis`. Start and limit are signed;
    /// negative values are relative to the basis width, and both are
    /// clamped into `[0, width]`. The result is unsigned, of width
    /// `max(0, limit - start)`.
    pub(super) fn eval_slice(&mut self) -> InterpResult<()> {
        let limit = self.pop()?;
        let start = self.pop()?;
        let basis = self.pop()?;
        let basis_bits = basis.bits()?;
        let basis_width = BigInt::from(basis_bits.width());

        let clamp = |raw: BigInt| -> BigInt {
            let adjusted = if raw.sign() == Sign::Minus { raw + &basis_width } else { raw };
            if adjusted.sign() == Sign::Minus {
                BigInt::from(0)
            } else if adjusted > basis_width {
                basis_width.clone()
            } else {
                adjusted
            }
        };

        let start_index = clamp(start.bits()?.to_bigint());
        let limit_index = clamp(limit.bits()?.to_bigint());
        let length = (&limit_index - &start_index).max(BigInt::from(0));

        // Both are within [0, width] by now, so they fit usize.
        let start_index = start_index.to_usize().expect("clamped start fits usize");
        let length = length.to_usize().expect("clamped length fits usize");
        self.push(InterpValue::UBits(basis_bits.slice(start_index, length)));
        Ok(())
    }

    /// `WidthSlice`: the payload gives the target bits type. Pop `start`,
    /// `basis`. A start at or past the basis width yields zero of the
    /// target width; a window overhanging the end reads the basis
    /// zero-extended. The result tag follows the target signedness.
    pub(super) fn eval_width_slice(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let ConcreteType::Bits { signed, width } = bytecode.type_data()? else {
            return Err(InterpError::internal("width_slice requires a bits type payload"));
        };
        let (signed, width) = (*signed, *width);
        let oob_value = InterpValue::make_bits(signed, Bits::zero(width));

        let start = self.pop()?;
        let basis = self.pop()?;
        let basis_bits = basis.bits()?;

        let start_index = match start.bits()?.to_u64() {
            Some(i) if (i as u128) < basis_bits.width() as u128 => {
                usize::try_from(i).expect("start below basis width fits usize")
            }
            _ => {
                self.push(oob_value);
                return Ok(());
            }
        };

        let mut working = basis_bits.clone();
        if start_index + width > working.width() {
            working = working.zero_ext(start_index + width);
        }
        self.push(InterpValue::make_bits(signed, working.slice(start_index, width)));
        Ok(())
    }
}

/// Casts `from` to `to`. The legal shapes are array→bits, enum→bits,
/// bits→array, bits→enum, and bits→bits; anything else is invalid.
fn cast_value(from: &InterpValue, to: &ConcreteType) -> InterpResult<InterpValue> {
    if from.is_array() {
        let ConcreteType::Bits { signed, .. } = to else {
            return Err(InterpError::invalid_argument(
                "array values can only be cast to bits",
            ));
        };
        let flat = from.flatten()?;
        return Ok(InterpValue::make_bits(*signed, flat.bits()?.clone()));
    }

    if from.is_enum() {
        let ConcreteType::Bits { signed, .. } = to else {
            return Err(InterpError::invalid_argument(
                "enum values can only be cast to bits",
            ));
        };
        return Ok(InterpValue::make_bits(*signed, from.bits()?.clone()));
    }

    if !from.is_bits() {
        return Err(InterpError::invalid_argument(format!(
            "only casts from arrays, enums, and bits are supported; got {}",
            from.kind_name()
        )));
    }

    let from_bits = from.bits()?;
    match to {
        ConcreteType::Array { element, size } => {
            let to_bit_count = to.total_bit_count();
            if from_bits.width() != to_bit_count {
                return Err(InterpError::invalid_argument(format!(
                    "cast to array had mismatching bit counts: from {} to {to_bit_count}",
                    from_bits.width()
                )));
            }
            Ok(InterpValue::Array(bits_to_array_elements(
                from_bits, element, *size,
            )?))
        }
        ConcreteType::Enum { def, signed, .. } => Ok(InterpValue::make_enum(
            *signed,
            from_bits.clone(),
            def.clone(),
        )),
        ConcreteType::Bits { signed, width } => {
            let result = if from_bits.width() == *width {
                from_bits.clone()
            } else if from.is_signed() {
                from_bits.sign_ext(*width)
            } else {
                from_bits.zero_ext(*width)
            };
            Ok(InterpValue::make_bits(*signed, result))
        }
        ConcreteType::Tuple(_) | ConcreteType::Token => Err(InterpError::invalid_argument(
            "bits can only be cast to arrays, enums, or other bits types",
        )),
    }
}

/// Splits `bits` into `size` elements of the given type, with element 0
/// taking the high-order chunk (the inverse of flattening).
fn bits_to_array_elements(
    bits: &Bits,
    element: &ConcreteType,
    size: usize,
) -> InterpResult<Vec<InterpValue>> {
    let elem_width = element.total_bit_count();
    let mut elements = Vec::with_capacity(size);
    for i in 0..size {
        let offset = bits.width() - (i + 1) * elem_width;
        let chunk = bits.slice(offset, elem_width);
        let value = match element {
            ConcreteType::Bits { signed, .. } => InterpValue::make_bits(*signed, chunk),
            ConcreteType::Array {
                element: inner,
                size: inner_size,
            } => InterpValue::Array(bits_to_array_elements(&chunk, inner, *inner_size)?),
            other => {
                return Err(InterpError::invalid_argument(format!(
                    "cannot cast bits to an array of {other}"
                )));
            }
        };
        elements.push(value);
    }
    Ok(elements)
}

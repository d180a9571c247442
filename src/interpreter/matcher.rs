//! Match-arm pattern evaluation.

use super::BytecodeInterpreter;
use crate::bytecode::{Bytecode, MatchArmItem};
use crate::error::{InterpError, InterpResult};
use crate::value::InterpValue;

impl BytecodeInterpreter<'_> {
    /// Pops a candidate value and pushes a boolean for whether the pattern
    /// payload matches it. Name bindings (`Store` items) write into the
    /// current frame's slots as they are visited.
    pub(super) fn eval_match_arm(&mut self, bytecode: &Bytecode) -> InterpResult<()> {
        let item = bytecode.match_arm_item()?;
        let candidate = self.pop()?;
        let matched = self.match_arm_matches(item, &candidate)?;
        self.push(InterpValue::make_bool(matched));
        Ok(())
    }

    /// Recursive matcher. Tuple matching short-circuits on the first
    /// non-matching sub-item, but any `Store` side effects already
    /// performed are kept; callers rely on that partial-binding behavior.
    fn match_arm_matches(
        &mut self,
        item: &MatchArmItem,
        candidate: &InterpValue,
    ) -> InterpResult<bool> {
        match item {
            MatchArmItem::Value(value) => Ok(value.eq(candidate)),
            MatchArmItem::Load(slot) => {
                let frame = self.current_frame()?;
                let stored = frame.slots.get(slot.value()).ok_or_else(|| {
                    InterpError::internal(format!(
                        "match arm load from slot {} is out of range ({} slots)",
                        slot.value(),
                        frame.slots.len()
                    ))
                })?;
                Ok(stored.eq(candidate))
            }
            MatchArmItem::Store(slot) => {
                self.current_frame_mut()?.store_slot(*slot, candidate.clone());
                Ok(true)
            }
            MatchArmItem::Wildcard => Ok(true),
            MatchArmItem::Tuple(items) => {
                let elements = candidate.values()?;
                if items.len() != elements.len() {
                    return Err(InterpError::internal(format!(
                        "match arm pattern had {} elements but the candidate tuple had {}",
                        items.len(),
                        elements.len()
                    )));
                }
                for (sub_item, element) in items.iter().zip(elements.iter()) {
                    if !self.match_arm_matches(sub_item, element)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

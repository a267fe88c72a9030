use std::collections::HashSet;

use super::slot::Slot;
use crate::effects::{EffectKind, FileHandle, LoadedEffect, OptionMap};
use crate::error::{EngineError, Result};

/// Keys that toggle the first ten slots in order.
pub const HOTKEYS: [char; 10] = ['1', '2', '3', '4', '5', '6', '7', '8', '9', '0'];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotInfo {
    pub index: usize,
    /// Position in the registry order
    pub position: usize,
    pub id: String,
    pub name: String,
    pub kind: EffectKind,
    pub active: bool,
}

/// Owns every slot and the order they are listed and composited in. The
/// order is always a permutation of all slot indices, active or not.
pub struct SlotRegistry {
    slots: Vec<Slot>,
    order: Vec<usize>,
}

impl SlotRegistry {
    pub fn new(effects: Vec<LoadedEffect>) -> Self {
        let slots: Vec<Slot> = effects
            .into_iter()
            .enumerate()
            .map(|(index, effect)| Slot::new(index, effect))
            .collect();
        let order = (0..slots.len()).collect();
        Self { slots, order }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Result<&Slot> {
        self.slots.get(index).ok_or(EngineError::UnknownSlot(index))
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Slot> {
        self.slots.get_mut(index).ok_or(EngineError::UnknownSlot(index))
    }

    /// Order and slots borrowed separately so the compositor can walk the
    /// order while rendering slots.
    pub(crate) fn split_mut(&mut self) -> (&[usize], &mut [Slot]) {
        (&self.order, &mut self.slots)
    }

    pub fn find(&self, id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.id() == id)
    }

    pub fn list(&self) -> Vec<SlotInfo> {
        self.order
            .iter()
            .enumerate()
            .map(|(position, &index)| {
                let slot = &self.slots[index];
                SlotInfo {
                    index,
                    position,
                    id: slot.id().to_string(),
                    name: slot.name().to_string(),
                    kind: slot.kind(),
                    active: slot.is_active(),
                }
            })
            .collect()
    }

    /// Returns false when the slot was already active. The order is left
    /// alone, so the slot reappears where it was.
    pub fn activate(&mut self, index: usize) -> Result<bool> {
        let slot = self.slot_mut(index)?;
        let changed = slot.activate();
        if changed {
            log::info!("Activated '{}' (slot {})", slot.id(), index);
        }
        Ok(changed)
    }

    /// Runs cleanup and marks the slot inactive. A failing cleanup is logged
    /// and the slot is switched off regardless.
    pub fn deactivate(&mut self, index: usize) -> Result<bool> {
        let slot = self.slot_mut(index)?;
        match slot.deactivate() {
            None => Ok(false),
            Some(outcome) => {
                if let Err(e) = outcome {
                    log::warn!("{}", e);
                }
                log::info!("Deactivated '{}' (slot {})", slot.id(), index);
                Ok(true)
            }
        }
    }

    /// Returns whether the slot is active afterwards.
    pub fn toggle(&mut self, index: usize) -> Result<bool> {
        if self.slot(index)?.is_active() {
            self.deactivate(index)?;
            Ok(false)
        } else {
            self.activate(index)?;
            Ok(true)
        }
    }

    /// Replaces the order with `sequence` when it is a permutation of every
    /// slot index. Anything else is rejected and the old order kept.
    pub fn reorder(&mut self, sequence: &[usize]) -> Result<()> {
        if let Err(e) = validate_permutation(sequence, self.slots.len()) {
            log::warn!("{}", e);
            return Err(e);
        }
        self.order = sequence.to_vec();
        log::debug!("Order is now {:?}", self.order);
        Ok(())
    }

    pub fn set_options(&mut self, index: usize, partial: OptionMap) -> Result<()> {
        self.slot_mut(index)?.set_options(partial);
        Ok(())
    }

    pub fn set_file_input(&mut self, index: usize, key: &str, file: FileHandle) -> Result<()> {
        self.slot_mut(index)?.set_file(key, file)
    }

    /// Active slots in the order their option panels are shown.
    pub fn options_panel_order(&self) -> Vec<usize> {
        self.order
            .iter()
            .copied()
            .filter(|&i| self.slots[i].is_active())
            .collect()
    }

    /// Toggle keys paired with the slot they control, in order.
    pub fn hotkey_labels(&self) -> Vec<(char, usize)> {
        HOTKEYS.iter().copied().zip(self.order.iter().copied()).collect()
    }

    /// Toggles the slot at `position` in the order (0 for key `1`, 9 for
    /// key `0`). Returns the new state, or None when no slot sits there.
    pub fn toggle_by_hotkey(&mut self, position: usize) -> Option<bool> {
        if position >= HOTKEYS.len() {
            return None;
        }
        let index = *self.order.get(position)?;
        self.toggle(index).ok()
    }

    pub fn active_count(&self, kind: EffectKind) -> usize {
        self.slots.iter().filter(|s| s.is_active() && s.kind() == kind).count()
    }
}

/// Position in the order controlled by a toggle key.
pub fn hotkey_position(key: char) -> Option<usize> {
    HOTKEYS.iter().position(|&k| k == key)
}

fn validate_permutation(sequence: &[usize], len: usize) -> Result<()> {
    if sequence.len() != len {
        return Err(EngineError::InvalidReorder(format!(
            "expected {} indices, got {}",
            len,
            sequence.len()
        )));
    }
    let mut seen = HashSet::with_capacity(len);
    for &index in sequence {
        if index >= len {
            return Err(EngineError::InvalidReorder(format!("unknown slot index {}", index)));
        }
        if !seen.insert(index) {
            return Err(EngineError::InvalidReorder(format!("slot index {} repeated", index)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::OptionValue;
    use crate::engine::test_effects::{effect_with, solid, CleanupProbe};

    fn registry(n: usize) -> SlotRegistry {
        SlotRegistry::new((0..n).map(|i| solid(&format!("s{}", i), [i as u8, 0, 0, 255])).collect())
    }

    #[test]
    fn initial_order_is_load_order() {
        let r = registry(3);
        assert_eq!(r.order(), &[0, 1, 2]);
        assert!(r.list().iter().all(|s| !s.active));
    }

    #[test]
    fn reorder_accepts_permutations() {
        let mut r = registry(3);
        r.reorder(&[2, 0, 1]).unwrap();
        assert_eq!(r.order(), &[2, 0, 1]);
        // idempotent
        r.reorder(&[2, 0, 1]).unwrap();
        assert_eq!(r.order(), &[2, 0, 1]);
        assert_eq!(r.list()[0].index, 2);
    }

    #[test]
    fn bad_reorders_leave_order_untouched() {
        let mut r = registry(3);
        r.reorder(&[1, 2, 0]).unwrap();
        let bad_sequences: [&[usize]; 5] = [&[1, 2], &[1, 1, 0], &[0, 1, 3], &[0, 1, 2, 2], &[]];
        for bad in bad_sequences {
            assert!(matches!(r.reorder(bad), Err(EngineError::InvalidReorder(_))));
            assert_eq!(r.order(), &[1, 2, 0]);
        }
    }

    #[test]
    fn activation_keeps_position() {
        let mut r = registry(3);
        r.reorder(&[2, 1, 0]).unwrap();
        assert!(r.activate(1).unwrap());
        assert!(!r.activate(1).unwrap());
        assert_eq!(r.order(), &[2, 1, 0]);
        assert!(r.deactivate(1).unwrap());
        assert!(r.activate(1).unwrap());
        assert_eq!(r.order(), &[2, 1, 0]);
        assert!(matches!(r.activate(9), Err(EngineError::UnknownSlot(9))));
    }

    #[test]
    fn cleanup_runs_once_per_deactivation() {
        let probe = CleanupProbe::default();
        let mut r = SlotRegistry::new(vec![probe.effect(false)]);
        r.deactivate(0).unwrap();
        assert_eq!(probe.calls(), 0);

        r.activate(0).unwrap();
        r.deactivate(0).unwrap();
        r.deactivate(0).unwrap();
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn failing_cleanup_still_deactivates() {
        let probe = CleanupProbe::default();
        let mut r = SlotRegistry::new(vec![probe.effect(true)]);
        r.activate(0).unwrap();
        assert!(r.deactivate(0).unwrap());
        assert!(!r.slot(0).unwrap().is_active());
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn options_persist_but_files_clear_on_deactivate() {
        let json = r#"{
            "id": "t", "name": "T",
            "options": { "speed": { "type": "range", "min": 0, "max": 5, "default": 1 } },
            "file_inputs": { "font": { "accept": ".ttf" } }
        }"#;
        let mut r = SlotRegistry::new(vec![effect_with(json)]);
        r.activate(0).unwrap();

        let mut partial = OptionMap::new();
        partial.insert("speed".into(), OptionValue::Number(3.0));
        r.set_options(0, partial).unwrap();
        r.set_file_input(0, "font", FileHandle::new("a.ttf", vec![1u8, 2, 3])).unwrap();
        assert!(r.slot(0).unwrap().options().file("font").is_some());
        assert!(r.set_file_input(0, "image", FileHandle::new("x", Vec::new())).is_err());

        r.deactivate(0).unwrap();
        r.activate(0).unwrap();
        let opts = r.slot(0).unwrap().options();
        assert_eq!(opts.number("speed", 0.0), 3.0);
        assert!(opts.file("font").is_none());
    }

    #[test]
    fn set_options_merges_partial_maps() {
        let json = r#"{
            "id": "t", "name": "T",
            "options": {
                "a": { "type": "boolean", "default": true },
                "b": { "type": "range", "min": 0, "max": 1, "default": 0.5 }
            }
        }"#;
        let mut r = SlotRegistry::new(vec![effect_with(json)]);
        let before = r.slot(0).unwrap().options().clone();

        let mut partial = OptionMap::new();
        partial.insert("b".into(), OptionValue::Number(0.25));
        r.set_options(0, partial).unwrap();

        let after = r.slot(0).unwrap().options();
        assert!(after.flag("a", false));
        assert_eq!(after.number("b", 0.0), 0.25);
        // the earlier snapshot is untouched
        assert_eq!(before.number("b", 0.0), 0.5);
    }

    #[test]
    fn panel_order_and_hotkeys_follow_order() {
        let mut r = registry(12);
        let mut order: Vec<usize> = (0..12).rev().collect();
        r.reorder(&order).unwrap();
        r.activate(3).unwrap();
        r.activate(10).unwrap();
        assert_eq!(r.options_panel_order(), vec![10, 3]);

        let keys = r.hotkey_labels();
        assert_eq!(keys.len(), 10);
        assert_eq!(keys[0], ('1', 11));
        assert_eq!(keys[9], ('0', 2));

        assert_eq!(r.toggle_by_hotkey(hotkey_position('0').unwrap()), Some(true));
        assert!(r.slot(2).unwrap().is_active());
        assert_eq!(r.toggle_by_hotkey(10), None);

        order.swap(0, 1);
        r.reorder(&order).unwrap();
        assert_eq!(r.hotkey_labels()[0], ('1', 10));
    }
}

//! Arena of registered actions.
//!
//! The ring's `user_data` field must correlate a completion back to the
//! action that produced the submission. Storing a pointer there is a
//! use-after-free waiting to happen, so the engine owns every action in
//! this arena and stamps submissions with an [`ActionHandle`] instead: a
//! slot index plus a generation counter. A handle whose generation no
//! longer matches the slot is stale and resolves to nothing.

use crate::action::Action;

/// Stable identity of a registered action, valid until the action is
/// removed from the engine. Packs into a `u64` for the ring's
/// correlation field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionHandle {
  index: u32,
  generation: u32,
}

impl ActionHandle {
  pub fn token(self) -> u64 {
    (u64::from(self.generation) << 32) | u64::from(self.index)
  }

  pub(crate) fn from_token(token: u64) -> Self {
    Self { index: token as u32, generation: (token >> 32) as u32 }
  }
}

struct Slot {
  generation: u32,
  action: Option<Box<dyn Action>>,
}

pub(crate) struct Arena {
  slots: Vec<Slot>,
  free: Vec<u32>,
}

impl Arena {
  pub fn with_capacity(capacity: usize) -> Self {
    Self { slots: Vec::with_capacity(capacity), free: Vec::new() }
  }

  pub fn insert(&mut self, action: Box<dyn Action>) -> ActionHandle {
    match self.free.pop() {
      Some(index) => {
        let slot = &mut self.slots[index as usize];
        slot.action = Some(action);
        ActionHandle { index, generation: slot.generation }
      }
      None => {
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, action: Some(action) });
        ActionHandle { index, generation: 0 }
      }
    }
  }

  fn slot(&self, handle: ActionHandle) -> Option<&Slot> {
    self
      .slots
      .get(handle.index as usize)
      .filter(|slot| slot.generation == handle.generation)
  }

  pub fn get(&self, handle: ActionHandle) -> Option<&dyn Action> {
    self.slot(handle)?.action.as_deref()
  }

  pub fn get_mut(&mut self, handle: ActionHandle) -> Option<&mut (dyn Action + 'static)> {
    let slot = self
      .slots
      .get_mut(handle.index as usize)
      .filter(|slot| slot.generation == handle.generation)?;
    slot.action.as_deref_mut()
  }

  /// Briefly takes the action out of its slot (the slot stays reserved)
  /// so the caller can run it while the arena is borrowed elsewhere.
  /// Pair with [`Arena::restore`].
  pub fn take(&mut self, handle: ActionHandle) -> Option<Box<dyn Action>> {
    self
      .slots
      .get_mut(handle.index as usize)
      .filter(|slot| slot.generation == handle.generation)?
      .action
      .take()
  }

  pub fn restore(&mut self, handle: ActionHandle, action: Box<dyn Action>) {
    let slot = &mut self.slots[handle.index as usize];
    debug_assert_eq!(slot.generation, handle.generation);
    debug_assert!(slot.action.is_none());
    slot.action = Some(action);
  }

  /// Frees the slot. Any handle minted for it becomes stale.
  pub fn remove(&mut self, handle: ActionHandle) -> Option<Box<dyn Action>> {
    let slot = self
      .slots
      .get_mut(handle.index as usize)
      .filter(|slot| slot.generation == handle.generation)?;
    let action = slot.action.take()?;
    slot.generation = slot.generation.wrapping_add(1);
    self.free.push(handle.index);
    Some(action)
  }
}

use crate::error::{PeerError, Result};
use crate::var::LinkedVar;

/// Callback invoked for an inbound execute request.
pub(crate) type LinkedFn = Box<dyn FnMut(&[u8]) + Send>;

/// Fixed-capacity index → variable registry.
///
/// Capacity is chosen at construction and never changes; valid indices are
/// `0..capacity`.
pub(crate) struct VarTable {
    slots: Box<[Option<LinkedVar>]>,
}

impl VarTable {
    pub(crate) fn new(capacity: u8) -> Self {
        Self {
            slots: vec![None; capacity as usize].into_boxed_slice(),
        }
    }

    pub(crate) fn capacity(&self) -> u8 {
        self.slots.len() as u8
    }

    pub(crate) fn link(&mut self, index: u8, var: LinkedVar) -> Result<()> {
        let capacity = self.slots.len() as u8;
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(PeerError::IndexOutOfRange { index, capacity })?;
        *slot = Some(var);
        Ok(())
    }

    /// The linked variable at `index`, if the index is in range and linked.
    pub(crate) fn get(&self, index: u8) -> Option<&LinkedVar> {
        self.slots.get(index as usize)?.as_ref()
    }
}

/// Fixed-capacity index → callback registry.
pub(crate) struct FnTable {
    slots: Box<[Option<LinkedFn>]>,
}

impl FnTable {
    pub(crate) fn new(capacity: u8) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub(crate) fn capacity(&self) -> u8 {
        self.slots.len() as u8
    }

    pub(crate) fn link(&mut self, index: u8, callback: LinkedFn) -> Result<()> {
        let capacity = self.slots.len() as u8;
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(PeerError::IndexOutOfRange { index, capacity })?;
        *slot = Some(callback);
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, index: u8) -> Option<&mut LinkedFn> {
        self.slots.get_mut(index as usize)?.as_mut()
    }
}

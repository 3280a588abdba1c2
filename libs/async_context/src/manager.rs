//! Context Manager
//!
//! Generation-checked arena keyed by [`Handle`]. A released slot is reused
//! with the next generation, so a stale handle never reaches a newer
//! context. Slots whose generation is exhausted are retired instead.
//!
//! Missing handles follow two contracts: the mutable path ([`get_mut`],
//! [`deliver`]) logs a warning and carries on, the read-only [`get`]
//! returns [`ContextError::NotFound`].
//!
//! [`get_mut`]: ContextManager::get_mut
//! [`deliver`]: ContextManager::deliver
//! [`get`]: ContextManager::get

use std::sync::Arc;

use tracing::{debug, warn};
use types::protocol::Reply;

use crate::context::{Context, ContextOwner};
use crate::error::ContextError;
use crate::handle::Handle;

/// Upper bound on arena slots, also the limit for `create_at` indices.
pub const MAX_SLOTS: u32 = 1 << 24;

#[derive(Debug)]
struct Slot<C> {
    generation: u32,
    value: Option<C>,
}

#[derive(Debug)]
pub struct ContextManager<C> {
    label: String,
    slots: Vec<Slot<C>>,
    free: Vec<u32>,
    live: usize,
}

impl<C> ContextManager<C> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store the context built for a fresh handle.
    pub fn create(&mut self, build: impl FnOnce(Handle) -> C) -> Handle {
        match self.try_create(|handle| Ok::<C, std::convert::Infallible>(build(handle))) {
            Ok(handle) => handle,
            Err(never) => match never {},
        }
    }

    /// Fallible [`create`](Self::create). On error the handle is burnt.
    pub fn try_create<E>(
        &mut self,
        build: impl FnOnce(Handle) -> Result<C, E>,
    ) -> Result<Handle, E> {
        let index = self.vacant_index();
        let slot = &mut self.slots[index as usize];
        let handle = match Handle::new(index, slot.generation) {
            Some(handle) => handle,
            // Generations start at 1 and retired slots never reach the free list.
            None => unreachable!("slot {index} has generation 0"),
        };

        match build(handle) {
            Ok(value) => {
                slot.value = Some(value);
                self.live += 1;
                debug!(manager = %self.label, %handle, live = self.live, "Context created");
                Ok(handle)
            }
            Err(e) => {
                self.release(index);
                Err(e)
            }
        }
    }

    /// Store a context under a caller-chosen handle.
    ///
    /// Fails for a zero handle, a live handle, or a handle older than its
    /// slot's current generation.
    pub fn create_at(&mut self, raw: u64, build: impl FnOnce(Handle) -> C) -> Result<Handle, ContextError> {
        if raw == 0 {
            return Err(ContextError::ZeroHandle);
        }
        let handle = Handle::from_raw(raw).ok_or(ContextError::InvalidHandle(raw))?;
        let index = handle.index();
        if index >= MAX_SLOTS {
            return Err(ContextError::OutOfRange { index, max: MAX_SLOTS });
        }

        while self.slots.len() <= index as usize {
            let fresh = self.slots.len() as u32;
            self.slots.push(Slot { generation: 1, value: None });
            if fresh != index {
                self.free.push(fresh);
            }
        }

        let slot = &mut self.slots[index as usize];
        if slot.value.is_some() {
            return Err(ContextError::HandleInUse(handle));
        }
        if handle.generation() < slot.generation {
            return Err(ContextError::StaleHandle { handle, current: slot.generation });
        }

        slot.generation = handle.generation();
        slot.value = Some(build(handle));
        self.free.retain(|free| *free != index);
        self.live += 1;
        debug!(manager = %self.label, %handle, live = self.live, "Context created at fixed handle");
        Ok(handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slot(handle).is_some()
    }

    /// Read-only lookup; a missing handle is an error.
    pub fn get(&self, handle: Handle) -> Result<&C, ContextError> {
        self.slot(handle).ok_or(ContextError::NotFound(handle))
    }

    /// Mutable lookup; a missing handle is logged and yields `None`.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut C> {
        let found = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_mut());
        if found.is_none() {
            warn!(manager = %self.label, %handle, "No context for handle");
        }
        found
    }

    /// Remove a context and release its handle.
    pub fn remove(&mut self, handle: Handle) -> Option<C> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        self.live -= 1;
        self.release(handle.index());
        Some(value)
    }

    /// Handles of every context matching `pred`.
    pub fn get_based_on(&self, pred: impl Fn(&C) -> bool) -> Vec<Handle> {
        self.iter()
            .filter(|(_, value)| pred(value))
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Silently drop every context matching `pred`.
    pub fn clear_based_on(&mut self, pred: impl Fn(&C) -> bool) -> usize {
        let handles = self.get_based_on(pred);
        for handle in &handles {
            self.remove(*handle);
        }
        if !handles.is_empty() {
            debug!(manager = %self.label, cleared = handles.len(), "Contexts cleared");
        }
        handles.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &C)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            Handle::new(index as u32, slot.generation).map(|handle| (handle, value))
        })
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    fn slot(&self, handle: Handle) -> Option<&C> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    fn vacant_index(&mut self) -> u32 {
        if let Some(index) = self.free.pop() {
            return index;
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 1, value: None });
        index
    }

    /// Bump the slot generation; retire it when the generation runs out.
    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(index);
            }
            None => warn!(manager = %self.label, index, "Retiring exhausted context slot"),
        }
    }
}

impl<C: Context> ContextManager<C> {
    /// Drop every finished context.
    pub fn clear_done(&mut self) -> usize {
        self.clear_based_on(|ctx| ctx.is_done())
    }

    /// Feed a reply to the context behind `handle`.
    ///
    /// Returns `false` (after a warning) when the handle is unknown.
    pub fn deliver(
        &mut self,
        owner: &mut dyn ContextOwner,
        handle: Handle,
        reply: Arc<dyn Reply>,
    ) -> Result<bool, ContextError> {
        match self.get_mut(handle) {
            Some(ctx) => ctx.reply(owner, reply).map(|_| true),
            None => Ok(false),
        }
    }

    /// Fail the context behind `handle` with `reason`.
    pub fn fail(
        &mut self,
        owner: &mut dyn ContextOwner,
        handle: Handle,
        reason: &str,
    ) -> Result<bool, ContextError> {
        match self.get_mut(handle) {
            Some(ctx) => ctx.fail(owner, reason).map(|_| true),
            None => Ok(false),
        }
    }

    /// Forced sweep: release every matching handle, then answer each
    /// request with a failure. Returns how many were swept.
    pub fn fail_and_clear(
        &mut self,
        owner: &mut dyn ContextOwner,
        reason: &str,
        pred: impl Fn(&C) -> bool,
    ) -> usize {
        let handles = self.get_based_on(pred);
        for handle in &handles {
            if let Some(mut ctx) = self.remove(*handle) {
                if let Err(e) = ctx.fail(owner, reason) {
                    warn!(manager = %self.label, %handle, error = %e, "Failure reply not sent during sweep");
                }
            }
        }
        handles.len()
    }
}

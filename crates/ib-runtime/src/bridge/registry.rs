use std::fmt;

use ib_core::{ContextId, IsolateId};

/// Durable reference to one engine value.
///
/// A handle is an index into the arena of the context that produced it. It is
/// `Copy`; releasing it twice is harmless, and every copy becomes invalid once
/// the owning context is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    isolate: IsolateId,
    context: ContextId,
    slot: u32,
}

impl Handle {
    pub(crate) fn new(isolate: IsolateId, context: ContextId, slot: u32) -> Self {
        Self {
            isolate,
            context,
            slot,
        }
    }

    pub fn isolate(self) -> IsolateId {
        self.isolate
    }

    pub fn context(self) -> ContextId {
        self.context
    }

    pub(crate) fn slot(self) -> u32 {
        self.slot
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/value#{}", self.isolate, self.context, self.slot)
    }
}

pub(crate) struct TrackedValue {
    pub(crate) value: v8::Global<v8::Value>,
    pub(crate) resolver: Option<v8::Global<v8::PromiseResolver>>,
    pub(crate) settled: bool,
}

impl TrackedValue {
    pub(crate) fn value(value: v8::Global<v8::Value>) -> Self {
        Self {
            value,
            resolver: None,
            settled: false,
        }
    }
}

/// Append-only slot list owned by one context. Released slots stay in place so
/// indices never shift.
pub(crate) struct HandleArena<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }
}

impl<T> HandleArena<T> {
    pub(crate) fn push(&mut self, entry: T) -> u32 {
        let slot = self.slots.len() as u32;
        self.slots.push(Some(entry));
        self.live += 1;
        slot
    }

    pub(crate) fn get(&self, slot: u32) -> Option<&T> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, slot: u32) -> Option<&mut T> {
        self.slots.get_mut(slot as usize).and_then(Option::as_mut)
    }

    pub(crate) fn release(&mut self, slot: u32) -> bool {
        match self.slots.get_mut(slot as usize).and_then(Option::take) {
            Some(_) => {
                self.live -= 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn tracked(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Drops every live entry, returning how many were still held.
    pub(crate) fn clear(&mut self) -> usize {
        let released = self.live;
        self.slots.clear();
        self.live = 0;
        released
    }
}

//! The ring-item model and the `Source`/`Sink` traits the pipeline
//! driver is generic over. (§4.F)
//!
//! The distilled engine treats its transport as an opaque collaborator;
//! this module is the concrete, minimal realization that makes the
//! crate runnable end-to-end, grounded in the same way the teacher
//! crate wraps its own transport behind `Decoder<R: Read>`.

use std::io;

/// Ring-item type tags this engine dispatches on. Everything the DAQ
/// framework can produce that isn't one of these named variants is
/// forwarded verbatim as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingItemType {
    PhysicsEvent,
    EndRun,
    AbnormalEndRun,
    PhysicsEventCount,
    Other(u32),
}

const TYPE_PHYSICS_EVENT: u32 = 1;
const TYPE_PHYSICS_EVENT_COUNT: u32 = 2;
const TYPE_END_RUN: u32 = 31;
const TYPE_ABNORMAL_ENDRUN: u32 = 32;

impl From<u32> for RingItemType {
    fn from(tag: u32) -> Self {
        match tag {
            TYPE_PHYSICS_EVENT => RingItemType::PhysicsEvent,
            TYPE_PHYSICS_EVENT_COUNT => RingItemType::PhysicsEventCount,
            TYPE_END_RUN => RingItemType::EndRun,
            TYPE_ABNORMAL_ENDRUN => RingItemType::AbnormalEndRun,
            other => RingItemType::Other(other),
        }
    }
}

impl From<RingItemType> for u32 {
    fn from(kind: RingItemType) -> Self {
        match kind {
            RingItemType::PhysicsEvent => TYPE_PHYSICS_EVENT,
            RingItemType::PhysicsEventCount => TYPE_PHYSICS_EVENT_COUNT,
            RingItemType::EndRun => TYPE_END_RUN,
            RingItemType::AbnormalEndRun => TYPE_ABNORMAL_ENDRUN,
            RingItemType::Other(tag) => tag,
        }
    }
}

/// An owned ring item: a type tag plus its body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingItem {
    item_type: RingItemType,
    body: Vec<u8>,
}

impl RingItem {
    pub fn new(item_type: RingItemType, body: Vec<u8>) -> Self {
        RingItem { item_type, body }
    }

    pub fn item_type(&self) -> RingItemType {
        self.item_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// A blocking source of ring items, e.g. a file or an online ring buffer.
pub trait Source {
    /// Pull the next item, or `Ok(None)` on clean end-of-stream.
    fn next_item(&mut self) -> io::Result<Option<RingItem>>;
}

/// A blocking sink for ring items, e.g. a file or an online ring buffer.
pub trait Sink {
    fn put(&mut self, item: RingItem) -> io::Result<()>;
}

impl<T: Source + ?Sized> Source for Box<T> {
    fn next_item(&mut self) -> io::Result<Option<RingItem>> {
        (**self).next_item()
    }
}

impl<T: Sink + ?Sized> Sink for Box<T> {
    fn put(&mut self, item: RingItem) -> io::Result<()> {
        (**self).put(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_round_trips() {
        for kind in [
            RingItemType::PhysicsEvent,
            RingItemType::EndRun,
            RingItemType::AbnormalEndRun,
            RingItemType::PhysicsEventCount,
            RingItemType::Other(999),
        ] {
            let tag: u32 = kind.into();
            assert_eq!(RingItemType::from(tag), kind);
        }
    }

    #[test]
    fn unknown_tag_becomes_other() {
        assert_eq!(RingItemType::from(12345), RingItemType::Other(12345));
    }
}

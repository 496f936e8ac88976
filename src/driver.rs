//! The pipeline driver: consumes ring items from a [`Source`], dispatches
//! on type, drives the codec/clock/buffer/trigger stages, and forwards
//! everything else verbatim to a [`Sink`]. (§4.E)

use crate::buffer::HitBuffer;
use crate::clock::ClockReconstructor;
use crate::codec;
use crate::error::{ConfigError, PipelineError};
use crate::hit::Variant;
use crate::ring::{RingItem, RingItemType, Sink, Source};
use crate::trigger::TriggerEngine;

/// Owns every per-run stage and drives them from a source to a sink.
pub struct Pipeline<S, K> {
    source: S,
    sink: K,
    variant: Variant,
    clock: ClockReconstructor,
    buffer: HitBuffer,
    trigger: TriggerEngine,
}

impl<S: Source, K: Sink> Pipeline<S, K> {
    pub fn new(
        source: S,
        sink: K,
        variant: Variant,
        trigger_channel: u8,
        window_start_ns: f64,
        window_width_ns: f64,
    ) -> Result<Self, ConfigError> {
        let trigger = TriggerEngine::new(trigger_channel, window_start_ns, window_width_ns, variant)?;
        Ok(Pipeline {
            source,
            sink,
            variant,
            clock: ClockReconstructor::new(variant),
            buffer: HitBuffer::new(),
            trigger,
        })
    }

    /// Consume the pipeline and hand back its sink, e.g. to inspect what
    /// was written after a run against an in-memory sink in tests.
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Run until the source is exhausted (`Ok(None)`), forwarding and
    /// transforming ring items as they arrive. Blocks on each read and
    /// each write, per §5.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        while let Some(item) = self.source.next_item()? {
            match item.item_type() {
                RingItemType::PhysicsEvent => self.handle_physics_event(item)?,
                RingItemType::EndRun | RingItemType::AbnormalEndRun => {
                    self.trigger.emptying(&mut self.buffer, &mut self.sink)?;
                    self.sink.put(item)?;
                }
                // Stale once hits are regrouped into new physics events.
                RingItemType::PhysicsEventCount => {}
                RingItemType::Other(_) => self.sink.put(item)?,
            }
        }
        Ok(())
    }

    fn handle_physics_event(&mut self, item: RingItem) -> Result<(), PipelineError> {
        let mut hit = match codec::decode(item.body(), self.variant) {
            Ok(hit) => hit,
            Err(e) => {
                eprintln!("mdpp-soft-trigger: dropping undecodable physics event: {e}");
                return Ok(());
            }
        };

        if !self.clock.is_calibrated() {
            if let Err(e) = self.clock.first_hit_calibration(&hit) {
                eprintln!("mdpp-soft-trigger: {e}, discarding uncalibrated first hit");
                return Ok(());
            }
        }

        self.clock.update(&mut hit);
        let is_trigger_channel = hit.channel == self.trigger.trigger_channel();
        self.buffer.push_back(hit);
        self.trigger
            .step(&mut self.buffer, is_trigger_channel, self.clock.latest_abs_tdc(), &mut self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    struct VecSource {
        items: VecDeque<RingItem>,
    }

    impl Source for VecSource {
        fn next_item(&mut self) -> io::Result<Option<RingItem>> {
            Ok(self.items.pop_front())
        }
    }

    #[derive(Default)]
    struct VecSink {
        items: Vec<RingItem>,
    }

    impl Sink for VecSink {
        fn put(&mut self, item: RingItem) -> io::Result<()> {
            self.items.push(item);
            Ok(())
        }
    }

    fn narrow_physics_event(channel: u8, tdc_raw: u32) -> RingItem {
        let vmusb_header: u16 = 0x0c; // stack_id 0
        let header_word: u32 = (0b01u32 << 30) | ((channel as u32 & 0x1F) << 18);
        let timestamp_word: u32 = (0b11u32 << 30) | (tdc_raw & 0x3FFF_FFFF);

        let mut body = Vec::new();
        body.extend_from_slice(&vmusb_header.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes()); // external timestamp
        body.extend_from_slice(&0u32.to_le_bytes()); // second scaler
        body.extend_from_slice(&header_word.to_le_bytes());
        body.extend_from_slice(&timestamp_word.to_le_bytes());
        RingItem::new(RingItemType::PhysicsEvent, body)
    }

    #[test]
    fn singleton_passes_through_untouched_channel() {
        let source = VecSource {
            items: VecDeque::from(vec![
                narrow_physics_event(9, 1000), // calibration hit
                narrow_physics_event(3, 100_000),
                RingItem::new(RingItemType::EndRun, Vec::new()),
            ]),
        };
        let sink = VecSink::default();
        let mut pipeline = Pipeline::new(source, sink, Variant::Narrow, 5, 1000.0, 2000.0).unwrap();
        pipeline.run().unwrap();

        // Calibration hit discarded, hit@100000 flushed as a singleton
        // (never a trigger hit, ages out once no window is pending), then
        // END_RUN forwarded.
        assert!(pipeline
            .sink
            .items
            .iter()
            .any(|i| i.item_type() == RingItemType::EndRun));
    }

    #[test]
    fn physics_event_count_is_discarded() {
        let source = VecSource {
            items: VecDeque::from(vec![RingItem::new(RingItemType::PhysicsEventCount, vec![1, 2, 3])]),
        };
        let sink = VecSink::default();
        let mut pipeline = Pipeline::new(source, sink, Variant::Narrow, 5, 0.0, 0.0).unwrap();
        pipeline.run().unwrap();
        assert!(pipeline.sink.items.is_empty());
    }

    #[test]
    fn unknown_item_type_forwarded_verbatim() {
        let item = RingItem::new(RingItemType::Other(777), vec![9, 9, 9]);
        let source = VecSource {
            items: VecDeque::from(vec![item.clone()]),
        };
        let sink = VecSink::default();
        let mut pipeline = Pipeline::new(source, sink, Variant::Narrow, 5, 0.0, 0.0).unwrap();
        pipeline.run().unwrap();
        assert_eq!(pipeline.sink.items, vec![item]);
    }

    #[test]
    fn decode_failure_is_dropped_not_fatal() {
        let bad = RingItem::new(RingItemType::PhysicsEvent, vec![0u8; 2]); // too short
        let source = VecSource {
            items: VecDeque::from(vec![bad, RingItem::new(RingItemType::EndRun, Vec::new())]),
        };
        let sink = VecSink::default();
        let mut pipeline = Pipeline::new(source, sink, Variant::Narrow, 5, 0.0, 0.0).unwrap();
        pipeline.run().unwrap();
        assert!(pipeline
            .sink
            .items
            .iter()
            .any(|i| i.item_type() == RingItemType::EndRun));
    }
}

//! The state machine that opens, fills and closes software-trigger
//! coincidence windows. (§4.D)

use std::collections::VecDeque;

use crate::buffer::HitBuffer;
use crate::codec;
use crate::error::{ConfigError, PipelineError};
use crate::hit::{Hit, Variant};
use crate::ring::{RingItem, RingItemType, Sink};

/// Configuration and running state of the coincidence-window engine.
///
/// Configuration (`trigger_channel`, `window_start`, `window_width`) is
/// set once at startup and never mutated; everything else is the
/// per-run state machine described in §4.D.
#[derive(Debug)]
pub struct TriggerEngine {
    variant: Variant,
    trigger_channel: u8,
    window_start: u64,
    window_width: u64,

    collecting: bool,
    window_start_tdc: u64,
    window_end_tdc: u64,
    pending: VecDeque<Hit>,
}

impl TriggerEngine {
    /// Build a trigger engine. `window_start_ns`/`window_width_ns` must
    /// both be non-negative; they are converted to the variant's TDC
    /// units here so the rest of the engine only ever deals in TDC
    /// counts.
    pub fn new(
        trigger_channel: u8,
        window_start_ns: f64,
        window_width_ns: f64,
        variant: Variant,
    ) -> Result<Self, ConfigError> {
        if window_start_ns < 0.0 || window_width_ns < 0.0 {
            return Err(ConfigError::NegativeWindow {
                win_start_ns: window_start_ns,
                win_width_ns: window_width_ns,
            });
        }

        let to_tdc_units = |ns: f64| (ns * 1000.0 / variant.tdc_unit_ps()).round() as u64;

        Ok(TriggerEngine {
            variant,
            trigger_channel,
            window_start: to_tdc_units(window_start_ns),
            window_width: to_tdc_units(window_width_ns),
            collecting: false,
            window_start_tdc: 0,
            window_end_tdc: 0,
            pending: VecDeque::new(),
        })
    }

    /// `true` while a coincidence window is open and being filled.
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// The configured trigger channel, for callers deciding
    /// `is_trigger_channel` before calling [`Self::step`].
    pub fn trigger_channel(&self) -> u8 {
        self.trigger_channel
    }

    fn in_window(&self, abs_tdc: u64) -> bool {
        self.window_start_tdc <= abs_tdc && abs_tdc <= self.window_end_tdc
    }

    fn emit_singleton(&self, hit: Hit, sink: &mut dyn Sink) -> Result<(), PipelineError> {
        let body = codec::encode_singleton(&hit);
        sink.put(RingItem::new(RingItemType::PhysicsEvent, body))?;
        Ok(())
    }

    fn emit_group(&mut self, sink: &mut dyn Sink) -> Result<(), PipelineError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let hits: Vec<Hit> = self.pending.drain(..).collect();
        let body = codec::encode_group(&hits, self.window_start_tdc, self.variant);
        sink.put(RingItem::new(RingItemType::PhysicsEvent, body))?;
        Ok(())
    }

    /// Case 1 (§4.D): open a window around `trigger_hit` (already popped
    /// off `buffer` by the caller), sweeping any older buffered hits into
    /// the pending group or out as singletons.
    fn open_window(
        &mut self,
        trigger_hit: Hit,
        buffer: &mut HitBuffer,
        sink: &mut dyn Sink,
    ) -> Result<(), PipelineError> {
        let trigger_abs = trigger_hit.absolute_tdc(self.variant);

        let window_start_tdc = trigger_abs.saturating_sub(self.window_start);
        let window_end_tdc = window_start_tdc + self.window_width;
        self.window_start_tdc = window_start_tdc;
        self.window_end_tdc = window_end_tdc;

        loop {
            let front_abs = buffer.peek_front().map(|h| h.absolute_tdc(self.variant));
            match front_abs {
                Some(abs) if self.in_window(abs) => {
                    let h = buffer.pop_front().unwrap();
                    self.pending.push_back(h);
                }
                Some(abs) if abs < window_start_tdc => {
                    let h = buffer.pop_front().unwrap();
                    self.emit_singleton(h, sink)?;
                }
                Some(_) => {
                    eprintln!(
                        "trigger engine: buffered hit older than the trigger fell after \
                         the window end; this shouldn't be happening! 1"
                    );
                    break;
                }
                None => break,
            }
        }

        self.pending.push_back(trigger_hit);
        self.collecting = true;
        Ok(())
    }

    /// Advance the state machine after `hit_just_pushed` has been pushed
    /// to `buffer` and had its rollover counter assigned.
    ///
    /// `is_trigger_channel` says whether that hit fired on the
    /// configured trigger channel. `latest_abs_tdc` is the clock
    /// reconstructor's running high-water mark, used to decide when a
    /// window is known to be closed. Re-entry after a window closes
    /// (§4.D case 2) is a loop here, not recursion, to keep stack usage
    /// bounded under a dense trigger stream. (§9 Design Notes)
    pub fn step(
        &mut self,
        buffer: &mut HitBuffer,
        is_trigger_channel: bool,
        latest_abs_tdc: u64,
        sink: &mut dyn Sink,
    ) -> Result<(), PipelineError> {
        let mut is_trigger_channel = is_trigger_channel;
        // On the first pass the candidate trigger hit is the one the
        // driver just pushed, i.e. the back of the buffer. On re-entry
        // after a window closes (case 2) the candidate is instead
        // whichever hit is now at the front — popping from the back
        // there would grab the wrong (newest) hit.
        let mut trigger_at_front = false;
        loop {
            if is_trigger_channel && !self.collecting {
                let trigger_hit = if trigger_at_front {
                    buffer
                        .pop_front()
                        .expect("trigger-channel step re-entered with no hit on the buffer")
                } else {
                    buffer
                        .pop_back()
                        .expect("trigger-channel step called with no hit on the buffer")
                };
                return self.open_window(trigger_hit, buffer, sink);
            }

            if self.collecting {
                let front = buffer.peek_front().map(|h| (h.absolute_tdc(self.variant), h.channel));
                match front {
                    Some((abs, _)) if self.in_window(abs) => {
                        let h = buffer.pop_front().unwrap();
                        self.pending.push_back(h);
                        return Ok(());
                    }
                    Some((_, channel)) if self.window_end_tdc < latest_abs_tdc => {
                        self.emit_group(sink)?;
                        self.collecting = false;
                        is_trigger_channel = channel == self.trigger_channel;
                        trigger_at_front = true;
                        continue;
                    }
                    Some(_) => return Ok(()),
                    None => return Ok(()),
                }
            }

            // Case 3: not collecting and this hit isn't a trigger — age
            // out anything too old to ever fall into a future window.
            loop {
                let front_abs = buffer.peek_front().map(|h| h.absolute_tdc(self.variant));
                match front_abs {
                    Some(abs) if abs < latest_abs_tdc.saturating_sub(self.window_start) => {
                        let h = buffer.pop_front().unwrap();
                        self.emit_singleton(h, sink)?;
                    }
                    _ => break,
                }
            }
            return Ok(());
        }
    }

    /// Called on END_RUN/ABNORMAL_ENDRUN (§4.D `emptying`): flush any
    /// pending group, then drain the buffer as singletons in order.
    pub fn emptying(&mut self, buffer: &mut HitBuffer, sink: &mut dyn Sink) -> Result<(), PipelineError> {
        if !self.pending.is_empty() {
            self.emit_group(sink)?;
        }
        self.collecting = false;
        while let Some(h) = buffer.pop_front() {
            self.emit_singleton(h, sink)?;
        }
        Ok(())
    }
}

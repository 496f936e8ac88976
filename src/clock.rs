//! Rebuild a monotonic 64-bit absolute timestamp from the two
//! independently-rolling clocks carried in [`Hit`]: a wide external
//! scaler and the narrower on-module TDC. (§4.B)

use crate::error::DecodeError;
use crate::hit::{Hit, Variant};

/// Width, in external-timestamp counts, of the 32-bit external-scaler
/// register before it wraps.
const EXT_MAX: f64 = 4_294_967_296.0; // 2^32

/// Minimum `tdc_raw` (in TDC units, ~1 ns) a first hit must carry to be
/// usable as the clock-alignment reference. (§4.B `first_hit_calibration`)
const FIRST_HIT_MIN_TDC_RAW: u64 = 41;

/// Tracks clock-rollover state across a run and assigns each [`Hit`] its
/// `rollover_counter` and, transitively via [`Hit::absolute_tdc`], its
/// reconstructed absolute timestamp.
///
/// One instance is created per run and threaded through every decoded
/// hit in arrival order; it is never reset mid-stream.
#[derive(Debug, Clone)]
pub struct ClockReconstructor {
    variant: Variant,
    prev_ext_ns: f64,
    ext_rollovers: u64,
    prev_tdc_ns: f64,
    tdc_rollovers: u64,
    ref_diff_ns: f64,
    time_set: bool,
    latest_abs_tdc: u64,
    latest_abs_tdc_ns: f64,
}

impl ClockReconstructor {
    /// A fresh, uncalibrated reconstructor for the given protocol variant.
    pub fn new(variant: Variant) -> Self {
        ClockReconstructor {
            variant,
            prev_ext_ns: 0.0,
            ext_rollovers: 0,
            prev_tdc_ns: 0.0,
            tdc_rollovers: 0,
            ref_diff_ns: 0.0,
            time_set: false,
            latest_abs_tdc: 0,
            latest_abs_tdc_ns: 0.0,
        }
    }

    /// `true` once [`Self::first_hit_calibration`] has succeeded.
    pub fn is_calibrated(&self) -> bool {
        self.time_set
    }

    /// Reconstructed absolute TDC of the latest hit seen by [`Self::update`].
    pub fn latest_abs_tdc(&self) -> u64 {
        self.latest_abs_tdc
    }

    fn tdc_ns(&self, h: &Hit) -> f64 {
        h.tdc_raw as f64 * self.variant.tdc_unit_ps() / 1000.0
    }

    fn ext_ns_raw(&self, h: &Hit) -> f64 {
        (self.ext_rollovers as f64 * EXT_MAX + h.external_timestamp as f64)
            * self.variant.ext_period_ns()
    }

    /// Align the external and TDC clock domains at the first valid hit
    /// of a run.
    ///
    /// Per §4.B: a first hit whose `tdc_raw` is below
    /// [`FIRST_HIT_MIN_TDC_RAW`] (~1 ns) is considered too close to a
    /// rollover boundary to trust as a reference and is discarded
    /// uncalibrated; the caller should retry with the next hit.
    pub fn first_hit_calibration(&mut self, h: &Hit) -> Result<(), DecodeError> {
        if h.tdc_raw < FIRST_HIT_MIN_TDC_RAW {
            return Err(DecodeError::UncalibratedFirstHit(h.tdc_raw));
        }

        self.ref_diff_ns = self.ext_ns_raw(h) - self.tdc_ns(h);
        self.time_set = true;
        Ok(())
    }

    /// Update rollover state for a newly-decoded hit and assign its
    /// `rollover_counter`. Must be called in arrival order.
    pub fn update(&mut self, h: &mut Hit) {
        let ext_ns = if self.variant.has_external_clock() {
            let mut ext_ns = self.ext_ns_raw(h) - self.ref_diff_ns;
            if ext_ns < self.prev_ext_ns {
                self.ext_rollovers += 1;
                ext_ns = self.ext_ns_raw(h) - self.ref_diff_ns;
            }
            ext_ns
        } else {
            self.prev_ext_ns
        };

        let tdc_ns = self.tdc_ns(h);
        if tdc_ns < self.prev_tdc_ns {
            if self.variant.has_external_clock() {
                let ext_delta_ns = ext_ns - self.prev_ext_ns;
                let estimated_rollovers = (ext_delta_ns / self.variant.tdc_max_ns()).floor();
                let tdc_delta_ns = tdc_ns - self.prev_tdc_ns + self.variant.tdc_max_ns();
                // Unjustified in the original implementation this is
                // grounded on; preserved verbatim rather than replaced
                // with a principled bound. (§9 Design Notes)
                let already_close = (0.8 * ext_delta_ns..=1.2 * ext_delta_ns).contains(&tdc_delta_ns);
                if !already_close {
                    self.tdc_rollovers += estimated_rollovers as u64 + 1;
                }
            } else if self.prev_tdc_ns >= self.variant.tdc_max_ns() / 2.0
                && tdc_ns < self.variant.tdc_max_ns() / 2.0
            {
                self.tdc_rollovers += 1;
            }
            // Else: reversed-order event tolerated as detector jitter;
            // the rollover counter is left unchanged.
        }

        h.rollover_counter = self.tdc_rollovers;

        self.prev_ext_ns = ext_ns;
        self.prev_tdc_ns = tdc_ns;

        let abs_tdc = h.absolute_tdc(self.variant);
        if abs_tdc > self.latest_abs_tdc {
            self.latest_abs_tdc = abs_tdc;
            self.latest_abs_tdc_ns = abs_tdc as f64 * self.variant.tdc_unit_ps() / 1000.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(tdc_raw: u64, external_timestamp: u32) -> Hit {
        Hit {
            stack_id: 0,
            body_size: 0x0c,
            module_id: 1,
            tdc_resolution: 0,
            external_timestamp,
            trigger_flag: false,
            channel: 0,
            pileup: false,
            overflow: false,
            adc: 0,
            tdc_raw,
            rollover_counter: 0,
        }
    }

    #[test]
    fn calibration_rejects_tiny_first_hit() {
        let mut clock = ClockReconstructor::new(Variant::Narrow);
        let h = hit(10, 0);
        assert!(matches!(
            clock.first_hit_calibration(&h),
            Err(DecodeError::UncalibratedFirstHit(10))
        ));
        assert!(!clock.is_calibrated());
    }

    #[test]
    fn calibration_accepts_valid_first_hit() {
        let mut clock = ClockReconstructor::new(Variant::Narrow);
        let h = hit(1000, 500);
        clock.first_hit_calibration(&h).unwrap();
        assert!(clock.is_calibrated());
    }

    #[test]
    fn monotone_hits_get_rollover_zero() {
        let mut clock = ClockReconstructor::new(Variant::Narrow);
        let mut h0 = hit(1000, 0);
        clock.first_hit_calibration(&h0).unwrap();
        clock.update(&mut h0);
        assert_eq!(h0.rollover_counter, 0);

        let mut h1 = hit(2000, 10);
        clock.update(&mut h1);
        assert_eq!(h1.rollover_counter, 0);
        assert!(h1.absolute_tdc(Variant::Narrow) > h0.absolute_tdc(Variant::Narrow));
    }

    #[test]
    fn tdc_wrap_with_matching_external_delta_is_counted_once() {
        let variant = Variant::Narrow;
        let mut clock = ClockReconstructor::new(variant);

        let mut h0 = hit(variant.tdc_max() - 10, 0);
        clock.first_hit_calibration(&h0).unwrap();
        clock.update(&mut h0);
        assert_eq!(h0.rollover_counter, 0);

        // External clock advances by roughly one TDC range; the TDC
        // itself wraps to a small value. This should read as exactly one
        // rollover, not the "already close" suppression case, since the
        // external delta and the wrapped TDC delta are close in this
        // synthetic scenario.
        let ext_ticks_per_tdc_range =
            (variant.tdc_max_ns() / variant.ext_period_ns()).round() as u32;
        let mut h1 = hit(50, ext_ticks_per_tdc_range);
        clock.update(&mut h1);

        assert_eq!(h1.rollover_counter, 1);
        assert!(h1.absolute_tdc(variant) > h0.absolute_tdc(variant));
    }

    #[test]
    fn wide_tdc_variant_wraps_without_external_clock() {
        let variant = Variant::WideTdc;
        let mut clock = ClockReconstructor::new(variant);

        let mut h0 = hit(variant.tdc_max() - 5, 0);
        clock.first_hit_calibration(&h0).unwrap();
        clock.update(&mut h0);
        assert_eq!(h0.rollover_counter, 0);

        let mut h1 = hit(5, 0);
        clock.update(&mut h1);
        assert_eq!(h1.rollover_counter, 1);
    }

    #[test]
    fn wide_tdc_small_backward_jitter_does_not_wrap() {
        let variant = Variant::WideTdc;
        let mut clock = ClockReconstructor::new(variant);

        let mut h0 = hit(10_000, 0);
        clock.first_hit_calibration(&h0).unwrap();
        clock.update(&mut h0);

        let mut h1 = hit(9_990, 0);
        clock.update(&mut h1);
        assert_eq!(h1.rollover_counter, 0);
    }
}

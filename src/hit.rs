//! The decoded physics-event sample and the protocol-variant constants it
//! is reconstructed under.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of channels a front-end module may report on.
pub const NUM_CHANNEL: usize = 32;

/// Tolerance within which an out-of-order `absolute_tdc` is treated as
/// detector jitter rather than a real reordering. (Appendix §3, Invariants)
pub const REVERSED_THRESHOLD_NS: f64 = 10.0;

/// Expected declared body size (in bytes) of a well-formed narrow-variant
/// VMUSB frame, before the trigger engine's extended-timestamp field is
/// added back on re-emission.
pub const NARROW_BODY_SIZE: u16 = 0x0c;

/// One decoded digitizer sample.
///
/// Produced by [`crate::codec::decode`], consumed by the clock
/// reconstructor, the hit buffer and the trigger engine, and finally
/// re-serialized by [`crate::codec::encode_singleton`] or
/// [`crate::codec::encode_group`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// 3-bit frontend stack identifier; verbatim passthrough.
    pub stack_id: u8,

    /// Declared 12-bit body size of the source frame. Expected to equal
    /// [`NARROW_BODY_SIZE`]; a mismatch is recorded but not fatal.
    pub body_size: u16,

    /// 6- or 8-bit module id, or `-1` if the MDPP header/timestamp tag
    /// bits failed to match.
    pub module_id: i32,

    /// 3-bit MDPP resolution code. Only meaningful for [`Variant::WideTdc`].
    pub tdc_resolution: u8,

    /// Raw external-scaler reading at hit time. Absent (always zero) in
    /// [`Variant::WideTdc`], which has no external-timestamp word.
    pub external_timestamp: u32,

    /// Hardware trigger bit.
    pub trigger_flag: bool,

    /// Channel index in `[0, NUM_CHANNEL)`.
    pub channel: u8,

    /// Pileup status bit.
    pub pileup: bool,

    /// Overflow status bit.
    pub overflow: bool,

    /// 16-bit pulse height.
    pub adc: u16,

    /// The module's local TDC reading: 30 bits wide in [`Variant::Narrow`],
    /// 46 bits wide in [`Variant::WideTdc`].
    pub tdc_raw: u64,

    /// Reconstructed rollover count of the TDC. Assigned by the clock
    /// reconstructor; zero on fresh decode.
    pub rollover_counter: u64,
}

impl Hit {
    /// `true` if decode failed to recognize the MDPP header/timestamp tag
    /// bits for this hit (`module_id` sentinel of `-1`).
    pub fn decode_failed(&self) -> bool {
        self.module_id < 0
    }

    /// The reconstructed 64-bit absolute TDC: `(rollover_counter << W) |
    /// tdc_raw`, where `W` is `variant.tdc_width_bits()`.
    pub fn absolute_tdc(&self, variant: Variant) -> u64 {
        (self.rollover_counter << variant.tdc_width_bits()) | self.tdc_raw
    }
}

/// Which of the three on-the-wire MDPP layouts a run was recorded with.
///
/// Selected once at startup; the codec is polymorphic over it, but the
/// clock reconstructor, hit buffer and trigger engine only ever see
/// [`Hit`] and [`Hit::absolute_tdc`] and are themselves variant-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// 32-bit external timestamp word plus a 30-bit on-module TDC
    /// (two independently-rolling clocks). The only variant attested in
    /// the system this crate's design was grounded on.
    Narrow,

    /// No external-timestamp word; a single 46-bit on-module TDC is the
    /// only clock (single-clock rollover detection, §4.B).
    WideTdc,
}

impl Variant {
    /// Width in bits of `tdc_raw` for this variant.
    pub fn tdc_width_bits(self) -> u32 {
        match self {
            Variant::Narrow => 30,
            Variant::WideTdc => 46,
        }
    }

    /// Maximum representable `tdc_raw` value (all-ones at the variant's width).
    pub fn tdc_max(self) -> u64 {
        (1u64 << self.tdc_width_bits()) - 1
    }

    /// MDPP TDC quantum, in picoseconds.
    pub fn tdc_unit_ps(self) -> f64 {
        match self {
            Variant::Narrow => 24.41,
            Variant::WideTdc => 781.25,
        }
    }

    /// Period of the external scaler, in nanoseconds. Unused by
    /// [`Variant::WideTdc`], which has no external clock.
    pub fn ext_period_ns(self) -> f64 {
        62.5
    }

    /// `true` if this variant carries an independent external-clock word
    /// alongside the on-module TDC.
    pub fn has_external_clock(self) -> bool {
        matches!(self, Variant::Narrow)
    }

    /// `TDC_MAX_NS`: the on-module TDC's full range expressed in nanoseconds.
    pub fn tdc_max_ns(self) -> f64 {
        self.tdc_max() as f64 * self.tdc_unit_ps() / 1000.0
    }
}

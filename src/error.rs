//! Structured error types for this crate.
//!
//! Mirrors the teacher's split between an internal, exhaustive decode
//! error and the smaller, public error surface the driver and CLI
//! actually need to branch on.

use std::io;

/// Reasons [`crate::codec::decode`] rejects a PHYSICS_EVENT body.
///
/// Every variant is per-hit recoverable: the driver logs it and drops
/// the hit, the stream continues. (§7)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The VMUSB header declared a body size other than expected. Not
    /// itself fatal to decode; recorded so callers can log the anomaly.
    #[error("unexpected VMUSB body size: {0:#06x}")]
    UnexpectedBodySize(u16),

    /// The MDPP header word's top two tag bits were not `0b01`.
    #[error("MDPP header word has wrong tag bits: {0:#010x}")]
    BadHeaderTag(u32),

    /// The MDPP timestamp word's top two tag bits were not `0b11`.
    #[error("MDPP timestamp word has wrong tag bits: {0:#010x}")]
    BadTimestampTag(u32),

    /// A wide-variant word's leading tag nibble/bits did not match any
    /// expected prefix (`0b01`, `0b0001`, `0b0010`, `0b11`).
    #[error("wide-variant word has unrecognized tag bits: {0:#010x}")]
    BadWideTag(u32),

    /// Fewer bytes were supplied than the variant's frame requires.
    #[error("PHYSICS_EVENT body too short: got {got} bytes, need at least {need}")]
    Truncated { got: usize, need: usize },

    /// The first hit seen had `tdc_raw` below the calibration threshold
    /// (41 TDC units, ~1 ns) and was discarded uncalibrated. (§4.B)
    #[error("first hit tdc_raw={0} is below the calibration threshold of 41")]
    UncalibratedFirstHit(u64),
}

/// Fatal, top-level configuration errors. (§7)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("expected 5 positional arguments (inRingURI outRingURI trigCh winStart_ns winWidth_ns), got {0}")]
    WrongArgumentCount(usize),

    #[error("unrecognized ring-buffer URI scheme in {0:?}: expected `file:` or `tcp:`")]
    UnknownUriScheme(String),

    #[error("malformed ring-buffer URI: {0:?}")]
    MalformedUri(String),

    #[error("window parameters must be non-negative, got winStart_ns={win_start_ns}, winWidth_ns={win_width_ns}")]
    NegativeWindow { win_start_ns: f64, win_width_ns: f64 },

    #[error("failed to construct source/sink for {uri:?}: {source}")]
    ConstructionFailed { uri: String, source: io::Error },
}

/// Errors that can terminate the pipeline driver's loop. (§7)
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A blocking read from the source, or a blocking write to the sink,
    /// failed. Propagates out of the driver and out of `main`.
    #[error("I/O error at the source/sink boundary: {0}")]
    Io(#[from] io::Error),
}

//! Time-reconstruction and windowed-coincidence engine for a VMUSB/MDPP
//! physics-event stream: decode hits, rebuild their absolute timestamps
//! from two independently-rolling clocks, and re-group them into
//! software-trigger coincidence windows.

pub mod buffer;
pub mod clock;
pub mod codec;
pub mod driver;
pub mod error;
pub mod hit;
pub mod ring;
pub mod trigger;
pub mod uri;

pub use driver::Pipeline;
pub use error::{ConfigError, DecodeError, PipelineError};
pub use hit::{Hit, Variant};
pub use ring::{RingItem, RingItemType, Sink, Source};

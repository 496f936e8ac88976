//! `mdpp-soft-trigger inRingURI outRingURI trigCh winStart_ns winWidth_ns`
//!
//! Reads PHYSICS_EVENT items from `inRingURI`, re-groups them into
//! software-trigger coincidence windows around `trigCh`, and writes the
//! result to `outRingURI`. Exactly five positional arguments; anything
//! else is a usage error. (§6)

use anyhow::{Context, Result};
use structopt::StructOpt;

use mdpp_soft_trigger::hit::Variant;
use mdpp_soft_trigger::{uri, Pipeline};

#[derive(StructOpt)]
#[structopt(
    name = "mdpp-soft-trigger",
    about = "Software-trigger coincidence windowing for VMUSB/MDPP physics event streams"
)]
struct Opt {
    /// Ring-buffer URI to read PHYSICS_EVENT items from (`file:path` or `tcp:host:port`).
    in_ring_uri: String,

    /// Ring-buffer URI to write re-grouped items to (`file:path` or `tcp:host:port`).
    out_ring_uri: String,

    /// Channel number that opens a coincidence window.
    trig_ch: u8,

    /// Window start offset before the trigger hit, in nanoseconds.
    win_start_ns: f64,

    /// Window width, in nanoseconds.
    win_width_ns: f64,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let source = uri::open_source(&opt.in_ring_uri)
        .with_context(|| format!("opening input ring {:?}", opt.in_ring_uri))?;
    let sink = uri::open_sink(&opt.out_ring_uri)
        .with_context(|| format!("opening output ring {:?}", opt.out_ring_uri))?;

    let mut pipeline = Pipeline::new(
        source,
        sink,
        Variant::Narrow,
        opt.trig_ch,
        opt.win_start_ns,
        opt.win_width_ns,
    )
    .context("configuring trigger engine")?;

    pipeline.run().context("running pipeline")?;

    Ok(())
}

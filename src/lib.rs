//! Building blocks for DeepStream-style GStreamer applications.
//!
//! The hard per-frame work (decoding, inference, tracking, compositing) is
//! done by native elements instantiated by factory name; this crate provides
//! the glue around them:
//!
//! - [`link`]: a rule table that resolves dynamically created pads
//!   (demuxers, uridecodebins) against pre-declared downstream targets.
//! - [`meta`]: owned, framework-agnostic per-frame detection records,
//!   converted from buffer metadata at the probe boundary.
//! - [`osd`]: occlusion-aware ordering and bounded label batching for
//!   on-screen-display primitives.
//! - [`tiler`]: grid layout for compositing multiple streams into one canvas.
//! - [`pipeline`]: element construction, chain linking, tracker
//!   configuration and bus/lifecycle handling.

pub mod error;
pub mod link;
pub mod meta;
pub mod osd;
pub mod pipeline;
pub mod tiler;

pub use error::Error;

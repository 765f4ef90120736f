//! Dispatcher behavior against real pads.
//!
//! A fakesrc wrapped in a bin with a ghost pad stands in for a demuxer: the
//! ghost pad carries the demuxer-style name, and dispatching it exercises
//! the same link path a `pad-added` event would.

use gstreamer as gst;
use gstreamer::prelude::*;

use dspipes::link::{PadLinkRules, TargetPad};
use dspipes::Error;

struct Fixture {
    pipeline: gst::Pipeline,
    source_bin: gst::Element,
    source_pad: gst::Pad,
}

/// Builds a pipeline holding a ghost-padded source bin named `pad_name`, or
/// `None` when no GStreamer installation is available.
fn fixture(pad_name: &str) -> Option<Fixture> {
    gst::init().ok()?;

    let pipeline = gst::Pipeline::new();

    let bin = gst::Bin::with_name("source-bin");
    let source = gst::ElementFactory::make("fakesrc").build().unwrap();
    bin.add(&source).unwrap();
    let inner_src = source.static_pad("src").unwrap();
    let ghost = gst::GhostPad::builder_with_target(&inner_src)
        .unwrap()
        .name(pad_name)
        .build();
    bin.add_pad(&ghost).unwrap();

    let source_bin: gst::Element = bin.upcast();
    pipeline.add(&source_bin).unwrap();
    let source_pad = source_bin.static_pad(pad_name).unwrap();

    Some(Fixture {
        pipeline,
        source_bin,
        source_pad,
    })
}

fn add_sink(pipeline: &gst::Pipeline) -> gst::Element {
    let sink = gst::ElementFactory::make("fakesink").build().unwrap();
    pipeline.add(&sink).unwrap();
    sink
}

#[test]
fn matching_pad_is_linked_exactly_once() {
    let Some(fx) = fixture("video_0") else { return };
    let sink = add_sink(&fx.pipeline);

    let mut rules = PadLinkRules::new();
    rules.register("video_", &sink, TargetPad::Static("sink".into()));

    rules.dispatch(&fx.source_bin, &fx.source_pad).unwrap();
    assert!(fx.source_pad.is_linked());
    assert!(sink.static_pad("sink").unwrap().is_linked());
}

#[test]
fn duplicate_dispatch_is_idempotent() {
    let Some(fx) = fixture("video_0") else { return };
    let sink = add_sink(&fx.pipeline);

    let mut rules = PadLinkRules::new();
    rules.register("video_", &sink, TargetPad::Static("sink".into()));

    rules.dispatch(&fx.source_bin, &fx.source_pad).unwrap();
    let peer = fx.source_pad.peer().unwrap();

    // A second pad-added for the same stream must not relink or fail.
    rules.dispatch(&fx.source_bin, &fx.source_pad).unwrap();
    assert_eq!(fx.source_pad.peer().unwrap(), peer);
}

#[test]
fn unmatched_pad_stays_unconnected() {
    let Some(fx) = fixture("audio_0") else { return };
    let sink = add_sink(&fx.pipeline);

    let mut rules = PadLinkRules::new();
    rules.register("video_", &sink, TargetPad::Static("sink".into()));

    rules.dispatch(&fx.source_bin, &fx.source_pad).unwrap();
    assert!(!fx.source_pad.is_linked());
    assert!(!sink.static_pad("sink").unwrap().is_linked());
}

#[test]
fn missing_target_pad_is_an_error() {
    let Some(fx) = fixture("video_0") else { return };
    let sink = add_sink(&fx.pipeline);

    let mut rules = PadLinkRules::new();
    rules.register("video_", &sink, TargetPad::Static("nonexistent".into()));

    let err = rules.dispatch(&fx.source_bin, &fx.source_pad).unwrap_err();
    assert!(matches!(err, Error::MissingPad { .. }));
    assert!(!fx.source_pad.is_linked());
}

#[test]
fn request_pad_is_created_on_first_dispatch_and_reused_after() {
    let Some(fx) = fixture("video_0") else { return };
    let funnel = gst::ElementFactory::make("funnel").build().unwrap();
    fx.pipeline.add(&funnel).unwrap();

    let mut rules = PadLinkRules::new();
    rules.register("video_", &funnel, TargetPad::Request("sink_0".into()));

    assert!(funnel.static_pad("sink_0").is_none());
    rules.dispatch(&fx.source_bin, &fx.source_pad).unwrap();
    let requested = funnel.static_pad("sink_0").unwrap();
    assert!(requested.is_linked());

    rules.dispatch(&fx.source_bin, &fx.source_pad).unwrap();
    assert_eq!(funnel.static_pad("sink_0").unwrap(), requested);
}

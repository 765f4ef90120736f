//! Single-stream detection and tracking pipeline.
//!
//! Reads an h264 encoded stream from a file or RTSP URI, runs primary
//! detection, tracking and three secondary classifiers, annotates the
//! on-screen display and renders to screen, optionally also encoding the
//! annotated stream into a Matroska file:
//!
//! ```text
//! urisrcbin -> streammux -> queue -> pgie -> tracker -> sgie1 -> sgie2
//!   -> sgie3 -> nvvideoconvert -> nvdsosd -> tee -> queue -> nveglglessink
//!                                             |
//!                                             -> queue -> nvvideoconvert
//!                                                -> capsfilter -> h264enc
//!                                                -> h264parse -> matroskamux
//!                                                -> filesink
//! ```
//!
//! Usage:
//!   gst-tracking --uri file:///path/to/sample_1080p_h264.mp4
//!   gst-tracking --uri rtsp://... --output-file out.mkv

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gstreamer as gst;
use gstreamer::prelude::*;

use dspipes::link::{PadLinkRules, TargetPad};
use dspipes::meta::FrameBatch;
use dspipes::osd::{OverlayConfig, SortKey};
use dspipes::pipeline::{
    add_overlay_probe, apply_tracker_config, link_chain, link_request_pad, link_to_request_pad,
    make_element, run_main_loop, set_property_checked,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URI of the file or rtsp source
    #[arg(short, long)]
    uri: String,

    /// Annotated h264/Matroska output file; omit to disable the file branch
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Primary inference config, passed verbatim to nvinfer
    #[arg(long, default_value = "dstest2_pgie_config.txt")]
    pgie_config: PathBuf,

    /// Secondary inference configs, passed verbatim to nvinfer
    #[arg(long, default_value = "dstest2_sgie1_config.txt")]
    sgie1_config: PathBuf,
    #[arg(long, default_value = "dstest2_sgie2_config.txt")]
    sgie2_config: PathBuf,
    #[arg(long, default_value = "dstest2_sgie3_config.txt")]
    sgie3_config: PathBuf,

    /// Tracker config file; its [tracker] section becomes element properties
    #[arg(long, default_value = "dstest2_tracker_config.txt")]
    tracker_config: PathBuf,

    /// Occlusion proxy for overlay drawing order (bottom or area)
    #[arg(long, default_value = "bottom")]
    sort_key: SortKey,

    /// Ask the tracker to attach past-frame metadata
    #[arg(long)]
    past_tracking: bool,

    /// Print the per-frame summary line
    #[arg(long)]
    dump_meta: bool,
}

fn build_pipeline(args: &Args) -> anyhow::Result<gst::Pipeline> {
    gst::init()?;

    let pipeline = gst::Pipeline::with_name("video-pipeline");

    let urisrcbin = make_element("nvurisrcbin", "urisrcbin")?;
    urisrcbin.set_property("uri", &args.uri);

    let stream_muxer = make_element("nvstreammux", "stream-muxer")?;
    for (key, value) in [
        ("width", "1920"),
        ("height", "1080"),
        ("batch-size", "1"),
        ("batched-push-timeout", "4000000"),
        ("attach-sys-ts", "true"),
        ("enable-padding", "true"),
    ] {
        set_property_checked(&stream_muxer, key, value)?;
    }

    let video_queue = make_element("queue", "video-queue")?;

    let primary_inference = make_element("nvinfer", "primary-inference")?;
    set_property_checked(
        &primary_inference,
        "config-file-path",
        &args.pgie_config.display().to_string(),
    )?;

    let tracker = make_element("nvtracker", "tracker")?;
    apply_tracker_config(&tracker, &args.tracker_config)?;
    if args.past_tracking {
        set_property_checked(&tracker, "enable-past-frame", "1")?;
    }

    let secondary1_inference = make_element("nvinfer", "secondary1-inference")?;
    let secondary2_inference = make_element("nvinfer", "secondary2-inference")?;
    let secondary3_inference = make_element("nvinfer", "secondary3-inference")?;
    for (element, config) in [
        (&secondary1_inference, &args.sgie1_config),
        (&secondary2_inference, &args.sgie2_config),
        (&secondary3_inference, &args.sgie3_config),
    ] {
        set_property_checked(element, "config-file-path", &config.display().to_string())?;
    }

    let video_converter = make_element("nvvideoconvert", "video-converter")?;
    let osd = make_element("nvdsosd", "nvidia-bounding-box-draw")?;
    let tee = make_element("tee", "tee")?;

    let videosink_queue = make_element("queue", "videosink-queue")?;
    let video_sink = make_element("nveglglessink", "nvvideo-renderer")?;
    video_sink.set_property("sync", true);

    pipeline.add_many([
        &urisrcbin,
        &stream_muxer,
        &video_queue,
        &primary_inference,
        &tracker,
        &secondary1_inference,
        &secondary2_inference,
        &secondary3_inference,
        &video_converter,
        &osd,
        &tee,
        &videosink_queue,
        &video_sink,
    ])?;

    link_chain(&[
        &stream_muxer,
        &video_queue,
        &primary_inference,
        &tracker,
        &secondary1_inference,
        &secondary2_inference,
        &secondary3_inference,
        &video_converter,
        &osd,
        &tee,
    ])?;

    // The uri source bin announces its decoded video pad at runtime.
    let mut rules = PadLinkRules::new();
    rules.register("vsrc", &stream_muxer, TargetPad::Request("sink_0".into()));
    rules.connect_pad_added(&urisrcbin);

    // Video sink branch.
    link_request_pad(&tee, "src_0", &videosink_queue, "sink")?;
    link_chain(&[&videosink_queue, &video_sink])?;

    // File sink branch.
    if let Some(output_file) = &args.output_file {
        let filesink_queue = make_element("queue", "filesink-queue")?;
        let file_sink_converter = make_element("nvvideoconvert", "file-sink-videoconverter")?;
        let caps_filter = make_element("capsfilter", "capsfilter")?;
        caps_filter.set_property(
            "caps",
            gst::Caps::builder("video/x-raw")
                .features(["memory:NVMM"])
                .field("format", "NV12")
                .build(),
        );
        let file_sink_encoder = make_element("nvv4l2h264enc", "file-sink-encoder")?;
        set_property_checked(&file_sink_encoder, "profile", "4")?;
        let file_sink_parser = make_element("h264parse", "file-sink-parser")?;
        let file_sink_muxer = make_element("matroskamux", "file-sink-muxer")?;
        let file_sink = make_element("filesink", "file-sink")?;
        file_sink.set_property("location", output_file.display().to_string());

        pipeline.add_many([
            &filesink_queue,
            &file_sink_converter,
            &caps_filter,
            &file_sink_encoder,
            &file_sink_parser,
            &file_sink_muxer,
            &file_sink,
        ])?;

        link_request_pad(&tee, "src_1", &filesink_queue, "sink")?;
        link_chain(&[
            &filesink_queue,
            &file_sink_converter,
            &caps_filter,
            &file_sink_encoder,
            &file_sink_parser,
        ])?;
        link_to_request_pad(&file_sink_parser, "src", &file_sink_muxer, "video_0")?;
        link_chain(&[&file_sink_muxer, &file_sink])?;
    }

    // Annotate just before the OSD composites the frame.
    let osd_sink_pad = osd
        .static_pad("sink")
        .context("osd element has no sink pad")?;
    let config = OverlayConfig {
        sort_key: args.sort_key,
        ..OverlayConfig::default()
    };
    let dump_meta = args.dump_meta;
    add_overlay_probe(&osd_sink_pad, config, FrameBatch::from_roi_meta, move |_batch, pool| {
        if dump_meta {
            if let Some(summary) = pool.metas().first().and_then(|m| m.text_params.first()) {
                println!("{}", summary.display_text);
            }
        }
    });

    Ok(pipeline)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("Playing {}", args.uri);

    let pipeline = build_pipeline(&args)?;

    // SIGINT/SIGTERM drain the pipeline through EOS so the file branch
    // finalizes its index before the process exits.
    let pipeline_weak = pipeline.downgrade();
    ctrlc::set_handler(move || {
        if let Some(pipeline) = pipeline_weak.upgrade() {
            println!("Interrupt received, sending EOS");
            let _ = pipeline.send_event(gst::event::Eos::new());
        }
    })?;

    run_main_loop(&pipeline)?;
    println!("Pipeline stopped");
    Ok(())
}

//! Multi-stream detection and tracking with a tiled output canvas.
//!
//! Every input file gets its own demux/parse/decode subgraph; the decoded
//! streams are batched by the stream muxer, run through inference and
//! tracking once as a batch, tiled into a single canvas and rendered:
//!
//! ```text
//! filesrc -> qtdemux -> h264parse -> nvv4l2decoder -\
//! filesrc -> qtdemux -> h264parse -> nvv4l2decoder --> nvstreammux
//!   -> pgie -> sgie1 -> sgie2 -> sgie3 -> tracker -> nvmultistreamtiler
//!   -> nvvideoconvert -> nvdsosd -> nveglglessink
//! ```
//!
//! Usage:
//!   gst-parallel-tracking -i a.mp4 -i b.mp4 -i c.mp4

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gstreamer as gst;
use gstreamer::prelude::*;

use dspipes::link::{PadLinkRules, TargetPad};
use dspipes::meta::FrameBatch;
use dspipes::osd::{OverlayConfig, SortKey};
use dspipes::pipeline::{
    add_overlay_probe, apply_tracker_config, link_chain, link_to_request_pad, make_element,
    run_main_loop, set_property_checked,
};
use dspipes::tiler::TileGrid;

const TRITON_CONFIG_DIR: &str =
    "/opt/nvidia/deepstream/deepstream/samples/configs/deepstream-app-triton";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input video files, one stream per file
    #[arg(short, long = "input-file", required = true)]
    input_files: Vec<PathBuf>,

    /// Primary inference config, passed verbatim to nvinferserver
    #[arg(long, default_value_t = format!("{TRITON_CONFIG_DIR}/config_infer_plan_engine_primary.txt"))]
    pgie_config: String,

    /// Secondary inference configs, passed verbatim to nvinferserver
    #[arg(long, default_value_t = format!("{TRITON_CONFIG_DIR}/config_infer_secondary_plan_engine_carcolor.txt"))]
    sgie1_config: String,
    #[arg(long, default_value_t = format!("{TRITON_CONFIG_DIR}/config_infer_secondary_plan_engine_carmake.txt"))]
    sgie2_config: String,
    #[arg(long, default_value_t = format!("{TRITON_CONFIG_DIR}/config_infer_secondary_plan_engine_vehicletypes.txt"))]
    sgie3_config: String,

    /// Tracker config file; its [tracker] section becomes element properties
    #[arg(long, default_value = "dstest2_tracker_config.txt")]
    tracker_config: PathBuf,

    /// Tiled output canvas size
    #[arg(long, default_value = "1920")]
    tile_width: u32,
    #[arg(long, default_value = "1080")]
    tile_height: u32,

    /// Occlusion proxy for overlay drawing order (bottom or area)
    #[arg(long, default_value = "bottom")]
    sort_key: SortKey,

    /// Print the per-frame summary line
    #[arg(long)]
    dump_meta: bool,
}

fn build_pipeline(args: &Args) -> anyhow::Result<gst::Pipeline> {
    gst::init()?;

    let num_streams = args.input_files.len();
    let pipeline = gst::Pipeline::with_name("multi-stream-pipeline");

    let stream_muxer = make_element("nvstreammux", "stream-muxer")?;
    for (key, value) in [
        ("width", "1920"),
        ("height", "1080"),
        ("batch-size", &num_streams.to_string() as &str),
        ("batched-push-timeout", "4000000"),
        ("attach-sys-ts", "true"),
        ("enable-padding", "true"),
    ] {
        set_property_checked(&stream_muxer, key, value)?;
    }

    let primary_inference = make_element("nvinferserver", "primary-inference")?;
    let secondary1_inference = make_element("nvinferserver", "secondary1-inference")?;
    let secondary2_inference = make_element("nvinferserver", "secondary2-inference")?;
    let secondary3_inference = make_element("nvinferserver", "secondary3-inference")?;
    for (element, config) in [
        (&primary_inference, &args.pgie_config),
        (&secondary1_inference, &args.sgie1_config),
        (&secondary2_inference, &args.sgie2_config),
        (&secondary3_inference, &args.sgie3_config),
    ] {
        set_property_checked(element, "config-file-path", config)?;
    }

    let tracker = make_element("nvtracker", "tracker")?;
    apply_tracker_config(&tracker, &args.tracker_config)?;

    let tiler = make_element("nvmultistreamtiler", "tiler")?;
    TileGrid::plan(num_streams, args.tile_width, args.tile_height).apply(&tiler);

    let video_converter = make_element("nvvideoconvert", "video-converter")?;
    let osd = make_element("nvdsosd", "nvidia-bounding-box-draw")?;
    let video_sink = make_element("nveglglessink", "video-sink")?;
    video_sink.set_property("sync", true);

    pipeline.add_many([
        &stream_muxer,
        &primary_inference,
        &secondary1_inference,
        &secondary2_inference,
        &secondary3_inference,
        &tracker,
        &tiler,
        &video_converter,
        &osd,
        &video_sink,
    ])?;

    link_chain(&[
        &stream_muxer,
        &primary_inference,
        &secondary1_inference,
        &secondary2_inference,
        &secondary3_inference,
        &tracker,
        &tiler,
        &video_converter,
        &osd,
        &video_sink,
    ])?;

    // One demux/parse/decode subgraph per input stream.
    for (i, input_file) in args.input_files.iter().enumerate() {
        let source = make_element("filesrc", &format!("source-{i}"))?;
        source.set_property("location", input_file.display().to_string());
        let demuxer = make_element("qtdemux", &format!("demuxer-{i}"))?;
        let parser = make_element("h264parse", &format!("parser-{i}"))?;
        let decoder = make_element("nvv4l2decoder", &format!("decoder-{i}"))?;

        pipeline.add_many([&source, &demuxer, &parser, &decoder])?;
        link_chain(&[&source, &demuxer])?;

        // The demuxer announces its video pad once the container is read;
        // anything else it finds (audio, subtitles) stays unconnected.
        let mut rules = PadLinkRules::new();
        rules.register("video_", &parser, TargetPad::Static("sink".into()));
        rules.connect_pad_added(&demuxer);

        link_chain(&[&parser, &decoder])?;
        link_to_request_pad(&decoder, "src", &stream_muxer, &format!("sink_{i}"))?;
    }

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
    println!(
        "Processing {} stream(s): {:?}",
        args.input_files.len(),
        args.input_files
    );

    let pipeline = build_pipeline(&args)?;

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

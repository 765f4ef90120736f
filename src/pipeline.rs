//! Pipeline assembly and lifecycle glue.
//!
//! Element construction, static chain linking, tracker configuration from a
//! key/value config file, the per-frame annotation probe and the bus run
//! loop. Inference config files are never parsed here; they are handed to
//! the inference elements verbatim via `config-file-path`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use gstreamer as gst;
use gstreamer::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;
use crate::meta::FrameBatch;
use crate::osd::{annotate_frame, OverlayConfig, VecPool};

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "dspipes",
        gst::DebugColorFlags::empty(),
        Some("Pipeline assembly and lifecycle"),
    )
});

/// Display allocations available to one frame's annotation pass.
pub const DISPLAY_POOL_CAPACITY: usize = 16;

pub fn make_element(factory: &str, name: &str) -> Result<gst::Element, Error> {
    gst::debug!(CAT, "creating element '{}' ({})", name, factory);
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|_| Error::ElementCreation {
            factory: factory.to_string(),
            name: name.to_string(),
        })
}

/// Links a chain of elements whose pads are all available up front.
pub fn link_chain(elements: &[&gst::Element]) -> Result<(), Error> {
    for pair in elements.windows(2) {
        pair[0].link(pair[1]).map_err(|_| Error::LinkFailed {
            src: pair[0].name().to_string(),
            dest: pair[1].name().to_string(),
            reason: "static link refused".to_string(),
        })?;
        gst::debug!(CAT, "linked '{}' -> '{}'", pair[0].name(), pair[1].name());
    }
    Ok(())
}

/// Requests `src_pad` on `src` and links it to the static `sink_pad` of
/// `dest`; the tee fan-out and muxer hookup pattern.
pub fn link_request_pad(
    src: &gst::Element,
    src_pad: &str,
    dest: &gst::Element,
    sink_pad: &str,
) -> Result<(), Error> {
    let src_pad = src
        .request_pad_simple(src_pad)
        .ok_or_else(|| Error::MissingPad {
            element: src.name().to_string(),
            pad: src_pad.to_string(),
        })?;
    let sink_pad = dest
        .static_pad(sink_pad)
        .ok_or_else(|| Error::MissingPad {
            element: dest.name().to_string(),
            pad: sink_pad.to_string(),
        })?;
    src_pad.link(&sink_pad).map_err(|err| Error::LinkFailed {
        src: format!("{}:{}", src.name(), src_pad.name()),
        dest: format!("{}:{}", dest.name(), sink_pad.name()),
        reason: format!("{err:?}"),
    })?;
    Ok(())
}

/// Links the static `src_pad` of `src` to a pad requested from `dest`; the
/// stream-muxer and file-muxer hookup pattern.
pub fn link_to_request_pad(
    src: &gst::Element,
    src_pad: &str,
    dest: &gst::Element,
    sink_pad: &str,
) -> Result<(), Error> {
    let src_pad = src.static_pad(src_pad).ok_or_else(|| Error::MissingPad {
        element: src.name().to_string(),
        pad: src_pad.to_string(),
    })?;
    let sink_pad = dest
        .request_pad_simple(sink_pad)
        .ok_or_else(|| Error::MissingPad {
            element: dest.name().to_string(),
            pad: sink_pad.to_string(),
        })?;
    src_pad.link(&sink_pad).map_err(|err| Error::LinkFailed {
        src: format!("{}:{}", src.name(), src_pad.name()),
        dest: format!("{}:{}", dest.name(), sink_pad.name()),
        reason: format!("{err:?}"),
    })?;
    Ok(())
}

/// Sets a property from its string form, failing if the element does not
/// expose it. GStreamer performs the string-to-type conversion, so integer
/// and boolean values from config files go through unchanged.
pub fn set_property_checked(element: &gst::Element, key: &str, value: &str) -> Result<(), Error> {
    if element.find_property(key).is_none() {
        return Err(Error::ConfigParse {
            path: element.name().to_string().into(),
            reason: format!("element has no property '{key}'"),
        });
    }
    element.set_property_from_str(key, value);
    Ok(())
}

/// Extracts the key/value pairs of the `[tracker]` section.
fn parse_tracker_section(contents: &str, path: &Path) -> Result<Vec<(String, String)>, Error> {
    static SECTION_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\[(?P<name>[^\]]+)\]$").expect("valid regex"));
    static KEY_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?P<key>[A-Za-z0-9_.-]+)\s*=\s*(?P<value>.*)$").expect("valid regex")
    });

    let mut in_tracker_section = false;
    let mut pairs = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(caps) = SECTION_RE.captures(line) {
            in_tracker_section = &caps["name"] == "tracker";
            continue;
        }
        if !in_tracker_section {
            continue;
        }
        let caps = KEY_VALUE_RE
            .captures(line)
            .ok_or_else(|| Error::ConfigParse {
                path: path.to_path_buf(),
                reason: format!("unparseable line '{line}'"),
            })?;
        pairs.push((caps["key"].to_string(), caps["value"].trim().to_string()));
    }
    Ok(pairs)
}

/// Applies the `[tracker]` section of a key/value config file as element
/// properties on the tracker.
pub fn apply_tracker_config(tracker: &gst::Element, path: &Path) -> Result<(), Error> {
    let contents = std::fs::read_to_string(path).map_err(|err| Error::ConfigParse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    for (key, value) in parse_tracker_section(&contents, path)? {
        gst::debug!(CAT, obj = tracker, "tracker config: {} = {}", key, value);
        set_property_checked(tracker, &key, &value).map_err(|_| Error::ConfigParse {
            path: path.to_path_buf(),
            reason: format!("tracker has no property '{key}'"),
        })?;
    }
    Ok(())
}

/// Installs the per-frame annotation probe on a pad (conventionally the OSD
/// element's sink pad, just before final composition).
///
/// `extract` converts the buffer's native metadata into an owned
/// [`FrameBatch`]; `submit` receives the batch and the filled display pool.
/// Every path returns [`gst::PadProbeReturn::Ok`]: per-frame failures are
/// logged and the frame is passed through unannotated, never stalling or
/// tearing down the running graph.
pub fn add_overlay_probe<E, S>(
    pad: &gst::Pad,
    config: OverlayConfig,
    extract: E,
    submit: S,
) -> Option<gst::PadProbeId>
where
    E: Fn(&gst::BufferRef, u64) -> Result<FrameBatch, Error> + Send + Sync + 'static,
    S: Fn(&FrameBatch, VecPool) + Send + Sync + 'static,
{
    let frame_counter = AtomicU64::new(0);
    pad.add_probe(gst::PadProbeType::BUFFER, move |pad, info| {
        let Some(buffer) = info.buffer() else {
            gst::warning!(CAT, obj = pad, "probe fired without a buffer, skipping frame");
            return gst::PadProbeReturn::Ok;
        };
        let frame_number = frame_counter.fetch_add(1, Ordering::Relaxed);

        let mut batch = match extract(buffer, frame_number) {
            Ok(batch) => batch,
            Err(err) => {
                gst::warning!(CAT, obj = pad, "skipping frame {}: {}", frame_number, err);
                return gst::PadProbeReturn::Ok;
            }
        };

        let mut pool = VecPool::new(DISPLAY_POOL_CAPACITY);
        if let Err(err) = annotate_frame(&mut batch, &config, &mut pool) {
            // Groups emitted before the failure are kept, not rolled back.
            gst::warning!(
                CAT,
                obj = pad,
                "annotation incomplete on frame {}: {}",
                frame_number,
                err
            );
        }
        submit(&batch, pool);

        gst::PadProbeReturn::Ok
    })
}

/// Plays the pipeline and iterates its bus until EOS or an error.
///
/// State transitions of the pipeline itself are logged; an error message
/// aborts with the posting element's name, which is how construction-time
/// failures posted from signal handlers (for example a failed dynamic pad
/// link) surface.
pub fn run_main_loop(pipeline: &gst::Pipeline) -> Result<(), Error> {
    pipeline
        .set_state(gst::State::Playing)
        .map_err(|err| Error::StateChange(err.to_string()))?;
    gst::info!(CAT, obj = pipeline, "pipeline set to PLAYING");

    let bus = pipeline
        .bus()
        .ok_or_else(|| Error::StateChange("pipeline has no bus".to_string()))?;

    let mut result = Ok(());
    for msg in bus.iter_timed(gst::ClockTime::NONE) {
        use gst::MessageView;
        match msg.view() {
            MessageView::Eos(..) => {
                gst::info!(CAT, obj = pipeline, "end of stream");
                break;
            }
            MessageView::Error(err) => {
                let element = err
                    .src()
                    .map(|s| s.path_string().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                gst::error!(
                    CAT,
                    obj = pipeline,
                    "error from {}: {} ({:?})",
                    element,
                    err.error(),
                    err.debug()
                );
                result = Err(Error::Pipeline {
                    element,
                    message: err.error().to_string(),
                });
                break;
            }
            MessageView::StateChanged(state) => {
                if msg.src() == Some(pipeline.upcast_ref()) {
                    gst::debug!(
                        CAT,
                        obj = pipeline,
                        "state changed: {:?} -> {:?}",
                        state.old(),
                        state.current()
                    );
                }
            }
            _ => (),
        }
    }

    pipeline
        .set_state(gst::State::Null)
        .map_err(|err| Error::StateChange(err.to_string()))?;
    gst::info!(CAT, obj = pipeline, "pipeline stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_section_is_isolated_from_other_sections() {
        let contents = "\
[property]
gpu-id=1

[tracker]
# comment line
tracker-width=640
tracker-height=384
ll-lib-file=/opt/lib/libnvds_mot_klt.so

[osd]
display-text=1
";
        let pairs = parse_tracker_section(contents, Path::new("tracker.txt")).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("tracker-width".to_string(), "640".to_string()),
                ("tracker-height".to_string(), "384".to_string()),
                (
                    "ll-lib-file".to_string(),
                    "/opt/lib/libnvds_mot_klt.so".to_string()
                ),
            ]
        );
    }

    #[test]
    fn garbage_line_in_tracker_section_is_rejected() {
        let contents = "[tracker]\n???\n";
        let err = parse_tracker_section(contents, Path::new("tracker.txt")).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn missing_tracker_section_applies_nothing() {
        let contents = "[property]\ngpu-id=1\n";
        let pairs = parse_tracker_section(contents, Path::new("tracker.txt")).unwrap();
        assert!(pairs.is_empty());
    }
}

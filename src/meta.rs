//! Owned per-frame detection/tracking records.
//!
//! Native buffer metadata is converted into these values once, at the probe
//! boundary, and discarded after the frame's annotation pass. Nothing here
//! is retained across frames; tracking continuity is the tracker element's
//! job, not ours.

use gstreamer as gst;
use gstreamer_video as gst_video;

use crate::error::Error;

/// Number of classes the primary detector reports.
pub const CLASS_COUNT: usize = 4;

/// Class id space of the primary detector (resnet traffic model).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Vehicle = 0,
    Bicycle = 1,
    Person = 2,
    RoadSign = 3,
}

impl ObjectClass {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(ObjectClass::Vehicle),
            1 => Some(ObjectClass::Bicycle),
            2 => Some(ObjectClass::Person),
            3 => Some(ObjectClass::RoadSign),
            _ => None,
        }
    }

    /// Maps a `roi_type` string attached by the detection bridge.
    pub fn from_roi_type(roi_type: &str) -> Option<Self> {
        match roi_type.to_ascii_lowercase().as_str() {
            "vehicle" | "car" => Some(ObjectClass::Vehicle),
            "bicycle" => Some(ObjectClass::Bicycle),
            "person" => Some(ObjectClass::Person),
            "roadsign" | "road sign" => Some(ObjectClass::RoadSign),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Vehicle => "Vehicle",
            ObjectClass::Bicycle => "Bicycle",
            ObjectClass::Person => "Person",
            ObjectClass::RoadSign => "RoadSign",
        }
    }
}

/// One detected (and possibly tracked) object, in output canvas pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub id: u32,
    pub class_id: u32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub text: String,
}

impl ObjectRecord {
    /// Lower screen edge; under typical camera geometry a proxy for
    /// distance from the camera.
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// All objects of one processed frame plus the counters recomputed for it.
///
/// Exclusively owned by the thread annotating the frame; never shared or
/// kept across frames.
#[derive(Debug, Clone, Default)]
pub struct FrameBatch {
    pub frame_number: u64,
    pub objects: Vec<ObjectRecord>,
    class_counts: [u32; CLASS_COUNT],
}

impl FrameBatch {
    pub fn new(frame_number: u64) -> Self {
        Self {
            frame_number,
            ..Self::default()
        }
    }

    pub fn push(&mut self, record: ObjectRecord) {
        if let Some(class) = ObjectClass::from_id(record.class_id) {
            self.class_counts[class as usize] += 1;
        }
        self.objects.push(record);
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn count_for(&self, class: ObjectClass) -> u32 {
        self.class_counts[class as usize]
    }

    /// Builds a batch from the `VideoRegionOfInterestMeta` attached to a
    /// buffer by the upstream detection bridge.
    ///
    /// Expected per region: the rect in canvas pixels, `roi_type` naming the
    /// class, and optionally an `ObjectTracking` param structure carrying
    /// `object-id`. Regions with an unrecognized `roi_type` are skipped;
    /// a region with a degenerate rect means the metadata itself is broken
    /// and rejects the whole frame. A buffer without any ROI meta yields an
    /// empty batch; that is a valid frame with zero detections, not an error.
    pub fn from_roi_meta(buffer: &gst::BufferRef, frame_number: u64) -> Result<Self, Error> {
        let mut batch = FrameBatch::new(frame_number);

        for meta in buffer.iter_meta::<gst_video::VideoRegionOfInterestMeta>() {
            let (x, y, w, h) = meta.rect();
            let roi_type = meta.roi_type().to_string();
            let Some(class) = ObjectClass::from_roi_type(&roi_type) else {
                continue;
            };
            if w == 0 || h == 0 {
                return Err(Error::MalformedBatch(format!(
                    "region '{roi_type}' at ({x}, {y}) has empty rect {w}x{h}"
                )));
            }

            let id = meta
                .param("ObjectTracking")
                .and_then(|s| s.get::<u32>("object-id").ok())
                .unwrap_or(0);

            batch.push(ObjectRecord {
                id,
                class_id: class as u32,
                left: x as f32,
                top: y as f32,
                width: w as f32,
                height: h as f32,
                text: format!("ID: {:04}, Class: {}", id, class.label()),
            });
        }

        Ok(batch)
    }
}

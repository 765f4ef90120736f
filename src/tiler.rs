//! Grid layout for compositing multiple streams into one canvas.

use gstreamer as gst;
use gstreamer::prelude::*;
use once_cell::sync::Lazy;

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "dspipestiler",
        gst::DebugColorFlags::empty(),
        Some("Multi-stream tiler layout"),
    )
});

/// Rows x columns layout scaling a fixed output canvas to `n` streams.
///
/// Computed once at graph construction; adding or removing a stream means
/// rebuilding the graph, there is no dynamic re-tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub rows: u32,
    pub columns: u32,
    pub width: u32,
    pub height: u32,
}

impl TileGrid {
    /// `rows = ceil(sqrt(n))`, `columns = ceil(n / rows)`.
    pub fn plan(num_streams: usize, width: u32, height: u32) -> Self {
        let n = num_streams.max(1) as u32;
        let rows = (n as f64).sqrt().ceil() as u32;
        let columns = n.div_ceil(rows);
        Self {
            rows,
            columns,
            width,
            height,
        }
    }

    /// Applies the layout to a tiler element (`nvmultistreamtiler`).
    pub fn apply(&self, tiler: &gst::Element) {
        tiler.set_property("rows", self.rows);
        tiler.set_property("columns", self.columns);
        tiler.set_property("width", self.width);
        tiler.set_property("height", self.height);
        gst::info!(
            CAT,
            obj = tiler,
            "tiler layout: {} rows x {} columns, output {}x{}",
            self.rows,
            self.columns,
            self.width,
            self.height
        );
    }
}

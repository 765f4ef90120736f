//! On-screen-display annotation.
//!
//! Once per frame, [`annotate_frame`] turns a [`FrameBatch`] into display
//! primitives: objects are ordered far-to-near so that nearer labels are
//! drawn on top, then partitioned into bounded groups because one display
//! allocation can only carry a limited number of primitives. The allocation
//! itself comes from a [`DisplayPool`], scoped to the frame.
//!
//! This runs synchronously on whichever streaming thread invokes the buffer
//! probe; it does no I/O, takes no locks and keeps no state across frames.

use crate::error::Error;
use crate::meta::{FrameBatch, ObjectClass, ObjectRecord};

/// Upper bound on labels/rects one display allocation can carry.
pub const MAX_LABELS_PER_META: usize = 10;

/// Labels are anchored this many pixels above the box top edge.
const LABEL_ANCHOR_RISE: i32 = 15;

const FONT_NAME: &str = "Serif";
const FONT_SIZE: u32 = 10;
const SUMMARY_X_OFFSET: i32 = 10;
const SUMMARY_Y_OFFSET: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Rgba {
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
/// Translucent purple behind object labels.
pub const LABEL_BACKGROUND: Rgba = Rgba::new(0.45, 0.20, 0.50, 0.75);

/// Border colors, indexed by [`ObjectClass`].
const CLASS_COLORS: [Rgba; 4] = [
    Rgba::new(1.0, 0.0, 0.0, 1.0), // vehicle
    Rgba::new(0.0, 1.0, 0.0, 1.0), // bicycle
    Rgba::new(0.0, 0.0, 1.0, 1.0), // person
    Rgba::new(1.0, 0.0, 1.0, 1.0), // road sign
];

/// Fallback for class ids outside the known table.
const UNKNOWN_CLASS_COLOR: Rgba = Rgba::new(0.5, 0.5, 0.5, 1.0);

pub fn class_color(class_id: u32) -> Rgba {
    match ObjectClass::from_id(class_id) {
        Some(class) => CLASS_COLORS[class as usize],
        None => UNKNOWN_CLASS_COLOR,
    }
}

/// Occlusion proxy used to order objects for drawing.
///
/// `Bottom` is the canonical policy: objects vertically higher on screen are
/// conventionally farther away, so drawing by ascending bottom edge lets
/// nearer objects' labels overwrite those behind them. `Area` treats smaller
/// objects as farther away instead. The two are not equivalent orderings;
/// the policy is chosen per deployment, never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Bottom,
    Area,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bottom" => Ok(SortKey::Bottom),
            "area" => Ok(SortKey::Area),
            other => Err(format!("unknown sort key '{other}' (expected 'bottom' or 'area')")),
        }
    }
}

/// Configuration for one annotation engine instance, fixed at construction.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub sort_key: SortKey,
    pub labels_per_group: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            sort_key: SortKey::Bottom,
            labels_per_group: MAX_LABELS_PER_META,
        }
    }
}

/// One text primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct TextParams {
    pub display_text: String,
    pub x_offset: i32,
    pub y_offset: i32,
    pub font_name: &'static str,
    pub font_size: u32,
    pub font_color: Rgba,
    pub background_color: Option<Rgba>,
}

/// One bounding-box primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct RectParams {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub border_width: u32,
    pub border_color: Rgba,
}

/// One display allocation: a bounded group of text and rect primitives.
#[derive(Debug, Clone, Default)]
pub struct DisplayMeta {
    pub text_params: Vec<TextParams>,
    pub rect_params: Vec<RectParams>,
}

/// Bounded per-frame allocator for display primitives.
///
/// The real allocator lives in the compositing element downstream; it must
/// be internally thread-safe since independent per-stream subgraphs
/// annotate in parallel. Implementations here only need to be usable from
/// the single thread owning the frame.
pub trait DisplayPool {
    fn acquire(&mut self) -> Result<&mut DisplayMeta, Error>;
}

/// Vec-backed pool with a fixed capacity, the in-crate implementation used
/// by the buffer probe and by tests.
#[derive(Debug, Default)]
pub struct VecPool {
    metas: Vec<DisplayMeta>,
    capacity: usize,
}

impl VecPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            metas: Vec::new(),
            capacity,
        }
    }

    pub fn metas(&self) -> &[DisplayMeta] {
        &self.metas
    }

    pub fn into_metas(self) -> Vec<DisplayMeta> {
        self.metas
    }
}

impl DisplayPool for VecPool {
    fn acquire(&mut self) -> Result<&mut DisplayMeta, Error> {
        if self.metas.len() >= self.capacity {
            return Err(Error::PoolExhausted {
                allocated: self.metas.len(),
            });
        }
        self.metas.push(DisplayMeta::default());
        Ok(self.metas.last_mut().expect("just pushed"))
    }
}

/// Orders records far-to-near under the given policy.
///
/// The sort is stable: records with equal keys keep their original relative
/// order, which also makes re-sorting an already sorted batch a no-op.
pub fn order_for_drawing(objects: &mut [ObjectRecord], key: SortKey) {
    match key {
        SortKey::Bottom => objects.sort_by(|a, b| a.bottom().total_cmp(&b.bottom())),
        SortKey::Area => objects.sort_by(|a, b| a.area().total_cmp(&b.area())),
    }
}

/// Label anchor in canvas pixels, or `None` if the label would start
/// off-canvas. An anchor-less object still gets its bounding box.
pub fn label_anchor(record: &ObjectRecord) -> Option<(i32, i32)> {
    let x = record.left as i32;
    let y = record.top as i32 - LABEL_ANCHOR_RISE;
    if x < 0 || y < 0 {
        None
    } else {
        Some((x, y))
    }
}

fn summary_text(batch: &FrameBatch) -> String {
    format!(
        "Frame Number={:05}, Number of Objects={:04}, Vehicles={:04}, Persons={:04}, Bicycles={:04}, Road Signs={:04}",
        batch.frame_number,
        batch.object_count(),
        batch.count_for(ObjectClass::Vehicle),
        batch.count_for(ObjectClass::Person),
        batch.count_for(ObjectClass::Bicycle),
        batch.count_for(ObjectClass::RoadSign),
    )
}

/// Runs the annotation pass for one frame.
///
/// Emits exactly one summary text regardless of batching, then one display
/// group per `labels_per_group` ordered objects: a label per object whose
/// anchor is on-canvas and a class-colored bounding box per object
/// unconditionally.
///
/// On `PoolExhausted` the groups already acquired stay in the pool; the
/// failure is scoped to this frame's annotation and the caller decides
/// whether to submit the partial result.
pub fn annotate_frame(
    batch: &mut FrameBatch,
    config: &OverlayConfig,
    pool: &mut dyn DisplayPool,
) -> Result<(), Error> {
    order_for_drawing(&mut batch.objects, config.sort_key);

    let summary = pool.acquire()?;
    summary.text_params.push(TextParams {
        display_text: summary_text(batch),
        x_offset: SUMMARY_X_OFFSET,
        y_offset: SUMMARY_Y_OFFSET,
        font_name: FONT_NAME,
        font_size: FONT_SIZE,
        font_color: WHITE,
        background_color: Some(BLACK),
    });

    let group_size = config.labels_per_group.max(1);
    for group in batch.objects.chunks(group_size) {
        let meta = pool.acquire()?;
        for record in group {
            if let Some((x, y)) = label_anchor(record) {
                meta.text_params.push(TextParams {
                    display_text: record.text.clone(),
                    x_offset: x,
                    y_offset: y,
                    font_name: FONT_NAME,
                    font_size: FONT_SIZE,
                    font_color: WHITE,
                    background_color: Some(LABEL_BACKGROUND),
                });
            }
            meta.rect_params.push(RectParams {
                left: record.left,
                top: record.top,
                width: record.width,
                height: record.height,
                border_width: 2,
                border_color: class_color(record.class_id),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, top: f32, height: f32, width: f32) -> ObjectRecord {
        ObjectRecord {
            id,
            class_id: 0,
            left: 100.0,
            top,
            width,
            height,
            text: format!("ID: {id:04}"),
        }
    }

    fn batch_of(records: Vec<ObjectRecord>) -> FrameBatch {
        let mut batch = FrameBatch::new(1);
        for rec in records {
            batch.push(rec);
        }
        batch
    }

    #[test]
    fn orders_by_ascending_bottom() {
        let mut objects = vec![
            record(1, 500.0, 100.0, 10.0), // bottom 600
            record(2, 100.0, 50.0, 10.0),  // bottom 150
            record(3, 200.0, 100.0, 10.0), // bottom 300
        ];
        order_for_drawing(&mut objects, SortKey::Bottom);
        let ids: Vec<u32> = objects.iter().map(|r| r.id).collect();
        assert_eq!(ids, [2, 3, 1]);
    }

    #[test]
    fn bottom_and_area_are_different_policies() {
        // Wide shallow box: near the camera (large bottom) but small area.
        let mut by_bottom = vec![
            record(1, 900.0, 20.0, 10.0),   // bottom 920, area 200
            record(2, 100.0, 400.0, 400.0), // bottom 500, area 160000
        ];
        let mut by_area = by_bottom.clone();

        order_for_drawing(&mut by_bottom, SortKey::Bottom);
        order_for_drawing(&mut by_area, SortKey::Area);

        assert_eq!(by_bottom[0].id, 2);
        assert_eq!(by_area[0].id, 1);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut objects = vec![
            record(1, 100.0, 50.0, 10.0),
            record(2, 100.0, 50.0, 20.0),
            record(3, 100.0, 50.0, 30.0),
        ];
        order_for_drawing(&mut objects, SortKey::Bottom);
        let ids: Vec<u32> = objects.iter().map(|r| r.id).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn sorting_twice_is_idempotent() {
        let mut once = vec![
            record(5, 300.0, 10.0, 10.0),
            record(4, 100.0, 10.0, 10.0),
            record(6, 100.0, 10.0, 20.0),
        ];
        order_for_drawing(&mut once, SortKey::Bottom);
        let mut twice = once.clone();
        order_for_drawing(&mut twice, SortKey::Bottom);
        assert_eq!(once, twice);
    }

    #[test]
    fn groups_are_bounded_and_complete() {
        let mut batch = batch_of((0..23).map(|i| record(i, 100.0 + i as f32, 50.0, 10.0)).collect());
        let mut pool = VecPool::new(usize::MAX);
        annotate_frame(&mut batch, &OverlayConfig::default(), &mut pool).unwrap();

        let metas = pool.metas();
        // Summary plus ceil(23 / 10) groups.
        assert_eq!(metas.len(), 4);
        assert_eq!(metas[0].text_params.len(), 1);
        assert!(metas[0].rect_params.is_empty());

        let group_sizes: Vec<usize> = metas[1..].iter().map(|m| m.rect_params.len()).collect();
        assert_eq!(group_sizes, [10, 10, 3]);

        let total_rects: usize = metas[1..].iter().map(|m| m.rect_params.len()).sum();
        assert_eq!(total_rects, 23);
    }

    #[test]
    fn groups_preserve_total_order() {
        let mut batch = batch_of((0..23).rev().map(|i| record(i, i as f32 * 10.0, 50.0, 10.0)).collect());
        let mut pool = VecPool::new(usize::MAX);
        annotate_frame(&mut batch, &OverlayConfig::default(), &mut pool).unwrap();

        // Rect tops across groups, in emission order, must match the sorted
        // batch exactly.
        let emitted: Vec<f32> = pool.metas()[1..]
            .iter()
            .flat_map(|m| m.rect_params.iter().map(|r| r.top))
            .collect();
        let expected: Vec<f32> = batch.objects.iter().map(|r| r.top).collect();
        assert_eq!(emitted, expected);
    }

    #[test]
    fn off_canvas_anchor_suppresses_label_but_not_box() {
        // top=5 puts the label anchor at y=-10.
        let mut batch = batch_of(vec![record(1, 5.0, 50.0, 10.0), record(2, 100.0, 50.0, 10.0)]);
        let mut pool = VecPool::new(usize::MAX);
        annotate_frame(&mut batch, &OverlayConfig::default(), &mut pool).unwrap();

        let group = &pool.metas()[1];
        assert_eq!(group.rect_params.len(), 2);
        assert_eq!(group.text_params.len(), 1);
        assert_eq!(group.text_params[0].display_text, "ID: 0002");
    }

    #[test]
    fn summary_is_emitted_for_empty_frames() {
        let mut batch = FrameBatch::new(42);
        let mut pool = VecPool::new(usize::MAX);
        annotate_frame(&mut batch, &OverlayConfig::default(), &mut pool).unwrap();

        let metas = pool.metas();
        assert_eq!(metas.len(), 1);
        assert!(metas[0].text_params[0]
            .display_text
            .starts_with("Frame Number=00042, Number of Objects=0000"));
    }

    #[test]
    fn summary_counts_per_class() {
        let mut batch = FrameBatch::new(3);
        for class_id in [0, 0, 2, 3] {
            batch.push(ObjectRecord {
                class_id,
                ..record(class_id, 100.0, 50.0, 10.0)
            });
        }
        let mut pool = VecPool::new(usize::MAX);
        annotate_frame(&mut batch, &OverlayConfig::default(), &mut pool).unwrap();

        let text = &pool.metas()[0].text_params[0].display_text;
        assert!(text.contains("Vehicles=0002"));
        assert!(text.contains("Persons=0001"));
        assert!(text.contains("Bicycles=0000"));
        assert!(text.contains("Road Signs=0001"));
    }

    #[test]
    fn exhausted_pool_keeps_earlier_groups() {
        let mut batch = batch_of((0..23).map(|i| record(i, 100.0 + i as f32, 50.0, 10.0)).collect());
        // Room for the summary and one group only.
        let mut pool = VecPool::new(2);
        let err = annotate_frame(&mut batch, &OverlayConfig::default(), &mut pool).unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { allocated: 2 }));

        assert_eq!(pool.metas().len(), 2);
        assert_eq!(pool.metas()[1].rect_params.len(), 10);
    }

    #[test]
    fn class_colors_are_fixed_and_opaque() {
        for class_id in 0..4 {
            assert_eq!(class_color(class_id).alpha, 1.0);
        }
        assert_eq!(class_color(0), Rgba::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(class_color(2), Rgba::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(class_color(99), UNKNOWN_CLASS_COLOR);
    }
}

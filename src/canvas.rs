//! Scrollable SVG canvas: item layout, pixel-accurate hit-testing, drag,
//! pan and zoom-to-cursor.
//!
//! Coordinate model: item positions live in un-zoomed logical units and are
//! never multiplied by zoom when painting — only sizes scale. Logical space
//! therefore coincides with unscrolled content space, and
//! `logical = pointer_in_viewport + view_offset`.

use crate::svg::{Bitmap, SvgDocument, SvgError};
use eframe::egui;
use egui::{Color32, Pos2, Rect, Sense, Stroke, TextureOptions, Vec2, pos2, vec2};
use std::path::Path;

pub const MIN_ZOOM: f32 = 0.05;
pub const MAX_ZOOM: f32 = 10.0;
/// Sampled alpha must exceed this for a pixel-accurate hit.
pub const HIT_ALPHA_THRESHOLD: u8 = 10;
/// Wheel-zoom step per notch.
pub const ZOOM_STEP: f32 = 1.1;
/// Vertical room reserved under each item for its label.
const LABEL_HEIGHT: f32 = 18.0;
/// Margin added around the content bounding box.
const CONTENT_MARGIN: f32 = 20.0;

const SELECTION_STROKE: Color32 = Color32::from_rgb(66, 133, 244);
const PLACEHOLDER_FILL: Color32 = Color32::from_gray(200);

// ============================================================================
// CANVAS ITEM
// ============================================================================

/// One placed SVG: an exclusively-owned document plus layout state.
pub struct SvgItem {
    pub doc: SvgDocument,
    /// Top-left corner in logical units.
    pub pos: Pos2,
    /// Un-zoomed size in logical units.
    pub base_size: Vec2,
    pub label: String,
    pub visible: bool,
    texture: Option<egui::TextureHandle>,
    texture_generation: u64,
}

impl SvgItem {
    fn new(doc: SvgDocument, pos: Pos2, base_size: Vec2, label: String) -> Self {
        Self {
            doc,
            pos,
            base_size,
            label,
            visible: true,
            texture: None,
            texture_generation: 0,
        }
    }

    /// Device pixel size at the given zoom, rounded, at least 1×1.
    pub fn scaled_size(&self, zoom: f32) -> Vec2 {
        vec2(
            (self.base_size.x * zoom).round().max(1.0),
            (self.base_size.y * zoom).round().max(1.0),
        )
    }

    fn bounds(&self, zoom: f32) -> Rect {
        Rect::from_min_size(self.pos, self.scaled_size(zoom))
    }
}

struct DragState {
    index: usize,
    /// Pointer-to-origin offset captured at press, in logical units.
    offset: Vec2,
}

struct PanState {
    /// Pointer position at pan start, in screen coordinates.
    anchor: Pos2,
    /// View offset at pan start.
    start_offset: Vec2,
}

// ============================================================================
// CANVAS
// ============================================================================

pub struct SvgCanvas {
    items: Vec<SvgItem>,
    zoom: f32,
    selected: Option<usize>,
    drag: Option<DragState>,
    pan: Option<PanState>,
    view_offset: Vec2,
    /// Scroll offset to apply on the next frame (pan / zoom-to-cursor).
    pending_scroll: Option<Vec2>,
}

impl Default for SvgCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgCanvas {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            zoom: 1.0,
            selected: None,
            drag: None,
            pan: None,
            view_offset: Vec2::ZERO,
            pending_scroll: None,
        }
    }

    // ---- items --------------------------------------------------------------

    /// Load an SVG file and append it as a new item. On load failure nothing
    /// is added and the error is returned.
    pub fn add_item(
        &mut self,
        path: &Path,
        pos: Pos2,
        base_size: Vec2,
        label: impl Into<String>,
    ) -> Result<(), SvgError> {
        let mut doc = SvgDocument::new();
        doc.load_from_file(path)?;
        self.items
            .push(SvgItem::new(doc, pos, base_size, label.into()));
        Ok(())
    }

    /// Append an item from in-memory SVG text (demo assets, tests).
    pub fn add_item_from_text(
        &mut self,
        text: &str,
        pos: Pos2,
        base_size: Vec2,
        label: impl Into<String>,
    ) -> Result<(), SvgError> {
        let mut doc = SvgDocument::new();
        doc.load_from_text(text)?;
        self.items
            .push(SvgItem::new(doc, pos, base_size, label.into()));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.selected = None;
        self.drag = None;
        self.pan = None;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_mut(&mut self, index: usize) -> Option<&mut SvgItem> {
        self.items.get_mut(index)
    }

    pub fn item(&self, index: usize) -> Option<&SvgItem> {
        self.items.get(index)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_item_mut(&mut self) -> Option<&mut SvgItem> {
        let index = self.selected?;
        self.items.get_mut(index)
    }

    // ---- zoom ---------------------------------------------------------------

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Clamp to [0.05, 10.0] and mark every item dirty so the next paint
    /// re-renders at the new pixel size.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        for item in &mut self.items {
            item.doc.mark_dirty();
        }
    }

    /// Zoom by one wheel step, then recompute the view offset so the logical
    /// point that was under the cursor stays at the same screen pixel.
    pub fn zoom_around(&mut self, logical: Pos2, pointer_in_view: Pos2, zoom_in: bool) {
        let step = if zoom_in { ZOOM_STEP } else { 1.0 / ZOOM_STEP };
        self.set_zoom(self.zoom * step);
        let desired = vec2(
            (logical.x - pointer_in_view.x).max(0.0),
            (logical.y - pointer_in_view.y).max(0.0),
        );
        self.pending_scroll = Some(desired);
    }

    /// Scroll offset requested for the next frame, if any.
    pub fn pending_scroll(&self) -> Option<Vec2> {
        self.pending_scroll
    }

    // ---- hit testing / selection / drag -------------------------------------

    /// Pixel-accurate hit test in logical coordinates. Topmost (most recently
    /// added) item wins; a hit needs sampled alpha above the threshold, so
    /// transparent SVG backgrounds don't swallow clicks. Bitmaps without an
    /// alpha channel hit anywhere inside their rectangle.
    pub fn hit_test(&mut self, logical: Pos2) -> Option<usize> {
        let zoom = self.zoom;
        for index in (0..self.items.len()).rev() {
            let (visible, rect) = {
                let item = &self.items[index];
                (item.visible, item.bounds(zoom))
            };
            if !visible || !rect.contains(logical) {
                continue;
            }

            let lx = (logical.x - rect.min.x) as u32;
            let ly = (logical.y - rect.min.y) as u32;
            let w = rect.width() as u32;
            let h = rect.height() as u32;
            if lx >= w || ly >= h {
                continue;
            }

            let item = &mut self.items[index];
            let Ok(bitmap) = item.doc.render(w, h, zoom) else {
                continue;
            };
            if alpha_hit(bitmap, lx, ly) {
                return Some(index);
            }
        }
        None
    }

    /// Primary-button press: select the hit item and begin dragging it, or
    /// clear the selection on a miss. Ignored while panning.
    pub fn pointer_pressed(&mut self, logical: Pos2) {
        if self.pan.is_some() {
            return;
        }
        match self.hit_test(logical) {
            Some(index) => {
                self.selected = Some(index);
                let offset = logical - self.items[index].pos;
                self.drag = Some(DragState { index, offset });
            }
            None => self.selected = None,
        }
    }

    /// Pointer motion while the primary button is down: keep the grab point
    /// under the cursor. Moving never marks the document dirty.
    pub fn pointer_dragged(&mut self, logical: Pos2) {
        if let Some(drag) = &self.drag {
            self.items[drag.index].pos = logical - drag.offset;
        }
    }

    pub fn pointer_released(&mut self) {
        self.drag = None;
    }

    // ---- panning ------------------------------------------------------------

    /// Secondary-button press: capture the anchor and view-offset snapshot.
    /// Ignored while an item drag is active.
    pub fn pan_begin(&mut self, pointer_screen: Pos2) {
        if self.drag.is_some() {
            return;
        }
        self.pan = Some(PanState {
            anchor: pointer_screen,
            start_offset: self.view_offset,
        });
    }

    pub fn pan_update(&mut self, pointer_screen: Pos2) {
        if let Some(pan) = &self.pan {
            let delta = pointer_screen - pan.anchor;
            let desired = pan.start_offset - delta;
            self.pending_scroll = Some(desired.max(Vec2::ZERO));
        }
    }

    pub fn pan_end(&mut self) {
        self.pan = None;
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    // ---- layout -------------------------------------------------------------

    /// Total scrollable content extent: bounding box of all visible items at
    /// the current zoom, plus label allowance and margin.
    pub fn virtual_size(&self) -> Vec2 {
        let mut max = Vec2::ZERO;
        for item in &self.items {
            if !item.visible {
                continue;
            }
            let scaled = item.scaled_size(self.zoom);
            max.x = max.x.max(item.pos.x + scaled.x);
            max.y = max.y.max(item.pos.y + scaled.y + LABEL_HEIGHT);
        }
        max + vec2(CONTENT_MARGIN, CONTENT_MARGIN)
    }

    // ---- paint + input ------------------------------------------------------

    pub fn show(&mut self, ui: &mut egui::Ui) {
        let viewport_size = ui.available_size();

        let mut area = egui::ScrollArea::both().auto_shrink([false, false]);
        if let Some(offset) = self.pending_scroll.take() {
            area = area.scroll_offset(offset);
        }

        let output = area.show(ui, |ui| {
            let viewport_min = ui.clip_rect().min;
            let content_size = self.virtual_size().max(viewport_size);
            let (response, painter) = ui.allocate_painter(content_size, Sense::click_and_drag());
            let origin = response.rect.min;

            painter.rect_filled(response.rect, 0.0, Color32::WHITE);

            // -- input ---------------------------------------------------
            if let Some(screen) = response.interact_pointer_pos() {
                let logical = (screen - origin).to_pos2();
                let secondary = ui.input(|i| i.pointer.secondary_down());

                if response.drag_started() {
                    if secondary {
                        self.pan_begin(screen);
                    } else {
                        self.pointer_pressed(logical);
                    }
                }
                if response.dragged() {
                    if self.is_panning() {
                        self.pan_update(screen);
                    } else {
                        self.pointer_dragged(logical);
                    }
                }
            }
            if response.drag_released() {
                self.pointer_released();
                self.pan_end();
            }

            // Modifier+wheel (or pinch): zoom anchored at the cursor.
            if response.hovered() {
                let zoom_delta = ui.input(|i| i.zoom_delta());
                if zoom_delta != 1.0 {
                    if let Some(screen) = ui.input(|i| i.pointer.hover_pos()) {
                        let logical = (screen - origin).to_pos2();
                        let in_view = (screen - viewport_min).to_pos2();
                        self.zoom_around(logical, in_view, zoom_delta > 1.0);
                    }
                }
            }

            // -- paint ---------------------------------------------------
            self.paint_items(ui.ctx(), &painter, origin);
        });

        self.view_offset = output.state.offset;
    }

    fn paint_items(&mut self, ctx: &egui::Context, painter: &egui::Painter, origin: Pos2) {
        let zoom = self.zoom;
        for index in 0..self.items.len() {
            let selected = self.selected == Some(index);
            let item = &mut self.items[index];
            if !item.visible {
                continue;
            }

            let scaled = item.scaled_size(zoom);
            let rect = Rect::from_min_size(origin + item.pos.to_vec2(), scaled);
            let w = scaled.x as u32;
            let h = scaled.y as u32;

            match item.doc.render(w, h, zoom) {
                Ok(_) => {
                    // Re-upload the texture only when a render actually
                    // rasterized (generation moved) or none exists yet.
                    let generation = item.doc.generation();
                    if item.texture.is_none() || item.texture_generation != generation {
                        if let Some(bitmap) = item.doc.cached_bitmap(w, h, zoom) {
                            item.texture = Some(ctx.load_texture(
                                format!("svg-item-{index}"),
                                bitmap.to_color_image(),
                                TextureOptions::default(),
                            ));
                            item.texture_generation = generation;
                        }
                    }
                    if let Some(texture) = &item.texture {
                        painter.image(
                            texture.id(),
                            rect,
                            Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                            Color32::WHITE,
                        );
                    }
                    if selected {
                        painter.rect_stroke(rect, 0.0, Stroke::new(2.0, SELECTION_STROKE));
                    }
                }
                Err(_) => {
                    // Failed render: placeholder instead of a crash.
                    let placeholder =
                        Rect::from_min_size(rect.min, vec2(scaled.x.max(10.0), scaled.y.max(10.0)));
                    painter.rect_filled(placeholder, 0.0, PLACEHOLDER_FILL);
                    painter.rect_stroke(placeholder, 0.0, Stroke::new(1.0, Color32::GRAY));
                }
            }

            if !item.label.is_empty() {
                painter.text(
                    pos2(rect.min.x, rect.max.y + 4.0),
                    egui::Align2::LEFT_TOP,
                    &item.label,
                    egui::FontId::proportional(13.0),
                    Color32::BLACK,
                );
            }
        }
    }
}

/// Alpha-threshold hit rule: bitmaps without an alpha channel count the
/// whole rectangle as a hit; otherwise sampled alpha must exceed the
/// threshold.
pub fn alpha_hit(bitmap: &Bitmap, lx: u32, ly: u32) -> bool {
    match bitmap.alpha_at(lx, ly) {
        None => true,
        Some(alpha) => alpha > HIT_ALPHA_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    // 128×128 document: opaque square in the left half, transparent right half.
    const HALF_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="128" height="128">
  <rect x="0" y="0" width="64" height="128" fill="#cc3344"/>
</svg>"##;

    fn canvas_with_item(pos: Pos2) -> SvgCanvas {
        let mut canvas = SvgCanvas::new();
        canvas
            .add_item_from_text(HALF_SVG, pos, vec2(128.0, 128.0), "half.svg")
            .unwrap();
        canvas
    }

    #[test]
    fn zoom_is_clamped() {
        let mut canvas = SvgCanvas::new();
        canvas.set_zoom(0.0);
        assert_eq!(canvas.zoom(), 0.05);
        canvas.set_zoom(100.0);
        assert_eq!(canvas.zoom(), 10.0);
        canvas.set_zoom(1.5);
        assert_eq!(canvas.zoom(), 1.5);
    }

    #[test]
    fn set_zoom_marks_items_dirty() {
        let mut canvas = canvas_with_item(pos2(0.0, 0.0));
        canvas.items[0].doc.render(128, 128, 1.0).unwrap();
        assert!(!canvas.items[0].doc.is_dirty());
        canvas.set_zoom(2.0);
        assert!(canvas.items[0].doc.is_dirty());
    }

    #[test]
    fn alpha_threshold_boundary() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 10]));
        image.put_pixel(1, 0, Rgba([255, 0, 0, 11]));
        let bitmap = Bitmap::from_image(image, true);
        assert!(!alpha_hit(&bitmap, 0, 0), "alpha 10 is a miss");
        assert!(alpha_hit(&bitmap, 1, 0), "alpha 11 is a hit");
    }

    #[test]
    fn bitmap_without_alpha_always_hits() {
        let bitmap = Bitmap::from_image(RgbaImage::new(2, 2), false);
        assert!(alpha_hit(&bitmap, 0, 0));
        assert!(alpha_hit(&bitmap, 1, 1));
    }

    #[test]
    fn hit_test_is_pixel_accurate() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        // Opaque left half hits, transparent right half misses even though
        // both points are inside the bounding rectangle.
        assert_eq!(canvas.hit_test(pos2(40.0, 60.0)), Some(0));
        assert_eq!(canvas.hit_test(pos2(120.0, 60.0)), None);
        // Outside the rectangle entirely.
        assert_eq!(canvas.hit_test(pos2(300.0, 300.0)), None);
    }

    #[test]
    fn hit_test_prefers_topmost_item() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas
            .add_item_from_text(HALF_SVG, pos2(30.0, 30.0), vec2(128.0, 128.0), "top.svg")
            .unwrap();
        // Both opaque halves overlap here; the most recently added wins.
        assert_eq!(canvas.hit_test(pos2(50.0, 60.0)), Some(1));
    }

    #[test]
    fn hidden_items_never_hit() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.items[0].visible = false;
        assert_eq!(canvas.hit_test(pos2(40.0, 60.0)), None);
    }

    #[test]
    fn press_selects_and_miss_clears() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.pointer_pressed(pos2(40.0, 60.0));
        assert_eq!(canvas.selected_index(), Some(0));
        canvas.pointer_released();
        canvas.pointer_pressed(pos2(400.0, 400.0));
        assert_eq!(canvas.selected_index(), None);
    }

    #[test]
    fn drag_keeps_grab_point_and_cache() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.pointer_pressed(pos2(40.0, 60.0));
        let generation = canvas.items[0].doc.generation();

        canvas.pointer_dragged(pos2(50.0, 70.0));
        canvas.pointer_released();
        assert_eq!(canvas.items[0].pos, pos2(30.0, 30.0));
        // Moving does not invalidate the cached bitmap.
        assert!(!canvas.items[0].doc.is_dirty());
        assert!(canvas.items[0].doc.cached_bitmap(128, 128, 1.0).is_some());
        assert_eq!(canvas.items[0].doc.generation(), generation);
    }

    #[test]
    fn drag_and_pan_are_mutually_exclusive() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.pointer_pressed(pos2(40.0, 60.0));
        canvas.pan_begin(pos2(0.0, 0.0));
        assert!(!canvas.is_panning(), "pan refused while dragging");
        canvas.pointer_released();

        canvas.pan_begin(pos2(0.0, 0.0));
        assert!(canvas.is_panning());
        let before = canvas.selected_index();
        canvas.pointer_pressed(pos2(40.0, 60.0));
        assert_eq!(
            canvas.selected_index(),
            before,
            "press ignored while panning"
        );
        canvas.pan_end();
    }

    #[test]
    fn pan_shifts_view_offset_from_snapshot() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.view_offset = vec2(100.0, 50.0);
        canvas.pan_begin(pos2(200.0, 200.0));
        canvas.pan_update(pos2(230.0, 210.0));
        assert_eq!(canvas.pending_scroll(), Some(vec2(70.0, 40.0)));
        // Clamped to non-negative.
        canvas.pan_update(pos2(500.0, 400.0));
        assert_eq!(canvas.pending_scroll(), Some(vec2(0.0, 0.0)));
    }

    #[test]
    fn zoom_to_cursor_keeps_point_under_pointer() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        let pointer = pos2(90.0, 75.0);
        let logical = pos2(140.0, 115.0);

        for _ in 0..2 {
            canvas.zoom_around(logical, pointer, true);
            let offset = canvas.pending_scroll().unwrap();
            // screen = logical − offset must land back on the pointer.
            assert_eq!(logical - offset, pointer);
        }
        assert!((canvas.zoom() - 1.1 * 1.1).abs() < 1e-5);
    }

    #[test]
    fn zoom_to_cursor_offset_clamps_non_negative() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.zoom_around(pos2(5.0, 5.0), pos2(50.0, 50.0), false);
        assert_eq!(canvas.pending_scroll(), Some(vec2(0.0, 0.0)));
    }

    #[test]
    fn virtual_size_covers_items_and_labels() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.set_zoom(2.0);
        // 20 + 256 + margin, 20 + 256 + label height + margin.
        assert_eq!(canvas.virtual_size(), vec2(296.0, 314.0));

        canvas.items[0].visible = false;
        assert_eq!(canvas.virtual_size(), vec2(20.0, 20.0));
    }

    #[test]
    fn add_item_failure_leaves_canvas_unchanged() {
        let mut canvas = SvgCanvas::new();
        assert!(
            canvas
                .add_item_from_text("<not svg", pos2(0.0, 0.0), vec2(64.0, 64.0), "bad")
                .is_err()
        );
        assert!(canvas.is_empty());

        assert!(
            canvas
                .add_item(
                    Path::new("/no/such/file.svg"),
                    pos2(0.0, 0.0),
                    vec2(64.0, 64.0),
                    "missing",
                )
                .is_err()
        );
        assert!(canvas.is_empty());
    }

    #[test]
    fn clear_drops_items_and_selection() {
        let mut canvas = canvas_with_item(pos2(20.0, 20.0));
        canvas.pointer_pressed(pos2(40.0, 60.0));
        canvas.clear();
        assert!(canvas.is_empty());
        assert_eq!(canvas.selected_index(), None);
    }
}

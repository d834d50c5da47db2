use eframe::egui;
use egui::{Pos2, Vec2, pos2, vec2};

use crate::canvas::{SvgCanvas, ZOOM_STEP};
use crate::components::dialogs::{MessageDialog, ModifyColorDialog, ModifyTextDialog};
use crate::dom::{self, DomError, Selector};
use crate::{log_err, log_info, log_warn};

// Demo documents placed on the canvas so the app is not empty on first launch.
const DEMO_SVGS: &[(&str, &str)] = &[
    ("badge.svg", include_str!("../assets/badge.svg")),
    ("gauge.svg", include_str!("../assets/gauge.svg")),
    ("marker.svg", include_str!("../assets/marker.svg")),
];

const SELECT_FIRST_HINT: &str = "Please click an SVG first.";

// ============================================================================
// APP
// ============================================================================

pub struct SvgDeskApp {
    canvas: SvgCanvas,
    color_dialog: ModifyColorDialog,
    text_dialog: ModifyTextDialog,
    message: MessageDialog,
    /// Where the next opened file lands, staggered so items do not stack.
    next_drop_pos: Pos2,
}

impl SvgDeskApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let mut canvas = SvgCanvas::new();

        let mut y = 20.0;
        for (name, text) in DEMO_SVGS {
            let base = intrinsic_or_default(text);
            match canvas.add_item_from_text(text, pos2(20.0, y), base, *name) {
                Ok(()) => y += base.y + 20.0,
                Err(e) => log_err!("demo asset {name} failed to load: {e}"),
            }
        }
        log_info!("canvas seeded with {} demo images", canvas.len());

        Self {
            canvas,
            color_dialog: ModifyColorDialog::default(),
            text_dialog: ModifyTextDialog::default(),
            message: MessageDialog::default(),
            next_drop_pos: pos2(40.0, 40.0),
        }
    }

    // ---- file menu actions --------------------------------------------------

    fn open_svg_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("SVG image", &["svg"])
            .pick_file()
        else {
            return;
        };

        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image.svg".to_string());

        let pos = self.next_drop_pos;
        match self.canvas.add_item(&path, pos, vec2(128.0, 128.0), &label) {
            Ok(()) => {
                // Size the new item to the document's own dimensions where known.
                let idx = self.canvas.len() - 1;
                if let Some(item) = self.canvas.item_mut(idx) {
                    if let Some((w, h)) = item.doc.intrinsic_size() {
                        item.base_size = vec2(w, h);
                    }
                }
                self.next_drop_pos += vec2(24.0, 24.0);
                log_info!("opened {}", path.display());
            }
            Err(e) => {
                log_warn!("failed to open {}: {e}", path.display());
                self.message
                    .info("Open SVG", &format!("Could not load {label}: {e}"));
            }
        }
    }

    // ---- edit menu actions --------------------------------------------------

    fn begin_modify_color(&mut self) {
        if self.canvas.selected_index().is_none() {
            self.message.info("Modify Color", SELECT_FIRST_HINT);
            return;
        }
        self.color_dialog.open = true;
    }

    fn begin_modify_text(&mut self) {
        let Some(item) = self.canvas.selected_item_mut() else {
            self.message.info("Modify Text", SELECT_FIRST_HINT);
            return;
        };
        let Some(text) = item.doc.document_text() else {
            self.message.info("Modify Text", "The selected image has no document.");
            return;
        };
        match dom::text_entries(text) {
            Ok(entries) if entries.is_empty() => {
                self.message
                    .info("Modify Text", "No text elements found in this image.");
            }
            Ok(entries) => {
                self.text_dialog.set_entries(entries);
                self.text_dialog.open = true;
            }
            Err(e) => {
                log_warn!("text scan failed: {e}");
                self.message
                    .info("Modify Text", &format!("Could not read the document: {e}"));
            }
        }
    }

    /// Rewrite the selected document's fill. Structured rewrite first; if the
    /// document is too awkward to rewrite in place, fall back to injecting an
    /// `!important` stylesheet override.
    fn apply_fill(&mut self, selector_text: &str, color: &str) {
        let selector = match Selector::parse(selector_text) {
            Ok(s) => s,
            Err(e) => {
                self.message.info("Modify Color", &format!("{e}"));
                return;
            }
        };

        let Some(text) = self
            .canvas
            .selected_item_mut()
            .and_then(|i| i.doc.document_text())
            .map(str::to_owned)
        else {
            self.message.info("Modify Color", SELECT_FIRST_HINT);
            return;
        };

        let rewritten = match dom::set_fill(&text, &selector, color) {
            Ok(new_text) => new_text,
            Err(DomError::NoMatch) => {
                self.message.info(
                    "Modify Color",
                    &format!("No elements matched \"{selector_text}\"."),
                );
                return;
            }
            Err(e) => {
                log_warn!("structured fill rewrite failed, using stylesheet override: {e}");
                match dom::override_fill_stylesheet(&text, selector_text, color) {
                    Ok(new_text) => new_text,
                    Err(e) => {
                        log_err!("stylesheet override failed too: {e}");
                        self.message
                            .info("Modify Color", &format!("Could not modify the image: {e}"));
                        return;
                    }
                }
            }
        };

        self.reload_selected(rewritten, "Modify Color");
    }

    fn apply_text(&mut self, ordinal: usize, replacement: &str) {
        let Some(text) = self
            .canvas
            .selected_item_mut()
            .and_then(|i| i.doc.document_text())
            .map(str::to_owned)
        else {
            self.message.info("Modify Text", SELECT_FIRST_HINT);
            return;
        };

        match dom::set_text(&text, ordinal, replacement) {
            Ok(rewritten) => self.reload_selected(rewritten, "Modify Text"),
            Err(e) => {
                log_warn!("text rewrite failed: {e}");
                self.message
                    .info("Modify Text", &format!("Could not modify the image: {e}"));
            }
        }
    }

    /// Swap the selected item's document for rewritten markup and re-render
    /// it right away at the current zoom.
    fn reload_selected(&mut self, rewritten: String, context: &str) {
        let zoom = self.canvas.zoom();
        let Some(item) = self.canvas.selected_item_mut() else {
            return;
        };
        if let Err(e) = item.doc.load_from_text(rewritten) {
            log_err!("rewritten document failed to parse: {e}");
            self.message
                .info(context, &format!("The modified image failed to parse: {e}"));
            return;
        }
        item.doc.mark_dirty();

        let size = item.scaled_size(zoom);
        if let Err(e) = item.doc.render(size.x as u32, size.y as u32, zoom) {
            log_warn!("re-render after edit failed: {e}");
        }
    }

    // ---- chrome -------------------------------------------------------------

    fn menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open SVG…").clicked() {
                        self.open_svg_file();
                        ui.close_menu();
                    }
                    if ui.button("Clear Canvas").clicked() {
                        self.canvas.clear();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("Edit", |ui| {
                    if ui.button("Modify Color…").clicked() {
                        self.begin_modify_color();
                        ui.close_menu();
                    }
                    if ui.button("Modify Text…").clicked() {
                        self.begin_modify_text();
                        ui.close_menu();
                    }
                });
                ui.menu_button("View", |ui| {
                    if ui.button("Zoom In").clicked() {
                        let z = self.canvas.zoom();
                        self.canvas.set_zoom(z * ZOOM_STEP);
                        ui.close_menu();
                    }
                    if ui.button("Zoom Out").clicked() {
                        let z = self.canvas.zoom();
                        self.canvas.set_zoom(z / ZOOM_STEP);
                        ui.close_menu();
                    }
                    ui.separator();
                    for (label, zoom) in [("50%", 0.5), ("100%", 1.0), ("200%", 2.0)] {
                        if ui.button(label).clicked() {
                            self.canvas.set_zoom(zoom);
                            ui.close_menu();
                        }
                    }
                    ui.separator();
                    if ui.button("Reset Zoom").clicked() {
                        self.canvas.set_zoom(1.0);
                        ui.close_menu();
                    }
                });
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("{:.0}%", self.canvas.zoom() * 100.0));
                });
            });
        });
    }
}

impl eframe::App for SvgDeskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.menu_bar(ctx);

        if let Some((selector, color)) = self.color_dialog.show(ctx) {
            self.apply_fill(&selector, &color);
        }
        if let Some((ordinal, replacement)) = self.text_dialog.show(ctx) {
            self.apply_text(ordinal, &replacement);
        }
        self.message.show(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                self.canvas.show(ui);
            });
    }
}

/// Base size for a freshly-loaded document, falling back to 128x128 when the
/// markup does not declare its own dimensions.
fn intrinsic_or_default(text: &str) -> Vec2 {
    let mut doc = crate::svg::SvgDocument::new();
    if doc.load_from_text(text).is_ok() {
        if let Some((w, h)) = doc.intrinsic_size() {
            return vec2(w, h);
        }
    }
    vec2(128.0, 128.0)
}

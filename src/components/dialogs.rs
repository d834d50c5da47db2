use eframe::egui;
use egui::{Color32, RichText};

use crate::dom::TextEntry;

const ACCENT: Color32 = Color32::from_rgb(66, 133, 244);

fn dialog_header(ui: &mut egui::Ui, title: &str) {
    ui.label(RichText::new(title).strong().size(16.0).color(ACCENT));
    ui.separator();
    ui.add_space(4.0);
}

// ============================================================================
// MODIFY COLOR DIALOG
// ============================================================================

/// Asks for a CSS-ish selector and a fill color, applied to the selected
/// image on confirm.
pub struct ModifyColorDialog {
    pub open: bool,
    selector: String,
    color: String,
}

impl Default for ModifyColorDialog {
    fn default() -> Self {
        Self {
            open: false,
            selector: "*".to_string(),
            color: "#ff0000".to_string(),
        }
    }
}

impl ModifyColorDialog {
    /// Show the dialog and return `Some((selector, color))` on confirm.
    pub fn show(&mut self, ctx: &egui::Context) -> Option<(String, String)> {
        let mut result = None;
        let mut should_close = false;

        if self.open {
            // Keyboard: Enter = Apply, Esc = Cancel
            let enter = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Enter));
            let esc = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Escape));
            if enter {
                result = Some((self.selector.clone(), self.color.clone()));
                should_close = true;
            }
            if esc {
                should_close = true;
            }

            egui::Window::new("modify_color_dialog_internal")
                .title_bar(false)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.set_min_width(320.0);
                    dialog_header(ui, "Modify Color");

                    egui::Grid::new("modify_color_grid")
                        .num_columns(2)
                        .min_col_width(70.0)
                        .spacing([8.0, 6.0])
                        .show(ui, |ui| {
                            ui.label("Selector");
                            ui.add(
                                egui::TextEdit::singleline(&mut self.selector)
                                    .desired_width(220.0)
                                    .hint_text("* , tag, #id or .class"),
                            );
                            ui.end_row();

                            ui.label("Fill color");
                            ui.add(
                                egui::TextEdit::singleline(&mut self.color)
                                    .desired_width(220.0)
                                    .hint_text("#rrggbb or named color"),
                            );
                            ui.end_row();
                        });

                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        if ui.button("Apply").clicked() {
                            result = Some((self.selector.clone(), self.color.clone()));
                            should_close = true;
                        }
                        if ui.button("Cancel").clicked() {
                            should_close = true;
                        }
                    });
                });
        }

        if should_close {
            self.open = false;
        }
        result
    }
}

// ============================================================================
// MODIFY TEXT DIALOG
// ============================================================================

/// Lists the text-bearing elements of the selected image and edits the
/// content of one of them.
#[derive(Default)]
pub struct ModifyTextDialog {
    pub open: bool,
    entries: Vec<TextEntry>,
    selected: usize,
    replacement: String,
}

impl ModifyTextDialog {
    /// Load the entries to choose from and reset the edit box to the first
    /// entry's current content.
    pub fn set_entries(&mut self, entries: Vec<TextEntry>) {
        self.selected = 0;
        self.replacement = entries
            .first()
            .map(|e| e.content.clone())
            .unwrap_or_default();
        self.entries = entries;
    }

    /// Show the dialog and return `Some((ordinal, replacement))` on confirm.
    pub fn show(&mut self, ctx: &egui::Context) -> Option<(usize, String)> {
        let mut result = None;
        let mut should_close = false;

        if self.open {
            let enter = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Enter));
            let esc = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Escape));
            if enter {
                if let Some(entry) = self.entries.get(self.selected) {
                    result = Some((entry.ordinal, self.replacement.clone()));
                }
                should_close = true;
            }
            if esc {
                should_close = true;
            }

            egui::Window::new("modify_text_dialog_internal")
                .title_bar(false)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.set_min_width(340.0);
                    dialog_header(ui, "Modify Text");

                    let selected_label = self
                        .entries
                        .get(self.selected)
                        .map(TextEntry::preview)
                        .unwrap_or_default();
                    egui::ComboBox::from_label("Element")
                        .width(250.0)
                        .selected_text(selected_label)
                        .show_ui(ui, |ui| {
                            for (i, entry) in self.entries.iter().enumerate() {
                                if ui
                                    .selectable_value(&mut self.selected, i, entry.preview())
                                    .clicked()
                                {
                                    self.replacement = entry.content.clone();
                                }
                            }
                        });

                    ui.add_space(6.0);
                    ui.label("New text");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.replacement).desired_width(310.0),
                    );

                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        if ui.button("Apply").clicked() {
                            if let Some(entry) = self.entries.get(self.selected) {
                                result = Some((entry.ordinal, self.replacement.clone()));
                            }
                            should_close = true;
                        }
                        if ui.button("Cancel").clicked() {
                            should_close = true;
                        }
                    });
                });
        }

        if should_close {
            self.open = false;
        }
        result
    }
}

// ============================================================================
// MESSAGE DIALOG
// ============================================================================

/// One-button informational popup.
#[derive(Default)]
pub struct MessageDialog {
    pub open: bool,
    title: String,
    text: String,
}

impl MessageDialog {
    pub fn info(&mut self, title: &str, text: &str) {
        self.title = title.to_string();
        self.text = text.to_string();
        self.open = true;
    }

    pub fn show(&mut self, ctx: &egui::Context) {
        let mut should_close = false;

        if self.open {
            let enter = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Enter));
            let esc = ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Escape));
            if enter || esc {
                should_close = true;
            }

            egui::Window::new("message_dialog_internal")
                .title_bar(false)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.set_min_width(260.0);
                    dialog_header(ui, &self.title);
                    ui.label(&self.text);
                    ui.add_space(8.0);
                    if ui.button("OK").clicked() {
                        should_close = true;
                    }
                });
        }

        if should_close {
            self.open = false;
        }
    }
}

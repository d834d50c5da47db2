// GUI-subsystem binary: no console window is ever allocated by Windows.
#![windows_subsystem = "windows"]

use eframe::egui;
use svgdesk::app::SvgDeskApp;
use svgdesk::logger;

fn main() -> Result<(), eframe::Error> {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_title("SvgDesk"),
        ..Default::default()
    };

    eframe::run_native(
        "SvgDesk",
        options,
        Box::new(|cc| Box::new(SvgDeskApp::new(cc))),
    )
}

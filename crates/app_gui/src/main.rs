mod app;

use anyhow::anyhow;
use app::UiApp;
use eframe::NativeOptions;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let app = UiApp::new()?;
    let options = NativeOptions::default();
    eframe::run_native(
        "CheckYourMole",
        options,
        Box::new(move |cc| {
            egui_extras::install_image_loaders(&cc.egui_ctx);
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow!("application stopped with error: {e}"))
}

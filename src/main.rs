use std::sync::mpsc;

use buff_mirror::controller::{Controller, Deps, UiEvent};
use buff_mirror::logging;
use buff_mirror::settings::Settings;

fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.json".to_string());
    let settings = Settings::load(&settings_path)?;
    logging::init(settings.debug_logging);
    tracing::info!("starting with settings from {settings_path}");

    // The sender side belongs to the UI collaborators (editor dialogs, tray).
    // Keeping one alive here means a missing UI never tears the loop down;
    // the End hotkey remains the exit path.
    let (tx, rx) = mpsc::channel::<UiEvent>();
    let _tx = tx;

    let mut controller = Controller::new(settings, &settings_path, Deps::native());
    controller.run(rx);
    Ok(())
}

use serde::{Deserialize, Serialize};

/// How the capture ROI is anchored on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMode {
    /// Pin the rectangle to the top-right corner of the primary display.
    TopRight,
    /// Use the stored left/top as-is.
    Absolute,
}

impl Default for RoiMode {
    fn default() -> Self {
        RoiMode::TopRight
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiConfig {
    #[serde(default)]
    pub mode: RoiMode,
    #[serde(default)]
    pub left: i32,
    #[serde(default)]
    pub top: i32,
    #[serde(default = "default_roi_width")]
    pub width: u32,
    #[serde(default = "default_roi_height")]
    pub height: u32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            mode: RoiMode::TopRight,
            left: 0,
            top: 0,
            width: default_roi_width(),
            height: default_roi_height(),
        }
    }
}

/// Repeated key-sequence emulation config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Comma-separated key names, e.g. "1,2,3,4".
    #[serde(default = "default_macro_sequence")]
    pub sequence: String,
    #[serde(default = "default_macro_delay")]
    pub delay_ms: u64,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sequence: default_macro_sequence(),
            delay_ms: default_macro_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub roi: RoiConfig,
    /// Peak correlation required before a template counts as detected.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "default_library_path")]
    pub library_path: String,
    #[serde(default = "default_currency_path")]
    pub currency_path: String,
    /// Pause scanning and overlays while the game is not focused.
    #[serde(default = "default_require_focus")]
    pub require_game_focus: bool,
    /// Executable names allowed to own the foreground while scanning.
    #[serde(default = "default_allowed_processes")]
    pub allowed_processes: Vec<String>,
    /// When enabled the application initialises the logger at debug level.
    #[serde(default)]
    pub debug_logging: bool,
    /// Minimum interval between cursor polls for overlay hover detection.
    #[serde(default = "default_hover_poll")]
    pub hover_poll_ms: u64,
    #[serde(default = "default_snap_grid")]
    pub snap_grid: i32,
    #[serde(default = "default_snap_threshold")]
    pub snap_threshold: i32,
    /// Global hotkey toggling the currency overlay, e.g. "F8".
    #[serde(default)]
    pub currency_hotkey: Option<String>,
    #[serde(default)]
    pub quick_macro: MacroConfig,
}

fn default_roi_width() -> u32 {
    400
}

fn default_roi_height() -> u32 {
    180
}

fn default_threshold() -> f32 {
    0.9
}

fn default_scan_interval() -> u64 {
    50
}

fn default_templates_dir() -> String {
    "assets/templates".into()
}

fn default_library_path() -> String {
    "assets/library.json".into()
}

fn default_currency_path() -> String {
    "assets/currencies.json".into()
}

fn default_require_focus() -> bool {
    true
}

fn default_allowed_processes() -> Vec<String> {
    vec!["lostark.exe".into()]
}

fn default_hover_poll() -> u64 {
    60
}

fn default_snap_grid() -> i32 {
    16
}

fn default_snap_threshold() -> i32 {
    8
}

fn default_macro_sequence() -> String {
    "1,2,3,4".into()
}

fn default_macro_delay() -> u64 {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            roi: RoiConfig::default(),
            threshold: default_threshold(),
            scan_interval_ms: default_scan_interval(),
            templates_dir: default_templates_dir(),
            library_path: default_library_path(),
            currency_path: default_currency_path(),
            require_game_focus: default_require_focus(),
            allowed_processes: default_allowed_processes(),
            debug_logging: false,
            hover_poll_ms: default_hover_poll(),
            snap_grid: default_snap_grid(),
            snap_threshold: default_snap_threshold(),
            currency_hotkey: None,
            quick_macro: MacroConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let s = Settings::load("definitely_missing_settings.json").unwrap();
        assert_eq!(s.threshold, 0.9);
        assert_eq!(s.scan_interval_ms, 50);
        assert!(s.require_game_focus);
        assert_eq!(s.roi.width, 400);
        assert_eq!(s.roi.height, 180);
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{"threshold": 0.8, "roi": {"mode": "absolute"}}"#).unwrap();
        assert_eq!(s.threshold, 0.8);
        assert_eq!(s.roi.mode, RoiMode::Absolute);
        // untouched fields keep their defaults
        assert_eq!(s.roi.width, 400);
        assert_eq!(s.scan_interval_ms, 50);
    }

    #[test]
    fn roundtrip() {
        let mut s = Settings::default();
        s.allowed_processes = vec!["game.exe".into()];
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.allowed_processes, vec!["game.exe".to_string()]);
    }
}

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::{primary_screen_size, Capture, Region, ScreenGrabber};
use crate::currency::CurrencyBook;
use crate::emulation::KeySequenceRunner;
use crate::focus::{native_probe, FocusMonitor, FocusProbe};
use crate::hooks::{normalize_key_name, InputHooks, InputToken};
use crate::library::{JsonLibrary, Library};
use crate::matcher::{DirSource, LibrarySource, Matcher, MatchResult};
use crate::overlay::{
    cursor_pos, native_factory, pump_messages, CurrencyOverlay, MirrorFactory, OverlayManager,
    RoiHighlight, Snapper,
};
use crate::roi::compute_roi;
use crate::settings::{MacroConfig, RoiConfig, RoiMode, Settings};

/// Commands from the UI collaborators (editor dialogs, tray, hotkey shims).
/// Anything not applicable in the current state is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Exit,
    ScanOn,
    ScanOff,
    SetRoi(Region),
    LibraryUpdated,
    CopyUpdated,
    CopyAreaToggle,
    HighlightToggle,
    FocusPolicyChanged(bool),
    PositioningOn,
    PositioningOff { save: bool },
    CurrencyPositioningOn,
    CurrencyPositioningOff { save: bool },
    CurrencyUpdated,
    MacroConfigChanged(MacroConfig),
}

/// One-line status surface. Only acts on change, so callers can re-assert
/// the same message every tick without spamming.
#[derive(Debug, Default)]
pub struct StatusLine {
    message: Option<String>,
    set_count: u32,
    clear_count: u32,
}

impl StatusLine {
    pub fn set(&mut self, msg: &str) {
        if self.message.as_deref() != Some(msg) {
            tracing::info!("{msg}");
            self.message = Some(msg.to_string());
            self.set_count += 1;
        }
    }

    pub fn clear(&mut self) {
        if self.message.take().is_some() {
            self.clear_count += 1;
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_count(&self) -> u32 {
        self.set_count
    }

    pub fn clear_count(&self) -> u32 {
        self.clear_count
    }
}

/// Everything the controller talks to the outside world through. Tests swap
/// in stubs; `native()` wires the real backends.
pub struct Deps {
    pub scan_capture: Box<dyn Capture>,
    pub copy_capture: Box<dyn Capture>,
    pub currency_capture: Box<dyn Capture>,
    pub factory: MirrorFactory,
    pub probe: Box<dyn FocusProbe>,
    pub hooks: InputHooks,
}

impl Deps {
    pub fn native() -> Self {
        Self {
            scan_capture: Box::new(ScreenGrabber::new()),
            copy_capture: Box::new(ScreenGrabber::new()),
            currency_capture: Box::new(ScreenGrabber::new()),
            factory: native_factory(),
            probe: native_probe(),
            hooks: InputHooks::start(),
        }
    }
}

/// Single-threaded application driver. Everything happens on the tick; the
/// only blocking point is the UI event channel timeout.
pub struct Controller {
    settings: Settings,
    settings_path: String,
    roi: Region,
    capture: Box<dyn Capture>,
    template_matcher: Matcher<DirSource>,
    library_matcher: Matcher<LibrarySource>,
    overlay: OverlayManager,
    currency: CurrencyOverlay,
    highlight: RoiHighlight,
    focus: FocusMonitor,
    hooks: InputHooks,
    runner: KeySequenceRunner,
    status: StatusLine,
    currency_hotkey: Option<String>,
    // user intent, independent of what focus currently allows
    scanning: bool,
    copy_wanted: bool,
    was_allowed: bool,
    last_hover_poll: Instant,
    exit: bool,
}

impl Controller {
    pub fn new(settings: Settings, settings_path: &str, deps: Deps) -> Self {
        let (screen_w, screen_h) = primary_screen_size();
        let roi = compute_roi(&settings.roi, screen_w, screen_h);
        let snapper = Snapper::new(settings.snap_grid, settings.snap_threshold);

        let library: Arc<dyn Library> = Arc::new(JsonLibrary::new(&settings.library_path));
        let template_matcher = Matcher::new(
            DirSource::new(&settings.templates_dir),
            settings.threshold,
        );
        let library_matcher = Matcher::new(
            LibrarySource::new(library.clone()),
            settings.threshold,
        );
        let overlay =
            OverlayManager::new(library, deps.factory.clone(), deps.copy_capture, snapper);
        let currency = CurrencyOverlay::new(
            CurrencyBook::new(&settings.currency_path),
            deps.factory.clone(),
            deps.currency_capture,
            snapper,
        );
        let highlight = RoiHighlight::new(&deps.factory, roi);
        let focus = FocusMonitor::new(
            deps.probe,
            &settings.allowed_processes,
            settings.require_game_focus,
        );
        let currency_hotkey = settings
            .currency_hotkey
            .as_deref()
            .map(normalize_key_name);

        Self {
            settings,
            settings_path: settings_path.to_string(),
            roi,
            capture: deps.scan_capture,
            template_matcher,
            library_matcher,
            overlay,
            currency,
            highlight,
            focus,
            hooks: deps.hooks,
            runner: KeySequenceRunner::new(),
            status: StatusLine::default(),
            currency_hotkey,
            scanning: true,
            copy_wanted: true,
            was_allowed: true,
            last_hover_poll: Instant::now(),
            exit: false,
        }
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn roi(&self) -> Region {
        self.roi
    }

    pub fn should_exit(&self) -> bool {
        self.exit
    }

    /// Block on the event channel, ticking on every event or timeout, until
    /// an exit is requested or every sender is gone.
    pub fn run(&mut self, rx: Receiver<UiEvent>) {
        let interval = Duration::from_millis(self.settings.scan_interval_ms.max(10));
        tracing::info!(
            "scanning {:?} every {}ms, threshold {}",
            self.roi,
            interval.as_millis(),
            self.settings.threshold
        );
        loop {
            let event = match rx.recv_timeout(interval) {
                Ok(ev) => Some(ev),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.tick(event);
            if self.exit {
                break;
            }
        }
        self.shutdown();
    }

    /// One pass of the main loop. Public so tests can drive the controller
    /// without a channel.
    pub fn tick(&mut self, event: Option<UiEvent>) {
        pump_messages();
        for token in self.hooks.poll() {
            self.handle_token(token);
        }
        let focus = self.focus.current();
        if let Some(ev) = event {
            self.handle_event(ev);
        }
        if self.exit {
            return;
        }
        self.apply_focus_policy(focus.allowed, focus.process.as_deref());

        if self.was_allowed && self.scanning && !self.overlay.is_positioning() {
            self.scan_once();
            self.currency.tick();
        } else if !self.was_allowed {
            self.overlay.clear();
        }

        self.poll_hover();
    }

    fn scan_once(&mut self) {
        let frame = self.capture.grab(self.roi);
        let results: Vec<MatchResult> = match &frame {
            Some(f) => {
                let gray = image::imageops::grayscale(f);
                let mut r = self.template_matcher.find_matches(&gray);
                r.extend(self.library_matcher.find_matches(&gray));
                r
            }
            None => Vec::new(),
        };
        self.overlay.update(&results, frame.as_ref(), self.roi);
    }

    fn apply_focus_policy(&mut self, allowed: bool, process: Option<&str>) {
        if allowed == self.was_allowed {
            return;
        }
        if !allowed {
            tracing::debug!("foreground moved to {process:?}");
            self.status.set("paused: game window not focused");
            self.highlight.suppress(true);
            self.overlay.set_copy_enabled(false);
            self.currency.hide_all();
            self.runner.stop();
        } else {
            self.status.clear();
            self.highlight.suppress(false);
            self.overlay.set_copy_enabled(self.copy_wanted);
            if self.settings.quick_macro.enabled {
                self.runner.start(&self.settings.quick_macro);
            }
        }
        self.was_allowed = allowed;
    }

    fn handle_token(&mut self, token: InputToken) {
        match token {
            InputToken::Key(name) => {
                if Some(name.as_str()) == self.currency_hotkey.as_deref() {
                    self.currency.toggle();
                } else if name == "END" {
                    tracing::info!("quit hotkey pressed");
                    self.exit = true;
                }
            }
            // Window rescale is handled by the windows themselves.
            InputToken::WheelUp | InputToken::WheelDown => {}
        }
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Exit => self.exit = true,
            UiEvent::ScanOn => self.scanning = true,
            UiEvent::ScanOff => {
                self.scanning = false;
                self.overlay.clear();
            }
            UiEvent::SetRoi(rect) => {
                self.roi = rect;
                self.highlight.set_region(rect);
                self.settings.roi = RoiConfig {
                    mode: RoiMode::Absolute,
                    left: rect.left,
                    top: rect.top,
                    width: rect.width,
                    height: rect.height,
                };
                if let Err(e) = self.settings.save(&self.settings_path) {
                    tracing::warn!("failed to save settings: {e}");
                }
            }
            UiEvent::LibraryUpdated => {
                self.library_matcher.refresh();
                self.overlay.reload();
            }
            UiEvent::CopyUpdated => self.overlay.reload(),
            UiEvent::CopyAreaToggle => {
                self.copy_wanted = !self.copy_wanted;
                if self.was_allowed {
                    self.overlay.set_copy_enabled(self.copy_wanted);
                }
            }
            UiEvent::HighlightToggle => self.highlight.toggle(),
            UiEvent::FocusPolicyChanged(require) => {
                self.settings.require_game_focus = require;
                self.focus.set_require_focus(require);
            }
            UiEvent::PositioningOn => self.overlay.enable_positioning_mode(),
            UiEvent::PositioningOff { save } => {
                self.overlay.disable_positioning_mode(save);
                if save {
                    self.library_matcher.refresh();
                }
            }
            UiEvent::CurrencyPositioningOn => self.currency.enable_positioning_mode(),
            UiEvent::CurrencyPositioningOff { save } => {
                self.currency.disable_positioning_mode(save)
            }
            UiEvent::CurrencyUpdated => self.currency.reload(),
            UiEvent::MacroConfigChanged(cfg) => {
                self.runner.stop();
                self.settings.quick_macro = cfg;
                if self.settings.quick_macro.enabled && self.was_allowed {
                    self.runner.start(&self.settings.quick_macro);
                }
            }
        }
    }

    fn poll_hover(&mut self) {
        let poll_every = Duration::from_millis(self.settings.hover_poll_ms.max(1));
        if self.last_hover_poll.elapsed() < poll_every {
            return;
        }
        if let Some(cursor) = cursor_pos() {
            self.overlay.poll_hover(cursor);
            self.currency.poll_hover(cursor);
        }
        self.last_hover_poll = Instant::now();
    }

    /// Best-effort teardown; every step runs even if an earlier one failed.
    pub fn shutdown(&mut self) {
        self.runner.stop();
        self.overlay.close();
        self.currency.close();
        self.highlight.close();
        self.capture.close();
        pump_messages();
        tracing::info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_events_compare_by_payload() {
        let a = UiEvent::MacroConfigChanged(MacroConfig::default());
        let b = UiEvent::MacroConfigChanged(MacroConfig::default());
        assert_eq!(a, b);
        assert_ne!(a, UiEvent::Exit);
    }

    #[test]
    fn status_line_counts_transitions_only() {
        let mut s = StatusLine::default();
        s.set("paused");
        s.set("paused");
        assert_eq!(s.set_count(), 1);
        assert_eq!(s.message(), Some("paused"));
        s.clear();
        s.clear();
        assert_eq!(s.clear_count(), 1);
        assert_eq!(s.message(), None);
    }
}

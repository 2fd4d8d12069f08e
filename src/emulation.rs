use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::settings::MacroConfig;

/// How long `stop` waits for the worker to notice the flag before detaching.
const STOP_WAIT: Duration = Duration::from_millis(500);

/// Background worker that replays a configured key sequence until stopped.
pub struct KeySequenceRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeySequenceRunner {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn start(&mut self, cfg: &MacroConfig) {
        if self.is_running() {
            return;
        }
        let keys: Vec<String> = cfg
            .sequence
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            tracing::warn!("empty macro sequence, not starting");
            return;
        }
        let delay = Duration::from_millis(cfg.delay_ms.max(1));
        // Fresh flag per start; a worker detached by a timed-out stop keeps
        // the old one, which stays down forever.
        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);
        tracing::info!("macro started: {:?}", keys);
        self.handle = Some(std::thread::spawn(move || {
            'outer: loop {
                for key in &keys {
                    if !running.load(Ordering::SeqCst) {
                        break 'outer;
                    }
                    send_key(key);
                    std::thread::sleep(delay);
                }
            }
        }));
    }

    /// Signal the worker and wait a bounded time for it to finish; a worker
    /// stuck mid-sleep is detached rather than blocking the caller.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + STOP_WAIT;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
            tracing::info!("macro stopped");
        } else {
            tracing::warn!("macro worker still busy, detaching");
        }
    }
}

impl Default for KeySequenceRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeySequenceRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "windows")]
fn send_key(name: &str) {
    use rdev::{simulate, EventType};

    let Some(key) = parse_key(name) else {
        tracing::warn!("unknown key in macro sequence: {name}");
        return;
    };
    for event in [EventType::KeyPress(key), EventType::KeyRelease(key)] {
        if let Err(e) = simulate(&event) {
            tracing::debug!("simulate failed for {name}: {e:?}");
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(not(target_os = "windows"))]
fn send_key(name: &str) {
    tracing::trace!("key emulation unavailable, dropping {name}");
}

#[cfg(target_os = "windows")]
fn parse_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key;

    let upper = name.trim().to_ascii_uppercase();
    match upper.as_str() {
        "SPACE" => Some(Key::Space),
        "TAB" => Some(Key::Tab),
        "ENTER" | "RETURN" => Some(Key::Return),
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "F1" => Some(Key::F1),
        "F2" => Some(Key::F2),
        "F3" => Some(Key::F3),
        "F4" => Some(Key::F4),
        "F5" => Some(Key::F5),
        "F6" => Some(Key::F6),
        "F7" => Some(Key::F7),
        "F8" => Some(Key::F8),
        "F9" => Some(Key::F9),
        "F10" => Some(Key::F10),
        "F11" => Some(Key::F11),
        "F12" => Some(Key::F12),
        _ if upper.len() == 1 => {
            let c = upper.chars().next()?;
            match c {
                '0' => Some(Key::Num0),
                '1' => Some(Key::Num1),
                '2' => Some(Key::Num2),
                '3' => Some(Key::Num3),
                '4' => Some(Key::Num4),
                '5' => Some(Key::Num5),
                '6' => Some(Key::Num6),
                '7' => Some(Key::Num7),
                '8' => Some(Key::Num8),
                '9' => Some(Key::Num9),
                'A' => Some(Key::KeyA),
                'B' => Some(Key::KeyB),
                'C' => Some(Key::KeyC),
                'D' => Some(Key::KeyD),
                'E' => Some(Key::KeyE),
                'F' => Some(Key::KeyF),
                'G' => Some(Key::KeyG),
                'H' => Some(Key::KeyH),
                'I' => Some(Key::KeyI),
                'J' => Some(Key::KeyJ),
                'K' => Some(Key::KeyK),
                'L' => Some(Key::KeyL),
                'M' => Some(Key::KeyM),
                'N' => Some(Key::KeyN),
                'O' => Some(Key::KeyO),
                'P' => Some(Key::KeyP),
                'Q' => Some(Key::KeyQ),
                'R' => Some(Key::KeyR),
                'S' => Some(Key::KeyS),
                'T' => Some(Key::KeyT),
                'U' => Some(Key::KeyU),
                'V' => Some(Key::KeyV),
                'W' => Some(Key::KeyW),
                'X' => Some(Key::KeyX),
                'Y' => Some(Key::KeyY),
                'Z' => Some(Key::KeyZ),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop_are_bounded() {
        let mut runner = KeySequenceRunner::new();
        let cfg = MacroConfig {
            enabled: true,
            sequence: "1,2".into(),
            delay_ms: 5,
        };
        runner.start(&cfg);
        assert!(runner.is_running());
        // starting again while running is a no-op
        runner.start(&cfg);
        let begun = Instant::now();
        runner.stop();
        assert!(begun.elapsed() < Duration::from_secs(1));
        assert!(!runner.is_running());
    }

    #[test]
    fn restart_after_timed_out_stop_abandons_the_old_worker() {
        let mut runner = KeySequenceRunner::new();
        let cfg = MacroConfig {
            enabled: true,
            sequence: "1".into(),
            delay_ms: 2_000,
        };
        runner.start(&cfg);
        let first = runner.flag();
        // The worker sleeps longer than the bounded wait, so it is detached.
        runner.stop();
        assert!(!first.load(Ordering::SeqCst));

        runner.start(&cfg);
        assert!(runner.is_running());
        assert!(
            !first.load(Ordering::SeqCst),
            "detached worker's flag must stay down"
        );
        runner.stop();
    }

    #[test]
    fn empty_sequence_never_starts() {
        let mut runner = KeySequenceRunner::new();
        let cfg = MacroConfig {
            enabled: true,
            sequence: " , ,".into(),
            delay_ms: 5,
        };
        runner.start(&cfg);
        assert!(!runner.is_running());
        runner.stop();
    }
}

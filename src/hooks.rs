use std::sync::mpsc::{Receiver, Sender, TryRecvError};

/// Discrete token produced by the global input listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputToken {
    /// Canonical key name, e.g. "F8", "NUM1", "KEYA".
    Key(String),
    WheelUp,
    WheelDown,
}

/// Canonical form for a configured key name so settings like "f8" or "1"
/// compare against listener tokens.
pub fn normalize_key_name(s: &str) -> String {
    let upper = s.trim().to_ascii_uppercase();
    if upper.len() == 1 {
        let c = upper.as_bytes()[0] as char;
        if c.is_ascii_digit() {
            return format!("NUM{c}");
        }
        if c.is_ascii_alphabetic() {
            return format!("KEY{c}");
        }
    }
    upper
}

/// Global key and wheel listener. Events arrive on a background hook thread
/// and are drained non-blocking once per tick.
pub struct InputHooks {
    rx: Receiver<InputToken>,
}

impl InputHooks {
    pub fn start() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        spawn_listener(tx);
        Self { rx }
    }

    /// Build from an explicit channel; lets tests inject tokens.
    pub fn from_receiver(rx: Receiver<InputToken>) -> Self {
        Self { rx }
    }

    /// Drain every pending token without blocking.
    pub fn poll(&self) -> Vec<InputToken> {
        let mut tokens = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(t) => tokens.push(t),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        tokens
    }
}

#[cfg(target_os = "windows")]
fn spawn_listener(tx: Sender<InputToken>) {
    use rdev::EventType;
    use std::collections::HashSet;

    std::thread::spawn(move || loop {
        let tx = tx.clone();
        // Key repeat arrives as repeated KeyPress; only the first one counts
        // until the key is released.
        let mut down: HashSet<String> = HashSet::new();
        let result = rdev::listen(move |event| match event.event_type {
            EventType::KeyPress(k) => {
                let name = format!("{k:?}").to_ascii_uppercase();
                if down.insert(name.clone()) {
                    let _ = tx.send(InputToken::Key(name));
                }
            }
            EventType::KeyRelease(k) => {
                down.remove(&format!("{k:?}").to_ascii_uppercase());
            }
            EventType::Wheel { delta_y, .. } => {
                if delta_y > 0 {
                    let _ = tx.send(InputToken::WheelUp);
                } else if delta_y < 0 {
                    let _ = tx.send(InputToken::WheelDown);
                }
            }
            _ => {}
        });
        match result {
            Ok(()) => break,
            Err(e) => {
                tracing::error!("input listener failed: {e:?}, retrying");
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    });
}

#[cfg(not(target_os = "windows"))]
fn spawn_listener(_tx: Sender<InputToken>) {
    tracing::debug!("no global input hook on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_digits_letters_and_function_keys() {
        assert_eq!(normalize_key_name("1"), "NUM1");
        assert_eq!(normalize_key_name("a"), "KEYA");
        assert_eq!(normalize_key_name("f8"), "F8");
        assert_eq!(normalize_key_name(" End "), "END");
    }

    #[test]
    fn poll_drains_injected_tokens() {
        let (tx, rx) = std::sync::mpsc::channel();
        let hooks = InputHooks::from_receiver(rx);
        tx.send(InputToken::Key("F8".into())).unwrap();
        tx.send(InputToken::WheelUp).unwrap();
        assert_eq!(
            hooks.poll(),
            vec![InputToken::Key("F8".into()), InputToken::WheelUp]
        );
        assert!(hooks.poll().is_empty());
    }
}

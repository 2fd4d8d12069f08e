/// Foreground process snapshot for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusState {
    /// Executable file name of the foreground process, when resolvable.
    pub process: Option<String>,
    pub allowed: bool,
}

/// Resolves the executable name owning the foreground window.
pub trait FocusProbe {
    fn foreground_process(&self) -> Option<String>;
}

/// Compares the foreground process against the configured allow-list.
/// An unresolvable foreground counts as not-allowed.
pub struct FocusMonitor {
    probe: Box<dyn FocusProbe>,
    allowed: Vec<String>,
    require_focus: bool,
}

impl FocusMonitor {
    pub fn new(probe: Box<dyn FocusProbe>, allowed: &[String], require_focus: bool) -> Self {
        Self {
            probe,
            allowed: allowed.iter().map(|s| s.to_ascii_lowercase()).collect(),
            require_focus,
        }
    }

    pub fn set_require_focus(&mut self, on: bool) {
        self.require_focus = on;
    }

    pub fn current(&self) -> FocusState {
        let process = self.probe.foreground_process();
        let allowed = if !self.require_focus {
            true
        } else {
            process
                .as_deref()
                .map(|name| {
                    let name = name.to_ascii_lowercase();
                    self.allowed.iter().any(|a| a == &name)
                })
                .unwrap_or(false)
        };
        FocusState { process, allowed }
    }
}

/// Probe used where no native foreground query exists; reports nothing,
/// which the monitor treats as not-allowed.
pub struct NullProbe;

impl FocusProbe for NullProbe {
    fn foreground_process(&self) -> Option<String> {
        None
    }
}

pub fn native_probe() -> Box<dyn FocusProbe> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(win32::Win32FocusProbe);
    }
    #[cfg(not(target_os = "windows"))]
    Box::new(NullProbe)
}

#[cfg(target_os = "windows")]
mod win32 {
    use super::FocusProbe;
    use windows::core::PWSTR;
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{
        OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
        PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetForegroundWindow, GetWindowThreadProcessId,
    };

    pub struct Win32FocusProbe;

    impl FocusProbe for Win32FocusProbe {
        fn foreground_process(&self) -> Option<String> {
            unsafe {
                let hwnd = GetForegroundWindow();
                if hwnd.0.is_null() {
                    return None;
                }
                let mut pid = 0u32;
                GetWindowThreadProcessId(hwnd, Some(&mut pid));
                if pid == 0 {
                    return None;
                }
                let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
                let mut buf = [0u16; 1024];
                let mut len = buf.len() as u32;
                let queried = QueryFullProcessImageNameW(
                    handle,
                    PROCESS_NAME_WIN32,
                    PWSTR(buf.as_mut_ptr()),
                    &mut len,
                );
                let _ = CloseHandle(handle);
                queried.ok()?;
                let full = String::from_utf16_lossy(&buf[..len as usize]);
                full.rsplit(['\\', '/']).next().map(str::to_string)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(Option<&'static str>);

    impl FocusProbe for FixedProbe {
        fn foreground_process(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn allow_list() -> Vec<String> {
        vec!["lostark.exe".to_string()]
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let m = FocusMonitor::new(Box::new(FixedProbe(Some("LostArk.exe"))), &allow_list(), true);
        assert!(m.current().allowed);
    }

    #[test]
    fn unknown_process_is_not_allowed() {
        let m = FocusMonitor::new(Box::new(FixedProbe(Some("notepad.exe"))), &allow_list(), true);
        assert!(!m.current().allowed);
    }

    #[test]
    fn unresolvable_foreground_is_not_allowed() {
        let m = FocusMonitor::new(Box::new(FixedProbe(None)), &allow_list(), true);
        assert!(!m.current().allowed);
    }

    #[test]
    fn focus_requirement_can_be_waived() {
        let m = FocusMonitor::new(Box::new(FixedProbe(None)), &allow_list(), false);
        assert!(m.current().allowed);
    }
}

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;

use crate::capture::Region;

/// Callback applied to every drag delta while positioning; returns the
/// snapped `(left, top)` for a proposed window rectangle.
pub type SnapFn = Box<dyn Fn(i32, i32, i32, i32) -> (i32, i32)>;

/// Reads a window's live rectangle; used as sibling input for snapping so
/// dragging one window tracks the others as they move.
pub type RectProbe = Box<dyn Fn() -> Option<Region>>;

/// One overlay window mirroring a patch of the screen.
///
/// Windows are click-through while idle; positioning mode makes them
/// interactive (drag to move, wheel to rescale). Hovering an idle window
/// drops its alpha to zero so the pixels underneath stay readable.
pub trait MirrorHandle {
    fn show(&mut self, rect: Region, opacity: f32, topmost: bool);
    fn update_image(&mut self, img: &RgbaImage);
    fn hide(&mut self);
    fn is_visible(&self) -> bool;
    fn geometry(&self) -> Region;
    fn enable_positioning(&mut self, base: RgbaImage, rect: Region, snap: SnapFn);
    fn disable_positioning(&mut self);
    fn is_positioning(&self) -> bool;
    fn raise(&mut self);
    fn poll_hover(&mut self, cursor: (i32, i32));
    fn is_hovered(&self) -> bool;
    fn rect_probe(&self) -> RectProbe;
    fn close(&mut self);
}

/// Creates native windows where the platform supports them, in-memory
/// stand-ins everywhere else. Shared between the overlay subsystems.
pub type MirrorFactory = Arc<dyn Fn() -> Box<dyn MirrorHandle>>;

pub fn native_factory() -> MirrorFactory {
    Arc::new(|| {
        #[cfg(target_os = "windows")]
        {
            if let Some(w) = win32::Win32Mirror::create() {
                return Box::new(w) as Box<dyn MirrorHandle>;
            }
            tracing::warn!("falling back to headless mirror window");
        }
        Box::new(HeadlessMirror::new()) as Box<dyn MirrorHandle>
    })
}

/// Drain the thread's pending window messages. Must run once per tick so the
/// native windows repaint and receive drag input.
pub fn pump_messages() {
    #[cfg(target_os = "windows")]
    win32::pump_messages();
}

pub fn cursor_pos() -> Option<(i32, i32)> {
    #[cfg(target_os = "windows")]
    {
        return win32::cursor_pos();
    }
    #[cfg(not(target_os = "windows"))]
    None
}

#[derive(Debug, Default)]
pub struct HeadlessState {
    pub rect: Region,
    pub visible: bool,
    pub hovered: bool,
    pub positioning: bool,
    pub opacity: f32,
    pub topmost: bool,
    pub raises: u32,
    /// Shows that changed the window's place in the z-order. Repeat shows of
    /// an already-visible window keep their stacking.
    pub restacks: u32,
    pub image_size: Option<(u32, u32)>,
}

/// In-memory mirror window used by tests and non-Windows builds.
pub struct HeadlessMirror {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessMirror {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessState::default())),
        }
    }

    pub fn raise_count(&self) -> u32 {
        self.state.borrow().raises
    }

    pub fn opacity(&self) -> f32 {
        self.state.borrow().opacity
    }

    pub fn topmost(&self) -> bool {
        self.state.borrow().topmost
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.state.borrow().image_size
    }

    /// Shared view of this window's state, for tests that hand the handle to
    /// a manager but still want to observe it.
    pub fn state_handle(&self) -> Rc<RefCell<HeadlessState>> {
        Rc::clone(&self.state)
    }
}

impl Default for HeadlessMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorHandle for HeadlessMirror {
    fn show(&mut self, rect: Region, opacity: f32, topmost: bool) {
        let mut s = self.state.borrow_mut();
        if !s.visible || s.topmost != topmost {
            s.restacks += 1;
        }
        s.rect = rect;
        s.opacity = opacity;
        s.topmost = topmost;
        s.visible = true;
    }

    fn update_image(&mut self, img: &RgbaImage) {
        self.state.borrow_mut().image_size = Some(img.dimensions());
    }

    fn hide(&mut self) {
        let mut s = self.state.borrow_mut();
        s.visible = false;
        s.hovered = false;
    }

    fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    fn geometry(&self) -> Region {
        self.state.borrow().rect
    }

    fn enable_positioning(&mut self, base: RgbaImage, rect: Region, _snap: SnapFn) {
        let mut s = self.state.borrow_mut();
        s.rect = rect;
        s.visible = true;
        s.positioning = true;
        s.image_size = Some(base.dimensions());
    }

    fn disable_positioning(&mut self) {
        self.state.borrow_mut().positioning = false;
    }

    fn is_positioning(&self) -> bool {
        self.state.borrow().positioning
    }

    fn raise(&mut self) {
        self.state.borrow_mut().raises += 1;
    }

    fn poll_hover(&mut self, cursor: (i32, i32)) {
        let mut s = self.state.borrow_mut();
        s.hovered =
            s.visible && !s.positioning && s.rect.contains(cursor.0, cursor.1);
    }

    fn is_hovered(&self) -> bool {
        self.state.borrow().hovered
    }

    fn rect_probe(&self) -> RectProbe {
        let state = Rc::clone(&self.state);
        Box::new(move || {
            let s = state.borrow();
            if s.visible {
                Some(s.rect)
            } else {
                None
            }
        })
    }

    fn close(&mut self) {
        let mut s = self.state.borrow_mut();
        s.visible = false;
        s.positioning = false;
    }
}

#[cfg(target_os = "windows")]
mod win32 {
    use super::{MirrorHandle, RectProbe, SnapFn};
    use crate::capture::Region;
    use image::RgbaImage;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Once;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{COLORREF, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
    use windows::Win32::Graphics::Gdi::{
        BeginPaint, EndPaint, InvalidateRect, StretchDIBits, BITMAPINFO, BITMAPINFOHEADER,
        BI_RGB, DIB_RGB_COLORS, PAINTSTRUCT, SRCCOPY,
    };
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetCursorPos,
        GetWindowLongPtrW, GetWindowRect, PeekMessageW, RegisterClassW, ReleaseCapture,
        SetCapture, SetLayeredWindowAttributes, SetWindowLongPtrW, SetWindowPos, ShowWindow,
        TranslateMessage, GWLP_USERDATA, GWL_EXSTYLE, HWND_NOTOPMOST, HWND_TOPMOST,
        LWA_ALPHA, MSG, PM_REMOVE, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER,
        SWP_SHOWWINDOW, SW_HIDE, WM_ERASEBKGND, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MOUSEMOVE,
        WM_MOUSEWHEEL, WM_PAINT, WNDCLASSW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
        WS_EX_TRANSPARENT, WS_POPUP,
    };

    const MIN_SCALE: f32 = 0.25;
    const MAX_SCALE: f32 = 4.0;

    struct MirrorState {
        // current frame, top-down BGRA
        bgra: Vec<u8>,
        img_w: i32,
        img_h: i32,
        opacity: u8,
        hovered: bool,
        positioning: bool,
        scale: f32,
        base: Option<RgbaImage>,
        snap: Option<SnapFn>,
        // cursor offset inside the window while dragging
        drag: Option<(i32, i32)>,
    }

    impl MirrorState {
        fn new() -> Self {
            Self {
                bgra: Vec::new(),
                img_w: 0,
                img_h: 0,
                opacity: 255,
                hovered: false,
                positioning: false,
                scale: 1.0,
                base: None,
                snap: None,
                drag: None,
            }
        }
    }

    fn widestring(value: &str) -> Vec<u16> {
        use std::os::windows::ffi::OsStrExt;
        std::ffi::OsStr::new(value)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    fn bgra_from(img: &RgbaImage) -> Vec<u8> {
        let mut out = Vec::with_capacity(img.as_raw().len());
        for px in img.as_raw().chunks_exact(4) {
            out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
        out
    }

    pub fn cursor_pos() -> Option<(i32, i32)> {
        let mut point = POINT::default();
        unsafe {
            if GetCursorPos(&mut point).is_ok() {
                Some((point.x, point.y))
            } else {
                None
            }
        }
    }

    pub fn pump_messages() {
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn window_rect(hwnd: HWND) -> Option<Region> {
        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd, &mut rect).ok()? };
        Some(Region::new(
            rect.left,
            rect.top,
            (rect.right - rect.left).max(0) as u32,
            (rect.bottom - rect.top).max(0) as u32,
        ))
    }

    fn state_from_hwnd<'a>(hwnd: HWND) -> Option<&'a RefCell<MirrorState>> {
        let ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) };
        if ptr == 0 {
            None
        } else {
            Some(unsafe { &*(ptr as *const RefCell<MirrorState>) })
        }
    }

    unsafe extern "system" fn mirror_wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        let Some(state) = state_from_hwnd(hwnd) else {
            return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
        };
        match msg {
            WM_ERASEBKGND => LRESULT(1),
            WM_PAINT => {
                let mut ps = PAINTSTRUCT::default();
                let hdc = unsafe { BeginPaint(hwnd, &mut ps) };
                if !hdc.0.is_null() {
                    let s = state.borrow();
                    if !s.bgra.is_empty() {
                        let bmi = BITMAPINFO {
                            bmiHeader: BITMAPINFOHEADER {
                                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                                biWidth: s.img_w,
                                biHeight: -s.img_h,
                                biPlanes: 1,
                                biBitCount: 32,
                                biCompression: BI_RGB.0,
                                ..Default::default()
                            },
                            ..Default::default()
                        };
                        let width = ps.rcPaint.right - ps.rcPaint.left;
                        let height = ps.rcPaint.bottom - ps.rcPaint.top;
                        unsafe {
                            StretchDIBits(
                                hdc,
                                0,
                                0,
                                width,
                                height,
                                0,
                                0,
                                s.img_w,
                                s.img_h,
                                Some(s.bgra.as_ptr() as *const _),
                                &bmi,
                                DIB_RGB_COLORS,
                                SRCCOPY,
                            );
                        }
                    }
                }
                unsafe {
                    let _ = EndPaint(hwnd, &ps);
                }
                LRESULT(0)
            }
            WM_LBUTTONDOWN => {
                let positioning = state.borrow().positioning;
                if positioning {
                    let local_x = (lparam.0 & 0xffff) as i16 as i32;
                    let local_y = ((lparam.0 >> 16) & 0xffff) as i16 as i32;
                    state.borrow_mut().drag = Some((local_x, local_y));
                    unsafe {
                        let _ = SetCapture(hwnd);
                    }
                }
                LRESULT(0)
            }
            WM_MOUSEMOVE => {
                let drag = state.borrow().drag;
                if let Some((dx, dy)) = drag {
                    if let (Some(cursor), Some(rect)) = (cursor_pos(), window_rect(hwnd)) {
                        let mut left = cursor.0 - dx;
                        let mut top = cursor.1 - dy;
                        let w = rect.width as i32;
                        let h = rect.height as i32;
                        {
                            let s = state.borrow();
                            if let Some(snap) = &s.snap {
                                (left, top) = snap(left, top, w, h);
                            }
                        }
                        unsafe {
                            let _ = SetWindowPos(
                                hwnd,
                                HWND::default(),
                                left,
                                top,
                                0,
                                0,
                                SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
                            );
                        }
                    }
                }
                LRESULT(0)
            }
            WM_LBUTTONUP => {
                if state.borrow_mut().drag.take().is_some() {
                    unsafe {
                        let _ = ReleaseCapture();
                    }
                }
                LRESULT(0)
            }
            WM_MOUSEWHEEL => {
                let positioning = state.borrow().positioning;
                if positioning {
                    let delta = ((wparam.0 >> 16) & 0xffff) as u16 as i16;
                    let factor = if delta > 0 { 1.1 } else { 1.0 / 1.1 };
                    let resized = {
                        let mut s = state.borrow_mut();
                        s.scale = (s.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
                        s.base.as_ref().map(|base| {
                            let w = ((base.width() as f32 * s.scale) as u32).max(8);
                            let h = ((base.height() as f32 * s.scale) as u32).max(8);
                            let img = image::imageops::resize(
                                base,
                                w,
                                h,
                                image::imageops::FilterType::Triangle,
                            );
                            s.bgra = bgra_from(&img);
                            s.img_w = w as i32;
                            s.img_h = h as i32;
                            (w, h)
                        })
                    };
                    if let Some((w, h)) = resized {
                        unsafe {
                            let _ = SetWindowPos(
                                hwnd,
                                HWND::default(),
                                0,
                                0,
                                w as i32,
                                h as i32,
                                SWP_NOMOVE | SWP_NOZORDER | SWP_NOACTIVATE,
                            );
                            let _ = InvalidateRect(hwnd, None, false);
                        }
                    }
                }
                LRESULT(0)
            }
            _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        }
    }

    /// Borderless layered popup mirroring one icon or capture region.
    pub struct Win32Mirror {
        hwnd: isize,
        state: Rc<RefCell<MirrorState>>,
        visible: bool,
        topmost: bool,
    }

    impl Win32Mirror {
        pub fn create() -> Option<Self> {
            static REGISTER_CLASS: Once = Once::new();
            let class_name = widestring("BuffMirrorWindow");
            let hinstance = unsafe { GetModuleHandleW(PCWSTR::null()) }.ok()?;

            REGISTER_CLASS.call_once(|| unsafe {
                let wc = WNDCLASSW {
                    hInstance: hinstance.into(),
                    lpszClassName: PCWSTR(class_name.as_ptr()),
                    lpfnWndProc: Some(mirror_wndproc),
                    ..Default::default()
                };
                let _ = RegisterClassW(&wc);
            });

            let hwnd = unsafe {
                CreateWindowExW(
                    WS_EX_LAYERED | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE | WS_EX_TRANSPARENT,
                    PCWSTR(class_name.as_ptr()),
                    PCWSTR::null(),
                    WS_POPUP,
                    0,
                    0,
                    64,
                    64,
                    None,
                    None,
                    hinstance,
                    None,
                )
                .ok()?
            };

            let state = Rc::new(RefCell::new(MirrorState::new()));
            unsafe {
                SetWindowLongPtrW(
                    hwnd,
                    GWLP_USERDATA,
                    Rc::into_raw(Rc::clone(&state)) as isize,
                );
                if SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA).is_err() {
                    let _ = DestroyWindow(hwnd);
                    return None;
                }
            }

            Some(Self {
                hwnd: hwnd.0 as isize,
                state,
                visible: false,
                topmost: true,
            })
        }

        fn hwnd(&self) -> HWND {
            HWND(self.hwnd as *mut _)
        }

        fn set_alpha(&self, alpha: u8) {
            unsafe {
                if let Err(e) =
                    SetLayeredWindowAttributes(self.hwnd(), COLORREF(0), alpha, LWA_ALPHA)
                {
                    tracing::debug!("SetLayeredWindowAttributes failed: {e}");
                }
            }
        }

        fn set_click_through(&self, on: bool) {
            unsafe {
                let style = GetWindowLongPtrW(self.hwnd(), GWL_EXSTYLE);
                let transparent = WS_EX_TRANSPARENT.0 as isize;
                let new_style = if on {
                    style | transparent
                } else {
                    style & !transparent
                };
                if new_style != style {
                    SetWindowLongPtrW(self.hwnd(), GWL_EXSTYLE, new_style);
                }
            }
        }
    }

    impl MirrorHandle for Win32Mirror {
        fn show(&mut self, rect: Region, opacity: f32, topmost: bool) {
            let alpha = (opacity.clamp(0.0, 1.0) * 255.0) as u8;
            {
                let mut s = self.state.borrow_mut();
                s.opacity = alpha;
                if !s.hovered {
                    drop(s);
                    self.set_alpha(alpha);
                }
            }
            // Z-order changes for an already-visible window go through
            // raise(); a repeat show keeps its stacking.
            let flags = if self.visible && self.topmost == topmost {
                SWP_SHOWWINDOW | SWP_NOACTIVATE | SWP_NOZORDER
            } else {
                SWP_SHOWWINDOW | SWP_NOACTIVATE
            };
            let insert_after = if topmost { HWND_TOPMOST } else { HWND_NOTOPMOST };
            self.topmost = topmost;
            unsafe {
                let _ = SetWindowPos(
                    self.hwnd(),
                    insert_after,
                    rect.left,
                    rect.top,
                    rect.width as i32,
                    rect.height as i32,
                    flags,
                );
            }
            self.visible = true;
        }

        fn update_image(&mut self, img: &RgbaImage) {
            {
                let mut s = self.state.borrow_mut();
                s.bgra = bgra_from(img);
                s.img_w = img.width() as i32;
                s.img_h = img.height() as i32;
            }
            unsafe {
                let _ = InvalidateRect(self.hwnd(), None, false);
            }
        }

        fn hide(&mut self) {
            unsafe {
                let _ = ShowWindow(self.hwnd(), SW_HIDE);
            }
            self.visible = false;
            self.state.borrow_mut().hovered = false;
        }

        fn is_visible(&self) -> bool {
            self.visible
        }

        fn geometry(&self) -> Region {
            window_rect(self.hwnd()).unwrap_or_else(|| Region::new(0, 0, 0, 0))
        }

        fn enable_positioning(&mut self, base: RgbaImage, rect: Region, snap: SnapFn) {
            {
                let mut s = self.state.borrow_mut();
                s.positioning = true;
                s.scale = 1.0;
                s.snap = Some(snap);
                s.bgra = bgra_from(&base);
                s.img_w = base.width() as i32;
                s.img_h = base.height() as i32;
                s.base = Some(base);
                s.hovered = false;
            }
            self.set_click_through(false);
            self.show(rect, 1.0, true);
            unsafe {
                let _ = InvalidateRect(self.hwnd(), None, false);
            }
        }

        fn disable_positioning(&mut self) {
            {
                let mut s = self.state.borrow_mut();
                s.positioning = false;
                s.snap = None;
                s.base = None;
                s.drag = None;
            }
            self.set_click_through(true);
        }

        fn is_positioning(&self) -> bool {
            self.state.borrow().positioning
        }

        fn raise(&mut self) {
            unsafe {
                let _ = SetWindowPos(
                    self.hwnd(),
                    HWND_TOPMOST,
                    0,
                    0,
                    0,
                    0,
                    SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
                );
            }
        }

        fn poll_hover(&mut self, cursor: (i32, i32)) {
            let (hovered, positioning) = {
                let s = self.state.borrow();
                (s.hovered, s.positioning)
            };
            if !self.visible || positioning {
                if hovered {
                    self.state.borrow_mut().hovered = false;
                }
                return;
            }
            let inside = self
                .geometry()
                .contains(cursor.0, cursor.1);
            if inside && !hovered {
                self.state.borrow_mut().hovered = true;
                self.set_alpha(0);
            } else if !inside && hovered {
                self.state.borrow_mut().hovered = false;
                let alpha = self.state.borrow().opacity;
                self.set_alpha(alpha);
            }
        }

        fn is_hovered(&self) -> bool {
            self.state.borrow().hovered
        }

        fn rect_probe(&self) -> RectProbe {
            let hwnd = self.hwnd;
            Box::new(move || window_rect(HWND(hwnd as *mut _)))
        }

        fn close(&mut self) {
            let hwnd = self.hwnd();
            if hwnd.0.is_null() {
                return;
            }
            unsafe {
                let ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA);
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
                if ptr != 0 {
                    drop(Rc::from_raw(ptr as *const RefCell<MirrorState>));
                }
                let _ = DestroyWindow(hwnd);
            }
            self.hwnd = 0;
            self.visible = false;
        }
    }

    impl Drop for Win32Mirror {
        fn drop(&mut self) {
            self.close();
        }
    }
}

//! Mirror windows and the logic that decides what they show.

pub mod currency_overlay;
pub mod highlight;
pub mod manager;
pub mod snap;
pub mod window;

pub use currency_overlay::CurrencyOverlay;
pub use highlight::RoiHighlight;
pub use manager::OverlayManager;
pub use snap::Snapper;
pub use window::{
    cursor_pos, native_factory, pump_messages, HeadlessMirror, MirrorFactory, MirrorHandle,
};

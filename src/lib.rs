//! Screen-icon mirror for games that park status icons in a far corner.
//!
//! A tick loop captures a small region of interest, runs normalized
//! cross-correlation against a set of icon templates, and mirrors every
//! detected icon into a click-through overlay window near the crosshair.
//! Scanning and rendering pause automatically while the game window is not
//! in the foreground.

pub mod capture;
pub mod controller;
pub mod currency;
pub mod emulation;
pub mod focus;
pub mod hooks;
pub mod library;
pub mod logging;
pub mod matcher;
pub mod overlay;
pub mod roi;
pub mod settings;
pub mod template;

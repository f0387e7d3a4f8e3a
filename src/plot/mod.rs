//! Overlay rendering.

pub mod ascii;

pub use ascii::{render_overlay, AsciiRenderer};

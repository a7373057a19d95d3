// src/render/mod.rs
//
// Overlay rendering onto RgbImage frames. Pure: no I/O, no session state.

pub mod annotator;
pub mod canvas;
pub mod skeleton;

pub use annotator::{truncate_text, FrameAnnotator, PanelLayout};
pub use canvas::{Canvas, Rect};
pub use skeleton::{draw_skeleton, SKELETON_SEGMENTS};

//! Terminal UI module using ratatui.
//!
//! - `render`: Session panel, status bar and overlays
//! - `input`: Key handling and activity classification
//! - `styles`: Color scheme

pub mod input;
pub mod render;
pub mod styles;

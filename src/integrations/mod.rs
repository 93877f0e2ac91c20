//! Glue for third-party services and plugins.
//!
//! Each integration turns plain data (an ID from the settings, a snippet
//! printed by another plugin) into HTML and hands anything heavy to the
//! deferred engine.

pub mod analytics;
pub mod emoji;
pub mod loader;
pub mod maps;
pub mod passive;
pub mod widgets;

pub use analytics::Analytics;
pub use loader::Loader;
pub use widgets::{LayerSlider, YandexRtb};

#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod cache;
pub mod client;
mod core;
pub mod deferred;
mod error;
pub mod fonts;
pub mod graph;
pub mod integrations;
pub mod minify;
pub mod preload;
pub mod reducer;
pub mod registry;
pub mod render;
pub mod script;
pub mod settings;
mod utils;

pub use crate::cache::{ScriptCache, Service};
pub use crate::core::{Delay, Environment, Fetch, Trigger};
pub use crate::deferred::{Deferred, DelayedQueue};
pub use crate::error::*;
pub use crate::graph::{DependencyGraph, Sweep};
pub use crate::minify::Minifier;
pub use crate::reducer::{Reducer, Seeds};
pub use crate::registry::{Asset, Dependencies, Registry};
pub use crate::render::{Optimizer, PageRender};
pub use crate::script::ScriptInit;
pub use crate::settings::{MemoryStore, OptionStore, Settings, TrackingPosition};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;

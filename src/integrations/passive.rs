//! Passive scroll and touch listeners.
//!
//! A tiny script patches `addEventListener` so `touchstart`, `scroll` and
//! `wheel` listeners default to `passive: true`. It is enqueued in the
//! header and loaded async.

use std::fs;
use std::io;

use crate::core::Environment;
use crate::registry::Asset;

pub const HANDLE: &str = "pagespeed-optimization-passive-events";

/// Where the script lives relative to the plugin directory.
pub const FILE: &str = "assets/js/passive-events.js";

pub const SCRIPT: &str = include_str!("../../assets/js/passive-events.js");

pub fn asset(env: &Environment) -> Asset {
    Asset::new(HANDLE, env.url(FILE))
}

/// Write the script into the plugin directory, unless an identical copy is
/// already there.
pub fn install(env: &Environment) -> io::Result<()> {
    let path = env.path(FILE);

    if fs::read_to_string(&path).is_ok_and(|current| current == SCRIPT) {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, SCRIPT)
}

/// Mark the printed tag of the passive events script as async.
pub fn script_loader_tag(tag: &str, handle: &str) -> String {
    match handle == HANDLE {
        true => tag.replace("></script>", " async></script>"),
        false => tag.to_string(),
    }
}

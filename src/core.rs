use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A 32-byte BLAKE3 hash used for change detection.
///
/// The script cache compares the fingerprint of a freshly fetched remote
/// file with the one already on disk, and only rewrites the local copy when
/// they differ.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn hash_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(blake3::Hasher::new().update_mmap(path)?.finalize().into())
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// How long a deferred payload waits before it runs.
///
/// The value is substituted verbatim into the generated script as
/// `const delay = N;`. A non-negative `N` runs the payload `N` milliseconds
/// after the page `load` event. A negative `N` waits for the first user
/// interaction instead: touch, mouse-enter, click, or a second scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delay(i64);

/// Decoded form of a [`Delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fire this many milliseconds after `load`.
    Timer(u64),
    /// Fire on the first qualifying user interaction after `load`.
    Interaction,
}

impl Delay {
    /// Wait for user interaction, no timer.
    pub const ON_INTERACTION: Delay = Delay(-1);

    pub const fn new(value: i64) -> Self {
        Delay(value)
    }

    pub const fn millis(ms: u64) -> Self {
        Delay(if ms > i64::MAX as u64 { i64::MAX } else { ms as i64 })
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub fn trigger(self) -> Trigger {
        match u64::try_from(self.0) {
            Ok(ms) => Trigger::Timer(ms),
            Err(_) => Trigger::Interaction,
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Delay::ON_INTERACTION
    }
}

impl From<i64> for Delay {
    fn from(value: i64) -> Self {
        Delay(value)
    }
}

impl std::fmt::Display for Delay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Site-wide facts about where and how the optimizer runs.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Public URL of the plugin directory, without a trailing slash.
    pub base_url: String,
    /// Directory on disk served under `base_url`.
    pub root: Utf8PathBuf,
    /// Emit readable scripts, skip minification.
    pub script_debug: bool,
    /// The current request is served over HTTPS.
    pub ssl: bool,
}

impl Environment {
    pub fn new(base_url: impl Into<String>, root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            root: root.into(),
            script_debug: false,
            ssl: true,
        }
    }

    /// Public URL of a file relative to the plugin directory.
    pub fn url(&self, relative: impl AsRef<Utf8Path>) -> String {
        format!("{}/{}", self.base_url, relative.as_ref())
    }

    /// Path on disk of a file relative to the plugin directory.
    pub fn path(&self, relative: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(relative)
    }

    pub fn protocol(&self) -> &'static str {
        if self.ssl { "https:" } else { "http:" }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new("/wp-content/plugins/pagespeed-optimization", ".")
    }
}

/// Remote resource fetcher provided by the host.
///
/// Implementations decide on timeouts, redirects and TLS. An empty body is
/// a valid response, callers treat it as "nothing to do".
pub trait Fetch {
    fn get(&self, url: &str, user_agent: Option<&str>) -> Result<String, FetchError>;
}

impl<F> Fetch for F
where
    F: Fn(&str) -> Result<String, FetchError>,
{
    fn get(&self, url: &str, _: Option<&str>) -> Result<String, FetchError> {
        self(url)
    }
}

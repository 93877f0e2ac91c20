//! Plugin settings and the key-value store they live in.
//!
//! The whole settings blob is stored as JSON under [`OPTION_KEY`]. Lists are
//! kept as newline-delimited text, the way they are edited, and split on
//! demand.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::Fetch;
use crate::error::SettingsError;
use crate::fonts::FontAssets;
use crate::preload::Preloader;
use crate::reducer::Seeds;

/// Store key of the settings blob.
pub const OPTION_KEY: &str = "pagespeed_optimization__settings";

/// Host hook priority of the tracking snippets when none is set.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Host key-value store for options.
pub trait OptionStore {
    fn get_option(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn update_option(&mut self, key: &str, value: String) -> anyhow::Result<()>;
}

/// In-memory [`OptionStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(HashMap<String, String>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryStore {
    fn get_option(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.get(key).cloned())
    }

    fn update_option(&mut self, key: &str, value: String) -> anyhow::Result<()> {
        self.0.insert(key.to_string(), value);
        Ok(())
    }
}

/// Where the tracking snippets are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingPosition {
    #[default]
    Header,
    Footer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Google AdSense client.
    pub gas_id: String,
    /// Google Analytics tracking ID.
    pub ga_id: String,
    pub gmap_key: String,
    /// Google global site tag ID.
    pub gtag_id: String,
    pub ya_metrika_id: String,
    pub position: TrackingPosition,
    /// Seconds after which an "adjusted bounce rate" event is sent.
    #[serde(with = "lenient::optional")]
    pub bounce_rate: Option<u32>,
    /// Host hook priority of the tracking snippets.
    #[serde(with = "lenient::priority")]
    pub enqueue_priority: i32,
    #[serde(with = "checkbox")]
    pub disable_display_features: bool,
    #[serde(with = "checkbox")]
    pub anonymize_ip: bool,
    #[serde(with = "checkbox")]
    pub prevent_gmap_roboto: bool,
    #[serde(with = "checkbox")]
    pub optimize_logged_in: bool,
    pub loader_image_url: String,
    pub scripts_to_footer: String,
    pub block_scripts: String,
    pub delay_scripts: String,
    pub styles_to_footer: String,
    pub block_styles: String,
    pub links_to_preload: String,
    /// Stylesheet URLs with `@font-face` rules.
    pub fonts_to_preload: String,
    /// Generated from `fonts_to_preload`, one link per line.
    #[serde(rename = "_fonts_preload_links")]
    pub fonts_preload_links: String,
    /// Generated from `fonts_to_preload`.
    #[serde(rename = "_fonts_generated_css")]
    pub fonts_generated_css: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gas_id: String::new(),
            ga_id: String::new(),
            gmap_key: String::new(),
            gtag_id: String::new(),
            ya_metrika_id: String::new(),
            position: TrackingPosition::Header,
            bounce_rate: None,
            enqueue_priority: DEFAULT_PRIORITY,
            disable_display_features: false,
            anonymize_ip: true,
            prevent_gmap_roboto: true,
            optimize_logged_in: false,
            loader_image_url: String::new(),
            scripts_to_footer: String::new(),
            block_scripts: String::new(),
            delay_scripts: String::new(),
            styles_to_footer: String::new(),
            block_styles: String::new(),
            links_to_preload: String::new(),
            fonts_to_preload: String::new(),
            fonts_preload_links: String::new(),
            fonts_generated_css: String::new(),
        }
    }
}

impl Settings {
    /// Read the settings blob. A missing blob yields the defaults.
    pub fn load<S: OptionStore + ?Sized>(store: &S) -> Result<Self, SettingsError> {
        let raw = store
            .get_option(OPTION_KEY)
            .map_err(|err| SettingsError::Store(OPTION_KEY.into(), err))?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|err| SettingsError::Decode(OPTION_KEY.into(), err)),
            None => Ok(Settings::default()),
        }
    }

    /// Like [`Settings::load`], but falls back to the defaults on error.
    pub fn load_or_default<S: OptionStore + ?Sized>(store: &S) -> Self {
        Self::load(store).unwrap_or_else(|err| {
            tracing::warn!("using default settings: {err}");
            Settings::default()
        })
    }

    pub fn save<S: OptionStore + ?Sized>(&self, store: &mut S) -> Result<(), SettingsError> {
        let raw = serde_json::to_string(self).map_err(SettingsError::Encode)?;
        store
            .update_option(OPTION_KEY, raw)
            .map_err(|err| SettingsError::Store(OPTION_KEY.into(), err))
    }

    /// Prepare freshly submitted settings for saving. Fonts are fetched and
    /// regenerated only when the font stylesheet list changed, otherwise the
    /// previously generated assets are carried over.
    pub fn update<F: Fetch + ?Sized>(mut self, old: &Settings, fetch: &F) -> Self {
        if self == *old {
            return self;
        }

        let stylesheets = unique_lines(&self.fonts_to_preload);
        self.fonts_to_preload = stylesheets.join("\n");

        if self.fonts_to_preload == old.fonts_to_preload {
            self.fonts_preload_links = old.fonts_preload_links.clone();
            self.fonts_generated_css = old.fonts_generated_css.clone();
            return self;
        }

        let fonts = FontAssets::generate(&stylesheets, fetch);
        self.fonts_preload_links = fonts.links.join("\n");
        self.fonts_generated_css = fonts.css_lines().join("\n");
        self
    }

    pub fn script_seeds(&self) -> Seeds {
        Seeds {
            block: unique_lines(&self.block_scripts),
            footer: unique_lines(&self.scripts_to_footer),
            delay: unique_lines(&self.delay_scripts),
        }
    }

    pub fn style_seeds(&self) -> Seeds {
        Seeds {
            block: unique_lines(&self.block_styles),
            footer: unique_lines(&self.styles_to_footer),
            delay: Vec::new(),
        }
    }

    pub fn preloader(&self) -> Preloader {
        Preloader::new(
            unique_lines(&self.links_to_preload),
            lines(&self.fonts_preload_links),
            lines(&self.fonts_generated_css),
        )
    }
}

/// Trimmed, non-empty lines.
pub fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Trimmed, non-empty lines without repeats, in first-seen order.
pub fn unique_lines(text: &str) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();

    for line in lines(text) {
        if !unique.contains(&line) {
            unique.push(line);
        }
    }

    unique
}

/// Checkboxes are stored as `"yes"`/`"no"`; `"1"`, `"on"` and JSON
/// booleans are accepted as well.
mod checkbox {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "yes" } else { "no" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Bool(value)) => value,
            Some(Raw::Number(value)) => value == 1,
            Some(Raw::Text(value)) => matches!(value.trim(), "yes" | "1" | "on"),
            None => false,
        })
    }
}

/// Numbers that may arrive as text from a form.
mod lenient {
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    fn parse<E: serde::de::Error>(raw: Option<Raw>) -> Result<Option<i64>, E> {
        match raw {
            Some(Raw::Number(value)) => Ok(Some(value)),
            Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(Raw::Text(text)) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| E::custom(format!("expected a number, found '{text}'"))),
            None => Ok(None),
        }
    }

    pub mod priority {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &i32, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_i32(*value)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
            let value = super::parse::<D::Error>(Option::deserialize(deserializer)?)?;
            match value {
                Some(value) => i32::try_from(value).map_err(serde::de::Error::custom),
                None => Ok(crate::settings::DEFAULT_PRIORITY),
            }
        }
    }

    pub mod optional {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_u32(*value),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u32>, D::Error> {
            let value = super::parse::<D::Error>(Option::deserialize(deserializer)?)?;
            match value {
                Some(0) | None => Ok(None),
                Some(value) => u32::try_from(value).map(Some).map_err(serde::de::Error::custom),
            }
        }
    }
}

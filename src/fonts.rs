//! Font preloading from remote stylesheets.
//!
//! Stylesheets listed under "fonts to preload" are fetched once, when the
//! option changes. Every `@font-face` rule is rewritten to use absolute woff
//! and woff2 sources and `font-display: swap`, and each kept source gets a
//! preload link. The results are stored alongside the settings and printed
//! by [`crate::preload::Preloader`] on every page.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::core::Fetch;

/// Desktop browser user agent, so font services answer with woff2.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.88 Safari/537.36";

const SWAP: &str = "font-display: swap;";

static FONT_FACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:/\*.*\*/\s*)?@font-face\s*\{[\s\S]*?\}").expect("valid regex")
});

static SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\s*\(([^)]+)\)(?: format\s*\(([^)]+)\)\s*)?\s*,?"#).expect("valid regex")
});

static SEMICOLON_BRACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*\}").expect("valid regex"));

static COMMA_SEMICOLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*;").expect("valid regex"));

static EMPTY_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)src\s*:\s*;").expect("valid regex"));

fn font_type(format: &str) -> Option<&'static str> {
    match format {
        "otf" => Some("font/otf"),
        "truetype" => Some("font/ttf"),
        "woff" => Some("font/woff"),
        "woff2" => Some("font/woff2"),
        _ => None,
    }
}

/// Preload links and rewritten `@font-face` rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontAssets {
    pub links: Vec<String>,
    pub css: Vec<String>,
}

impl FontAssets {
    /// Fetch every stylesheet and collect its fonts. Stylesheets that fail
    /// to load or carry no `@font-face` rules are skipped.
    pub fn generate<F: Fetch + ?Sized>(stylesheets: &[String], fetch: &F) -> Self {
        let mut assets = FontAssets::default();

        for url in stylesheets {
            let css = match fetch.get(url, Some(USER_AGENT)) {
                Ok(css) => css,
                Err(err) => {
                    tracing::warn!(url = %url, "couldn't fetch font stylesheet: {err}");
                    continue;
                }
            };

            if css.is_empty() {
                continue;
            }

            assets.extend(url, &css);
        }

        tracing::info!(links = assets.links.len(), "generated font preloads");
        assets
    }

    /// Process one stylesheet fetched from `base`.
    pub fn extend(&mut self, base: &str, css: &str) {
        for rule in FONT_FACE.find_iter(css) {
            let (rule, links) = rewrite_font_face(rule.as_str(), base);

            for link in links {
                if !self.links.contains(&link) {
                    self.links.push(link);
                }
            }

            self.css.push(rule);
        }
    }

    /// Generated CSS split into the lines stored in the settings.
    pub fn css_lines(&self) -> Vec<String> {
        self.css
            .join("\n")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    }
}

fn rewrite_font_face(rule: &str, base: &str) -> (String, Vec<String>) {
    let mut rule = rule.to_string();
    let mut links = Vec::new();

    let sources: Vec<(String, String, String)> = SOURCE
        .captures_iter(&rule)
        .map(|caps| {
            let whole = caps[0].to_string();
            let url = trim_quotes(&caps[1]).to_string();
            let format = caps.get(2).map(|m| trim_quotes(m.as_str())).unwrap_or_default();
            (whole, url, format.to_string())
        })
        .collect();

    for (whole, url, format) in sources {
        if format != "woff" && format != "woff2" {
            rule = rule.replace(&whole, "");
            continue;
        }

        let absolute = absolute_url(&url, base);
        let kind = font_type(&format)
            .map(|mime| format!("type=\"{mime}\" "))
            .unwrap_or_default();

        links.push(format!(
            "<link rel=\"preload\" href=\"{absolute}\" as=\"font\" {kind}crossorigin=\"anonymous\">"
        ));

        rule = rule.replace(&url, &absolute);
    }

    if !rule.contains(SWAP) {
        rule = SEMICOLON_BRACE.replace_all(&rule, "}").into_owned();
        rule = rule.replace('}', &format!(";\n{SWAP}\n}}"));
    }

    let rule = COMMA_SEMICOLON.replace_all(&rule, ";");
    let rule = EMPTY_SRC.replace_all(&rule, "").into_owned();

    (rule, links)
}

fn trim_quotes(value: &str) -> &str {
    value.trim_matches(['\'', '"'])
}

/// Resolve `relative` against the URL of the stylesheet it came from. Kept
/// as is when the base is not an absolute URL.
pub fn absolute_url(relative: &str, base: &str) -> String {
    if relative.is_empty() {
        return String::new();
    }

    match Url::parse(base).and_then(|base| base.join(relative)) {
        Ok(url) => url.into(),
        Err(err) => {
            tracing::debug!(relative, base, "couldn't resolve font url: {err}");
            relative.to_string()
        }
    }
}

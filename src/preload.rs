//! Resource hints printed at the top of `<head>`.

use std::fmt::Write;

use url::Url;

use crate::registry::escape_attr;

/// `as` and `type` attribute values for a preloaded file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType {
    pub kind: &'static str,
    pub mime: &'static str,
}

const CONTENT_TYPES: &[(&str, ContentType)] = &[
    ("otf", ContentType { kind: "font", mime: "font/otf" }),
    ("ttf", ContentType { kind: "font", mime: "font/ttf" }),
    ("woff", ContentType { kind: "font", mime: "font/woff" }),
    ("woff2", ContentType { kind: "font", mime: "font/woff2" }),
    ("gif", ContentType { kind: "image", mime: "image/gif" }),
    ("ico", ContentType { kind: "image", mime: "image/x-icon" }),
    ("jpeg", ContentType { kind: "image", mime: "image/jpeg" }),
    ("jpg", ContentType { kind: "image", mime: "image/jpeg" }),
    ("png", ContentType { kind: "image", mime: "image/png" }),
    ("svg", ContentType { kind: "image", mime: "image/svg+xml" }),
    ("tif", ContentType { kind: "image", mime: "image/tiff" }),
    ("tiff", ContentType { kind: "image", mime: "image/tiff" }),
    ("js", ContentType { kind: "script", mime: "application/javascript" }),
    ("css", ContentType { kind: "style", mime: "text/css" }),
    ("htm", ContentType { kind: "document", mime: "text/html" }),
    ("html", ContentType { kind: "document", mime: "text/html" }),
];

/// Look up the content type by the extension of the URL path, ignoring the
/// query string and fragment.
pub fn content_type(url: &str) -> Option<ContentType> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default();
    let (_, ext) = name.rsplit_once('.')?;

    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, ct)| *ct)
}

/// `scheme://host[:port]` of an absolute URL. Scheme-relative links default
/// to `http`. `None` for relative links and URLs without a host.
pub fn preconnect_origin(link: &str) -> Option<String> {
    let url = match link.strip_prefix("//") {
        Some(rest) => Url::parse(&format!("http://{rest}")),
        None => Url::parse(link),
    }
    .ok()?;

    let host = url.host_str()?;
    let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();

    Some(format!("{}://{host}{port}", url.scheme()))
}

/// One `<link rel="preload">` tag, `None` for unknown extensions.
pub fn preload_link(url: &str) -> Option<String> {
    let Some(ct) = content_type(url) else {
        tracing::debug!(url, "skipping preload link with unknown extension");
        return None;
    };

    let crossorigin = match ct.kind {
        "font" => " crossorigin=\"anonymous\"",
        _ => "",
    };

    let onload = match ct.kind {
        "style" => " onload=\"this.rel='stylesheet'\"",
        _ => "",
    };

    Some(format!(
        "<link rel=\"preload\" href=\"{}\" as=\"{}\" type=\"{}\"{crossorigin}{onload}>",
        escape_attr(url),
        ct.kind,
        ct.mime
    ))
}

/// Everything `head` needs, already split into lists.
#[derive(Debug, Clone, Default)]
pub struct Preloader {
    links: Vec<String>,
    font_links: Vec<String>,
    font_css: Vec<String>,
}

impl Preloader {
    pub fn new(links: Vec<String>, font_links: Vec<String>, font_css: Vec<String>) -> Self {
        let mut deduped = Vec::with_capacity(links.len());
        for link in links {
            if !deduped.contains(&link) {
                deduped.push(link);
            }
        }

        Self {
            links: deduped,
            font_links,
            font_css,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.font_links.is_empty() && self.font_css.is_empty()
    }

    /// Preconnect hints, font preloads, link preloads and the generated
    /// `@font-face` rules, in that order.
    pub fn head(&self) -> String {
        let mut html = String::new();

        let mut origins: Vec<String> = Vec::new();
        for origin in self.links.iter().filter_map(|link| preconnect_origin(link)) {
            if !origins.contains(&origin) {
                origins.push(origin);
            }
        }

        for origin in &origins {
            let _ = writeln!(html, "<link rel=\"preconnect\" href=\"{}\">", escape_attr(origin));
        }

        if !self.font_links.is_empty() {
            html.push('\n');
            for link in &self.font_links {
                html.push_str(link);
                html.push('\n');
            }
        }

        if !self.links.is_empty() {
            html.push('\n');
            for link in self.links.iter().filter_map(|link| preload_link(link)) {
                html.push_str(&link);
                html.push('\n');
            }
        }

        html.push_str(&self.font_css());
        html
    }

    fn font_css(&self) -> String {
        if self.font_css.is_empty() {
            return String::new();
        }

        let mut css = String::from("\n<style id=\"pagespeed-fonts-generated-css\">\n");

        for line in &self.font_css {
            let indent = match line.starts_with('@') || line.starts_with('}') {
                true => "\t",
                false => "\t\t",
            };
            let _ = writeln!(css, "{indent}{line}");
        }

        css.push_str("</style>\n");
        css
    }
}

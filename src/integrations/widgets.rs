//! Widgets and snippets printed by other plugins.
//!
//! None of these are configured here: the host hands over the HTML another
//! plugin produced and prints whatever comes back.

use std::sync::LazyLock;

use regex::Regex;

use crate::cache::ScriptCache;
use crate::core::Delay;
use crate::deferred::Deferred;
use crate::script::{ScriptInit, literal};

const CLUTCH_SRC: &str = "https://widget.clutch.co/static/js/widget.js";

/// The Clutch widget waits this long after `load`.
pub const CLUTCH_DELAY: Delay = Delay::millis(1000);

/// Handle the OneSignal plugin registers its SDK under.
pub const ONE_SIGNAL: &str = "remote_sdk";

const RTB_LOADER: &str = "//an.yandex.ru/system/context.js";

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script.*?>.*?</script>").expect("valid regex"));

static LAYER_SLIDER_INIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<script.+_initLayerSlider.+</script>").expect("valid regex"));

static RTB_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<script [\s\S]+?</script>").expect("valid regex"));

static RTB_BLOCK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"blockId:\s+"([^"]+)""#).expect("valid regex"));

static RTB_RENDER_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"renderTo:\s+"([^"]+)""#).expect("valid regex"));

static TAG_MANAGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<script([^>]*)>\s*</script>").expect("valid regex")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w-]+)=["']([^"']+)["']|([\w-]+)"#).expect("valid regex")
});

/// Delay the Clutch widget loader found in a text widget.
pub fn clutch(text: &str, engine: &Deferred) -> String {
    if !text.contains(CLUTCH_SRC) {
        return text.to_string();
    }

    let mut block = Some(engine.launch(&ScriptInit::new(CLUTCH_SRC), CLUTCH_DELAY));

    SCRIPT_TAG
        .replace_all(text, |_: &regex::Captures| block.take().unwrap_or_default())
        .into_owned()
}

/// Moves the inline init script of each slider to the footer.
#[derive(Debug, Default)]
pub struct LayerSlider {
    scripts: Vec<String>,
}

impl LayerSlider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter the output of a rendered shortcode.
    pub fn shortcode(&mut self, tag: &str, output: &str) -> String {
        if tag != "layerslider" {
            return output.to_string();
        }

        let Some(init) = LAYER_SLIDER_INIT.find(output) else {
            return output.to_string();
        };

        let init = init.as_str().to_string();
        let output = output.replace(&init, "");
        self.scripts.push(init);
        output
    }

    pub fn footer(&self) -> String {
        self.scripts
            .iter()
            .map(|script| script.replace("<script ", "<script async "))
            .collect()
    }
}

/// One Yandex RTB ad unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtbBlock {
    pub block_id: String,
    pub render_to: String,
}

/// Collects Yandex RTB units from the content and renders all of them from
/// one delayed script in the footer.
#[derive(Debug, Default)]
pub struct YandexRtb {
    scripts: Vec<String>,
    blocks: Vec<RtbBlock>,
}

impl YandexRtb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[RtbBlock] {
        &self.blocks
    }

    /// Remove RTB scripts from `content`, remembering their units.
    pub fn filter(&mut self, content: &str) -> String {
        RTB_SCRIPT
            .replace_all(content, |caps: &regex::Captures| {
                let script = &caps[0];

                if !script.contains("yandex_rtb") {
                    return script.to_string();
                }

                if !self.scripts.iter().any(|known| known == script) {
                    self.scripts.push(script.to_string());
                    self.collect(script);
                }

                String::new()
            })
            .into_owned()
    }

    fn collect(&mut self, script: &str) {
        let block_id = RTB_BLOCK_ID.captures(script).map(|caps| caps[1].to_string());
        let render_to = RTB_RENDER_TO.captures(script).map(|caps| caps[1].to_string());

        match (block_id, render_to) {
            (Some(block_id), Some(render_to)) => self.blocks.push(RtbBlock {
                block_id,
                render_to,
            }),
            _ => tracing::debug!("dropping RTB script without blockId or renderTo"),
        }
    }

    /// Delayed loader rendering every collected unit, empty if none.
    pub fn footer(&self, engine: &Deferred, cache: &ScriptCache) -> String {
        if self.blocks.is_empty() {
            return String::new();
        }

        let mut js = String::from("( function( w, d, n, s, t ) {\n");
        js.push_str("    w[n] = w[n] || [];\n");
        js.push_str("    w[n].push( function() {\n");

        for block in &self.blocks {
            js.push_str("        Ya.Context.AdvManager.render( {\n");
            js.push_str(&format!("            blockId: {},\n", literal(&block.block_id)));
            js.push_str(&format!("            renderTo: {},\n", literal(&block.render_to)));
            js.push_str("            async: true\n");
            js.push_str("        } );\n");
        }

        js.push_str("    } );\n");
        js.push_str("    t = d.getElementsByTagName( 'script' )[0];\n");
        js.push_str("    s = d.createElement( 'script' );\n");
        js.push_str("    s.type = 'text/javascript';\n");
        js.push_str(&format!("    s.src = '{RTB_LOADER}';\n"));
        js.push_str("    s.async = true;\n");
        js.push_str("    t.parentNode.insertBefore( s, t );\n");
        js.push_str("} )( this, this.document, 'yandexContextAsyncCallbacks' );\n");

        let js = cache.replace_urls(&js);
        format!("\n{}\n", engine.create(&js, Delay::default()))
    }
}

/// Split a Google Tag Manager snippet into the loader tag and the rest.
///
/// The loader becomes a typed initializer: `src`, `async` and `data-*`
/// attributes are kept, anything else is dropped.
pub fn split_tag_manager(html: &str) -> (Option<ScriptInit>, String) {
    let Some(caps) = TAG_MANAGER
        .captures_iter(html)
        .find(|caps| caps[1].contains("googletagmanager"))
    else {
        return (None, html.to_string());
    };

    let mut init = ScriptInit::default();

    for attr in ATTRIBUTE.captures_iter(&caps[1]) {
        match (attr.get(1), attr.get(2), attr.get(3)) {
            (Some(key), Some(value), _) => match key.as_str() {
                "src" => init.src = value.as_str().to_string(),
                key => {
                    if let Some(name) = key.strip_prefix("data-") {
                        init = init.data(name, value.as_str());
                    }
                }
            },
            (_, _, Some(flag)) if flag.as_str() == "async" => init.is_async = Some(true),
            _ => {}
        }
    }

    (Some(init), html.replacen(&caps[0], "", 1))
}

/// Delay a Google Tag Manager snippet: the loader through an initializer,
/// the inline configuration as a merged block.
pub fn delay_tag_manager(html: &str, engine: &Deferred) -> String {
    let (init, rest) = split_tag_manager(html);

    let mut out = String::new();
    if let Some(init) = init {
        out.push_str(&engine.launch(&init, Delay::default()));
    }
    out.push_str(&engine.launch_html(&rest, Delay::default()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Environment;
    use crate::minify::Minifier;

    fn engine() -> Deferred {
        Deferred::new(Minifier::PassThrough, true)
    }

    #[test]
    fn test_clutch() {
        let text = format!(
            "<div class=\"clutch-widget\" data-id=\"1\"></div>\n<script type=\"text/javascript\" src=\"{CLUTCH_SRC}\"></script>"
        );
        let html = clutch(&text, &engine());

        assert!(html.starts_with("<div class=\"clutch-widget\" data-id=\"1\"></div>\n<script>\n"));
        assert!(html.contains("const delay = 1000;"));
        assert!(html.contains(&format!("s.src = \"{CLUTCH_SRC}\";")));
        assert!(!html.contains("<script type="));

        assert_eq!(clutch("<p>no widget</p>", &engine()), "<p>no widget</p>");
    }

    #[test]
    fn test_layer_slider() {
        let mut slider = LayerSlider::new();
        let output = "<div id=\"layerslider_1\"></div><script type=\"text/javascript\">jQuery(function() { _initLayerSlider( '#layerslider_1', {} ); });</script><p>after</p>";

        assert_eq!(slider.shortcode("gallery", output), output);
        assert_eq!(slider.footer(), "");

        let filtered = slider.shortcode("layerslider", output);
        assert_eq!(filtered, "<div id=\"layerslider_1\"></div><p>after</p>");
        assert_eq!(
            slider.footer(),
            "<script async type=\"text/javascript\">jQuery(function() { _initLayerSlider( '#layerslider_1', {} ); });</script>"
        );
    }

    const RTB: &str = r#"<div id="yandex_rtb_R-A-1-1"></div>
<script type="text/javascript">
    (function(w, d, n, s, t) {
        w[n] = w[n] || [];
        w[n].push(function() {
            Ya.Context.AdvManager.render({
                blockId: "R-A-1-1",
                renderTo: "yandex_rtb_R-A-1-1",
                async: true
            });
        });
    })(this, this.document, "yandexContextAsyncCallbacks");
</script>"#;

    #[test]
    fn test_yandex_rtb() {
        let mut rtb = YandexRtb::new();
        let content = format!("<p>intro</p>\n{RTB}\n<script type=\"text/javascript\">other();</script>\n{RTB}");

        let filtered = rtb.filter(&content);
        assert!(!filtered.contains("AdvManager"));
        assert!(filtered.contains("other();"));
        assert_eq!(filtered.matches("<div id=\"yandex_rtb_R-A-1-1\"></div>").count(), 2);
        assert_eq!(
            rtb.blocks(),
            [RtbBlock {
                block_id: "R-A-1-1".into(),
                render_to: "yandex_rtb_R-A-1-1".into()
            }]
        );

        let env = Environment::new("https://example.com/plugin", ".");
        let cache = ScriptCache::new(&env);
        let html = rtb.footer(&engine(), &cache);
        assert!(html.contains("blockId: \"R-A-1-1\","));
        assert!(html.contains("s.src = 'https://example.com/plugin/cache/ya_an.js';"));
        assert!(html.contains("const delay = -1;"));
    }

    #[test]
    fn test_yandex_rtb_without_blocks() {
        let rtb = YandexRtb::new();
        let env = Environment::default();
        assert_eq!(rtb.footer(&engine(), &ScriptCache::new(&env)), "");
    }

    #[test]
    fn test_split_tag_manager() {
        let html = concat!(
            "<!-- This site uses the Google Analytics plugin -->\n",
            "<script src=\"//www.googletagmanager.com/gtag/js?id=G-1\" data-cfasync=\"false\" data-wpfc-render=\"false\" async></script>\n",
            "<script data-cfasync=\"false\">\nwindow.dataLayer = window.dataLayer || [];\n</script>\n",
        );

        let (init, rest) = split_tag_manager(html);
        let init = init.unwrap();

        assert_eq!(init.src, "//www.googletagmanager.com/gtag/js?id=G-1");
        assert_eq!(init.is_async, Some(true));
        assert_eq!(init.data.get("cfasync").map(String::as_str), Some("false"));
        assert_eq!(init.data.get("wpfc-render").map(String::as_str), Some("false"));
        assert!(!rest.contains("googletagmanager"));
        assert!(rest.contains("window.dataLayer"));

        let out = delay_tag_manager(html, &engine());
        assert_eq!(out.matches("<script>").count(), 2);
        assert!(out.contains("window.dataLayer = window.dataLayer || [];"));
    }

    #[test]
    fn test_split_tag_manager_without_loader() {
        let html = "<script>gtag('js', new Date());</script>";
        let (init, rest) = split_tag_manager(html);
        assert!(init.is_none());
        assert_eq!(rest, html);
    }
}

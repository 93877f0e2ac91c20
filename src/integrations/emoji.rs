//! Emoji support is switched off entirely: no detection script, no styles,
//! no editor plugin, no DNS prefetch of the emoji CDN.

/// Host callbacks to unhook, as `(hook, callback)` pairs.
pub const DISABLED_CALLBACKS: [(&str, &str); 8] = [
    ("wp_head", "print_emoji_detection_script"),
    ("admin_print_scripts", "print_emoji_detection_script"),
    ("embed_head", "print_emoji_detection_script"),
    ("wp_print_styles", "print_emoji_styles"),
    ("admin_print_styles", "print_emoji_styles"),
    ("the_content_feed", "wp_staticize_emoji"),
    ("comment_text_rss", "wp_staticize_emoji"),
    ("wp_mail", "wp_staticize_emoji_for_email"),
];

pub const EMOJI_SVG_URL: &str = "https://s.w.org/images/core/emoji/2/svg/";

const TINYMCE_PLUGIN: &str = "wpemoji";

/// Editor plugins without the emoji plugin.
pub fn tinymce_plugins(plugins: Vec<String>) -> Vec<String> {
    plugins
        .into_iter()
        .filter(|plugin| plugin != TINYMCE_PLUGIN)
        .collect()
}

/// Resource hints without the emoji CDN, for `dns-prefetch` hints only.
pub fn resource_hints(urls: Vec<String>, relation: &str, emoji_svg_url: &str) -> Vec<String> {
    if relation != "dns-prefetch" {
        return urls;
    }

    urls.into_iter().filter(|url| url != emoji_svg_url).collect()
}

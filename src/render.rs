//! Page render pipeline.
//!
//! [`Optimizer`] is built once per site from the settings. Each request gets
//! its own [`PageRender`], which owns everything that accumulates while the
//! page is printed: the moved and delayed handles, the stored delayed
//! scripts and the snippets lifted out of the content. The host calls the
//! hooks in page order:
//!
//! 1. [`PageRender::enqueue_scripts`]
//! 2. [`PageRender::head`] and [`PageRender::print_scripts`]
//! 3. [`PageRender::body_open`], then content filters
//! 4. [`PageRender::footer`]
//! 5. [`PageRender::delay_footer_scripts`], before the host prints the
//!    footer queue, so scripts enqueued after the header are still delayed
//! 6. the host prints the footer queue
//! 7. [`PageRender::print_footer_scripts`]

use crate::cache::{ScriptCache, Service};
use crate::core::{Delay, Environment, Fetch};
use crate::deferred::{Deferred, DelayedQueue};
use crate::integrations::{Analytics, LayerSlider, Loader, YandexRtb, emoji, maps, passive, widgets};
use crate::minify::Minifier;
use crate::preload::Preloader;
use crate::reducer::{Reducer, style_loader_tag};
use crate::script::ScriptInit;
use crate::registry::{Asset, Registry};
use crate::settings::{Settings, TrackingPosition};

pub struct Optimizer {
    settings: Settings,
    env: Environment,
    engine: Deferred,
    preloader: Preloader,
    loader: Option<Loader>,
}

impl Optimizer {
    pub fn new(settings: Settings, env: Environment) -> Self {
        Self::with_minifier(settings, env, Minifier::default())
    }

    pub fn with_minifier(settings: Settings, env: Environment, minifier: Minifier) -> Self {
        let engine = Deferred::new(minifier, env.script_debug);
        let preloader = settings.preloader();
        let loader = Loader::new(&settings.loader_image_url);

        Self {
            settings,
            env,
            engine,
            preloader,
            loader,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn engine(&self) -> &Deferred {
        &self.engine
    }

    /// Pages of logged-in users are left alone unless configured otherwise.
    pub fn is_active(&self, logged_in: bool) -> bool {
        !logged_in || self.settings.optimize_logged_in
    }

    /// Host hook priority of the tracking snippets.
    pub fn enqueue_priority(&self) -> i32 {
        self.settings.enqueue_priority
    }

    /// Refresh the local copies of third-party scripts.
    pub fn refresh_cache<F: Fetch + ?Sized>(&self, fetch: &F) -> Vec<Service> {
        ScriptCache::new(&self.env).update_all(&self.settings, fetch)
    }

    /// Point remote script URLs in third-party HTML at the local copies.
    pub fn replace_urls(&self, html: &str) -> String {
        ScriptCache::new(&self.env).replace_urls(html)
    }

    /// Host callbacks to unhook on `init`, as `(hook, callback)` pairs.
    pub fn unhooked_callbacks(&self) -> &'static [(&'static str, &'static str)] {
        &emoji::DISABLED_CALLBACKS
    }

    /// Filter the editor plugin list.
    pub fn tinymce_plugins(&self, plugins: Vec<String>) -> Vec<String> {
        emoji::tinymce_plugins(plugins)
    }

    /// Filter the resource hints printed by the host.
    pub fn resource_hints(&self, urls: Vec<String>, relation: &str) -> Vec<String> {
        emoji::resource_hints(urls, relation, emoji::EMOJI_SVG_URL)
    }

    pub fn page(&self) -> PageRender<'_> {
        let reducer = Reducer::new(self.settings.script_seeds(), self.settings.style_seeds())
            .with_delay(Delay::default());

        PageRender {
            optimizer: self,
            reducer,
            queue: DelayedQueue::new(),
            layer_slider: LayerSlider::new(),
            rtb: YandexRtb::new(),
            tracking_done: false,
            roboto_done: false,
        }
    }
}

/// State of one page render.
pub struct PageRender<'a> {
    optimizer: &'a Optimizer,
    reducer: Reducer,
    queue: DelayedQueue,
    layer_slider: LayerSlider,
    rtb: YandexRtb,
    tracking_done: bool,
    roboto_done: bool,
}

impl PageRender<'_> {
    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    /// Enqueue our own scripts, then take blocked, moved and delayed assets
    /// out of the header.
    pub fn enqueue_scripts<S, T>(&mut self, scripts: &mut S, styles: &mut T)
    where
        S: Registry + ?Sized,
        T: Registry + ?Sized,
    {
        let settings = &self.optimizer.settings;
        let env = &self.optimizer.env;

        register(scripts, passive::asset(env));

        if settings.position == TrackingPosition::Header
            && let Some(asset) = maps::asset(settings, env)
        {
            register(scripts, asset);
        }

        self.reducer.remove_scripts_from_header(scripts);
        self.reducer.remove_styles_from_header(styles);
    }

    /// Resource hints and the loader, printed first in `<head>`.
    pub fn head(&self) -> String {
        let mut html = self.optimizer.preloader.head();

        if let Some(loader) = &self.optimizer.loader {
            html.push_str(loader.head());
        }

        html
    }

    /// Runs every time the host prints header scripts. Catches assets
    /// enqueued since [`PageRender::enqueue_scripts`].
    pub fn print_scripts<S, T>(&mut self, scripts: &mut S, styles: &mut T) -> String
    where
        S: Registry + ?Sized,
        T: Registry + ?Sized,
    {
        self.reducer.remove_scripts_from_header(scripts);
        self.reducer.remove_styles_from_header(styles);

        let mut html = String::new();

        if !self.roboto_done {
            self.roboto_done = true;
            html.push_str(maps::prevent_roboto(&self.optimizer.settings));
        }

        if self.optimizer.settings.position == TrackingPosition::Header {
            html.push_str(&self.tracking());
        }

        html
    }

    pub fn body_open(&self) -> String {
        match &self.optimizer.loader {
            Some(loader) => loader.body_open(),
            None => String::new(),
        }
    }

    /// Filter post content.
    pub fn filter_content(&mut self, html: &str) -> String {
        self.rtb.filter(html)
    }

    /// Filter the output of a rendered shortcode.
    pub fn shortcode(&mut self, tag: &str, output: &str) -> String {
        let output = self.layer_slider.shortcode(tag, output);
        self.rtb.filter(&output)
    }

    /// Filter the text of a text widget.
    pub fn widget_text(&self, text: &str) -> String {
        widgets::clutch(text, &self.optimizer.engine)
    }

    /// Delay the scripts of a snippet printed by another plugin, such as a
    /// chat, counter or social button.
    pub fn third_party_html(&self, html: &str) -> String {
        self.optimizer.engine.launch_html(html, Delay::default())
    }

    /// Delay a Google Tag Manager snippet printed by another plugin.
    pub fn tag_manager(&self, html: &str) -> String {
        widgets::delay_tag_manager(html, &self.optimizer.engine)
    }

    /// Put moved assets back into the queues before the footer is printed.
    pub fn footer<S, T>(&mut self, scripts: &mut S, styles: &mut T)
    where
        S: Registry + ?Sized,
        T: Registry + ?Sized,
    {
        let settings = &self.optimizer.settings;

        if settings.position == TrackingPosition::Footer
            && let Some(asset) = maps::asset(settings, &self.optimizer.env)
        {
            register(scripts, asset);
        }

        self.reducer.add_scripts_to_footer(scripts);
        self.reducer.add_styles_to_footer(styles);
    }

    /// Delay the footer scripts. Must run before the host prints the footer
    /// queue: the delay pass sweeps again for scripts enqueued after the
    /// header and takes them out of the queue. Returns the inline fragments
    /// of the delayed scripts followed by the delayed blocks.
    pub fn delay_footer_scripts<S: Registry + ?Sized>(&mut self, scripts: &mut S) -> String {
        let engine = &self.optimizer.engine;

        let mut html = self.launch_script(scripts, widgets::ONE_SIGNAL);
        html.push_str(&self.reducer.delay_scripts(scripts, &mut self.queue));
        html.push_str(&self.queue.flush(engine));
        html
    }

    /// Everything printed after the footer queue: footer tracking, slider
    /// init scripts and ad units.
    pub fn print_footer_scripts(&mut self) -> String {
        let optimizer = self.optimizer;
        let mut html = String::new();

        if optimizer.settings.position == TrackingPosition::Footer {
            html.push_str(&self.tracking());
        }

        html.push_str(&self.layer_slider.footer());

        let cache = ScriptCache::new(&optimizer.env);
        html.push_str(&self.rtb.footer(&optimizer.engine, &cache));

        html
    }

    /// Take an enqueued script out of the queue and launch it delayed on its
    /// own, empty if the script is not enqueued.
    pub fn launch_script<S: Registry + ?Sized>(&self, scripts: &mut S, handle: &str) -> String {
        if !scripts.is_enqueued(handle) {
            return String::new();
        }

        let Some(src) = scripts.get(handle).and_then(Asset::resolved_src) else {
            return String::new();
        };

        tracing::debug!(handle, src = %src, "launching script");
        scripts.dequeue(handle);
        self.optimizer.engine.launch(&ScriptInit::new(src), Delay::default())
    }

    /// Filter a printed `<link>` tag.
    pub fn style_tag(&self, tag: &str, href: &str) -> String {
        style_loader_tag(tag, href)
    }

    /// Filter a printed `<script>` tag.
    pub fn script_tag(&self, tag: &str, handle: &str) -> String {
        passive::script_loader_tag(tag, handle)
    }

    /// Tracking snippets, printed once per page.
    fn tracking(&mut self) -> String {
        if self.tracking_done {
            return String::new();
        }

        self.tracking_done = true;

        Analytics::from_settings(&self.optimizer.settings)
            .render(&self.optimizer.engine, &self.optimizer.env)
    }
}

fn register<R: Registry + ?Sized>(registry: &mut R, asset: Asset) {
    let handle = asset.handle.clone();
    registry.register(asset);
    registry.enqueue(&handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Asset, Dependencies};

    fn optimizer(settings: Settings) -> Optimizer {
        let mut env = Environment::new("https://example.com/plugin", ".");
        env.script_debug = true;
        Optimizer::new(settings, env)
    }

    fn page_scripts() -> Dependencies {
        let mut scripts = Dependencies::new();
        scripts
            .add(Asset::new("jquery", "/jquery.js"))
            .add(Asset::new("slider", "/slider.js").deps(["jquery"]))
            .add(Asset::new("chat", "https://chat.example.com/w.js#asyncload").after("chat.init();"))
            .add(Asset::new("tracker", "/tracker.js"));
        scripts
    }

    #[test]
    fn test_is_active() {
        let off = optimizer(Settings::default());
        assert!(off.is_active(false));
        assert!(!off.is_active(true));

        let on = optimizer(Settings {
            optimize_logged_in: true,
            ..Default::default()
        });
        assert!(on.is_active(true));
    }

    #[test]
    fn test_emoji_is_off() {
        let optimizer = optimizer(Settings::default());

        assert!(
            optimizer
                .unhooked_callbacks()
                .contains(&("wp_head", "print_emoji_detection_script"))
        );
        assert_eq!(
            optimizer.tinymce_plugins(vec!["lists".into(), "wpemoji".into()]),
            ["lists"]
        );

        let hints = vec![emoji::EMOJI_SVG_URL.to_string(), "https://cdn.example.com".into()];
        assert_eq!(
            optimizer.resource_hints(hints, "dns-prefetch"),
            ["https://cdn.example.com"]
        );
    }

    #[test]
    fn test_full_page() {
        let optimizer = optimizer(Settings {
            block_scripts: "tracker".into(),
            scripts_to_footer: "jquery".into(),
            delay_scripts: "chat".into(),
            styles_to_footer: "theme".into(),
            gtag_id: "G-1".into(),
            position: TrackingPosition::Footer,
            links_to_preload: "https://cdn.example.com/font.woff2".into(),
            ..Default::default()
        });

        let mut scripts = page_scripts();
        let mut styles = Dependencies::new();
        styles.add(Asset::new("theme", "/theme.css"));

        let mut page = optimizer.page();

        page.enqueue_scripts(&mut scripts, &mut styles);
        assert!(!scripts.is_registered("tracker"));
        assert_eq!(scripts.queue(), [passive::HANDLE]);
        assert!(styles.queue().is_empty());

        let head = page.head();
        assert!(head.contains("<link rel=\"preconnect\" href=\"https://cdn.example.com\">"));
        assert!(head.contains("as=\"font\" type=\"font/woff2\""));

        let header = page.print_scripts(&mut scripts, &mut styles);
        assert!(header.is_empty());
        assert_eq!(scripts.print_queue(), [passive::HANDLE]);

        page.footer(&mut scripts, &mut styles);
        assert_eq!(scripts.queue(), ["jquery", "slider"]);
        assert_eq!(styles.queue(), ["theme"]);

        let delayed = page.delay_footer_scripts(&mut scripts);
        assert!(delayed.starts_with("<script id=\"chat-js-after\">\nchat.init();\n</script>\n"));
        assert!(delayed.contains("s.src = \"https://chat.example.com/w.js\";"));
        assert_eq!(page.reducer().delayed_scripts().len(), 0);
        assert_eq!(scripts.print_queue(), ["jquery", "slider"]);

        let footer = page.print_footer_scripts();
        assert!(footer.contains("googletagmanager.com/gtag/js?id=G-1"));

        // Tracking is printed once.
        assert!(!page.print_footer_scripts().contains("gtag"));
    }

    #[test]
    fn test_late_script_is_delayed_before_footer_queue() {
        let optimizer = optimizer(Settings {
            delay_scripts: "chat".into(),
            ..Default::default()
        });

        let mut scripts = Dependencies::new();
        let mut styles = Dependencies::new();
        scripts.add(Asset::new("jquery", "/jquery.js"));

        let mut page = optimizer.page();
        page.enqueue_scripts(&mut scripts, &mut styles);
        page.print_scripts(&mut scripts, &mut styles);
        assert_eq!(scripts.print_queue(), ["jquery", passive::HANDLE]);

        scripts.add(Asset::new("chat", "https://chat.example.com/w.js").deps(["jquery"]));
        page.footer(&mut scripts, &mut styles);

        let delayed = page.delay_footer_scripts(&mut scripts);
        assert!(delayed.contains("s.src = \"https://chat.example.com/w.js\";"));
        assert!(!scripts.is_enqueued("chat"));
        assert!(scripts.print_queue().is_empty());
    }

    #[test]
    fn test_header_tracking_and_maps() {
        let optimizer = optimizer(Settings {
            gmap_key: "KEY".into(),
            ga_id: "UA-1".into(),
            ..Default::default()
        });

        let mut scripts = Dependencies::new();
        let mut styles = Dependencies::new();
        let mut page = optimizer.page();

        page.enqueue_scripts(&mut scripts, &mut styles);
        assert!(scripts.is_enqueued(maps::HANDLE));

        let first = page.print_scripts(&mut scripts, &mut styles);
        assert!(first.contains("fonts.googleapis.com/css?family=Roboto"));
        assert!(first.contains("ga('create', \"UA-1\", 'auto');"));

        let second = page.print_scripts(&mut scripts, &mut styles);
        assert!(second.is_empty());
    }

    #[test]
    fn test_launch_script() {
        let optimizer = optimizer(Settings::default());
        let mut page = optimizer.page();

        let mut scripts = Dependencies::new();
        scripts.add(Asset::new(widgets::ONE_SIGNAL, "https://cdn.onesignal.com/sdk.js#asyncload"));

        let footer = page.delay_footer_scripts(&mut scripts);
        assert!(footer.contains("s.src = \"https://cdn.onesignal.com/sdk.js\";"));
        assert!(footer.contains("t.parentNode.insertBefore( s, t );"));
        assert!(scripts.queue().is_empty());

        assert!(page.launch_script(&mut scripts, widgets::ONE_SIGNAL).is_empty());
    }

    #[test]
    fn test_content_filters() {
        let optimizer = optimizer(Settings {
            loader_image_url: "/logo.png".into(),
            ..Default::default()
        });
        let mut page = optimizer.page();

        assert!(page.body_open().contains("<img src=\"/logo.png\""));
        assert!(page.head().contains("hidden-loader"));

        let html = "<div id=\"fb-root\"></div><script>(function(d){})(document);</script>";
        let delayed = page.third_party_html(html);
        assert!(delayed.starts_with("<div id=\"fb-root\"></div><script>\n( () => {"));

        let tag = "<link rel='stylesheet' href='https://fonts.googleapis.com/css?family=Inter' />";
        assert!(page.style_tag(tag, "https://fonts.googleapis.com/css?family=Inter").contains("&display=swap"));

        let script = "<script src='/p.js'></script>";
        assert_eq!(page.script_tag(script, passive::HANDLE), "<script src='/p.js' async></script>");

        let slider = "<div></div><script type=\"text/javascript\">_initLayerSlider('#s', {});</script>";
        assert_eq!(page.shortcode("layerslider", slider), "<div></div>");
        assert!(page.print_footer_scripts().contains("<script async type="));
    }
}

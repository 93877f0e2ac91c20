//! Header, footer and delay passes over the script and style queues.
//!
//! The [`Reducer`] holds the configured seed handles and remembers what it
//! moved during the current render, so a single instance must not be shared
//! between requests.
//!
//! Precedence between the three actions of a pass:
//! 1. `block` wins: swept handles are deregistered and never moved or delayed.
//! 2. `delay` wins over `footer`: a handle in both sweeps is only delayed.

use crate::core::Delay;
use crate::deferred::DelayedQueue;
use crate::graph::{DependencyGraph, Sweep};
use crate::registry::{Position, Registry};
use crate::script::ScriptInit;

/// Seed handles configured for each action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seeds {
    pub block: Vec<String>,
    pub footer: Vec<String>,
    pub delay: Vec<String>,
}

impl Seeds {
    pub fn is_empty(&self) -> bool {
        self.block.is_empty() && self.footer.is_empty() && self.delay.is_empty()
    }
}

/// Action sweeps of one pass, already disjoint.
#[derive(Debug, Default)]
pub struct Actions {
    pub block: Sweep,
    pub footer: Sweep,
    pub delay: Sweep,
}

impl Actions {
    pub fn compute(graph: &DependencyGraph, seeds: &Seeds) -> Self {
        let block = graph.closure(&seeds.block);
        let delay = graph.closure(&seeds.delay).without(&block);
        let footer = graph.closure(&seeds.footer).without(&block).without(&delay);

        Self {
            block,
            footer,
            delay,
        }
    }
}

#[derive(Debug, Default)]
pub struct Reducer {
    scripts: Seeds,
    styles: Seeds,
    delay: Delay,
    moved_scripts: Vec<String>,
    delayed_scripts: Vec<String>,
    moved_styles: Vec<String>,
}

impl Reducer {
    /// `styles.delay` is ignored, styles can only be blocked or moved.
    pub fn new(scripts: Seeds, styles: Seeds) -> Self {
        Self {
            scripts,
            styles,
            ..Default::default()
        }
    }

    /// Delay used for scripts handed to the deferred engine.
    pub fn with_delay(mut self, delay: Delay) -> Self {
        self.delay = delay;
        self
    }

    pub fn moved_scripts(&self) -> &[String] {
        &self.moved_scripts
    }

    pub fn delayed_scripts(&self) -> &[String] {
        &self.delayed_scripts
    }

    pub fn moved_styles(&self) -> &[String] {
        &self.moved_styles
    }

    /// Header pass for scripts. Safe to run more than once per render.
    pub fn remove_scripts_from_header<R: Registry + ?Sized>(&mut self, scripts: &mut R) {
        if self.scripts.is_empty() {
            return;
        }

        let graph = DependencyGraph::from_registry(scripts);
        let actions = Actions::compute(&graph, &self.scripts);

        for handle in actions.block.iter() {
            if scripts.is_enqueued(handle) {
                tracing::debug!(handle, "blocking script");
                scripts.deregister(handle);
            }
        }

        for handle in actions.footer.iter() {
            if scripts.is_enqueued(handle) {
                tracing::debug!(handle, "moving script to footer");
                scripts.dequeue(handle);
                push_unique(&mut self.moved_scripts, handle);
            }
        }

        self.take_delayed(scripts, &actions.delay);
    }

    /// Footer pass for scripts: put the moved scripts back into the queue.
    pub fn add_scripts_to_footer<R: Registry + ?Sized>(&mut self, scripts: &mut R) {
        for handle in &self.moved_scripts {
            if scripts.is_registered(handle) {
                scripts.enqueue(handle);
            }
        }
    }

    /// Delay pass. Sweeps again to catch scripts enqueued after the header,
    /// then hands every delayed script to `queue`.
    ///
    /// Returns the inline fragments of the delayed scripts, which have to be
    /// printed right away.
    pub fn delay_scripts<R: Registry + ?Sized>(
        &mut self,
        scripts: &mut R,
        queue: &mut DelayedQueue,
    ) -> String {
        if !self.scripts.delay.is_empty() {
            let graph = DependencyGraph::from_registry(scripts);
            let actions = Actions::compute(&graph, &self.scripts);
            self.take_delayed(scripts, &actions.delay);
        }

        if self.delayed_scripts.is_empty() {
            return String::new();
        }

        let mut html = String::new();

        for handle in scripts.resolve(&self.delayed_scripts) {
            let Some(src) = scripts.get(&handle).and_then(|asset| asset.resolved_src()) else {
                continue;
            };

            html.push_str(&scripts.inline_script(&handle, Position::Before));
            html.push_str(&scripts.inline_script(&handle, Position::After));
            html.push_str(&scripts.extra_script(&handle));

            tracing::debug!(handle = %handle, src = %src, "delaying script");
            scripts.dequeue(&handle);
            queue.store(ScriptInit::new(src), self.delay);
        }

        self.delayed_scripts.clear();
        html
    }

    fn take_delayed<R: Registry + ?Sized>(&mut self, scripts: &mut R, sweep: &Sweep) {
        for handle in sweep.iter() {
            if scripts.is_enqueued(handle) {
                scripts.dequeue(handle);
                push_unique(&mut self.delayed_scripts, handle);
            }
        }
    }

    /// Header pass for styles. Safe to run more than once per render.
    pub fn remove_styles_from_header<R: Registry + ?Sized>(&mut self, styles: &mut R) {
        if self.styles.block.is_empty() && self.styles.footer.is_empty() {
            return;
        }

        let graph = DependencyGraph::from_registry(styles);
        let block = graph.closure(&self.styles.block);
        let footer = graph.closure(&self.styles.footer).without(&block);

        for handle in block.iter() {
            if styles.is_enqueued(handle) {
                tracing::debug!(handle, "blocking style");
                styles.deregister(handle);
            }
        }

        for handle in footer.iter() {
            if styles.is_enqueued(handle) {
                tracing::debug!(handle, "moving style to footer");
                styles.dequeue(handle);
                push_unique(&mut self.moved_styles, handle);
            }
        }
    }

    /// Footer pass for styles.
    pub fn add_styles_to_footer<R: Registry + ?Sized>(&mut self, styles: &mut R) {
        for handle in &self.moved_styles {
            if styles.is_registered(handle) {
                styles.enqueue(handle);
            }
        }
    }
}

const GOOGLE_FONTS: &str = "https://fonts.googleapis.com";

/// Ask Google Fonts for `font-display: swap` by rewriting the `href` of a
/// printed `<link>` tag. Other tags pass through untouched.
pub fn style_loader_tag(tag: &str, href: &str) -> String {
    if !href.starts_with(GOOGLE_FONTS) || href.contains("display=") {
        return tag.to_string();
    }

    let joiner = if href.contains('?') { '&' } else { '?' };
    tag.replace(href, &format!("{href}{joiner}display=swap"))
}

fn push_unique(list: &mut Vec<String>, handle: &str) {
    if !list.iter().any(|h| h == handle) {
        list.push(handle.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::minify::Minifier;
    use crate::registry::{Asset, Dependencies};

    fn seeds(block: &[&str], footer: &[&str], delay: &[&str]) -> Seeds {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Seeds {
            block: list(block),
            footer: list(footer),
            delay: list(delay),
        }
    }

    fn page() -> Dependencies {
        let mut registry = Dependencies::new();
        registry
            .add(Asset::new("jquery", "/jquery.js"))
            .add(Asset::new("ui", "/ui.js").deps(["jquery"]))
            .add(Asset::new("slider", "/slider.js").deps(["ui"]))
            .add(Asset::new("chat", "/chat.js#asyncload").before("window.chatCfg = 1;"))
            .add(Asset::new("likes", "/likes.js"))
            .register(Asset::new("late", "/late.js").deps(["likes"]));
        registry
    }

    #[test]
    fn test_block_sweeps_dependents() {
        let mut scripts = page();
        let mut reducer = Reducer::new(seeds(&["jquery"], &[], &[]), Seeds::default());

        reducer.remove_scripts_from_header(&mut scripts);

        for handle in ["jquery", "ui", "slider"] {
            assert!(!scripts.is_registered(handle));
        }
        assert_eq!(scripts.queue(), ["chat", "likes"]);
    }

    #[test]
    fn test_footer_moves_and_requeues() {
        let mut scripts = page();
        let mut reducer = Reducer::new(seeds(&[], &["ui"], &[]), Seeds::default());

        reducer.remove_scripts_from_header(&mut scripts);
        assert_eq!(scripts.queue(), ["jquery", "chat", "likes"]);
        assert_eq!(reducer.moved_scripts(), ["ui", "slider"]);

        // A second header run must not duplicate anything.
        reducer.remove_scripts_from_header(&mut scripts);
        assert_eq!(reducer.moved_scripts(), ["ui", "slider"]);

        scripts.print_queue();
        reducer.add_scripts_to_footer(&mut scripts);
        assert_eq!(scripts.queue(), ["ui", "slider"]);
    }

    #[test]
    fn test_block_takes_precedence() {
        let mut scripts = page();
        let mut reducer = Reducer::new(seeds(&["ui"], &["jquery"], &["slider"]), Seeds::default());
        let mut queue = DelayedQueue::new();

        reducer.remove_scripts_from_header(&mut scripts);
        assert!(!scripts.is_registered("ui"));
        assert!(!scripts.is_registered("slider"));
        assert_eq!(reducer.moved_scripts(), ["jquery"]);
        assert!(reducer.delayed_scripts().is_empty());

        reducer.add_scripts_to_footer(&mut scripts);
        reducer.delay_scripts(&mut scripts, &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_delay_takes_precedence_over_footer() {
        let mut scripts = page();
        let mut reducer = Reducer::new(seeds(&[], &["likes"], &["likes"]), Seeds::default());

        reducer.remove_scripts_from_header(&mut scripts);
        assert!(reducer.moved_scripts().is_empty());
        assert_eq!(reducer.delayed_scripts(), ["likes"]);
    }

    #[test]
    fn test_delay_pass_stores_scripts() {
        let mut scripts = page();
        let mut reducer = Reducer::new(seeds(&[], &[], &["chat"]), Seeds::default());
        let mut queue = DelayedQueue::new();

        reducer.remove_scripts_from_header(&mut scripts);
        assert!(!scripts.is_enqueued("chat"));

        let inline = reducer.delay_scripts(&mut scripts, &mut queue);
        assert_eq!(
            inline,
            "<script id=\"chat-js-before\">\nwindow.chatCfg = 1;\n</script>\n"
        );
        assert_eq!(queue.len(), 1);

        let html = queue.flush(&Deferred::new(Minifier::PassThrough, true));
        assert!(html.contains("s.src = \"/chat.js\";"));
        assert!(!html.contains("asyncload"));
    }

    #[test]
    fn test_delay_pass_catches_late_enqueues() {
        let mut scripts = page();
        let mut reducer = Reducer::new(seeds(&[], &[], &["likes"]), Seeds::default());
        let mut queue = DelayedQueue::new();

        reducer.remove_scripts_from_header(&mut scripts);
        scripts.print_queue();

        // Enqueued by page content after the header was printed.
        scripts.enqueue("late");

        reducer.delay_scripts(&mut scripts, &mut queue);
        assert!(!scripts.is_enqueued("late"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_empty_seeds_are_a_no_op() {
        let mut scripts = page();
        let mut styles = Dependencies::new();
        styles.add(Asset::new("theme", "/theme.css"));
        let before = scripts.queue().to_vec();

        let mut reducer = Reducer::default();
        let mut queue = DelayedQueue::new();
        reducer.remove_scripts_from_header(&mut scripts);
        reducer.remove_styles_from_header(&mut styles);
        reducer.add_scripts_to_footer(&mut scripts);
        reducer.add_styles_to_footer(&mut styles);
        let html = reducer.delay_scripts(&mut scripts, &mut queue);

        assert_eq!(scripts.queue(), before);
        assert_eq!(styles.queue(), ["theme"]);
        assert!(html.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_styles() {
        let mut styles = Dependencies::new();
        styles
            .add(Asset::new("fonts", "/fonts.css"))
            .add(Asset::new("theme", "/theme.css").deps(["fonts"]))
            .add(Asset::new("emoji", "/emoji.css"))
            .add(Asset::new("print", "/print.css"));

        let mut reducer = Reducer::new(Seeds::default(), seeds(&["emoji"], &["fonts"], &[]));
        reducer.remove_styles_from_header(&mut styles);

        assert!(!styles.is_registered("emoji"));
        assert_eq!(styles.queue(), ["print"]);
        assert_eq!(reducer.moved_styles(), ["fonts", "theme"]);

        reducer.add_styles_to_footer(&mut styles);
        assert_eq!(styles.queue(), ["print", "fonts", "theme"]);
    }

    #[test]
    fn test_style_loader_tag() {
        let href = "https://fonts.googleapis.com/css?family=Roboto";
        let tag = format!("<link rel='stylesheet' href='{href}' media='all' />");
        assert_eq!(
            style_loader_tag(&tag, href),
            "<link rel='stylesheet' href='https://fonts.googleapis.com/css?family=Roboto&display=swap' media='all' />"
        );

        let href = "https://fonts.googleapis.com/css2";
        let tag = format!("<link href='{href}'>");
        assert_eq!(style_loader_tag(&tag, href), "<link href='https://fonts.googleapis.com/css2?display=swap'>");

        let href = "https://fonts.googleapis.com/css?family=Roboto&display=swap";
        let tag = format!("<link href='{href}'>");
        assert_eq!(style_loader_tag(&tag, href), tag);

        let tag = "<link href='/theme.css'>";
        assert_eq!(style_loader_tag(tag, "/theme.css"), tag);
    }

    #[test]
    fn test_actions_are_disjoint() {
        let graph = DependencyGraph::from_registry(&page());
        let actions = Actions::compute(&graph, &seeds(&["ui"], &["jquery"], &["jquery"]));

        assert!(actions.block.contains("slider"));
        assert!(!actions.delay.contains("slider"));
        assert!(actions.delay.contains("jquery"));
        assert!(actions.footer.is_empty());
    }
}

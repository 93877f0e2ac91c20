//! Dependency registry for scripts and styles of one page render.
//!
//! The [`Registry`] trait is the view the reducer has of the host: a mutable
//! oracle over registered handles, their declared dependencies and the output
//! queue. [`Dependencies`] is the in-memory implementation.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Suffix some hosts append to a source URL to mark it for async loading.
pub const ASYNC_MARKER: &str = "#asyncload";

/// One registrable script or style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Asset {
    pub handle: String,
    /// URL or local path; `None` for alias handles that only group
    /// dependencies.
    pub src: Option<String>,
    /// Handles this asset depends on.
    pub deps: Vec<String>,
    /// Inline code printed before the asset.
    pub before: Vec<String>,
    /// Inline code printed after the asset.
    pub after: Vec<String>,
    /// Inline data (e.g. localized variables) printed before the asset.
    pub extra: Option<String>,
}

impl Asset {
    pub fn new(handle: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            src: Some(src.into()),
            ..Default::default()
        }
    }

    pub fn alias(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Default::default()
        }
    }

    pub fn deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn before(mut self, code: impl Into<String>) -> Self {
        self.before.push(code.into());
        self
    }

    pub fn after(mut self, code: impl Into<String>) -> Self {
        self.after.push(code.into());
        self
    }

    pub fn extra(mut self, code: impl Into<String>) -> Self {
        self.extra = Some(code.into());
        self
    }

    /// Source URL with the async marker removed, `None` when empty.
    pub fn resolved_src(&self) -> Option<String> {
        let src = self.src.as_deref()?.replace(ASYNC_MARKER, "");
        (!src.is_empty()).then_some(src)
    }
}

/// Which inline fragment of an asset to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Before,
    After,
}

impl Position {
    fn as_str(self) -> &'static str {
        match self {
            Position::Before => "before",
            Position::After => "after",
        }
    }
}

/// Mutable view of the registered dependency graph.
pub trait Registry {
    /// Every registered asset, in registration order.
    fn registered(&self) -> Vec<&Asset>;

    fn get(&self, handle: &str) -> Option<&Asset>;

    fn is_registered(&self, handle: &str) -> bool {
        self.get(handle).is_some()
    }

    /// Scheduled for output on the current page.
    fn is_enqueued(&self, handle: &str) -> bool;

    /// Already printed on the current page.
    fn is_done(&self, handle: &str) -> bool;

    /// Register an asset. The first registration of a handle wins.
    fn register(&mut self, asset: Asset);

    fn enqueue(&mut self, handle: &str);

    fn dequeue(&mut self, handle: &str);

    /// Forget the asset for the rest of the request.
    fn deregister(&mut self, handle: &str);

    /// Order `handles` so every handle follows its registered dependencies,
    /// pulling in dependencies that are not printed yet.
    fn resolve(&self, handles: &[String]) -> Vec<String> {
        fn visit<R: Registry + ?Sized>(
            registry: &R,
            handle: &str,
            seen: &mut HashSet<String>,
            order: &mut Vec<String>,
        ) {
            if registry.is_done(handle) || !seen.insert(handle.to_string()) {
                return;
            }

            let Some(asset) = registry.get(handle) else {
                return;
            };

            for dep in &asset.deps {
                visit(registry, dep, seen, order);
            }

            order.push(handle.to_string());
        }

        let mut seen = HashSet::new();
        let mut order = Vec::new();

        for handle in handles {
            visit(self, handle, &mut seen, &mut order);
        }

        order
    }

    /// Inline `<script>` printed before or after the asset, empty if none.
    fn inline_script(&self, handle: &str, position: Position) -> String {
        let Some(asset) = self.get(handle) else {
            return String::new();
        };

        let code = match position {
            Position::Before => &asset.before,
            Position::After => &asset.after,
        };

        if code.is_empty() {
            return String::new();
        }

        format!(
            "<script id=\"{}-js-{}\">\n{}\n</script>\n",
            escape_attr(handle),
            position.as_str(),
            code.join("\n")
        )
    }

    /// Inline `<script>` holding the extra data of the asset, empty if none.
    fn extra_script(&self, handle: &str) -> String {
        match self.get(handle).and_then(|asset| asset.extra.as_deref()) {
            Some(extra) if !extra.is_empty() => format!(
                "<script id=\"{}-js-extra\">\n{}\n</script>\n",
                escape_attr(handle),
                extra
            ),
            _ => String::new(),
        }
    }
}

/// In-memory registry.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    order: Vec<String>,
    registered: HashMap<String, Asset>,
    queue: Vec<String>,
    done: HashSet<String>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset. Registering an existing handle is a no-op, the
    /// first registration wins.
    pub fn register(&mut self, asset: Asset) -> &mut Self {
        if !self.registered.contains_key(&asset.handle) {
            self.order.push(asset.handle.clone());
            self.registered.insert(asset.handle.clone(), asset);
        }
        self
    }

    /// Register and enqueue in one step.
    pub fn add(&mut self, asset: Asset) -> &mut Self {
        let handle = asset.handle.clone();
        self.register(asset);
        self.enqueue(&handle);
        self
    }

    /// Handles scheduled for output, in queue order.
    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    /// Empty the queue, marking every queued handle and its pending
    /// dependencies as printed. Returns them in print order.
    pub fn print_queue(&mut self) -> Vec<String> {
        let queue = std::mem::take(&mut self.queue);
        let printed = self.resolve(&queue);
        self.done.extend(printed.iter().cloned());
        printed
    }
}

impl Registry for Dependencies {
    fn registered(&self) -> Vec<&Asset> {
        self.order
            .iter()
            .filter_map(|handle| self.registered.get(handle))
            .collect()
    }

    fn get(&self, handle: &str) -> Option<&Asset> {
        self.registered.get(handle)
    }

    fn is_enqueued(&self, handle: &str) -> bool {
        self.queue.iter().any(|h| h == handle)
    }

    fn is_done(&self, handle: &str) -> bool {
        self.done.contains(handle)
    }

    fn register(&mut self, asset: Asset) {
        Dependencies::register(self, asset);
    }

    fn enqueue(&mut self, handle: &str) {
        if !self.is_enqueued(handle) {
            self.queue.push(handle.to_string());
        }
    }

    fn dequeue(&mut self, handle: &str) {
        self.queue.retain(|h| h != handle);
    }

    fn deregister(&mut self, handle: &str) {
        self.dequeue(handle);
        self.order.retain(|h| h != handle);
        self.registered.remove(handle);
    }
}

/// Escape a value for an HTML attribute.
pub fn escape_attr(value: &str) -> String {
    let mut acc = String::with_capacity(value.len());

    for ch in value.chars() {
        match ch {
            '&' => acc.push_str("&amp;"),
            '"' => acc.push_str("&quot;"),
            '\'' => acc.push_str("&#039;"),
            '<' => acc.push_str("&lt;"),
            '>' => acc.push_str("&gt;"),
            _ => acc.push(ch),
        }
    }

    acc
}

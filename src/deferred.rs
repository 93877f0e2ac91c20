//! Server-side assembly of delayed script blocks.
//!
//! [`Deferred`] wraps an arbitrary JS payload in the state machine modelled
//! by [`crate::client`] and returns a `<script>` element ready to be emitted.
//! [`DelayedQueue`] buffers remote scripts for the current page so scripts
//! sharing a delay end up in a single block.

use std::sync::LazyLock;

use minijinja::{AutoEscape, context};
use regex::Regex;

use crate::client::LISTENERS;
use crate::core::Delay;
use crate::error::{PagespeedError, TemplateError};
use crate::minify::Minifier;
use crate::script::{Placement, ScriptInit};

const TEMPLATE: &str = r#"( () => {
    'use strict';

    let loaded = false,
        scrolled = false,
        timerId;

    function load() {
        if ( loaded ) {
            return;
        }

        loaded = true;
        clearTimeout( timerId );

{% for l in listeners %}
        {{ l.target }}.removeEventListener( '{{ l.event }}', {{ l.handler }} );
{% endfor %}

{{ code }}
    }

    function scrollHandler() {
        if ( ! scrolled ) {
            // Ignore first scroll event, which can be on page load.
            scrolled = true;
            return;
        }

        load();
    }

    window.addEventListener( 'load', function() {
        const delay = {{ delay }};

        if ( delay >= 0 ) {
            timerId = setTimeout( load, delay );

            return;
        }

{% for l in listeners %}
        {{ l.target }}.addEventListener( '{{ l.event }}', {{ l.handler }} );
{% endfor %}
    } );
} )();"#;

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script.*?>(.*?)</script>").expect("valid regex"));

/// Deferred execution engine.
pub struct Deferred {
    env: minijinja::Environment<'static>,
    minifier: Minifier,
    debug: bool,
}

impl Deferred {
    /// With `debug` set the scripts are emitted as assembled, otherwise they
    /// go through `minifier` first.
    pub fn new(minifier: Minifier, debug: bool) -> Self {
        let mut env = minijinja::Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        Self {
            env,
            minifier,
            debug,
        }
    }

    /// Wrap `code` into a delayed `<script>` block.
    pub fn try_create(&self, code: &str, delay: Delay) -> Result<String, PagespeedError> {
        let js = self
            .env
            .render_str(
                TEMPLATE,
                context! {
                    code => code,
                    delay => delay.get(),
                    listeners => LISTENERS,
                },
            )
            .map_err(TemplateError::from)?;

        let js = match self.debug {
            true => js,
            false => self.minifier.minify(&js)?,
        };

        Ok(format!("<script>\n{}\n</script>\n", js.trim_end()))
    }

    /// Wrap `code` into a delayed `<script>` block.
    ///
    /// Assembly failures never reach the page: the error is logged and an
    /// empty string is returned instead.
    pub fn create(&self, code: &str, delay: Delay) -> String {
        match self.try_create(code, delay) {
            Ok(script) => script,
            Err(err) => {
                tracing::warn!(%delay, "dropping delayed script: {err}");
                String::new()
            }
        }
    }

    /// Delayed block which inserts a remote script before the first
    /// `<script>` element of the page.
    pub fn launch(&self, init: &ScriptInit, delay: Delay) -> String {
        self.create(&init.to_js(Placement::BeforeFirstScript), delay)
    }

    /// Collect the bodies of every `<script>` element in `html` into one
    /// delayed block. The block replaces the first element, the others are
    /// removed. HTML without scripts is returned unchanged.
    pub fn launch_html(&self, html: &str, delay: Delay) -> String {
        let bodies: Vec<&str> = SCRIPT_TAG
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|body| body.as_str())
            .collect();

        if bodies.is_empty() {
            return html.to_string();
        }

        let mut block = Some(self.create(&bodies.join("\n"), delay));

        SCRIPT_TAG
            .replace_all(html, |_: &regex::Captures| block.take().unwrap_or_default())
            .into_owned()
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Deferred::new(Minifier::default(), false)
    }
}

/// Remote scripts stored during a page render, grouped by delay.
///
/// Groups keep the order in which their delay was first seen, scripts keep
/// the order in which they were stored.
#[derive(Debug, Default)]
pub struct DelayedQueue {
    groups: Vec<(Delay, Vec<ScriptInit>)>,
}

impl DelayedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, init: ScriptInit, delay: Delay) {
        match self.groups.iter_mut().find(|(d, _)| *d == delay) {
            Some((_, scripts)) => scripts.push(init),
            None => self.groups.push((delay, vec![init])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, scripts)| scripts.len()).sum()
    }

    /// Render one delayed block per group and empty the queue.
    pub fn flush(&mut self, engine: &Deferred) -> String {
        let mut html = String::new();

        for (delay, scripts) in self.groups.drain(..) {
            tracing::debug!(%delay, count = scripts.len(), "launching stored scripts");

            let code = scripts
                .iter()
                .map(|init| init.to_js(Placement::AppendToBody))
                .collect::<Vec<_>>()
                .join("\n");

            html.push_str(&engine.create(&code, delay));
        }

        html
    }
}

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// Where a dynamically created `<script>` element is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Right before the first `<script>` element of the document. The
    /// element is async unless overridden.
    BeforeFirstScript,
    /// At the end of `<body>`. The element is not async unless overridden,
    /// so merged scripts keep their relative order.
    AppendToBody,
}

/// Typed initializer for a remote `<script>` element created in the browser.
///
/// The values are opaque: they are quoted as JS string literals and passed
/// through without validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptInit {
    pub src: String,
    /// Overrides the async flag implied by the [`Placement`].
    #[serde(default, rename = "async", skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
    /// Rendered as `data-*` attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl ScriptInit {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Default::default()
        }
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = Some(is_async);
        self
    }

    /// JS statements creating and inserting the element, wrapped in a block
    /// so several initializers can share one function body.
    pub fn to_js(&self, placement: Placement) -> String {
        let is_async = self.is_async.unwrap_or(placement == Placement::BeforeFirstScript);
        let mut js = String::from("{\n");

        if placement == Placement::BeforeFirstScript {
            js.push_str("    const t = document.getElementsByTagName( 'script' )[0];\n");
        }

        js.push_str("    const s = document.createElement( 'script' );\n");
        js.push_str("    s.type = 'text/javascript';\n");
        let _ = writeln!(js, "    s.src = {};", literal(&self.src));

        for (key, value) in &self.data {
            let _ = writeln!(
                js,
                "    s.setAttribute( {}, {} );",
                literal(&format!("data-{key}")),
                literal(value)
            );
        }

        let _ = writeln!(js, "    s.async = {is_async};");

        match placement {
            Placement::BeforeFirstScript => js.push_str("    t.parentNode.insertBefore( s, t );\n"),
            Placement::AppendToBody => js.push_str("    document.body.appendChild( s );\n"),
        }

        js.push('}');
        js
    }
}

/// Quote a string as a JS string literal.
pub(crate) fn literal(value: &str) -> String {
    // JSON string syntax is a subset of JS string literal syntax. The `<`
    // escape keeps `</script>` from closing the surrounding element.
    serde_json::to_string(value)
        .unwrap_or_else(|_| String::from("\"\""))
        .replace('<', "\\u003c")
}

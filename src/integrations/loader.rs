//! Full-screen loader shown until `DOMContentLoaded`.

use crate::registry::escape_attr;

const STYLE: &str = r#"<style>
    #pagespeed-loader.hidden-loader {
        display: none;
    }

    #pagespeed-loader {
        position: fixed;
        width: 100vw;
        height: 100vh;
        left: 0;
        top: 0;
        background: #fff;
        z-index: 99999;
        text-align: center;
    }

    #pagespeed-loader img {
        position: absolute;
        max-width: 80%;
        top: 50vh;
        left: 50vw;
        transform: translate(-50%, -50%);
        opacity: 0;
        animation: pagespeed-loader-fade-in ease 1s forwards;
    }

    @keyframes pagespeed-loader-fade-in {
        0% { opacity: 0; }
        100% { opacity: 1; }
    }
</style>
<script type="text/javascript">
    document.addEventListener( 'DOMContentLoaded', function() {
        document.getElementById( 'pagespeed-loader' ).classList.add( 'hidden-loader' );
    } );
</script>
"#;

#[derive(Debug, Clone)]
pub struct Loader {
    image_url: String,
}

impl Loader {
    /// `None` when no loader image is configured.
    pub fn new(image_url: &str) -> Option<Self> {
        let image_url = image_url.trim();
        (!image_url.is_empty()).then(|| Self {
            image_url: image_url.to_string(),
        })
    }

    /// Style and script, printed early in `<head>`.
    pub fn head(&self) -> &'static str {
        STYLE
    }

    /// Overlay printed right after `<body>` opens.
    pub fn body_open(&self) -> String {
        // data-skip-lazy keeps lazy-loading plugins away from the image
        format!(
            "<div id=\"pagespeed-loader\">\n    <img src=\"{}\" alt=\"\" data-skip-lazy>\n</div>\n",
            escape_attr(&self.image_url)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader() {
        assert!(Loader::new("  ").is_none());

        let loader = Loader::new(" https://example.com/logo.svg?a=1&b=2 ").unwrap();
        assert!(loader.head().contains("#pagespeed-loader.hidden-loader"));
        assert_eq!(
            loader.body_open(),
            "<div id=\"pagespeed-loader\">\n    <img src=\"https://example.com/logo.svg?a=1&amp;b=2\" alt=\"\" data-skip-lazy>\n</div>\n"
        );
    }
}

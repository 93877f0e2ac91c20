//! Google Maps loader served from the local cache.

use crate::cache::Service;
use crate::core::Environment;
use crate::registry::Asset;
use crate::settings::Settings;

pub const HANDLE: &str = "pagespeed-optimization-google-maps";

/// Stops the maps library from injecting its Roboto stylesheet into `<head>`.
const PREVENT_ROBOTO: &str = r#"<script type="text/javascript">
    var head = document.getElementsByTagName( 'head' )[ 0 ];
    var insertBefore = head.insertBefore;

    head.insertBefore = function( newElement, referenceElement ) {
        if ( newElement.href && newElement.href.indexOf( '//fonts.googleapis.com/css?family=Roboto' ) > -1 ) {
            return;
        }

        insertBefore.call( head, newElement, referenceElement );
    };
</script>
"#;

/// Maps script pointing at the cached copy, `None` without an API key.
pub fn asset(settings: &Settings, env: &Environment) -> Option<Asset> {
    let key = settings.gmap_key.trim();
    if key.is_empty() {
        return None;
    }

    let src = format!("{}?key={key}", env.url(Service::Maps.local_file()));
    Some(Asset::new(HANDLE, src))
}

pub fn prevent_roboto(settings: &Settings) -> &'static str {
    match !settings.gmap_key.trim().is_empty() && settings.prevent_gmap_roboto {
        true => PREVENT_ROBOTO,
        false => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset() {
        let env = Environment::new("https://example.com/plugin", ".");
        assert!(asset(&Settings::default(), &env).is_none());

        let settings = Settings {
            gmap_key: "KEY".into(),
            ..Default::default()
        };
        let asset = asset(&settings, &env).unwrap();
        assert_eq!(asset.handle, HANDLE);
        assert_eq!(asset.src.as_deref(), Some("https://example.com/plugin/cache/gmap.js?key=KEY"));
    }

    #[test]
    fn test_prevent_roboto() {
        let mut settings = Settings {
            gmap_key: "KEY".into(),
            ..Default::default()
        };
        assert!(prevent_roboto(&settings).contains("fonts.googleapis.com/css?family=Roboto"));

        settings.prevent_gmap_roboto = false;
        assert_eq!(prevent_roboto(&settings), "");
        assert_eq!(prevent_roboto(&Settings::default()), "");
    }
}

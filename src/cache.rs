//! Local copies of third-party scripts.
//!
//! Serving analytics and map loaders from the site itself lets them carry
//! the site's own cache headers. The copies are refreshed periodically by
//! the host; a copy is only rewritten when the remote content changed.

use std::fs;

use crate::core::{Environment, Fetch, Hash32};
use crate::error::CacheError;
use crate::settings::Settings;

/// Remote script with a local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Analytics,
    Maps,
    Metrika,
    AdNetwork,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Analytics,
        Service::Maps,
        Service::Metrika,
        Service::AdNetwork,
    ];

    pub fn remote_url(self) -> &'static str {
        match self {
            Service::Analytics => "https://www.google-analytics.com/analytics.js",
            Service::Maps => "https://maps.googleapis.com/maps/api/js",
            Service::Metrika => "https://mc.yandex.ru/metrika/watch.js",
            Service::AdNetwork => "//an.yandex.ru/system/context.js",
        }
    }

    /// Path of the copy relative to the plugin directory.
    pub fn local_file(self) -> &'static str {
        match self {
            Service::Analytics => "cache/ga.js",
            Service::Maps => "cache/gmap.js",
            Service::Metrika => "cache/ya_metrika.js",
            Service::AdNetwork => "cache/ya_an.js",
        }
    }

    /// Setting which enables the service. The ad network has none and is
    /// never refreshed.
    fn key(self, settings: &Settings) -> Option<&str> {
        let key = match self {
            Service::Analytics => &settings.ga_id,
            Service::Maps => &settings.gmap_key,
            Service::Metrika => &settings.ya_metrika_id,
            Service::AdNetwork => return None,
        };

        (!key.is_empty()).then_some(key.as_str())
    }
}

pub struct ScriptCache<'a> {
    env: &'a Environment,
}

impl<'a> ScriptCache<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }

    /// Remote URL to fetch for `service`.
    pub fn source(&self, service: Service, key: &str) -> String {
        let mut url = service.remote_url().to_string();

        if url.starts_with("//") {
            url.insert_str(0, self.env.protocol());
        }

        if service == Service::Maps {
            url.push_str("?key=");
            url.push_str(key);
        }

        url
    }

    /// Refresh every enabled service. Returns the services whose copy was
    /// rewritten; failures are logged and skipped.
    pub fn update_all<F: Fetch + ?Sized>(&self, settings: &Settings, fetch: &F) -> Vec<Service> {
        let mut updated = Vec::new();

        for service in Service::ALL {
            let Some(key) = service.key(settings) else {
                continue;
            };

            match self.update(service, key, fetch) {
                Ok(true) => updated.push(service),
                Ok(false) => {}
                Err(err) => tracing::warn!(?service, "couldn't refresh cached script: {err}"),
            }
        }

        updated
    }

    /// Refresh one copy. Returns `true` when the file was rewritten.
    pub fn update<F: Fetch + ?Sized>(
        &self,
        service: Service,
        key: &str,
        fetch: &F,
    ) -> Result<bool, CacheError> {
        let url = self.source(service, key);
        let content = fetch
            .get(&url, None)
            .map_err(|err| CacheError::Fetch(url.clone(), err))?;

        if content.is_empty() {
            return Err(CacheError::Empty(url));
        }

        let path = self.env.path(service.local_file());

        if let Ok(hash) = Hash32::hash_file(&path)
            && hash == Hash32::hash(&content)
        {
            tracing::debug!(?service, "cached script is up to date");
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)?;
        tracing::info!(?service, %path, "updated cached script");

        Ok(true)
    }

    /// Point every known remote script URL in `html` at its local copy.
    pub fn replace_urls(&self, html: &str) -> String {
        let mut html = html.to_string();

        for service in Service::ALL {
            html = html.replace(service.remote_url(), &self.env.url(service.local_file()));
        }

        html
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::error::FetchError;

    fn env(dir: &tempfile::TempDir) -> Environment {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        Environment::new("https://example.com/plugin", root)
    }

    #[test]
    fn test_source() {
        let env = Environment::default();
        let cache = ScriptCache::new(&env);
        assert_eq!(
            cache.source(Service::Maps, "KEY"),
            "https://maps.googleapis.com/maps/api/js?key=KEY"
        );
        assert_eq!(
            cache.source(Service::AdNetwork, ""),
            "https://an.yandex.ru/system/context.js"
        );
    }

    #[test]
    fn test_update_writes_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let cache = ScriptCache::new(&env);

        let body = RefCell::new(String::from("ga v1"));
        let fetch = |_: &str| -> Result<String, FetchError> { Ok(body.borrow().clone()) };

        assert!(cache.update(Service::Analytics, "UA-1", &fetch).unwrap());
        let path = env.path("cache/ga.js");
        assert_eq!(fs::read_to_string(&path).unwrap(), "ga v1");

        assert!(!cache.update(Service::Analytics, "UA-1", &fetch).unwrap());

        *body.borrow_mut() = String::from("ga v2");
        assert!(cache.update(Service::Analytics, "UA-1", &fetch).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "ga v2");
    }

    #[test]
    fn test_update_errors() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let cache = ScriptCache::new(&env);

        let empty = |_: &str| -> Result<String, FetchError> { Ok(String::new()) };
        assert!(matches!(
            cache.update(Service::Metrika, "1", &empty),
            Err(CacheError::Empty(_))
        ));

        let down = |_: &str| -> Result<String, FetchError> { Err(anyhow::anyhow!("timeout")) };
        assert!(matches!(
            cache.update(Service::Metrika, "1", &down),
            Err(CacheError::Fetch(..))
        ));
        assert!(!env.path("cache/ya_metrika.js").exists());
    }

    #[test]
    fn test_update_all_uses_enabled_services() {
        let dir = tempfile::tempdir().unwrap();
        let env = env(&dir);
        let cache = ScriptCache::new(&env);

        let requested = RefCell::new(Vec::new());
        let fetch = |url: &str| -> Result<String, FetchError> {
            requested.borrow_mut().push(url.to_string());
            Ok(format!("// {url}"))
        };

        let settings = Settings {
            gmap_key: "KEY".into(),
            ya_metrika_id: "42".into(),
            ..Default::default()
        };

        let updated = cache.update_all(&settings, &fetch);
        assert_eq!(updated, [Service::Maps, Service::Metrika]);
        assert_eq!(
            *requested.borrow(),
            [
                "https://maps.googleapis.com/maps/api/js?key=KEY",
                "https://mc.yandex.ru/metrika/watch.js"
            ]
        );
    }

    #[test]
    fn test_replace_urls() {
        let env = Environment::new("https://example.com/plugin", "/srv");
        let cache = ScriptCache::new(&env);
        let html = "ga('https://www.google-analytics.com/analytics.js'); load('//an.yandex.ru/system/context.js');";
        assert_eq!(
            cache.replace_urls(html),
            "ga('https://example.com/plugin/cache/ga.js'); load('https://example.com/plugin/cache/ya_an.js');"
        );
    }
}

use std::fmt::Write;

use crate::cache::Service;
use crate::core::{Delay, Environment};
use crate::deferred::Deferred;
use crate::script::{ScriptInit, literal};
use crate::settings::Settings;

const ADSENSE: &str = "https://pagead2.googlesyndication.com/pagead/js/adsbygoogle.js";
const GTAG: &str = "https://www.googletagmanager.com/gtag/js";
const METRIKA_TAG: &str = "https://mc.yandex.ru/metrika/tag.js";

/// AdSense waits this long after `load`.
pub const ADSENSE_DELAY: Delay = Delay::millis(5000);

/// Tracking snippets configured in the settings.
#[derive(Debug, Clone, Default)]
pub struct Analytics {
    pub adsense_client: String,
    pub ga_id: String,
    pub gtag_id: String,
    pub metrika_id: String,
    pub bounce_rate: Option<u32>,
    pub disable_display_features: bool,
    pub anonymize_ip: bool,
}

impl Analytics {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            adsense_client: settings.gas_id.trim().to_string(),
            ga_id: settings.ga_id.trim().to_string(),
            gtag_id: settings.gtag_id.trim().to_string(),
            metrika_id: settings.ya_metrika_id.trim().to_string(),
            bounce_rate: settings.bounce_rate,
            disable_display_features: settings.disable_display_features,
            anonymize_ip: settings.anonymize_ip,
        }
    }

    /// Every configured snippet. Services without an ID are skipped.
    pub fn render(&self, engine: &Deferred, env: &Environment) -> String {
        let mut html = String::new();

        if !self.adsense_client.is_empty() {
            let init = ScriptInit::new(ADSENSE).data("adClient", &self.adsense_client);
            html.push_str(&engine.launch(&init, ADSENSE_DELAY));
        }

        if !self.ga_id.is_empty() {
            html.push('\n');
            html.push_str(&engine.create(&self.google_analytics(env), Delay::default()));
        }

        if !self.gtag_id.is_empty() {
            html.push_str(&self.gtag(engine));
        }

        if !self.metrika_id.is_empty() {
            html.push_str(&self.metrika(engine));
        }

        html
    }

    /// Classic analytics.js loader, served from the local cache.
    fn google_analytics(&self, env: &Environment) -> String {
        let mut js = String::new();
        let src = env.url(Service::Analytics.local_file());

        js.push_str("(function(i,s,o,g,r,a,m){i['GoogleAnalyticsObject']=r;i[r]=i[r]||function(){\n");
        js.push_str("(i[r].q=i[r].q||[]).push(arguments)},i[r].l=1*new Date();a=s.createElement(o),\n");
        js.push_str("m=s.getElementsByTagName(o)[0];a.async=1;a.src=g;m.parentNode.insertBefore(a,m)\n");
        let _ = writeln!(js, "}})(window,document,'script',{},'ga');", literal(&src));
        let _ = writeln!(js, "ga('create', {}, 'auto');", literal(&self.ga_id));

        if self.disable_display_features {
            js.push_str("ga('set', 'displayFeaturesTask', null);\n");
        }

        if self.anonymize_ip {
            js.push_str("ga('set', 'anonymizeIp', true);\n");
        }

        js.push_str("ga('send', 'pageview');\n");

        if let Some(seconds) = self.bounce_rate {
            let label = literal(&format!("{seconds} seconds"));
            let _ = writeln!(
                js,
                "setTimeout(function(){{ga('send','event','adjusted bounce rate',{label});}},{});",
                u64::from(seconds) * 1000
            );
        }

        js
    }

    /// Global site tag: the library is delayed, the config runs right away
    /// and queues into `dataLayer`.
    fn gtag(&self, engine: &Deferred) -> String {
        let src = format!("{GTAG}?id={}", self.gtag_id);
        let mut html = String::from("\n<!-- Global site tag (gtag.js) -->\n");

        html.push_str(&engine.launch(&ScriptInit::new(src), Delay::default()));
        html.push_str("<script>\n");
        html.push_str("window.dataLayer = window.dataLayer || [];\n");
        html.push_str("function gtag() {\n    dataLayer.push( arguments );\n}\n");
        html.push_str("gtag( 'js', new Date() );\n");
        let _ = writeln!(html, "gtag( 'config', {} );", literal(&self.gtag_id));
        html.push_str("</script>\n");

        html
    }

    fn metrika(&self, engine: &Deferred) -> String {
        let Ok(id) = self.metrika_id.parse::<u64>() else {
            tracing::warn!(id = %self.metrika_id, "ignoring non-numeric Yandex Metrika ID");
            return String::new();
        };

        let mut js = String::new();
        js.push_str("(function(m,e,t,r,i,k,a){m[i]=m[i]||function(){(m[i].a=m[i].a||[]).push(arguments)};\n");
        js.push_str("m[i].l=1*new Date();k=e.createElement(t),a=e.getElementsByTagName(t)[0],k.async=1,k.src=r,a.parentNode.insertBefore(k,a)})\n");
        let _ = writeln!(js, "(window, document, \"script\", {}, \"ym\");", literal(METRIKA_TAG));
        let _ = writeln!(
            js,
            "ym({id}, \"init\", {{ clickmap: true, trackLinks: true, accurateTrackBounce: true }});"
        );

        let mut html = String::from("\n");
        html.push_str(&engine.create(&js, Delay::default()));
        let _ = writeln!(
            html,
            "<noscript><div><img src=\"https://mc.yandex.ru/watch/{id}\" style=\"position:absolute; left:-9999px;\" alt=\"\" /></div></noscript>"
        );

        html
    }
}

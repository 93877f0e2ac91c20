use std::fs;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use pagespeed::registry::escape_attr;
use pagespeed::settings::OPTION_KEY;
use pagespeed::{
    Asset, Dependencies, Environment, MemoryStore, Minifier, OptionStore, Optimizer, PageRender,
    Registry, Settings,
};
use serde::Deserialize;

/// Render the optimized head, body and footer fragments of a page.
#[derive(Parser, Debug)]
#[command(name = "pagespeed", version, about)]
struct Args {
    /// Settings blob in JSON, as kept in the option store.
    #[arg(long)]
    settings: Option<Utf8PathBuf>,

    /// Page description in JSON: assets and content.
    #[arg(long)]
    page: Utf8PathBuf,

    /// Public URL of the plugin directory.
    #[arg(long, default_value = "/wp-content/plugins/pagespeed-optimization")]
    base_url: String,

    /// Plugin directory on disk.
    #[arg(long, default_value = ".")]
    root: Utf8PathBuf,

    /// Pipe delayed scripts through esbuild.
    #[arg(long)]
    minify: bool,

    /// Render as seen by a logged-in user.
    #[arg(long)]
    logged_in: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageFixture {
    /// Enqueued before the header is printed.
    scripts: Vec<Asset>,
    styles: Vec<Asset>,
    /// Enqueued after the header is printed.
    late_scripts: Vec<Asset>,
    content: String,
}

fn main() -> anyhow::Result<()> {
    pagespeed::init_logging()?;

    let args = Args::parse();

    let mut store = MemoryStore::new();
    if let Some(path) = &args.settings {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        store.update_option(OPTION_KEY, raw)?;
    }
    let settings = Settings::load(&store)?;

    let raw = fs::read_to_string(&args.page).with_context(|| format!("reading {}", args.page))?;
    let fixture: PageFixture =
        serde_json::from_str(&raw).with_context(|| format!("decoding {}", args.page))?;

    let mut env = Environment::new(&args.base_url, args.root.clone());
    env.script_debug = !args.minify;

    let minifier = match args.minify {
        true => Minifier::Esbuild,
        false => Minifier::PassThrough,
    };
    let optimizer = Optimizer::with_minifier(settings, env, minifier);

    if !optimizer.is_active(args.logged_in) {
        tracing::info!("optimizer is off for logged-in users");
        println!("{}", fixture.content);
        return Ok(());
    }

    println!("{}", render(&optimizer, fixture));

    Ok(())
}

/// Replay the host hooks over a page in print order.
fn render(optimizer: &Optimizer, fixture: PageFixture) -> String {
    let mut scripts = Dependencies::new();
    let mut styles = Dependencies::new();
    for asset in fixture.scripts {
        scripts.add(asset);
    }
    for asset in fixture.styles {
        styles.add(asset);
    }

    let mut page = optimizer.page();

    page.enqueue_scripts(&mut scripts, &mut styles);

    let mut head = page.head();
    head.push_str(&page.print_scripts(&mut scripts, &mut styles));
    head.push_str(&style_tags(&page, &mut styles));
    head.push_str(&script_tags(&page, &mut scripts));

    let mut body = page.body_open();
    body.push_str(&page.filter_content(&fixture.content));

    for asset in fixture.late_scripts {
        scripts.add(asset);
    }

    page.footer(&mut scripts, &mut styles);

    // Delayed scripts leave the queue before it is printed.
    let mut footer = page.delay_footer_scripts(&mut scripts);
    footer.push_str(&style_tags(&page, &mut styles));
    footer.push_str(&script_tags(&page, &mut scripts));
    footer.push_str(&page.print_footer_scripts());

    tracing::info!(
        moved = page.reducer().moved_scripts().len(),
        styles = page.reducer().moved_styles().len(),
        "page rendered"
    );

    format!("<!-- head -->\n{head}\n<!-- body -->\n{body}\n<!-- footer -->\n{footer}")
}

fn script_tags(page: &PageRender, scripts: &mut Dependencies) -> String {
    let mut html = String::new();

    for handle in scripts.print_queue() {
        let Some(src) = scripts.get(&handle).and_then(Asset::resolved_src) else {
            continue;
        };

        let tag = format!(
            "<script src='{}' id='{}-js'></script>",
            escape_attr(&src),
            escape_attr(&handle)
        );
        html.push_str(&page.script_tag(&tag, &handle));
        html.push('\n');
    }

    html
}

fn style_tags(page: &PageRender, styles: &mut Dependencies) -> String {
    let mut html = String::new();

    for handle in styles.print_queue() {
        let Some(href) = styles.get(&handle).and_then(Asset::resolved_src) else {
            continue;
        };

        let href = escape_attr(&href);
        let tag = format!(
            "<link rel='stylesheet' id='{}-css' href='{href}' media='all' />",
            escape_attr(&handle)
        );
        html.push_str(&page.style_tag(&tag, &href));
        html.push('\n');
    }

    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer(settings: Settings) -> Optimizer {
        let mut env = Environment::new("https://example.com/plugin", ".");
        env.script_debug = true;
        Optimizer::new(settings, env)
    }

    fn fixture(json: &str) -> PageFixture {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_late_delayed_script_is_not_printed() {
        let optimizer = optimizer(Settings {
            delay_scripts: "chat".into(),
            ..Default::default()
        });

        let page = fixture(
            r#"{
                "scripts": [{ "handle": "jquery", "src": "/jquery.js" }],
                "late_scripts": [{ "handle": "chat", "src": "https://chat.example.com/w.js", "deps": ["jquery"] }]
            }"#,
        );

        let html = render(&optimizer, page);
        let footer = &html[html.find("<!-- footer -->").unwrap()..];

        assert!(!footer.contains("id='chat-js'"));
        assert!(footer.contains("s.src = \"https://chat.example.com/w.js\";"));
    }

    #[test]
    fn test_style_href_is_escaped() {
        let optimizer = optimizer(Settings::default());
        let page = optimizer.page();

        let mut styles = Dependencies::new();
        styles.add(Asset::new("theme", "/theme.css?a=1&b='x'"));

        let html = style_tags(&page, &mut styles);
        assert_eq!(
            html,
            "<link rel='stylesheet' id='theme-css' href='/theme.css?a=1&amp;b=&#039;x&#039;' media='all' />\n"
        );
    }
}

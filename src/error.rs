use thiserror::Error;

/// Errors returned by collaborators that fetch remote resources.
pub type FetchError = anyhow::Error;

#[derive(Debug, Error)]
pub enum PagespeedError {
    #[error("Error while assembling a delayed script:\n{0}")]
    Template(#[from] TemplateError),

    #[error("Error while minifying a delayed script:\n{0}")]
    Minify(#[from] MinifyError),

    #[error("Error while reading settings:\n{0}")]
    Settings(#[from] SettingsError),

    #[error("Error while updating the script cache:\n{0}")]
    Cache(#[from] CacheError),
}

/// Errors that can occur when rendering the delayed script template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template error: {0}")]
    Render(#[from] minijinja::Error),
}

/// Errors that can occur when minifying JavaScript.
#[derive(Debug, Error)]
pub enum MinifyError {
    /// An I/O error occurred during process execution.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The Esbuild process returned a non-zero exit code.
    #[error("Esbuild execution failed: {0}")]
    Esbuild(String),

    /// Failed to parse Esbuild output as UTF-8.
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Couldn't read option '{0}' from the store.\n{1}")]
    Store(String, anyhow::Error),

    #[error("Couldn't decode option '{0}'.\n{1}")]
    Decode(String, serde_json::Error),

    #[error("Couldn't encode settings.\n{0}")]
    Encode(serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Couldn't fetch '{0}'.\n{1}")]
    Fetch(String, FetchError),

    #[error("Remote file '{0}' is empty")]
    Empty(String),

    #[error("Couldn't write the cache.\n{0}")]
    Io(#[from] std::io::Error),
}

use std::io::Write;
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;

use crate::error::MinifyError;

/// Minification step applied to assembled delayed scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Minifier {
    /// Emit the script unchanged.
    #[default]
    PassThrough,
    /// Pipe the script through `esbuild --minify`.
    ///
    /// **Note:** This requires the `esbuild` binary to be available in the
    /// system PATH.
    Esbuild,
    /// Pipe the script through an esbuild binary at the given path.
    Command(Utf8PathBuf),
}

impl Minifier {
    pub fn minify(&self, js: &str) -> Result<String, MinifyError> {
        match self {
            Minifier::PassThrough => Ok(js.to_string()),
            Minifier::Esbuild => minify_esbuild("esbuild", js),
            Minifier::Command(program) => minify_esbuild(program.as_str(), js),
        }
    }
}

fn minify_esbuild(program: &str, js: &str) -> Result<String, MinifyError> {
    let mut child = Command::new(program)
        .arg("--loader=js")
        .arg("--minify")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(js.as_bytes())?;
    }

    let output = child.wait_with_output()?;

    if !output.status.success() {
        return Err(MinifyError::Esbuild(String::from_utf8(output.stderr)?));
    }

    Ok(String::from_utf8(output.stdout)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_through() {
        let js = "( () => {\n    console.log( 1 );\n} )();";
        assert_eq!(Minifier::PassThrough.minify(js).unwrap(), js);
    }

    #[test]
    fn test_missing_program() {
        let tmp = tempfile::tempdir().unwrap();
        let program = Utf8PathBuf::from_path_buf(tmp.path().join("esbuild")).unwrap();

        let err = Minifier::Command(program).minify("run();").unwrap_err();
        assert!(matches!(err, MinifyError::Io(_)));
    }
}

//! Command templates.
//!
//! | Placeholder | Value for `src/app/user.rb` |
//! |-------------|-----------------------------|
//! | `{{file}}`  | `src/app/user.rb`           |
//! | `{{ext}}`   | `.rb`                       |
//! | `{{base}}`  | `user.rb`                   |
//! | `{{base0}}` | `user`                      |
//! | `{{dir}}`   | `src/app`                   |
//! | `{{abs}}`   | `<cwd>/src/app/user.rb`     |
//!
//! Values are substituted as-is; quote them in the template if paths may
//! contain spaces.

use camino::{Utf8Path, Utf8PathBuf};

/// A command line with `{{...}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
}

impl Template {
    /// Wraps a template string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Returns the template as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Renders the command for a change to `file`.
    ///
    /// `cwd` resolves `{{abs}}` for relative paths.
    pub fn render(&self, file: &Utf8Path, cwd: &Utf8Path) -> String {
        let ext = file.extension().map(|ext| format!(".{ext}")).unwrap_or_default();
        let base = file.file_name().unwrap_or_default();
        let base0 = file.file_stem().unwrap_or_default();
        let dir = match file.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };
        let abs: Utf8PathBuf = if file.is_absolute() {
            file.to_owned()
        } else {
            cwd.join(file)
        };

        self.raw
            .replace("{{file}}", file.as_str())
            .replace("{{ext}}", &ext)
            .replace("{{base0}}", base0)
            .replace("{{base}}", base)
            .replace("{{dir}}", dir.as_str())
            .replace("{{abs}}", abs.as_str())
    }
}

//! Command-line tokenizing.

use std::fmt;

use crate::error::ExecError;

/// A command string split into argv with shell quoting rules.
///
/// # Examples
///
/// ```
/// use oc_exec::CommandLine;
///
/// let command = CommandLine::parse("ruby -e 'puts 1'")?;
/// assert_eq!(command.program(), "ruby");
/// assert_eq!(command.args(), ["-e", "puts 1"]);
/// # Ok::<(), oc_exec::ExecError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    /// Tokenizes `command`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Parse`] for unbalanced quotes or a command with
    /// no tokens.
    pub fn parse(command: &str) -> Result<Self, ExecError> {
        let argv = shell_words::split(command).map_err(|e| ExecError::parse(command, e))?;
        if argv.is_empty() {
            return Err(ExecError::parse(command, "command is empty"));
        }
        Ok(Self { argv })
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        // `parse` rejects empty argv.
        self.argv.first().map_or("", String::as_str)
    }

    /// Returns the arguments after the program name.
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// Returns the full argv.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::join(&self.argv))
    }
}

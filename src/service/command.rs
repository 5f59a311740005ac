//! Service command description.

use std::path::{Path, PathBuf};

/// Error type for command-line parsing.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// The command line contained no program.
    #[error("Service command is empty")]
    Empty,
}

/// Builder describing the program a service runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ServiceCommand {
    /// Create a command for the given program with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Split a command line on whitespace into a program and its arguments.
    ///
    /// No shell quoting is interpreted.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Empty` if the line holds no program.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut parts = line.split_whitespace();
        let program = parts.next().ok_or(CommandError::Empty)?;
        Ok(Self::new(program).args(parts))
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory of the service process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the arguments.
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory, if set.
    #[must_use]
    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

impl std::fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

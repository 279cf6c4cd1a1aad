//! Output format: human-readable text by default, a single JSON value to
//! stdout with `--json`.

use serde::Serialize;

/// Resolved at each command's entry point from its `--json` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    #[must_use]
    pub const fn resolve(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Serialize `data` and print it as the command's entire stdout output.
    ///
    /// # Errors
    /// Returns an error if `data` cannot be serialized to JSON.
    pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }
}

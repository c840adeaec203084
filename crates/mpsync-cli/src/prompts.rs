//! Console implementations of the engines' prompt surfaces.
//!
//! Flags on the command line preset the answers; anything not preset is
//! asked interactively on stdin. An unreadable stdin (EOF, piped input that
//! ran dry) counts as a dismissed prompt, which the engines already treat
//! as "do nothing" or "all files" per their own contracts.

use std::io::{self, BufRead, Write};

use mpsync_core::clear::ConfirmPrompt;
use mpsync_core::sync::{SyncDirection, SyncPrompter};

/// Prompter backed by the controlling terminal, with optional presets.
#[derive(Debug, Clone, Default)]
pub struct ConsolePrompter {
    preset_filter: Option<String>,
    preset_direction: Option<SyncDirection>,
    assume_yes: bool,
}

impl ConsolePrompter {
    /// Prompter that asks for everything interactively.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset the extension filter, skipping its prompt.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.preset_filter = Some(filter.into());
        self
    }

    /// Preset the sync direction, skipping its pick.
    #[must_use]
    pub const fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.preset_direction = Some(direction);
        self
    }

    /// Answer destructive confirmations with yes.
    #[must_use]
    pub const fn with_assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    fn ask(&self, question: &str) -> Option<String> {
        print!("{question}");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl SyncPrompter for ConsolePrompter {
    fn extension_filter(&self) -> Option<String> {
        if let Some(preset) = &self.preset_filter {
            return Some(preset.clone());
        }
        self.ask("Enter file extension, leave blank for all: ")
    }

    fn direction(&self) -> Option<SyncDirection> {
        if let Some(preset) = self.preset_direction {
            return Some(preset);
        }
        let answer = self.ask("Direction - [f]rom device to local, [t]o device: ")?;
        match answer.to_lowercase().as_str() {
            "f" | "from" => Some(SyncDirection::FromDevice),
            "t" | "to" => Some(SyncDirection::ToDevice),
            _ => None,
        }
    }
}

impl ConfirmPrompt for ConsolePrompter {
    fn confirm_clear(&self) -> bool {
        if self.assume_yes {
            return true;
        }
        self.ask("Do you really wish to delete everything on the device? [y/N] ")
            .is_some_and(|answer| matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_filter_skips_prompt() {
        let prompter = ConsolePrompter::new().with_filter("py");
        assert_eq!(prompter.extension_filter().as_deref(), Some("py"));
    }

    #[test]
    fn test_preset_direction_skips_prompt() {
        let prompter = ConsolePrompter::new().with_direction(SyncDirection::ToDevice);
        assert_eq!(prompter.direction(), Some(SyncDirection::ToDevice));
    }

    #[test]
    fn test_assume_yes_confirms_without_prompt() {
        let prompter = ConsolePrompter::new().with_assume_yes(true);
        assert!(prompter.confirm_clear());
    }
}

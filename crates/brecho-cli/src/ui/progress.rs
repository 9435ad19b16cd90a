//! Spinners for long-running CLI operations.
//!
//! Model loading and intake can take minutes. A spinner is shown on an
//! interactive terminal and suppressed under `--quiet`, `--json` or when
//! stdout is piped.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use super::color::stdout_is_terminal;

/// Progress feedback mode based on output context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Interactive TTY: animated spinner
    Interactive,
    /// Non-TTY or `--quiet`: final messages only
    Quiet,
    /// `--json`: nothing but the JSON document
    Silent,
}

impl ProgressMode {
    pub fn detect(quiet: bool, json: bool) -> Self {
        if json {
            Self::Silent
        } else if quiet || !stdout_is_terminal() {
            Self::Quiet
        } else {
            Self::Interactive
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }

    /// Whether informational lines may be printed.
    pub fn shows_messages(&self) -> bool {
        !matches!(self, Self::Silent)
    }
}

/// Spinner tick characters (Braille-based).
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// An indeterminate spinner wrapping indicatif.
pub struct Progress {
    bar: ProgressBar,
    mode: ProgressMode,
}

impl Progress {
    pub fn spinner(message: &str, mode: ProgressMode) -> Self {
        let bar = if mode.is_interactive() {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(SPINNER_CHARS);
            pb.set_style(style);
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        } else {
            ProgressBar::hidden()
        };

        Self { bar, mode }
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Clear the spinner and print `message` unless silent.
    pub fn finish_with_message(&self, message: &str) {
        self.bar.finish_and_clear();
        if self.mode.shows_messages() && !message.is_empty() {
            println!("{}", message);
        }
    }

    pub fn finish_clear(&self) {
        self.bar.finish_and_clear();
    }

    pub fn elapsed(&self) -> Duration {
        self.bar.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_is_silent() {
        assert_eq!(ProgressMode::detect(false, true), ProgressMode::Silent);
        assert_eq!(ProgressMode::detect(true, true), ProgressMode::Silent);
        assert!(!ProgressMode::Silent.shows_messages());
    }

    #[test]
    fn test_quiet_is_never_interactive() {
        assert_eq!(ProgressMode::detect(true, false), ProgressMode::Quiet);
        assert!(ProgressMode::Quiet.shows_messages());
    }

    #[test]
    fn test_hidden_spinner_outside_terminal() {
        let progress = Progress::spinner("Loading model", ProgressMode::Quiet);
        progress.set_message("still loading");
        progress.finish_clear();
    }
}

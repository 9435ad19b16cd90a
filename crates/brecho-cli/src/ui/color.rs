//! Terminal capabilities: whether to color, how wide to draw.

use std::io::IsTerminal;

use clap::ValueEnum;

/// `--color` values. `auto` honors `NO_COLOR` (https://no-color.org/).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    Always,
    Never,
    #[default]
    Auto,
}

impl ColorMode {
    pub fn is_enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::env::var_os("NO_COLOR").is_none() && stdout_is_terminal(),
        }
    }
}

pub fn stdout_is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Columns available for tables; 100 when stdout is not a terminal.
pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(width, _)| usize::from(width.0))
        .unwrap_or(100)
}

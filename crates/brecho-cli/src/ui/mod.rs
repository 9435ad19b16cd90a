//! # CLI UI Module
//!
//! Styling and formatting for `brecho` terminal output.
//!
//! Human output is colored (respecting `NO_COLOR` and `--color`) and uses
//! tables for neighbors and proposals; every data command also has a
//! `--json` mode that prints the raw result and nothing else.
//!
//! ## Module Structure
//!
//! - `color`: Color mode detection and terminal capability checks
//! - `style`: Message prefixes and value styling
//! - `format`: Small formatters (durations, prices, truncation)
//! - `table`: Neighbor, proposal and descriptor tables
//! - `progress`: Spinners for model loading and intake

pub mod color;
pub mod format;
pub mod progress;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use progress::{Progress, ProgressMode};
pub use style::{MessageType, Style};

//! Common constants used throughout brecho-core.

// ============================================================================
// Directory Names
// ============================================================================

/// The name of the global Brecho directory, located at `~/.brecho/`.
pub const BRECHO_HOME_DIR: &str = ".brecho";

/// Global configuration file name inside [`BRECHO_HOME_DIR`].
pub const GLOBAL_CONFIG_FILENAME: &str = "config.yaml";

/// Default vector index directory inside [`BRECHO_HOME_DIR`].
pub const INDEX_DIR: &str = "vectordb";

// ============================================================================
// Environment Variables
// ============================================================================

/// Overrides the global config path.
pub const BRECHO_CONFIG_ENV: &str = "BRECHO_CONFIG";

// ============================================================================
// Intake
// ============================================================================

/// Length of the provisional SKU handed out by intake.
pub const SKU_LENGTH: usize = 8;

/// Luminance at or below which a view counts as dark (0-255 scale).
pub const BRIGHTNESS_THRESHOLD: u32 = 127;

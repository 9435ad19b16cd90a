//! Shared test utilities for brecho-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use image::{ImageFormat, Rgb, RgbImage};

/// Get a Command for the brecho binary.
///
/// # Panics
///
/// Panics if the brecho binary cannot be found.
#[allow(deprecated)]
pub fn brecho_cmd() -> Command {
    let mut cmd = Command::cargo_bin("brecho").expect("brecho binary should exist");
    cmd.env_remove("BRECHO_CONFIG")
        .env_remove("BRECHO_DEVICE")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// Write a config with the histogram model, an index under `dir` and an
/// oracle on a closed port, so intake always takes the fallback branch.
pub fn write_test_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    let yaml = format!(
        "embedding:\n  provider: histogram\nindex:\n  path: {}\n  backend: simple\noracle:\n  baseUrl: http://127.0.0.1:9\n{}",
        dir.join("vectordb").display(),
        extra
    );
    fs::write(&path, yaml).expect("write config");
    path
}

/// Write a solid-color PNG photo.
pub fn write_photo(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    let mut bytes = Vec::new();
    RgbImage::from_pixel(24, 32, Rgb(rgb))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    fs::write(&path, bytes).expect("write photo");
    path
}

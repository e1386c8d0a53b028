//! adb helpers for pulling partitions from a connected device

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Thin wrapper around the `adb` binary
#[derive(Debug, Clone)]
pub struct Adb {
    binary: String,
}

impl Adb {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Current device state as reported by `adb get-state` (e.g. "device")
    pub fn get_state(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("get-state")
            .output()
            .with_context(|| format!("Failed to execute {} get-state", self.binary))?;

        if !output.status.success() {
            anyhow::bail!(
                "adb get-state failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let state = String::from_utf8(output.stdout)
            .context("Invalid UTF-8 in device state")?
            .trim()
            .to_string();

        Ok(state)
    }

    /// Fail unless exactly one device is attached and usable
    pub fn ensure_device(&self) -> Result<()> {
        let state = self.get_state()?;
        if state != "device" {
            anyhow::bail!("Device is not ready (state: {})", state);
        }
        Ok(())
    }

    /// Pull a path from the device into a local directory
    pub fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        log::info!("Pulling {} into {}", remote, local.display());

        let output = Command::new(&self.binary)
            .arg("pull")
            .arg("-a")
            .arg(remote)
            .arg(local)
            .output()
            .with_context(|| format!("Failed to execute {} pull", self.binary))?;

        if !output.status.success() {
            anyhow::bail!(
                "adb pull {} failed: {}",
                remote,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

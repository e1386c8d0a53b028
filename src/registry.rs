//! File name pattern to extraction handler mapping
//!
//! Built once from the `--pixel-factory`, `--pixel-firmware` and
//! `--star-firmware` flags. The same pattern may be given to several flags;
//! its handlers then accumulate in flag order and all of them run when a
//! file matches.

use anyhow::{Context, Result};
use regex::Regex;

use crate::handlers::ExtractHandler;

/// One registered pattern and the handlers attached to it
#[derive(Debug, Clone)]
struct RegistryEntry {
    pattern: String,
    regex: Regex,
    handlers: Vec<ExtractHandler>,
}

/// Immutable, insertion-ordered pattern to handler mapping
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    entries: Vec<RegistryEntry>,
}

impl HandlerRegistry {
    /// Build the registry from the three optional pattern lists
    ///
    /// `None` means the flag was not given. `Some` with no patterns selects
    /// the handler's built-in default pattern.
    pub fn build(
        pixel_factory: Option<Vec<String>>,
        pixel_firmware: Option<Vec<String>>,
        star_firmware: Option<Vec<String>>,
    ) -> Result<Self> {
        let mut builder = RegistryBuilder::default();

        let families = [
            (pixel_factory, ExtractHandler::PixelFactoryImage),
            (pixel_firmware, ExtractHandler::PixelFirmware),
            (star_firmware, ExtractHandler::StarFirmware),
        ];

        for (patterns, handler) in families {
            let Some(patterns) = patterns else {
                continue;
            };

            let patterns = if patterns.is_empty() {
                vec![handler.default_pattern().to_string()]
            } else {
                patterns
            };

            for pattern in patterns {
                builder.register(pattern, handler)?;
            }
        }

        Ok(builder.finish())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Handlers registered under exactly this pattern string
    pub fn get(&self, pattern: &str) -> Option<&[ExtractHandler]> {
        self.entries
            .iter()
            .find(|e| e.pattern == pattern)
            .map(|e| e.handlers.as_slice())
    }

    /// Registered patterns in insertion order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pattern.as_str())
    }

    /// Whether any pattern matches the whole file name
    pub fn matches(&self, file_name: &str) -> bool {
        self.entries.iter().any(|e| e.regex.is_match(file_name))
    }

    /// Every handler to run for a file name, in registry order
    pub fn handlers_for(&self, file_name: &str) -> Vec<ExtractHandler> {
        self.entries
            .iter()
            .filter(|e| e.regex.is_match(file_name))
            .flat_map(|e| e.handlers.iter().copied())
            .collect()
    }
}

#[derive(Default)]
struct RegistryBuilder {
    entries: Vec<RegistryEntry>,
}

impl RegistryBuilder {
    fn register(&mut self, pattern: String, handler: ExtractHandler) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.pattern == pattern) {
            entry.handlers.push(handler);
            return Ok(());
        }

        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .with_context(|| format!("Invalid file pattern '{}'", pattern))?;

        log::debug!("Registered pattern '{}' for {}", pattern, handler);
        self.entries.push(RegistryEntry {
            pattern,
            regex,
            handlers: vec![handler],
        });

        Ok(())
    }

    fn finish(self) -> HandlerRegistry {
        HandlerRegistry {
            entries: self.entries,
        }
    }
}

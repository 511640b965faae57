//! # Barcode Scan Decoder
//!
//! Hardware scanners present themselves as keyboards: they "type" the code
//! and press Enter, all within a few milliseconds. The decoder watches the
//! timing between keystrokes on the shared key stream and emits a scan only
//! for bursts fast enough to have come from a scanner.
//!
//! ## Decoding Rules
//! ```text
//! key-down at t
//!     │
//!     ├── t - last > max_gap ?  ──► discard buffer
//!     │
//!     ├── Enter        ──► emit buffer (if non-empty), clear
//!     ├── Char(c)      ──► append c, last = t
//!     └── Named(_)     ──► ignored (no append, last unchanged)
//! ```
//!
//! Time is passed in by the caller so the decoder stays deterministic.

use std::time::{Duration, Instant};

use crate::DEFAULT_SCAN_GAP_MS;

/// A key-down event as seen by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Enter,
    /// A key that produces a character.
    Char(char),
    /// A key without a character (`Shift`, `Tab`, `ArrowLeft`, ...).
    Named(String),
}

impl Key {
    /// Maps a DOM-style key name (`"Enter"`, `"a"`, `"Shift"`) to a key.
    pub fn from_name(name: &str) -> Self {
        if name == "Enter" {
            return Key::Enter;
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Key::Char(c),
            _ => Key::Named(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Longest pause between two keystrokes of the same scan.
    pub max_gap: Duration,
}

impl ScanConfig {
    pub fn with_max_gap_ms(ms: u64) -> Self {
        ScanConfig {
            max_gap: Duration::from_millis(ms),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig::with_max_gap_ms(DEFAULT_SCAN_GAP_MS)
    }
}

/// Accumulates fast keystroke bursts into barcodes.
#[derive(Debug, Clone, Default)]
pub struct ScanDecoder {
    config: ScanConfig,
    buffer: String,
    last_keystroke: Option<Instant>,
}

impl ScanDecoder {
    pub fn new(config: ScanConfig) -> Self {
        ScanDecoder {
            config,
            buffer: String::new(),
            last_keystroke: None,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Feeds one key-down observed at `at`; returns a barcode when a burst
    /// completes with Enter.
    pub fn feed(&mut self, key: &Key, at: Instant) -> Option<String> {
        if let Some(last) = self.last_keystroke {
            if at.saturating_duration_since(last) > self.config.max_gap {
                self.reset();
            }
        }

        match key {
            Key::Enter => {
                self.last_keystroke = None;
                if self.buffer.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.buffer))
                }
            }
            Key::Char(c) => {
                self.buffer.push(*c);
                self.last_keystroke = Some(at);
                None
            }
            Key::Named(_) => None,
        }
    }

    /// Normalizes a manually entered barcode. Blank input yields nothing.
    pub fn submit_manual(input: &str) -> Option<String> {
        let trimmed = input.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Drops any partially accumulated burst.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_keystroke = None;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

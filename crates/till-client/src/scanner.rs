//! # Barcode Scanner
//!
//! Runs a [`ScanDecoder`] over a live keyboard stream.
//!
//! A [`KeyboardEvents`] source broadcasts timestamped key-downs. Activating
//! the [`BarcodeScanner`] subscribes a decoder task and returns a
//! [`ScannerSession`]; dropping the session unsubscribes. Hardware scans
//! and manual entries arrive on the same [`ScanEvent`] channel.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use till_core::{Key, ScanConfig, ScanDecoder};

// =============================================================================
// Keyboard Source
// =============================================================================

/// One key-down with the time it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub at: Instant,
}

impl KeyEvent {
    pub fn now(key: Key) -> Self {
        KeyEvent {
            key,
            at: Instant::now(),
        }
    }
}

/// Broadcast source of key events.
#[derive(Debug, Clone)]
pub struct KeyboardEvents {
    tx: broadcast::Sender<KeyEvent>,
}

impl KeyboardEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        KeyboardEvents { tx }
    }

    /// Publishes an event. Returns how many listeners got it.
    pub fn send(&self, event: KeyEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Publishes `key` stamped with the current time.
    pub fn press(&self, key: Key) -> usize {
        self.send(KeyEvent::now(key))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeyEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for KeyboardEvents {
    fn default() -> Self {
        KeyboardEvents::new(256)
    }
}

// =============================================================================
// Scan Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Hardware,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub barcode: String,
    pub source: ScanSource,
}

// =============================================================================
// Barcode Scanner
// =============================================================================

pub struct BarcodeScanner {
    keyboard: KeyboardEvents,
    config: ScanConfig,
    events_tx: mpsc::Sender<ScanEvent>,
}

impl BarcodeScanner {
    /// Creates the scanner and the receiving end of its scan events.
    pub fn new(keyboard: KeyboardEvents, config: ScanConfig) -> (Self, mpsc::Receiver<ScanEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let scanner = BarcodeScanner {
            keyboard,
            config,
            events_tx,
        };
        (scanner, events_rx)
    }

    /// Starts decoding the keyboard stream. Each activation gets a fresh
    /// decoder.
    pub fn activate(&self) -> ScannerSession {
        let keys = self.keyboard.subscribe();
        let decoder = ScanDecoder::new(self.config);
        let task = tokio::spawn(decode_keys(keys, decoder, self.events_tx.clone()));
        debug!(max_gap = ?self.config.max_gap, "Scanner activated");
        ScannerSession { task: Some(task) }
    }

    /// Emits typed-in input as a scan, active session or not.
    ///
    /// Returns false when the input is blank or nobody is receiving.
    pub async fn submit_manual(&self, input: &str) -> bool {
        let Some(barcode) = ScanDecoder::submit_manual(input) else {
            return false;
        };

        let event = ScanEvent {
            barcode,
            source: ScanSource::Manual,
        };
        if self.events_tx.send(event).await.is_err() {
            warn!("Scan receiver dropped, manual entry lost");
            return false;
        }
        true
    }
}

async fn decode_keys(
    mut keys: broadcast::Receiver<KeyEvent>,
    mut decoder: ScanDecoder,
    events_tx: mpsc::Sender<ScanEvent>,
) {
    loop {
        let event = match keys.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // A burst with missing characters is not a scan
                warn!(skipped, "Scanner fell behind the keyboard, dropping buffer");
                decoder.reset();
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Some(barcode) = decoder.feed(&event.key, event.at.into_std()) {
            debug!(barcode = %barcode, "Hardware scan decoded");
            let scan = ScanEvent {
                barcode,
                source: ScanSource::Hardware,
            };
            if events_tx.send(scan).await.is_err() {
                break;
            }
        }
    }
}

/// Guard for an active scanner. Dropping it deactivates the scanner.
pub struct ScannerSession {
    task: Option<JoinHandle<()>>,
}

impl ScannerSession {
    /// Deactivates and waits until the keyboard subscription is released.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        debug!("Scanner deactivated");
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! Terminal key input.
//!
//! On a terminal the register reads raw key presses so a USB scanner's
//! burst keeps its timing. Every press goes to [`KeyboardEvents`], where the
//! scanner session decodes bursts. Lines typed by hand come back as
//! [`InputEvent::Line`] for manual entry.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use till_client::{KeyEvent, KeyboardEvents};
use till_core::{Key, ScanConfig, ScanDecoder};

/// How often the reader checks whether it should stop.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Input for the register's main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A line entered by hand.
    Line(String),
    /// Ctrl+C while the terminal is in raw mode.
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Press(Key),
    Interrupt,
}

/// Maps a terminal key event. Repeats and releases are ignored.
pub fn translate(event: &event::KeyEvent) -> Option<KeyAction> {
    if event.kind != KeyEventKind::Press {
        return None;
    }

    let control = event.modifiers.contains(KeyModifiers::CONTROL);
    let key = match event.code {
        KeyCode::Char('c') if control => return Some(KeyAction::Interrupt),
        KeyCode::Char(_) if control => return None,
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        other => Key::from_name(&format!("{other:?}")),
    };
    Some(KeyAction::Press(key))
}

// =============================================================================
// Key Input
// =============================================================================

/// Publishes key presses and assembles hand-typed lines.
///
/// A line that ends in a scanner burst is left to the scanner session, so a
/// scan is never reported twice.
pub struct KeyInput {
    keyboard: KeyboardEvents,
    bursts: ScanDecoder,
    line: String,
}

impl KeyInput {
    pub fn new(keyboard: KeyboardEvents, config: ScanConfig) -> Self {
        KeyInput {
            keyboard,
            bursts: ScanDecoder::new(config),
            line: String::new(),
        }
    }

    /// Handles one press. Returns the line when Enter completes one that
    /// was typed by hand.
    pub fn handle(&mut self, event: KeyEvent) -> Option<String> {
        let burst = self.bursts.feed(&event.key, event.at.into_std());
        let key = event.key.clone();
        self.keyboard.send(event);

        match key {
            Key::Enter => {
                let line = std::mem::take(&mut self.line);
                if let Some(barcode) = burst {
                    debug!(%barcode, "Line was a scanner burst");
                    return None;
                }
                (!line.trim().is_empty()).then_some(line)
            }
            Key::Char(c) => {
                self.line.push(c);
                None
            }
            Key::Named(name) if name == "Backspace" => {
                self.line.pop();
                None
            }
            Key::Named(_) => None,
        }
    }
}

// =============================================================================
// Terminal Reader
// =============================================================================

/// Restores the terminal when dropped.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "Failed to restore the terminal");
        }
    }
}

/// Background reader of raw terminal keys.
pub struct TerminalReader {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TerminalReader {
    pub fn spawn(input: KeyInput, events: mpsc::Sender<InputEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let task = {
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || read_terminal(input, events, stop))
        };
        TerminalReader { stop, task }
    }

    /// Stops reading and waits until the terminal is restored.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Terminal reader failed");
        }
    }
}

fn read_terminal(mut input: KeyInput, events: mpsc::Sender<InputEvent>, stop: Arc<AtomicBool>) {
    let _raw = match RawMode::enable() {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Could not read raw keys from the terminal");
            return;
        }
    };

    while !stop.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(error = %e, "Terminal input failed");
                break;
            }
        }

        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Terminal input failed");
                break;
            }
        };

        let key = match translate(&key) {
            Some(KeyAction::Press(key)) => key,
            Some(KeyAction::Interrupt) => {
                let _ = events.blocking_send(InputEvent::Interrupt);
                break;
            }
            None => continue,
        };

        echo(&key);
        if let Some(line) = input.handle(KeyEvent::now(key)) {
            if events.blocking_send(InputEvent::Line(line)).is_err() {
                break;
            }
        }
    }
}

/// Raw mode turns the terminal's own echo off.
fn echo(key: &Key) {
    let mut out = io::stdout().lock();
    let _ = match key {
        Key::Enter => out.write_all(b"\r\n"),
        Key::Char(c) => write!(out, "{c}"),
        Key::Named(name) if name == "Backspace" => out.write_all(b"\x08 \x08"),
        Key::Named(_) => Ok(()),
    };
    let _ = out.flush();
}

/// Log writer for raw mode, where `\n` alone no longer returns the carriage.
pub struct RawModeWriter;

impl Write for RawModeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = io::stdout().lock();
        for chunk in buf.split_inclusive(|b| *b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(text) => {
                    out.write_all(text)?;
                    out.write_all(b"\r\n")?;
                }
                None => out.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

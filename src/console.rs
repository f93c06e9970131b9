//! Console redirection for the remote-console sub-engine (RoutineControl 0xF000).
//!
//! [`CaptureGuard`] swaps the process console sink for an in-memory capture buffer and
//! restores the previous sink on `Drop`, so restoration happens on every exit path — including
//! a panic unwinding through the handler.

/// Destination for console output. The real implementation writes to stdout; tests and the
/// remote-console capture both swap in their own sink.
pub trait ConsoleSink: Send {
    /// Writes raw bytes to the sink.
    fn write_bytes(&mut self, data: &[u8]);
}

/// Writes straight to stdout, unbuffered line-by-line.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write_bytes(&mut self, data: &[u8]) {
        use std::io::Write;
        let _ = std::io::stdout().write_all(data);
    }
}

/// Default capture size for remote-console output (bytes).
pub const CAPTURE_BUFFER_SIZE: usize = 4000;

/// Margin below [`CAPTURE_BUFFER_SIZE`] at which further writes are truncated.
const TRUNCATE_MARKER: &[u8] = b"[TRUNCATED]";

/// Fixed-size capture sink used while a remote-console command runs.
#[derive(Debug, Default)]
pub struct CaptureSink {
    buf: Vec<u8>,
    overflow: bool,
}

impl CaptureSink {
    /// Builds an empty capture sink.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(CAPTURE_BUFFER_SIZE),
            overflow: false,
        }
    }

    /// The captured bytes so far.
    pub fn captured(&self) -> &[u8] {
        &self.buf
    }

    /// True once the buffer has been truncated.
    pub fn overflowed(&self) -> bool {
        self.overflow
    }
}

impl ConsoleSink for CaptureSink {
    fn write_bytes(&mut self, data: &[u8]) {
        if self.overflow {
            return;
        }
        let budget = CAPTURE_BUFFER_SIZE.saturating_sub(TRUNCATE_MARKER.len());
        if self.buf.len() + data.len() > budget {
            let remaining = budget.saturating_sub(self.buf.len());
            self.buf.extend_from_slice(&data[..remaining.min(data.len())]);
            self.buf.extend_from_slice(TRUNCATE_MARKER);
            self.overflow = true;
        } else {
            self.buf.extend_from_slice(data);
        }
    }
}

/// Swaps in a [`CaptureSink`] for the lifetime of the guard, restoring the previous sink
/// (whatever it was) on drop. The capture sink itself is owned by the guard (not the slot)
/// so callers can read it back without downcasting a trait object.
pub struct CaptureGuard<'a> {
    slot: &'a mut Box<dyn ConsoleSink>,
    capture: CaptureSink,
    previous: Option<Box<dyn ConsoleSink>>,
}

impl<'a> CaptureGuard<'a> {
    /// Redirects `slot` to a fresh capture sink, stashing the previous sink for restoration.
    /// Writes made through `slot` while the guard is alive are lost (the slot's contents are
    /// swapped back on drop); use [`Self::record`] to feed output into the capture instead.
    pub fn install(slot: &'a mut Box<dyn ConsoleSink>) -> Self {
        let previous = std::mem::replace(slot, Box::new(StdoutSink));
        Self {
            slot,
            capture: CaptureSink::new(),
            previous: Some(previous),
        }
    }

    /// Writes bytes into the capture buffer (what the redirected console sees).
    pub fn record(&mut self, data: &[u8]) {
        self.capture.write_bytes(data);
    }

    /// The bytes captured so far.
    pub fn captured(&self) -> &[u8] {
        self.capture.captured()
    }

    /// True if the capture buffer has overflowed and was truncated.
    pub fn overflowed(&self) -> bool {
        self.capture.overflowed()
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.slot = previous;
        }
    }
}

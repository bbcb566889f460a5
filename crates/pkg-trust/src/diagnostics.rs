//! Process-wide diagnostic channel of the verification engine.
//!
//! The engine reports *why* a check failed only as free-text messages on a
//! single channel shared by the whole process. Every operation that drives
//! the engine or the trust store holds a [`DiagnosticGuard`] for its whole
//! duration. The guard owns the channel lock, so no two operations anywhere
//! in the process can redirect or read the channel at the same time.
//!
//! Two flavours exist:
//!
//! - [`DiagnosticGuard::forwarding`] routes messages into `tracing`
//! - [`DiagnosticGuard::capturing`] collects messages as ordered lines
//!
//! Dropping the guard restores the default sink and the level that was in
//! effect when the guard was acquired, then releases the lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Serializes all users of the channel.
static CHANNEL_LOCK: Mutex<()> = Mutex::new(());

/// Current sink and level. Locked only for the duration of a single call.
static CHANNEL: Mutex<ChannelState> = Mutex::new(ChannelState {
    level: DiagnosticLevel::Warning,
    sink: Sink::Forward,
});

/// Severity of a diagnostic message, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

#[derive(Debug)]
struct ChannelState {
    /// Least severe level that still gets through.
    level: DiagnosticLevel,
    sink: Sink,
}

#[derive(Debug)]
enum Sink {
    Forward,
    Capture(Vec<String>),
}

fn channel() -> MutexGuard<'static, ChannelState> {
    CHANNEL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive access to the diagnostic channel.
///
/// Holding a guard is the capability required by every call that invokes
/// the verification engine or the trust store.
#[derive(Debug)]
#[must_use = "the channel is released as soon as the guard is dropped"]
pub struct DiagnosticGuard {
    restore_level: DiagnosticLevel,
    // Declared last so it is released after `Drop::drop` restored the state.
    _lock: MutexGuard<'static, ()>,
}

impl DiagnosticGuard {
    /// Acquire the channel and forward every message into `tracing`.
    pub fn forwarding() -> Self {
        Self::acquire(Sink::Forward, Some(DiagnosticLevel::Debug))
    }

    /// Acquire the channel and collect messages as lines.
    ///
    /// The level is left untouched; raise it with [`Self::set_level`] when
    /// informational messages are needed.
    pub fn capturing() -> Self {
        Self::acquire(Sink::Capture(Vec::new()), None)
    }

    fn acquire(sink: Sink, level: Option<DiagnosticLevel>) -> Self {
        let lock = CHANNEL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let mut state = channel();
        let restore_level = state.level;
        state.sink = sink;
        if let Some(level) = level {
            state.level = level;
        }
        drop(state);

        Self {
            restore_level,
            _lock: lock,
        }
    }

    /// Current channel level.
    pub fn level(&self) -> DiagnosticLevel {
        channel().level
    }

    /// Set the channel level, returning the previous one.
    pub fn set_level(&self, level: DiagnosticLevel) -> DiagnosticLevel {
        std::mem::replace(&mut channel().level, level)
    }

    /// Emit a message on the channel.
    ///
    /// Messages less severe than the channel level are dropped. A single
    /// trailing newline is stripped.
    pub fn emit(&self, level: DiagnosticLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        let message = message.strip_suffix('\n').unwrap_or(message);

        let mut state = channel();
        if level > state.level {
            return;
        }

        match &mut state.sink {
            Sink::Capture(lines) => lines.push(message.to_string()),
            Sink::Forward => forward(level, message),
        }
    }

    /// Take the lines captured so far.
    ///
    /// Always empty for a forwarding guard.
    pub fn take_lines(&self) -> Vec<String> {
        match &mut channel().sink {
            Sink::Capture(lines) => std::mem::take(lines),
            Sink::Forward => Vec::new(),
        }
    }
}

impl Drop for DiagnosticGuard {
    fn drop(&mut self) {
        let mut state = channel();
        state.sink = Sink::Forward;
        state.level = self.restore_level;
    }
}

fn forward(level: DiagnosticLevel, message: &str) {
    match level {
        DiagnosticLevel::Emergency
        | DiagnosticLevel::Alert
        | DiagnosticLevel::Critical
        | DiagnosticLevel::Error => tracing::error!("[engine] {}", message),
        DiagnosticLevel::Warning => tracing::warn!("[engine] {}", message),
        DiagnosticLevel::Notice | DiagnosticLevel::Info => tracing::info!("[engine] {}", message),
        // engine debug output is very low level
        DiagnosticLevel::Debug => tracing::trace!("[engine] {}", message),
    }
}

//! Raw-terminal acquisition with guaranteed restore.
//!
//! Interactive forwarding needs stdin in raw mode: no line buffering, no
//! local echo. The original mode must come back on every exit path,
//! including error returns and signal-driven cancellation, so acquisition
//! is scoped: [`RawModeGuard::enter`] flips the mode and the guard
//! restores it on drop.

use std::io::{self, IsTerminal};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Scoped raw-mode acquisition for the process's stdin.
///
/// When stdin is not a terminal (piped input, CI, a non-interactive host)
/// the guard is inert: `enter` succeeds and restore does nothing.
/// Restore runs at most once, whether through [`restore`](Self::restore)
/// or through `Drop`.
#[derive(Debug)]
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Switches stdin to raw mode and returns the restoring guard.
    pub fn enter() -> io::Result<Self> {
        if !io::stdin().is_terminal() {
            tracing::debug!("stdin is not a terminal, leaving mode untouched");
            return Ok(Self { active: false });
        }

        enable_raw_mode()?;
        Ok(Self { active: true })
    }

    /// Returns whether the guard actually holds raw mode.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Restores the original terminal mode.
    ///
    /// Consumes the guard; `Drop` remains the backstop for paths that
    /// never reach an explicit restore.
    pub fn restore(mut self) {
        self.restore_inner();
    }

    fn restore_inner(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        // Restore failures must never take the process down.
        if let Err(e) = disable_raw_mode() {
            tracing::error!(error = %e, "Failed to restore original terminal mode");
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore_inner();
    }
}

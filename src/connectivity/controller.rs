//! Online/offline mode decisions
//!
//! `ModeController` decides for each conversion whether the caller should use
//! the rate cache or try the live API. It combines the live connectivity signal
//! with the persisted offline-mode flag. Only the flag is persisted; the mode
//! itself is re-derived from flag and signal at startup.

use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use super::signal::{ConnectivityEvent, ConnectivitySource, Subscription};
use crate::cache::ModeRepository;

/// Current data-path mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Live fetches allowed
    Online,
    /// Forced offline because the network was lost
    OfflineAuto,
    /// User chose offline while the network was available
    OfflineManual,
}

impl Mode {
    pub fn is_offline(&self) -> bool {
        !matches!(self, Mode::Online)
    }

    /// Derives the mode from the persisted intent and the live signal
    pub fn initial(offline_flag: bool, connected: bool) -> Self {
        match (offline_flag, connected) {
            (false, _) => Mode::Online,
            (true, true) => Mode::OfflineManual,
            (true, false) => Mode::OfflineAuto,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mode::Online => "online",
            Mode::OfflineAuto => "offline (no connection)",
            Mode::OfflineManual => "offline (manual)",
        };
        f.write_str(label)
    }
}

/// A mode change the controller refused to apply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    /// Leaving offline mode requires a live connection
    #[error("Cannot exit offline mode: no connection")]
    NoConnection,
}

/// Tracks the online/offline mode for one client
///
/// The controller holds a connectivity subscription for its whole lifetime;
/// it is released when the controller is dropped.
#[derive(Debug)]
pub struct ModeController<R, C> {
    repository: R,
    source: C,
    mode: Mode,
    subscription: Subscription,
}

impl<R: ModeRepository, C: ConnectivitySource> ModeController<R, C> {
    pub fn new(repository: R, source: C) -> Self {
        let subscription = source.subscribe();
        let mode = Mode::initial(repository.offline_mode(), source.is_connected());
        debug!(%mode, "Mode controller initialized");
        Self {
            repository,
            source,
            mode,
            subscription,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Raw connectivity signal
    pub fn is_online(&self) -> bool {
        self.source.is_connected()
    }

    pub fn is_offline_mode(&self) -> bool {
        self.mode.is_offline()
    }

    /// Whether the next conversion should skip the live API
    pub fn should_use_cache(&self) -> bool {
        self.is_offline_mode() || !self.is_online()
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Applies every pending connectivity event, returning how many were handled
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.subscription.try_next() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: ConnectivityEvent) {
        match event {
            ConnectivityEvent::Connected => self.network_restored(),
            ConnectivityEvent::Disconnected => self.network_lost(),
        }
    }

    /// Network went away: force offline unless the user already chose it
    pub fn network_lost(&mut self) {
        if self.mode == Mode::Online {
            self.repository.set_offline_mode(true);
            self.transition(Mode::OfflineAuto);
        }
    }

    /// Network came back: leave an automatic offline mode
    ///
    /// A manual offline choice is never overridden here.
    pub fn network_restored(&mut self) {
        if self.mode != Mode::OfflineAuto {
            return;
        }
        // The flag cannot tell auto from manual; OfflineManual carries that
        debug!("Recovering from automatic offline mode");
        self.repository.set_offline_mode(false);
        self.transition(Mode::Online);
    }

    /// Flips between online and manual offline mode
    ///
    /// Going back online needs a connection; from an automatic offline mode
    /// this behaves like `exit_offline`.
    pub fn toggle(&mut self) -> Result<Mode, ModeError> {
        match self.mode {
            Mode::Online => {
                self.repository.set_offline_mode(true);
                self.transition(Mode::OfflineManual);
            }
            Mode::OfflineManual | Mode::OfflineAuto => self.exit_offline()?,
        }
        Ok(self.mode)
    }

    /// Returns to online mode if a connection is available
    pub fn exit_offline(&mut self) -> Result<(), ModeError> {
        if self.mode == Mode::Online {
            return Ok(());
        }
        if !self.source.is_connected() {
            info!(mode = %self.mode, "Refusing to exit offline mode without a connection");
            return Err(ModeError::NoConnection);
        }
        self.repository.set_offline_mode(false);
        self.transition(Mode::Online);
        Ok(())
    }

    /// Re-derives the mode from the persisted flag, e.g. after a cache clear
    pub fn reconcile(&mut self) {
        let mode = Mode::initial(self.repository.offline_mode(), self.source.is_connected());
        self.transition(mode);
    }

    fn transition(&mut self, mode: Mode) {
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "Mode changed");
            self.mode = mode;
        }
    }
}

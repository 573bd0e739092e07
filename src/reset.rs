//! Reset Coordination
//!
//! A reset clears the totals map and the persisted current state, then broadcasts a
//! new [`ResetToken`] to every entry. The clear and the broadcast are two phases of
//! one commit: a [`ResetTicket`] is issued by [`ResetCoordinator::begin`] and can only
//! be published once, after the owner has cleared its state.

use std::fmt;

/// Monotonically increasing reset generation.
///
/// Entries tag every change they emit with the token they held at the time, so a
/// change produced before a reset can be recognised and discarded afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResetToken(u64);

impl ResetToken {
    /// The token every session starts with.
    #[must_use]
    pub const fn initial() -> Self {
        Self(0)
    }

    /// The raw generation number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the coordinator is in the reset cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetPhase {
    /// No reset in flight.
    #[default]
    Idle,

    /// Totals are being cleared; the new token has not been published yet.
    Clearing,

    /// The new token is published and entries are re-zeroing.
    Broadcasting,
}

/// Permission to publish the next reset token. Not `Clone`: each ticket publishes once.
#[derive(Debug)]
#[must_use]
pub struct ResetTicket {
    token: ResetToken,
}

impl ResetTicket {
    /// The token this ticket will publish.
    pub fn token(&self) -> ResetToken {
        self.token
    }
}

/// Idle/Resetting state machine that owns the current [`ResetToken`].
#[derive(Debug, Default)]
pub struct ResetCoordinator {
    phase: ResetPhase,
    token: ResetToken,
}

impl ResetCoordinator {
    /// A coordinator in the idle phase holding the initial token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a reset. Returns `None` if one is already in flight.
    pub fn begin(&mut self) -> Option<ResetTicket> {
        if self.phase != ResetPhase::Idle {
            return None;
        }

        self.phase = ResetPhase::Clearing;

        Some(ResetTicket {
            token: self.token.next(),
        })
    }

    /// Publishes the ticket's token. Call after the owner has cleared its totals.
    pub fn publish(&mut self, ticket: ResetTicket) -> ResetToken {
        self.token = self.token.max(ticket.token);
        self.phase = ResetPhase::Broadcasting;

        self.token
    }

    /// Completes the reset and returns to idle.
    pub fn finish(&mut self) {
        self.phase = ResetPhase::Idle;
    }

    /// Whether a change tagged with `token` may still be applied.
    ///
    /// While clearing nothing is accepted; while broadcasting only the re-zeroing
    /// changes tagged with the new token are.
    #[must_use]
    pub fn accepts(&self, token: ResetToken) -> bool {
        match self.phase {
            ResetPhase::Idle => token >= self.token,
            ResetPhase::Clearing => false,
            ResetPhase::Broadcasting => token == self.token,
        }
    }

    /// The most recently published token.
    #[must_use]
    pub fn token(&self) -> ResetToken {
        self.token
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> ResetPhase {
        self.phase
    }

    /// Whether a reset is in flight.
    #[must_use]
    pub fn is_resetting(&self) -> bool {
        self.phase != ResetPhase::Idle
    }
}

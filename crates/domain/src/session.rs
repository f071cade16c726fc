//! GATT session state machine.
//!
//! The transition table is a pure function so the driver in `envsensor-app`
//! and its tests agree on exactly one definition of the lifecycle:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──link──▶ DiscoveringServices ──found──▶
//!     EnablingNotifications ──cccd ack──▶ Active ◀──notification──┐
//!                                           └─────────────────────┘
//! any failure ─────────────────────────────────────────▶ Disconnected
//! ```

use serde::Serialize;

use crate::error::InvalidTransition;

/// Lifecycle state of one peripheral connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    DiscoveringServices,
    EnablingNotifications,
    Active,
    /// Terminal. A new session may be created for the same peer later.
    Disconnected,
}

/// Something that happened to the session, as seen by its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    ConnectRequested,
    LinkEstablished,
    LinkFailed,
    ServicesResolved,
    DiscoveryFailed,
    DescriptorAcknowledged,
    DescriptorFailed,
    Notification,
    LinkDropped,
    TimedOut,
}

impl SessionInput {
    fn is_failure(self) -> bool {
        matches!(
            self,
            Self::LinkFailed
                | Self::DiscoveryFailed
                | Self::DescriptorFailed
                | Self::LinkDropped
                | Self::TimedOut
        )
    }
}

impl SessionState {
    /// Apply `input` and return the next state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `input` is not accepted in the
    /// current state. [`Disconnected`](Self::Disconnected) accepts nothing.
    pub fn on(self, input: SessionInput) -> Result<Self, InvalidTransition> {
        use SessionInput as I;

        let next = match (self, input) {
            (Self::Disconnected, _) => None,
            (_, input) if input.is_failure() => Some(Self::Disconnected),
            (Self::Idle, I::ConnectRequested) => Some(Self::Connecting),
            (Self::Connecting, I::LinkEstablished) => Some(Self::DiscoveringServices),
            (Self::DiscoveringServices, I::ServicesResolved) => Some(Self::EnablingNotifications),
            (Self::EnablingNotifications, I::DescriptorAcknowledged)
            | (Self::Active, I::Notification) => Some(Self::Active),
            _ => None,
        };

        next.ok_or(InvalidTransition { from: self, input })
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Whether notifications are being delivered.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::DiscoveringServices => "discovering_services",
            Self::EnablingNotifications => "enabling_notifications",
            Self::Active => "active",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILURES: [SessionInput; 5] = [
        SessionInput::LinkFailed,
        SessionInput::DiscoveryFailed,
        SessionInput::DescriptorFailed,
        SessionInput::LinkDropped,
        SessionInput::TimedOut,
    ];

    #[test]
    fn should_default_to_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn should_walk_happy_path_to_active() {
        let state = SessionState::Idle
            .on(SessionInput::ConnectRequested)
            .and_then(|s| s.on(SessionInput::LinkEstablished))
            .and_then(|s| s.on(SessionInput::ServicesResolved))
            .and_then(|s| s.on(SessionInput::DescriptorAcknowledged))
            .unwrap();
        assert_eq!(state, SessionState::Active);
    }

    #[test]
    fn should_stay_active_on_notification() {
        let state = SessionState::Active.on(SessionInput::Notification).unwrap();
        assert!(state.is_active());
    }

    #[test]
    fn should_disconnect_on_any_failure_from_live_states() {
        let live = [
            SessionState::Idle,
            SessionState::Connecting,
            SessionState::DiscoveringServices,
            SessionState::EnablingNotifications,
            SessionState::Active,
        ];
        for state in live {
            for input in FAILURES {
                assert_eq!(state.on(input), Ok(SessionState::Disconnected));
            }
        }
    }

    #[test]
    fn should_reject_every_input_once_disconnected() {
        let err = SessionState::Disconnected
            .on(SessionInput::ConnectRequested)
            .unwrap_err();
        assert_eq!(err.from, SessionState::Disconnected);
        for input in FAILURES {
            assert!(SessionState::Disconnected.on(input).is_err());
        }
    }

    #[test]
    fn should_reject_skipping_descriptor_acknowledgement() {
        let result = SessionState::DiscoveringServices.on(SessionInput::DescriptorAcknowledged);
        assert!(result.is_err());
    }

    #[test]
    fn should_reject_notification_before_active() {
        let result = SessionState::EnablingNotifications.on(SessionInput::Notification);
        assert_eq!(
            result,
            Err(InvalidTransition {
                from: SessionState::EnablingNotifications,
                input: SessionInput::Notification,
            })
        );
    }

    #[test]
    fn should_display_snake_case_name() {
        assert_eq!(
            SessionState::DiscoveringServices.to_string(),
            "discovering_services"
        );
        assert!(SessionState::Disconnected.is_terminal());
    }
}

//! Error types shared across the workspace.
//!
//! Each layer defines its own typed errors; the ones here are the domain
//! vocabulary reported to observers. None of them carries a `String`
//! payload except address parsing, which echoes the rejected input.

use serde::Serialize;

use crate::session::{SessionInput, SessionState};

/// Opaque failure code assigned by the BLE transport adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransportCode(u16);

impl TransportCode {
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for TransportCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A notification payload that could not be turned into a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeError {
    /// Fewer than eight bytes were notified.
    #[error("payload must be at least 8 bytes, got {actual}")]
    TooShort {
        /// The actual length received.
        actual: usize,
    },
}

/// The peripheral did not behave like the expected sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolError {
    /// The link could not be established.
    #[error("connection failed (transport code {code})")]
    ConnectionFailed { code: TransportCode },

    /// Service discovery failed or did not expose the sensor characteristic.
    ///
    /// `code` is set when discovery itself failed at the transport.
    #[error("sensor characteristic not found")]
    CharacteristicMissing { code: Option<TransportCode> },

    /// Local registration or the CCCD write was rejected.
    #[error("notification subscribe failed (transport code {code})")]
    SubscribeFailed { code: TransportCode },

    /// A setup step did not complete within its deadline.
    #[error("setup step timed out")]
    TimedOut,
}

impl ProtocolError {
    /// Transport code attached to the failure, if any.
    #[must_use]
    pub fn code(&self) -> Option<TransportCode> {
        match self {
            Self::ConnectionFailed { code } | Self::SubscribeFailed { code } => Some(*code),
            Self::CharacteristicMissing { code } => *code,
            Self::TimedOut => None,
        }
    }
}

/// Error reported by a GATT session to its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum SessionError {
    /// A notification was malformed. The session stays active.
    #[error("failed to decode notification")]
    Decode {
        #[source]
        reason: DecodeError,
    },

    /// The session terminated while in `state`.
    #[error("protocol failure while {state}")]
    Protocol {
        state: SessionState,
        #[source]
        error: ProtocolError,
    },
}

impl SessionError {
    /// Whether the error ended the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

impl From<DecodeError> for SessionError {
    fn from(reason: DecodeError) -> Self {
        Self::Decode { reason }
    }
}

/// A textual Bluetooth address could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid peer address `{input}`")]
pub struct AddressParseError {
    pub input: String,
}

/// An input that the session state machine does not accept in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} on {input:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub input: SessionInput,
}

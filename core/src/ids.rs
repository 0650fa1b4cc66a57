//! Identifier newtypes.
//!
//! Every identifier ends up embedded in a key such as
//! `queue:{eventId}:working:{userId}`, so identifiers are validated once at the
//! boundary: non-empty, at most [`MAX_ID_LEN`] bytes, and free of the `:`
//! separator and whitespace.

use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum identifier length in bytes.
pub const MAX_ID_LEN: usize = 128;

fn validate(kind: &'static str, value: &str) -> Result<(), QueueError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && !value.chars().any(|c| c == ':' || c.is_whitespace() || c.is_control());

    if valid {
        Ok(())
    } else {
        Err(QueueError::InvalidIdentifier {
            kind,
            value: value.chars().take(MAX_ID_LEN).collect(),
        })
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate an identifier.
            ///
            /// # Errors
            ///
            /// Returns [`QueueError::InvalidIdentifier`] if the value is empty,
            /// too long, or contains `:` or whitespace.
            pub fn parse(value: impl Into<String>) -> Result<Self, QueueError> {
                let value = value.into();
                validate($kind, &value)?;
                Ok(Self(value))
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = QueueError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = QueueError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of an end user, as issued by the upstream identity service.
    UserId,
    "userId"
);

define_id!(
    /// Identifier of a ticketed event. One waiting queue exists per event.
    EventId,
    "eventId"
);

define_id!(
    /// Identifier of a dated performance of an event. Seats are leased per schedule.
    EventScheduleId,
    "eventScheduleId"
);

define_id!(
    /// Identifier of a physical seat within a schedule's seating map.
    SeatMappingId,
    "seatMappingId"
);

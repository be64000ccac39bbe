//! Domain identifier types
//!
//! Newtype wrappers for the numeric identifiers handed out by the backing store.
//! Keeping them distinct prevents passing a message id where an attempt id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Wraps a raw identifier value
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw identifier value
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<$inner>()
                    .map(Self)
                    .map_err(|e| format!("Invalid {} '{}': {}", $label, s, e))
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of an inbound channel
    ///
    /// # Examples
    ///
    /// ```
    /// use hl7_relay::domain::ids::ChannelId;
    ///
    /// let id: ChannelId = "7".parse().unwrap();
    /// assert_eq!(id.value(), 7);
    /// ```
    ChannelId,
    i32,
    "channel id"
);

numeric_id!(
    /// Identifier of a registered worker instance
    InstanceId,
    i32,
    "instance id"
);

numeric_id!(
    /// Identifier of a stored inbound message
    MessageId,
    i64,
    "message id"
);

numeric_id!(
    /// Sequence number of a processing attempt, unique per message
    AttemptId,
    i32,
    "attempt id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_from_str() {
        let id: ChannelId = " 12 ".parse().unwrap();
        assert_eq!(id, ChannelId::new(12));
        assert_eq!(id.to_string(), "12");
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let err = "abc".parse::<MessageId>().unwrap_err();
        assert!(err.contains("message id"));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&AttemptId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: AttemptId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), 3);
    }
}

//! Snowflake identifier newtypes.
//!
//! The core deliberately does not depend on a full Discord API model crate
//! (see `DESIGN.md`): it only ever needs to name a guild, a channel, or a
//! user, and to carry those identifiers opaquely between the embedding
//! application, the orchestrator, and the wire protocol. Wire (de)serialize
//! as strings, matching how large snowflakes cross the Lavalink/Discord
//! JSON boundary.

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    num::NonZeroU64,
    str::FromStr,
};

macro_rules! snowflake {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Create an identifier from a raw, non-zero value.
            pub fn new(id: u64) -> Option<Self> {
                NonZeroU64::new(id).map(Self)
            }

            /// Return the raw numeric value.
            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = StringOrInt::deserialize(deserializer)?;

                raw.value()
                    .and_then(NonZeroU64::new)
                    .map(Self)
                    .ok_or_else(|| DeError::custom("expected a non-zero snowflake"))
            }
        }
    };
}

snowflake!(GuildId, "The unique identifier of a guild.");
snowflake!(ChannelId, "The unique identifier of a channel.");
snowflake!(UserId, "The unique identifier of a user.");

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrInt {
    String(String),
    Int(u64),
}

impl StringOrInt {
    fn value(&self) -> Option<u64> {
        match self {
            Self::String(s) => s.parse().ok(),
            Self::Int(n) => Some(*n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GuildId;

    #[test]
    fn round_trips_through_json_as_a_string() {
        let id = GuildId::new(123_456_789_012_345_678).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"123456789012345678\"");

        let back: GuildId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn accepts_a_bare_json_integer_too() {
        let back: GuildId = serde_json::from_str("42").unwrap();
        assert_eq!(back.get(), 42);
    }

    #[test]
    fn rejects_zero() {
        assert!(GuildId::new(0).is_none());
    }
}

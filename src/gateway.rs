//! The chat-platform gateway collaborator interface (spec §1, §6).
//!
//! The core never talks to a gateway directly. It is handed an
//! implementation of [`VoiceGateway`] at construction and calls out to it
//! exactly where the spec says to: to check whether the bot is already in
//! an audio channel, and to ask the gateway to join or leave one on the
//! application's behalf.

use crate::ids::{ChannelId, GuildId, UserId};
use async_trait::async_trait;

/// A member of a guild, as known to the embedding application.
///
/// This is intentionally a plain data carrier: the core only ever reads it,
/// it never looks anything up from it beyond the fields named here.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Member {
    /// The guild the member belongs to.
    pub guild_id: GuildId,
    /// The member's user id.
    pub user_id: UserId,
    /// The audio channel the member currently occupies, if any.
    pub channel_id: Option<ChannelId>,
}

/// An error returned by a [`VoiceGateway`] operation.
#[derive(Debug)]
pub struct GatewayError(pub Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gateway operation failed: {}", self.0)
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// The three operations the core needs from a chat-platform gateway
/// integration (spec §1).
///
/// Implementations typically wrap a gateway client's voice-state cache and
/// its "update voice state" gateway command.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Return the channel the given member currently occupies in their
    /// guild's audio channels, if any.
    fn in_audio_channel(&self, member: &Member) -> Option<ChannelId>;

    /// Ask the gateway to move the bot into `channel` within `guild`.
    ///
    /// This only requests the move; the resulting voice-server/voice-state
    /// update events are expected to arrive later through whatever the
    /// embedding application feeds into the orchestrator.
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<(), GatewayError>;

    /// Ask the gateway to remove the bot from `guild`'s audio channels.
    async fn disconnect(&self, guild: GuildId) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::{GatewayError, Member, VoiceGateway};
    use crate::ids::{ChannelId, GuildId, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingGateway {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl VoiceGateway for RecordingGateway {
        fn in_audio_channel(&self, _member: &Member) -> Option<ChannelId> {
            None
        }

        async fn connect(&self, _guild: GuildId, _channel: ChannelId) -> Result<(), GatewayError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self, _guild: GuildId) -> Result<(), GatewayError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn records_connect_and_disconnect_calls() {
        let gateway = RecordingGateway::default();
        let guild = GuildId::new(1).unwrap();
        let channel = ChannelId::new(2).unwrap();

        gateway.connect(guild, channel).await.unwrap();
        gateway.disconnect(guild).await.unwrap();

        assert_eq!(gateway.connects.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.disconnects.load(Ordering::SeqCst), 1);
    }
}

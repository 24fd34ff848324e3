//! The guild-scoped binding between a playback session and whichever node
//! currently hosts it (spec §4.4).
//!
//! The teacher has no equivalent of its own: `twilight-lavalink`'s
//! `PlayerManager` maps a guild straight to one node for the node's entire
//! lifetime. Our spec needs the indirection — nodes come and go, and a
//! guild's player has to be able to move across nodes (even across pools)
//! without the caller's guild-id-keyed handle changing. Grounded on the
//! teacher's own `Player`/`PlayerManager` split (a stable handle in front of
//! state that gets replaced underneath it) and the node-selection code in
//! `examples/twilight-rs-twilight/lavalink/src/client.rs`, generalized into
//! its own state machine per spec §4.4.

use std::{
    sync::{Arc, Mutex as SyncMutex},
    time::Duration,
};
use tokio::sync::RwLock as AsyncRwLock;

use crate::{
    error::NodeError,
    ids::GuildId,
    model::{PlayerUpdate, UpdatePlayerTrack, VoiceState},
    node::Node,
    player::PlayerUpdateBuilder,
};

/// How long `transfer_node`/`transfer_to_pool` wait after switching the
/// link's node pointer before submitting the seeded player update (spec
/// §4.4: "the subscribe is delayed to let the new node settle").
const TRANSFER_SETTLE: Duration = Duration::from_millis(1000);

/// A link's connection lifecycle (spec §4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkState {
    /// Waiting on a complete voice state before a player can be created.
    Connecting,
    /// The player exists on the current node and has an accepted voice
    /// state.
    Connected,
    /// The last operation against the current node failed.
    Disconnected,
}

struct LinkRef {
    guild_id: GuildId,
    node: AsyncRwLock<Node>,
    state: SyncMutex<LinkState>,
    voice: SyncMutex<VoiceState>,
}

/// A guild's binding to whichever node is currently hosting its playback.
///
/// Cheaply `Clone`-able; every clone shares the same underlying state.
/// Equality and identity are by `guild_id` alone (spec §4.4): two `Link`
/// values for the same guild are the same link, even mid-migration.
#[derive(Clone)]
pub struct Link(Arc<LinkRef>);

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("guild_id", &self.guild_id()).field("state", &self.state()).finish()
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.guild_id() == other.guild_id()
    }
}

impl Eq for Link {}

impl Link {
    pub(crate) fn new(guild_id: GuildId, node: Node) -> Self {
        Self(Arc::new(LinkRef {
            guild_id,
            node: AsyncRwLock::new(node),
            state: SyncMutex::new(LinkState::Connecting),
            voice: SyncMutex::new(VoiceState::default()),
        }))
    }

    pub fn guild_id(&self) -> GuildId {
        self.0.guild_id
    }

    pub fn state(&self) -> LinkState {
        *self.0.state.lock().expect("link state lock poisoned")
    }

    fn set_state(&self, state: LinkState) {
        *self.0.state.lock().expect("link state lock poisoned") = state;
    }

    /// The node currently hosting this guild's player.
    pub async fn current_node(&self) -> Node {
        self.0.node.read().await.clone()
    }

    /// Feed a freshly combined voice-server/voice-state half into the link
    /// (spec §4.4). Stays `Connecting` until all three fields are present.
    /// If the currently-selected node is unavailable, this is a no-op
    /// (spec §4.4: "if the selected node is unavailable, no-op") — the
    /// voice state is still recorded so a later migration can seed it, but
    /// no PATCH is attempted and the link's state is left untouched. Once
    /// complete and the node is available, submits it to the current node
    /// and moves to `Connected` or `Disconnected` depending on the outcome.
    pub async fn update_voice_state(&self, voice: VoiceState) -> Result<(), NodeError> {
        *self.0.voice.lock().expect("link voice lock poisoned") = voice.clone();

        if !voice.is_complete() {
            self.set_state(LinkState::Connecting);
            return Ok(());
        }

        let node = self.current_node().await;
        if !node.is_available() {
            return Ok(());
        }

        self.set_state(LinkState::Connecting);

        match node.player_update(self.guild_id()).voice(voice).subscribe(true).await {
            Ok(_) => {
                self.set_state(LinkState::Connected);
                Ok(())
            }
            Err(err) => {
                self.set_state(LinkState::Disconnected);
                Err(err)
            }
        }
    }

    /// Mark this link `Connected` because the current node reported its
    /// player as connected via a `playerUpdate` event (spec §4.3
    /// `PlayerUpdate`).
    pub(crate) fn mark_connected(&self) {
        self.set_state(LinkState::Connected);
    }

    /// Move this guild's player onto `new_node` within the same pool,
    /// carrying over track, position, volume, pause state, voice state, and
    /// filters (spec §4.4 `transfer_node`).
    ///
    /// The link's node pointer is switched to `new_node` immediately, before
    /// the settling delay — callers reading [`Self::current_node`] mid-delay
    /// already see the new node. The old node's player is only destroyed
    /// once the new one confirms the seeded update.
    pub async fn transfer_node(&self, new_node: Node) -> Result<(), NodeError> {
        let guild_id = self.guild_id();
        let old_node = self.current_node().await;
        let cached = old_node.cached_player(guild_id);

        *self.0.node.write().await = new_node.clone();
        tokio::time::sleep(TRANSFER_SETTLE).await;

        let mut record = PlayerUpdate::default();
        if let Some(cached) = &cached {
            if let Some(track) = &cached.track {
                record.set_track(UpdatePlayerTrack { encoded: Some(track.encoded.clone()), identifier: None });
                record.set_position(cached.state.position);
            }
            record.set_volume(cached.volume);
            record.set_paused(cached.paused);
            if cached.voice.is_complete() {
                record.set_voice(cached.voice.clone());
            }
            record.set_filters(cached.filters.clone());
        }

        let builder = PlayerUpdateBuilder::from_record(new_node, guild_id, record);
        match builder.subscribe(false).await {
            Ok(_) => {
                self.set_state(LinkState::Connected);
                let _ = old_node.destroy_player(guild_id).await;
                old_node.evict_cached_player(guild_id);
                Ok(())
            }
            Err(err) => {
                self.set_state(LinkState::Disconnected);
                Err(err)
            }
        }
    }

    /// Move this guild's player to a node in a different pool, seeding only
    /// volume, voice state, and filters — not the current track (spec §4.4
    /// `transfer_to_pool`: "the track is pool-specific state and is not
    /// carried across"). The old node's player is destroyed synchronously
    /// before the switch, since the old pool is being left behind entirely.
    ///
    /// `after` runs once the new player is confirmed, before this call
    /// returns `Ok`; it's how the orchestrator re-associates pool-scoped
    /// bookkeeping (e.g. pool membership maps) with the new node.
    pub async fn transfer_to_pool<F, Fut>(&self, new_node: Node, after: F) -> Result<(), NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let guild_id = self.guild_id();
        let old_node = self.current_node().await;
        let cached = old_node.cached_player(guild_id);

        let _ = old_node.destroy_player(guild_id).await;
        old_node.evict_cached_player(guild_id);

        *self.0.node.write().await = new_node.clone();
        tokio::time::sleep(TRANSFER_SETTLE).await;

        let mut record = PlayerUpdate::default();
        if let Some(cached) = &cached {
            record.set_volume(cached.volume);
            if cached.voice.is_complete() {
                record.set_voice(cached.voice.clone());
            }
            record.set_filters(cached.filters.clone());
        }

        let builder = PlayerUpdateBuilder::from_record(new_node, guild_id, record);
        match builder.subscribe(false).await {
            Ok(_) => {
                self.set_state(LinkState::Connected);
                after().await;
                Ok(())
            }
            Err(err) => {
                self.set_state(LinkState::Disconnected);
                Err(err)
            }
        }
    }

    /// Mark this link `Disconnected` because its node went down, without
    /// touching its node pointer. Called by the orchestrator so the link
    /// becomes eligible for [`Self::transfer_node`]/[`Self::transfer_to_pool`]
    /// once another node in its pool readies.
    pub(crate) fn mark_disconnected(&self) {
        self.set_state(LinkState::Disconnected);
    }

    /// Destroy the player on the current node and drop this link from the
    /// orchestrator's bookkeeping (spec §4.4 `Link::destroy`).
    pub async fn destroy(&self) -> Result<(), NodeError> {
        let node = self.current_node().await;
        node.destroy_player_and_link(self.guild_id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ids::UserId,
        node::{NodeConfig, NodeCollaborator},
        region::RegionGroup,
    };
    use async_trait::async_trait;
    use std::sync::Weak;

    struct Noop;

    #[async_trait]
    impl NodeCollaborator for Noop {
        fn link(&self, _guild_id: GuildId) -> Option<Link> {
            None
        }

        async fn on_node_disconnected(&self, _node: Node) {}

        async fn transfer_orphans_to(&self, _node: Node) {}

        fn remove_link(&self, _guild_id: GuildId) {}
    }

    fn detached_collaborator() -> Weak<dyn NodeCollaborator> {
        let strong: Arc<dyn NodeCollaborator> = Arc::new(Noop);
        Arc::downgrade(&strong)
    }

    fn unreachable_node() -> Node {
        Node::connect(
            NodeConfig {
                name: "test".into(),
                host: "127.0.0.1".into(),
                port: 1,
                tls: false,
                authorization: "secret".into(),
                pool: "default".into(),
                region_group: RegionGroup::Unknown,
                request_timeout: Duration::from_millis(50),
                user_id: UserId::new(1).unwrap(),
            },
            detached_collaborator(),
        )
    }

    fn guild() -> GuildId {
        GuildId::new(42).unwrap()
    }

    #[test]
    fn links_with_the_same_guild_are_equal_regardless_of_node() {
        let a = Link::new(guild(), unreachable_node());
        let b = Link::new(guild(), unreachable_node());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn starts_connecting() {
        let link = Link::new(guild(), unreachable_node());
        assert_eq!(link.state(), LinkState::Connecting);
    }

    #[tokio::test]
    async fn incomplete_voice_state_stays_connecting() {
        let link = Link::new(guild(), unreachable_node());
        link.update_voice_state(VoiceState { token: Some("t".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(link.state(), LinkState::Connecting);
    }

    #[tokio::test]
    async fn complete_voice_state_against_an_unavailable_node_is_a_noop() {
        let link = Link::new(guild(), unreachable_node());
        let voice = VoiceState {
            token: Some("t".into()),
            endpoint: Some("e".into()),
            session_id: Some("s".into()),
        };

        // The node never received a `Ready`, so it's unavailable; spec §4.4
        // says this is a no-op, not an error, and the link's state is left
        // untouched.
        link.update_voice_state(voice).await.unwrap();
        assert_eq!(link.state(), LinkState::Connecting);
    }

    #[tokio::test]
    async fn mark_connected_transitions_state() {
        let link = Link::new(guild(), unreachable_node());
        link.mark_disconnected();
        assert_eq!(link.state(), LinkState::Disconnected);

        link.mark_connected();
        assert_eq!(link.state(), LinkState::Connected);
    }
}

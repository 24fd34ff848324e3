//! The client orchestrator: node registry, pool→guild mapping, event
//! fan-out, the reconnect scheduler, and link-migration policy (spec
//! §4.5).
//!
//! The teacher's [`Lavalink`] wires itself directly into `twilight_model`'s
//! gateway `Event` enum and owns exactly one flat `guild → node` map for the
//! whole lifetime of a player — it never has to choose *which* node a guild
//! should use, only whichever one `best()` currently favors, and it never
//! moves a guild off a node once assigned. Our spec needs all of that plus
//! pools (a guild is only ever balanced within its assigned pool), link
//! migration (on node failure or operator-requested pool change), and a
//! back-edge from every node session into this orchestrator (spec §9
//! "Cyclic ownership") so nodes can report disconnects and ask for orphan
//! players to be picked up. The shape — an `Arc`-wrapped ref struct with a
//! cheap `Clone` handle in front of it — is kept from the teacher; the
//! bookkeeping inside it is new.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc::Receiver, oneshot};
use tracing::{debug, warn};

use crate::{
    balancer::{LoadBalancer, SelectError},
    error::{ClientError, ConfigError},
    event::{Publisher, SubscriberId},
    gateway::{GatewayError, Member, VoiceGateway},
    ids::{ChannelId, GuildId, UserId},
    link::Link,
    model::{IncomingEvent, VoiceState},
    node::{Node, NodeCollaborator, NodeConfig},
    region::{self, RegionGroup},
};

/// How often the reconnect scheduler polls every registered node's
/// [`Node::should_attempt_reconnect`] probe (spec §4.5 "Reconnect
/// scheduler").
const RECONNECT_CADENCE: Duration = Duration::from_millis(500);

/// Buffer size used for the per-node forwarding subscription the client
/// installs in [`Client::add_node`]. Generous relative to application
/// subscriber buffers since this hop only ever has one consumer (the
/// forwarding task itself) and must not apply backpressure to the node's
/// own socket reader.
const FORWARD_BUFFER: usize = 256;

/// One event republished through the client's own [`Publisher`], tagged
/// with the node it came from (spec §4.5 "refile its events through the
/// client's own publisher").
#[derive(Clone, Debug, PartialEq)]
pub struct ClientEvent {
    /// The display name of the node the event originated on.
    pub node_name: String,
    /// The event itself, unchanged from what the node published.
    pub event: IncomingEvent,
}

/// The voice-server half of a Discord voice connection, fed in by the
/// embedding application.
#[derive(Clone, Debug)]
pub struct VoiceServerUpdate {
    /// The guild the voice server was assigned for.
    pub guild_id: GuildId,
    /// The voice server's session token.
    pub token: String,
    /// The voice server's endpoint.
    pub endpoint: String,
}

/// The voice-state half of a Discord voice connection.
#[derive(Clone, Debug)]
pub struct VoiceStateUpdate {
    /// The guild this voice state belongs to.
    pub guild_id: GuildId,
    /// The channel the bot is now in, or `None` if it left.
    pub channel_id: Option<ChannelId>,
    /// The gateway voice-state session id.
    pub session_id: String,
}

struct ClientRef {
    user_id: UserId,
    gateway: Arc<dyn VoiceGateway>,
    balancer: LoadBalancer,
    nodes: DashMap<String, Node>,
    links: DashMap<GuildId, Link>,
    current_pool: DashMap<GuildId, String>,
    pending_voice_servers: DashMap<GuildId, (String, String)>,
    pending_voice_sessions: DashMap<GuildId, String>,
    pending_transfers: DashMap<GuildId, oneshot::Sender<()>>,
    publisher: Publisher<ClientEvent>,
    closed: AtomicBool,
    reconnect_scheduler: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ClientRef {
    fn nodes_in_pool(&self, pool: &str) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|entry| entry.value().config().pool == pool)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn links_on_node(&self, node: &Node) -> Vec<Link> {
        let mut matched = Vec::new();
        for entry in self.links.iter() {
            let link = entry.value().clone();
            if link.current_node().await == *node {
                matched.push(link);
            }
        }
        matched
    }

    async fn mark_links_in_pool_disconnected(&self, pool: &str) {
        for entry in self.links.iter() {
            let link = entry.value().clone();
            if link.current_node().await.config().pool == pool {
                link.mark_disconnected();
            }
        }
    }

    async fn mark_links_on_node_disconnected(&self, node: &Node) {
        for link in self.links_on_node(node).await {
            link.mark_disconnected();
        }
    }

    /// Best-effort voice region for a guild, read off whichever node its
    /// link currently sits on; [`RegionGroup::Unknown`] if there's no link
    /// or no cached voice endpoint yet.
    async fn voice_region_of(&self, guild_id: GuildId) -> RegionGroup {
        let Some(link) = self.links.get(&guild_id).map(|entry| entry.value().clone()) else {
            return RegionGroup::Unknown;
        };

        let node = link.current_node().await;
        node_voice_region(&node, guild_id)
    }
}

/// The coordination layer's public entry point: tracks configured nodes,
/// the pool each guild is currently assigned to, and the link (if any) each
/// guild currently has bound to a node.
///
/// Cheaply `Clone`-able; every clone shares the same underlying state.
#[derive(Clone)]
pub struct Client(Arc<ClientRef>);

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("nodes", &self.0.nodes.len())
            .field("links", &self.0.links.len())
            .field("closed", &self.0.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Client {
    /// Build a new orchestrator, deriving the bot's user id from `token`
    /// (spec §4.5 "Bot identity") and registering the default
    /// [`LoadBalancer`] (spec §4.2, region penalty provider included).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `token` doesn't split into exactly three
    /// dot-separated segments, its first segment isn't valid base64, or the
    /// decoded value isn't a valid non-zero user id.
    pub fn new(token: &str, gateway: Arc<dyn VoiceGateway>) -> Result<Self, ConfigError> {
        Self::with_balancer(token, gateway, LoadBalancer::default())
    }

    /// Like [`Self::new`], but with a caller-supplied [`LoadBalancer`]
    /// (e.g. extra [`PenaltyProvider`][crate::balancer::PenaltyProvider]s).
    pub fn with_balancer(
        token: &str,
        gateway: Arc<dyn VoiceGateway>,
        balancer: LoadBalancer,
    ) -> Result<Self, ConfigError> {
        let user_id = user_id_from_token(token)?;

        let inner = Arc::new(ClientRef {
            user_id,
            gateway,
            balancer,
            nodes: DashMap::new(),
            links: DashMap::new(),
            current_pool: DashMap::new(),
            pending_voice_servers: DashMap::new(),
            pending_voice_sessions: DashMap::new(),
            pending_transfers: DashMap::new(),
            publisher: Publisher::new(),
            closed: AtomicBool::new(false),
            reconnect_scheduler: std::sync::Mutex::new(None),
        });

        let scheduler = spawn_reconnect_scheduler(Arc::downgrade(&inner));
        *inner.reconnect_scheduler.lock().expect("reconnect scheduler lock poisoned") = Some(scheduler);

        Ok(Self(inner))
    }

    /// The bot's own user id, as derived from the token at construction.
    pub fn user_id(&self) -> UserId {
        self.0.user_id
    }

    /// Register a new event subscriber with a bounded buffer (spec §4.5
    /// "fan the servers' asynchronous events out to application
    /// listeners").
    pub fn subscribe(&self, buffer: usize) -> (SubscriberId, Receiver<ClientEvent>) {
        self.0.publisher.subscribe(buffer)
    }

    /// Drop a subscriber registered with [`Self::subscribe`].
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.0.publisher.unsubscribe(id);
    }

    /// Construct a node session and start managing it (spec §4.5
    /// `add_node`).
    ///
    /// The node's [`NodeConfig::user_id`] is overwritten with the client's
    /// own bot id regardless of what the caller set, so every node in a
    /// client always authenticates as the same bot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateNodeName`] if a node with the same
    /// name is already registered.
    pub fn add_node(&self, mut config: NodeConfig) -> Result<Node, ConfigError> {
        if self.0.nodes.contains_key(&config.name) {
            return Err(ConfigError::DuplicateNodeName { name: config.name });
        }

        config.user_id = self.0.user_id;
        let name = config.name.clone();

        let collaborator: Weak<dyn NodeCollaborator> = Arc::downgrade(&self.0);
        let node = Node::connect(config, collaborator);

        self.spawn_event_forwarder(name.clone(), &node);
        self.0.nodes.insert(name, node.clone());

        Ok(node)
    }

    fn spawn_event_forwarder(&self, node_name: String, node: &Node) {
        let (_id, mut rx) = node.subscribe(FORWARD_BUFFER);
        let client = self.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) =
                    client.0.publisher.publish(ClientEvent { node_name: node_name.clone(), event })
                {
                    debug!(
                        node = %node_name,
                        lagging = err.lagging_subscribers.len(),
                        "client event subscriber(s) lagging"
                    );
                }
            }
        });
    }

    /// Every currently configured node, optionally restricted to those
    /// presently `available` (spec §4.5 `get_nodes`).
    pub fn get_nodes(&self, only_available: bool) -> Vec<Node> {
        self.0
            .nodes
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|node| !only_available || node.is_available())
            .collect()
    }

    /// Look up the existing link for `guild_id`, or create one bound to the
    /// best available node in the guild's currently assigned pool (spec
    /// §4.5 `get_or_create_link`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::PoolUnmapped`] if no pool has been assigned to
    /// this guild yet, or a balancer failure if the pool has no usable
    /// node.
    pub fn get_or_create_link(
        &self,
        guild_id: GuildId,
        region: RegionGroup,
    ) -> Result<Link, ClientError> {
        if let Some(link) = self.0.links.get(&guild_id) {
            return Ok(link.value().clone());
        }

        let pool = self
            .0
            .current_pool
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .ok_or(ClientError::PoolUnmapped)?;

        let candidates = self.0.nodes_in_pool(&pool);
        let chosen = self.0.balancer.select(&candidates, region).map_err(select_error)?.clone();

        let link = Link::new(guild_id, chosen);
        self.0.links.insert(guild_id, link.clone());
        Ok(link)
    }

    /// Feed the voice-server half of a guild's Discord voice connection in.
    /// Once both halves are present, completes the guild's
    /// [`Link::update_voice_state`] (spec §3 "A link is created lazily when
    /// a voice-server update arrives for a guild whose pool is known").
    pub async fn process_voice_server_update(
        &self,
        update: VoiceServerUpdate,
    ) -> Result<(), ClientError> {
        self.0.pending_voice_servers.insert(update.guild_id, (update.token, update.endpoint));
        self.try_complete_voice_update(update.guild_id).await
    }

    /// Feed the voice-state half of a guild's Discord voice connection in.
    /// Clears any pending [`Self::load_and_transfer_to_node`] trigger
    /// waiting on the bot joining a channel for this guild.
    pub async fn process_voice_state_update(
        &self,
        update: VoiceStateUpdate,
    ) -> Result<(), ClientError> {
        let guild_id = update.guild_id;

        if update.channel_id.is_none() {
            self.0.pending_voice_sessions.remove(&guild_id);
            return Ok(());
        }

        self.0.pending_voice_sessions.insert(guild_id, update.session_id);

        if let Some((_, tx)) = self.0.pending_transfers.remove(&guild_id) {
            let _ = tx.send(());
        }

        self.try_complete_voice_update(guild_id).await
    }

    async fn try_complete_voice_update(&self, guild_id: GuildId) -> Result<(), ClientError> {
        let server = self.0.pending_voice_servers.get(&guild_id).map(|entry| entry.value().clone());
        let session = self.0.pending_voice_sessions.get(&guild_id).map(|entry| entry.value().clone());

        let (Some((token, endpoint)), Some(session_id)) = (server, session) else {
            return Ok(());
        };

        let region = region::from_endpoint(&endpoint);
        let link = self.get_or_create_link(guild_id, region)?;

        let voice =
            VoiceState { token: Some(token), endpoint: Some(endpoint), session_id: Some(session_id) };
        link.update_voice_state(voice).await?;
        Ok(())
    }

    /// Reassign `guild_id` to `pool` and migrate its link onto a node in
    /// that pool, joining the requester's voice channel first if the bot
    /// isn't already connected for this guild (spec §4.5
    /// `load_and_transfer_to_node`).
    ///
    /// Returns `Ok(false)` without side effects beyond the pool reassignment
    /// if `pool` currently has no available node. The `on_transfer` callback
    /// runs once the new player is confirmed, receiving the node it landed
    /// on.
    pub async fn load_and_transfer_to_node<F>(
        &self,
        guild_id: GuildId,
        pool: impl Into<String>,
        author: Member,
        self_member: Member,
        on_transfer: F,
    ) -> Result<bool, ClientError>
    where
        F: FnOnce(Node) + Send + 'static,
    {
        let pool = pool.into();
        self.0.current_pool.insert(guild_id, pool.clone());

        if !self.0.nodes_in_pool(&pool).iter().any(Node::is_available) {
            return Ok(false);
        }

        let (tx, rx) = oneshot::channel();

        if self.0.gateway.in_audio_channel(&self_member).is_some() {
            let _ = tx.send(());
        } else {
            self.0.pending_transfers.insert(guild_id, tx);

            match self.0.gateway.in_audio_channel(&author) {
                Some(channel_id) => self.0.gateway.connect(guild_id, channel_id).await?,
                None => {
                    // Nothing for the gateway to join; don't leave the
                    // trigger waiting on an update that will never arrive.
                    if let Some((_, tx)) = self.0.pending_transfers.remove(&guild_id) {
                        let _ = tx.send(());
                    }
                }
            }
        }

        let _ = rx.await;
        self.0.pending_transfers.remove(&guild_id);

        let candidates = self.0.nodes_in_pool(&pool);
        let region = self.0.voice_region_of(guild_id).await;
        let chosen = self.0.balancer.select(&candidates, region).map_err(select_error)?.clone();

        let link = match self.0.links.get(&guild_id) {
            Some(existing) => existing.value().clone(),
            None => {
                let link = Link::new(guild_id, chosen.clone());
                self.0.links.insert(guild_id, link.clone());
                link
            }
        };

        let callback_node = chosen.clone();
        link.transfer_to_pool(chosen, move || async move { on_transfer(callback_node) }).await?;

        Ok(true)
    }

    /// Ask the gateway collaborator to leave `guild_id`'s audio channel
    /// (spec §4.5 `disconnect_audio`).
    pub async fn disconnect_audio(&self, guild_id: GuildId) -> Result<(), GatewayError> {
        self.0.gateway.disconnect(guild_id).await
    }

    /// Tear everything down: every node is closed, the reconnect scheduler
    /// is stopped, every event subscription is dropped. Idempotent (spec
    /// §4.5 `close`, §8 invariant 8).
    pub async fn close(&self) {
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let scheduler =
            self.0.reconnect_scheduler.lock().expect("reconnect scheduler lock poisoned").take();
        if let Some(handle) = scheduler {
            handle.abort();
        }

        self.0.publisher.close();

        for entry in self.0.nodes.iter() {
            entry.value().close().await;
        }
    }
}

#[async_trait]
impl NodeCollaborator for ClientRef {
    fn link(&self, guild_id: GuildId) -> Option<Link> {
        self.links.get(&guild_id).map(|entry| entry.value().clone())
    }

    async fn on_node_disconnected(&self, node: Node) {
        let pool = node.config().pool.clone();
        let siblings = self.nodes_in_pool(&pool);

        if siblings.len() <= 1 {
            // This node is the pool's only member: every link in the pool is
            // necessarily bound to it.
            self.mark_links_in_pool_disconnected(&pool).await;
            return;
        }

        if siblings.iter().all(|sibling| !sibling.is_available()) {
            // The rest of the pool is also down, but each sibling's own
            // disconnect notification is responsible for its own links.
            self.mark_links_on_node_disconnected(&node).await;
            return;
        }

        for link in self.links_on_node(&node).await {
            let region = node_voice_region(&node, link.guild_id());
            match self.balancer.select(&siblings, region) {
                Ok(target) => {
                    let target = target.clone();
                    if let Err(err) = link.transfer_node(target).await {
                        warn!(guild = %link.guild_id(), error = %err, "failed to migrate link off a disconnected node");
                    }
                }
                Err(SelectError::Unavailable | SelectError::NoAvailableNode) => {
                    link.mark_disconnected();
                }
            }
        }
    }

    async fn transfer_orphans_to(&self, node: Node) {
        if !node.is_available() {
            return;
        }

        let pool = node.config().pool.clone();

        let orphan_sources: Vec<Node> =
            self.nodes.iter().map(|entry| entry.value().clone()).filter(|n| !n.is_available()).collect();

        for source in orphan_sources {
            if source.config().pool != pool {
                continue;
            }

            for guild_id in source.player_guild_ids() {
                let Some(link) = self.links.get(&guild_id).map(|entry| entry.value().clone()) else {
                    continue;
                };

                if link.current_node().await != source {
                    continue;
                }

                let voice_complete =
                    source.cached_player(guild_id).map(|player| player.voice.is_complete()).unwrap_or(false);

                if voice_complete {
                    if let Err(err) = link.transfer_node(node.clone()).await {
                        warn!(guild = %guild_id, error = %err, "failed to transfer an orphaned player onto a newly ready node");
                    }
                }
            }
        }
    }

    fn remove_link(&self, guild_id: GuildId) {
        self.links.remove(&guild_id);
    }
}

/// Read a guild's cached voice region off the player it has on `node`,
/// falling back to [`RegionGroup::Unknown`] (spec §4.5 `on_node_disconnected`:
/// "the guild's current voice region").
fn node_voice_region(node: &Node, guild_id: GuildId) -> RegionGroup {
    node.cached_player(guild_id)
        .and_then(|player| player.voice.endpoint)
        .map(|endpoint| region::from_endpoint(&endpoint))
        .unwrap_or(RegionGroup::Unknown)
}

fn select_error(err: SelectError) -> ClientError {
    match err {
        SelectError::Unavailable => ClientError::UnavailableCandidate,
        SelectError::NoAvailableNode => ClientError::NoAvailableNode,
    }
}

fn spawn_reconnect_scheduler(client_ref: Weak<ClientRef>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RECONNECT_CADENCE);
        loop {
            interval.tick().await;

            let Some(client_ref) = client_ref.upgrade() else { break };
            if client_ref.closed.load(Ordering::SeqCst) {
                break;
            }

            let now_ms = now_millis();
            for entry in client_ref.nodes.iter() {
                let node = entry.value();
                if node.should_attempt_reconnect(now_ms) {
                    node.reconnect(now_ms);
                }
            }
        }
    })
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Decode the bot's user id from the first dot-separated, base64-encoded
/// segment of its auth token (spec §4.5 "Bot identity").
fn user_id_from_token(token: &str) -> Result<UserId, ConfigError> {
    let mut segments = token.split('.');
    let (Some(id_segment), Some(_), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(ConfigError::MalformedToken);
    };

    let decoded = STANDARD_NO_PAD.decode(id_segment).map_err(|_| ConfigError::InvalidTokenEncoding)?;
    let decoded = String::from_utf8(decoded).map_err(|_| ConfigError::InvalidTokenEncoding)?;
    let raw: u64 = decoded.parse().map_err(|_| ConfigError::InvalidTokenUserId)?;

    UserId::new(raw).ok_or(ConfigError::InvalidTokenUserId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Client: Clone, Send, Sync);
    assert_impl_all!(ClientEvent: Clone, Send, Sync);

    fn sample_token(id: u64) -> String {
        let segment = STANDARD_NO_PAD.encode(id.to_string());
        format!("{segment}.mfa.secret")
    }

    struct NoopGateway;

    #[async_trait]
    impl VoiceGateway for NoopGateway {
        fn in_audio_channel(&self, _member: &Member) -> Option<ChannelId> {
            None
        }

        async fn connect(&self, _guild: GuildId, _channel: ChannelId) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn disconnect(&self, _guild: GuildId) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[test]
    fn user_id_is_decoded_from_the_tokens_first_segment() {
        let token = sample_token(123456789);
        assert_eq!(user_id_from_token(&token).unwrap().get(), 123456789);
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(matches!(user_id_from_token("not-a-token"), Err(ConfigError::MalformedToken)));
    }

    #[test]
    fn non_base64_segment_is_rejected() {
        assert!(matches!(
            user_id_from_token("!!!.mfa.secret"),
            Err(ConfigError::InvalidTokenEncoding)
        ));
    }

    #[tokio::test]
    async fn new_client_derives_its_user_id() {
        let token = sample_token(42);
        let client = Client::new(&token, Arc::new(NoopGateway)).unwrap();
        assert_eq!(client.user_id().get(), 42);
        client.close().await;
    }

    #[tokio::test]
    async fn duplicate_node_names_are_rejected() {
        let token = sample_token(42);
        let client = Client::new(&token, Arc::new(NoopGateway)).unwrap();

        let config = NodeConfig {
            name: "alpha".into(),
            host: "127.0.0.1".into(),
            port: 1,
            tls: false,
            authorization: "secret".into(),
            pool: "default".into(),
            region_group: RegionGroup::Unknown,
            request_timeout: Duration::from_millis(50),
            user_id: UserId::new(1).unwrap(),
        };

        client.add_node(config.clone()).unwrap();
        assert!(matches!(
            client.add_node(config),
            Err(ConfigError::DuplicateNodeName { .. })
        ));

        client.close().await;
    }

    #[tokio::test]
    async fn get_or_create_link_requires_a_mapped_pool() {
        let token = sample_token(42);
        let client = Client::new(&token, Arc::new(NoopGateway)).unwrap();
        let guild_id = GuildId::new(1).unwrap();

        assert!(matches!(
            client.get_or_create_link(guild_id, RegionGroup::Unknown),
            Err(ClientError::PoolUnmapped)
        ));

        client.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let token = sample_token(42);
        let client = Client::new(&token, Arc::new(NoopGateway)).unwrap();
        client.close().await;
        client.close().await;
    }
}

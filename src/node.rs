//! Node session lifecycle: REST calls, the event socket, and the
//! non-blocking reconnect probe (spec §4.3).
//!
//! The teacher's `Connection::run` owns a blocking retry loop: on a dropped
//! socket it calls `reconnect()`, which calls `backoff()`, which `sleep()`s
//! in place before trying again — the whole node is unavailable for up to 64
//! seconds at a time with nothing else able to run concurrently on that
//! task. Our spec wants reconnection driven by an external, non-blocking
//! probe the orchestrator polls on its own schedule, so the socket loop here
//! never sleeps: it dials once, runs until the socket closes or errors, marks
//! itself closed, and returns. A separate, tiny [`ReconnectState`] records
//! whether another attempt is due; [`Node::reconnect`] is the only thing that
//! starts a new attempt, and it's the orchestrator that decides when to call
//! it.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use time::OffsetDateTime;
use tokio::{
    net::TcpStream,
    sync::{Mutex as AsyncMutex, RwLock as AsyncRwLock},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        handshake::client::Request,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{
    balancer::PenalizedNode,
    error::NodeError,
    event::{Publisher, SubscriberId},
    http::RestClient,
    ids::{GuildId, UserId},
    link::Link,
    model::{
        EventPayload, IncomingEvent, Info, LoadResult, PlayerData, PlayerUpdate,
        PlayerUpdateEvent, Ready, Stats,
    },
    penalty::{minute_key, PenaltyEvent, PenaltyTracker},
    player::PlayerUpdateBuilder,
    region::RegionGroup,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The `Client-Name` handshake header sent to every node (spec §4.3, §6),
/// built from this crate's own package identity rather than the connecting
/// node's name, since it identifies the *client library instance*, not the
/// server it's talking to.
const CLIENT_NAME: &str = concat!("jwc/", env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Static configuration for one remote audio node (spec §3 NodeConfig).
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// The display name used in logs.
    pub name: String,
    /// The node's hostname or IP address.
    pub host: String,
    /// The node's REST/WebSocket port.
    pub port: u16,
    /// Whether to use `https`/`wss` instead of `http`/`ws`.
    pub tls: bool,
    /// The node's shared-secret password.
    pub authorization: String,
    /// The pool this node belongs to (spec §4.2 pool-scoped balancing).
    pub pool: String,
    /// The region group used to break balancer ties (spec §4.1 region bias).
    pub region_group: RegionGroup,
    /// Timeout applied to every REST call issued against this node.
    pub request_timeout: Duration,
    /// The bot's own user id, sent as the `User-Id` handshake header.
    pub user_id: UserId,
}

impl NodeConfig {
    fn schemes(&self) -> (&'static str, &'static str) {
        if self.tls { ("https", "wss") } else { ("http", "ws") }
    }

    /// The base URL for this node's REST surface.
    pub fn http_url(&self) -> String {
        let (http, _) = self.schemes();
        format!("{http}://{}:{}", self.host, self.port)
    }

    /// The URL for this node's `/v4/websocket` event socket.
    pub fn ws_url(&self) -> String {
        let (_, ws) = self.schemes();
        format!("{ws}://{}:{}/v4/websocket", self.host, self.port)
    }
}

/// The node's narrow back-edge into the orchestrator (spec §9 "Cyclic
/// ownership"). A node never holds its owning client directly — only this
/// trait object behind a [`Weak`] — so a client and its nodes never form an
/// `Arc` reference cycle.
#[async_trait]
pub trait NodeCollaborator: Send + Sync {
    /// The link bound to this guild, if any.
    fn link(&self, guild_id: GuildId) -> Option<Link>;

    /// The node's socket went down and either its reconnect budget ran out or
    /// it was closed on purpose; any guild still bound to it should be
    /// treated as orphaned.
    async fn on_node_disconnected(&self, node: Node);

    /// The node just became ready (or resumed). Move any link in the node's
    /// pool that was orphaned by another node's disconnect onto this one.
    async fn transfer_orphans_to(&self, node: Node);

    /// Drop the link registered for a guild once its player is destroyed.
    fn remove_link(&self, guild_id: GuildId);
}

/// Tracks whether a fresh reconnect attempt is due, without blocking
/// anything while it waits (spec §4.3, §7).
#[derive(Debug, Default)]
struct ReconnectState {
    /// Whether a socket task is currently running for this node.
    open: AtomicBool,
    /// Whether reconnecting is still permitted. Cleared by [`Node::close`]
    /// so a deliberate shutdown never triggers another attempt.
    may_reconnect: AtomicBool,
    reconnect_attempts: AtomicU64,
    last_attempt_ms: AtomicI64,
}

impl ReconnectState {
    /// `interval_seconds = 2 * attempts - 0.2` (spec §4.3).
    fn backoff_elapsed(&self, now_ms: i64) -> bool {
        let attempts = self.reconnect_attempts.load(Ordering::SeqCst) as f64;
        let interval_seconds = (2.0 * attempts - 0.2).max(0.0);
        let last = self.last_attempt_ms.load(Ordering::SeqCst);
        now_ms.saturating_sub(last) >= (interval_seconds * 1000.0) as i64
    }

    fn should_attempt(&self, now_ms: i64) -> bool {
        !self.open.load(Ordering::SeqCst)
            && self.may_reconnect.load(Ordering::SeqCst)
            && self.backoff_elapsed(now_ms)
    }
}

struct NodeRef {
    config: NodeConfig,
    rest: RestClient,
    session_id: AsyncRwLock<Option<String>>,
    available: AtomicBool,
    stats: AsyncRwLock<Option<Stats>>,
    players: DashMap<GuildId, PlayerData>,
    penalty: std::sync::Mutex<PenaltyTracker>,
    publisher: Publisher<IncomingEvent>,
    collaborator: Weak<dyn NodeCollaborator>,
    reconnect: ReconnectState,
    sink: AsyncMutex<Option<SplitSink<Socket, Message>>>,
}

/// A session with a single remote audio node: its REST surface, its event
/// socket, and the penalty/availability bookkeeping the balancer reads.
///
/// Cheaply `Clone`-able; every clone shares the same underlying state.
#[derive(Clone)]
pub struct Node(Arc<NodeRef>);

impl PartialEq for Node {
    /// Identity, not configuration equality: two clones of the same node
    /// session compare equal, two distinct nodes with identical config do
    /// not.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.0.config.name)
            .field("available", &self.is_available())
            .finish()
    }
}

impl Node {
    /// Build a node session and start its socket task. Returns immediately;
    /// the node is unavailable until the socket's `Ready` message arrives.
    pub fn connect(config: NodeConfig, collaborator: Weak<dyn NodeCollaborator>) -> Self {
        let rest = RestClient::new(config.http_url(), config.authorization.clone(), config.request_timeout);

        let reconnect = ReconnectState { may_reconnect: AtomicBool::new(true), ..ReconnectState::default() };

        let inner = Arc::new(NodeRef {
            config,
            rest,
            session_id: AsyncRwLock::new(None),
            available: AtomicBool::new(false),
            stats: AsyncRwLock::new(None),
            players: DashMap::new(),
            penalty: std::sync::Mutex::new(PenaltyTracker::new()),
            publisher: Publisher::new(),
            collaborator,
            reconnect,
            sink: AsyncMutex::new(None),
        });

        let node = Self(inner);
        node.spawn_socket();
        node
    }

    /// This node's static configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.0.config
    }

    /// The session id the node assigned on its last `Ready`, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.0.session_id.read().await.clone()
    }

    /// Whether the node's event socket is currently up and has sent `Ready`
    /// (spec §4.3, §8 invariant: `available ⇒ session_id is Some`).
    pub fn is_available(&self) -> bool {
        self.0.available.load(Ordering::SeqCst)
    }

    /// The latest stats snapshot, or `None` if the node hasn't sent one yet
    /// (spec §4.1 "If node unavailable or no stats snapshot: return BLOCK").
    pub async fn stats(&self) -> Option<Stats> {
        self.0.stats.read().await.clone()
    }

    /// How many guilds on this node this process itself believes are
    /// actively playing, used as the local half of the penalty formula's
    /// player-count input (spec §4.1) while waiting on a fresh stats
    /// snapshot.
    pub fn playing_players(&self) -> u64 {
        self.0.players.iter().filter(|entry| entry.track.is_some() && !entry.paused).count() as u64
    }

    /// Every guild this node currently has a cached player for (spec §9
    /// "orphan player"): used by the orchestrator to find players stranded
    /// on a node that went unavailable.
    pub fn player_guild_ids(&self) -> Vec<GuildId> {
        self.0.players.iter().map(|entry| *entry.key()).collect()
    }

    /// The locally cached player state for this guild, if any, without
    /// making a REST call.
    pub fn cached_player(&self, guild_id: GuildId) -> Option<PlayerData> {
        self.0.players.get(&guild_id).map(|entry| entry.clone())
    }

    /// Register a new event subscriber with a bounded buffer (spec §4.3,
    /// §4.5 "event republishing").
    pub fn subscribe(&self, buffer: usize) -> (SubscriberId, tokio::sync::mpsc::Receiver<IncomingEvent>) {
        self.0.publisher.subscribe(buffer)
    }

    /// Drop a subscriber registered with [`Self::subscribe`].
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.0.publisher.unsubscribe(id);
    }

    /// Return the cached player for `guild_id`, fetching and caching it if
    /// there isn't one yet (spec §4.3 `get_player`).
    ///
    /// If the remote server reports no player exists (404), a fresh,
    /// otherwise-empty update is submitted to create one, and that result is
    /// cached instead.
    pub async fn get_player(&self, guild_id: GuildId) -> Result<PlayerData, NodeError> {
        if let Some(cached) = self.cached_player(guild_id) {
            return Ok(cached);
        }

        let session_id = self.require_available().await?;

        let player = match self.0.rest.get_player(&session_id, guild_id.get()).await {
            Ok(player) => player,
            Err(NodeError::Rest(rest)) if rest.is_not_found() => {
                self.0
                    .rest
                    .update_player(&session_id, guild_id.get(), &PlayerUpdate::default(), false)
                    .await?
            }
            Err(err) => return Err(err),
        };

        self.0.players.insert(guild_id, player.clone());
        Ok(player)
    }

    /// `Some(session_id)` if the node is currently available, else fail with
    /// [`NodeError::NodeUnavailable`] (spec §4.3 "Every REST call first
    /// checks `available`").
    async fn require_available(&self) -> Result<String, NodeError> {
        if !self.is_available() {
            return Err(NodeError::NodeUnavailable);
        }

        self.session_id().await.ok_or(NodeError::NodeUnavailable)
    }

    /// Start building a player update for `guild_id` (spec §9 "builder +
    /// async subscribe pattern").
    pub fn player_update(&self, guild_id: GuildId) -> PlayerUpdateBuilder {
        PlayerUpdateBuilder::new(self.clone(), guild_id)
    }

    pub(crate) async fn update_player(
        &self,
        guild_id: GuildId,
        update: &PlayerUpdate,
        no_replace: bool,
    ) -> Result<PlayerData, NodeError> {
        let session_id = self.require_available().await?;
        let player = self.0.rest.update_player(&session_id, guild_id.get(), update, no_replace).await?;
        self.0.players.insert(guild_id, player.clone());
        Ok(player)
    }

    /// `DELETE /v4/sessions/{session}/players/{guild}` (spec §4.3).
    pub async fn destroy_player(&self, guild_id: GuildId) -> Result<(), NodeError> {
        let session_id = self.require_available().await?;
        self.0.rest.destroy_player(&session_id, guild_id.get()).await?;
        self.0.players.remove(&guild_id);
        Ok(())
    }

    /// Drop `guild_id`'s cached player from this node without issuing a
    /// REST call (spec §4.4 migration: the old node may already be
    /// unavailable, in which case [`Self::destroy_player`] no-ops before it
    /// ever touches the cache).
    pub(crate) fn evict_cached_player(&self, guild_id: GuildId) {
        self.0.players.remove(&guild_id);
    }

    /// Destroy the player on this node and drop the orchestrator's link for
    /// this guild (spec §4.4 `Link::destroy`).
    pub async fn destroy_player_and_link(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.destroy_player(guild_id).await?;
        if let Some(collaborator) = self.0.collaborator.upgrade() {
            collaborator.remove_link(guild_id);
        }
        Ok(())
    }

    /// `GET /v4/loadtracks` (spec §4.3).
    pub async fn load_item(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        if !self.is_available() {
            return Err(NodeError::NodeUnavailable);
        }

        self.0.rest.load_item(identifier).await
    }

    /// `GET /v4/info` (spec §4.3).
    pub async fn get_info(&self) -> Result<Info, NodeError> {
        if !self.is_available() {
            return Err(NodeError::NodeUnavailable);
        }

        self.0.rest.get_info().await
    }

    fn record_penalty(&self, minute: &str, event: PenaltyEvent) {
        self.0.penalty.lock().expect("penalty tracker lock poisoned").record(minute, event);
    }

    /// Whether the reconnect probe believes a new attempt is due (spec §4.3
    /// "external non-blocking probe"). Never blocks or sleeps.
    pub fn should_attempt_reconnect(&self, now_ms: i64) -> bool {
        self.0.reconnect.should_attempt(now_ms)
    }

    /// Record a reconnect attempt and start a fresh socket task. Call sites
    /// are expected to have just checked [`Self::should_attempt_reconnect`].
    pub fn reconnect(&self, now_ms: i64) {
        self.0.reconnect.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        self.0.reconnect.last_attempt_ms.store(now_ms, Ordering::SeqCst);
        self.spawn_socket();
    }

    /// Close the node's socket and disable reconnection. Idempotent.
    pub async fn close(&self) {
        self.0.reconnect.may_reconnect.store(false, Ordering::SeqCst);

        if let Some(mut sink) = self.0.sink.lock().await.take() {
            let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
            let _ = sink.send(Message::Close(Some(frame))).await;
            let _ = sink.close().await;
        }

        self.0.available.store(false, Ordering::SeqCst);
        self.0.reconnect.open.store(false, Ordering::SeqCst);
        self.0.publisher.close();
    }

    fn spawn_socket(&self) {
        self.0.reconnect.open.store(true, Ordering::SeqCst);
        let node = self.clone();
        tokio::spawn(async move { node.run_socket().await });
    }

    async fn dial(&self, resume_session: Option<&str>) -> Result<(SplitSink<Socket, Message>, SplitStream<Socket>), NodeError> {
        let mut builder = Request::builder()
            .uri(self.0.config.ws_url())
            .header("Authorization", &self.0.config.authorization)
            .header("User-Id", self.0.config.user_id.to_string())
            .header("Client-Name", CLIENT_NAME);

        if let Some(session_id) = resume_session {
            builder = builder.header("Session-Id", session_id);
        }

        let request = builder.body(()).map_err(|err| NodeError::BuildingRequest(Box::new(err)))?;

        let (socket, _response) =
            connect_async(request).await.map_err(|err| NodeError::Transport(Box::new(err)))?;

        Ok(socket.split())
    }

    async fn run_socket(&self) {
        let resume_session = self.0.session_id.read().await.clone();

        let (sink, mut stream) = match self.dial(resume_session.as_deref()).await {
            Ok(split) => split,
            Err(err) => {
                warn!(node = %self.0.config.name, error = %err, "failed to connect to node");
                self.note_disconnect(false).await;
                return;
            }
        };

        *self.0.sink.lock().await = Some(sink);

        let mut closed_normally = false;

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_text(&text).await,
                Ok(Message::Close(frame)) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1000);
                    info!(node = %self.0.config.name, code, "event socket closed by remote");
                    closed_normally = code == u16::from(CloseCode::Normal);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(node = %self.0.config.name, error = %err, "event socket error");
                    break;
                }
            }
        }

        self.note_disconnect(closed_normally).await;
    }

    /// `closed_normally` is set when the remote closed with code 1000
    /// (spec §4.3 "Reconnect state machine": "if normal (code 1000), set
    /// `may_reconnect = false`"). A dropped/errored socket never sets this.
    async fn note_disconnect(&self, closed_normally: bool) {
        self.0.available.store(false, Ordering::SeqCst);
        self.0.reconnect.open.store(false, Ordering::SeqCst);
        *self.0.sink.lock().await = None;

        if closed_normally {
            self.0.reconnect.may_reconnect.store(false, Ordering::SeqCst);
        }

        if let Some(collaborator) = self.0.collaborator.upgrade() {
            collaborator.on_node_disconnected(self.clone()).await;
        }
    }

    async fn handle_text(&self, text: &str) {
        let event: IncomingEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(node = %self.0.config.name, error = %err, "failed to parse event socket message");
                return;
            }
        };

        match &event {
            IncomingEvent::Ready(ready) => self.handle_ready(ready).await,
            IncomingEvent::Stats(stats) => *self.0.stats.write().await = Some(stats.clone()),
            IncomingEvent::PlayerUpdate(update) => self.handle_player_update(update).await,
            IncomingEvent::Event(payload) => self.handle_track_event(payload).await,
        }

        if let Err(err) = self.0.publisher.publish(event) {
            debug!(
                node = %self.0.config.name,
                lagging = err.lagging_subscribers.len(),
                "event subscriber(s) lagging"
            );
        }
    }

    async fn handle_ready(&self, ready: &Ready) {
        *self.0.session_id.write().await = Some(ready.session_id.clone());
        self.0.available.store(true, Ordering::SeqCst);

        if !ready.resumed {
            self.0.penalty.lock().expect("penalty tracker lock poisoned").reset();
        }

        self.rebind_cached_players().await;

        if let Some(collaborator) = self.0.collaborator.upgrade() {
            collaborator.transfer_orphans_to(self.clone()).await;
        }
    }

    /// Re-POST the voice state of every cached player whose voice-state is
    /// complete, so the remote server re-binds it to the Discord voice
    /// connection it had before the socket dropped (spec §4.3 `Ready`).
    async fn rebind_cached_players(&self) {
        let pending: Vec<_> = self
            .0
            .players
            .iter()
            .filter(|entry| entry.voice.is_complete())
            .map(|entry| (*entry.key(), entry.voice.clone()))
            .collect();

        for (guild_id, voice) in pending {
            let result = self.player_update(guild_id).voice(voice).subscribe(false).await;
            if let Err(err) = result {
                warn!(node = %self.0.config.name, guild = %guild_id, error = %err, "failed to rebind a cached player on ready");
            }
        }
    }

    async fn handle_player_update(&self, update: &PlayerUpdateEvent) {
        if let Some(mut cached) = self.0.players.get_mut(&update.guild_id) {
            cached.state = update.state;
        }

        let Some(collaborator) = self.0.collaborator.upgrade() else { return };
        let Some(link) = collaborator.link(update.guild_id) else { return };

        if update.state.connected {
            link.mark_connected();
        } else {
            link.mark_disconnected();
        }
    }

    async fn handle_track_event(&self, payload: &EventPayload) {
        let minute = minute_key(OffsetDateTime::now_utc());

        match payload {
            EventPayload::TrackStartEvent(start) => {
                if let Some(mut cached) = self.0.players.get_mut(&start.guild_id) {
                    cached.track = Some(start.track.clone());
                }
                self.record_penalty(&minute, PenaltyEvent::LoadAttempt);
            }
            EventPayload::TrackEndEvent(end) => {
                if let Some(mut cached) = self.0.players.get_mut(&end.guild_id) {
                    cached.track = None;
                }
                if end.reason.is_load_failed() {
                    self.record_penalty(&minute, PenaltyEvent::LoadFailed);
                }
            }
            EventPayload::TrackExceptionEvent(_) => {
                self.record_penalty(&minute, PenaltyEvent::TrackException);
            }
            EventPayload::TrackStuckEvent(_) => {
                self.record_penalty(&minute, PenaltyEvent::TrackStuck);
            }
            EventPayload::WebSocketClosedEvent(closed) => {
                if matches!(closed.code, 4004 | 4009) {
                    if let Err(err) = self.destroy_player_and_link(closed.guild_id).await {
                        warn!(
                            node = %self.0.config.name,
                            guild = %closed.guild_id,
                            error = %err,
                            "failed to tear down a player after a terminal socket close"
                        );
                    }
                }
            }
        }
    }
}

impl PenalizedNode for Node {
    fn is_available(&self) -> bool {
        Node::is_available(self)
    }

    /// Spec §4.1 step 1 / §8 invariant 3: an unavailable node, or one that
    /// hasn't sent a stats snapshot yet, scores exactly [`BLOCK`][crate::penalty::BLOCK].
    fn penalty_total(&self) -> i64 {
        if !self.is_available() {
            return crate::penalty::BLOCK;
        }

        let Some(stats) = self.0.stats.try_read().ok().and_then(|guard| guard.clone()) else {
            return crate::penalty::BLOCK;
        };

        self.0
            .penalty
            .lock()
            .expect("penalty tracker lock poisoned")
            .calculate_total(&stats, self.playing_players())
    }

    fn region_group(&self) -> RegionGroup {
        self.0.config.region_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Node: Clone, Send, Sync);

    fn config() -> NodeConfig {
        NodeConfig {
            name: "test".into(),
            host: "lavalink.example".into(),
            port: 2333,
            tls: false,
            authorization: "secret".into(),
            pool: "default".into(),
            region_group: RegionGroup::Unknown,
            request_timeout: Duration::from_secs(5),
            user_id: UserId::new(1).unwrap(),
        }
    }

    #[test]
    fn http_url_reflects_tls_flag() {
        assert_eq!(config().http_url(), "http://lavalink.example:2333");

        let mut tls = config();
        tls.tls = true;
        assert_eq!(tls.http_url(), "https://lavalink.example:2333");
    }

    #[test]
    fn ws_url_targets_the_v4_event_socket() {
        assert_eq!(config().ws_url(), "ws://lavalink.example:2333/v4/websocket");
    }

    #[test]
    fn reconnect_state_never_attempts_while_open() {
        let state = ReconnectState { may_reconnect: AtomicBool::new(true), ..ReconnectState::default() };
        state.open.store(true, Ordering::SeqCst);
        assert!(!state.should_attempt(1_000_000));
    }

    #[test]
    fn reconnect_state_respects_the_backoff_curve() {
        let state = ReconnectState { may_reconnect: AtomicBool::new(true), ..ReconnectState::default() };
        state.reconnect_attempts.store(3, Ordering::SeqCst);
        state.last_attempt_ms.store(0, Ordering::SeqCst);

        // interval = 2*3 - 0.2 = 5.8s
        assert!(!state.should_attempt(5_000));
        assert!(state.should_attempt(5_800));
    }

    #[test]
    fn reconnect_state_never_attempts_once_closed_for_good() {
        let state = ReconnectState::default();
        assert!(!state.should_attempt(i64::MAX));
    }

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

    #[tokio::test]
    async fn normal_close_clears_may_reconnect() {
        let strong: Arc<dyn NodeCollaborator> = Arc::new(Noop);
        let node = Node::connect(config(), Arc::downgrade(&strong));

        assert!(node.0.reconnect.may_reconnect.load(Ordering::SeqCst));
        node.note_disconnect(true).await;
        assert!(!node.0.reconnect.may_reconnect.load(Ordering::SeqCst));
        assert!(!node.should_attempt_reconnect(i64::MAX));
    }

    #[tokio::test]
    async fn abnormal_disconnect_leaves_may_reconnect_set() {
        let strong: Arc<dyn NodeCollaborator> = Arc::new(Noop);
        let node = Node::connect(config(), Arc::downgrade(&strong));

        node.note_disconnect(false).await;
        assert!(node.0.reconnect.may_reconnect.load(Ordering::SeqCst));
    }
}

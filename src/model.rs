//! Wire models for the node's REST responses and event-socket messages.
//!
//! Ref: spec §3 (Player/Node data), §4.3 (event socket dispatch), §6 (REST
//! responses). Kept in the teacher's `(de)serialize with serde` idiom
//! (`examples/twilight-rs-twilight/lavalink/src/model.rs`), generalized from
//! the teacher's v3, single-opcode-per-message wire shape to the v4
//! sessions/PATCH shape this spec describes.
//!
//! As in the teacher's module, the wire payload structs live in private
//! `incoming`/`outgoing` submodules and are re-exported with `pub use`:
//! their fields describe a fixed REST/JSON shape, not an API surface worth
//! documenting field-by-field, and nesting them keeps `missing_docs` from
//! demanding it.

use serde::{Deserialize, Serialize};

/// The voice-state half a player needs to bind to a Discord voice
/// connection (spec §3 Player: `voice-state {token, endpoint, session_id}`).
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    /// The voice server's session token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// The voice server's endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// The gateway voice-state session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl VoiceState {
    /// Whether all three fields are present and non-blank (spec §4.3:
    /// "voice-state is non-empty").
    pub fn is_complete(&self) -> bool {
        [self.token.as_deref(), self.endpoint.as_deref(), self.session_id.as_deref()]
            .into_iter()
            .all(|field| matches!(field, Some(value) if !value.is_empty()))
    }
}

/// Filter configuration attached to a player. Carried opaquely: the core
/// never interprets filter contents, only forwards and reuses them across a
/// migration (spec §4.4 `transfer_node`/`transfer_to_pool`).
pub type Filters = serde_json::Value;

mod incoming {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::{Filters, VoiceState};
    use crate::ids::GuildId;

    /// Track metadata returned alongside an encoded track string.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TrackInfo {
        pub identifier: String,
        pub is_seekable: bool,
        pub author: String,
        pub length: u64,
        pub is_stream: bool,
        pub position: u64,
        pub title: String,
        pub uri: Option<String>,
        pub source_name: String,
    }

    /// An encoded track plus its metadata, as returned by `load_item` and
    /// embedded in player/track events.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Track {
        pub encoded: String,
        pub info: TrackInfo,
    }

    /// The result of `GET /v4/loadtracks` (spec §4.3, §6).
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
    pub enum LoadResult {
        Track(Track),
        Playlist(PlaylistResult),
        Search(Vec<Track>),
        Empty,
        Error(LoadError),
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PlaylistInfo {
        pub name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub selected_track: Option<i64>,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PlaylistResult {
        pub info: PlaylistInfo,
        #[serde(default)]
        pub plugin_info: Value,
        pub tracks: Vec<Track>,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LoadError {
        pub message: String,
        pub severity: String,
        #[serde(default)]
        pub cause: Option<String>,
    }

    /// `GET /v4/info` (spec §4.3, §6). Fields beyond what the rest of the
    /// crate reads are preserved as opaque JSON rather than enumerated
    /// exhaustively.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Info {
        pub version: Value,
        #[serde(rename = "buildTime")]
        pub build_time: u64,
        #[serde(flatten)]
        pub rest: Value,
    }

    /// CPU load reported in a [`Stats`] snapshot.
    #[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StatsCpu {
        pub cores: usize,
        pub system_load: f64,
        pub lavalink_load: f64,
    }

    /// Memory usage reported in a [`Stats`] snapshot.
    #[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StatsMemory {
        pub free: u64,
        pub used: u64,
        pub allocated: u64,
        pub reservable: u64,
    }

    /// Frame statistics reported in a [`Stats`] snapshot. Absent (or with
    /// `deficit == -1`) when the node hasn't played anything recently.
    #[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct StatsFrames {
        pub sent: i64,
        pub nulled: i64,
        pub deficit: i64,
    }

    /// A periodic node statistics snapshot (`op: "stats"`).
    ///
    /// Ref: spec §4.1 penalty calculation inputs.
    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Stats {
        pub players: u64,
        pub playing_players: u64,
        pub uptime: u64,
        pub memory: StatsMemory,
        pub cpu: StatsCpu,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub frame_stats: Option<StatsFrames>,
    }

    /// The `Ready` payload (`op: "ready"`).
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Ready {
        pub resumed: bool,
        pub session_id: String,
    }

    /// The `state` object within a `playerUpdate` message.
    #[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PlayerState {
        pub time: i64,
        #[serde(default)]
        pub position: i64,
        pub connected: bool,
        #[serde(default)]
        pub ping: i64,
    }

    /// A `playerUpdate` message, reporting playback position/connection
    /// health for one guild's player.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PlayerUpdateEvent {
        pub guild_id: GuildId,
        pub state: PlayerState,
    }

    /// Why a track stopped playing (`op: "event", type: "TrackEndEvent"`).
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum TrackEndReason {
        Finished,
        LoadFailed,
        Stopped,
        Replaced,
        Cleanup,
    }

    impl TrackEndReason {
        /// Whether this reason counts as a `LOAD_FAILED` penalty event (spec
        /// §4.1).
        pub const fn is_load_failed(self) -> bool {
            matches!(self, Self::LoadFailed)
        }
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TrackStartEvent {
        pub guild_id: GuildId,
        pub track: Track,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TrackEndEvent {
        pub guild_id: GuildId,
        pub track: Track,
        pub reason: TrackEndReason,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TrackExceptionEvent {
        pub guild_id: GuildId,
        pub track: Track,
        pub exception: Value,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TrackStuckEvent {
        pub guild_id: GuildId,
        pub track: Track,
        pub threshold_ms: u64,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WebSocketClosedEvent {
        pub guild_id: GuildId,
        pub code: u16,
        pub reason: String,
        pub by_remote: bool,
    }

    /// The payload of an `op: "event"` message, discriminated by `type`.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(tag = "type")]
    pub enum EventPayload {
        TrackStartEvent(TrackStartEvent),
        TrackEndEvent(TrackEndEvent),
        TrackExceptionEvent(TrackExceptionEvent),
        TrackStuckEvent(TrackStuckEvent),
        WebSocketClosedEvent(WebSocketClosedEvent),
    }

    impl EventPayload {
        /// The guild this event pertains to, regardless of variant.
        pub const fn guild_id(&self) -> GuildId {
            match self {
                Self::TrackStartEvent(e) => e.guild_id,
                Self::TrackEndEvent(e) => e.guild_id,
                Self::TrackExceptionEvent(e) => e.guild_id,
                Self::TrackStuckEvent(e) => e.guild_id,
                Self::WebSocketClosedEvent(e) => e.guild_id,
            }
        }
    }

    /// Any message the event socket can deliver, discriminated by `op`.
    ///
    /// This is the type republished verbatim to application listeners via
    /// the event publisher (spec §4.3 "regardless of kind, the message is
    /// republished").
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(tag = "op", rename_all = "camelCase")]
    pub enum IncomingEvent {
        Ready(Ready),
        Stats(Stats),
        PlayerUpdate(PlayerUpdateEvent),
        Event(EventPayload),
    }

    /// The full cached representation of a guild's player (spec §3 Player),
    /// as returned by `GET`/`PATCH /v4/sessions/{id}/players/{guild}`.
    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PlayerData {
        pub guild_id: GuildId,
        #[serde(default)]
        pub track: Option<Track>,
        pub volume: i64,
        pub paused: bool,
        pub state: PlayerState,
        pub voice: VoiceState,
        #[serde(default)]
        pub filters: Filters,
    }
}

mod outgoing {
    use serde::{Deserialize, Serialize};

    use super::{Filters, VoiceState};

    /// The `track` object accepted by an update-player PATCH body.
    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UpdatePlayerTrack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub encoded: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub identifier: Option<String>,
    }

    /// The body of `PATCH /v4/sessions/{id}/players/{guild}`.
    ///
    /// Built incrementally and submitted through
    /// [`Node::update_player`][crate::node::Node::update_player]; only the
    /// fields that were set are serialized (`skip_serializing_if`), matching
    /// the PATCH semantics named in spec §4.3.
    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PlayerUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub track: Option<UpdatePlayerTrack>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub position: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub end_time: Option<Option<i64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub volume: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub paused: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub filters: Option<Filters>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub voice: Option<VoiceState>,
    }

    impl PlayerUpdate {
        /// Set the track to play.
        ///
        /// Stores into [`Self::track`] so the field actually reaches the
        /// outgoing PATCH body.
        pub fn set_track(&mut self, track_update: UpdatePlayerTrack) -> &mut Self {
            self.track = Some(track_update);
            self
        }

        pub fn set_position(&mut self, position: i64) -> &mut Self {
            self.position = Some(position);
            self
        }

        pub fn clear_end_time(&mut self) -> &mut Self {
            self.end_time = Some(None);
            self
        }

        pub fn set_volume(&mut self, volume: i64) -> &mut Self {
            self.volume = Some(volume);
            self
        }

        pub fn set_paused(&mut self, paused: bool) -> &mut Self {
            self.paused = Some(paused);
            self
        }

        pub fn set_filters(&mut self, filters: Filters) -> &mut Self {
            self.filters = Some(filters);
            self
        }

        pub fn set_voice(&mut self, voice: VoiceState) -> &mut Self {
            self.voice = Some(voice);
            self
        }
    }
}

pub use self::{incoming::*, outgoing::*};

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(IncomingEvent: Clone, Debug, PartialEq, Send, Sync);
    assert_impl_all!(PlayerUpdate: Clone, Debug, Default, PartialEq, Send, Sync);
    assert_impl_all!(PlayerData: Clone, Debug, PartialEq, Send, Sync);

    #[test]
    fn voice_state_completeness() {
        let mut vs = VoiceState::default();
        assert!(!vs.is_complete());

        vs.token = Some("t".into());
        vs.endpoint = Some("e".into());
        vs.session_id = Some("s".into());
        assert!(vs.is_complete());

        vs.session_id = Some(String::new());
        assert!(!vs.is_complete());
    }

    #[test]
    fn deserializes_ready_event() {
        let json = r#"{"op":"ready","resumed":false,"sessionId":"abc123"}"#;
        let event: IncomingEvent = serde_json::from_str(json).unwrap();

        assert_eq!(
            event,
            IncomingEvent::Ready(Ready { resumed: false, session_id: "abc123".into() })
        );
    }

    #[test]
    fn deserializes_player_update_event() {
        let json = r#"{
            "op":"playerUpdate",
            "guildId":"1",
            "state":{"time":1000,"position":2000,"connected":true,"ping":12}
        }"#;
        let event: IncomingEvent = serde_json::from_str(json).unwrap();

        match event {
            IncomingEvent::PlayerUpdate(update) => {
                assert_eq!(update.guild_id.get(), 1);
                assert_eq!(update.state.position, 2000);
                assert!(update.state.connected);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn deserializes_websocket_closed_event() {
        let json = r#"{
            "op":"event",
            "type":"WebSocketClosedEvent",
            "guildId":"42",
            "code":4006,
            "reason":"session invalid",
            "byRemote":true
        }"#;
        let event: IncomingEvent = serde_json::from_str(json).unwrap();

        match event {
            IncomingEvent::Event(EventPayload::WebSocketClosedEvent(closed)) => {
                assert_eq!(closed.code, 4006);
                assert!(closed.by_remote);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn player_update_only_serializes_fields_that_were_set() {
        let mut update = PlayerUpdate::default();
        update.set_paused(true);

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "paused": true }));
    }
}

//! Crate-wide error taxonomy (spec §7).
//!
//! Kept in the teacher's idiom: `#[non_exhaustive]` enums with manual
//! `Display`/`Error` impls rather than a derive-macro crate, matching
//! `twilight-lavalink`'s `NodeError`/`ClientError`.

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

use crate::gateway::GatewayError;

/// An error surfaced by a REST call against a node, after the remote server
/// responded with a status greater than 299.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RestError {
    /// The HTTP status code the node responded with.
    pub status: u16,
    /// The human-readable message the node attached to the error.
    pub message: String,
}

impl RestError {
    /// Whether the node reported that the resource didn't exist.
    ///
    /// Callers use this to distinguish "no player for this guild yet" from
    /// other failure modes (spec §7).
    pub const fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl Display for RestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "node responded with status {}: {}", self.status, self.message)
    }
}

impl StdError for RestError {}

/// An error that can occur while interacting with a single node.
#[derive(Debug)]
#[non_exhaustive]
pub enum NodeError {
    /// The node is not currently available (socket down or never readied).
    ///
    /// Ref: spec §7 `NodeUnavailable`.
    NodeUnavailable,
    /// The remote server returned a non-2xx/204 response.
    ///
    /// Ref: spec §7 `RestError`.
    Rest(RestError),
    /// A transport-level failure: IO error, timeout, EOF, or connect
    /// failure. Always paired with a disconnect notification to the
    /// orchestrator and (unless a normal close already cleared
    /// `may_reconnect`) reconnect eligibility.
    ///
    /// Ref: spec §7 `TransportError`.
    Transport(Box<dyn StdError + Send + Sync>),
    /// Building the outbound HTTP or WebSocket handshake request failed.
    BuildingRequest(Box<dyn StdError + Send + Sync>),
    /// Serializing an outgoing payload to JSON failed.
    Serializing(serde_json::Error),
}

impl Display for NodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NodeUnavailable => f.write_str("node is not currently available"),
            Self::Rest(source) => Display::fmt(source, f),
            Self::Transport(source) => write!(f, "transport error: {source}"),
            Self::BuildingRequest(source) => write!(f, "failed to build request: {source}"),
            Self::Serializing(source) => write!(f, "failed to serialize outgoing message: {source}"),
        }
    }
}

impl StdError for NodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::NodeUnavailable => None,
            Self::Rest(source) => Some(source),
            Self::Transport(source) => Some(source.as_ref()),
            Self::BuildingRequest(source) => Some(source.as_ref()),
            Self::Serializing(source) => Some(source),
        }
    }
}

/// An error raised at configuration/construction time.
///
/// Ref: spec §7 `ConfigError`. These are always fatal at the call site.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The bot token did not split into exactly three dot-separated
    /// segments.
    MalformedToken,
    /// The first segment of the token was not valid base64.
    InvalidTokenEncoding,
    /// The decoded first segment was not a valid decimal user id.
    InvalidTokenUserId,
    /// A node with this name is already registered.
    DuplicateNodeName {
        /// The conflicting name.
        name: String,
    },
    /// A required builder field was never set.
    MissingField {
        /// The name of the missing field.
        field: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MalformedToken => f.write_str("token must have exactly three dot-separated segments"),
            Self::InvalidTokenEncoding => f.write_str("token's first segment is not valid base64"),
            Self::InvalidTokenUserId => f.write_str("token's decoded user id is not a valid integer"),
            Self::DuplicateNodeName { name } => write!(f, "a node named {name:?} is already configured"),
            Self::MissingField { field } => write!(f, "missing required field: {field}"),
        }
    }
}

impl StdError for ConfigError {}

/// An error raised while orchestrating links, nodes, and pools.
#[derive(Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// The balancer found no available candidate node.
    ///
    /// Ref: spec §7 `NoAvailableNode`.
    NoAvailableNode,
    /// `get_or_create_link` was invoked before a pool was assigned to the
    /// guild.
    ///
    /// Ref: spec §7 `PoolUnmapped`.
    PoolUnmapped,
    /// A configuration error occurred while registering a node.
    Config(ConfigError),
    /// The single candidate passed to the balancer was unavailable.
    UnavailableCandidate,
    /// A node operation (REST call or player update) failed while
    /// orchestrating a link.
    Node(NodeError),
    /// The embedding application's gateway integration failed to join or
    /// leave an audio channel.
    Gateway(GatewayError),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NoAvailableNode => f.write_str("no available node in the requested pool"),
            Self::PoolUnmapped => f.write_str("no pool has been assigned to this guild yet"),
            Self::Config(source) => Display::fmt(source, f),
            Self::UnavailableCandidate => f.write_str("unavailable"),
            Self::Node(source) => Display::fmt(source, f),
            Self::Gateway(source) => Display::fmt(source, f),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Config(source) => Some(source),
            Self::Node(source) => Some(source),
            Self::Gateway(source) => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(source: ConfigError) -> Self {
        Self::Config(source)
    }
}

impl From<NodeError> for ClientError {
    fn from(source: NodeError) -> Self {
        Self::Node(source)
    }
}

impl From<GatewayError> for ClientError {
    fn from(source: GatewayError) -> Self {
        Self::Gateway(source)
    }
}

#![deny(
    clippy::all,
    clippy::missing_const_for_fn,
    future_incompatible,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused
)]
#![doc = include_str!("../README.md")]

pub mod balancer;
pub mod client;
pub mod error;
pub mod event;
pub mod gateway;
pub mod http;
pub mod ids;
pub mod link;
pub mod model;
pub mod node;
pub mod penalty;
pub mod player;
pub mod region;

pub use self::{
    client::Client,
    error::{ClientError, ConfigError, NodeError},
    link::Link,
    node::{Node, NodeConfig},
    player::PlayerUpdateBuilder,
};

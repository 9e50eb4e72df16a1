//! A bidirectional RPC multiplexer for embedded/edge devices: routes
//! self-describing JSON frames over pluggable, synchronous transports.
//!
//! The entry point is [`Multiplexer`]; an embedding application implements
//! [`Channel`] for each transport it wants to speak over (WebSocket,
//! serial, a loopback pair in tests) and feeds inbound events to
//! [`Multiplexer::handle_channel_event`].

pub mod auth;
pub mod channel;
pub mod config;
pub mod destination;
pub mod error;
pub mod frame;
mod handlers;
pub mod mux;
pub mod observer;
pub mod pending;
pub mod queue;

pub use crate::auth::{check_digest_auth, DigestVerifier, HtdigestSource};
pub use crate::channel::{Channel, ChannelDialer, ChannelEvent, ChannelId};
pub use crate::config::{MuxConfig, OutboundDefaults};
pub use crate::destination::{DialRequest, DialScheme};
pub use crate::error::RpcError;
pub use crate::frame::{Frame, FrameError, DST_DEFAULT};
pub use crate::mux::{CallOpts, ChannelInfo, FrameInfo, HandlerCb, Multiplexer, PrehandlerCb, RequestInfo};
pub use crate::observer::{ObserverCallback, ObserverEvent, ObserverId};
pub use crate::pending::ResultCallback;

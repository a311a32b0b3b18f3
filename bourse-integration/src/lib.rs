#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Bourse-Integration
//! Message-oriented socket fabric underpinning the Bourse backtest runtime.
//! Provides the framed request/response envelopes, the four socket patterns
//! the runtime speaks (request-reply, publish-subscribe,
//! surveyor-respondent), and the typed task router that maps task names to
//! handlers and payload schemas.
//!
//! Every message on the wire is a single length-prefixed JSON frame
//! decodable into a [`Request`] or [`Response`]; `load(dump(x)) == x` holds
//! for every envelope. Sockets carry independent send and receive deadlines:
//! a receive past its deadline surfaces as a recoverable
//! [`SocketError::Timeout`], while closure surfaces as
//! [`SocketError::Closed`] and ends the owning loop.

/// Socket descriptor: pattern, address, listen/dial role, deadlines.
pub mod config;

/// All socket IO and routing errors generated in `bourse-integration`.
pub mod error;

/// Length-prefixed framing over byte streams.
pub mod frame;

/// Request/Response envelopes, the universal unit of transport.
pub mod message;

/// Task router: `{task -> (handler, payload schema)}`.
pub mod router;

/// Socket pattern endpoints over TCP.
pub mod socket;

pub use config::{SocketConfig, SocketPattern};
pub use error::{RouterError, SocketError};
pub use message::{Request, Response};
pub use router::{HandlerError, Router};
pub use socket::{
    pubsub::{Publisher, Subscriber},
    reply::{Replier, ReplyContext},
    request::Requester,
    survey::{Respondent, Surveyor},
};

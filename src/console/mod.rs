//! Loopback console plumbing between the CLI verbs and the running daemon:
//! the endpoint serving requests, the synchronous client, and the framed
//! message types shared by both sides.

mod client;
mod console_endpoint;
mod messages;

pub use client::{reachable, request};
pub use console_endpoint::ConsoleEndpoint;
pub use messages::{ConsoleError, DownstreamMessage, UpstreamMessage};

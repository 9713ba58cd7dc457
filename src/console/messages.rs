use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use strum_macros::Display;

/// Sanity cap for inbound console frames; every legitimate message is tiny.
pub const FRAME_LIMIT: u32 = 1024;

/// CLI -> daemon requests.
#[derive(Debug, Serialize, Deserialize)]
pub enum UpstreamMessage {
    Status,
    State,
    SetState(u8),
    Command(u16),
    Stop,
}

/// Daemon -> CLI replies.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownstreamMessage {
    Ack,
    State(u8),
    Rejected(String),
}

#[derive(Debug, Display)]
pub enum ConsoleError {
    Io(std::io::Error),
    BadAddress(std::net::AddrParseError),
    Encode(bincode::error::EncodeError),
    Decode(bincode::error::DecodeError),
    OversizedFrame(u32),
}

impl std::error::Error for ConsoleError {}

impl From<std::io::Error> for ConsoleError {
    fn from(value: std::io::Error) -> Self { ConsoleError::Io(value) }
}

impl From<std::net::AddrParseError> for ConsoleError {
    fn from(value: std::net::AddrParseError) -> Self { ConsoleError::BadAddress(value) }
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ConsoleError> {
    bincode::serde::encode_to_vec(message, bincode::config::standard()).map_err(ConsoleError::Encode)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ConsoleError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(message, _)| message)
        .map_err(ConsoleError::Decode)
}

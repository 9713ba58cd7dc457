use super::messages::{self, ConsoleError, DownstreamMessage, UpstreamMessage};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const REPLY_TIMEOUT: Duration = Duration::from_millis(1500);

/// One synchronous request/reply exchange with the daemon's console
/// endpoint. The CLI side has no runtime of its own and does not need one.
#[allow(clippy::cast_possible_truncation)]
pub fn request(addr: &str, message: &UpstreamMessage) -> Result<DownstreamMessage, ConsoleError> {
    let addr: SocketAddr = addr.parse()?;
    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
    stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
    stream.set_write_timeout(Some(REPLY_TIMEOUT))?;

    let payload = messages::encode(message)?;
    stream.write_all(&(payload.len() as u32).to_be_bytes())?;
    stream.write_all(&payload)?;

    let mut length_buf = [0u8; 4];
    stream.read_exact(&mut length_buf)?;
    let length = u32::from_be_bytes(length_buf);
    if length > messages::FRAME_LIMIT {
        return Err(ConsoleError::OversizedFrame(length));
    }
    let mut buffer = vec![0u8; length as usize];
    stream.read_exact(&mut buffer)?;
    messages::decode(&buffer)
}

/// True when a daemon is up and answering on the given console address.
pub fn reachable(addr: &str) -> bool {
    matches!(request(addr, &UpstreamMessage::Status), Ok(DownstreamMessage::Ack))
}

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::WireError;

/// A TCP stream carrying length-delimited JSON frames.
pub type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Frames larger than this are rejected by the codec.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub fn framed(stream: TcpStream) -> FramedStream {
    let mut codec = LengthDelimitedCodec::new();
    codec.set_max_frame_length(MAX_FRAME_LEN);
    Framed::new(stream, codec)
}

pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, WireError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub async fn send<T: Serialize>(stream: &mut FramedStream, value: &T) -> Result<(), WireError> {
    let bytes = encode(value)?;
    stream.send(bytes).await?;
    Ok(())
}

/// Read the next frame, or `None` when the peer closed the connection.
pub async fn recv_raw(stream: &mut FramedStream) -> Result<Option<Bytes>, WireError> {
    match stream.next().await {
        Some(Ok(frame)) => Ok(Some(frame.freeze())),
        Some(Err(e)) => Err(WireError::Io(e)),
        None => Ok(None),
    }
}

pub async fn recv<T: DeserializeOwned>(stream: &mut FramedStream) -> Result<Option<T>, WireError> {
    match recv_raw(stream).await? {
        Some(frame) => Ok(Some(decode(&frame)?)),
        None => Ok(None),
    }
}

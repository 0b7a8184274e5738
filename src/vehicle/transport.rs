//! Transport layer between a session and the radio link.
//!
//! A transport only moves whole frames. Outbound frames go through
//! [`Transport::send`]; inbound frames are pushed into
//! [`Session::on_frame`] by one of the pumps below, which keeps them in
//! arrival order and reports link loss when the source runs dry.
//!
//! On a byte stream (the TCP bridge) frames need no extra framing: the size
//! byte at the front of every frame says how many bytes follow.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::session::Session;
use crate::error::{Error, Result};

/// Outbound half of a vehicle link.
pub trait Transport: Send + Sync {
    /// Queue one frame for the vehicle. Best effort: success means the frame
    /// was handed to the link, not that the vehicle received it.
    fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Subscribe to inbound notifications on the read channel.
    fn enable_notifications(&self) -> Result<()> {
        Ok(())
    }
}

/// Transport that hands frames to an in-process channel.
///
/// The receiving end is either a writer task for a socket or a simulated
/// vehicle.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (outgoing, rx) = mpsc::unbounded_channel();
        (Self { outgoing }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.outgoing.send(frame).map_err(|_| Error::LinkClosed)
    }
}

/// Read one size-prefixed frame from a byte stream.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let size = match reader.read_u8().await {
        Ok(size) => size,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut frame = vec![0u8; size as usize + 1];
    frame[0] = size;
    reader.read_exact(&mut frame[1..]).await?;
    Ok(Some(frame))
}

/// Write every queued frame to a byte stream until the queue closes.
pub async fn write_frames<W>(mut frames: mpsc::UnboundedReceiver<Vec<u8>>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            warn!("write error: {:?}", e);
            return;
        }
    }
}

/// Feed frames from an in-process channel into a session.
pub async fn pump_frames<T: Transport>(
    mut frames: mpsc::Receiver<Vec<u8>>,
    session: Arc<Session<T>>,
) {
    while let Some(frame) = frames.recv().await {
        // Bad frames are logged by the session; the link stays up.
        let _ = session.on_frame(&frame).await;
    }
    session.on_link_lost().await;
}

/// Feed frames from a byte stream into a session.
pub async fn read_frames<R, T>(mut reader: R, session: Arc<Session<T>>)
where
    R: AsyncRead + Unpin,
    T: Transport,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                let _ = session.on_frame(&frame).await;
            }
            Ok(None) => {
                info!("bridge closed the connection");
                break;
            }
            Err(e) => {
                warn!("read error: {:?}", e);
                break;
            }
        }
    }
    session.on_link_lost().await;
}

/// Connect to a TCP frame bridge.
///
/// Returns the transport for the session and the read half to hand to
/// [`read_frames`] once the session exists.
pub async fn connect_tcp(addr: impl ToSocketAddrs) -> Result<(ChannelTransport, OwnedReadHalf)> {
    let stream = TcpStream::connect(addr).await?;
    debug!("connected to bridge at {:?}", stream.peer_addr());

    let (reader, writer) = stream.into_split();
    let (transport, outgoing) = ChannelTransport::pair();
    tokio::spawn(write_frames(outgoing, writer));

    Ok((transport, reader))
}

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;

use ms_base::{transport, Result};

use crate::frame::{codec, decode_batch, encode_batch, INTERNODE_MAX_FRAME_BYTES};
use crate::point::Batch;
use crate::tls::server_name;

/// Send one framed `Batch` over an already-established, already-TLS'd stream.
pub async fn send_batch<S>(framed: &mut Framed<S, tokio_util::codec::LengthDelimitedCodec>, batch: &Batch) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = encode_batch(batch)?;
    framed
        .send(Bytes::from(bytes))
        .await
        .map_err(|e| transport(format!("send failed: {e}")))
}

/// Receive one framed `Batch`. Returns `Ok(None)` on clean stream close.
pub async fn recv_batch<S>(framed: &mut Framed<S, tokio_util::codec::LengthDelimitedCodec>) -> Result<Option<Batch>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        None => Ok(None),
        Some(Err(e)) => Err(transport(format!("recv failed: {e}"))),
        Some(Ok(bytes)) => Ok(Some(decode_batch(&bytes)?)),
    }
}

/// Dial a peer's internode listener, send one batch, and wait for the
/// connection to accept it, all bounded by `timeout`. This is the path the
/// replicated appender uses; on any failure here the caller enqueues the
/// batch for handoff instead.
pub async fn send_to_peer(
    addr: &str,
    tls: &TlsConnector,
    tls_server_name: &str,
    batch: &Batch,
    timeout: Duration,
) -> Result<()> {
    tokio::time::timeout(timeout, send_to_peer_inner(addr, tls, tls_server_name, batch))
        .await
        .map_err(|_| transport(format!("timed out sending to {addr}")))?
}

async fn send_to_peer_inner(addr: &str, tls: &TlsConnector, tls_server_name: &str, batch: &Batch) -> Result<()> {
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| transport(format!("connect to {addr} failed: {e}")))?;
    let name = server_name(tls_server_name)?;
    let stream = tls
        .connect(name, tcp)
        .await
        .map_err(|e| transport(format!("TLS handshake with {addr} failed: {e}")))?;
    let mut framed = Framed::new(stream, codec(INTERNODE_MAX_FRAME_BYTES));
    send_batch(&mut framed, batch).await
}

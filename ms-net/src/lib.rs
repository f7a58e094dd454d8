//! Wire types and transport. All inter-process communication -- ingress from
//! clients and internode traffic between peers -- takes the form of framed
//! `Batch` messages: `u32 length || MessagePack payload`.

pub mod frame;
pub mod point;
pub mod tls;
pub mod transport;

pub use frame::{codec, decode_batch, encode_batch, INGRESS_MAX_FRAME_BYTES, INTERNODE_MAX_FRAME_BYTES};
pub use point::{Batch, Point};
pub use tls::{client_connector, server_acceptor, TlsDomainConfig};
pub use transport::{recv_batch, send_batch, send_to_peer};

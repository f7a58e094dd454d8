//! Replication: turning the single-shard `Appender`/`Querier` capabilities
//! `ms-storage` provides into cluster-wide ones, using `ms-route`'s sharding
//! function to decide who owns what and `ms-handoff` as the durability
//! fallback when a peer is unreachable.

pub mod appender;
pub mod querier;

pub use appender::ReplicatedAppender;
pub use querier::{merge_series, PeerQuerier, ReplicatedQuerier, STRICT_EQUALITY_ERROR};

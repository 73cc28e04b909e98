//! Change feed over PostgreSQL LISTEN/NOTIFY.
//!
//! The system-of-record publishes row-level change notifications per watched
//! table; triggers NOTIFY a JSON payload carrying the operation kind and the
//! before/after row images. Each [`ChangeFeedListener`] subscribes to one
//! table's channel, normalizes notifications into
//! [`clinicore_core::ChangeEvent`]s and hands them to a consumer over an
//! unbounded channel.
//!
//! Within one subscription, notifications arrive in the source's commit
//! order. Across tables there is no ordering guarantee; each table gets its
//! own listener instance and the consumer merges them.

pub mod config;
pub mod error;
pub mod listener;
pub mod normalize;

pub use config::FeedConfig;
pub use error::FeedError;
pub use listener::ChangeFeedListener;
pub use normalize::ChangeNotification;

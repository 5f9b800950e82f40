//! Client side of party-on: a typed HTTP client over the REST API, the
//! in-memory cache of nearby parties it keeps current, and a poller that
//! refreshes one party while its detail view is open.

pub mod cache;
pub mod client;
pub mod error;
pub mod poller;

pub use cache::PartyCache;
pub use client::PartiesClient;
pub use error::ClientError;
pub use poller::PartyPoller;

//! osu! API v2 provider: OAuth client-credentials auth and per-beatmap lookups.
pub mod auth;
pub mod client;
pub mod extract;

#[cfg(test)]
pub(crate) mod test_http;

pub use auth::{Authenticator, OsuAuth};
pub use client::{build_http, MetadataLookup, OsuClient};

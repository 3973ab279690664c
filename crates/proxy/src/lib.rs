//! Caching, quota-aware reverse proxy for the YouTube Data API.
//!
//! Requests to `/v3/<resource>` are checked against an allowlist, answered
//! from a TTL cache when an identical request was seen recently, and
//! forwarded upstream otherwise. `/v1/resolve_url` turns vanity channel URLs
//! into channel ids. Every call is accounted in the quota ledger.

pub mod allowlist;
pub mod context;
pub mod dispatcher;
pub mod query;
pub mod server;
pub mod upstream;
pub mod vanity;

pub use allowlist::AllowlistFilter;
pub use dispatcher::Dispatcher;
pub use query::QueryParams;
pub use server::{build_router, ProxyState, SharedProxyState};
pub use upstream::{HttpUpstream, JsonResponse, Upstream};
pub use vanity::{ResolvedChannel, VanityPatterns, VanityResolver};

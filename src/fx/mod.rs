pub mod converter;
pub mod http_source;
pub mod rate_cache;
pub mod rate_source;
pub mod rate_store;

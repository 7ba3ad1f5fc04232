// -
// Key layout

/// Separator between path segments of a store key
pub const KEY_SEPARATOR: char = '/';

// -
// Watch loop timing

/// Constant delay between a failed poll and the next attempt
pub(crate) const DEFAULT_RECONNECT_DELAY_IN_MS: u64 = 5_000;

/// Upper bound the store may hold a blocking query open
pub(crate) const DEFAULT_WAIT_TIME_IN_MS: u64 = 60_000;

// -
// Consul HTTP API

pub(crate) const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";
pub(crate) const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";
pub(crate) const CONSUL_KV_PATH: &str = "v1/kv";

/// Consul adds up to wait/16 of jitter to a blocking query
pub(crate) const CONSUL_WAIT_JITTER_DIVISOR: u32 = 16;

/// Placeholder written in diagnostic dumps instead of secret values
pub(crate) const REDACTED_VALUE: &str = "<redacted>";

/// API path prefix
pub const API_PREFIX: &str = "/api/v1";

/// Collection path for monitored services, relative to `API_PREFIX`
pub const SERVICE_PATH: &str = "/service";

/// Path serving the watch-list digest, relative to `API_PREFIX`.
/// Kept outside `SERVICE_PATH` so every name under it is a service.
pub const DIGEST_PATH: &str = "/digest";

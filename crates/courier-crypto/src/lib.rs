/// Courier secret handling.
///
/// Channel external ids and access-token secrets are bearer capabilities:
/// anyone holding one can address the channel, so both are drawn from a
/// cryptographically secure source and encoded URL-safe.
pub mod secrets;

/// Account credentials are only ever persisted as salted Argon2id hashes.
pub mod credentials;

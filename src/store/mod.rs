//! Concurrent in-memory stores. Each store is safe under arbitrary
//! interleaving with no external synchronization; no operation blocks on
//! I/O or holds a lock across more than one map access.

pub mod bounded;
pub mod rate_limit;
pub mod session;
pub mod texture;
pub mod token;

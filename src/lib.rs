//! # Masquerade
//!
//! `masquerade` is a mock network identity provider: it issues, refreshes,
//! validates, and revokes bearer tokens tied to a user and an optional
//! selected persona, and it brokers the short-lived join/verify handshake
//! game servers use to confirm that a persona recently authenticated.
//!
//! Everything lives in memory and restarts empty. Users and personas are
//! seeded from a YAML file at startup; passwords are compared in plaintext
//! on purpose — this is a test double for integration suites, not a real
//! authority.
//!
//! The interesting parts are the concurrent stores under [`store`]: the
//! token store (two-tier expiry, watermark revocation, exactly-once
//! consumption), the join/verify cache, the password-attempt rate limiter,
//! and the content-addressed texture store.

pub mod api;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod ids;
pub mod store;

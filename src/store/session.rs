//! Join/verify handshake cache.
//!
//! A join call parks a claim under the peer-chosen server id; a later
//! verify call consumes it. Claims are single-use, expire quickly, and the
//! cache is capacity-bounded so abandoned joins cannot grow it without
//! bound.

use crate::directory::Persona;
use crate::store::bounded::BoundedMap;
use crate::store::token::Token;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_PENDING_COUNT: usize = 100_000;

#[derive(Clone)]
struct PendingClaim {
    token: Arc<Token>,
    ip: Option<String>,
    created_at: Instant,
}

pub struct SessionAuthenticator {
    expire_after: Duration,
    pending: BoundedMap<PendingClaim>,
}

impl SessionAuthenticator {
    #[must_use]
    pub fn new(expire_after: Duration) -> Self {
        Self::with_capacity(expire_after, DEFAULT_MAX_PENDING_COUNT)
    }

    #[must_use]
    pub fn with_capacity(expire_after: Duration, capacity: usize) -> Self {
        Self {
            expire_after,
            pending: BoundedMap::new(capacity),
        }
    }

    /// Park a claim for `server_id`, replacing any unclaimed one. The token
    /// is assumed to be fully valid; the caller has already checked it.
    pub fn record_join(&self, token: Arc<Token>, server_id: &str, ip: Option<String>) {
        let claim = PendingClaim {
            token,
            ip,
            created_at: Instant::now(),
        };
        self.pending.insert(server_id.to_string(), claim, |_| {});
    }

    /// Consume the claim for `server_id` and return the bound persona if
    /// the claim is fresh, its persona name matches `username` exactly,
    /// and the peer ip (when supplied here) matches the one recorded at
    /// join time. The claim is gone afterwards either way.
    pub fn verify(
        &self,
        username: &str,
        server_id: &str,
        ip: Option<&str>,
    ) -> Option<Arc<Persona>> {
        let claim = self.pending.remove(server_id)?;

        if claim.created_at.elapsed() > self.expire_after {
            return None;
        }
        let persona = claim.token.persona()?;
        if persona.name() != username {
            return None;
        }
        if let Some(ip) = ip {
            if claim.ip.as_deref() != Some(ip) {
                return None;
            }
        }

        Some(Arc::clone(persona))
    }

    /// Approximate pending claim count, for diagnostics.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

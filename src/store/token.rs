//! Access token lifecycle: issuance, two-tier expiry, one-shot
//! consumption, and watermark-based bulk revocation.
//!
//! Revocation never enumerates tokens. `revoke_all` bumps a per-user
//! sequence watermark; any token whose issuance sequence is below the
//! watermark is treated as fully expired and evicted lazily on the next
//! lookup.

use crate::directory::{Persona, User};
use crate::ids;
use crate::store::bounded::BoundedMap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_MAX_TOKEN_COUNT: usize = 100_000;

#[derive(Debug, Error)]
#[error("the character to select doesn't belong to the user")]
pub struct InvalidSelection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AvailableLevel {
    Complete,
    Partial,
}

#[derive(Debug)]
pub struct Token {
    access_token: String,
    client_token: String,
    sequence: u64,
    created_at: Instant,
    user: Arc<User>,
    persona: Option<Arc<Persona>>,
}

impl Token {
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn client_token(&self) -> &str {
        &self.client_token
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    #[must_use]
    pub fn persona(&self) -> Option<&Arc<Persona>> {
        self.persona.as_ref()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TokenOptions {
    pub time_to_fully_expired: Duration,
    pub enable_time_to_partially_expired: bool,
    pub time_to_partially_expired: Duration,
    pub only_last_session_available: bool,
    pub capacity: usize,
}

impl Default for TokenOptions {
    fn default() -> Self {
        Self {
            time_to_fully_expired: Duration::from_secs(14 * 24 * 60 * 60),
            enable_time_to_partially_expired: false,
            time_to_partially_expired: Duration::from_secs(8 * 60 * 60),
            only_last_session_available: false,
            capacity: DEFAULT_MAX_TOKEN_COUNT,
        }
    }
}

pub struct TokenStore {
    options: TokenOptions,
    sequence: AtomicU64,
    not_before: DashMap<Uuid, AtomicU64>,
    last_issued: DashMap<Uuid, Arc<Token>>,
    tokens: BoundedMap<Arc<Token>>,
}

impl TokenStore {
    #[must_use]
    pub fn new(options: TokenOptions) -> Self {
        Self {
            options,
            sequence: AtomicU64::new(0),
            not_before: DashMap::new(),
            last_issued: DashMap::new(),
            tokens: BoundedMap::new(options.capacity),
        }
    }

    /// Issue a token for `user`. With no explicit selection the persona is
    /// bound automatically when the user owns exactly one; an explicit
    /// selection must belong to the user.
    pub fn issue(
        &self,
        user: &Arc<User>,
        client_token: Option<&str>,
        selected: Option<Arc<Persona>>,
    ) -> Result<Arc<Token>, InvalidSelection> {
        let persona = match selected {
            Some(persona) => {
                if !user.owns(&persona) {
                    return Err(InvalidSelection);
                }
                Some(persona)
            }
            None => {
                if user.personas().len() == 1 {
                    Some(Arc::clone(&user.personas()[0]))
                } else {
                    None
                }
            }
        };

        let token = Arc::new(Token {
            access_token: ids::random_undashed(),
            client_token: client_token
                .map_or_else(ids::random_undashed, ToString::to_string),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            created_at: Instant::now(),
            user: Arc::clone(user),
            persona,
        });

        self.tokens
            .insert(token.access_token.clone(), Arc::clone(&token), |evicted| {
                self.last_issued
                    .remove_if(&evicted.user.id(), |_, t| Arc::ptr_eq(t, &evicted));
            });
        self.last_issued.insert(user.id(), Arc::clone(&token));

        // The insert above may already have pushed this very token out of
        // the bounded map (capacity eviction runs before the last-issued
        // bookkeeping). Re-check membership and roll back the marker,
        // compare-and-clear so a concurrent newer issue is not clobbered.
        if !self.tokens.contains_key(&token.access_token) {
            self.last_issued
                .remove_if(&user.id(), |_, t| Arc::ptr_eq(t, &token));
        }

        Ok(token)
    }

    /// Look up a token. Expired-or-revoked tokens are evicted and reported
    /// as absent; all failure modes are indistinguishable to the caller.
    pub fn authenticate(
        &self,
        access_token: &str,
        client_token: Option<&str>,
        level: AvailableLevel,
    ) -> Option<Arc<Token>> {
        let token = self.tokens.get(access_token)?;

        if self.fully_expired(&token) {
            self.remove_token(&token);
            return None;
        }

        if let Some(client_token) = client_token {
            if client_token != token.client_token {
                return None;
            }
        }

        match level {
            AvailableLevel::Complete => {
                if self.complete_valid(&token) {
                    Some(token)
                } else {
                    None
                }
            }
            AvailableLevel::Partial => Some(token),
        }
    }

    /// As [`authenticate`](Self::authenticate), then atomically consume the
    /// token if `checker` accepts it. A checker error propagates and leaves
    /// the token in place. Under concurrent consumption of the same token
    /// the map removal is the serialization point: exactly one caller wins.
    pub fn authenticate_and_consume<E>(
        &self,
        access_token: &str,
        client_token: Option<&str>,
        level: AvailableLevel,
        checker: impl FnOnce(&Token) -> Result<bool, E>,
    ) -> Result<Option<Arc<Token>>, E> {
        let Some(token) = self.authenticate(access_token, client_token, level) else {
            return Ok(None);
        };

        if !checker(&token)? {
            return Ok(None);
        }

        if self
            .tokens
            .remove_if(access_token, |t| Arc::ptr_eq(t, &token))
            .is_some()
        {
            // We won the removal race.
            self.last_issued
                .remove_if(&token.user.id(), |_, t| Arc::ptr_eq(t, &token));
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// Retroactively invalidate every token issued to `user` before this
    /// call, without touching individual entries.
    pub fn revoke_all(&self, user: &User) {
        let cutoff = self.sequence.load(Ordering::SeqCst);
        self.not_before
            .entry(user.id())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_max(cutoff, Ordering::SeqCst);
    }

    /// Approximate live token count, for diagnostics.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn fully_expired(&self, token: &Token) -> bool {
        if token.created_at.elapsed() > self.options.time_to_fully_expired {
            return true;
        }
        if let Some(watermark) = self.not_before.get(&token.user.id()) {
            if token.sequence < watermark.load(Ordering::SeqCst) {
                return true;
            }
        }
        false
    }

    /// Assumes `fully_expired` returned false.
    fn complete_valid(&self, token: &Arc<Token>) -> bool {
        if self.options.enable_time_to_partially_expired
            && token.created_at.elapsed() > self.options.time_to_partially_expired
        {
            return false;
        }
        if self.options.only_last_session_available {
            let is_last = self
                .last_issued
                .get(&token.user.id())
                .is_some_and(|last| Arc::ptr_eq(&last, token));
            if !is_last {
                return false;
            }
        }
        true
    }

    fn remove_token(&self, token: &Arc<Token>) {
        self.tokens.remove(&token.access_token);
        self.last_issued
            .remove_if(&token.user.id(), |_, t| Arc::ptr_eq(t, token));
    }

    #[cfg(test)]
    fn last_issued_for(&self, user: &User) -> Option<Arc<Token>> {
        self.last_issued.get(&user.id()).map(|t| Arc::clone(&t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, SeedPersona, SeedUser};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn directory() -> Directory {
        let seed = |email: &str, names: &[&str]| SeedUser {
            id: None,
            email: Some(email.to_string()),
            password: Some("pw".to_string()),
            characters: names
                .iter()
                .map(|name| SeedPersona {
                    id: None,
                    name: Some((*name).to_string()),
                    model: Default::default(),
                    textures: Default::default(),
                    uploadable_textures: None,
                })
                .collect(),
        };
        Directory::build(&[
            seed("one@example.com", &["Solo"]),
            seed("two@example.com", &["First", "Second"]),
            seed("none@example.com", &[]),
        ])
        .unwrap()
    }

    fn store() -> TokenStore {
        TokenStore::new(TokenOptions::default())
    }

    #[test]
    fn single_persona_binds_automatically() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let token = store().issue(&user, None, None).unwrap();
        assert_eq!(token.persona().unwrap().name(), "Solo");
    }

    #[test]
    fn multiple_personas_stay_unbound_without_selection() {
        let dir = directory();
        let user = dir.find_user_by_email("two@example.com").unwrap();
        let token = store().issue(&user, None, None).unwrap();
        assert!(token.persona().is_none());
    }

    #[test]
    fn foreign_persona_selection_is_rejected() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let foreign = dir.find_persona_by_name("First").unwrap();
        assert!(store().issue(&user, None, Some(foreign)).is_err());
    }

    #[test]
    fn client_token_is_kept_or_generated() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = store();
        let token = store.issue(&user, Some("my-client"), None).unwrap();
        assert_eq!(token.client_token(), "my-client");
        let token = store.issue(&user, None, None).unwrap();
        assert_eq!(token.client_token().len(), 32);
    }

    #[test]
    fn authenticate_checks_client_token() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = store();
        let token = store.issue(&user, Some("ct"), None).unwrap();
        let access = token.access_token().to_string();
        assert!(store
            .authenticate(&access, Some("ct"), AvailableLevel::Complete)
            .is_some());
        assert!(store
            .authenticate(&access, Some("other"), AvailableLevel::Complete)
            .is_none());
        assert!(store
            .authenticate(&access, None, AvailableLevel::Complete)
            .is_some());
        assert!(store
            .authenticate("missing", None, AvailableLevel::Partial)
            .is_none());
    }

    #[test]
    fn full_expiry_evicts_lazily() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = TokenStore::new(TokenOptions {
            time_to_fully_expired: Duration::from_millis(10),
            ..TokenOptions::default()
        });
        let token = store.issue(&user, None, None).unwrap();
        let access = token.access_token().to_string();
        thread::sleep(Duration::from_millis(30));
        assert!(store
            .authenticate(&access, None, AvailableLevel::Partial)
            .is_none());
        assert_eq!(store.token_count(), 0);
    }

    #[test]
    fn partial_expiry_blocks_complete_but_not_partial() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = TokenStore::new(TokenOptions {
            enable_time_to_partially_expired: true,
            time_to_partially_expired: Duration::from_millis(10),
            ..TokenOptions::default()
        });
        let token = store.issue(&user, None, None).unwrap();
        let access = token.access_token().to_string();
        thread::sleep(Duration::from_millis(30));
        assert!(store
            .authenticate(&access, None, AvailableLevel::Complete)
            .is_none());
        assert!(store
            .authenticate(&access, None, AvailableLevel::Partial)
            .is_some());
    }

    #[test]
    fn only_last_session_invalidates_older_tokens_for_complete() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = TokenStore::new(TokenOptions {
            only_last_session_available: true,
            ..TokenOptions::default()
        });
        let first = store.issue(&user, None, None).unwrap();
        let second = store.issue(&user, None, None).unwrap();
        assert!(store
            .authenticate(first.access_token(), None, AvailableLevel::Complete)
            .is_none());
        assert!(store
            .authenticate(first.access_token(), None, AvailableLevel::Partial)
            .is_some());
        assert!(store
            .authenticate(second.access_token(), None, AvailableLevel::Complete)
            .is_some());
    }

    #[test]
    fn revoke_all_is_retroactive_and_not_prospective() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = store();
        let a = store.issue(&user, None, None).unwrap();
        let b = store.issue(&user, None, None).unwrap();
        store.revoke_all(&user);
        for level in [AvailableLevel::Partial, AvailableLevel::Complete] {
            assert!(store.authenticate(a.access_token(), None, level).is_none());
            assert!(store.authenticate(b.access_token(), None, level).is_none());
        }
        let c = store.issue(&user, None, None).unwrap();
        assert!(store
            .authenticate(c.access_token(), None, AvailableLevel::Complete)
            .is_some());
    }

    #[test]
    fn revoke_all_only_touches_that_user() {
        let dir = directory();
        let one = dir.find_user_by_email("one@example.com").unwrap();
        let two = dir.find_user_by_email("two@example.com").unwrap();
        let store = store();
        let t1 = store.issue(&one, None, None).unwrap();
        let t2 = store.issue(&two, None, None).unwrap();
        store.revoke_all(&one);
        assert!(store
            .authenticate(t1.access_token(), None, AvailableLevel::Partial)
            .is_none());
        assert!(store
            .authenticate(t2.access_token(), None, AvailableLevel::Partial)
            .is_some());
    }

    #[test]
    fn consume_is_one_shot() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = store();
        let token = store.issue(&user, None, None).unwrap();
        let access = token.access_token().to_string();
        let consumed = store
            .authenticate_and_consume::<()>(&access, None, AvailableLevel::Partial, |_| Ok(true))
            .unwrap();
        assert!(consumed.is_some());
        let again = store
            .authenticate_and_consume::<()>(&access, None, AvailableLevel::Partial, |_| Ok(true))
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn failing_checker_leaves_token_alive() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = store();
        let token = store.issue(&user, None, None).unwrap();
        let access = token.access_token().to_string();

        let rejected = store
            .authenticate_and_consume::<()>(&access, None, AvailableLevel::Partial, |_| Ok(false))
            .unwrap();
        assert!(rejected.is_none());

        let err = store
            .authenticate_and_consume(&access, None, AvailableLevel::Partial, |_| {
                Err("already bound")
            })
            .unwrap_err();
        assert_eq!(err, "already bound");

        assert!(store
            .authenticate(&access, None, AvailableLevel::Complete)
            .is_some());
    }

    #[test]
    fn concurrent_consume_has_exactly_one_winner() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = Arc::new(store());
        for _ in 0..20 {
            let token = store.issue(&user, None, None).unwrap();
            let access = token.access_token().to_string();
            let wins = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let access = access.clone();
                    let wins = Arc::clone(&wins);
                    thread::spawn(move || {
                        let won = store
                            .authenticate_and_consume::<()>(
                                &access,
                                None,
                                AvailableLevel::Partial,
                                |_| Ok(true),
                            )
                            .unwrap()
                            .is_some();
                        if won {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(wins.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn consumed_tokens_release_their_capacity_slot() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = TokenStore::new(TokenOptions {
            capacity: 2,
            ..TokenOptions::default()
        });
        let keep = store.issue(&user, None, None).unwrap();
        // Refresh-style churn: each round issues a token and consumes it,
        // as many times as the capacity allows and then some.
        for _ in 0..10 {
            let token = store.issue(&user, None, None).unwrap();
            let consumed = store
                .authenticate_and_consume::<()>(
                    token.access_token(),
                    None,
                    AvailableLevel::Partial,
                    |_| Ok(true),
                )
                .unwrap();
            assert!(consumed.is_some());
        }
        // The long-lived token was never pushed out: only one live token
        // existed at any point beside it.
        assert!(store
            .authenticate(keep.access_token(), None, AvailableLevel::Partial)
            .is_some());
        assert_eq!(store.token_count(), 1);
    }

    #[test]
    fn capacity_eviction_rolls_back_last_issued_marker() {
        let dir = directory();
        let user = dir.find_user_by_email("one@example.com").unwrap();
        let store = TokenStore::new(TokenOptions {
            capacity: 0,
            ..TokenOptions::default()
        });
        let token = store.issue(&user, None, None).unwrap();
        assert_eq!(store.token_count(), 0);
        // The token was flushed out during its own insert; the last-issued
        // marker must not keep pointing at it.
        assert!(store.last_issued_for(&user).is_none());
        assert!(store
            .authenticate(token.access_token(), None, AvailableLevel::Partial)
            .is_none());
    }

    #[test]
    fn eviction_of_older_tokens_clears_their_markers_only() {
        let dir = directory();
        let one = dir.find_user_by_email("one@example.com").unwrap();
        let two = dir.find_user_by_email("two@example.com").unwrap();
        let store = TokenStore::new(TokenOptions {
            capacity: 1,
            only_last_session_available: true,
            ..TokenOptions::default()
        });
        let t1 = store.issue(&one, None, None).unwrap();
        let t2 = store.issue(&two, None, None).unwrap();
        assert!(store.last_issued_for(&one).is_none());
        assert!(store
            .last_issued_for(&two)
            .is_some_and(|t| Arc::ptr_eq(&t, &t2)));
        assert!(store
            .authenticate(t1.access_token(), None, AvailableLevel::Partial)
            .is_none());
        assert!(store
            .authenticate(t2.access_token(), None, AvailableLevel::Complete)
            .is_some());
    }
}

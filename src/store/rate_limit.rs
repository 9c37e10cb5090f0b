//! Per-user minimum-interval gate in front of password checks.

use crate::directory::User;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct RateLimiter {
    interval: Duration,
    epoch: Instant,
    timings: DashMap<Uuid, AtomicU64>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            epoch: Instant::now(),
            timings: DashMap::new(),
        }
    }

    /// Try to take an attempt slot for `user`. The first attempt always
    /// succeeds; later ones only after the configured interval has elapsed
    /// since the last successful acquisition. Both arms resolve concurrent
    /// callers to a single winner: the first-attempt arm by racing the map
    /// insertion, the steady-state arm by a compare-and-swap on the stored
    /// timestamp.
    pub fn try_acquire(&self, user: &User) -> bool {
        let now = self.elapsed_millis();

        let Some(entry) = self.timings.get(&user.id()) else {
            // Losing the vacant-entry race means another caller recorded an
            // attempt just now, so this one is inside the interval by
            // definition and must be limited.
            return match self.timings.entry(user.id()) {
                Entry::Vacant(slot) => {
                    slot.insert(AtomicU64::new(now));
                    true
                }
                Entry::Occupied(_) => false,
            };
        };

        let last = entry.load(Ordering::SeqCst);
        if now.saturating_sub(last) > self.interval_millis() {
            // A failed CAS means another caller advanced the timestamp
            // first; this attempt is limited.
            entry
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        } else {
            false
        }
    }

    fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn interval_millis(&self) -> u64 {
        u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, SeedUser};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    fn users(n: usize) -> Vec<Arc<User>> {
        let seeds: Vec<_> = (0..n)
            .map(|i| SeedUser {
                id: None,
                email: Some(format!("user{i}@example.com")),
                password: Some("pw".to_string()),
                characters: vec![],
            })
            .collect();
        let directory = Directory::build(&seeds).unwrap();
        (0..n)
            .map(|i| {
                directory
                    .find_user_by_email(&format!("user{i}@example.com"))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn second_attempt_within_interval_is_limited() {
        let user = &users(1)[0];
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.try_acquire(user));
        assert!(!limiter.try_acquire(user));
    }

    #[test]
    fn attempt_after_interval_succeeds() {
        let user = &users(1)[0];
        let limiter = RateLimiter::new(Duration::from_millis(10));
        assert!(limiter.try_acquire(user));
        thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire(user));
        assert!(!limiter.try_acquire(user));
    }

    #[test]
    fn users_are_limited_independently() {
        let users = users(2);
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.try_acquire(&users[0]));
        assert!(limiter.try_acquire(&users[1]));
        assert!(!limiter.try_acquire(&users[0]));
    }

    #[test]
    fn concurrent_first_attempts_have_one_winner() {
        let user = users(1).remove(0);
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let wins = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let user = Arc::clone(&user);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    if limiter.try_acquire(&user) {
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

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use actix_web::HttpRequest;

/// Remembers when each address last voted on each question
pub struct LimitStore {
    vote: Mutex<HashMap<(IpAddr, i64), Instant>>,
    vote_limit: Duration,
}

impl Default for LimitStore {
    fn default() -> Self {
        LimitStore::new(Duration::from_secs(10))
    }
}

impl LimitStore {
    pub fn new(vote_limit: Duration) -> Self {
        LimitStore {
            vote: Mutex::new(HashMap::new()),
            vote_limit,
        }
    }

    // A panic while holding the lock cannot leave the map inconsistent,
    // so a poisoned lock is still usable
    fn votes(&self) -> MutexGuard<'_, HashMap<(IpAddr, i64), Instant>> {
        self.vote.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Called periodically to clean up now-irrelevant limits
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.votes().retain(|_, v| now - *v < self.vote_limit);
    }

    /// Resets all limits
    pub fn reset(&self) {
        self.votes().clear();
    }

    pub fn len(&self) -> usize {
        self.votes().len()
    }

    /// Returns true if the address voted on the question less than the limit ago
    pub fn is_limited(&self, addr: IpAddr, question_id: i64) -> bool {
        self.is_limited_at(addr, question_id, Instant::now())
    }

    fn is_limited_at(&self, addr: IpAddr, question_id: i64, now: Instant) -> bool {
        self.votes()
            .get(&(addr, question_id))
            .map_or(false, |last| now.saturating_duration_since(*last) < self.vote_limit)
    }

    /// Starts the limit for the address on the question.
    /// Call only once the vote has been counted.
    pub fn record_vote(&self, addr: IpAddr, question_id: i64) {
        self.record_vote_at(addr, question_id, Instant::now())
    }

    fn record_vote_at(&self, addr: IpAddr, question_id: i64, now: Instant) {
        self.votes().insert((addr, question_id), now);
    }
}

/// The address a vote request is limited by.
/// Requests without a peer address and loopback requests are never limited.
pub fn vote_addr(req: &HttpRequest) -> Option<IpAddr> {
    req.peer_addr()
        .map(|addr| addr.ip())
        .filter(|ip| !ip.is_loopback())
}

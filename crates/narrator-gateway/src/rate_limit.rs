//! Per-IP concurrent session limiter.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

type ActiveMap = Arc<Mutex<HashMap<IpAddr, u32>>>;

fn lock(map: &ActiveMap) -> MutexGuard<'_, HashMap<IpAddr, u32>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Caps the number of live sessions a single client IP may hold.
pub struct SessionLimiter {
    max_sessions_per_ip: u32,
    active: ActiveMap,
}

/// A held session slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct SessionPermit {
    ip: IpAddr,
    active: ActiveMap,
}

impl SessionLimiter {
    pub fn new(max_sessions_per_ip: u32) -> Self {
        Self {
            max_sessions_per_ip,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Claim a slot for `ip`, or `None` when it is already at the limit.
    pub fn try_acquire(&self, ip: IpAddr) -> Option<SessionPermit> {
        let mut map = lock(&self.active);
        let count = map.entry(ip).or_insert(0);

        if *count >= self.max_sessions_per_ip {
            warn!(%ip, count = *count, limit = self.max_sessions_per_ip,
                "Session limit reached for IP");
            return None;
        }

        *count += 1;
        debug!(%ip, count = *count, "Session slot acquired");
        Some(SessionPermit {
            ip,
            active: self.active.clone(),
        })
    }

    /// Live sessions currently held by `ip`.
    pub fn active(&self, ip: IpAddr) -> u32 {
        lock(&self.active).get(&ip).copied().unwrap_or(0)
    }
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let mut map = lock(&self.active);
        if let Some(count) = map.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                map.remove(&self.ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_limiter_allows_up_to_limit() {
        let limiter = SessionLimiter::new(3);
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));

        let _a = limiter.try_acquire(ip).unwrap();
        let _b = limiter.try_acquire(ip).unwrap();
        let _c = limiter.try_acquire(ip).unwrap();
        assert!(limiter.try_acquire(ip).is_none());
        assert_eq!(limiter.active(ip), 3);
    }

    #[test]
    fn test_limiter_different_ips() {
        let limiter = SessionLimiter::new(1);
        let ip1 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let ip2 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        let _p1 = limiter.try_acquire(ip1).unwrap();
        let _p2 = limiter.try_acquire(ip2).unwrap();
        assert!(limiter.try_acquire(ip1).is_none());
        assert!(limiter.try_acquire(ip2).is_none());
    }

    #[test]
    fn test_drop_releases_slot() {
        let limiter = SessionLimiter::new(1);
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        let permit = limiter.try_acquire(ip).unwrap();
        assert!(limiter.try_acquire(ip).is_none());
        drop(permit);
        assert_eq!(limiter.active(ip), 0);
        assert!(limiter.try_acquire(ip).is_some());
    }

    #[test]
    fn test_zero_limit_refuses_everything() {
        let limiter = SessionLimiter::new(0);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(limiter.try_acquire(ip).is_none());
    }
}

//! Per-user rate limiting using governor.
//!
//! Order creation is limited per authenticated user rather than per IP: the
//! cost being protected (stock reservations, notifications) is tied to the
//! account.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use haya_core::UserId;

/// Length of the order rate-limit window.
pub const ORDER_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Keyed limiter allowing `max` operations per window per user.
///
/// The full allowance is available as a burst; it then replenishes one unit
/// every `window / max`.
pub struct UserRateLimiter {
    limiter: DefaultKeyedRateLimiter<UserId>,
}

impl UserRateLimiter {
    #[must_use]
    pub fn new(max: NonZeroU32, window: Duration) -> Self {
        let quota = Quota::with_period(window / max.get())
            .map_or_else(|| Quota::per_second(max), |q| q.allow_burst(max));

        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Limiter for order creation.
    #[must_use]
    pub fn orders(max_per_window: NonZeroU32) -> Self {
        Self::new(max_per_window, ORDER_WINDOW)
    }

    /// Consume one unit for `user_id`. Returns `false` when the user is over
    /// the limit.
    pub fn check(&self, user_id: UserId) -> bool {
        let allowed = self.limiter.check_key(&user_id).is_ok();
        if !allowed {
            tracing::warn!(user_id = %user_id, "Rate limit exceeded");
        }
        allowed
    }

    /// Drop state for users whose allowance is fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_per_user() {
        let limiter = UserRateLimiter::orders(NonZeroU32::new(2).unwrap());
        let alice = UserId::new(1);
        let bob = UserId::new(2);

        assert!(limiter.check(alice));
        assert!(limiter.check(alice));
        assert!(!limiter.check(alice));
        assert!(limiter.check(bob));
    }
}

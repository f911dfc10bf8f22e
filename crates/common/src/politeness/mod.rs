//! Per-host politeness limiter
//!
//! Every outbound call to an external host first waits for a token from a
//! keyed token bucket (one token per period, burst of one). Calls to the same
//! host are spaced by at least the period across all requests; calls to
//! different hosts never wait on each other.

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::time::Duration;

/// Spacing policy shared by every client that talks to external hosts
pub struct Politeness {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
    period: Duration,
}

impl Politeness {
    /// Create a limiter allowing one call per `period` per host.
    /// A zero period disables spacing.
    pub fn new(period: Duration) -> Self {
        let limiter = Quota::with_period(period).map(RateLimiter::keyed);
        Self { limiter, period }
    }

    /// A limiter that never waits
    pub fn disabled() -> Self {
        Self {
            limiter: None,
            period: Duration::ZERO,
        }
    }

    /// Wait until a call to the host of `url` is allowed
    pub async fn wait(&self, url: &str) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let host = host_of(url);
        if limiter.check_key(&host).is_err() {
            tracing::debug!(host = %host, period_ms = self.period.as_millis() as u64, "Waiting for politeness slot");
            limiter.until_key_ready(&host).await;
        }
    }
}

impl std::fmt::Debug for Politeness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Politeness")
            .field("enabled", &self.limiter.is_some())
            .field("period", &self.period)
            .finish()
    }
}

/// Host part of a URL; unparseable input is its own key
fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://en.wikipedia.org/w/api.php"), "en.wikipedia.org");
        assert_eq!(host_of("https://WWW.NavWeaps.com/Weapons/index.html"), "www.navweaps.com");
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[test]
    fn test_zero_period_disables() {
        let politeness = Politeness::new(Duration::ZERO);
        assert!(politeness.limiter.is_none());
    }

    #[tokio::test]
    async fn test_same_host_is_spaced() {
        let politeness = Politeness::new(Duration::from_millis(200));
        let start = Instant::now();
        politeness.wait("https://en.wikipedia.org/w/api.php").await;
        politeness.wait("https://en.wikipedia.org/wiki/Yamato").await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_different_hosts_do_not_wait() {
        let politeness = Politeness::new(Duration::from_secs(5));
        let start = Instant::now();
        politeness.wait("https://en.wikipedia.org/wiki/Yamato").await;
        politeness.wait("https://www.navweaps.com/Weapons/index.html").await;
        politeness.wait("https://www.naval-history.net/WW2CampaignsOtherNavies.htm").await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_disabled_never_waits() {
        let politeness = Politeness::disabled();
        let start = Instant::now();
        for _ in 0..5 {
            tokio_test::block_on(politeness.wait("https://en.wikipedia.org/w/api.php"));
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

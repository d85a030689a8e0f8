//! Per-route, per-client request budgets.
//!
//! Each budget owns one GCRA limiter per client address. Clearing a client's
//! entry resets its counter, which is how admin callers are exempted.
//! Clients are keyed on the peer address; proxy headers are only consulted
//! when `trust_proxy_headers` is set.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::debug;

/// Which budget a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Login,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub login_per_minute: u32,
    pub read_per_minute: u32,
    pub write_per_minute: u32,
    /// Replenish interval of the process-wide guard, in milliseconds.
    pub global_period_ms: u64,
    pub global_burst: u32,
    /// Key clients on `X-Forwarded-For` / `X-Real-IP`. Only safe behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_per_minute: 10,
            read_per_minute: 15,
            write_per_minute: 10,
            global_period_ms: 50,
            global_burst: 100,
            trust_proxy_headers: false,
        }
    }
}

struct ClientLimiter {
    limiter: DefaultDirectRateLimiter,
    last_seen: Instant,
}

struct RouteLimiter {
    quota: Quota,
    clients: DashMap<IpAddr, ClientLimiter>,
}

impl RouteLimiter {
    fn per_minute(limit: u32) -> Self {
        let limit = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
        Self {
            quota: Quota::per_minute(limit),
            clients: DashMap::new(),
        }
    }

    fn check(&self, client: IpAddr) -> bool {
        let mut entry = self.clients.entry(client).or_insert_with(|| ClientLimiter {
            limiter: RateLimiter::direct(self.quota),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        entry.limiter.check().is_ok()
    }

    fn reset(&self, client: IpAddr) {
        self.clients.remove(&client);
    }

    /// A client idle for a full replenish window has a full bucket again, so its
    /// limiter can be dropped without changing any decision.
    fn purge_idle(&self, now: Instant) -> usize {
        let window = self.quota.burst_size_replenished_in();
        let before = self.clients.len();
        self.clients
            .retain(|_, client| now.saturating_duration_since(client.last_seen) < window);
        before.saturating_sub(self.clients.len())
    }
}

/// Shared budgets for the whole process. Cheap to clone.
#[derive(Clone)]
pub struct RateLimits {
    config: RateLimitConfig,
    login: Arc<RouteLimiter>,
    read: Arc<RouteLimiter>,
    write: Arc<RouteLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("tracked_clients", &self.tracked_clients())
            .finish_non_exhaustive()
    }
}

impl RateLimits {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            config: *config,
            login: Arc::new(RouteLimiter::per_minute(config.login_per_minute)),
            read: Arc::new(RouteLimiter::per_minute(config.read_per_minute)),
            write: Arc::new(RouteLimiter::per_minute(config.write_per_minute)),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn limiter(&self, budget: Budget) -> &RouteLimiter {
        match budget {
            Budget::Login => &self.login,
            Budget::Read => &self.read,
            Budget::Write => &self.write,
        }
    }

    /// Spend one request from `budget`. Returns `false` when the client is over budget.
    pub fn check(&self, budget: Budget, client: IpAddr) -> bool {
        let allowed = self.limiter(budget).check(client);
        if !allowed {
            debug!(?budget, client = %client, "rate limit exceeded");
        }
        allowed
    }

    /// Forget every counter held for `client`.
    pub fn reset_client(&self, client: IpAddr) {
        for budget in [Budget::Login, Budget::Read, Budget::Write] {
            self.limiter(budget).reset(client);
        }
        debug!(client = %client, "rate limits reset");
    }

    /// Drop limiters of clients that have been idle past their replenish window.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    fn purge_idle_at(&self, now: Instant) -> usize {
        [Budget::Login, Budget::Read, Budget::Write]
            .into_iter()
            .map(|budget| self.limiter(budget).purge_idle(now))
            .sum()
    }

    fn tracked_clients(&self) -> usize {
        [Budget::Login, Budget::Read, Budget::Write]
            .into_iter()
            .map(|budget| self.limiter(budget).clients.len())
            .sum()
    }
}

/// The address a request is budgeted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    RateLimits: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust_proxy_headers = RateLimits::from_ref(state).config().trust_proxy_headers;
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        Ok(Self(client_ip_from_parts(
            &parts.headers,
            peer,
            trust_proxy_headers,
        )))
    }
}

/// Peer address, or the first proxy header entry when those are trusted.
pub fn client_ip_from_parts(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> IpAddr {
    let peer_ip = peer
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if !trust_proxy_headers {
        return peer_ip;
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    };

    forwarded.or_else(real_ip).unwrap_or(peer_ip)
}

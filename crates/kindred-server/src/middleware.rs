use crate::api::ApiError;
use crate::AppState;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kindred_identity::{find_account_by_token, Account};
use kindred_types::{RateLimitPolicy, WindowQuota};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shown to anonymous callers once their address is over quota.
pub const ANONYMOUS_LIMIT_MESSAGE: &str = "Please make an account to talk to more friends.";
/// Shown to signed-in callers once their account is over quota.
pub const AUTHENTICATED_LIMIT_MESSAGE: &str =
    "Reached max requests for now. Please try again later.";

/// Who is making the request. Inserted into extensions by
/// [`identify_middleware`].
#[derive(Clone, Debug)]
pub enum Caller {
    Account(Account),
    Anonymous { ip: IpAddr },
}

impl Caller {
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Account(account) => Some(account),
            Self::Anonymous { .. } => None,
        }
    }

    /// The account, or 401 for anonymous callers.
    pub fn require_account(&self) -> Result<&Account, ApiError> {
        self.account().ok_or(ApiError::Unauthorized)
    }

    pub fn rate_limit_key(&self) -> RateLimitKey {
        match self {
            Self::Account(account) => RateLimitKey::Account(account.id.clone()),
            Self::Anonymous { ip } => RateLimitKey::Ip(*ip),
        }
    }
}

/// The signed-in account, for routes behind [`require_account_middleware`].
#[derive(Clone, Debug)]
pub struct AccountContext(pub Account);

/// Network address of the caller: the first `X-Forwarded-For` entry when
/// `trust_forwarded` is set and the header parses, otherwise the socket
/// peer, otherwise loopback.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> IpAddr {
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok())
    };
    trust_forwarded
        .then(forwarded)
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::Unauthorized)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;
    Ok(Some(token.to_string()))
}

/// Resolves the caller for every API request.
///
/// A request without `Authorization` is anonymous. A request that carries a
/// bearer token must name a live account, otherwise it is rejected with 401
/// even on routes that allow anonymous callers.
pub async fn identify_middleware(mut req: Request<Body>, next: Next) -> Response {
    let state = match req.extensions().get::<Arc<AppState>>() {
        Some(state) => state.clone(),
        None => {
            return ApiError::Internal("application state missing".to_string()).into_response()
        }
    };

    let token = match bearer_token(req.headers()) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let trust_forwarded = state.trust_forwarded_for;
    let caller = match token {
        Some(token) => {
            let lookup = tokio::task::spawn_blocking(move || {
                let conn = state
                    .pool
                    .get()
                    .map_err(|e| ApiError::Internal(format!("db connection failed: {}", e)))?;
                find_account_by_token(&conn, &token)
                    .map_err(|e| ApiError::Internal(format!("account lookup failed: {}", e)))
            })
            .await;
            match lookup {
                Ok(Ok(Some(account))) => Caller::Account(account),
                Ok(Ok(None)) => return ApiError::Unauthorized.into_response(),
                Ok(Err(e)) => return e.into_response(),
                Err(e) => {
                    return ApiError::Internal(format!("task join error: {}", e)).into_response()
                }
            }
        }
        None => {
            let peer = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            Caller::Anonymous {
                ip: client_ip(req.headers(), peer, trust_forwarded),
            }
        }
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

/// Rejects anonymous callers with 401 before the handler runs.
pub async fn require_account_middleware(mut req: Request<Body>, next: Next) -> Response {
    let account = req
        .extensions()
        .get::<Caller>()
        .and_then(Caller::account)
        .cloned();
    match account {
        Some(account) => {
            req.extensions_mut().insert(AccountContext(account));
            next.run(req).await
        }
        None => ApiError::Unauthorized.into_response(),
    }
}

/// Rate limiting key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// Anonymous caller, by network address.
    Ip(IpAddr),
    /// Signed-in caller, by account id.
    Account(String),
}

impl RateLimitKey {
    /// User-facing message once this key is over quota.
    pub fn limit_message(&self) -> &'static str {
        match self {
            Self::Ip(_) => ANONYMOUS_LIMIT_MESSAGE,
            Self::Account(_) => AUTHENTICATED_LIMIT_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Over quota; the oldest counted hit leaves the window after
    /// `retry_after`.
    Limited { retry_after: Duration },
}

/// In-memory sliding-window rate limiter.
///
/// Each key keeps the instants of its hits inside the current window. A hit
/// is admitted while fewer than `quota` remain; rejected hits are not
/// recorded.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    state: Arc<Mutex<HashMap<RateLimitKey, VecDeque<Instant>>>>,
}

/// Key count above which expired entries are swept.
const SWEEP_THRESHOLD: usize = 10_000;

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn quota_for(&self, key: &RateLimitKey) -> WindowQuota {
        match key {
            RateLimitKey::Ip(_) => self.policy.anonymous,
            RateLimitKey::Account(_) => self.policy.authenticated,
        }
    }

    /// Records a hit for `key` if it is within quota.
    pub fn check(&self, key: RateLimitKey) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: RateLimitKey, now: Instant) -> RateDecision {
        let quota = self.quota_for(&key);
        let window = quota.window();

        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("rate limiter lock poisoned, recovering with stale state");
                poisoned.into_inner()
            }
        };

        if state.len() > SWEEP_THRESHOLD {
            let policy = self.policy;
            state.retain(|key, hits| {
                let window = match key {
                    RateLimitKey::Ip(_) => policy.anonymous.window(),
                    RateLimitKey::Account(_) => policy.authenticated.window(),
                };
                hits.back()
                    .is_some_and(|last| now.saturating_duration_since(*last) < window)
            });
        }

        let hits = state.entry(key).or_default();
        while hits
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= window)
        {
            hits.pop_front();
        }

        if hits.len() < quota.quota as usize {
            hits.push_back(now);
            return RateDecision::Allowed;
        }

        let retry_after = hits
            .front()
            .map(|first| window.saturating_sub(now.saturating_duration_since(*first)))
            .unwrap_or(window);
        RateDecision::Limited { retry_after }
    }
}

/// Counts one friend generation against the caller's quota.
pub fn enforce_rate_limit(limiter: &RateLimiter, caller: &Caller) -> Result<(), ApiError> {
    let key = caller.rate_limit_key();
    let message = key.limit_message();
    match limiter.check(key) {
        RateDecision::Allowed => Ok(()),
        RateDecision::Limited { retry_after } => {
            tracing::info!(
                anonymous = caller.account().is_none(),
                retry_after_secs = retry_after.as_secs(),
                "friend generation rate limited"
            );
            Err(ApiError::RateLimited {
                message: message.to_string(),
                retry_after,
            })
        }
    }
}

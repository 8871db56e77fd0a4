//! Rate limit policy for friend generation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A quota of `quota` operations per rolling window of `window_secs` seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowQuota {
    /// Maximum operations allowed inside one window.
    pub quota: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl WindowQuota {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Independently configurable limits per caller class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Limit for callers without an account, keyed by network address.
    #[serde(default = "default_anonymous")]
    pub anonymous: WindowQuota,
    /// Limit for signed-in callers, keyed by account id.
    #[serde(default = "default_authenticated")]
    pub authenticated: WindowQuota,
}

fn default_anonymous() -> WindowQuota {
    WindowQuota {
        quota: 1,
        window_secs: 21_600,
    }
}

fn default_authenticated() -> WindowQuota {
    WindowQuota {
        quota: 3,
        window_secs: 21_600,
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            anonymous: default_anonymous(),
            authenticated: default_authenticated(),
        }
    }
}

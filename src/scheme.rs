//! Share-link schemes understood by subscription sources.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stats key used for subscriptions that do not declare a scheme.
pub const DEFAULT_SCHEME_KEY: &str = "mix";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Vmess,
    Vless,
    Ss,
    Trojan,
    Socks,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scheme: {0}")]
pub struct UnknownScheme(pub String);

impl Scheme {
    pub const ALL: [Scheme; 5] = [
        Scheme::Vmess,
        Scheme::Vless,
        Scheme::Ss,
        Scheme::Trojan,
        Scheme::Socks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Vmess => "vmess",
            Scheme::Vless => "vless",
            Scheme::Ss => "ss",
            Scheme::Trojan => "trojan",
            Scheme::Socks => "socks",
        }
    }

    /// e.g. `"vmess://"`
    pub fn link_prefix(&self) -> &'static str {
        match self {
            Scheme::Vmess => "vmess://",
            Scheme::Vless => "vless://",
            Scheme::Ss => "ss://",
            Scheme::Trojan => "trojan://",
            Scheme::Socks => "socks://",
        }
    }

    /// Scheme of a share link, if it is one we support.
    pub fn of_link(link: &str) -> Option<Scheme> {
        Self::ALL
            .into_iter()
            .find(|s| link.starts_with(s.link_prefix()))
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == norm)
            .ok_or_else(|| UnknownScheme(s.to_string()))
    }
}

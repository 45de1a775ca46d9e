//! Cookie parsing and `Set-Cookie` rendering.
//!
//! The registry only needs two things from the HTTP layer: a parsed cookie
//! map and somewhere to drop a "set this cookie" instruction. Both are
//! expressed here so the registry stays free of any HTTP framework types.

use std::collections::HashMap;
use std::fmt;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// A cookie to be written with a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub max_age_secs: Option<u64>,
    pub path: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age_secs: None,
            path: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    pub fn max_age_secs(mut self, secs: u64) -> Self {
        self.max_age_secs = Some(secs);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Render as a `Set-Cookie` header value.
    pub fn header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];
        if let Some(max_age) = self.max_age_secs {
            parts.push(format!("Max-Age={}", max_age));
        }
        if let Some(path) = &self.path {
            parts.push(format!("Path={}", path));
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if let Some(same_site) = self.same_site {
            parts.push(format!("SameSite={}", same_site));
        }
        parts.join("; ")
    }
}

/// Accepts "set this cookie" instructions from the registry.
pub trait CookieSink {
    fn set_cookie(&mut self, cookie: SetCookie);
}

/// Collects cookies so a handler can emit them as response headers.
#[derive(Debug, Clone, Default)]
pub struct PendingCookies {
    cookies: Vec<SetCookie>,
}

impl PendingCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SetCookie> {
        self.cookies.iter()
    }

    pub fn header_values(&self) -> Vec<String> {
        self.cookies.iter().map(SetCookie::header_value).collect()
    }
}

impl CookieSink for PendingCookies {
    fn set_cookie(&mut self, cookie: SetCookie) {
        self.cookies.push(cookie);
    }
}

/// Parse a `Cookie` request header into a name → value map.
///
/// Malformed pairs are skipped. Surrounding double quotes on a value are
/// removed. Later duplicates win.
pub fn parse_cookies(header: Option<&str>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(header) = header else {
        return out;
    };

    for part in header.split(';') {
        let Some((raw_key, raw_value)) = part.split_once('=') else {
            continue;
        };
        let key = raw_key.trim();
        if key.is_empty() {
            continue;
        }
        let value = raw_value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        out.insert(key.to_string(), value.to_string());
    }

    out
}

//! Upstream targets and prefix routing.
//!
//! A [`Targets`] document holds one default target and an ordered list of
//! prefix targets. The first prefix target whose prefix is a literal prefix of
//! the request path wins; the default target is used when none match.

use super::protocol::Protocol;
use crate::error::GatewayError;
use hyper::header::{HeaderValue, HOST};
use hyper::http::uri::{Authority, Scheme};
use hyper::{Request, Uri};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// An upstream destination plus the path prefix used to select it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub struct Target {
    protocol: Protocol,
    authority: Authority,
    prefix: String,
}

/// Wire form of a target: `{"url": "...", "prefix": "..."}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawTarget {
    url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    prefix: String,
}

impl TryFrom<RawTarget> for Target {
    type Error = GatewayError;

    fn try_from(raw: RawTarget) -> Result<Self, Self::Error> {
        Target::new(&raw.url, raw.prefix)
    }
}

impl From<Target> for RawTarget {
    fn from(target: Target) -> Self {
        RawTarget {
            url: target.url(),
            prefix: target.prefix,
        }
    }
}

impl Target {
    /// Build a target from an upstream URL. Only scheme and authority are kept.
    pub fn new(url: &str, prefix: impl Into<String>) -> Result<Self, GatewayError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| GatewayError::Config(format!("invalid target url {url:?}: {e}")))?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| GatewayError::Config(format!("target url {url:?} has no scheme")))?;
        let protocol = Protocol::from_scheme(scheme).map_err(GatewayError::Config)?;
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| GatewayError::Config(format!("target url {url:?} has no host")))?;

        Ok(Self {
            protocol,
            authority,
            prefix: prefix.into(),
        })
    }

    /// Host (with port, if any) requests are rewritten to.
    pub fn host(&self) -> &str {
        self.authority.as_str()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `scheme://host[:port]`
    pub fn url(&self) -> String {
        format!("{}://{}", self.protocol.as_str(), self.authority)
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Target URI for `uri`: scheme and authority replaced, prefix stripped from the path.
    pub fn rewrite_uri(&self, uri: &Uri) -> Uri {
        let stripped = uri.path().strip_prefix(&self.prefix).unwrap_or(uri.path());
        let mut path_and_query = if stripped.starts_with('/') {
            stripped.to_string()
        } else {
            format!("/{stripped}")
        };
        if let Some(query) = uri.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        let scheme = match self.protocol {
            Protocol::Http => Scheme::HTTP,
            Protocol::Https => Scheme::HTTPS,
        };

        let rewritten = Uri::builder()
            .scheme(scheme)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build();

        match rewritten {
            Ok(rewritten) => rewritten,
            Err(e) => {
                warn!(upstream.url = %self.url(), http.path = uri.path(), "rewriteFailed: {}", e);
                Uri::default()
            }
        }
    }

    /// Point `req` at this target, in place. Call at most once per request.
    pub fn rewrite<B>(&self, req: &mut Request<B>) {
        *req.uri_mut() = self.rewrite_uri(req.uri());
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            req.headers_mut().insert(HOST, host);
        }
    }
}

/// Default target plus ordered prefix targets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Targets {
    pub default: Target,
    #[serde(default)]
    pub prefixes: Vec<Target>,
}

impl Targets {
    pub fn new(default: Target, prefixes: Vec<Target>) -> Self {
        Self { default, prefixes }
    }

    /// First prefix target matching `path`, or the default.
    pub fn select(&self, path: &str) -> &Target {
        self.prefixes
            .iter()
            .find(|target| target.matches(path))
            .unwrap_or(&self.default)
    }

    /// Rewrite `req` toward the selected target and return it.
    pub fn route<B>(&self, req: &mut Request<B>) -> &Target {
        let target = self.select(req.uri().path());
        target.rewrite(req);
        target
    }
}

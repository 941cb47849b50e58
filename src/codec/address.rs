//! Endpoint and routing addresses.
//!
//! An `Address` is written `scheme://host:port/path`, `//host/path`, or as a bare
//! `path`. The host and port name a broker endpoint; the path is the routing key
//! used for subscriptions and is never interpreted beyond prefix matching.

use std::fmt;
use std::str::FromStr;

use crate::utils::error::AddressError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
}

impl Address {
    /// Parse any of the three accepted forms.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some((scheme, rest)) = input.split_once("://") {
            let (host, port, path) = split_authority(rest, input)?;
            return Ok(Self {
                scheme: Some(scheme.to_string()),
                host: Some(host),
                port,
                path,
            });
        }

        if let Some(rest) = input.strip_prefix("//") {
            let (host, port, path) = split_authority(rest, input)?;
            return Ok(Self {
                scheme: None,
                host: Some(host),
                port,
                path,
            });
        }

        Ok(Self::from_path(input))
    }

    /// An address carrying only a routing path.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            scheme: None,
            host: None,
            port: None,
            path: path.into(),
        }
    }

    /// Assemble an address from parts without any parsing.
    pub fn from_parts(
        scheme: Option<String>,
        host: Option<String>,
        port: Option<u16>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme,
            host,
            port,
            path: path.into(),
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` using `default_port` when none was given.
    pub fn socket_addr(&self, default_port: u16) -> Option<String> {
        self.host
            .as_ref()
            .map(|host| format!("{}:{}", host, self.port.unwrap_or(default_port)))
    }

    /// Same endpoint, different routing path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    /// Routing keys this address answers to, most specific first.
    ///
    /// The full path comes first, then every ancestor both with and without
    /// its trailing slash: `a/b/c` yields `a/b/c`, `a/b/`, `a/b`, `a/`, `a`.
    /// A `?query` suffix is ignored for ancestors.
    pub fn routes(&self) -> Vec<String> {
        let mut routes = vec![self.path.clone()];
        let base = self.path.split('?').next().unwrap_or_default();
        let mut segments: Vec<&str> = base.split('/').collect();
        segments.pop();
        while !segments.is_empty() {
            let joined = segments.join("/");
            if !joined.is_empty() {
                routes.push(format!("{joined}/"));
                routes.push(joined);
            }
            segments.pop();
        }
        routes
    }

    /// Whether a subscription on `pattern` receives messages sent here.
    pub fn matches(&self, pattern: &str) -> bool {
        self.routes().iter().any(|route| route == pattern)
    }
}

fn split_authority(
    rest: &str,
    original: &str,
) -> Result<(String, Option<u16>, String), AddressError> {
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, path),
        None => (rest, ""),
    };

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| AddressError::InvalidPort(port.to_string()))?;
            (host, Some(port))
        }
        None => (authority, None),
    };

    if host.is_empty() {
        return Err(AddressError::MissingHost(original.to_string()));
    }

    Ok((host.to_string(), port, path.to_string()))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}:")?;
        }
        match &self.host {
            Some(host) => {
                write!(f, "//{host}")?;
                if let Some(port) = self.port {
                    write!(f, ":{port}")?;
                }
                write!(f, "/{}", self.path)
            }
            None => write!(f, "{}", self.path),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

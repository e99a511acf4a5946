//! Engine reference syntax.
//!
//! A reference is either a toolchain reference, `go://<path>[@<version>]` or
//! `cargo://<path>[@<version>]`, or an alias reference, `alias://<name>`.
//! Nothing else parses: there is no implicit default scheme.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// Build toolchain used to launch a toolchain reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toolchain {
    Go,
    Cargo,
}

impl Toolchain {
    pub fn scheme(&self) -> &'static str {
        match self {
            Toolchain::Go => "go",
            Toolchain::Cargo => "cargo",
        }
    }
}

/// A parsed engine reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineReference {
    Toolchain {
        toolchain: Toolchain,
        path: String,
        version: Option<String>,
    },
    Alias(String),
}

impl EngineReference {
    /// Last path segment, without any version suffix. For aliases, the alias name.
    pub fn short_name(&self) -> &str {
        match self {
            EngineReference::Toolchain { path, .. } => {
                path.rsplit('/').next().unwrap_or(path.as_str())
            }
            EngineReference::Alias(name) => name,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, EngineReference::Alias(_))
    }
}

impl FromStr for EngineReference {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ResolveError::Malformed {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| malformed("missing \"<scheme>://\" prefix"))?;

        let toolchain = match scheme {
            "alias" => {
                if rest.is_empty() || rest.contains('/') || rest.contains('@') {
                    return Err(malformed("alias name must be a single non-empty segment"));
                }
                return Ok(EngineReference::Alias(rest.to_string()));
            }
            "go" => Toolchain::Go,
            "cargo" => Toolchain::Cargo,
            other => {
                return Err(ResolveError::UnsupportedScheme {
                    scheme: other.to_string(),
                    reference: s.to_string(),
                })
            }
        };

        let (path, version) = match rest.rsplit_once('@') {
            Some((_, "")) => return Err(malformed("empty version after '@'")),
            Some((path, version)) => (path, Some(version.to_string())),
            None => (rest, None),
        };
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(malformed("empty package path"));
        }
        if path.split('/').any(str::is_empty) {
            return Err(malformed("empty path segment"));
        }

        Ok(EngineReference::Toolchain {
            toolchain,
            path: path.to_string(),
            version,
        })
    }
}

impl TryFrom<String> for EngineReference {
    type Error = ResolveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EngineReference> for String {
    fn from(r: EngineReference) -> Self {
        r.to_string()
    }
}

impl fmt::Display for EngineReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineReference::Toolchain {
                toolchain,
                path,
                version,
            } => {
                write!(f, "{}://{}", toolchain.scheme(), path)?;
                if let Some(v) = version {
                    write!(f, "@{v}")?;
                }
                Ok(())
            }
            EngineReference::Alias(name) => write!(f, "alias://{name}"),
        }
    }
}

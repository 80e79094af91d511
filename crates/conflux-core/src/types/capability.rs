use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfluxError;

/// The kind of payload an operation consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Transform,
    Query,
}

/// A named asynchronous operation a source may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Pull,
    Push,
    Query,
    Sync,
    Update,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Pull,
        Capability::Push,
        Capability::Query,
        Capability::Sync,
        Capability::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Pull => "pull",
            Capability::Push => "push",
            Capability::Query => "query",
            Capability::Sync => "sync",
            Capability::Update => "update",
        }
    }

    /// Payload the operation takes as its request
    pub fn payload(&self) -> PayloadKind {
        match self {
            Capability::Pull | Capability::Query => PayloadKind::Query,
            Capability::Push | Capability::Sync | Capability::Update => PayloadKind::Transform,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConfluxError::config(format!("Unknown operation '{}'", s)))
    }
}

/// Capability flags attached to a source at construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub pullable: bool,
    #[serde(default)]
    pub pushable: bool,
    #[serde(default)]
    pub queryable: bool,
    #[serde(default)]
    pub syncable: bool,
    #[serde(default)]
    pub updatable: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            pullable: true,
            pushable: true,
            queryable: true,
            syncable: true,
            updatable: true,
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Pull => self.pullable = true,
            Capability::Push => self.pushable = true,
            Capability::Query => self.queryable = true,
            Capability::Sync => self.syncable = true,
            Capability::Update => self.updatable = true,
        }
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Pull => self.pullable,
            Capability::Push => self.pushable,
            Capability::Query => self.queryable,
            Capability::Sync => self.syncable,
            Capability::Update => self.updatable,
        }
    }

    pub fn is_pullable(&self) -> bool {
        self.pullable
    }

    pub fn is_pushable(&self) -> bool {
        self.pushable
    }

    pub fn is_queryable(&self) -> bool {
        self.queryable
    }

    pub fn is_syncable(&self) -> bool {
        self.syncable
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    /// Supported capabilities in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.supports(*c))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Capabilities::none(), Capabilities::with)
    }
}

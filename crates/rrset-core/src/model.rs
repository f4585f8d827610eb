//! Domain, RRset and principal types shared by the store and the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The authenticated caller, as established by the authorization layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Whether this principal owns the domain
    pub fn owns(&self, domain: &Domain) -> bool {
        domain.owner == self.id
    }
}

/// A zone managed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Lowercase name without trailing dot
    pub name: String,
    /// Principal id of the owner
    pub owner: String,
    /// TTL floor for ordinary writes
    pub minimum_ttl: u32,
    pub created: DateTime<Utc>,
    /// Last time a change was accepted downstream
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
}

impl Domain {
    pub fn new(name: &str, owner: impl Into<String>, minimum_ttl: u32) -> Self {
        Self {
            name: normalize_domain_name(name),
            owner: owner.into(),
            minimum_ttl,
            created: Utc::now(),
            published: None,
        }
    }
}

/// Lowercase a domain name and drop a trailing dot
pub fn normalize_domain_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Identity of an RRset within a domain
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RrsetKey {
    pub subname: String,
    #[serde(rename = "type")]
    pub rtype: String,
}

impl RrsetKey {
    pub fn new(subname: impl Into<String>, rtype: impl Into<String>) -> Self {
        Self {
            subname: subname.into(),
            rtype: rtype.into(),
        }
    }

    /// Fully qualified owner name, e.g. `www.example.com.`
    pub fn fqdn(&self, domain: &str) -> String {
        owner_name(&self.subname, domain)
    }
}

impl fmt::Display for RrsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subname = if self.subname.is_empty() { "@" } else { &self.subname };
        write!(f, "{}/{}", subname, self.rtype)
    }
}

/// Fully qualified owner name for a subname within a domain
pub fn owner_name(subname: &str, domain: &str) -> String {
    if subname.is_empty() {
        format!("{}.", domain)
    } else {
        format!("{}.{}.", subname, domain)
    }
}

/// A stored RRset
///
/// Records are kept in canonical presentation form; the set is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rrset {
    pub subname: String,
    #[serde(rename = "type")]
    pub rtype: String,
    pub ttl: u32,
    pub records: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub touched: DateTime<Utc>,
}

impl Rrset {
    pub fn key(&self) -> RrsetKey {
        RrsetKey::new(self.subname.clone(), self.rtype.clone())
    }

    /// Caller-facing representation
    pub fn view(&self, domain: &str) -> RrsetView {
        RrsetView {
            domain: domain.to_string(),
            subname: self.subname.clone(),
            name: owner_name(&self.subname, domain),
            records: self.records.iter().cloned().collect(),
            ttl: self.ttl,
            rtype: self.rtype.clone(),
            created: self.created,
            touched: self.touched,
        }
    }
}

/// RRset as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrsetView {
    pub domain: String,
    pub subname: String,
    pub name: String,
    pub records: Vec<String>,
    pub ttl: u32,
    #[serde(rename = "type")]
    pub rtype: String,
    pub created: DateTime<Utc>,
    pub touched: DateTime<Utc>,
}

/// Optional filters for listing RRsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrsetFilter {
    #[serde(default)]
    pub subname: Option<String>,
    #[serde(default, rename = "type")]
    pub rtype: Option<String>,
}

impl RrsetFilter {
    pub fn subname(subname: impl Into<String>) -> Self {
        Self {
            subname: Some(subname.into()),
            rtype: None,
        }
    }

    pub fn matches(&self, rrset: &Rrset) -> bool {
        self.subname.as_deref().is_none_or(|s| s == rrset.subname)
            && self.rtype.as_deref().is_none_or(|t| t == rrset.rtype)
    }
}

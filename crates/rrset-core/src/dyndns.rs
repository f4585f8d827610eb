//! Dynamic DNS check-ins
//!
//! A check-in carries at most one value per address family. Each value is
//! turned into an [`AddressUpdate`] for the apex A or AAAA RRset, and the
//! resulting items go to the reconciler as a single Update batch, so both
//! families succeed or fail together.
//!
//! | value              | effect on the RRset                         |
//! |--------------------|---------------------------------------------|
//! | absent             | untouched                                   |
//! | `preserve`         | untouched                                   |
//! | empty              | removed                                     |
//! | `a,b,...`          | replaced by exactly these addresses         |
//! | `addr/len`         | network bits of every stored address rewritten |
//!
//! The shared `myip` parameter feeds both families: IPv4 takes the values
//! containing a `.`, IPv6 those containing a `:`.
//!
//! Outcomes are reported in the small fixed vocabulary legacy clients expect.

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::DyndnsConfig;
use crate::engine::{ApplyOptions, Batch, BatchOperation, ChangeItem, Reconciler};
use crate::error::Error;
use crate::model::{Principal, Rrset};

/// Address information of one check-in; `None` means the parameter was absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    /// Values for either family
    #[serde(default)]
    pub myip: Option<String>,
    #[serde(default, alias = "ip", alias = "myipv4")]
    pub ipv4: Option<String>,
    #[serde(default, alias = "myipv6")]
    pub ipv6: Option<String>,
}

impl CheckIn {
    pub fn new(ipv4: Option<&str>, ipv6: Option<&str>) -> Self {
        Self {
            myip: None,
            ipv4: ipv4.map(str::to_string),
            ipv6: ipv6.map(str::to_string),
        }
    }

    /// A check-in with only the shared parameter
    pub fn shared(myip: &str) -> Self {
        Self {
            myip: Some(myip.to_string()),
            ..Self::default()
        }
    }

    /// What this check-in asks for one family, `None` if nothing
    ///
    /// IPv4 looks at `myip` before `ipv4`; IPv6 at `ipv6` before `myip`.
    pub fn update_for(&self, family: Family) -> Result<Option<AddressUpdate>, String> {
        let own = |value: &Option<String>| match value {
            Some(value) => AddressUpdate::parse(value, family).map(Some),
            None => Ok(None),
        };
        let shared = || match &self.myip {
            Some(value) => AddressUpdate::parse_shared(value, family),
            None => Ok(None),
        };

        match family {
            Family::V4 => match shared()? {
                Some(update) => Ok(Some(update)),
                None => own(&self.ipv4),
            },
            Family::V6 => match own(&self.ipv6)? {
                Some(update) => Ok(Some(update)),
                None => shared(),
            },
        }
    }
}

/// Address family of a check-in parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn rtype(self) -> &'static str {
        match self {
            Family::V4 => "A",
            Family::V6 => "AAAA",
        }
    }

    fn param(self) -> &'static str {
        match self {
            Family::V4 => "ipv4",
            Family::V6 => "ipv6",
        }
    }

    fn separator(self) -> char {
        match self {
            Family::V4 => '.',
            Family::V6 => ':',
        }
    }
}

/// What a check-in asks for one address family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressUpdate {
    /// Replace the RRset with these addresses (empty removes it)
    Set(Vec<String>),
    /// Keep the host bits of every stored address, take the network bits from here
    Subnet(IpNetwork),
    /// Leave the RRset alone
    Preserve,
}

impl AddressUpdate {
    /// Interpret the value of a family's own parameter
    pub fn parse(value: &str, family: Family) -> Result<Self, String> {
        Self::from_values(value.split(',').map(str::trim).collect(), family.param(), family)
    }

    /// Interpret the shared parameter for one family, `None` if it holds nothing for it
    pub fn parse_shared(value: &str, family: Family) -> Result<Option<Self>, String> {
        let values: BTreeSet<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|v| v.contains(family.separator()) || v.is_empty() || *v == "preserve")
            .collect();
        if values.is_empty() {
            return Ok(None);
        }
        Self::from_values(values, "myip", family).map(Some)
    }

    fn from_values(values: BTreeSet<&str>, param: &str, family: Family) -> Result<Self, String> {
        if values.len() > 1 {
            if values.contains("") || values.contains("preserve") {
                return Err(format!(
                    "IP parameter \"{}\" cannot have addresses and \"preserve\" at the same time.",
                    param
                ));
            }
            if values.iter().any(|v| v.contains('/')) {
                return Err(format!(
                    "IP parameter \"{}\" cannot use subnet notation with multiple addresses.",
                    param
                ));
            }
        }

        let values: Vec<&str> = values.into_iter().collect();
        match values.as_slice() {
            [""] => Ok(AddressUpdate::Set(Vec::new())),
            ["preserve"] => Ok(AddressUpdate::Preserve),
            [subnet] if subnet.contains('/') => parse_subnet(subnet, family)
                .map(AddressUpdate::Subnet)
                .map_err(|e| format!("IP parameter \"{}\" is an invalid subnet: {}", param, e)),
            addresses => Ok(AddressUpdate::Set(
                addresses.iter().map(|a| a.to_string()).collect(),
            )),
        }
    }
}

/// Parse `addr/len` of the given family; host bits may be set
fn parse_subnet(value: &str, family: Family) -> Result<IpNetwork, String> {
    match family {
        Family::V4 => value.parse::<Ipv4Network>().map(IpNetwork::V4),
        Family::V6 => value.parse::<Ipv6Network>().map(IpNetwork::V6),
    }
    .map_err(|e| e.to_string())
}

/// Rewrite the network bits of every address of the subnet's family
///
/// Values of the other family or that do not parse are dropped.
pub fn rewrite_network<'a>(subnet: &IpNetwork, records: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    records
        .into_iter()
        .filter_map(|record| match subnet {
            IpNetwork::V4(net) => {
                let address: Ipv4Addr = record.parse().ok()?;
                Some((net.network() | (address & !net.mask())).to_string())
            }
            IpNetwork::V6(net) => {
                let address: Ipv6Addr = record.parse().ok()?;
                Some((net.network() | (address & !net.mask())).to_string())
            }
        })
        .collect()
}

/// Fixed outcome vocabulary of the update protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DyndnsStatus {
    /// Update applied
    #[serde(rename = "good")]
    Good,
    /// The check-in carried no address information
    #[serde(rename = "nochg")]
    NoChg,
    /// No authenticated principal
    #[serde(rename = "badauth")]
    BadAuth,
    /// Domain unknown or not owned by the principal
    #[serde(rename = "nohost")]
    NoHost,
    /// Addresses rejected by validation
    #[serde(rename = "dnserr")]
    DnsErr,
    /// Storage fault or other server-side failure
    #[serde(rename = "911")]
    ServerError,
}

impl DyndnsStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DyndnsStatus::Good => "good",
            DyndnsStatus::NoChg => "nochg",
            DyndnsStatus::BadAuth => "badauth",
            DyndnsStatus::NoHost => "nohost",
            DyndnsStatus::DnsErr => "dnserr",
            DyndnsStatus::ServerError => "911",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, DyndnsStatus::Good | DyndnsStatus::NoChg)
    }

    fn from_error(error: &Error) -> Self {
        match error {
            Error::NotFound(_) => DyndnsStatus::NoHost,
            Error::Rejected(_) | Error::Policy(_) | Error::Validation(_) | Error::Conflict(_) => {
                DyndnsStatus::DnsErr
            }
            _ => DyndnsStatus::ServerError,
        }
    }
}

impl fmt::Display for DyndnsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns check-ins into apex A/AAAA batches
pub struct DyndnsMerger {
    reconciler: Arc<Reconciler>,
    config: DyndnsConfig,
}

impl DyndnsMerger {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let config = reconciler.config().dyndns.clone();
        Self { reconciler, config }
    }

    /// Apply one check-in for `domain`
    ///
    /// `principal` is `None` when authentication failed.
    pub async fn apply_check_in(
        &self,
        principal: Option<&Principal>,
        domain: &str,
        check_in: &CheckIn,
    ) -> DyndnsStatus {
        let Some(principal) = principal else {
            debug!(domain = %domain, "Check-in without credentials");
            return DyndnsStatus::BadAuth;
        };

        let status = match self.merge(principal, domain, check_in).await {
            Ok(status) => status,
            Err(e) => {
                let status = DyndnsStatus::from_error(&e);
                if status == DyndnsStatus::ServerError {
                    error!(domain = %domain, "Check-in failed: {}", e);
                } else {
                    warn!(domain = %domain, "Check-in rejected ({}): {}", status, e);
                }
                status
            }
        };
        info!(domain = %domain, principal = %principal.id, "Check-in: {}", status);
        status
    }

    async fn merge(&self, principal: &Principal, domain: &str, check_in: &CheckIn) -> crate::Result<DyndnsStatus> {
        // also establishes that the domain is visible to the principal
        self.reconciler.domain(principal, domain).await?;

        let mut updates = Vec::new();
        for family in [Family::V4, Family::V6] {
            if let Some(update) = check_in.update_for(family).map_err(Error::validation)? {
                updates.push((family, update));
            }
        }
        if updates.is_empty() {
            return Ok(DyndnsStatus::NoChg);
        }

        let ttl = i64::from(self.config.ttl);
        // subnet updates read the apex under the domain lock
        let build = |apex: &[Rrset]| -> crate::Result<Batch> {
            let mut items = Vec::new();
            for (family, update) in &updates {
                let records = match update {
                    AddressUpdate::Preserve => continue,
                    AddressUpdate::Set(addresses) => addresses.clone(),
                    AddressUpdate::Subnet(subnet) => {
                        let current = apex.iter().find(|rrset| rrset.rtype == family.rtype());
                        rewrite_network(
                            subnet,
                            current.into_iter().flat_map(|r| r.records.iter().map(String::as_str)),
                        )
                    }
                };
                items.push(
                    ChangeItem::new("", family.rtype())
                        .with_ttl(ttl)
                        .with_records(records),
                );
            }
            Ok(Batch::list(items))
        };

        let options = ApplyOptions {
            minimum_ttl: Some(self.config.minimum_ttl),
        };
        self.reconciler
            .apply_derived(principal, domain, BatchOperation::Update, "", &build, options)
            .await?;
        Ok(DyndnsStatus::Good)
    }
}

// # RRset Store Implementations
//
// This module provides implementations of the RrsetStore trait for
// different persistence strategies. Both share the in-memory [`Zones`]
// table; the file store additionally persists it after every mutation.

pub mod file;
pub mod memory;

pub use file::FileRrsetStore;
pub use memory::MemoryRrsetStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::{Domain, Rrset, RrsetFilter, RrsetKey};
use crate::traits::RrsetStore;

/// Open the store described by the configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RrsetStore>> {
    config.validate()?;
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryRrsetStore::new())),
        StoreConfig::File { path } => Ok(Arc::new(FileRrsetStore::new(path).await?)),
    }
}

/// A domain with its RRsets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Zone {
    pub(crate) domain: Domain,
    #[serde(with = "rrset_list")]
    pub(crate) rrsets: BTreeMap<RrsetKey, Rrset>,
}

/// All zones, keyed by domain name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Zones {
    zones: BTreeMap<String, Zone>,
}

impl Zones {
    pub(crate) fn domain(&self, name: &str) -> Option<Domain> {
        self.zones.get(name).map(|z| z.domain.clone())
    }

    pub(crate) fn create_domain(&mut self, domain: &Domain) -> Result<()> {
        if self.zones.contains_key(&domain.name) {
            return Err(Error::conflict(format!(
                "Domain {} already exists",
                domain.name
            )));
        }
        self.zones.insert(
            domain.name.clone(),
            Zone {
                domain: domain.clone(),
                rrsets: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub(crate) fn delete_domain(&mut self, name: &str) -> bool {
        self.zones.remove(name).is_some()
    }

    pub(crate) fn mark_published(&mut self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let zone = self.zone_mut(name)?;
        zone.domain.published = Some(at);
        Ok(())
    }

    pub(crate) fn get(&self, domain: &str, key: &RrsetKey) -> Option<Rrset> {
        self.zones.get(domain)?.rrsets.get(key).cloned()
    }

    pub(crate) fn list(&self, domain: &str, filter: &RrsetFilter) -> Vec<Rrset> {
        self.zones
            .get(domain)
            .map(|zone| {
                zone.rrsets
                    .values()
                    .filter(|rrset| filter.matches(rrset))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn upsert(
        &mut self,
        domain: &str,
        key: &RrsetKey,
        ttl: u32,
        records: BTreeSet<String>,
    ) -> Result<Option<Rrset>> {
        let zone = self.zone_mut(domain)?;
        if records.is_empty() {
            zone.rrsets.remove(key);
            return Ok(None);
        }

        let now = Utc::now();
        let rrset = match zone.rrsets.remove(key) {
            Some(existing) => Rrset {
                ttl,
                records,
                touched: now,
                ..existing
            },
            None => Rrset {
                subname: key.subname.clone(),
                rtype: key.rtype.clone(),
                ttl,
                records,
                created: now,
                touched: now,
            },
        };
        zone.rrsets.insert(key.clone(), rrset.clone());
        Ok(Some(rrset))
    }

    pub(crate) fn restore(&mut self, domain: &str, key: &RrsetKey, previous: Option<Rrset>) -> Result<()> {
        let zone = self.zone_mut(domain)?;
        match previous {
            Some(rrset) => zone.rrsets.insert(key.clone(), rrset),
            None => zone.rrsets.remove(key),
        };
        Ok(())
    }

    pub(crate) fn rrset_count(&self) -> usize {
        self.zones.values().map(|z| z.rrsets.len()).sum()
    }

    fn zone_mut(&mut self, name: &str) -> Result<&mut Zone> {
        self.zones
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Domain {} does not exist", name)))
    }
}

/// Serialize the RRset map as a plain list; the key is derived from each entry
mod rrset_list {
    use super::{Rrset, RrsetKey};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        rrsets: &BTreeMap<RrsetKey, Rrset>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&Rrset> = rrsets.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<RrsetKey, Rrset>, D::Error> {
        let list = Vec::<Rrset>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|r| (r.key(), r)).collect())
    }
}

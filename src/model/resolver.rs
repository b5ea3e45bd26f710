use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A stable handle to one [`super::Resolver`]: the zone it lives in plus its
/// own FQDN. Used everywhere a direct reference would otherwise require
/// shared mutable ownership across the Zone/Resolver/Name graph (see the
/// arena-with-keys strategy in the design notes).
pub type ResolverKey = (String, String);

/// One nameserver within one zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolver {
    pub zone_name: String,
    pub name: String,
    pub ip: Vec<String>,
    pub up: IndexSet<ResolverKey>,
}

pub const NODATA_SENTINEL: &str = "NODATA";

impl Resolver {
    pub fn new(zone_name: impl Into<String>, name: impl Into<String>) -> Self {
        Resolver { zone_name: zone_name.into(), name: name.into(), ip: Vec::new(), up: IndexSet::new() }
    }

    pub fn key(&self) -> ResolverKey {
        (self.zone_name.clone(), self.name.clone())
    }

    /// True once this resolver has either a concrete IP list or the
    /// `NODATA` sentinel recorded -- i.e. glue resolution has concluded.
    pub fn has_ip(&self) -> bool {
        !self.ip.is_empty()
    }

    pub fn is_nodata(&self) -> bool {
        self.ip.len() == 1 && self.ip[0] == NODATA_SENTINEL
    }

    /// Records an upward delegation edge, deduplicating by insertion order.
    pub fn add_upward(&mut self, from: ResolverKey) {
        self.up.insert(from);
    }
}

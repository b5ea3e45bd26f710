use super::name::Name;
use super::resolver::Resolver;
use crate::config::TracerConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const ROOT_ZONE_NAME: &str = ".";

/// A DNS zone. Only the root zone (`name == "."`) populates `subzones` and
/// `names`; every other zone's copies of those maps stay empty. The root is
/// the sole owner of every Zone and Name reachable during a trace -- see
/// the design notes on cyclic ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Zone {
    pub name: String,
    pub resolvers: IndexMap<String, Resolver>,
    pub trace_missing_glue: bool,
    pub even_trace_m_gtld_servers_net: bool,
    #[serde(default)]
    pub subzones: IndexMap<String, Zone>,
    #[serde(default)]
    pub names: IndexMap<String, Name>,
}

impl Zone {
    /// Creates the distinguished root zone that a trace starts from.
    pub fn root(config: &TracerConfig) -> Self {
        Zone {
            name: ROOT_ZONE_NAME.to_string(),
            resolvers: IndexMap::new(),
            trace_missing_glue: config.trace_missing_glue,
            even_trace_m_gtld_servers_net: config.even_trace_m_gtld_servers_net,
            subzones: IndexMap::new(),
            names: IndexMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.name == ROOT_ZONE_NAME
    }

    /// Constructs a zone inheriting configuration flags from the root, not
    /// yet linked into `root.subzones`. Used for the transient, detached
    /// zones created during non-registering glue-chase descents.
    fn detached_child(&self, name: impl Into<String>) -> Zone {
        Zone {
            name: name.into(),
            resolvers: IndexMap::new(),
            trace_missing_glue: self.trace_missing_glue,
            even_trace_m_gtld_servers_net: self.even_trace_m_gtld_servers_net,
            subzones: IndexMap::new(),
            names: IndexMap::new(),
        }
    }

    /// Looks up a zone by name, treating `self` as the root: either `self`
    /// itself or one of its subzones.
    pub fn zone(&self, zone_name: &str) -> Option<&Zone> {
        if zone_name == self.name {
            Some(self)
        } else {
            self.subzones.get(zone_name)
        }
    }

    pub fn zone_mut(&mut self, zone_name: &str) -> Option<&mut Zone> {
        if zone_name == self.name {
            Some(self)
        } else {
            self.subzones.get_mut(zone_name)
        }
    }

    /// Finds or creates (and registers into `self.subzones`) the zone named
    /// `zone_name`. Call only on the root zone.
    pub fn find_or_create_subzone(&mut self, zone_name: &str) -> &mut Zone {
        debug_assert!(self.is_root());
        if zone_name == self.name {
            return self;
        }
        if !self.subzones.contains_key(zone_name) {
            let child = self.detached_child(zone_name);
            self.subzones.insert(zone_name.to_string(), child);
        }
        self.subzones.get_mut(zone_name).unwrap()
    }

    /// Creates a fresh zone not linked into `subzones`, for the
    /// non-registering (`register = false`) glue-chase descent.
    pub fn new_transient_zone(&self, zone_name: &str) -> Zone {
        self.detached_child(zone_name)
    }

    pub fn resolver(&self, zone_name: &str, resolver_name: &str) -> Option<&Resolver> {
        self.zone(zone_name)?.resolvers.get(resolver_name)
    }

    pub fn resolver_mut(&mut self, zone_name: &str, resolver_name: &str) -> Option<&mut Resolver> {
        self.zone_mut(zone_name)?.resolvers.get_mut(resolver_name)
    }

    /// Finds or creates a resolver inside the zone named `zone_name` (which
    /// must already exist), with an empty IP list if newly created.
    pub fn find_or_create_resolver(&mut self, zone_name: &str, resolver_name: &str) -> &mut Resolver {
        let zone = self.zone_mut(zone_name).expect("zone must already exist");
        zone.resolvers
            .entry(resolver_name.to_string())
            .or_insert_with(|| Resolver::new(zone_name, resolver_name));
        zone.resolvers.get_mut(resolver_name).unwrap()
    }

    pub fn find_or_create_name(&mut self, name: &str) -> &mut Name {
        debug_assert!(self.is_root());
        self.names.entry(name.to_string()).or_insert_with(|| Name::new(name))
    }

    /// All zones reachable from root (root included), in a stable order:
    /// root first, then subzones in insertion order. Used by the emitter.
    pub fn all_zones(&self) -> Vec<&Zone> {
        debug_assert!(self.is_root());
        let mut zones = vec![self];
        zones.extend(self.subzones.values());
        zones
    }

    /// Resolvers of this zone, sorted by name for deterministic iteration
    /// (spec: "sorted by Resolver name to make runs reproducible").
    pub fn resolvers_sorted(&self) -> Vec<&Resolver> {
        let mut resolvers: Vec<&Resolver> = self.resolvers.values().collect();
        resolvers.sort_by(|a, b| a.name.cmp(&b.name));
        resolvers
    }
}

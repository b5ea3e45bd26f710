//! YAML/JSON round-trip for a traced [`Zone`] tree, per the schema in
//! spec §4.5: a root object carrying its own resolvers, a parent-first
//! list of zones (each with its own resolvers), and a root-only list of
//! names. Grounded on the original `Zone.serialize`/`deserialize`, but
//! simplified by the arena/key design: since cross-links are already
//! `(zone_name, resolver_name)` key pairs rather than object pointers, a
//! restored graph needs no pointer-fixup pass -- only a referential-
//! integrity check, which doubles as the "malformed serialized input is
//! fatal" guarantee from spec §7.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::TracerError;
use crate::model::{Name, Resolver, ResolverKey, Zone, ROOT_ZONE_NAME};

#[derive(Debug, Serialize, Deserialize)]
struct SerializedResolver {
    name: String,
    ip: Vec<String>,
    up: Vec<ResolverKey>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedZone {
    name: String,
    resolvers: Vec<SerializedResolver>,
    trace_missing_glue: bool,
    even_trace_m_gtld_servers_net: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedName {
    name: String,
    addresses: IndexMap<String, Vec<ResolverKey>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedRoot {
    name: String,
    resolvers: Vec<SerializedResolver>,
    trace_missing_glue: bool,
    even_trace_m_gtld_servers_net: bool,
    zones: Vec<SerializedZone>,
    names: Vec<SerializedName>,
}

fn serialize_resolver(resolver: &Resolver) -> SerializedResolver {
    SerializedResolver { name: resolver.name.clone(), ip: resolver.ip.clone(), up: resolver.up.iter().cloned().collect() }
}

fn serialize_zone(zone: &Zone) -> SerializedZone {
    SerializedZone {
        name: zone.name.clone(),
        resolvers: zone.resolvers.values().map(serialize_resolver).collect(),
        trace_missing_glue: zone.trace_missing_glue,
        even_trace_m_gtld_servers_net: zone.even_trace_m_gtld_servers_net,
    }
}

/// `root.subzones` is already in parent-first order: a zone can only be
/// discovered via delegation from an already-known zone, and `IndexMap`
/// preserves insertion order, so no topological sort is needed here.
fn to_wire(root: &Zone) -> SerializedRoot {
    SerializedRoot {
        name: root.name.clone(),
        resolvers: root.resolvers.values().map(serialize_resolver).collect(),
        trace_missing_glue: root.trace_missing_glue,
        even_trace_m_gtld_servers_net: root.even_trace_m_gtld_servers_net,
        zones: root.subzones.values().map(serialize_zone).collect(),
        names: root
            .names
            .values()
            .map(|name| SerializedName {
                name: name.name.clone(),
                addresses: name.addresses.iter().map(|(addr, resolvers)| (addr.clone(), resolvers.iter().cloned().collect())).collect(),
            })
            .collect(),
    }
}

fn deserialize_resolver(zone_name: &str, wire: SerializedResolver) -> Resolver {
    Resolver { zone_name: zone_name.to_string(), name: wire.name, ip: wire.ip, up: wire.up.into_iter().collect() }
}

fn from_wire(wire: SerializedRoot) -> Result<Zone, TracerError> {
    if wire.name != ROOT_ZONE_NAME {
        return Err(TracerError::Codec(format!("serialized root zone name must be '.', got {:?}", wire.name)));
    }
    let mut root = Zone {
        name: wire.name,
        resolvers: IndexMap::new(),
        trace_missing_glue: wire.trace_missing_glue,
        even_trace_m_gtld_servers_net: wire.even_trace_m_gtld_servers_net,
        subzones: IndexMap::new(),
        names: IndexMap::new(),
    };
    for wire_resolver in wire.resolvers {
        let resolver = deserialize_resolver(ROOT_ZONE_NAME, wire_resolver);
        root.resolvers.insert(resolver.name.clone(), resolver);
    }
    for wire_zone in wire.zones {
        let mut zone = Zone {
            name: wire_zone.name.clone(),
            resolvers: IndexMap::new(),
            trace_missing_glue: wire_zone.trace_missing_glue,
            even_trace_m_gtld_servers_net: wire_zone.even_trace_m_gtld_servers_net,
            subzones: IndexMap::new(),
            names: IndexMap::new(),
        };
        for wire_resolver in wire_zone.resolvers {
            let resolver = deserialize_resolver(&wire_zone.name, wire_resolver);
            zone.resolvers.insert(resolver.name.clone(), resolver);
        }
        root.subzones.insert(wire_zone.name, zone);
    }
    for wire_name in wire.names {
        let mut name = Name::new(wire_name.name.clone());
        for (addr, resolvers) in wire_name.addresses {
            for key in resolvers {
                name.record(addr.clone(), key);
            }
        }
        root.names.insert(wire_name.name, name);
    }
    validate_referential_integrity(&root)?;
    Ok(root)
}

/// Every `up`/provenance key must resolve to a real resolver reachable from
/// root -- spec §8's reachability invariant, checked on restore so a
/// hand-edited or corrupted file fails fast instead of producing a graph
/// with dangling references.
fn validate_referential_integrity(root: &Zone) -> Result<(), TracerError> {
    let resolver_exists = |key: &ResolverKey| root.zone(&key.0).map(|z| z.resolvers.contains_key(&key.1)).unwrap_or(false);
    for zone in root.all_zones() {
        for resolver in zone.resolvers.values() {
            for up in &resolver.up {
                if !resolver_exists(up) {
                    return Err(TracerError::Codec(format!(
                        "resolver {:?} in zone {:?} has a dangling up-reference to {up:?}",
                        resolver.name, zone.name
                    )));
                }
            }
        }
    }
    for name in root.names.values() {
        for resolvers in name.addresses.values() {
            for key in resolvers {
                if !resolver_exists(key) {
                    return Err(TracerError::Codec(format!("name {:?} has a dangling provenance reference to {key:?}", name.name)));
                }
            }
        }
    }
    Ok(())
}

pub fn to_yaml_string(root: &Zone) -> Result<String, TracerError> {
    Ok(serde_yaml::to_string(&to_wire(root))?)
}

pub fn from_yaml_str(input: &str) -> Result<Zone, TracerError> {
    let wire: SerializedRoot = serde_yaml::from_str(input)?;
    from_wire(wire)
}

pub fn to_json_string(root: &Zone) -> Result<String, TracerError> {
    Ok(serde_json::to_string_pretty(&to_wire(root))?)
}

pub fn from_json_str(input: &str) -> Result<Zone, TracerError> {
    let wire: SerializedRoot = serde_json::from_str(input)?;
    from_wire(wire)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::TracerConfig;

    #[test]
    fn yaml_round_trip_preserves_structure() -> Result<(), TracerError> {
        let mut root = Zone::root(&TracerConfig::default());
        root.resolvers.insert("a.root-servers.net.".to_string(), Resolver::new(".", "a.root-servers.net."));
        let com = root.find_or_create_subzone("com.");
        com.resolvers.insert("a.gtld-servers.net.".to_string(), {
            let mut r = Resolver::new("com.", "a.gtld-servers.net.");
            r.ip = vec!["192.5.6.30".to_string()];
            r
        });
        let mut name = Name::new("example.com.");
        name.record("93.184.216.34", ("com.".to_string(), "a.gtld-servers.net.".to_string()));
        root.names.insert("example.com.".to_string(), name);

        let yaml = to_yaml_string(&root)?;
        let restored = from_yaml_str(&yaml)?;
        let yaml_again = to_yaml_string(&restored)?;
        assert_eq!(yaml, yaml_again);
        assert_eq!(restored.names.get("example.com.").unwrap().addresses.len(), 1);
        Ok(())
    }

    #[test]
    fn rejects_dangling_up_reference() {
        let input = r#"
name: "."
resolvers: []
trace_missing_glue: false
even_trace_m_gtld_servers_net: false
zones:
  - name: "com."
    resolvers:
      - name: "a.gtld-servers.net."
        ip: []
        up: [[".", "nonexistent.root-servers.net."]]
    trace_missing_glue: false
    even_trace_m_gtld_servers_net: false
names: []
"#;
        assert!(from_yaml_str(input).is_err());
    }
}

//! The recursive-tracing state machine. Grounded on the teacher's
//! `ResolutionState::resolve_inner` (the async-recursive walk and its depth
//! guard) and the original Python `tracegraph.Resolver.resolve` /
//! `Zone.resolve` / `process_auth` / `process_answer` methods, reworked onto
//! the arena-with-keys ownership model described in the design notes.

use std::net::IpAddr;

use async_recursion::async_recursion;
use hickory_proto::rr::{Name as WireName, RData, Record, RecordType};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::client::{Client, ClientOutcome};
use crate::config::TracerConfig;
use crate::error::TracerError;
use crate::model::{
    is_error_sentinel, Name, Resolver, ResolverKey, Zone, NODATA, NXDOMAIN, ROOT_ZONE_NAME, SERVFAIL, TIMEOUT,
};

/// Generous backstop against glue-chase cycles the upward/echo-referral
/// checks don't already catch. Not a literal spec constant -- a safety net.
const MAX_RECURSION_DEPTH: u32 = 40;

const M_GTLD_SERVERS_NET: &str = "m.gtld-servers.net.";

/// Drives one top-level trace of a name/record-type pair against a [`Zone`]
/// tree, starting from the root. Stateless across calls: all mutable state
/// lives in the `root` argument threaded through every method.
#[derive(Debug)]
pub struct Tracer<'c, C: Client + Sync> {
    client: &'c C,
    config: TracerConfig,
}

impl<'c, C: Client + Sync> Tracer<'c, C> {
    pub fn new(client: &'c C, config: TracerConfig) -> Self {
        Tracer { client, config }
    }

    /// Traces `name`/`qtype` from the root, bootstrapping root server
    /// addresses on first use. Mutates `root` in place; the caller owns the
    /// resulting graph for emission or serialization.
    #[instrument(skip(self, root))]
    pub async fn trace(&self, root: &mut Zone, name: &str, qtype: RecordType) -> Result<(), TracerError> {
        let name = ensure_trailing_dot(name);
        self.trace_zone(root, ROOT_ZONE_NAME, &name, qtype, 1).await
    }

    /// Queries every resolver of `zone_name`, sorted by name, for
    /// `name`/`qtype`, registering everything learned into `root`.
    #[async_recursion(?Send)]
    async fn trace_zone(
        &self,
        root: &mut Zone,
        zone_name: &str,
        name: &str,
        qtype: RecordType,
        depth: u32,
    ) -> Result<(), TracerError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(TracerError::RecursionLimit(depth));
        }
        if zone_name == ROOT_ZONE_NAME && root.resolvers.is_empty() {
            self.bootstrap_root_servers(root).await?;
        }
        let resolver_names: Vec<String> = root
            .zone(zone_name)
            .map(|z| z.resolvers_sorted().into_iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default();
        for resolver_name in resolver_names {
            self.resolve(root, zone_name, &resolver_name, name, qtype, true, depth).await?;
        }
        Ok(())
    }

    async fn bootstrap_root_servers(&self, root: &mut Zone) -> Result<(), TracerError> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        for label in "abcdefghijklm".chars() {
            let ns_name = format!("{label}.root-servers.net.");
            let lookup = resolver
                .ipv4_lookup(ns_name.as_str())
                .await
                .map_err(|e| TracerError::RootBootstrap(ns_name.clone(), e.to_string()))?;
            let ips: Vec<String> = lookup.iter().map(|a| a.0.to_string()).collect();
            debug!(%ns_name, ip_count = ips.len(), "bootstrapped root server");
            root.find_or_create_resolver(ROOT_ZONE_NAME, &ns_name).ip = ips;
        }
        Ok(())
    }

    /// Resolves `name`/`qtype` by querying one specific, persistently stored
    /// resolver (`zone_name`/`resolver_name`). Handles the glue-chase for a
    /// missing IP (steps 1-4 of the design notes) before dispatching.
    #[async_recursion(?Send)]
    async fn resolve(
        &self,
        root: &mut Zone,
        zone_name: &str,
        resolver_name: &str,
        name: &str,
        qtype: RecordType,
        register: bool,
        depth: u32,
    ) -> Result<Vec<String>, TracerError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(TracerError::RecursionLimit(depth));
        }
        let resolver_key: ResolverKey = (zone_name.to_string(), resolver_name.to_string());

        let has_ip = root.resolver(zone_name, resolver_name).map(Resolver::has_ip).unwrap_or(false);
        if !has_ip {
            if name == resolver_name {
                return Ok(vec!["No glue".to_string()]);
            }
            let ip = self.obtain_missing_glue(root, resolver_name, depth).await?;
            root.resolver_mut(zone_name, resolver_name).expect("resolver must exist").ip = ip;
        }

        let resolver = root.resolver(zone_name, resolver_name).expect("resolver must exist").clone();
        if resolver.ip.is_empty() || resolver.is_nodata() {
            if register {
                root.find_or_create_name(name).record_error(NODATA, resolver_key);
            }
            return Ok(vec![]);
        }

        let target_ip = match resolver.ip[0].parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => {
                if register {
                    root.find_or_create_name(name).record_error(NODATA, resolver_key);
                }
                return Ok(vec![]);
            }
        };

        let wire_name: WireName = name.parse()?;
        let outcome = self.client.query(target_ip, &wire_name, qtype, self.config.query_timeout).await?;
        self.dispatch_response(root, resolver_key, name, qtype, outcome, register, depth).await
    }

    /// The non-registering counterpart of [`Self::resolve`], operating on a
    /// locally owned, detached [`Zone`] snapshot rather than `root`'s
    /// permanent storage. Used for the glue-chase fallback (step 3) and for
    /// continuing a non-registering descent past further delegations.
    /// `root` is still threaded through for the rare case where glue-chasing
    /// escalates into a real, registering [`Self::trace_zone`] call.
    #[async_recursion(?Send)]
    async fn resolve_local(
        &self,
        root: &mut Zone,
        zone: &mut Zone,
        resolver_name: &str,
        name: &str,
        qtype: RecordType,
        depth: u32,
    ) -> Result<Vec<String>, TracerError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(TracerError::RecursionLimit(depth));
        }
        let zone_name = zone.name.clone();
        let resolver_key: ResolverKey = (zone_name.clone(), resolver_name.to_string());

        let has_ip = zone.resolvers.get(resolver_name).map(Resolver::has_ip).unwrap_or(false);
        if !has_ip {
            if name == resolver_name {
                return Ok(vec!["No glue".to_string()]);
            }
            let ip = self.obtain_missing_glue(root, resolver_name, depth).await?;
            zone.resolvers
                .entry(resolver_name.to_string())
                .or_insert_with(|| Resolver::new(zone_name.as_str(), resolver_name))
                .ip = ip;
        }

        let resolver = zone
            .resolvers
            .get(resolver_name)
            .cloned()
            .unwrap_or_else(|| Resolver::new(zone_name.as_str(), resolver_name));
        if resolver.ip.is_empty() || resolver.is_nodata() {
            return Ok(vec![]);
        }

        let target_ip = match resolver.ip[0].parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => return Ok(vec![]),
        };

        let wire_name: WireName = name.parse()?;
        let outcome = self.client.query(target_ip, &wire_name, qtype, self.config.query_timeout).await?;
        self.dispatch_response(root, resolver_key, name, qtype, outcome, false, depth).await
    }

    /// Picks a resolver of `zone` (preferring one with a known IP, else the
    /// first) and continues the non-registering descent through it. Mirrors
    /// the original `Zone.resolve` helper.
    async fn zone_resolve_local(
        &self,
        root: &mut Zone,
        zone: &mut Zone,
        name: &str,
        qtype: RecordType,
        depth: u32,
    ) -> Result<Vec<String>, TracerError> {
        match pick_resolver(zone) {
            None => Ok(vec![]),
            Some(picked) => self.resolve_local(root, zone, &picked, name, qtype, depth).await,
        }
    }

    /// Steps 2-3 of the missing-glue procedure: either escalate into a real,
    /// registering trace of `resolver_name`, or fall back to a
    /// non-registering lookup starting from the root's current resolvers.
    async fn obtain_missing_glue(
        &self,
        root: &mut Zone,
        resolver_name: &str,
        depth: u32,
    ) -> Result<Vec<String>, TracerError> {
        let waive_m_gtld_exception = resolver_name != M_GTLD_SERVERS_NET || self.config.even_trace_m_gtld_servers_net;
        let ip = if self.config.trace_missing_glue && waive_m_gtld_exception {
            self.trace_zone(root, ROOT_ZONE_NAME, resolver_name, RecordType::A, depth + 1).await?;
            root.names
                .get(resolver_name)
                .map(|n| n.addresses.keys().filter(|a| !is_error_sentinel(a)).cloned().collect())
                .unwrap_or_default()
        } else {
            let mut snapshot = snapshot_zone_resolvers(root, ROOT_ZONE_NAME);
            self.zone_resolve_local(root, &mut snapshot, resolver_name, RecordType::A, depth + 1).await?
        };
        Ok(if ip == ["No glue".to_string()] { vec![] } else { ip })
    }

    async fn dispatch_response(
        &self,
        root: &mut Zone,
        resolver_key: ResolverKey,
        name: &str,
        qtype: RecordType,
        outcome: ClientOutcome,
        register: bool,
        depth: u32,
    ) -> Result<Vec<String>, TracerError> {
        match outcome {
            ClientOutcome::Nxdomain => {
                if register {
                    root.find_or_create_name(name).record_error(NXDOMAIN, resolver_key);
                }
                Ok(vec![])
            }
            ClientOutcome::Servfail => {
                if register {
                    root.find_or_create_name(name).record_error(SERVFAIL, resolver_key);
                }
                Ok(vec![])
            }
            ClientOutcome::Timeout => {
                if register {
                    root.find_or_create_name(name).record_error(TIMEOUT, resolver_key);
                }
                Ok(vec![])
            }
            ClientOutcome::Answered { answer, authority, additional } => {
                if answer.is_empty() {
                    self.process_authority(root, resolver_key, name, qtype, authority, additional, register, depth)
                        .await
                } else {
                    self.process_answer(root, resolver_key, name, qtype, answer, register, depth).await
                }
            }
        }
    }

    /// Handles a delegation or NODATA response (empty answer section).
    /// Detects upward and echo referrals before anything else, then, for
    /// each NS record, finds-or-creates the target zone (registering) or
    /// collects it into a detached, transient zone (non-registering).
    async fn process_authority(
        &self,
        root: &mut Zone,
        resolver_key: ResolverKey,
        name: &str,
        qtype: RecordType,
        authority: Vec<Record>,
        additional: Vec<Record>,
        register: bool,
        depth: u32,
    ) -> Result<Vec<String>, TracerError> {
        let current_zone_name = resolver_key.0.clone();
        let mut last_zone_name: Option<String> = None;
        // Hickory hands back a flat per-record authority list rather than
        // dnspython's grouped rrsets, so an authority section naming more
        // than one delegated zone needs one transient Zone per zonename,
        // not one shared across all of them.
        let mut transients: IndexMap<String, Zone> = IndexMap::new();

        for record in &authority {
            let zonename = record.name().to_string();
            if detect_referral_loop(&root.subzones, &zonename, &current_zone_name) {
                if register {
                    root.find_or_create_name(name).record_error(NXDOMAIN, resolver_key);
                }
                return Ok(vec![]);
            }
            if record.record_type() != RecordType::NS {
                continue;
            }
            let ns_target = match record.data() {
                Some(RData::NS(ns)) => ns.0.to_string().to_lowercase(),
                other => return Err(TracerError::UnknownRecordType(format!("NS rrset without NS rdata: {other:?}"))),
            };
            if register {
                root.find_or_create_subzone(&zonename);
                root.find_or_create_resolver(&zonename, &ns_target).add_upward(resolver_key.clone());
            } else {
                let t = transients.entry(zonename.clone()).or_insert_with(|| root.new_transient_zone(&zonename));
                t.resolvers
                    .entry(ns_target.clone())
                    .or_insert_with(|| Resolver::new(zonename.as_str(), ns_target.as_str()));
            }
            last_zone_name = Some(zonename);
        }

        let Some(new_zone_name) = last_zone_name else {
            if register {
                root.find_or_create_name(name).record_error(NODATA, resolver_key);
            }
            return Ok(vec![]);
        };

        if register {
            let ipv6 = self.config.ipv6_available;
            let zone = root.zone_mut(&new_zone_name).expect("zone created above");
            populate_glue(zone, &additional, ipv6);
            if !root.names.contains_key(name) {
                self.trace_zone(root, &new_zone_name, name, qtype, depth + 1).await?;
            }
            Ok(vec![])
        } else {
            let mut transient =
                transients.remove(&new_zone_name).expect("an NS record implies a transient zone was created");
            populate_glue(&mut transient, &additional, self.config.ipv6_available);
            self.zone_resolve_local(root, &mut transient, name, qtype, depth + 1).await
        }
    }

    /// Handles a response with a non-empty answer section: records every
    /// datum, follows CNAME/MX/SRV indirection, and -- when registering --
    /// schedules a fresh top-level trace for every follow-up name not
    /// already known.
    async fn process_answer(
        &self,
        root: &mut Zone,
        resolver_key: ResolverKey,
        name: &str,
        qtype: RecordType,
        answer: Vec<Record>,
        register: bool,
        depth: u32,
    ) -> Result<Vec<String>, TracerError> {
        let orig_name = name.to_lowercase();
        if register {
            let resolve_next = apply_answer_records(&mut root.names, resolver_key, qtype, answer)?;
            for (new_name, new_qtype) in resolve_next {
                if !root.names.contains_key(&new_name) {
                    self.trace_zone(root, ROOT_ZONE_NAME, &new_name, new_qtype, depth + 1).await?;
                }
            }
            Ok(vec![])
        } else {
            let mut scratch: IndexMap<String, Name> = IndexMap::new();
            apply_answer_records(&mut scratch, resolver_key, qtype, answer)?;
            Ok(scratch.get(&orig_name).map(|n| n.addresses.keys().cloned().collect()).unwrap_or_default())
        }
    }
}

fn ensure_trailing_dot(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// True when `zonename`'s authority record is an upward or echo referral:
/// a zone we've already seen, pointing us back up (or sideways at) our own
/// position in the hierarchy.
fn detect_referral_loop(root_subzones: &IndexMap<String, Zone>, zonename: &str, current_zone_name: &str) -> bool {
    let is_known_subzone = root_subzones.contains_key(zonename);
    let is_upward = is_known_subzone && zonename != current_zone_name && current_zone_name.ends_with(zonename);
    let is_echo = zonename == current_zone_name;
    if is_upward {
        warn!(zonename, current_zone_name, "upward referral detected");
    }
    is_upward || is_echo
}

/// Applies glue A/AAAA records from an additional section onto the matching
/// resolvers of `zone`, overwriting (not appending to) any IP already set.
fn populate_glue(zone: &mut Zone, additional: &[Record], ipv6_available: bool) {
    let mut glue: IndexMap<String, Vec<String>> = IndexMap::new();
    for record in additional {
        let rec_name = record.name().to_string().to_lowercase();
        match record.data() {
            Some(RData::A(a)) => glue.entry(rec_name).or_default().push(a.0.to_string()),
            Some(RData::AAAA(a)) if ipv6_available => glue.entry(rec_name).or_default().push(a.0.to_string()),
            _ => {}
        }
    }
    for (rec_name, ips) in glue {
        if let Some(resolver) = zone.resolvers.get_mut(&rec_name) {
            resolver.ip = ips;
        }
    }
}

/// Records every datum in `answer` into `names`, returning the follow-up
/// (name, qtype) pairs implied by CNAME/MX/SRV indirection.
fn apply_answer_records(
    names: &mut IndexMap<String, Name>,
    resolver_key: ResolverKey,
    qtype: RecordType,
    answer: Vec<Record>,
) -> Result<Vec<(String, RecordType)>, TracerError> {
    let mut resolve_next = Vec::new();
    for record in answer {
        let rec_name = record.name().to_string().to_lowercase();
        let entry = names.entry(rec_name.clone()).or_insert_with(|| Name::new(rec_name.clone()));
        match record.data() {
            Some(RData::A(a)) => entry.record(a.0.to_string(), resolver_key.clone()),
            Some(RData::AAAA(a)) => entry.record(a.0.to_string(), resolver_key.clone()),
            Some(RData::CNAME(c)) => {
                let target = c.0.to_string().to_lowercase();
                entry.record(target.clone(), resolver_key.clone());
                resolve_next.push((target, qtype));
            }
            Some(RData::MX(mx)) => {
                let exchange = mx.exchange().to_string().to_lowercase();
                entry.record(exchange.clone(), resolver_key.clone());
                resolve_next.push((exchange, RecordType::A));
            }
            Some(RData::SRV(srv)) => {
                let target = srv.target().to_string().to_lowercase();
                entry.record(target.clone(), resolver_key.clone());
                resolve_next.push((target, RecordType::A));
            }
            Some(RData::TXT(txt)) => entry.record(txt.to_string(), resolver_key.clone()),
            Some(RData::SOA(soa)) => entry.record(soa.to_string(), resolver_key.clone()),
            Some(RData::PTR(ptr)) => entry.record(ptr.0.to_string(), resolver_key.clone()),
            other => return Err(TracerError::UnknownRecordType(format!("{other:?}"))),
        }
    }
    Ok(resolve_next)
}

/// Picks the resolver of `zone` that already has an IP, falling back to the
/// first one by insertion order. Mirrors `Zone.resolve`'s selection.
fn pick_resolver(zone: &Zone) -> Option<String> {
    zone.resolvers
        .values()
        .find(|r| r.has_ip())
        .or_else(|| zone.resolvers.values().next())
        .map(|r| r.name.clone())
}

/// Clones just `zone_name`'s current resolvers out of `root`, into a fresh
/// detached zone with no subzones/names -- the starting point for a
/// non-registering glue-chase, which never mutates `root`'s own storage.
fn snapshot_zone_resolvers(root: &Zone, zone_name: &str) -> Zone {
    let z = root.zone(zone_name).expect("zone must exist");
    Zone {
        name: z.name.clone(),
        resolvers: z.resolvers.clone(),
        trace_missing_glue: z.trace_missing_glue,
        even_trace_m_gtld_servers_net: z.even_trace_m_gtld_servers_net,
        subzones: IndexMap::new(),
        names: IndexMap::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fake_client::FakeClient;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    #[ctor::ctor]
    fn init() {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
        tracing::subscriber::set_global_default(subscriber).expect("could not set global default tracing subscriber");
    }

    /// A flat authority list naming two distinct delegated zones must keep
    /// each zone's transient resolvers separate, so a non-registering
    /// descent follows the zone it actually means to, not whichever
    /// zone's NS record happened to come first.
    #[tokio::test]
    async fn process_authority_keeps_distinct_transient_zones_separate() -> Result<(), TracerError> {
        let config = TracerConfig::default();
        let mut root = Zone::root(&config);
        let mut client = FakeClient::new();
        client.add("10.0.0.2", "whatever.target.", RecordType::A, ClientOutcome::Answered {
            answer: vec![crate::a!("whatever.target.", "1.2.3.4")],
            authority: vec![],
            additional: vec![],
        });
        let tracer = Tracer::new(&client, config);

        let authority =
            vec![crate::ns!("zone-a.example.", "ns-a.example."), crate::ns!("zone-b.example.", "ns-b.example.")];
        let additional = vec![crate::a!("ns-a.example.", "10.0.0.1"), crate::a!("ns-b.example.", "10.0.0.2")];
        let resolver_key: ResolverKey = (".".to_string(), "parent.example.".to_string());

        let result = tracer
            .process_authority(
                &mut root,
                resolver_key,
                "whatever.target.",
                RecordType::A,
                authority,
                additional,
                false,
                1,
            )
            .await?;

        assert_eq!(result, vec!["1.2.3.4".to_string()]);
        Ok(())
    }

    #[test]
    fn echo_referral_is_detected() {
        let subzones = IndexMap::new();
        assert!(detect_referral_loop(&subzones, "example.com.", "example.com."));
    }

    #[test]
    fn upward_referral_to_a_known_parent_is_detected() {
        let mut subzones = IndexMap::new();
        subzones.insert("com.".to_string(), Zone::root(&TracerConfig::default()));
        assert!(detect_referral_loop(&subzones, "com.", "example.com."));
    }

    #[test]
    fn delegation_to_an_unseen_child_is_not_a_referral_loop() {
        let subzones = IndexMap::new();
        assert!(!detect_referral_loop(&subzones, "example.com.", "com."));
    }

    #[test]
    fn populate_glue_overwrites_existing_ip_by_name_group() {
        let config = TracerConfig::default();
        let mut zone = Zone::root(&config).new_transient_zone("example.com.");
        zone.resolvers.insert("ns.example.com.".to_string(), Resolver::new("example.com.", "ns.example.com."));
        let additional = vec![
            crate::a!("ns.example.com.", "93.184.216.34"),
            crate::a!("ns.example.com.", "93.184.216.35"),
        ];
        populate_glue(&mut zone, &additional, false);
        assert_eq!(
            zone.resolvers.get("ns.example.com.").unwrap().ip,
            vec!["93.184.216.34".to_string(), "93.184.216.35".to_string()]
        );
    }

    #[test]
    fn populate_glue_skips_aaaa_without_ipv6_available() {
        let config = TracerConfig::default();
        let mut zone = Zone::root(&config).new_transient_zone("example.com.");
        zone.resolvers.insert("ns.example.com.".to_string(), Resolver::new("example.com.", "ns.example.com."));
        let additional = vec![hickory_proto::rr::Record::from_rdata(
            "ns.example.com.".parse().unwrap(),
            0,
            RData::AAAA(hickory_proto::rr::rdata::AAAA("2001:db8::1".parse().unwrap())),
        )];
        populate_glue(&mut zone, &additional, false);
        assert!(zone.resolvers.get("ns.example.com.").unwrap().ip.is_empty());
    }

    #[test]
    fn pick_resolver_prefers_one_with_an_ip() {
        let config = TracerConfig::default();
        let mut zone = Zone::root(&config).new_transient_zone("example.com.");
        zone.resolvers.insert("ns1.example.com.".to_string(), Resolver::new("example.com.", "ns1.example.com."));
        let mut with_ip = Resolver::new("example.com.", "ns2.example.com.");
        with_ip.ip = vec!["93.184.216.34".to_string()];
        zone.resolvers.insert("ns2.example.com.".to_string(), with_ip);
        assert_eq!(pick_resolver(&zone), Some("ns2.example.com.".to_string()));
    }

    #[test]
    fn pick_resolver_returns_none_for_an_empty_zone() {
        let config = TracerConfig::default();
        let zone = Zone::root(&config).new_transient_zone("example.com.");
        assert_eq!(pick_resolver(&zone), None);
    }
}

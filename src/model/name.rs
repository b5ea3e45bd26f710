use super::resolver::ResolverKey;
use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

pub const NXDOMAIN: &str = "NXDOMAIN";
pub const SERVFAIL: &str = "SERVFAIL";
pub const TIMEOUT: &str = "TIMEOUT";
pub const NODATA: &str = "NODATA";

pub fn is_error_sentinel(value: &str) -> bool {
    matches!(value, NXDOMAIN | SERVFAIL | TIMEOUT | NODATA)
}

/// A queried DNS name and everything every contacted resolver said about it.
///
/// `addresses` maps an observed response datum (a final address, a CNAME
/// target, an MX exchange, a literal payload, or one of the error
/// sentinels above) to the resolvers that returned exactly that datum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Name {
    pub name: String,
    pub addresses: IndexMap<String, IndexSet<ResolverKey>>,
}

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Name { name: name.into(), addresses: IndexMap::new() }
    }

    /// Finds or creates the entry for `datum` and appends `resolver`,
    /// skipping it if already present. This is the single registration
    /// primitive used for both real answers and error sentinels.
    pub fn record(&mut self, datum: impl Into<String>, resolver: ResolverKey) {
        self.addresses.entry(datum.into()).or_default().insert(resolver);
    }

    pub fn record_error(&mut self, error_kind: &str, resolver: ResolverKey) {
        debug_assert!(is_error_sentinel(error_kind));
        self.record(error_kind, resolver);
    }

    /// All resolvers that answered about this name in any capacity, used by
    /// the emitter's sibling-inconsistency detection.
    pub fn all_provenance(&self) -> IndexSet<ResolverKey> {
        let mut all = IndexSet::new();
        for resolvers in self.addresses.values() {
            all.extend(resolvers.iter().cloned());
        }
        all
    }
}

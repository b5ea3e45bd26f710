//! A deterministic, in-memory stand-in for [`crate::client::Client`] used by
//! both unit and end-to-end tests. Grounded on the teacher's
//! `fake_backend.rs`, generalized to the richer [`ClientOutcome`] variants
//! this tracer needs (delegation, NXDOMAIN, SERVFAIL, timeout).

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::{Name, RecordType};

use crate::client::{Client, ClientOutcome};
use crate::error::TracerError;

#[derive(PartialEq, Eq, Hash)]
struct QueryKey {
    target: IpAddr,
    name: Name,
    record_type: RecordType,
}

#[derive(Default)]
pub struct FakeClient {
    answers: HashMap<QueryKey, ClientOutcome>,
}

impl Debug for FakeClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeClient").field("answer_count", &self.answers.len()).finish()
    }
}

impl FakeClient {
    pub fn new() -> Self {
        FakeClient { answers: HashMap::new() }
    }

    /// Registers the outcome a given server IP must return for a given
    /// (name, qtype) query. `ip`/`name` are parsed; panics on malformed
    /// callers, which only ever occur in test code.
    pub fn add(&mut self, ip: &str, name: &str, record_type: RecordType, outcome: ClientOutcome) -> &mut Self {
        let key = QueryKey {
            target: ip.parse().expect("invalid test IP"),
            name: name.parse().expect("invalid test name"),
            record_type,
        };
        self.answers.insert(key, outcome);
        self
    }
}

#[async_trait]
impl Client for FakeClient {
    async fn query(
        &self,
        target: IpAddr,
        name: &Name,
        record_type: RecordType,
        _timeout: Duration,
    ) -> Result<ClientOutcome, TracerError> {
        let key = QueryKey { target, name: name.clone(), record_type };
        self.answers
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                TracerError::Unconfigured(format!(
                    "no fake answer configured for {name} {record_type} at {target}"
                ))
            })
    }
}

//! `dns_tracegraph` walks the DNS delegation hierarchy from the root down to
//! an authoritative answer, recording every nameserver consulted at every
//! zone cut, and renders the result as a DOT graph or a YAML/JSON snapshot.
//!
//! The three layers, leaves first: [`client`] sends one query to one
//! server IP; [`model`] holds the Zone/Resolver/Name graph that [`tracer`]
//! builds by walking delegations; [`emit`] and [`codec`] turn that graph
//! into DOT text or a serialized snapshot.

pub mod client;
pub mod codec;
pub mod config;
pub mod emit;
pub mod error;
pub mod fake_client;
#[macro_use]
pub mod macros;
pub mod model;
pub mod tracer;

pub use client::{Client, ClientOutcome, UdpClient};
pub use config::TracerConfig;
pub use error::TracerError;
pub use fake_client::FakeClient;
pub use model::Zone;
pub use tracer::Tracer;

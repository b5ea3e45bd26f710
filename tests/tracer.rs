//! End-to-end tracer scenarios, reproducing spec §8's seed tests against a
//! [`FakeClient`] substrate. Grounded on the teacher's
//! `test_resolve`/`test_cross_referencing_domains` integration tests.

use dns_tracegraph::client::ClientOutcome;
use dns_tracegraph::codec;
use dns_tracegraph::config::TracerConfig;
use dns_tracegraph::emit::{emit_dot, to_dot_string, EmitOptions};
use dns_tracegraph::fake_client::FakeClient;
use dns_tracegraph::model::{Resolver, Zone, ROOT_ZONE_NAME};
use dns_tracegraph::tracer::Tracer;
use dns_tracegraph::{a, mx, ns};
use hickory_proto::rr::RecordType;

fn root_with_bootstrap(config: &TracerConfig, root_ip: &str) -> Zone {
    let mut root = Zone::root(config);
    let mut resolver = Resolver::new(ROOT_ZONE_NAME, "a.root-servers.net.");
    resolver.ip = vec![root_ip.to_string()];
    root.resolvers.insert("a.root-servers.net.".to_string(), resolver);
    root
}

fn delegation(authority: Vec<hickory_proto::rr::Record>, additional: Vec<hickory_proto::rr::Record>) -> ClientOutcome {
    ClientOutcome::Answered { answer: Vec::new(), authority, additional }
}

fn answered(records: Vec<hickory_proto::rr::Record>) -> ClientOutcome {
    ClientOutcome::Answered { answer: records, authority: Vec::new(), additional: Vec::new() }
}

#[tokio::test]
async fn simple_delegation_chain_resolves_to_an_address() -> anyhow::Result<()> {
    let config = TracerConfig::default();
    let mut root = root_with_bootstrap(&config, "198.41.0.4");

    let mut client = FakeClient::new();
    client.add(
        "198.41.0.4",
        "example.com.",
        RecordType::A,
        delegation(vec![ns!("com.", "a.gtld-servers.net.")], vec![a!("a.gtld-servers.net.", "192.5.6.30")]),
    );
    client.add(
        "192.5.6.30",
        "example.com.",
        RecordType::A,
        delegation(vec![ns!("example.com.", "ns.example.com.")], vec![a!("ns.example.com.", "93.184.216.34")]),
    );
    client.add("93.184.216.34", "example.com.", RecordType::A, answered(vec![a!("example.com.", "93.184.216.34")]));

    let tracer = Tracer::new(&client, config);
    tracer.trace(&mut root, "example.com.", RecordType::A).await?;

    let name = root.names.get("example.com.").expect("name recorded");
    assert_eq!(name.addresses.len(), 1);
    let resolvers = name.addresses.get("93.184.216.34").expect("address recorded");
    assert_eq!(resolvers.iter().next().unwrap().1, "ns.example.com.");

    assert!(root.subzones.contains_key("com."));
    assert!(root.subzones.contains_key("example.com."));
    Ok(())
}

#[tokio::test]
async fn mx_indirection_creates_chained_names() -> anyhow::Result<()> {
    let config = TracerConfig::default();
    let mut root = root_with_bootstrap(&config, "198.41.0.4");

    let mut client = FakeClient::new();
    client.add(
        "198.41.0.4",
        "mail.example.com.",
        RecordType::MX,
        answered(vec![mx!("mail.example.com.", 10, "mx1.example.com.")]),
    );
    client.add("198.41.0.4", "mx1.example.com.", RecordType::A, answered(vec![a!("mx1.example.com.", "10.0.0.1")]));

    let tracer = Tracer::new(&client, config);
    tracer.trace(&mut root, "mail.example.com.", RecordType::MX).await?;

    let mail = root.names.get("mail.example.com.").expect("mail name recorded");
    assert!(mail.addresses.contains_key("mx1.example.com."));
    let exchange = root.names.get("mx1.example.com.").expect("exchange name recorded");
    assert!(exchange.addresses.contains_key("10.0.0.1"));
    Ok(())
}

#[tokio::test]
async fn nxdomain_response_registers_error_sentinel() -> anyhow::Result<()> {
    let config = TracerConfig::default();
    let mut root = root_with_bootstrap(&config, "198.41.0.4");

    let mut client = FakeClient::new();
    client.add(
        "198.41.0.4",
        "nxdomain.example.com.",
        RecordType::A,
        delegation(vec![ns!("example.com.", "ns.example.com.")], vec![a!("ns.example.com.", "93.184.216.34")]),
    );
    client.add("93.184.216.34", "nxdomain.example.com.", RecordType::A, ClientOutcome::Nxdomain);

    let tracer = Tracer::new(&client, config);
    tracer.trace(&mut root, "nxdomain.example.com.", RecordType::A).await?;

    let name = root.names.get("nxdomain.example.com.").expect("name recorded");
    assert_eq!(name.addresses.len(), 1);
    let resolvers = name.addresses.get("NXDOMAIN").expect("NXDOMAIN recorded");
    assert_eq!(resolvers.iter().next().unwrap().1, "ns.example.com.");
    Ok(())
}

#[tokio::test]
async fn split_answers_emit_red_sibling_edges() -> anyhow::Result<()> {
    let config = TracerConfig::default();
    let mut root = root_with_bootstrap(&config, "198.41.0.4");

    let mut client = FakeClient::new();
    client.add(
        "198.41.0.4",
        "split.example.com.",
        RecordType::A,
        delegation(
            vec![ns!("example.com.", "ns1.example.com."), ns!("example.com.", "ns2.example.com.")],
            vec![a!("ns1.example.com.", "1.1.1.1"), a!("ns2.example.com.", "2.2.2.2")],
        ),
    );
    client.add("1.1.1.1", "split.example.com.", RecordType::A, answered(vec![a!("split.example.com.", "1.2.3.4")]));
    client.add("2.2.2.2", "split.example.com.", RecordType::A, answered(vec![a!("split.example.com.", "5.6.7.8")]));

    let tracer = Tracer::new(&client, config);
    tracer.trace(&mut root, "split.example.com.", RecordType::A).await?;

    let dot = to_dot_string(&root, &EmitOptions::default());
    assert!(dot.contains("\"ns2.example.com.\" -> \"1.2.3.4\" [label=\"(split.example.com.)\",color=red];"));
    assert!(dot.contains("\"ns1.example.com.\" -> \"5.6.7.8\" [label=\"(split.example.com.)\",color=red];"));
    Ok(())
}

#[tokio::test]
async fn yaml_round_trip_preserves_dot_output() -> anyhow::Result<()> {
    let config = TracerConfig::default();
    let mut root = root_with_bootstrap(&config, "198.41.0.4");

    let mut client = FakeClient::new();
    client.add(
        "198.41.0.4",
        "example.com.",
        RecordType::A,
        delegation(vec![ns!("com.", "a.gtld-servers.net.")], vec![a!("a.gtld-servers.net.", "192.5.6.30")]),
    );
    client.add(
        "192.5.6.30",
        "example.com.",
        RecordType::A,
        delegation(vec![ns!("example.com.", "ns.example.com.")], vec![a!("ns.example.com.", "93.184.216.34")]),
    );
    client.add("93.184.216.34", "example.com.", RecordType::A, answered(vec![a!("example.com.", "93.184.216.34")]));

    let tracer = Tracer::new(&client, config);
    tracer.trace(&mut root, "example.com.", RecordType::A).await?;

    let options = EmitOptions::default();
    let original_dot = emit_dot(&root, &options);

    let yaml = codec::to_yaml_string(&root)?;
    let restored = codec::from_yaml_str(&yaml)?;
    let restored_dot = emit_dot(&restored, &options);

    assert_eq!(original_dot, restored_dot);
    Ok(())
}

/// Exercises the same consistency check `--nagios` performs, without
/// shelling out to the CLI binary: a clean delegation chain has no red
/// edges, a split-answer zone has at least one.
#[tokio::test]
async fn nagios_style_consistency_check() -> anyhow::Result<()> {
    let config = TracerConfig::default();
    let options = EmitOptions { skip_zones: Vec::new(), errors_only: true };

    let mut consistent_root = root_with_bootstrap(&config, "198.41.0.4");
    let mut consistent_client = FakeClient::new();
    consistent_client.add(
        "198.41.0.4",
        "example.com.",
        RecordType::A,
        delegation(vec![ns!("com.", "a.gtld-servers.net.")], vec![a!("a.gtld-servers.net.", "192.5.6.30")]),
    );
    consistent_client.add(
        "192.5.6.30",
        "example.com.",
        RecordType::A,
        delegation(vec![ns!("example.com.", "ns.example.com.")], vec![a!("ns.example.com.", "93.184.216.34")]),
    );
    consistent_client.add("93.184.216.34", "example.com.", RecordType::A, answered(vec![a!("example.com.", "93.184.216.34")]));
    Tracer::new(&consistent_client, config.clone()).trace(&mut consistent_root, "example.com.", RecordType::A).await?;
    let consistent_red = emit_dot(&consistent_root, &options).iter().filter(|l| l.contains("color=red")).count();
    assert_eq!(consistent_red, 0);

    let mut split_root = root_with_bootstrap(&config, "198.41.0.4");
    let mut split_client = FakeClient::new();
    split_client.add(
        "198.41.0.4",
        "split.example.com.",
        RecordType::A,
        delegation(
            vec![ns!("example.com.", "ns1.example.com."), ns!("example.com.", "ns2.example.com.")],
            vec![a!("ns1.example.com.", "1.1.1.1"), a!("ns2.example.com.", "2.2.2.2")],
        ),
    );
    split_client.add("1.1.1.1", "split.example.com.", RecordType::A, answered(vec![a!("split.example.com.", "1.2.3.4")]));
    split_client.add("2.2.2.2", "split.example.com.", RecordType::A, answered(vec![a!("split.example.com.", "5.6.7.8")]));
    Tracer::new(&split_client, config).trace(&mut split_root, "split.example.com.", RecordType::A).await?;
    let split_red = emit_dot(&split_root, &options).iter().filter(|l| l.contains("color=red")).count();
    assert!(split_red > 0);

    Ok(())
}

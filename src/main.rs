use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::{Command, ExitCode, Stdio};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use hickory_proto::rr::RecordType;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dns_tracegraph::client::UdpClient;
use dns_tracegraph::codec;
use dns_tracegraph::config::TracerConfig;
use dns_tracegraph::emit::{emit_dot, EmitOptions};
use dns_tracegraph::model::Zone;
use dns_tracegraph::tracer::Tracer;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum SerializeFormat {
    Yaml,
    Json,
}

/// Trace and graph the iterative DNS delegation path for a name.
#[derive(Parser, Debug)]
struct Cli {
    /// Name to trace. With `--type PTR` this may instead be an IP address,
    /// reverse-converted to its `in-addr.arpa`/`ip6.arpa` form.
    name: Option<String>,

    #[arg(short = 't', long = "type", default_value = "A")]
    record_type: RecordType,

    /// Write the traced graph to FILE instead of (or in addition to) graphing it.
    #[arg(long)]
    dump: Option<PathBuf>,
    /// Load a previously dumped graph instead of tracing.
    #[arg(long)]
    load: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = SerializeFormat::Yaml)]
    format: SerializeFormat,

    /// Render the graph with `dot -T FORMAT` (any Graphviz output format).
    #[arg(long)]
    graph: Option<String>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Pipe the rendered image into `display(1)`.
    #[arg(long)]
    display: bool,

    /// Zone whose edges are omitted from the graph. Repeatable.
    #[arg(long = "skip")]
    skip: Vec<String>,
    #[arg(long = "errors-only")]
    errors_only: bool,
    /// Emit only the error graph; exit 2 if it's non-empty, 0 otherwise.
    #[arg(long)]
    nagios: bool,

    #[arg(long = "trace-missing-glue")]
    trace_missing_glue: bool,
    #[arg(long = "even-trace-m-gtld-servers-net")]
    even_trace_m_gtld_servers_net: bool,

    #[arg(short = 'q', long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_tracing(cli.quiet)?;

    let root = if let Some(load_path) = &cli.load {
        load_zone(load_path, cli.format).context("loading serialized graph")?
    } else {
        let name = cli.name.as_deref().ok_or_else(|| anyhow::anyhow!("a name is required unless --load is given"))?;
        trace_name(name, cli.record_type, cli.trace_missing_glue, cli.even_trace_m_gtld_servers_net).await?
    };

    if let Some(dump_path) = &cli.dump {
        let serialized = match cli.format {
            SerializeFormat::Yaml => codec::to_yaml_string(&root)?,
            SerializeFormat::Json => codec::to_json_string(&root)?,
        };
        std::fs::write(dump_path, serialized).with_context(|| format!("writing {}", dump_path.display()))?;
    }

    if cli.nagios {
        return Ok(run_nagios(&root));
    }

    let options = EmitOptions { skip_zones: cli.skip.clone(), errors_only: cli.errors_only };
    let dot = emit_dot(&root, &options).join("\n");

    if let Some(format) = &cli.graph {
        rasterize(&dot, format, cli.output.as_deref(), cli.display)?;
    } else if cli.dump.is_none() {
        println!("{dot}");
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_tracing(quiet: bool) -> Result<()> {
    let level = if quiet { Level::WARN } else { Level::DEBUG };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn trace_name(
    name: &str,
    record_type: RecordType,
    trace_missing_glue: bool,
    even_trace_m_gtld_servers_net: bool,
) -> Result<Zone> {
    let target_name = if record_type == RecordType::PTR {
        match name.parse::<IpAddr>() {
            Ok(ip) => reverse_name(ip),
            Err(_) => name.to_string(),
        }
    } else {
        name.to_string()
    };

    let config =
        TracerConfig { trace_missing_glue, even_trace_m_gtld_servers_net, ..TracerConfig::default() }.detect_ipv6().await;

    let client = UdpClient::new();
    let tracer = Tracer::new(&client, config.clone());
    let mut root = Zone::root(&config);
    tracer.trace(&mut root, &target_name, record_type).await.context("tracing")?;
    Ok(root)
}

fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let nibbles: Vec<String> =
                v6.octets().iter().rev().flat_map(|byte| vec![format!("{:x}", byte & 0xf), format!("{:x}", byte >> 4)]).collect();
            format!("{}.ip6.arpa.", nibbles.join("."))
        }
    }
}

fn load_zone(path: &std::path::Path, format: SerializeFormat) -> Result<Zone> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(match format {
        SerializeFormat::Yaml => codec::from_yaml_str(&contents)?,
        SerializeFormat::Json => codec::from_json_str(&contents)?,
    })
}

fn run_nagios(root: &Zone) -> ExitCode {
    let options = EmitOptions { skip_zones: Vec::new(), errors_only: true };
    let lines = emit_dot(root, &options);
    let inconsistencies = lines.iter().filter(|line| line.contains("color=red")).count();
    if inconsistencies == 0 {
        println!("DNS trace graph consistent");
        ExitCode::SUCCESS
    } else {
        println!("{inconsistencies} DNS trace graph inconsistencies found");
        ExitCode::from(2)
    }
}

fn rasterize(dot: &str, format: &str, output: Option<&std::path::Path>, display: bool) -> Result<()> {
    let mut dot_cmd = Command::new("dot");
    dot_cmd.arg(format!("-T{format}")).stdin(Stdio::piped()).stdout(Stdio::piped());
    let mut dot_child = dot_cmd.spawn().context("spawning dot(1); is graphviz installed?")?;
    dot_child
        .stdin
        .take()
        .expect("stdin requested as piped")
        .write_all(dot.as_bytes())
        .context("writing DOT source to dot(1)")?;
    let rendered = dot_child.wait_with_output().context("waiting for dot(1)")?;
    if !rendered.status.success() {
        bail!("dot(1) exited with {}", rendered.status);
    }

    if display {
        let mut display_cmd = Command::new("display").stdin(Stdio::piped()).spawn().context("spawning display(1)")?;
        display_cmd.stdin.take().expect("stdin requested as piped").write_all(&rendered.stdout)?;
        display_cmd.wait().context("waiting for display(1)")?;
    }

    if let Some(output_path) = output {
        std::fs::write(output_path, &rendered.stdout).with_context(|| format!("writing {}", output_path.display()))?;
    } else if !display {
        std::io::stdout().write_all(&rendered.stdout)?;
    }

    Ok(())
}

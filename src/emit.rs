//! DOT graph emission. A direct, line-for-line port of `tracegraph.py`'s
//! `Zone.graph()`: a same-rank subgraph of terminal endpoints, followed by
//! per-`Name` edges and per-`Zone` upward edges, with sibling-inconsistency
//! gaps rendered as red, parenthesized edges.

use indexmap::IndexSet;

use crate::model::{is_error_sentinel, ResolverKey, Zone};

/// Filters applied while emitting, mirroring the CLI's `--skip`/`--errors-only`.
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub skip_zones: Vec<String>,
    pub errors_only: bool,
}

/// Renders `root` as a DOT digraph, returned as a line sequence so callers
/// (and tests comparing round-tripped graphs) can compare line-for-line.
pub fn emit_dot(root: &Zone, options: &EmitOptions) -> Vec<String> {
    let mut lines = vec!["digraph dns {".to_string(), "    rankdir=LR;".to_string()];

    emit_endpoint_subgraph(root, options, &mut lines);
    emit_name_edges(root, options, &mut lines);
    emit_zone_edges(root, options, &mut lines);

    lines.push("}".to_string());
    lines
}

pub fn to_dot_string(root: &Zone, options: &EmitOptions) -> String {
    emit_dot(root, options).join("\n")
}

fn emit_endpoint_subgraph(root: &Zone, options: &EmitOptions, lines: &mut Vec<String>) {
    let mut seen = IndexSet::new();
    let mut body = Vec::new();
    for name in root.names.values() {
        for addr in name.addresses.keys() {
            if !seen.insert(addr.clone()) {
                continue;
            }
            if is_error_sentinel(addr) {
                body.push(format!("        \"{}\" [shape=box,color=red];", escape(addr)));
            } else if !options.errors_only {
                body.push(format!("        \"{}\" [shape=doubleoctagon];", escape(addr)));
            }
        }
    }
    if !body.is_empty() {
        lines.push("    { rank=same;".to_string());
        lines.extend(body);
        lines.push("    }".to_string());
    }
}

fn emit_name_edges(root: &Zone, options: &EmitOptions, lines: &mut Vec<String>) {
    for name in root.names.values() {
        let provenance_union = name.all_provenance();
        for (addr, resolvers) in &name.addresses {
            let is_error = is_error_sentinel(addr);
            if !options.errors_only || is_error {
                for resolver_key in resolvers {
                    lines.push(edge_line(&resolver_key.1, addr, &name.name, is_error));
                }
            }
            if is_error {
                continue;
            }
            for missing in provenance_union.difference(resolvers) {
                lines.push(red_missing_edge_line(&missing.1, addr, &name.name));
            }
        }
    }
}

fn emit_zone_edges(root: &Zone, options: &EmitOptions, lines: &mut Vec<String>) {
    for zone in root.all_zones() {
        if options.skip_zones.iter().any(|skipped| skipped == &zone.name) {
            continue;
        }
        let union = upward_union(zone);
        for resolver in zone.resolvers.values() {
            if !options.errors_only {
                for up_key in &resolver.up {
                    lines.push(edge_line(&up_key.1, &resolver.name, &zone.name, false));
                }
            }
            for missing in union.difference(&resolver.up) {
                lines.push(red_missing_edge_line(&missing.1, &resolver.name, &zone.name));
            }
        }
    }
}

fn upward_union(zone: &Zone) -> IndexSet<ResolverKey> {
    let mut union = IndexSet::new();
    for resolver in zone.resolvers.values() {
        union.extend(resolver.up.iter().cloned());
    }
    union
}

fn edge_line(from: &str, to: &str, label: &str, is_error: bool) -> String {
    let color = if is_error { ",color=red" } else { "" };
    format!("    \"{}\" -> \"{}\" [label=\"{}\"{}];", escape(from), escape(to), escape(label), color)
}

fn red_missing_edge_line(from: &str, to: &str, label: &str) -> String {
    format!("    \"{}\" -> \"{}\" [label=\"({})\",color=red];", escape(from), escape(to), escape(label))
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Name, Resolver as ModelResolver};

    #[test]
    fn escapes_backslash_and_quote() {
        assert_eq!(escape(r#"a\b"c"#), r#"a\\b\"c"#);
    }

    #[test]
    fn sibling_inconsistency_emits_red_cross_edges() {
        let mut root = Zone::root(&crate::config::TracerConfig::default());
        root.resolvers.insert("ns1.example.com.".to_string(), ModelResolver::new(".", "ns1.example.com."));
        root.resolvers.insert("ns2.example.com.".to_string(), ModelResolver::new(".", "ns2.example.com."));
        let mut name = Name::new("split.example.com.");
        name.record("1.2.3.4", (".".to_string(), "ns1.example.com.".to_string()));
        name.record("5.6.7.8", (".".to_string(), "ns2.example.com.".to_string()));
        root.names.insert("split.example.com.".to_string(), name);

        let dot = to_dot_string(&root, &EmitOptions::default());
        assert!(dot.contains("\"ns2.example.com.\" -> \"1.2.3.4\" [label=\"(split.example.com.)\",color=red];"));
        assert!(dot.contains("\"ns1.example.com.\" -> \"5.6.7.8\" [label=\"(split.example.com.)\",color=red];"));
    }
}

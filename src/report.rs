//! Output formatting for factgraph results.
//!
//! - JSON: the fact graph itself, byte-identical across runs over the same tree
//! - Pretty: colored terminal summary for humans

use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::*;

use crate::aggregate::FactGraph;
use crate::runner::{RunStats, ScanOutcome};

// =============================================================================
// JSON Format
// =============================================================================

/// The graph as pretty-printed JSON with a trailing newline.
pub fn render_json(graph: &FactGraph) -> anyhow::Result<String> {
    let mut json = serde_json::to_string_pretty(graph)?;
    json.push('\n');
    Ok(json)
}

/// Write the graph to `output`, or stdout when no path is given.
pub fn write_json(graph: &FactGraph, output: Option<&Path>) -> anyhow::Result<()> {
    let json = render_json(graph)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        }
        None => print!("{}", json),
    }
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write a human-readable summary of a run.
pub fn write_pretty(path: &str, outcome: &ScanOutcome) {
    let graph = &outcome.graph;

    // Header
    println!();
    print!("  ");
    print!("{}", "factgraph".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning:   ".dimmed());
    println!("{}", path);
    if !outcome.manifest.frameworks.is_empty() {
        let names: Vec<&str> = outcome.manifest.frameworks.iter().map(|f| f.as_str()).collect();
        print!("  {}", "Frameworks: ".dimmed());
        println!("{}", names.join(", "));
    }
    println!();

    write_summary(&outcome.stats);
    println!();

    write_list("Business services", &graph.services.business_services);
    write_list("Utility services", &graph.services.utility_services);
    write_routes(graph);
    write_models(graph);

    if !graph.service_dependencies.is_empty() {
        println!("  {}", "Dependencies".bold());
        for (source, targets) in &graph.service_dependencies {
            println!("    {} {} {}", source, "→".dimmed(), targets.join(", "));
        }
        println!();
    }

    if !graph.business_flows.is_empty() {
        println!("  {}", "Flows".bold());
        for (service, methods) in &graph.business_flows {
            for (method, steps) in methods {
                println!("    {}.{}", service, method);
                for step in steps {
                    println!("      {} {}", "→".dimmed(), step);
                }
            }
        }
        println!();
    }

    if !outcome.stats.failures.is_empty() {
        println!("  {}", "Skipped files".yellow().bold());
        for failure in &outcome.stats.failures {
            println!("    {}  {}", failure.path, failure.reason.dimmed());
        }
        println!();
    }
}

fn write_summary(stats: &RunStats) {
    if stats.failures.is_empty() {
        print!("  {}", "✓".green());
    } else {
        print!("  {}", "!".yellow());
    }
    print!("  {} of {} files scanned", stats.scanned, stats.discovered);
    if !stats.failures.is_empty() {
        print!("  {}", format!("({} skipped)", stats.failures.len()).yellow());
    }
    if stats.conflicts > 0 {
        print!(
            "  {}",
            format!("({} conflicting associations)", stats.conflicts).dimmed()
        );
    }
    println!();
}

fn write_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("  {} {}", title.bold(), format!("({})", items.len()).dimmed());
    for item in items {
        println!("    {}", item);
    }
    println!();
}

fn write_routes(graph: &FactGraph) {
    let routes = &graph.api_routes;
    let total = routes.public_routes.len() + routes.internal_routes.len();
    if total == 0 {
        return;
    }
    println!("  {} {}", "Routes".bold(), format!("({})", total).dimmed());
    let rows = routes
        .public_routes
        .iter()
        .map(|r| (r, false))
        .chain(routes.internal_routes.iter().map(|r| (r, true)));
    for (route, internal) in rows {
        let auth = graph
            .auth_policies
            .get(route)
            .map(|p| format!("  [{}]", p))
            .unwrap_or_default();
        if internal {
            println!("    {}{}  {}", route, auth.cyan(), "internal".yellow());
        } else {
            println!("    {}{}", route, auth.cyan());
        }
    }
    println!();
}

fn write_models(graph: &FactGraph) {
    if graph.db_models.is_empty() {
        return;
    }
    println!(
        "  {} {}",
        "Models".bold(),
        format!("({})", graph.db_models.len()).dimmed()
    );
    for model in &graph.db_models {
        let fields = graph
            .schema_snapshots
            .get(model)
            .map(|f| f.len())
            .unwrap_or_default();
        println!("    {} {}", model, format!("{} fields", fields).dimmed());
    }
    println!();
}

//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use std::path::Path;

use super::commands::{git_commit, PipelinePlan};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No bundles found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    push_row(&mut output, headers.iter().map(|h| h.to_uppercase()), &widths);
    for row in rows {
        push_row(&mut output, row.into_iter(), &widths);
    }
    output
}

fn push_row(output: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            line.push_str("   ");
        }
        match widths.get(i) {
            Some(&width) => line.push_str(&format!("{:width$}", cell, width = width)),
            None => line.push_str(&cell),
        }
    }
    output.push_str(line.trim_end());
    output.push('\n');
}

fn join_or_dash<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

// ============================================================================
// Pipeline display
// ============================================================================

/// Format a planned pipeline: one row per bundle in startup order, then the
/// order requests travel through the manager.
pub fn format_plan(plan: &PipelinePlan) -> String {
    let mut output = format!("Pipeline: {}\n\n", plan.name);

    let headers = &["#", "BUNDLE", "INPUTS", "OUTPUTS", "FEEDS"];
    let rows: Vec<Vec<String>> = plan
        .order
        .startup()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let bundle = plan.bundles.iter().find(|b| &b.name == name);
            vec![
                (i + 1).to_string(),
                name.clone(),
                join_or_dash(bundle.into_iter().flat_map(|b| b.input_names())),
                join_or_dash(bundle.into_iter().flat_map(|b| b.output_names())),
                join_or_dash(plan.graph.children_of(name).into_iter()),
            ]
        })
        .collect();
    output.push_str(&format_table(headers, rows));

    if !plan.order.is_empty() {
        output.push_str(&format!(
            "\nStartup:    {}\n",
            plan.order.startup().join(" -> ")
        ));
        output.push_str(&format!(
            "Forwarding: {}\n",
            plan.order.forwarding().join(" -> ")
        ));
    }

    output
}

/// Format the result of `plumb create`
pub fn format_created(pipeline: &str, dir: &Path) -> String {
    format!("Created pipeline '{}' at {}\n", pipeline, dir.display())
}

/// Format the result of `plumb add`
pub fn format_added(pipeline: &str, bundles: &[String]) -> String {
    let mut output = format!("Added {} bundle(s) to '{}':\n", bundles.len(), pipeline);
    for name in bundles {
        output.push_str(&format!("  + {}\n", name));
    }
    output
}

pub fn format_version() -> String {
    format_version_info(
        env!("CARGO_PKG_VERSION"),
        git_commit(),
        option_env!("PLUMB_GIT_DIRTY").is_some_and(|d| !d.is_empty()),
    )
}

/// Version and source commit; a dirty tree is flagged with `+CHANGES`
pub fn format_version_info(version: &str, commit: &str, dirty: bool) -> String {
    let mut output = format!("plumb version: {}\ngit commit: {}", version, commit);
    if dirty {
        output.push_str("+CHANGES");
    }
    output
}

//! Check command implementation.

use anyhow::Context;
use fanout_core::DependencyGraph;
use std::path::Path;

use super::load_batch;

/// Execute check command.
pub fn execute(file: &Path) -> anyhow::Result<()> {
    let spec = load_batch(file)?;
    let graph = DependencyGraph::build(&spec.requests)
        .with_context(|| format!("Invalid batch file: {}", file.display()))?;

    let mode = match spec.parallel {
        Some(false) => "sequential",
        Some(true) => "parallel",
        None => "parallel by default",
    };
    println!("Batch is valid: {} requests ({})", spec.len(), mode);

    for (index, request) in spec.requests.iter().enumerate() {
        let dependencies = graph.dependencies(index);
        let relation = if dependencies.is_empty() {
            "independent".to_string()
        } else {
            let list: Vec<String> = dependencies.iter().map(ToString::to_string).collect();
            format!("depends on {}", list.join(", "))
        };
        println!(
            "  [{}] {} {} ({})",
            index,
            request.method.to_uppercase(),
            request.path,
            relation
        );
    }

    Ok(())
}

//! Dependency analysis between the sub-requests of one batch.
//!
//! Edges are built once per batch; the scheduler drives dispatch from the
//! graph rather than re-parsing references.

use fanout_abstraction::SubRequest;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::{BatchError, Result};
use crate::reference::{self, split_path};

/// Collects the distinct result indices `request` refers to.
pub fn analyze(request: &SubRequest) -> BTreeSet<usize> {
    let mut dependencies: BTreeSet<usize> = split_path(&request.path)
        .into_iter()
        .filter_map(|segment| reference::parse(segment).source_index)
        .collect();

    if let Some(payload) = &request.payload {
        collect_payload(payload, &mut dependencies);
    }

    dependencies
}

fn collect_payload(value: &Value, dependencies: &mut BTreeSet<usize>) {
    match value {
        Value::String(text) => {
            if let Some(index) = reference::parse(text).source_index {
                dependencies.insert(index);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_payload(item, dependencies);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_payload(item, dependencies);
            }
        }
        _ => {}
    }
}

/// Per-batch dependency graph, adjacency by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// `dependencies[i]`: indices request `i` reads from.
    dependencies: Vec<BTreeSet<usize>>,
    /// `dependents[j]`: indices that read from request `j`, ascending.
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph for `requests`.
    ///
    /// # Errors
    /// Returns `BatchError::Dependency` if any request refers to itself or to
    /// a later position.
    pub fn build(requests: &[SubRequest]) -> Result<Self> {
        let mut dependencies = Vec::with_capacity(requests.len());
        let mut dependents = vec![Vec::new(); requests.len()];

        for (index, request) in requests.iter().enumerate() {
            let deps = analyze(request);
            if let Some(&source_index) = deps.iter().find(|&&source| source >= index) {
                return Err(BatchError::Dependency { index, source_index });
            }
            for &source in &deps {
                dependents[source].push(index);
            }
            dependencies.push(deps);
        }

        Ok(Self { dependencies, dependents })
    }

    /// Number of requests in the graph.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns `true` for an empty graph.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Indices request `index` depends on.
    pub fn dependencies(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependencies[index]
    }

    /// Indices that depend on request `index`.
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Returns `true` when request `index` has no dependencies.
    pub fn is_independent(&self, index: usize) -> bool {
        self.dependencies[index].is_empty()
    }

    /// Indices of independent requests, ascending.
    pub fn independent(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&index| self.is_independent(index))
    }

    /// Number of unresolved dependencies per request, used to seed scheduling.
    pub fn in_degrees(&self) -> Vec<usize> {
        self.dependencies.iter().map(BTreeSet::len).collect()
    }
}

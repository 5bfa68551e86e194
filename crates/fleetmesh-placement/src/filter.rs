//! Candidate filtering and priority selection.
//!
//! Filters compose in a fixed order (runners, labels, resources,
//! devices) over indices into the engine's node list; each returns the
//! surviving subset or a typed [`PlacementError::NoNode`]. Keeping the
//! original indices preserves registration order for the priority
//! tie-break.

use crate::error::{FilterStage, PlacementError, PlacementResult};
use crate::node::NodeHandler;

/// Runners assumed when a service does not request any.
pub const DEFAULT_RUNNERS: &[&str] = &["crun", "runc"];

/// Keep nodes offering at least one of the requested runners.
///
/// An empty request means the default runner set; a node with no
/// declared runners offers exactly the defaults.
pub(crate) fn by_runners(
    nodes: &[NodeHandler],
    candidates: Vec<usize>,
    requested: &[String],
) -> PlacementResult<Vec<usize>> {
    let effective: Vec<String> = if requested.is_empty() {
        DEFAULT_RUNNERS.iter().map(|r| r.to_string()).collect()
    } else {
        requested.to_vec()
    };

    let survivors: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| {
            let node_runners = nodes[i].runners();
            if node_runners.is_empty() {
                effective.iter().any(|r| DEFAULT_RUNNERS.contains(&r.as_str()))
            } else {
                effective.iter().any(|r| node_runners.contains(r))
            }
        })
        .collect();

    if survivors.is_empty() {
        return Err(PlacementError::NoNode {
            stage: FilterStage::Runners,
            missing: effective,
        });
    }
    Ok(survivors)
}

/// Keep nodes carrying every requested label.
pub(crate) fn by_labels(
    nodes: &[NodeHandler],
    candidates: Vec<usize>,
    requested: &[String],
) -> PlacementResult<Vec<usize>> {
    by_required(nodes, candidates, requested, NodeHandler::labels, FilterStage::Labels)
}

/// Keep nodes providing every requested resource.
pub(crate) fn by_resources(
    nodes: &[NodeHandler],
    candidates: Vec<usize>,
    requested: &[String],
) -> PlacementResult<Vec<usize>> {
    by_required(nodes, candidates, requested, NodeHandler::resources, FilterStage::Resources)
}

/// All-of matching shared by the labels and resources stages. Nodes
/// with an empty capability list never match a non-empty request.
fn by_required(
    nodes: &[NodeHandler],
    candidates: Vec<usize>,
    requested: &[String],
    available: fn(&NodeHandler) -> &[String],
    stage: FilterStage,
) -> PlacementResult<Vec<usize>> {
    if requested.is_empty() {
        return Ok(candidates);
    }

    let survivors: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| {
            let offered = available(&nodes[i]);
            !offered.is_empty() && requested.iter().all(|r| offered.contains(r))
        })
        .collect();

    if survivors.is_empty() {
        return Err(PlacementError::NoNode {
            stage,
            missing: requested.to_vec(),
        });
    }
    Ok(survivors)
}

/// Keep nodes with a free share of every requested device.
pub(crate) fn by_devices(
    nodes: &[NodeHandler],
    candidates: Vec<usize>,
    requested: &[String],
) -> PlacementResult<Vec<usize>> {
    if requested.is_empty() {
        return Ok(candidates);
    }

    let survivors: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| requested.iter().all(|device| nodes[i].has_free_device(device)))
        .collect();

    if survivors.is_empty() {
        return Err(PlacementError::NoNode {
            stage: FilterStage::Devices,
            missing: requested.to_vec(),
        });
    }
    Ok(survivors)
}

/// Pick the highest-priority survivor; ties keep the earliest
/// registered node.
pub(crate) fn most_priority(nodes: &[NodeHandler], candidates: &[usize]) -> usize {
    if candidates.len() == 1 {
        return candidates[0];
    }
    let mut best = candidates[0];
    for &i in &candidates[1..] {
        if nodes[i].priority() > nodes[best].priority() {
            best = i;
        }
    }
    best
}

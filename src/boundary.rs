use std::collections::BTreeSet;

use tracing::debug;

use crate::{
    datatypes::{BoundaryRule, BoundaryTarget, GlobalSystem, Mesh},
    error::LodestoneError,
    region::unmatched_tag,
};

/// Replaces row `node` of the system with the equation `potential[node] = value`.
pub fn fix_node(system: &mut GlobalSystem, node: usize, value: f64) {
    system.load[node] = value;
    system.stiffness.row_mut(node).fill(0.0);
    system.stiffness[(node, node)] = 1.0;
}

/// Resolves the nodes a rule applies to.
fn rule_nodes(
    rule: &BoundaryRule,
    mesh: &Mesh,
    strict: bool,
) -> Result<BTreeSet<usize>, LodestoneError> {
    match rule.target {
        BoundaryTarget::Tag(tag) => {
            let nodes = mesh.nodes_on_boundary_tag(tag);
            if nodes.is_empty() {
                unmatched_tag("boundary", tag, strict)?;
            }
            Ok(nodes)
        }
        BoundaryTarget::Node(node) if node < mesh.node_count() => Ok(BTreeSet::from([node])),
        BoundaryTarget::Node(node) => Err(LodestoneError::Index {
            element: None,
            node,
            node_count: mesh.node_count(),
        }),
    }
}

/// Enforces fixed-value boundary conditions on an assembled system
///
/// Rules are applied in the given order. A node reached by several rules
/// keeps the value of the last one; no attempt is made to reconcile
/// conflicting values.
///
/// # Arguments
/// * `system` - The assembled global system, modified in place
/// * `mesh` - The mesh the system was assembled from
/// * `rules` - The boundary rules, in application order
/// * `strict` - Fail on tags that match no line element
///
/// # Returns
/// The set of nodes whose values are now fixed
pub fn apply_boundary_conditions(
    system: &mut GlobalSystem,
    mesh: &Mesh,
    rules: &[BoundaryRule],
    strict: bool,
) -> Result<BTreeSet<usize>, LodestoneError> {
    if system.size() != mesh.node_count() {
        return Err(LodestoneError::Input(format!(
            "System of size {} does not match mesh with {} nodes",
            system.size(),
            mesh.node_count()
        )));
    }

    let mut fixed = BTreeSet::new();
    for rule in rules {
        let nodes = rule_nodes(rule, mesh, strict)?;
        debug!(
            "fixing {} nodes to {} for {:?}",
            nodes.len(),
            rule.value,
            rule.target
        );

        for node in nodes {
            fix_node(system, node, rule.value);
            fixed.insert(node);
        }
    }

    Ok(fixed)
}

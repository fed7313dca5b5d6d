use crate::graph::Graph;
use crate::node::NodeId;

/// Removes nodes whose outputs are not read by anything, until no such node remains.
/// Variables and saves are kept. Returns number of removed nodes.
pub fn dead_code_elimination(graph: &mut Graph) -> usize {
    dead_code_elimination_with(graph, false)
}

pub(crate) fn dead_code_elimination_with(graph: &mut Graph, debug_dce: bool) -> usize {
    let mut removed = 0;
    let mut params: Vec<NodeId> = graph.ids().collect();
    while let Some(id) = params.pop() {
        let Some(node) = graph.get(id) else {
            continue;
        };
        if node.is_root() || graph.has_uses(id) {
            continue;
        }
        let operands: Vec<NodeId> = node.operands().map(|x| x.node).collect();
        if debug_dce {
            log::debug!(
                "Removing dead node {id} ({}) {}",
                graph.name(id).unwrap_or_default(),
                node.kind()
            );
        }
        // Node exists and has no uses, removal can not fail
        if graph.remove(id).is_ok() {
            removed += 1;
            // Operands may have lost their last use
            params.extend(operands);
        }
    }
    removed
}

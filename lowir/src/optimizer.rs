use crate::config::LowerConfig;
use crate::dce::dead_code_elimination_with;
use crate::error::LowerError;
use crate::graph::Graph;
use crate::lower::{LowerStats, Lowering};
use crate::node::CompilationMode;

/// Runs lowering, then dead code elimination and verification if enabled in config.
///
/// After this, graph contains no gradient nodes that have lowering rule.
pub fn optimize(
    graph: &mut Graph,
    mode: CompilationMode,
    config: &LowerConfig,
) -> Result<LowerStats, LowerError> {
    if config.debug_graph() {
        log::debug!("Graph before lowering:\n{}", graph.plot_dot_graph());
    }
    let stats = Lowering::new(config.clone()).run(graph, mode)?;
    if config.dce {
        let removed = dead_code_elimination_with(graph, config.debug_dce());
        if config.debug_dce() {
            log::debug!("Dead code elimination removed {removed} nodes");
        }
    }
    if config.debug_graph() {
        log::debug!("Graph after lowering:\n{}", graph.plot_dot_graph());
    }
    if config.verify {
        graph.verify()?;
    }
    Ok(stats)
}

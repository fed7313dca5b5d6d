//! Lowering of gradient nodes into primitive arithmetic.

use crate::config::{LowerConfig, UnsupportedPolicy};
use crate::error::LowerError;
use crate::graph::Graph;
use crate::node::{ArithmeticMode, CompilationMode, Node, NodeId, NodeValue};

/// What a lowering pass did to the graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LowerStats {
    /// Gradient nodes whose uses were redirected to primitive operators
    pub lowered: usize,
    /// Gradient nodes skipped because nothing reads their outputs
    pub dead: usize,
    /// Gradient nodes left in the graph because their mode has no rule
    pub unsupported: Vec<NodeId>,
    /// Number of nodes added to the graph
    pub created: usize,
}

/// Pass replacing uses of [`Node::ArithmeticGrad`] outputs with primitive arithmetic.
///
/// Chain rules:
/// - Add: `lhs' = out'`, `rhs' = out'`
/// - Mul: `lhs' = rhs * out'`, `rhs' = lhs * out'`
/// - Sub: `lhs' = out'`, `rhs' = 0 - out'`
///
/// Gradient nodes themselves are not removed, they are left without uses,
/// see [`dead_code_elimination`](crate::dead_code_elimination).
#[derive(Debug, Clone, Default)]
pub struct Lowering {
    config: LowerConfig,
}

impl Lowering {
    #[must_use]
    pub const fn new(config: LowerConfig) -> Lowering {
        Lowering { config }
    }

    /// Visits every node present before the pass started exactly once, users before
    /// the nodes they read. Nodes created by the pass are never visited.
    pub fn run(&self, graph: &mut Graph, mode: CompilationMode) -> Result<LowerStats, LowerError> {
        let debug_lower = self.config.debug_lower();
        if debug_lower {
            log::debug!("Lowering graph with {} nodes in {mode:?} mode", graph.len());
        }
        let mut stats = LowerStats::default();
        let before = graph.len();
        // Uses can be redirected to outputs of gradient nodes that read them,
        // so those must be lowered later
        let order = graph.topological_order();
        for id in order.into_iter().rev() {
            let Node::ArithmeticGrad { lhs, rhs, result_grad, mode: amode, .. } = graph[id] else {
                continue;
            };
            let grad_lhs = NodeValue::grad_of_lhs(id);
            let grad_rhs = NodeValue::grad_of_rhs(id);
            // Already lowered or never used, rewiring would only add dead nodes
            if graph.num_uses(grad_lhs) == 0 && graph.num_uses(grad_rhs) == 0 {
                stats.dead += 1;
                continue;
            }
            match amode {
                ArithmeticMode::Add => {
                    graph.replace_all_uses_of_with(grad_lhs, result_grad)?;
                    graph.replace_all_uses_of_with(grad_rhs, result_grad)?;
                }
                ArithmeticMode::Mul => {
                    let mul = ArithmeticMode::Mul;
                    let lhs_grad = graph.create_arithmetic("mul.grad.lhs", rhs, result_grad, mul)?;
                    let rhs_grad = graph.create_arithmetic("mul.grad.rhs", lhs, result_grad, mul)?;
                    graph.replace_all_uses_of_with(grad_lhs, lhs_grad)?;
                    graph.replace_all_uses_of_with(grad_rhs, rhs_grad)?;
                }
                ArithmeticMode::Sub => {
                    graph.replace_all_uses_of_with(grad_lhs, result_grad)?;
                    let Some(ty) = graph.ty(result_grad).cloned() else {
                        return Err(LowerError::invalid_node(format!(
                            "gradient node {id} reads missing {result_grad}"
                        )));
                    };
                    let zero = graph.create_zero("zero", ty);
                    let neg =
                        graph.create_arithmetic("sub", zero, result_grad, ArithmeticMode::Sub)?;
                    graph.replace_all_uses_of_with(grad_rhs, neg)?;
                }
                ArithmeticMode::Div | ArithmeticMode::Max | ArithmeticMode::Min => {
                    match self.config.unsupported {
                        UnsupportedPolicy::Error => {
                            return Err(LowerError::UnsupportedMode { node: id, mode: amode })
                        }
                        UnsupportedPolicy::Warn => log::warn!(
                            "Gradient node {id} ({}) of {amode} has no lowering rule, \
                            leaving it in the graph",
                            graph.name(id).unwrap_or_default()
                        ),
                        UnsupportedPolicy::Ignore => {}
                    }
                    stats.unsupported.push(id);
                    continue;
                }
            }
            if debug_lower {
                log::debug!(
                    "Lowered {amode} gradient {id} ({})",
                    graph.name(id).unwrap_or_default()
                );
            }
            stats.lowered += 1;
        }
        stats.created = graph.len() - before;
        if debug_lower {
            log::debug!("Lowering done, {stats:?}");
        }
        Ok(stats)
    }
}

/// Lowers all gradient nodes in graph with default [`LowerConfig`].
///
/// Compilation mode is currently not consulted by any rule.
pub fn lower(graph: &mut Graph, mode: CompilationMode) -> Result<LowerStats, LowerError> {
    Lowering::default().run(graph, mode)
}

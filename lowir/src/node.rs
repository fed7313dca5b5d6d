//! Nodes of the operator graph.

use crate::dtype::{Constant, TensorType};
use core::fmt::Display;

/// Id of node in [`Graph`](crate::Graph). Ids of removed nodes can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        NodeId(u32::try_from(value).unwrap())
    }
}

impl From<NodeId> for usize {
    fn from(value: NodeId) -> Self {
        value.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

/// Reference to one output of one node. This is the endpoint of every edge in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeValue {
    pub node: NodeId,
    pub output: u8,
}

impl NodeValue {
    #[must_use]
    pub const fn new(node: NodeId, output: u8) -> NodeValue {
        NodeValue { node, output }
    }

    /// Output slot of gradient node holding the gradient of its LHS operand
    #[must_use]
    pub const fn grad_of_lhs(node: NodeId) -> NodeValue {
        NodeValue { node, output: GRAD_OF_LHS }
    }

    #[must_use]
    pub const fn grad_of_rhs(node: NodeId) -> NodeValue {
        NodeValue { node, output: GRAD_OF_RHS }
    }
}

impl Display for NodeValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}:{}", self.node, self.output))
    }
}

/// Edge into a node, the user and which of its operands reads the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Use {
    pub user: NodeId,
    pub operand: u8,
}

/// Elementwise binary arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArithmeticMode {
    Add,
    Mul,
    Sub,
    Div,
    Max,
    Min,
}

impl Display for ArithmeticMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ArithmeticMode::Add => "Add",
            ArithmeticMode::Mul => "Mul",
            ArithmeticMode::Sub => "Sub",
            ArithmeticMode::Div => "Div",
            ArithmeticMode::Max => "Max",
            ArithmeticMode::Min => "Min",
        })
    }
}

/// Are we compiling for training or for inference?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilationMode {
    Train,
    #[default]
    Infer,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Node {
    /// Graph input or weight
    Variable { ty: TensorType },
    /// Tensor with all elements set to value
    Splat { value: Constant, ty: TensorType },
    Arithmetic { lhs: NodeValue, rhs: NodeValue, mode: ArithmeticMode },
    /// Backward pass of [`Node::Arithmetic`]. Reads operands of the forward op,
    /// its result and gradient of that result. Outputs gradients of lhs and rhs.
    ArithmeticGrad {
        lhs: NodeValue,
        rhs: NodeValue,
        result: NodeValue,
        result_grad: NodeValue,
        mode: ArithmeticMode,
    },
    /// Stores input out of the graph. Has no outputs.
    Save { input: NodeValue },
}

/// Output index of gradient with respect to lhs in [`Node::ArithmeticGrad`]
pub const GRAD_OF_LHS: u8 = 0;
/// Output index of gradient with respect to rhs in [`Node::ArithmeticGrad`]
pub const GRAD_OF_RHS: u8 = 1;

/// Iterator over operands of node which does not allocate on heap.
pub struct NodeOperandsIterator {
    operands: [NodeValue; 4],
    len: u8,
    idx: u8,
}

impl Iterator for NodeOperandsIterator {
    type Item = NodeValue;
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx == self.len {
            return None;
        }
        let idx = self.idx;
        self.idx += 1;
        Some(self.operands[idx as usize])
    }
}

const DANGLING: NodeValue = NodeValue { node: NodeId(0), output: 0 };

impl Node {
    /// Get all operands of self. This method does not allocate.
    #[must_use]
    pub const fn operands(&self) -> NodeOperandsIterator {
        let (operands, len) = match *self {
            Node::Variable { .. } | Node::Splat { .. } => ([DANGLING; 4], 0),
            Node::Save { input } => ([input, DANGLING, DANGLING, DANGLING], 1),
            Node::Arithmetic { lhs, rhs, .. } => ([lhs, rhs, DANGLING, DANGLING], 2),
            Node::ArithmeticGrad { lhs, rhs, result, result_grad, .. } => {
                ([lhs, rhs, result, result_grad], 4)
            }
        };
        NodeOperandsIterator { operands, len, idx: 0 }
    }

    pub(crate) fn operand_mut(&mut self, idx: u8) -> Option<&mut NodeValue> {
        match (self, idx) {
            (Node::Save { input }, 0) => Some(input),
            (Node::Arithmetic { lhs, .. } | Node::ArithmeticGrad { lhs, .. }, 0) => Some(lhs),
            (Node::Arithmetic { rhs, .. } | Node::ArithmeticGrad { rhs, .. }, 1) => Some(rhs),
            (Node::ArithmeticGrad { result, .. }, 2) => Some(result),
            (Node::ArithmeticGrad { result_grad, .. }, 3) => Some(result_grad),
            _ => None,
        }
    }

    /// Names of operands, in the order returned by [`Node::operands`]
    #[must_use]
    pub const fn input_names(&self) -> &'static [&'static str] {
        match self {
            Node::Variable { .. } | Node::Splat { .. } => &[],
            Node::Save { .. } => &["Input"],
            Node::Arithmetic { .. } => &["LHS", "RHS"],
            Node::ArithmeticGrad { .. } => &[
                "LHS",
                "RHS",
                "OriginalOutputForResult",
                "GradOfOriginalOutputNamedResult",
            ],
        }
    }

    /// Names of outputs, indexed by [`NodeValue::output`]
    #[must_use]
    pub const fn output_names(&self) -> &'static [&'static str] {
        match self {
            Node::Variable { .. } => &["Output"],
            Node::Splat { .. } | Node::Arithmetic { .. } => &["Result"],
            Node::ArithmeticGrad { .. } => &["GradOfInputNamedLHS", "GradOfInputNamedRHS"],
            Node::Save { .. } => &[],
        }
    }

    #[must_use]
    pub const fn num_outputs(&self) -> u8 {
        self.output_names().len() as u8
    }

    /// Nodes that dead code elimination must keep even without uses
    #[must_use]
    pub const fn is_root(&self) -> bool {
        matches!(self, Node::Variable { .. } | Node::Save { .. })
    }

    #[must_use]
    pub const fn is_grad(&self) -> bool {
        matches!(self, Node::ArithmeticGrad { .. })
    }

    /// Short name of the operation, used in graph dumps
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Node::Variable { .. } => "Variable".into(),
            Node::Splat { value, .. } => format!("Splat({value})"),
            Node::Arithmetic { mode, .. } => format!("{mode}"),
            Node::ArithmeticGrad { mode, .. } => format!("{mode}Grad"),
            Node::Save { .. } => "Save".into(),
        }
    }
}

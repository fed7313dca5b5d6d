//! Graph of operators with def-use index.

use crate::dtype::{Constant, TensorType};
use crate::error::LowerError;
use crate::node::{ArithmeticMode, Node, NodeId, NodeValue, Use};
use crate::slab::Slab;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: Box<str>,
    node: Node,
    // One type per output
    types: Vec<TensorType>,
}

/// Owning container of nodes.
///
/// Besides nodes the graph keeps an index from every node output to the set of
/// operands reading it, so that all users of a value can be found and rewired
/// without scanning the whole graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    nodes: Slab<NodeId, Entry>,
    // Value -> operands that read it, sets are never empty
    users: BTreeMap<NodeValue, BTreeSet<Use>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Slab::new(), users: BTreeMap::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    /// Ids of all nodes in ascending order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.ids()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, entry)| (id, &entry.node))
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).map(|entry| &entry.node)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).map(|entry| &*entry.name)
    }

    pub fn nodes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes.iter().filter(move |(_, entry)| &*entry.name == name).map(|(id, _)| id)
    }

    /// Type of node output, None if the output does not exist
    #[must_use]
    pub fn ty(&self, value: NodeValue) -> Option<&TensorType> {
        self.nodes.get(value.node).and_then(|entry| entry.types.get(value.output as usize))
    }

    #[track_caller]
    fn value_type(&self, value: NodeValue) -> Result<&TensorType, LowerError> {
        self.ty(value).ok_or_else(|| LowerError::invalid_node(format!("{value} does not exist")))
    }

    /// Ids of all nodes, every node comes after all nodes it reads
    #[must_use]
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.len());
        let mut visited = BTreeSet::new();
        for root in self.nodes.ids() {
            let mut params = vec![(root, false)];
            while let Some((id, expanded)) = params.pop() {
                if expanded {
                    order.push(id);
                    continue;
                }
                let Some(entry) = self.nodes.get(id) else {
                    continue;
                };
                if !visited.insert(id) {
                    continue;
                }
                params.push((id, true));
                params.extend(
                    entry
                        .node
                        .operands()
                        .map(|x| x.node)
                        .filter(|x| !visited.contains(x))
                        .map(|x| (x, false)),
                );
            }
        }
        order
    }

    /// Operands reading value
    pub fn users(&self, value: NodeValue) -> impl Iterator<Item = Use> + '_ {
        self.users.get(&value).into_iter().flatten().copied()
    }

    #[must_use]
    pub fn num_uses(&self, value: NodeValue) -> usize {
        self.users.get(&value).map_or(0, BTreeSet::len)
    }

    /// Is any output of node read by some other node?
    #[must_use]
    pub fn has_uses(&self, id: NodeId) -> bool {
        let first = NodeValue::new(id, 0);
        let last = NodeValue::new(id, u8::MAX);
        self.users.range(first..=last).next().is_some()
    }

    fn push(&mut self, name: &str, node: Node, types: Vec<TensorType>) -> NodeId {
        debug_assert_eq!(types.len(), node.num_outputs() as usize);
        let operands: Vec<NodeValue> = node.operands().collect();
        let id = self.nodes.push(Entry { name: name.into(), node, types });
        for (operand, value) in (0u8..).zip(operands) {
            self.users.entry(value).or_default().insert(Use { user: id, operand });
        }
        id
    }

    /// Creates graph input or weight
    pub fn create_variable(&mut self, name: &str, ty: TensorType) -> NodeValue {
        let id = self.push(name, Node::Variable { ty: ty.clone() }, vec![ty]);
        NodeValue::new(id, 0)
    }

    /// Creates tensor of type ty filled with value
    #[track_caller]
    pub fn create_splat(
        &mut self,
        name: &str,
        value: Constant,
        ty: TensorType,
    ) -> Result<NodeValue, LowerError> {
        if value.dtype() != ty.dtype {
            return Err(LowerError::type_mismatch(format!(
                "splat {name} of {} can not hold constant {value} of {}",
                ty,
                value.dtype()
            )));
        }
        let id = self.push(name, Node::Splat { value, ty: ty.clone() }, vec![ty]);
        Ok(NodeValue::new(id, 0))
    }

    /// Creates tensor of type ty filled with zeros
    pub fn create_zero(&mut self, name: &str, ty: TensorType) -> NodeValue {
        let value = ty.dtype.zero_constant();
        let id = self.push(name, Node::Splat { value, ty: ty.clone() }, vec![ty]);
        NodeValue::new(id, 0)
    }

    /// Creates elementwise binary op, lhs and rhs must have equal types
    #[track_caller]
    pub fn create_arithmetic(
        &mut self,
        name: &str,
        lhs: NodeValue,
        rhs: NodeValue,
        mode: ArithmeticMode,
    ) -> Result<NodeValue, LowerError> {
        let lty = self.value_type(lhs)?;
        let rty = self.value_type(rhs)?;
        if lty != rty {
            return Err(LowerError::type_mismatch(format!(
                "{mode} {name} with lhs {lty} and rhs {rty}"
            )));
        }
        let ty = lty.clone();
        let id = self.push(name, Node::Arithmetic { lhs, rhs, mode }, vec![ty]);
        Ok(NodeValue::new(id, 0))
    }

    /// Creates gradient of elementwise binary op. Outputs are gradients of lhs and rhs,
    /// see [`GRAD_OF_LHS`](crate::GRAD_OF_LHS) and [`GRAD_OF_RHS`](crate::GRAD_OF_RHS).
    #[track_caller]
    pub fn create_arithmetic_grad(
        &mut self,
        name: &str,
        lhs: NodeValue,
        rhs: NodeValue,
        result: NodeValue,
        result_grad: NodeValue,
        mode: ArithmeticMode,
    ) -> Result<NodeId, LowerError> {
        let ty = self.value_type(lhs)?;
        for x in [rhs, result, result_grad] {
            let xty = self.value_type(x)?;
            if xty != ty {
                return Err(LowerError::type_mismatch(format!(
                    "{mode} gradient {name} with lhs {ty} and operand {x} of {xty}"
                )));
            }
        }
        let types = vec![ty.clone(), ty.clone()];
        Ok(self.push(name, Node::ArithmeticGrad { lhs, rhs, result, result_grad, mode }, types))
    }

    /// Creates sink storing input
    #[track_caller]
    pub fn create_save(&mut self, name: &str, input: NodeValue) -> Result<NodeId, LowerError> {
        self.value_type(input)?;
        Ok(self.push(name, Node::Save { input }, Vec::new()))
    }

    /// Redirects every operand reading `from` to read `to` instead.
    ///
    /// Nothing is changed if the types differ, if either value does not exist
    /// or if `to` is produced by a node that itself reads `from`.
    /// Values without uses are a no-op.
    #[track_caller]
    pub fn replace_all_uses_of_with(
        &mut self,
        from: NodeValue,
        to: NodeValue,
    ) -> Result<(), LowerError> {
        let fty = self.value_type(from)?;
        let tty = self.value_type(to)?;
        if fty != tty {
            return Err(LowerError::type_mismatch(format!(
                "replacing {from} of {fty} with {to} of {tty}"
            )));
        }
        if from == to {
            return Ok(());
        }
        if self.users(from).any(|u| u.user == to.node) {
            return Err(LowerError::invalid_node(format!(
                "replacing {from} with {to} would make node {} read itself",
                to.node
            )));
        }
        let Some(uses) = self.users.remove(&from) else {
            return Ok(());
        };
        for u in &uses {
            let Some(operand) = self.nodes[u.user].node.operand_mut(u.operand) else {
                unreachable!("use {u:?} of {from} points to missing operand")
            };
            *operand = to;
        }
        log::trace!("Replaced {} uses of {from} with {to}", uses.len());
        self.users.entry(to).or_default().extend(uses);
        Ok(())
    }

    /// Removes node whose outputs have no uses
    #[track_caller]
    pub fn remove(&mut self, id: NodeId) -> Result<Node, LowerError> {
        if !self.nodes.contains_key(id) {
            return Err(LowerError::invalid_node(format!("{id} does not exist")));
        }
        if self.has_uses(id) {
            return Err(LowerError::invalid_node(format!(
                "{id} can not be removed, it is still used"
            )));
        }
        let Some(entry) = self.nodes.remove(id) else {
            unreachable!()
        };
        for (operand, value) in (0u8..).zip(entry.node.operands()) {
            if let Some(uses) = self.users.get_mut(&value) {
                uses.remove(&Use { user: id, operand });
                if uses.is_empty() {
                    self.users.remove(&value);
                }
            }
        }
        Ok(entry.node)
    }

    /// Checks that all operands point to existing outputs, that the def-use index
    /// matches operands and that types of operations agree.
    pub fn verify(&self) -> Result<(), LowerError> {
        let err = |e: String| Err(LowerError::Verification(e.into()));
        let mut expected: BTreeMap<NodeValue, BTreeSet<Use>> = BTreeMap::new();
        for (id, entry) in self.nodes.iter() {
            if entry.types.len() != entry.node.num_outputs() as usize {
                return err(format!(
                    "{id} has {} types for {} outputs",
                    entry.types.len(),
                    entry.node.num_outputs()
                ));
            }
            let mut types = Vec::new();
            for (operand, value) in (0u8..).zip(entry.node.operands()) {
                let Some(ty) = self.ty(value) else {
                    return err(format!("operand {operand} of {id} reads missing {value}"));
                };
                types.push(ty);
                expected.entry(value).or_default().insert(Use { user: id, operand });
            }
            match &entry.node {
                Node::Variable { ty } => {
                    if *ty != entry.types[0] {
                        return err(format!("variable {id} is {ty} but outputs {}", entry.types[0]));
                    }
                }
                Node::Splat { value, ty } => {
                    if value.dtype() != ty.dtype || *ty != entry.types[0] {
                        return err(format!("splat {id} of {value} has type {}", entry.types[0]));
                    }
                }
                Node::Arithmetic { mode, .. } | Node::ArithmeticGrad { mode, .. } => {
                    if types.iter().any(|ty| *ty != types[0]) {
                        return err(format!("{mode} {id} has operands of different types"));
                    }
                    if entry.types.iter().any(|ty| ty != types[0]) {
                        return err(format!(
                            "{mode} {id} outputs {:?}, operands are {}",
                            entry.types, types[0]
                        ));
                    }
                }
                Node::Save { .. } => {}
            }
        }
        if expected != self.users {
            for (value, uses) in &self.users {
                if expected.get(value) != Some(uses) {
                    return err(format!("index has uses {uses:?} of {value}, operands disagree"));
                }
            }
            return err("index is missing uses of some operands".into());
        }
        Ok(())
    }

    /// Plot graph in dot format
    #[must_use]
    pub fn plot_dot_graph(&self) -> String {
        use core::fmt::Write;
        let mut res_dot_graph =
            String::from("strict digraph {\n  ordering=in\n  rank=source\n  rankdir=LR\n");
        let mut edges = String::new();
        for (id, entry) in self.nodes.iter() {
            let (shape, fillcolor) = match entry.node {
                Node::Variable { .. } | Node::Splat { .. } => ("box", "aqua"),
                Node::Save { .. } => ("box", "coral"),
                Node::ArithmeticGrad { .. } => ("oval", "gold"),
                Node::Arithmetic { .. } => ("oval", "white"),
            };
            let types: Vec<String> = entry.types.iter().map(ToString::to_string).collect();
            let _ = writeln!(
                res_dot_graph,
                "  {id}[label=\"{id} {}NL{}NL{}\", shape={shape}, \
                fillcolor=\"{fillcolor}\", style=filled]",
                entry.name,
                entry.node.kind(),
                types.join(", "),
            );
            let input_names = entry.node.input_names();
            for (i, value) in entry.node.operands().enumerate() {
                let _ = writeln!(edges, "  {} -> {id} [label=\"{}\"]", value.node, input_names[i]);
            }
        }
        res_dot_graph = res_dot_graph.replace("NL", "\\n");
        let _ = write!(res_dot_graph, "{edges}}}");
        res_dot_graph
    }
}

impl std::ops::Index<NodeId> for Graph {
    type Output = Node;
    #[track_caller]
    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index].node
    }
}

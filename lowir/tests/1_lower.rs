use lowir::{
    lower, ArithmeticMode, CompilationMode, Constant, DType, Graph, LowerConfig, LowerError,
    Lowering, Node, NodeId, NodeValue, TensorType, UnsupportedPolicy, GRAD_OF_LHS, GRAD_OF_RHS,
};

struct Backward {
    x: NodeValue,
    y: NodeValue,
    out_grad: NodeValue,
    grad: NodeId,
    lhs_users: Vec<NodeId>,
    rhs_users: Vec<NodeId>,
}

fn ty() -> TensorType {
    TensorType::new(DType::F32, [2, 3])
}

// z = x mode y with gradient node, n1 saves of lhs gradient and n2 saves of rhs gradient
fn backward(
    g: &mut Graph,
    mode: ArithmeticMode,
    n1: usize,
    n2: usize,
) -> Result<Backward, LowerError> {
    let x = g.create_variable("x", ty());
    let y = g.create_variable("y", ty());
    let z = g.create_arithmetic("z", x, y, mode)?;
    let out_grad = g.create_variable("z.grad", ty());
    let grad = g.create_arithmetic_grad("z.bwd", x, y, z, out_grad, mode)?;
    let lhs_users = (0..n1)
        .map(|_| g.create_save("x.grad", NodeValue::new(grad, GRAD_OF_LHS)))
        .collect::<Result<Vec<_>, _>>()?;
    let rhs_users = (0..n2)
        .map(|_| g.create_save("y.grad", NodeValue::new(grad, GRAD_OF_RHS)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Backward { x, y, out_grad, grad, lhs_users, rhs_users })
}

fn saved(g: &Graph, save: NodeId) -> NodeValue {
    let Node::Save { input } = g[save] else {
        panic!("{save} is not save")
    };
    input
}

#[test]
fn lower_add() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let b = backward(&mut g, ArithmeticMode::Add, 2, 3)?;
    let len = g.len();
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.lowered, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(g.len(), len);
    for &s in b.lhs_users.iter().chain(&b.rhs_users) {
        assert_eq!(saved(&g, s), b.out_grad);
    }
    // 5 saves plus the gradient node itself
    assert_eq!(g.num_uses(b.out_grad), 6);
    assert!(!g.has_uses(b.grad));
    assert!(g.contains(b.grad));
    g.verify()
}

#[test]
fn lower_mul() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let b = backward(&mut g, ArithmeticMode::Mul, 1, 2)?;
    let ids: Vec<NodeId> = g.ids().collect();
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.created, 2);
    assert!(ids.iter().all(|&id| g.contains(id)));

    let lhs_grad = saved(&g, b.lhs_users[0]);
    assert_eq!(g.name(lhs_grad.node), Some("mul.grad.lhs"));
    assert_eq!(
        g[lhs_grad.node],
        Node::Arithmetic { lhs: b.y, rhs: b.out_grad, mode: ArithmeticMode::Mul }
    );
    let rhs_grad = saved(&g, b.rhs_users[0]);
    assert_eq!(saved(&g, b.rhs_users[1]), rhs_grad);
    assert_eq!(g.name(rhs_grad.node), Some("mul.grad.rhs"));
    assert_eq!(
        g[rhs_grad.node],
        Node::Arithmetic { lhs: b.x, rhs: b.out_grad, mode: ArithmeticMode::Mul }
    );
    assert_eq!(g.ty(lhs_grad), Some(&ty()));
    assert!(!g.has_uses(b.grad));
    g.verify()
}

#[test]
fn lower_sub() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let b = backward(&mut g, ArithmeticMode::Sub, 2, 1)?;
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.created, 2);
    assert_eq!(saved(&g, b.lhs_users[0]), b.out_grad);
    assert_eq!(saved(&g, b.lhs_users[1]), b.out_grad);

    let neg = saved(&g, b.rhs_users[0]);
    assert_eq!(g.name(neg.node), Some("sub"));
    let Node::Arithmetic { lhs: zero, rhs, mode: ArithmeticMode::Sub } = g[neg.node] else {
        panic!("{} is not subtraction", neg.node)
    };
    assert_eq!(rhs, b.out_grad);
    assert_eq!(g.name(zero.node), Some("zero"));
    assert_eq!(
        g[zero.node],
        Node::Splat { value: Constant::F32(0f32.to_bits()), ty: ty() }
    );
    assert_eq!(g.nodes_named("zero").count(), 1);
    g.verify()
}

#[test]
fn zero_typed_like_output_gradient() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let ty = TensorType::new(DType::F16, [5]);
    let x = g.create_variable("x", ty.clone());
    let z = g.create_arithmetic("z", x, x, ArithmeticMode::Sub)?;
    let out_grad = g.create_splat("ones", Constant::from(half::f16::ONE), ty.clone())?;
    let grad = g.create_arithmetic_grad("z.bwd", x, x, z, out_grad, ArithmeticMode::Sub)?;
    g.create_save("x.grad", NodeValue::new(grad, GRAD_OF_RHS))?;
    lower(&mut g, CompilationMode::Train)?;
    let zero = g.nodes_named("zero").next().unwrap();
    assert_eq!(g[zero], Node::Splat { value: DType::F16.zero_constant(), ty: ty.clone() });
    assert_eq!(g.ty(NodeValue::new(zero, 0)), Some(&ty));
    g.verify()
}

#[test]
fn consumers_of_gradients_are_rewired() -> Result<(), LowerError> {
    // Gradient is read by other arithmetic, not just saves
    let mut g = Graph::new();
    let b = backward(&mut g, ArithmeticMode::Add, 0, 0)?;
    let lhs_grad = NodeValue::new(b.grad, GRAD_OF_LHS);
    let rhs_grad = NodeValue::new(b.grad, GRAD_OF_RHS);
    let sum = g.create_arithmetic("sum", lhs_grad, rhs_grad, ArithmeticMode::Add)?;
    lower(&mut g, CompilationMode::Infer)?;
    assert_eq!(
        g[sum.node],
        Node::Arithmetic { lhs: b.out_grad, rhs: b.out_grad, mode: ArithmeticMode::Add }
    );
    g.verify()
}

#[test]
fn second_pass_does_nothing() -> Result<(), LowerError> {
    for mode in [ArithmeticMode::Add, ArithmeticMode::Mul, ArithmeticMode::Sub] {
        let mut g = Graph::new();
        backward(&mut g, mode, 1, 1)?;
        let first = lower(&mut g, CompilationMode::Train)?;
        assert_eq!(first.lowered, 1);
        let lowered = g.clone();
        let second = lower(&mut g, CompilationMode::Train)?;
        assert_eq!(second.lowered, 0);
        assert_eq!(second.dead, 1);
        assert_eq!(second.created, 0);
        assert_eq!(g, lowered);
    }
    Ok(())
}

#[test]
fn unused_gradient_creates_nothing() -> Result<(), LowerError> {
    let mut g = Graph::new();
    backward(&mut g, ArithmeticMode::Mul, 0, 0)?;
    let before = g.clone();
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.dead, 1);
    assert_eq!(g, before);
    Ok(())
}

#[test]
fn one_used_slot_is_enough() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let b = backward(&mut g, ArithmeticMode::Sub, 0, 1)?;
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.lowered, 1);
    assert_ne!(saved(&g, b.rhs_users[0]).node, b.grad);
    g.verify()
}

#[test]
fn graph_without_gradients_is_unchanged() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let x = g.create_variable("x", ty());
    let y = g.create_variable("y", ty());
    let z = g.create_arithmetic("z", x, y, ArithmeticMode::Mul)?;
    let w = g.create_arithmetic("w", z, x, ArithmeticMode::Sub)?;
    g.create_save("w", w)?;
    let before = g.clone();
    let stats = lower(&mut g, CompilationMode::Infer)?;
    assert_eq!(stats, lowir::LowerStats::default());
    assert_eq!(g, before);
    Ok(())
}

#[test]
fn multiple_gradient_nodes() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let a = backward(&mut g, ArithmeticMode::Mul, 1, 1)?;
    let b = backward(&mut g, ArithmeticMode::Mul, 1, 1)?;
    let c = backward(&mut g, ArithmeticMode::Sub, 1, 1)?;
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.lowered, 3);
    assert_eq!(stats.created, 6);
    assert_eq!(g.nodes_named("mul.grad.lhs").count(), 2);
    assert_eq!(g.nodes_named("mul.grad.rhs").count(), 2);
    for x in [&a, &b, &c] {
        assert!(!g.has_uses(x.grad));
    }
    // Each rule reads its own operands
    assert_eq!(
        g[saved(&g, b.lhs_users[0]).node],
        Node::Arithmetic { lhs: b.y, rhs: b.out_grad, mode: ArithmeticMode::Mul }
    );
    g.verify()
}

#[test]
fn unsupported_mode_warns_by_default() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let b = backward(&mut g, ArithmeticMode::Div, 1, 1)?;
    let add = backward(&mut g, ArithmeticMode::Add, 1, 1)?;
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.unsupported, [b.grad]);
    assert_eq!(stats.lowered, 1);
    assert_eq!(saved(&g, b.lhs_users[0]), NodeValue::new(b.grad, GRAD_OF_LHS));
    assert_eq!(saved(&g, add.lhs_users[0]), add.out_grad);
    g.verify()
}

#[test]
fn unsupported_mode_policies() -> Result<(), LowerError> {
    let mut g = Graph::new();
    let b = backward(&mut g, ArithmeticMode::Max, 1, 0)?;

    let error =
        Lowering::new(LowerConfig { unsupported: UnsupportedPolicy::Error, ..LowerConfig::new() });
    match error.run(&mut g, CompilationMode::Train) {
        Err(LowerError::UnsupportedMode { node, mode }) => {
            assert_eq!(node, b.grad);
            assert_eq!(mode, ArithmeticMode::Max);
        }
        x => panic!("expected unsupported mode error, got {x:?}"),
    }

    let ignore =
        Lowering::new(LowerConfig { unsupported: UnsupportedPolicy::Ignore, ..LowerConfig::new() });
    let stats = ignore.run(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.unsupported, [b.grad]);
    assert_eq!(stats.created, 0);
    Ok(())
}

#[test]
fn chained_gradients_are_fully_lowered() -> Result<(), LowerError> {
    // Output gradient of the second backward pass is gradient from the first one
    let mut g = Graph::new();
    let first = backward(&mut g, ArithmeticMode::Mul, 0, 0)?;
    let x = g.create_variable("u", ty());
    let y = g.create_variable("v", ty());
    let z = g.create_arithmetic("w", x, y, ArithmeticMode::Add)?;
    let chained = NodeValue::new(first.grad, GRAD_OF_LHS);
    let second = g.create_arithmetic_grad("w.bwd", x, y, z, chained, ArithmeticMode::Add)?;
    let save = g.create_save("u.grad", NodeValue::new(second, GRAD_OF_LHS))?;
    let stats = lower(&mut g, CompilationMode::Train)?;
    assert_eq!(stats.lowered, 2);
    assert!(!g.has_uses(first.grad));
    assert!(!g.has_uses(second));
    let grad = saved(&g, save);
    assert_eq!(g.name(grad.node), Some("mul.grad.lhs"));
    g.verify()
}

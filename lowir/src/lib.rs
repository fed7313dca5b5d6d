//! Lowering of gradient operators in typed operator graphs.
//!
//! Graph is built from [`Node`]s through factory methods on [`Graph`], which keeps
//! an index of all uses of every node output. [`lower`] rewrites backward passes
//! of elementwise arithmetic ([`Node::ArithmeticGrad`]) into primitive
//! [`Node::Arithmetic`] and constant nodes by redirecting uses of gradient outputs.
//!
//! ```
//! use lowir::{ArithmeticMode, CompilationMode, DType, Graph, TensorType};
//! use lowir::{LowerError, NodeValue, GRAD_OF_LHS, GRAD_OF_RHS};
//!
//! let mut g = Graph::new();
//! let ty = TensorType::new(DType::F32, [8]);
//! let x = g.create_variable("x", ty.clone());
//! let y = g.create_variable("y", ty.clone());
//! let z = g.create_arithmetic("z", x, y, ArithmeticMode::Mul)?;
//! let z_grad = g.create_variable("z.grad", ty);
//! let grad = g.create_arithmetic_grad("z.bwd", x, y, z, z_grad, ArithmeticMode::Mul)?;
//! g.create_save("x.grad", NodeValue::new(grad, GRAD_OF_LHS))?;
//! g.create_save("y.grad", NodeValue::new(grad, GRAD_OF_RHS))?;
//!
//! let stats = lowir::lower(&mut g, CompilationMode::Train)?;
//! assert_eq!(stats.lowered, 1);
//! assert_eq!(stats.created, 2);
//! assert!(!g.has_uses(grad));
//! # Ok::<(), LowerError>(())
//! ```

mod config;
mod dce;
mod dtype;
mod error;
mod graph;
mod lower;
mod node;
mod optimizer;
mod slab;

pub use config::{LowerConfig, UnsupportedPolicy};
pub use dce::dead_code_elimination;
pub use dtype::{Constant, DType, TensorType};
pub use error::LowerError;
pub use graph::Graph;
pub use lower::{lower, LowerStats, Lowering};
pub use node::{
    ArithmeticMode, CompilationMode, Node, NodeId, NodeOperandsIterator, NodeValue, Use,
    GRAD_OF_LHS, GRAD_OF_RHS,
};
pub use optimizer::optimize;

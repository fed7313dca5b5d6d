use crate::node::{ArithmeticMode, NodeId};
use std::fmt::Write;

/// Enumeration representing the various errors that can occur while building and lowering graphs.
#[derive(Debug)]
pub enum LowerError {
    /// Operand types of an operation or of a replacement do not match
    TypeMismatch(Box<str>),
    /// Reference to node or node output that does not exist or can not be used this way
    InvalidNode(Box<str>),
    /// Gradient node with arithmetic mode that has no lowering rule
    UnsupportedMode {
        /// The gradient node
        node: NodeId,
        /// Its arithmetic mode
        mode: ArithmeticMode,
    },
    /// Graph failed verification
    Verification(Box<str>),
    /// Error parsing some data
    ParseError(Box<str>),
    /// Error from file operations
    IOError(std::io::Error),
}

#[track_caller]
fn with_location(e: Box<str>) -> Box<str> {
    let location = std::panic::Location::caller();
    let mut e: String = e.into();
    // Writing into String can not fail
    let _ = write!(e, ", {}:{}:{}", location.file(), location.line(), location.column());
    e.into()
}

impl LowerError {
    /// Type mismatch error
    #[track_caller]
    pub fn type_mismatch(e: impl Into<Box<str>>) -> Self {
        Self::TypeMismatch(with_location(e.into()))
    }

    /// Invalid node error
    #[track_caller]
    pub fn invalid_node(e: impl Into<Box<str>>) -> Self {
        Self::InvalidNode(with_location(e.into()))
    }

    /// Parse error
    #[track_caller]
    pub fn parse_error(e: impl Into<Box<str>>) -> Self {
        Self::ParseError(with_location(e.into()))
    }
}

impl std::fmt::Display for LowerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LowerError::TypeMismatch(e) => f.write_fmt(format_args!("Type mismatch {e}")),
            LowerError::InvalidNode(e) => f.write_fmt(format_args!("Invalid node {e}")),
            LowerError::UnsupportedMode { node, mode } => f.write_fmt(format_args!(
                "Gradient node {node} has mode {mode} which can not be lowered"
            )),
            LowerError::Verification(e) => f.write_fmt(format_args!("Verification failed, {e}")),
            LowerError::ParseError(e) => f.write_fmt(format_args!("Parse {e}")),
            LowerError::IOError(e) => f.write_fmt(format_args!("IO {e}")),
        }
    }
}

impl std::error::Error for LowerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LowerError::IOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LowerError {
    #[track_caller]
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

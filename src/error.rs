use thiserror::Error;

use crate::datatypes::PhysicalTag;

/// Every failure the pipeline can report. None of these are recovered
/// internally; they surface to the caller of the orchestrator as-is.
#[derive(Debug, Error)]
pub enum LodestoneError {
    #[error(
        "Geometry error: element {element} has non-positive jacobian determinant {determinant}"
    )]
    Geometry { element: usize, determinant: f64 },

    /// A node reference outside the mesh. `element` is `None` when the
    /// reference comes from a boundary value rather than an element.
    #[error(
        "Index error: {} references node {node}, but the mesh has {node_count} nodes",
        referrer(.element)
    )]
    Index {
        element: Option<usize>,
        node: usize,
        node_count: usize,
    },

    #[error("Configuration mismatch: {kind} tag {tag} matches nothing in the mesh")]
    ConfigurationMismatch {
        kind: &'static str,
        tag: PhysicalTag,
    },

    #[error("Solver error: {0}")]
    Solve(String),

    #[error("Mesh parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Input error: {0}")]
    Input(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn referrer(element: &Option<usize>) -> String {
    match element {
        Some(element) => format!("element {element}"),
        None => "boundary value".to_owned(),
    }
}

impl LodestoneError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        LodestoneError::Parse {
            line,
            message: message.into(),
        }
    }
}

//! Errors raised while registering physics objects and assembling Jacobians.
//!
//! Fallible operations of the crate return [`eyre::Result`]. Failures with a fixed meaning are
//! represented by [`AssemblyError`], which can be recovered from a report with
//! `report.downcast_ref::<AssemblyError>()`.
use crate::fields::VariableId;
use crate::mesh::{BoundaryId, ElementId, SubdomainId};
use std::fmt;
use thiserror::Error;

/// Category of a postprocessor lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PostprocessorKind {
    Element,
    Side,
    InternalSide,
    Nodal,
    BlockNodal,
}

impl fmt::Display for PostprocessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Element => "element",
            Self::Side => "side",
            Self::InternalSide => "internal side",
            Self::Nodal => "nodal",
            Self::BlockNodal => "block nodal",
        };
        write!(f, "{name}")
    }
}

/// A block or boundary used as the key of a lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Block(SubdomainId),
    Boundary(BoundaryId),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(id) => write!(f, "block {id}"),
            Self::Boundary(id) => write!(f, "boundary {id}"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssemblyError {
    /// A lookup for a block or boundary without registered postprocessors.
    #[error("No {kind} postprocessors on {location}")]
    NoPostprocessors { kind: PostprocessorKind, location: Location },

    /// A physics object was registered with a restriction that does not fit its category.
    #[error("{category} `{name}` cannot be restricted to {restriction}")]
    InvalidRestriction {
        name: String,
        category: &'static str,
        restriction: String,
    },

    #[error("An object named `{0}` is already registered")]
    DuplicateName(String),

    #[error("Element {0} does not exist in the mesh")]
    UnknownElement(ElementId),

    #[error("Variable {variable} does not exist (the field provider knows {num_variables} variables)")]
    UnknownVariable { variable: VariableId, num_variables: usize },

    #[error("Variable {variable} is not among the variables needed on subdomain {subdomain:?}")]
    InactiveVariable {
        variable: VariableId,
        subdomain: Option<SubdomainId>,
    },

    #[error("Material property `{0}` is not available")]
    MissingMaterialProperty(String),

    #[error("Entry ({row}, {col}) is out of bounds for a {nrows}x{ncols} matrix")]
    EntryOutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("Invalid assembly configuration: {0}")]
    InvalidConfig(String),
}

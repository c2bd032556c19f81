//! Physics contributions evaluated by the element loop.
//!
//! A contribution is one of a closed set of categories, see [`PhysicsContribution`]. Objects are
//! shared by all workers and must not keep per-evaluation state outside of thread-local
//! workspaces.
use crate::assembly::LocalJacobian;
use crate::fields::{FieldView, VariableId};
use crate::setup::{SetupHooks, SetupPhase};
use crate::Real;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Capabilities shared by all physics contributions.
pub trait Contribution: SetupHooks + Send + Sync {
    fn name(&self) -> &str;

    /// Whether the contribution enters the Jacobian. Explicit contributions only enter residuals.
    fn is_implicit(&self) -> bool {
        true
    }

    /// The variable whose equation receives the contribution.
    fn variable(&self) -> VariableId;

    /// Additional variables the contribution reads.
    fn coupled_variables(&self) -> &[VariableId] {
        &[]
    }

    /// All variables that must be interpolated before the contribution is evaluated.
    fn variable_dependencies(&self) -> BTreeSet<VariableId> {
        let mut dependencies: BTreeSet<_> = self.coupled_variables().iter().copied().collect();
        dependencies.insert(self.variable());
        dependencies
    }
}

/// A contribution integrated over the volume of each element.
pub trait VolumeKernel<T: Real>: Contribution {
    fn compute_jacobian(&self, fe: &dyn FieldView<T>, local: &mut LocalJacobian<T>) -> eyre::Result<()>;
}

/// A contribution integrated over element sides on a boundary.
pub trait BoundaryKernel<T: Real>: Contribution {
    /// Whether the kernel currently applies. When it does not, the kernel is skipped entirely.
    fn should_apply(&self) -> bool {
        true
    }

    fn compute_jacobian(&self, fe: &dyn FieldView<T>, local: &mut LocalJacobian<T>) -> eyre::Result<()>;
}

/// A discontinuous Galerkin contribution integrated over faces shared by two elements.
///
/// Besides the element/element block, face kernels produce the element/neighbor,
/// neighbor/element and neighbor/neighbor coupling blocks.
pub trait FaceKernel<T: Real>: Contribution {
    fn compute_jacobian(&self, fe: &dyn FieldView<T>, local: &mut LocalJacobian<T>) -> eyre::Result<()>;
}

/// A physics object, classified into one of the categories known to the element loop.
pub enum PhysicsContribution<T: Real> {
    Volume(Arc<dyn VolumeKernel<T>>),
    Boundary(Arc<dyn BoundaryKernel<T>>),
    Face(Arc<dyn FaceKernel<T>>),
    /// Objects that take part in the lifecycle, but are not evaluated by the element loop.
    General(Arc<dyn Contribution>),
}

impl<T: Real> Clone for PhysicsContribution<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Volume(kernel) => Self::Volume(Arc::clone(kernel)),
            Self::Boundary(kernel) => Self::Boundary(Arc::clone(kernel)),
            Self::Face(kernel) => Self::Face(Arc::clone(kernel)),
            Self::General(object) => Self::General(Arc::clone(object)),
        }
    }
}

impl<T: Real> PhysicsContribution<T> {
    pub fn volume(kernel: impl VolumeKernel<T> + 'static) -> Self {
        Self::Volume(Arc::new(kernel))
    }

    pub fn boundary(kernel: impl BoundaryKernel<T> + 'static) -> Self {
        Self::Boundary(Arc::new(kernel))
    }

    pub fn face(kernel: impl FaceKernel<T> + 'static) -> Self {
        Self::Face(Arc::new(kernel))
    }

    pub fn general(object: impl Contribution + 'static) -> Self {
        Self::General(Arc::new(object))
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Volume(_) => "volume kernel",
            Self::Boundary(_) => "boundary kernel",
            Self::Face(_) => "face kernel",
            Self::General(_) => "general contribution",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Volume(kernel) => kernel.name(),
            Self::Boundary(kernel) => kernel.name(),
            Self::Face(kernel) => kernel.name(),
            Self::General(object) => object.name(),
        }
    }

    pub fn is_implicit(&self) -> bool {
        match self {
            Self::Volume(kernel) => kernel.is_implicit(),
            Self::Boundary(kernel) => kernel.is_implicit(),
            Self::Face(kernel) => kernel.is_implicit(),
            Self::General(object) => object.is_implicit(),
        }
    }

    pub fn variable_dependencies(&self) -> BTreeSet<VariableId> {
        match self {
            Self::Volume(kernel) => kernel.variable_dependencies(),
            Self::Boundary(kernel) => kernel.variable_dependencies(),
            Self::Face(kernel) => kernel.variable_dependencies(),
            Self::General(object) => object.variable_dependencies(),
        }
    }

    pub fn setup(&self, phase: SetupPhase) -> eyre::Result<()> {
        match self {
            Self::Volume(kernel) => kernel.setup(phase),
            Self::Boundary(kernel) => kernel.setup(phase),
            Self::Face(kernel) => kernel.setup(phase),
            Self::General(object) => object.setup(phase),
        }
    }
}

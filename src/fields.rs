//! Interface to the field interpolation collaborator.
//!
//! The element loop never computes geometry, shape functions or material properties itself.
//! It asks a [`FieldInterpolator`] to reinitialize them for the current element, face or
//! neighbor, and hands a read-only [`FieldView`] to the physics objects. Every worker owns its own
//! interpolator, created by a shared [`FieldProvider`].
use crate::mesh::{BoundaryId, ElementInfo, SubdomainId};
use crate::Real;
use nalgebra::{DMatrix, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

pub mod piecewise_constant;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape function data of one variable on the current element, face or neighbor face.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeValues<T: Scalar> {
    /// Global degree of freedom index of each shape function.
    pub dofs: Vec<usize>,
    /// `phi[(i, q)]` is the value of shape function `i` at quadrature point `q`.
    pub phi: DMatrix<T>,
    /// Quadrature weights multiplied by the geometric measure, one per quadrature point.
    pub jxw: Vec<T>,
}

impl<T: Real> ShapeValues<T> {
    pub fn num_shape_functions(&self) -> usize {
        self.dofs.len()
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.jxw.len()
    }
}

/// Read-only state of the current evaluation, as seen by physics objects.
pub trait FieldView<T: Scalar> {
    fn thread_index(&self) -> usize;

    fn current_element(&self) -> Option<&ElementInfo>;

    /// The neighbor of the current element while an internal face is evaluated.
    fn current_neighbor(&self) -> Option<&ElementInfo>;

    /// The side of the current element while a face is evaluated.
    fn current_side(&self) -> Option<usize>;

    /// The boundary currently being evaluated, for boundary restricted queries.
    fn current_boundary(&self) -> Option<BoundaryId>;

    /// Shapes of the variable on the current element or face, if they were prepared.
    fn shapes(&self, variable: VariableId) -> Option<&ShapeValues<T>>;

    /// Shapes of the variable on the neighbor side of the current internal face.
    fn neighbor_shapes(&self, variable: VariableId) -> Option<&ShapeValues<T>>;

    /// Values of a material property at the quadrature points of the current element or face.
    fn material_property(&self, name: &str) -> Option<&[T]>;

    /// Values of a material property at the quadrature points on the neighbor side.
    fn neighbor_material_property(&self, name: &str) -> Option<&[T]>;
}

/// Per-worker field interpolation state.
///
/// The `reinit_materials*` methods swap the material state of the corresponding side in, and the
/// `swap_back_materials*` methods restore it. Restoring is handled by [`MaterialScope`], which
/// is why the swap-back methods cannot fail.
pub trait FieldInterpolator<T: Scalar>: FieldView<T> {
    fn subdomain_setup(&mut self, subdomain: SubdomainId) -> eyre::Result<()>;

    /// Restricts element reinitialization to the given variables.
    fn set_active_variables(&mut self, variables: &BTreeSet<VariableId>);

    fn clear_active_variables(&mut self);

    fn prepare_materials(&mut self, subdomain: SubdomainId) -> eyre::Result<()>;

    fn prepare(&mut self, element: &ElementInfo) -> eyre::Result<()>;

    fn reinit_element(&mut self, element: &ElementInfo) -> eyre::Result<()>;

    fn reinit_materials(&mut self, subdomain: SubdomainId) -> eyre::Result<()>;

    /// Whether scalar (non-spatial) variables are coupled into the physics.
    fn has_scalar_variables(&self) -> bool {
        false
    }

    fn reinit_off_diag_scalars(&mut self) -> eyre::Result<()> {
        Ok(())
    }

    fn swap_back_materials(&mut self);

    fn reinit_element_face(&mut self, element: &ElementInfo, side: usize, boundary: BoundaryId) -> eyre::Result<()>;

    /// Called on a boundary face of the first element visited after a subdomain change.
    fn subdomain_setup_side(&mut self, subdomain: SubdomainId) -> eyre::Result<()>;

    fn reinit_materials_face(&mut self, subdomain: SubdomainId) -> eyre::Result<()>;

    fn reinit_materials_boundary(&mut self, boundary: BoundaryId) -> eyre::Result<()>;

    fn set_current_boundary(&mut self, boundary: Option<BoundaryId>);

    fn swap_back_materials_face(&mut self);

    fn reinit_neighbor(&mut self, element: &ElementInfo, side: usize, neighbor: &ElementInfo) -> eyre::Result<()>;

    fn reinit_materials_neighbor(&mut self, subdomain: SubdomainId) -> eyre::Result<()>;

    fn swap_back_materials_neighbor(&mut self);

    fn prepare_shapes(&mut self, variable: VariableId) -> eyre::Result<()>;

    fn prepare_face_shapes(&mut self, variable: VariableId) -> eyre::Result<()>;

    fn prepare_neighbor_shapes(&mut self, variable: VariableId) -> eyre::Result<()>;
}

/// Creates the field interpolator of each worker.
pub trait FieldProvider<T: Scalar>: Sync {
    type Interpolator<'a>: FieldInterpolator<T>
    where
        Self: 'a;

    fn interpolator(&self, thread_index: usize) -> eyre::Result<Self::Interpolator<'_>>;
}

/// The material state restored by a [`MaterialScope`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MaterialSides {
    Element,
    /// A boundary face. The current boundary is cleared before the face materials are restored.
    Boundary,
    /// An internal face, restoring both the face and the neighbor materials.
    InternalFace,
}

/// Restores swapped material state when dropped.
///
/// The scope dereferences to the interpolator, so the materials are swapped in and used through
/// the scope. Restoring happens on every exit path, including early returns with `?`.
pub struct MaterialScope<'a, T, I>
where
    T: Scalar,
    I: FieldInterpolator<T>,
{
    fields: &'a mut I,
    sides: MaterialSides,
    marker: PhantomData<T>,
}

impl<'a, T, I> MaterialScope<'a, T, I>
where
    T: Scalar,
    I: FieldInterpolator<T>,
{
    pub fn new(fields: &'a mut I, sides: MaterialSides) -> Self {
        Self {
            fields,
            sides,
            marker: PhantomData,
        }
    }
}

impl<'a, T, I> Deref for MaterialScope<'a, T, I>
where
    T: Scalar,
    I: FieldInterpolator<T>,
{
    type Target = I;

    fn deref(&self) -> &I {
        self.fields
    }
}

impl<'a, T, I> DerefMut for MaterialScope<'a, T, I>
where
    T: Scalar,
    I: FieldInterpolator<T>,
{
    fn deref_mut(&mut self) -> &mut I {
        self.fields
    }
}

impl<'a, T, I> Drop for MaterialScope<'a, T, I>
where
    T: Scalar,
    I: FieldInterpolator<T>,
{
    fn drop(&mut self) {
        match self.sides {
            MaterialSides::Element => self.fields.swap_back_materials(),
            MaterialSides::Boundary => {
                self.fields.set_current_boundary(None);
                self.fields.swap_back_materials_face();
            }
            MaterialSides::InternalFace => {
                self.fields.swap_back_materials_face();
                self.fields.swap_back_materials_neighbor();
            }
        }
    }
}

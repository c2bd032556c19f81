//! Reference physics contributions.
//!
//! All kernels integrate products of test and trial shape functions at the prepared quadrature
//! points. Local blocks are computed in per-thread workspaces, so a single kernel object can be
//! shared by all workers.
use crate::assembly::{Coupling, LocalJacobian};
use crate::error::AssemblyError;
use crate::fields::{FieldView, ShapeValues, VariableId};
use crate::physics::{BoundaryKernel, Contribution, FaceKernel, VolumeKernel};
use crate::setup::SetupHooks;
use crate::Real;
use eyre::eyre;
use nalgebra::DMatrix;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use thread_local::ThreadLocal;

/// Computes `output[(i, j)] = Σ_q weight(q) * test.phi[(i, q)] * trial.phi[(j, q)]`.
///
/// # Panics
///
/// Panics if the shapes have different numbers of quadrature points.
pub fn integrate_product_block<T: Real>(
    test: &ShapeValues<T>,
    trial: &ShapeValues<T>,
    weight: impl Fn(usize) -> T,
    output: &mut DMatrix<T>,
) {
    assert_eq!(
        test.num_quadrature_points(),
        trial.num_quadrature_points(),
        "Test and trial shapes must share quadrature points"
    );
    output.resize_mut(test.num_shape_functions(), trial.num_shape_functions(), T::zero());
    output.fill(T::zero());

    for q in 0..test.num_quadrature_points() {
        let w = test.jxw[q] * weight(q);
        for i in 0..test.num_shape_functions() {
            for j in 0..trial.num_shape_functions() {
                output[(i, j)] += w * test.phi[(i, q)] * trial.phi[(j, q)];
            }
        }
    }
}

fn prepared_shapes<'a, T: Real>(
    shapes: Option<&'a ShapeValues<T>>,
    variable: VariableId,
) -> eyre::Result<&'a ShapeValues<T>> {
    shapes.ok_or_else(|| eyre!("Shapes of variable {variable} have not been prepared"))
}

fn material_values<'a, T: Real>(fe: &'a dyn FieldView<T>, name: &str, num_points: usize) -> eyre::Result<&'a [T]> {
    let values = fe
        .material_property(name)
        .ok_or_else(|| AssemblyError::MissingMaterialProperty(name.to_string()))?;
    if values.len() != num_points {
        return Err(eyre!(
            "Material property `{name}` has {} values, but there are {num_points} quadrature points",
            values.len()
        ));
    }
    Ok(values)
}

/// A linear reaction term `k m u` (or `k m c` for a coupled variable `c`).
#[derive(Debug)]
pub struct ReactionKernel<T: Real> {
    name: String,
    variable: VariableId,
    coupled: Vec<VariableId>,
    coefficient: T,
    material: Option<String>,
    implicit: bool,
    workspace: ThreadLocal<RefCell<DMatrix<T>>>,
}

impl<T: Real> ReactionKernel<T> {
    pub fn new(name: impl Into<String>, variable: VariableId, coefficient: T) -> Self {
        Self {
            name: name.into(),
            variable,
            coupled: Vec::new(),
            coefficient,
            material: None,
            implicit: true,
            workspace: ThreadLocal::new(),
        }
    }

    /// Scales the term with a material property.
    pub fn with_material(self, name: impl Into<String>) -> Self {
        Self {
            material: Some(name.into()),
            ..self
        }
    }

    /// Differentiates with respect to `variable` instead of the kernel's own variable.
    pub fn with_coupled_variable(self, variable: VariableId) -> Self {
        Self {
            coupled: vec![variable],
            ..self
        }
    }

    /// Marks the kernel as explicit, so that it does not enter Jacobians.
    pub fn explicit(self) -> Self {
        Self {
            implicit: false,
            ..self
        }
    }

    fn trial_variable(&self) -> VariableId {
        self.coupled.first().copied().unwrap_or(self.variable)
    }
}

impl<T: Real> SetupHooks for ReactionKernel<T> {}

impl<T: Real> Contribution for ReactionKernel<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_implicit(&self) -> bool {
        self.implicit
    }

    fn variable(&self) -> VariableId {
        self.variable
    }

    fn coupled_variables(&self) -> &[VariableId] {
        &self.coupled
    }
}

impl<T: Real> VolumeKernel<T> for ReactionKernel<T> {
    fn compute_jacobian(&self, fe: &dyn FieldView<T>, local: &mut LocalJacobian<T>) -> eyre::Result<()> {
        let test = prepared_shapes(fe.shapes(self.variable), self.variable)?;
        let trial_variable = self.trial_variable();
        let trial = prepared_shapes(fe.shapes(trial_variable), trial_variable)?;
        let material = match &self.material {
            Some(name) => Some(material_values(fe, name, test.num_quadrature_points())?),
            None => None,
        };

        let mut block = self
            .workspace
            .get_or(|| RefCell::new(DMatrix::zeros(0, 0)))
            .borrow_mut();
        let coefficient = self.coefficient;
        integrate_product_block(
            test,
            trial,
            |q| coefficient * material.map(|values| values[q]).unwrap_or_else(T::one),
            &mut block,
        );
        local.add_element_block(&test.dofs, &trial.dofs, &block);
        Ok(())
    }
}

/// A Robin boundary term `α u` on boundary faces.
///
/// The condition can be switched off between passes with [`RobinBoundary::set_enabled`], in which
/// case it is skipped.
#[derive(Debug)]
pub struct RobinBoundary<T: Real> {
    name: String,
    variable: VariableId,
    alpha: T,
    implicit: bool,
    enabled: AtomicBool,
    workspace: ThreadLocal<RefCell<DMatrix<T>>>,
}

impl<T: Real> RobinBoundary<T> {
    pub fn new(name: impl Into<String>, variable: VariableId, alpha: T) -> Self {
        Self {
            name: name.into(),
            variable,
            alpha,
            implicit: true,
            enabled: AtomicBool::new(true),
            workspace: ThreadLocal::new(),
        }
    }

    pub fn explicit(self) -> Self {
        Self {
            implicit: false,
            ..self
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl<T: Real> SetupHooks for RobinBoundary<T> {}

impl<T: Real> Contribution for RobinBoundary<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_implicit(&self) -> bool {
        self.implicit
    }

    fn variable(&self) -> VariableId {
        self.variable
    }
}

impl<T: Real> BoundaryKernel<T> for RobinBoundary<T> {
    fn should_apply(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn compute_jacobian(&self, fe: &dyn FieldView<T>, local: &mut LocalJacobian<T>) -> eyre::Result<()> {
        let shapes = prepared_shapes(fe.shapes(self.variable), self.variable)?;
        let mut block = self
            .workspace
            .get_or(|| RefCell::new(DMatrix::zeros(0, 0)))
            .borrow_mut();
        let alpha = self.alpha;
        integrate_product_block(shapes, shapes, |_| alpha, &mut block);
        local.add_element_block(&shapes.dofs, &shapes.dofs, &block);
        Ok(())
    }
}

/// A symmetric interior penalty `σ [u] [v]` on the jumps across internal faces.
#[derive(Debug)]
pub struct InteriorPenalty<T: Real> {
    name: String,
    variable: VariableId,
    sigma: T,
    implicit: bool,
    workspace: ThreadLocal<RefCell<DMatrix<T>>>,
}

impl<T: Real> InteriorPenalty<T> {
    pub fn new(name: impl Into<String>, variable: VariableId, sigma: T) -> Self {
        Self {
            name: name.into(),
            variable,
            sigma,
            implicit: true,
            workspace: ThreadLocal::new(),
        }
    }

    pub fn explicit(self) -> Self {
        Self {
            implicit: false,
            ..self
        }
    }
}

impl<T: Real> SetupHooks for InteriorPenalty<T> {}

impl<T: Real> Contribution for InteriorPenalty<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_implicit(&self) -> bool {
        self.implicit
    }

    fn variable(&self) -> VariableId {
        self.variable
    }
}

impl<T: Real> FaceKernel<T> for InteriorPenalty<T> {
    fn compute_jacobian(&self, fe: &dyn FieldView<T>, local: &mut LocalJacobian<T>) -> eyre::Result<()> {
        let element = prepared_shapes(fe.shapes(self.variable), self.variable)?;
        let neighbor = prepared_shapes(fe.neighbor_shapes(self.variable), self.variable)?;

        let mut block = self
            .workspace
            .get_or(|| RefCell::new(DMatrix::zeros(0, 0)))
            .borrow_mut();
        let sigma = self.sigma;

        let couplings = [
            (Coupling::ElementElement, element, element, sigma),
            (Coupling::ElementNeighbor, element, neighbor, -sigma),
            (Coupling::NeighborElement, neighbor, element, -sigma),
            (Coupling::NeighborNeighbor, neighbor, neighbor, sigma),
        ];
        for (coupling, test, trial, scale) in couplings {
            integrate_product_block(test, trial, |_| scale, &mut block);
            local.add_block(coupling, &test.dofs, &trial.dofs, &block);
        }
        Ok(())
    }
}

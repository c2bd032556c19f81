//! Piecewise constant (DG0) fields on an [`ElementMesh`].
//!
//! Every variable has one degree of freedom per element, with the single shape function equal to
//! one on its element. Integrals use one quadrature point weighted by the element volume, or by
//! the side area on faces. Material properties are constant per subdomain, with additional
//! properties per boundary.
use crate::error::AssemblyError;
use crate::fields::{FieldInterpolator, FieldProvider, FieldView, ShapeValues, VariableId};
use crate::mesh::{AssemblyMesh, BoundaryId, ElementId, ElementInfo, ElementMesh, SubdomainId};
use crate::Real;
use eyre::eyre;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct PiecewiseConstantFields<'m, T> {
    mesh: &'m ElementMesh,
    num_variables: usize,
    subdomain_materials: FxHashMap<SubdomainId, BTreeMap<String, T>>,
    boundary_materials: FxHashMap<BoundaryId, BTreeMap<String, T>>,
}

impl<'m, T: Real> PiecewiseConstantFields<'m, T> {
    pub fn new(mesh: &'m ElementMesh, num_variables: usize) -> Self {
        Self {
            mesh,
            num_variables,
            subdomain_materials: FxHashMap::default(),
            boundary_materials: FxHashMap::default(),
        }
    }

    pub fn with_subdomain_material(mut self, subdomain: SubdomainId, name: impl Into<String>, value: T) -> Self {
        self.subdomain_materials
            .entry(subdomain)
            .or_default()
            .insert(name.into(), value);
        self
    }

    pub fn with_boundary_material(mut self, boundary: BoundaryId, name: impl Into<String>, value: T) -> Self {
        self.boundary_materials
            .entry(boundary)
            .or_default()
            .insert(name.into(), value);
        self
    }

    pub fn mesh(&self) -> &'m ElementMesh {
        self.mesh
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// The total number of degrees of freedom, i.e. the dimension of the Jacobian.
    pub fn num_dofs(&self) -> usize {
        self.mesh.num_elements() * self.num_variables
    }

    pub fn dof(&self, element: ElementId, variable: VariableId) -> usize {
        element.0 * self.num_variables + variable.0 as usize
    }
}

impl<'m, T: Real> FieldProvider<T> for PiecewiseConstantFields<'m, T> {
    type Interpolator<'a> = PiecewiseConstantInterpolator<'a, T> where Self: 'a;

    fn interpolator(&self, thread_index: usize) -> eyre::Result<Self::Interpolator<'_>> {
        Ok(PiecewiseConstantInterpolator::new(self, thread_index))
    }
}

/// The per-worker state of [`PiecewiseConstantFields`].
#[derive(Debug)]
pub struct PiecewiseConstantInterpolator<'a, T: Real> {
    fields: &'a PiecewiseConstantFields<'a, T>,
    thread_index: usize,
    /// `None` means that all variables may be prepared.
    active_variables: Option<BTreeSet<VariableId>>,
    subdomain: Option<SubdomainId>,
    element: Option<ElementInfo>,
    neighbor: Option<ElementInfo>,
    side: Option<usize>,
    boundary: Option<BoundaryId>,
    element_weight: T,
    face_weight: T,
    shapes: BTreeMap<VariableId, ShapeValues<T>>,
    neighbor_shapes: BTreeMap<VariableId, ShapeValues<T>>,
    materials: BTreeMap<String, Vec<T>>,
    neighbor_materials: BTreeMap<String, Vec<T>>,
}

impl<'a, T: Real> PiecewiseConstantInterpolator<'a, T> {
    fn new(fields: &'a PiecewiseConstantFields<'a, T>, thread_index: usize) -> Self {
        Self {
            fields,
            thread_index,
            active_variables: None,
            subdomain: None,
            element: None,
            neighbor: None,
            side: None,
            boundary: None,
            element_weight: T::zero(),
            face_weight: T::zero(),
            shapes: BTreeMap::new(),
            neighbor_shapes: BTreeMap::new(),
            materials: BTreeMap::new(),
            neighbor_materials: BTreeMap::new(),
        }
    }

    pub fn active_variables(&self) -> Option<&BTreeSet<VariableId>> {
        self.active_variables.as_ref()
    }

    /// Whether material properties are currently swapped in on either side.
    pub fn has_swapped_materials(&self) -> bool {
        !self.materials.is_empty() || !self.neighbor_materials.is_empty()
    }

    fn check_variable(&self, variable: VariableId) -> eyre::Result<()> {
        let num_variables = self.fields.num_variables;
        if variable.0 as usize >= num_variables {
            return Err(AssemblyError::UnknownVariable {
                variable,
                num_variables,
            }
            .into());
        }
        match &self.active_variables {
            Some(active) if !active.contains(&variable) => Err(AssemblyError::InactiveVariable {
                variable,
                subdomain: self.subdomain,
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// The variables interpolated on reinitialization.
    fn interpolated_variables(&self) -> Vec<VariableId> {
        match &self.active_variables {
            Some(active) => active.iter().copied().collect(),
            None => (0..self.fields.num_variables as u32).map(VariableId).collect(),
        }
    }

    fn constant_shapes(&self, element: ElementId, weight: T) -> BTreeMap<VariableId, ShapeValues<T>> {
        self.interpolated_variables()
            .into_iter()
            .map(|variable| {
                let shapes = ShapeValues {
                    dofs: vec![self.fields.dof(element, variable)],
                    phi: DMatrix::from_element(1, 1, T::one()),
                    jxw: vec![weight],
                };
                (variable, shapes)
            })
            .collect()
    }

    fn require_shapes(
        &self,
        shapes: &BTreeMap<VariableId, ShapeValues<T>>,
        variable: VariableId,
        what: &str,
    ) -> eyre::Result<()> {
        self.check_variable(variable)?;
        if shapes.contains_key(&variable) {
            Ok(())
        } else {
            Err(eyre!("No {what} shapes of variable {variable} have been computed"))
        }
    }

    fn swap_in(target: &mut BTreeMap<String, Vec<T>>, properties: Option<&BTreeMap<String, T>>) {
        for (name, &value) in properties.into_iter().flatten() {
            target.insert(name.clone(), vec![value]);
        }
    }
}

impl<'a, T: Real> FieldView<T> for PiecewiseConstantInterpolator<'a, T> {
    fn thread_index(&self) -> usize {
        self.thread_index
    }

    fn current_element(&self) -> Option<&ElementInfo> {
        self.element.as_ref()
    }

    fn current_neighbor(&self) -> Option<&ElementInfo> {
        self.neighbor.as_ref()
    }

    fn current_side(&self) -> Option<usize> {
        self.side
    }

    fn current_boundary(&self) -> Option<BoundaryId> {
        self.boundary
    }

    fn shapes(&self, variable: VariableId) -> Option<&ShapeValues<T>> {
        self.shapes.get(&variable)
    }

    fn neighbor_shapes(&self, variable: VariableId) -> Option<&ShapeValues<T>> {
        self.neighbor_shapes.get(&variable)
    }

    fn material_property(&self, name: &str) -> Option<&[T]> {
        self.materials.get(name).map(Vec::as_slice)
    }

    fn neighbor_material_property(&self, name: &str) -> Option<&[T]> {
        self.neighbor_materials.get(name).map(Vec::as_slice)
    }
}

impl<'a, T: Real> FieldInterpolator<T> for PiecewiseConstantInterpolator<'a, T> {
    fn subdomain_setup(&mut self, subdomain: SubdomainId) -> eyre::Result<()> {
        self.subdomain = Some(subdomain);
        Ok(())
    }

    fn set_active_variables(&mut self, variables: &BTreeSet<VariableId>) {
        self.active_variables = Some(variables.clone());
    }

    fn clear_active_variables(&mut self) {
        self.active_variables = None;
    }

    fn prepare_materials(&mut self, _subdomain: SubdomainId) -> eyre::Result<()> {
        Ok(())
    }

    fn prepare(&mut self, element: &ElementInfo) -> eyre::Result<()> {
        self.element = Some(*element);
        self.neighbor = None;
        self.side = None;
        self.shapes.clear();
        self.neighbor_shapes.clear();
        Ok(())
    }

    fn reinit_element(&mut self, element: &ElementInfo) -> eyre::Result<()> {
        if element.id.0 >= self.fields.mesh.num_elements() {
            return Err(AssemblyError::UnknownElement(element.id).into());
        }
        self.element = Some(*element);
        self.element_weight = nalgebra::convert(self.fields.mesh.element_measure(element.id));
        self.shapes = self.constant_shapes(element.id, self.element_weight);
        Ok(())
    }

    fn reinit_materials(&mut self, subdomain: SubdomainId) -> eyre::Result<()> {
        Self::swap_in(&mut self.materials, self.fields.subdomain_materials.get(&subdomain));
        Ok(())
    }

    fn swap_back_materials(&mut self) {
        self.materials.clear();
    }

    fn reinit_element_face(&mut self, element: &ElementInfo, side: usize, _boundary: BoundaryId) -> eyre::Result<()> {
        let mesh = self.fields.mesh;
        if side >= mesh.num_sides(element.id) {
            return Err(eyre!("Element {} has no side {}", element.id, side));
        }
        self.element = Some(*element);
        self.neighbor = None;
        self.side = Some(side);
        self.face_weight = nalgebra::convert(mesh.side(element.id, side).measure);
        self.shapes = self.constant_shapes(element.id, self.face_weight);
        Ok(())
    }

    fn subdomain_setup_side(&mut self, _subdomain: SubdomainId) -> eyre::Result<()> {
        Ok(())
    }

    fn reinit_materials_face(&mut self, subdomain: SubdomainId) -> eyre::Result<()> {
        Self::swap_in(&mut self.materials, self.fields.subdomain_materials.get(&subdomain));
        Ok(())
    }

    fn reinit_materials_boundary(&mut self, boundary: BoundaryId) -> eyre::Result<()> {
        Self::swap_in(&mut self.materials, self.fields.boundary_materials.get(&boundary));
        Ok(())
    }

    fn set_current_boundary(&mut self, boundary: Option<BoundaryId>) {
        self.boundary = boundary;
    }

    fn swap_back_materials_face(&mut self) {
        self.materials.clear();
    }

    fn reinit_neighbor(&mut self, element: &ElementInfo, side: usize, neighbor: &ElementInfo) -> eyre::Result<()> {
        let mesh = self.fields.mesh;
        if side >= mesh.num_sides(element.id) {
            return Err(eyre!("Element {} has no side {}", element.id, side));
        }
        if neighbor.id.0 >= mesh.num_elements() {
            return Err(AssemblyError::UnknownElement(neighbor.id).into());
        }
        self.element = Some(*element);
        self.neighbor = Some(*neighbor);
        self.side = Some(side);
        self.face_weight = nalgebra::convert(mesh.side(element.id, side).measure);
        self.shapes = self.constant_shapes(element.id, self.face_weight);
        self.neighbor_shapes = self.constant_shapes(neighbor.id, self.face_weight);
        Ok(())
    }

    fn reinit_materials_neighbor(&mut self, subdomain: SubdomainId) -> eyre::Result<()> {
        Self::swap_in(&mut self.neighbor_materials, self.fields.subdomain_materials.get(&subdomain));
        Ok(())
    }

    fn swap_back_materials_neighbor(&mut self) {
        self.neighbor_materials.clear();
    }

    fn prepare_shapes(&mut self, variable: VariableId) -> eyre::Result<()> {
        self.require_shapes(&self.shapes, variable, "element")
    }

    fn prepare_face_shapes(&mut self, variable: VariableId) -> eyre::Result<()> {
        if self.side.is_none() {
            return Err(eyre!("Cannot prepare face shapes without a current face"));
        }
        self.require_shapes(&self.shapes, variable, "face")
    }

    fn prepare_neighbor_shapes(&mut self, variable: VariableId) -> eyre::Result<()> {
        self.require_shapes(&self.neighbor_shapes, variable, "neighbor")
    }
}

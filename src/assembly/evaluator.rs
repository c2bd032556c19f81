use crate::assembly::{needed_variables, JacobianCache, LocalJacobian};
use crate::error::AssemblyError;
use crate::fields::{FieldInterpolator, MaterialScope, MaterialSides};
use crate::matrix::{FlushOrigin, GlobalMatrix};
use crate::mesh::{AssemblyMesh, BoundaryId, ElementInfo, SubdomainId};
use crate::physics::{FaceKernel, VolumeKernel};
use crate::registry::{KernelFilter, KernelRegistry};
use crate::Real;
use eyre::WrapErr;
use log::trace;
use parking_lot::Mutex;
use std::sync::Arc;

/// Decides whether the internal face between `element` and `neighbor` is evaluated from the side
/// of `element`.
///
/// Faces between elements of the same level are visited from the element with the smaller id.
/// Faces between elements of different levels are visited from the finer element. Every pair of
/// coupled elements is therefore visited exactly once.
pub fn should_visit_internal_face(element: &ElementInfo, neighbor: &ElementInfo) -> bool {
    (neighbor.active && neighbor.level == element.level && element.id < neighbor.id) || neighbor.level < element.level
}

/// Counters of one worker.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub elements: usize,
    pub subdomain_changes: usize,
    /// Boundary faces on which boundary kernels were evaluated.
    pub boundary_faces: usize,
    /// Internal faces on which face kernels were evaluated.
    pub internal_faces: usize,
    pub cached_flushes: usize,
    pub neighbor_flushes: usize,
}

/// The state of one worker of a Jacobian pass.
///
/// The evaluator exclusively owns its field interpolator, its local Jacobian and its cache.
/// The mesh and the registry are shared read-only with the other workers, and the global matrix
/// is only touched through the mutex passed to the flushing methods.
pub struct JacobianEvaluator<'a, T, Mesh, Registry, Fields>
where
    T: Real,
    Mesh: AssemblyMesh + ?Sized,
    Registry: KernelRegistry<T> + ?Sized,
    Fields: FieldInterpolator<T>,
{
    thread_index: usize,
    mesh: &'a Mesh,
    registry: &'a Registry,
    fields: Fields,
    filter: KernelFilter,
    doing_dg: bool,
    subdomain: Option<SubdomainId>,
    old_subdomain: Option<SubdomainId>,
    volume_kernels: &'a [Arc<dyn VolumeKernel<T>>],
    face_kernels: &'a [Arc<dyn FaceKernel<T>>],
    local: LocalJacobian<T>,
    cache: JacobianCache<T>,
    elements: usize,
    subdomain_changes: usize,
    boundary_faces: usize,
    internal_faces: usize,
}

impl<'a, T, Mesh, Registry, Fields> JacobianEvaluator<'a, T, Mesh, Registry, Fields>
where
    T: Real,
    Mesh: AssemblyMesh + ?Sized,
    Registry: KernelRegistry<T> + ?Sized,
    Fields: FieldInterpolator<T>,
{
    /// # Panics
    ///
    /// Panics if `cache_batch_size` is zero.
    pub fn new(
        thread_index: usize,
        mesh: &'a Mesh,
        registry: &'a Registry,
        fields: Fields,
        cache_batch_size: usize,
    ) -> Self {
        Self {
            thread_index,
            mesh,
            registry,
            fields,
            filter: KernelFilter::Implicit,
            doing_dg: registry.has_face_kernels(thread_index),
            subdomain: None,
            old_subdomain: None,
            volume_kernels: &[],
            face_kernels: &[],
            local: LocalJacobian::new(),
            cache: JacobianCache::new(cache_batch_size),
            elements: 0,
            subdomain_changes: 0,
            boundary_faces: 0,
            internal_faces: 0,
        }
    }

    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn subdomain(&self) -> Option<SubdomainId> {
        self.subdomain
    }

    pub fn local(&self) -> &LocalJacobian<T> {
        &self.local
    }

    pub fn cache(&self) -> &JacobianCache<T> {
        &self.cache
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            elements: self.elements,
            subdomain_changes: self.subdomain_changes,
            boundary_faces: self.boundary_faces,
            internal_faces: self.internal_faces,
            cached_flushes: self.cache.num_flushes(),
            neighbor_flushes: self.cache.num_neighbor_flushes(),
        }
    }

    /// Tracks the subdomain of the next element and sets up the new subdomain when it changed.
    ///
    /// Returns whether the subdomain changed.
    pub fn pre_element(&mut self, element: &ElementInfo) -> eyre::Result<bool> {
        self.old_subdomain = self.subdomain;
        self.subdomain = Some(element.subdomain);
        if self.subdomain != self.old_subdomain {
            self.subdomain_changed(element.subdomain)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn subdomain_changed(&mut self, subdomain: SubdomainId) -> eyre::Result<()> {
        self.fields.subdomain_setup(subdomain)?;

        self.volume_kernels = self
            .registry
            .volume_kernels(self.thread_index, subdomain, self.filter);
        self.face_kernels = if self.doing_dg {
            self.registry
                .face_kernels(self.thread_index, subdomain, self.filter)
        } else {
            &[]
        };

        let needed = needed_variables(
            self.mesh,
            self.registry,
            self.thread_index,
            subdomain,
            self.filter,
            self.volume_kernels,
            self.face_kernels,
        );
        trace!(
            "Worker {} entered subdomain {} with {} volume kernels, {} face kernels and {} needed variables",
            self.thread_index,
            subdomain,
            self.volume_kernels.len(),
            self.face_kernels.len(),
            needed.len()
        );

        self.fields.set_active_variables(&needed);
        self.fields.prepare_materials(subdomain)?;
        self.subdomain_changes += 1;
        Ok(())
    }

    /// Evaluates the volume kernels of the current subdomain on the element.
    pub fn on_element(&mut self, element: &ElementInfo) -> eyre::Result<()> {
        self.fields.prepare(element)?;
        self.fields.reinit_element(element)?;

        let mut fields = MaterialScope::<T, _>::new(&mut self.fields, MaterialSides::Element);
        fields.reinit_materials(element.subdomain)?;
        if fields.has_scalar_variables() {
            fields.reinit_off_diag_scalars()?;
        }

        for kernel in self.volume_kernels {
            fields.prepare_shapes(kernel.variable())?;
            kernel
                .compute_jacobian(&*fields, &mut self.local)
                .wrap_err_with(|| format!("Volume kernel `{}` failed on element {}", kernel.name(), element.id))?;
        }

        Ok(())
    }

    /// Evaluates the boundary kernels of `boundary` on a side of the element.
    ///
    /// Nothing is reinitialized if no boundary kernels are registered for the boundary.
    /// Returns whether the face was evaluated.
    pub fn on_boundary(&mut self, element: &ElementInfo, side: usize, boundary: BoundaryId) -> eyre::Result<bool> {
        let kernels = self
            .registry
            .boundary_kernels(self.thread_index, boundary, self.filter);
        if kernels.is_empty() {
            return Ok(false);
        }

        self.fields.reinit_element_face(element, side, boundary)?;

        if self.subdomain != self.old_subdomain {
            self.fields.subdomain_setup_side(element.subdomain)?;
        }

        let mut fields = MaterialScope::<T, _>::new(&mut self.fields, MaterialSides::Boundary);
        fields.reinit_materials_face(element.subdomain)?;
        fields.reinit_materials_boundary(boundary)?;
        fields.set_current_boundary(Some(boundary));

        for kernel in kernels {
            if kernel.should_apply() {
                fields.prepare_face_shapes(kernel.variable())?;
                kernel
                    .compute_jacobian(&*fields, &mut self.local)
                    .wrap_err_with(|| {
                        format!(
                            "Boundary kernel `{}` failed on side {} of element {} (boundary {})",
                            kernel.name(),
                            side,
                            element.id,
                            boundary
                        )
                    })?;
            }
        }

        self.boundary_faces += 1;
        Ok(true)
    }

    /// Evaluates the face kernels on the internal face behind a side of the element, if this
    /// element is the one responsible for the face, and flushes the neighbor coupling right away.
    ///
    /// `position` is the position of the element in the traversal range.
    /// Returns whether the face was evaluated.
    pub fn on_internal_side<M>(
        &mut self,
        position: usize,
        element: &ElementInfo,
        side: usize,
        matrix: &Mutex<M>,
    ) -> eyre::Result<bool>
    where
        M: GlobalMatrix<T>,
    {
        if self.face_kernels.is_empty() {
            return Ok(false);
        }

        let Some(neighbor_id) = self.mesh.neighbor(element.id, side) else {
            return Ok(false);
        };
        let neighbor = *self
            .mesh
            .element(neighbor_id)
            .ok_or(AssemblyError::UnknownElement(neighbor_id))?;

        if !should_visit_internal_face(element, &neighbor) {
            return Ok(false);
        }

        self.fields.reinit_neighbor(element, side, &neighbor)?;

        {
            let mut fields = MaterialScope::<T, _>::new(&mut self.fields, MaterialSides::InternalFace);
            fields.reinit_materials_face(element.subdomain)?;
            fields.reinit_materials_neighbor(neighbor.subdomain)?;

            for kernel in self.face_kernels {
                let variable = kernel.variable();
                fields.prepare_face_shapes(variable)?;
                fields.prepare_neighbor_shapes(variable)?;
                kernel
                    .compute_jacobian(&*fields, &mut self.local)
                    .wrap_err_with(|| {
                        format!(
                            "Face kernel `{}` failed on the face between elements {} and {}",
                            kernel.name(),
                            element.id,
                            neighbor.id
                        )
                    })?;
            }
        }

        self.cache
            .flush_neighbor(matrix, FlushOrigin::neighbor(position, side), &mut self.local)?;
        self.internal_faces += 1;
        Ok(true)
    }

    /// Caches the contributions of the element at `position` and flushes if a batch is full.
    pub fn post_element<M>(&mut self, position: usize, matrix: &Mutex<M>) -> eyre::Result<()>
    where
        M: GlobalMatrix<T>,
    {
        self.elements += 1;
        if self.cache.cache_element(position, &mut self.local) {
            self.cache.flush(matrix)?;
        }
        Ok(())
    }

    /// Finishes the worker's range: flushes the remainder of the cache and releases the active
    /// variables.
    pub fn post<M>(&mut self, matrix: &Mutex<M>) -> eyre::Result<()>
    where
        M: GlobalMatrix<T>,
    {
        let flushed = self.cache.flush(matrix);
        self.fields.clear_active_variables();
        flushed.map(|_| ())
    }

    /// Stops the worker without flushing. Pending contributions are dropped and the active
    /// variables are released.
    pub fn abandon(&mut self) {
        self.cache.discard();
        self.fields.clear_active_variables();
    }
}

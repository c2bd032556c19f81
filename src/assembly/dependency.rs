use crate::fields::VariableId;
use crate::mesh::{AssemblyMesh, SubdomainId};
use crate::physics::{FaceKernel, VolumeKernel};
use crate::registry::{KernelFilter, KernelRegistry};
use crate::Real;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Computes the variables needed by the contributions that can be evaluated on a subdomain.
///
/// This is the union of the dependencies of
///
/// - the active volume kernels of the subdomain,
/// - the boundary kernels that currently apply on any boundary touching the subdomain,
/// - the active face kernels (empty unless internal faces are visited).
///
/// Different subdomains activate different physics, so the set is recomputed on every subdomain
/// change.
pub fn needed_variables<T, Mesh, Registry>(
    mesh: &Mesh,
    registry: &Registry,
    thread_index: usize,
    subdomain: SubdomainId,
    filter: KernelFilter,
    volume_kernels: &[Arc<dyn VolumeKernel<T>>],
    face_kernels: &[Arc<dyn FaceKernel<T>>],
) -> BTreeSet<VariableId>
where
    T: Real,
    Mesh: AssemblyMesh + ?Sized,
    Registry: KernelRegistry<T> + ?Sized,
{
    let mut needed = BTreeSet::new();

    for kernel in volume_kernels {
        needed.extend(kernel.variable_dependencies());
    }

    for boundary in mesh.subdomain_boundaries(subdomain) {
        for kernel in registry.boundary_kernels(thread_index, boundary, filter) {
            if kernel.should_apply() {
                needed.extend(kernel.variable_dependencies());
            }
        }
    }

    for kernel in face_kernels {
        needed.extend(kernel.variable_dependencies());
    }

    needed
}

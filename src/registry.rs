//! Classification of physics contributions into the work items of each subdomain and boundary.
use crate::error::AssemblyError;
use crate::mesh::{BoundaryId, SubdomainId};
use crate::physics::{BoundaryKernel, Contribution, FaceKernel, PhysicsContribution, VolumeKernel};
use crate::setup::{SetupHooks, SetupPhase};
use crate::Real;
use eyre::WrapErr;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Selects contributions by their implicit/explicit status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelFilter {
    /// Contributions entering the Jacobian.
    Implicit,
    Explicit,
    Any,
}

impl KernelFilter {
    pub fn accepts(&self, is_implicit: bool) -> bool {
        match self {
            Self::Implicit => is_implicit,
            Self::Explicit => !is_implicit,
            Self::Any => true,
        }
    }
}

/// Where a contribution is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Restriction {
    Everywhere,
    Subdomains(BTreeSet<SubdomainId>),
    Boundaries(BTreeSet<BoundaryId>),
}

impl Restriction {
    pub fn subdomains(ids: impl IntoIterator<Item = SubdomainId>) -> Self {
        Self::Subdomains(ids.into_iter().collect())
    }

    pub fn boundaries(ids: impl IntoIterator<Item = BoundaryId>) -> Self {
        Self::Boundaries(ids.into_iter().collect())
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everywhere => write!(f, "everywhere"),
            Self::Subdomains(ids) => write!(f, "subdomains {{{}}}", ids.iter().join(", ")),
            Self::Boundaries(ids) => write!(f, "boundaries {{{}}}", ids.iter().join(", ")),
        }
    }
}

/// Lookup of the contributions active on a subdomain or boundary.
///
/// Lookups take the index of the calling worker so that registries holding per-thread copies of
/// their objects can serve each worker its own copy. An id without registered contributions
/// yields an empty slice.
pub trait KernelRegistry<T: Real>: SetupHooks + Sync {
    fn volume_kernels(
        &self,
        thread_index: usize,
        subdomain: SubdomainId,
        filter: KernelFilter,
    ) -> &[Arc<dyn VolumeKernel<T>>];

    fn boundary_kernels(
        &self,
        thread_index: usize,
        boundary: BoundaryId,
        filter: KernelFilter,
    ) -> &[Arc<dyn BoundaryKernel<T>>];

    fn face_kernels(&self, thread_index: usize, subdomain: SubdomainId, filter: KernelFilter)
        -> &[Arc<dyn FaceKernel<T>>];

    /// Whether any face kernel is registered, i.e. whether internal faces need to be visited.
    fn has_face_kernels(&self, thread_index: usize) -> bool;
}

/// Contributions of one id, pre-filtered for every [`KernelFilter`].
struct FilteredLists<K: ?Sized> {
    implicit: Vec<Arc<K>>,
    explicit: Vec<Arc<K>>,
    any: Vec<Arc<K>>,
}

impl<K: ?Sized> Default for FilteredLists<K> {
    fn default() -> Self {
        Self {
            implicit: Vec::new(),
            explicit: Vec::new(),
            any: Vec::new(),
        }
    }
}

impl<K: ?Sized> Clone for FilteredLists<K> {
    fn clone(&self) -> Self {
        Self {
            implicit: self.implicit.clone(),
            explicit: self.explicit.clone(),
            any: self.any.clone(),
        }
    }
}

impl<K: ?Sized> FilteredLists<K> {
    fn push(&mut self, kernel: &Arc<K>, is_implicit: bool) {
        for filter in [KernelFilter::Implicit, KernelFilter::Explicit, KernelFilter::Any] {
            if filter.accepts(is_implicit) {
                self.list_mut(filter).push(Arc::clone(kernel));
            }
        }
    }

    fn list_mut(&mut self, filter: KernelFilter) -> &mut Vec<Arc<K>> {
        match filter {
            KernelFilter::Implicit => &mut self.implicit,
            KernelFilter::Explicit => &mut self.explicit,
            KernelFilter::Any => &mut self.any,
        }
    }

    fn get(&self, filter: KernelFilter) -> &[Arc<K>] {
        match filter {
            KernelFilter::Implicit => &self.implicit,
            KernelFilter::Explicit => &self.explicit,
            KernelFilter::Any => &self.any,
        }
    }
}

/// Contributions that are either active everywhere or on selected subdomains.
struct SubdomainLists<K: ?Sized> {
    everywhere: FilteredLists<K>,
    by_subdomain: FxHashMap<SubdomainId, FilteredLists<K>>,
}

impl<K: ?Sized> Default for SubdomainLists<K> {
    fn default() -> Self {
        Self {
            everywhere: FilteredLists::default(),
            by_subdomain: FxHashMap::default(),
        }
    }
}

impl<K: ?Sized> SubdomainLists<K> {
    fn add_everywhere(&mut self, kernel: &Arc<K>, is_implicit: bool) {
        self.everywhere.push(kernel, is_implicit);
        for lists in self.by_subdomain.values_mut() {
            lists.push(kernel, is_implicit);
        }
    }

    fn add_to(&mut self, subdomains: &BTreeSet<SubdomainId>, kernel: &Arc<K>, is_implicit: bool) {
        for subdomain in subdomains {
            // A subdomain seen for the first time inherits everything registered everywhere so far,
            // which keeps each list in registration order
            let everywhere = &self.everywhere;
            self.by_subdomain
                .entry(*subdomain)
                .or_insert_with(|| everywhere.clone())
                .push(kernel, is_implicit);
        }
    }

    fn is_empty(&self) -> bool {
        self.everywhere.any.is_empty() && self.by_subdomain.is_empty()
    }

    fn get(&self, subdomain: SubdomainId, filter: KernelFilter) -> &[Arc<K>] {
        self.by_subdomain
            .get(&subdomain)
            .unwrap_or(&self.everywhere)
            .get(filter)
    }
}

/// Registry of all physics contributions of a problem.
///
/// Contributions are classified when they are added, so that lookups during assembly return
/// pre-filtered lists in registration order without scanning inactive objects.
pub struct KernelWarehouse<T: Real> {
    all: Vec<PhysicsContribution<T>>,
    volume: SubdomainLists<dyn VolumeKernel<T>>,
    face: SubdomainLists<dyn FaceKernel<T>>,
    boundary: FxHashMap<BoundaryId, FilteredLists<dyn BoundaryKernel<T>>>,
    general: Vec<Arc<dyn Contribution>>,
}

impl<T: Real> Default for KernelWarehouse<T> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            volume: SubdomainLists::default(),
            face: SubdomainLists::default(),
            boundary: FxHashMap::default(),
            general: Vec::new(),
        }
    }
}

impl<T: Real> fmt::Debug for KernelWarehouse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelWarehouse")
            .field("contributions", &self.all.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl<T: Real> KernelWarehouse<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a contribution.
    ///
    /// Volume and face kernels may be restricted to subdomains, boundary kernels must be restricted
    /// to a non-empty set of boundaries, and general contributions accept any restriction.
    pub fn add(&mut self, contribution: PhysicsContribution<T>, restriction: Restriction) -> Result<(), AssemblyError> {
        let invalid = || AssemblyError::InvalidRestriction {
            name: contribution.name().to_string(),
            category: contribution.category(),
            restriction: restriction.to_string(),
        };

        match (&contribution, &restriction) {
            (PhysicsContribution::Volume(kernel), Restriction::Everywhere) => {
                self.volume.add_everywhere(kernel, kernel.is_implicit());
            }
            (PhysicsContribution::Volume(kernel), Restriction::Subdomains(ids)) if !ids.is_empty() => {
                self.volume.add_to(ids, kernel, kernel.is_implicit());
            }
            (PhysicsContribution::Face(kernel), Restriction::Everywhere) => {
                self.face.add_everywhere(kernel, kernel.is_implicit());
            }
            (PhysicsContribution::Face(kernel), Restriction::Subdomains(ids)) if !ids.is_empty() => {
                self.face.add_to(ids, kernel, kernel.is_implicit());
            }
            (PhysicsContribution::Boundary(kernel), Restriction::Boundaries(ids)) if !ids.is_empty() => {
                for id in ids {
                    self.boundary
                        .entry(*id)
                        .or_default()
                        .push(kernel, kernel.is_implicit());
                }
            }
            (PhysicsContribution::General(object), _) => {
                self.general.push(Arc::clone(object));
            }
            _ => return Err(invalid()),
        }

        self.all.push(contribution);
        Ok(())
    }

    /// All contributions in registration order.
    pub fn contributions(&self) -> &[PhysicsContribution<T>] {
        &self.all
    }

    pub fn general_contributions(&self) -> &[Arc<dyn Contribution>] {
        &self.general
    }

    fn broadcast(&self, phase: SetupPhase) -> eyre::Result<()> {
        for contribution in &self.all {
            contribution.setup(phase).wrap_err_with(|| {
                format!(
                    "{:?} setup of {} `{}` failed",
                    phase,
                    contribution.category(),
                    contribution.name()
                )
            })?;
        }
        Ok(())
    }
}

impl<T: Real> SetupHooks for KernelWarehouse<T> {
    fn initial_setup(&self) -> eyre::Result<()> {
        self.broadcast(SetupPhase::Initial)
    }

    fn timestep_setup(&self) -> eyre::Result<()> {
        self.broadcast(SetupPhase::Timestep)
    }

    fn residual_setup(&self) -> eyre::Result<()> {
        self.broadcast(SetupPhase::Residual)
    }

    fn jacobian_setup(&self) -> eyre::Result<()> {
        self.broadcast(SetupPhase::Jacobian)
    }
}

impl<T: Real> KernelRegistry<T> for KernelWarehouse<T> {
    fn volume_kernels(
        &self,
        _thread_index: usize,
        subdomain: SubdomainId,
        filter: KernelFilter,
    ) -> &[Arc<dyn VolumeKernel<T>>] {
        self.volume.get(subdomain, filter)
    }

    fn boundary_kernels(
        &self,
        _thread_index: usize,
        boundary: BoundaryId,
        filter: KernelFilter,
    ) -> &[Arc<dyn BoundaryKernel<T>>] {
        self.boundary
            .get(&boundary)
            .map(|lists| lists.get(filter))
            .unwrap_or(&[])
    }

    fn face_kernels(
        &self,
        _thread_index: usize,
        subdomain: SubdomainId,
        filter: KernelFilter,
    ) -> &[Arc<dyn FaceKernel<T>>] {
        self.face.get(subdomain, filter)
    }

    fn has_face_kernels(&self, _thread_index: usize) -> bool {
        !self.face.is_empty()
    }
}

//! Element, subdomain and boundary queries needed by the element loop.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub mod procedural;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// Label of a partition of elements sharing the same active physics.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubdomainId(pub u32);

/// Label of a set of element sides.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundaryId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SubdomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementInfo {
    pub id: ElementId,
    /// Refinement depth. Coarser elements have smaller levels.
    pub level: u32,
    /// Whether the element is part of the current discretization (i.e. not refined away).
    pub active: bool,
    pub subdomain: SubdomainId,
}

/// Mesh queries consumed by the element loop.
///
/// The assembly only reads the mesh, and all workers read it concurrently.
pub trait AssemblyMesh: Sync {
    /// The active elements, in traversal order.
    ///
    /// This is the range partitioned among the workers of an assembly pass.
    fn active_elements(&self) -> &[ElementId];

    fn element(&self, id: ElementId) -> Option<&ElementInfo>;

    fn num_sides(&self, id: ElementId) -> usize;

    /// The element on the other side of the given side, if any.
    ///
    /// Across a coarse/fine interface, the neighbor of the fine element is the coarse element,
    /// while the neighbor of the coarse element is the inactive parent of the fine elements.
    fn neighbor(&self, id: ElementId, side: usize) -> Option<ElementId>;

    /// Boundaries the side belongs to. Most sides belong to none.
    fn side_boundaries(&self, id: ElementId, side: usize) -> &[BoundaryId];

    /// Boundaries touching at least one side of an element in the subdomain, in ascending order.
    fn subdomain_boundaries(&self, subdomain: SubdomainId) -> Vec<BoundaryId>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideInfo {
    pub neighbor: Option<ElementId>,
    pub boundaries: Vec<BoundaryId>,
    /// Area (length in 2D, 1 in 1D) of the side.
    pub measure: f64,
}

/// A mesh described purely by element records and side adjacency.
///
/// Element ids are the indices of the elements in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMesh {
    elements: Vec<ElementInfo>,
    element_measures: Vec<f64>,
    sides: Vec<Vec<SideInfo>>,
    active_elements: Vec<ElementId>,
    subdomain_boundaries: BTreeMap<SubdomainId, BTreeSet<BoundaryId>>,
}

impl ElementMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[ElementInfo] {
        &self.elements
    }

    /// Adds an active element with unit measure and no neighbors.
    pub fn add_element(&mut self, level: u32, subdomain: SubdomainId, num_sides: usize) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(ElementInfo {
            id,
            level,
            active: true,
            subdomain,
        });
        self.element_measures.push(1.0);
        self.sides.push(vec![
            SideInfo {
                neighbor: None,
                boundaries: Vec::new(),
                measure: 1.0,
            };
            num_sides
        ]);
        self.active_elements.push(id);
        id
    }

    /// # Panics
    ///
    /// Panics if the element does not exist.
    pub fn set_active(&mut self, id: ElementId, active: bool) {
        self.elements[id.0].active = active;
        self.active_elements = self
            .elements
            .iter()
            .filter(|element| element.active)
            .map(|element| element.id)
            .collect();
    }

    /// # Panics
    ///
    /// Panics if the element does not exist.
    pub fn set_subdomain(&mut self, id: ElementId, subdomain: SubdomainId) {
        self.elements[id.0].subdomain = subdomain;
        self.rebuild_subdomain_boundaries();
    }

    /// Makes `a` and `b` neighbors across the given sides.
    ///
    /// # Panics
    ///
    /// Panics if either element or side does not exist.
    pub fn connect(&mut self, a: ElementId, side_a: usize, b: ElementId, side_b: usize) {
        self.set_neighbor(a, side_a, b);
        self.set_neighbor(b, side_b, a);
    }

    /// Sets the neighbor across a side without touching the neighbor's sides.
    ///
    /// # Panics
    ///
    /// Panics if the element or side does not exist.
    pub fn set_neighbor(&mut self, id: ElementId, side: usize, neighbor: ElementId) {
        self.sides[id.0][side].neighbor = Some(neighbor);
    }

    /// # Panics
    ///
    /// Panics if the element or side does not exist.
    pub fn add_boundary_side(&mut self, id: ElementId, side: usize, boundary: BoundaryId) {
        let boundaries = &mut self.sides[id.0][side].boundaries;
        if !boundaries.contains(&boundary) {
            boundaries.push(boundary);
        }
        let subdomain = self.elements[id.0].subdomain;
        self.subdomain_boundaries
            .entry(subdomain)
            .or_default()
            .insert(boundary);
    }

    pub fn set_element_measure(&mut self, id: ElementId, measure: f64) {
        self.element_measures[id.0] = measure;
    }

    pub fn set_side_measure(&mut self, id: ElementId, side: usize, measure: f64) {
        self.sides[id.0][side].measure = measure;
    }

    /// Volume (area in 2D, length in 1D) of the element.
    ///
    /// # Panics
    ///
    /// Panics if the element does not exist.
    pub fn element_measure(&self, id: ElementId) -> f64 {
        self.element_measures[id.0]
    }

    /// # Panics
    ///
    /// Panics if the element or side does not exist.
    pub fn side(&self, id: ElementId, side: usize) -> &SideInfo {
        &self.sides[id.0][side]
    }

    fn rebuild_subdomain_boundaries(&mut self) {
        self.subdomain_boundaries.clear();
        for (element, sides) in self.elements.iter().zip(&self.sides) {
            for side in sides {
                for &boundary in &side.boundaries {
                    self.subdomain_boundaries
                        .entry(element.subdomain)
                        .or_default()
                        .insert(boundary);
                }
            }
        }
    }
}

impl AssemblyMesh for ElementMesh {
    fn active_elements(&self) -> &[ElementId] {
        &self.active_elements
    }

    fn element(&self, id: ElementId) -> Option<&ElementInfo> {
        self.elements.get(id.0)
    }

    fn num_sides(&self, id: ElementId) -> usize {
        self.sides.get(id.0).map(Vec::len).unwrap_or(0)
    }

    fn neighbor(&self, id: ElementId, side: usize) -> Option<ElementId> {
        self.sides.get(id.0)?.get(side)?.neighbor
    }

    fn side_boundaries(&self, id: ElementId, side: usize) -> &[BoundaryId] {
        self.sides
            .get(id.0)
            .and_then(|sides| sides.get(side))
            .map(|side| side.boundaries.as_slice())
            .unwrap_or(&[])
    }

    fn subdomain_boundaries(&self, subdomain: SubdomainId) -> Vec<BoundaryId> {
        self.subdomain_boundaries
            .get(&subdomain)
            .map(|boundaries| boundaries.iter().copied().collect())
            .unwrap_or_default()
    }
}

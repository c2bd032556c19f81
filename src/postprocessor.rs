//! Registry of postprocessors taking part in the solve lifecycle.
//!
//! Postprocessors are not evaluated by the Jacobian loop, but they receive the same lifecycle
//! callbacks as the physics contributions. The warehouse indexes them by the blocks and
//! boundaries they are restricted to.
use crate::error::{AssemblyError, Location, PostprocessorKind};
use crate::mesh::{BoundaryId, SubdomainId};
use crate::setup::{SetupHooks, SetupPhase};
use eyre::WrapErr;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub trait Postprocessor: SetupHooks + Send + Sync {
    fn name(&self) -> &str;
}

/// The category of a postprocessor together with its restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostprocessorEntry {
    /// Integrates over the elements of the given blocks.
    Element { blocks: BTreeSet<SubdomainId> },
    /// Integrates over the sides on the given boundaries.
    Side { boundaries: BTreeSet<BoundaryId> },
    /// Integrates over internal sides of the given blocks.
    InternalSide { blocks: BTreeSet<SubdomainId> },
    /// Evaluated on nodes. Block restricted if `blocks` is given, otherwise restricted to the
    /// nodes of `boundaries`.
    Nodal {
        blocks: Option<BTreeSet<SubdomainId>>,
        boundaries: BTreeSet<BoundaryId>,
    },
    General,
}

type Shared = Arc<dyn Postprocessor>;

#[derive(Default)]
pub struct PostprocessorWarehouse {
    all: Vec<Shared>,

    all_element: Vec<Shared>,
    all_side: Vec<Shared>,
    all_internal_side: Vec<Shared>,
    all_nodal: Vec<Shared>,
    general: Vec<Shared>,

    element: BTreeMap<SubdomainId, Vec<Shared>>,
    side: BTreeMap<BoundaryId, Vec<Shared>>,
    internal_side: BTreeMap<SubdomainId, Vec<Shared>>,
    nodal: BTreeMap<BoundaryId, Vec<Shared>>,
    block_nodal: BTreeMap<SubdomainId, Vec<Shared>>,

    block_ids: BTreeSet<SubdomainId>,
    boundary_ids: BTreeSet<BoundaryId>,
    block_ids_with_nodal: BTreeSet<SubdomainId>,
    nodeset_ids: BTreeSet<BoundaryId>,
}

impl fmt::Debug for PostprocessorWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostprocessorWarehouse")
            .field("postprocessors", &self.all.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

fn lookup<'a, K: Ord>(
    map: &'a BTreeMap<K, Vec<Shared>>,
    key: K,
    kind: PostprocessorKind,
    location: Location,
) -> Result<&'a [Shared], AssemblyError> {
    map.get(&key)
        .map(Vec::as_slice)
        .ok_or(AssemblyError::NoPostprocessors { kind, location })
}

impl PostprocessorWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a postprocessor. Names must be unique.
    pub fn add(
        &mut self,
        postprocessor: Arc<dyn Postprocessor>,
        entry: PostprocessorEntry,
    ) -> Result<(), AssemblyError> {
        if self.get(postprocessor.name()).is_some() {
            return Err(AssemblyError::DuplicateName(postprocessor.name().to_string()));
        }

        match entry {
            PostprocessorEntry::Element { blocks } => {
                self.all_element.push(Arc::clone(&postprocessor));
                for block in blocks {
                    self.element
                        .entry(block)
                        .or_default()
                        .push(Arc::clone(&postprocessor));
                    self.block_ids.insert(block);
                }
            }
            PostprocessorEntry::Side { boundaries } => {
                self.all_side.push(Arc::clone(&postprocessor));
                for boundary in boundaries {
                    self.side
                        .entry(boundary)
                        .or_default()
                        .push(Arc::clone(&postprocessor));
                    self.boundary_ids.insert(boundary);
                }
            }
            PostprocessorEntry::InternalSide { blocks } => {
                self.all_internal_side.push(Arc::clone(&postprocessor));
                for block in blocks {
                    self.internal_side
                        .entry(block)
                        .or_default()
                        .push(Arc::clone(&postprocessor));
                    self.block_ids.insert(block);
                }
            }
            PostprocessorEntry::Nodal { blocks, boundaries } => {
                self.all_nodal.push(Arc::clone(&postprocessor));
                match blocks {
                    Some(blocks) => {
                        for block in blocks {
                            self.block_nodal
                                .entry(block)
                                .or_default()
                                .push(Arc::clone(&postprocessor));
                            self.block_ids_with_nodal.insert(block);
                        }
                    }
                    None => {
                        for boundary in boundaries {
                            self.nodal
                                .entry(boundary)
                                .or_default()
                                .push(Arc::clone(&postprocessor));
                            self.nodeset_ids.insert(boundary);
                        }
                    }
                }
            }
            PostprocessorEntry::General => self.general.push(Arc::clone(&postprocessor)),
        }

        self.all.push(postprocessor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Postprocessor>> {
        self.all.iter().find(|p| p.name() == name)
    }

    /// All postprocessors in registration order.
    pub fn postprocessors(&self) -> &[Arc<dyn Postprocessor>] {
        &self.all
    }

    pub fn element_postprocessors(&self, block: SubdomainId) -> Result<&[Arc<dyn Postprocessor>], AssemblyError> {
        lookup(&self.element, block, PostprocessorKind::Element, Location::Block(block))
    }

    pub fn side_postprocessors(&self, boundary: BoundaryId) -> Result<&[Arc<dyn Postprocessor>], AssemblyError> {
        lookup(&self.side, boundary, PostprocessorKind::Side, Location::Boundary(boundary))
    }

    pub fn internal_side_postprocessors(
        &self,
        block: SubdomainId,
    ) -> Result<&[Arc<dyn Postprocessor>], AssemblyError> {
        lookup(
            &self.internal_side,
            block,
            PostprocessorKind::InternalSide,
            Location::Block(block),
        )
    }

    pub fn nodal_postprocessors(&self, boundary: BoundaryId) -> Result<&[Arc<dyn Postprocessor>], AssemblyError> {
        lookup(&self.nodal, boundary, PostprocessorKind::Nodal, Location::Boundary(boundary))
    }

    pub fn block_nodal_postprocessors(&self, block: SubdomainId) -> Result<&[Arc<dyn Postprocessor>], AssemblyError> {
        lookup(
            &self.block_nodal,
            block,
            PostprocessorKind::BlockNodal,
            Location::Block(block),
        )
    }

    pub fn general_postprocessors(&self) -> &[Arc<dyn Postprocessor>] {
        &self.general
    }

    /// Blocks with element or internal side postprocessors.
    pub fn block_ids_with_postprocessors(&self) -> &BTreeSet<SubdomainId> {
        &self.block_ids
    }

    pub fn boundary_ids_with_postprocessors(&self) -> &BTreeSet<BoundaryId> {
        &self.boundary_ids
    }

    pub fn block_ids_with_nodal_postprocessors(&self) -> &BTreeSet<SubdomainId> {
        &self.block_ids_with_nodal
    }

    pub fn nodeset_ids_with_postprocessors(&self) -> &BTreeSet<BoundaryId> {
        &self.nodeset_ids
    }

    fn broadcast(&self, phase: SetupPhase) -> eyre::Result<()> {
        let ordered = self
            .all_element
            .iter()
            .chain(&self.all_nodal)
            .chain(&self.all_side)
            .chain(&self.all_internal_side)
            .chain(&self.general);
        for postprocessor in ordered {
            postprocessor
                .setup(phase)
                .wrap_err_with(|| format!("{:?} setup of postprocessor `{}` failed", phase, postprocessor.name()))?;
        }
        Ok(())
    }
}

impl SetupHooks for PostprocessorWarehouse {
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

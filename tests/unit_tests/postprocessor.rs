use femloop::error::{AssemblyError, Location, PostprocessorKind};
use femloop::mesh::{BoundaryId, SubdomainId};
use femloop::postprocessor::{Postprocessor, PostprocessorEntry, PostprocessorWarehouse};
use femloop::setup::{SetupHooks, SetupPhase};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

type SetupLog = Arc<Mutex<Vec<(String, SetupPhase)>>>;

struct Recorder {
    name: String,
    log: SetupLog,
    fail: bool,
}

impl Recorder {
    fn new(name: &str, log: &SetupLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
            fail: false,
        })
    }
}

impl SetupHooks for Recorder {
    fn setup(&self, phase: SetupPhase) -> eyre::Result<()> {
        self.log.lock().push((self.name.clone(), phase));
        if self.fail {
            eyre::bail!("Recorder `{}` failed", self.name);
        }
        Ok(())
    }
}

impl Postprocessor for Recorder {
    fn name(&self) -> &str {
        &self.name
    }
}

fn blocks(ids: &[u32]) -> BTreeSet<SubdomainId> {
    ids.iter().copied().map(SubdomainId).collect()
}

fn boundaries(ids: &[u32]) -> BTreeSet<BoundaryId> {
    ids.iter().copied().map(BoundaryId).collect()
}

fn names(postprocessors: &[Arc<dyn Postprocessor>]) -> Vec<&str> {
    postprocessors.iter().map(|p| p.name()).collect()
}

fn warehouse(log: &SetupLog) -> PostprocessorWarehouse {
    let mut warehouse = PostprocessorWarehouse::new();
    warehouse
        .add(Recorder::new("general", log), PostprocessorEntry::General)
        .unwrap();
    warehouse
        .add(Recorder::new("flux", log), PostprocessorEntry::Side { boundaries: boundaries(&[1, 2]) })
        .unwrap();
    warehouse
        .add(Recorder::new("jump", log), PostprocessorEntry::InternalSide { blocks: blocks(&[0]) })
        .unwrap();
    warehouse
        .add(
            Recorder::new("block_nodes", log),
            PostprocessorEntry::Nodal {
                blocks: Some(blocks(&[3])),
                boundaries: boundaries(&[4]),
            },
        )
        .unwrap();
    warehouse
        .add(
            Recorder::new("boundary_nodes", log),
            PostprocessorEntry::Nodal {
                blocks: None,
                boundaries: boundaries(&[4]),
            },
        )
        .unwrap();
    warehouse
        .add(Recorder::new("volume", log), PostprocessorEntry::Element { blocks: blocks(&[0, 1]) })
        .unwrap();
    warehouse
        .add(Recorder::new("energy", log), PostprocessorEntry::Element { blocks: blocks(&[1]) })
        .unwrap();
    warehouse
}

#[test]
fn postprocessors_are_indexed_by_restriction() {
    let log = SetupLog::default();
    let warehouse = warehouse(&log);

    assert_eq!(names(warehouse.element_postprocessors(SubdomainId(0)).unwrap()), ["volume"]);
    assert_eq!(
        names(warehouse.element_postprocessors(SubdomainId(1)).unwrap()),
        ["volume", "energy"]
    );
    assert_eq!(names(warehouse.side_postprocessors(BoundaryId(2)).unwrap()), ["flux"]);
    assert_eq!(
        names(warehouse.internal_side_postprocessors(SubdomainId(0)).unwrap()),
        ["jump"]
    );
    assert_eq!(names(warehouse.general_postprocessors()), ["general"]);
    assert_eq!(warehouse.postprocessors().len(), 7);
}

#[test]
fn nodal_postprocessors_are_block_or_boundary_restricted() {
    let log = SetupLog::default();
    let warehouse = warehouse(&log);

    // A block restriction takes precedence over the boundaries
    assert_eq!(
        names(warehouse.block_nodal_postprocessors(SubdomainId(3)).unwrap()),
        ["block_nodes"]
    );
    assert_eq!(
        names(warehouse.nodal_postprocessors(BoundaryId(4)).unwrap()),
        ["boundary_nodes"]
    );
}

#[test]
fn lookups_without_postprocessors_fail() {
    let log = SetupLog::default();
    let warehouse = warehouse(&log);

    let err = warehouse.element_postprocessors(SubdomainId(7)).err().unwrap();
    assert_eq!(
        err,
        AssemblyError::NoPostprocessors {
            kind: PostprocessorKind::Element,
            location: Location::Block(SubdomainId(7)),
        }
    );
    assert_eq!(err.to_string(), "No element postprocessors on block 7");

    let err = warehouse.side_postprocessors(BoundaryId(0)).err().unwrap();
    assert_eq!(err.to_string(), "No side postprocessors on boundary 0");

    let err = warehouse
        .internal_side_postprocessors(SubdomainId(1))
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "No internal side postprocessors on block 1");

    let err = warehouse.nodal_postprocessors(BoundaryId(1)).err().unwrap();
    assert_eq!(err.to_string(), "No nodal postprocessors on boundary 1");

    let err = warehouse
        .block_nodal_postprocessors(SubdomainId(0))
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "No block nodal postprocessors on block 0");
}

#[test]
fn id_sets_list_restricted_locations() {
    let log = SetupLog::default();
    let warehouse = warehouse(&log);

    assert_eq!(warehouse.block_ids_with_postprocessors(), &blocks(&[0, 1]));
    assert_eq!(warehouse.boundary_ids_with_postprocessors(), &boundaries(&[1, 2]));
    assert_eq!(warehouse.block_ids_with_nodal_postprocessors(), &blocks(&[3]));
    assert_eq!(warehouse.nodeset_ids_with_postprocessors(), &boundaries(&[4]));
}

#[test]
fn names_must_be_unique() {
    let log = SetupLog::default();
    let mut warehouse = warehouse(&log);

    let err = warehouse
        .add(Recorder::new("flux", &log), PostprocessorEntry::General)
        .unwrap_err();
    assert_eq!(err, AssemblyError::DuplicateName("flux".to_string()));
    assert_eq!(warehouse.postprocessors().len(), 7);
    assert!(warehouse.general_postprocessors().len() == 1);

    assert_eq!(warehouse.get("jump").map(|p| p.name()), Some("jump"));
    assert!(warehouse.get("missing").is_none());
}

#[test]
fn setup_is_broadcast_by_category() {
    let log = SetupLog::default();
    let warehouse = warehouse(&log);

    warehouse.jacobian_setup().unwrap();
    let calls: Vec<_> = log.lock().iter().map(|(name, _)| name.clone()).collect();
    assert_eq!(
        calls,
        ["volume", "energy", "block_nodes", "boundary_nodes", "flux", "jump", "general"]
    );
    assert!(log
        .lock()
        .iter()
        .all(|(_, phase)| *phase == SetupPhase::Jacobian));

    log.lock().clear();
    warehouse.setup(SetupPhase::Timestep).unwrap();
    assert_eq!(log.lock().len(), 7);
    assert!(log
        .lock()
        .iter()
        .all(|(_, phase)| *phase == SetupPhase::Timestep));
}

#[test]
fn failing_setup_stops_the_broadcast() {
    let log = SetupLog::default();
    let mut warehouse = PostprocessorWarehouse::new();
    warehouse
        .add(
            Arc::new(Recorder {
                name: "broken".to_string(),
                log: Arc::clone(&log),
                fail: true,
            }),
            PostprocessorEntry::Element { blocks: blocks(&[0]) },
        )
        .unwrap();
    warehouse
        .add(Recorder::new("after", &log), PostprocessorEntry::General)
        .unwrap();

    let err = warehouse.initial_setup().unwrap_err();
    assert_eq!(err.to_string(), "Initial setup of postprocessor `broken` failed");
    assert_eq!(log.lock().len(), 1);
}

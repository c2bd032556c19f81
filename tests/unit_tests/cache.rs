use crate::unit_tests::mock::RecordingMatrix;
use femloop::assembly::{JacobianCache, LocalJacobian};
use femloop::matrix::FlushOrigin;
use femloop::nalgebra::DMatrix;
use parking_lot::Mutex;
use proptest::prelude::*;

fn local_with_entry(dof: usize) -> LocalJacobian<f64> {
    let mut local = LocalJacobian::new();
    local.add_element_block(&[dof], &[dof], &DMatrix::from_element(1, 1, 1.0));
    local
}

/// Runs `num_elements` elements through a cache the way a worker does.
fn run_worker(num_elements: usize, batch_size: usize) -> (JacobianCache<f64>, RecordingMatrix) {
    let matrix = Mutex::new(RecordingMatrix::default());
    let mut cache = JacobianCache::new(batch_size);
    for position in 0..num_elements {
        let mut local = local_with_entry(position);
        if cache.cache_element(position, &mut local) {
            assert!(cache.flush(&matrix).unwrap());
        }
        assert!(local.is_empty());
    }
    cache.flush(&matrix).unwrap();
    (cache, matrix.into_inner())
}

#[test]
fn forty_five_elements_are_flushed_in_three_batches() {
    let (cache, matrix) = run_worker(45, 20);

    assert_eq!(cache.num_flushes(), 3);
    assert_eq!(cache.num_cached(), 45);
    let origins: Vec<_> = matrix.cached.iter().map(|(origin, _)| *origin).collect();
    assert_eq!(
        origins,
        [FlushOrigin::batch(0), FlushOrigin::batch(20), FlushOrigin::batch(40)]
    );
    let sizes: Vec<_> = matrix.cached.iter().map(|(_, entries)| entries.len()).collect();
    assert_eq!(sizes, [20, 20, 5]);
}

#[test]
fn flushing_without_pending_elements_is_a_no_op() {
    let matrix = Mutex::new(RecordingMatrix::default());
    let mut cache = JacobianCache::<f64>::new(20);
    assert!(!cache.has_pending());
    assert!(!cache.flush(&matrix).unwrap());
    assert_eq!(cache.num_flushes(), 0);
    assert!(matrix.lock().cached.is_empty());
}

#[test]
fn exact_multiples_of_the_batch_size_need_no_final_flush() {
    let (cache, matrix) = run_worker(40, 20);
    assert_eq!(cache.num_flushes(), 2);
    assert_eq!(matrix.cached.len(), 2);
    assert!(!cache.has_pending());
}

#[test]
fn discarded_entries_never_reach_the_matrix() {
    let matrix = Mutex::new(RecordingMatrix::default());
    let mut cache = JacobianCache::new(20);
    for position in 0..3 {
        cache.cache_element(position, &mut local_with_entry(position));
    }
    assert!(cache.has_pending());

    cache.discard();
    assert!(!cache.has_pending());
    assert!(!cache.flush(&matrix).unwrap());
    assert!(matrix.into_inner().cached.is_empty());
}

#[test]
fn neighbor_flushes_bypass_the_cache() {
    let matrix = Mutex::new(RecordingMatrix::default());
    let mut cache = JacobianCache::new(20);
    let mut local = local_with_entry(0);
    local.add_block(
        femloop::assembly::Coupling::ElementNeighbor,
        &[0],
        &[1],
        &DMatrix::from_element(1, 1, -1.0),
    );

    cache
        .flush_neighbor(&matrix, FlushOrigin::neighbor(0, 1), &mut local)
        .unwrap();
    assert_eq!(cache.num_neighbor_flushes(), 1);
    assert!(local.neighbor_entries().is_empty());
    assert_eq!(local.element_entries(), &[(0, 0, 1.0)]);
    assert!(!cache.has_pending());

    let matrix = matrix.into_inner();
    assert!(matrix.cached.is_empty());
    assert_eq!(matrix.neighbor, vec![(FlushOrigin::neighbor(0, 1), vec![(0, 1, -1.0)])]);
}

#[test]
#[should_panic]
fn zero_batch_size_is_rejected() {
    let _ = JacobianCache::<f64>::new(0);
}

proptest! {
    #[test]
    fn every_cached_element_is_flushed_exactly_once(num_elements in 0..200usize, batch_size in 1..30usize) {
        let (cache, matrix) = run_worker(num_elements, batch_size);

        let expected_flushes = (num_elements + batch_size - 1) / batch_size;
        prop_assert_eq!(cache.num_flushes(), expected_flushes);
        prop_assert_eq!(matrix.cached.len(), expected_flushes);

        let flushed: Vec<usize> = matrix
            .cached
            .iter()
            .flat_map(|(_, entries)| entries.iter().map(|&(row, _, _)| row))
            .collect();
        prop_assert_eq!(flushed, (0..num_elements).collect::<Vec<_>>());

        for (i, (origin, entries)) in matrix.cached.iter().enumerate() {
            prop_assert_eq!(*origin, FlushOrigin::batch(i * batch_size));
            prop_assert!(entries.len() <= batch_size);
        }
    }
}

use crate::assembly::LocalJacobian;
use crate::matrix::{FlushOrigin, GlobalMatrix, MatrixEntry};
use crate::Real;
use log::trace;
use parking_lot::Mutex;

/// Per-worker cache of element contributions awaiting a flush into the global matrix.
///
/// Flushing after every element would serialize all workers on the matrix lock, while never
/// flushing would let the cache grow with the size of the worker's range. The cache therefore
/// flushes once every `batch_size` elements, plus once at the end of the range for any remainder.
#[derive(Debug, Clone)]
pub struct JacobianCache<T> {
    batch_size: usize,
    entries: Vec<MatrixEntry<T>>,
    num_cached: usize,
    batch_start: Option<usize>,
    num_flushes: usize,
    num_neighbor_flushes: usize,
}

impl<T: Real> JacobianCache<T> {
    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "Batch size must be positive");
        Self {
            batch_size,
            entries: Vec::new(),
            num_cached: 0,
            batch_start: None,
            num_flushes: 0,
            num_neighbor_flushes: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The number of elements cached so far.
    pub fn num_cached(&self) -> usize {
        self.num_cached
    }

    /// The number of batch flushes so far, including a final flush.
    pub fn num_flushes(&self) -> usize {
        self.num_flushes
    }

    pub fn num_neighbor_flushes(&self) -> usize {
        self.num_neighbor_flushes
    }

    /// Whether elements were cached since the last flush.
    pub fn has_pending(&self) -> bool {
        self.batch_start.is_some()
    }

    pub fn pending_entries(&self) -> &[MatrixEntry<T>] {
        &self.entries
    }

    /// Moves the element/element entries of the element at `position` into the cache.
    ///
    /// Returns `true` when the cache holds a full batch and should be flushed.
    pub fn cache_element(&mut self, position: usize, local: &mut LocalJacobian<T>) -> bool {
        self.batch_start.get_or_insert(position);
        local.drain_element_into(&mut self.entries);
        self.num_cached += 1;
        self.num_cached % self.batch_size == 0
    }

    /// Adds all pending entries to the matrix in a single critical section.
    ///
    /// Returns `false` without locking if nothing is pending.
    pub fn flush<M>(&mut self, matrix: &Mutex<M>) -> eyre::Result<bool>
    where
        M: GlobalMatrix<T>,
    {
        let Some(first_position) = self.batch_start else {
            return Ok(false);
        };

        let origin = FlushOrigin::batch(first_position);
        {
            let mut matrix = matrix.lock();
            matrix.add_cached(origin, &self.entries)?;
        }
        trace!(
            "Flushed {} cached entries starting at position {}",
            self.entries.len(),
            first_position
        );

        self.entries.clear();
        self.batch_start = None;
        self.num_flushes += 1;
        Ok(true)
    }

    /// Drops all pending entries without touching the matrix.
    pub fn discard(&mut self) {
        self.entries.clear();
        self.batch_start = None;
    }

    /// Adds the neighbor coupling entries of an internal face to the matrix right away.
    pub fn flush_neighbor<M>(
        &mut self,
        matrix: &Mutex<M>,
        origin: FlushOrigin,
        local: &mut LocalJacobian<T>,
    ) -> eyre::Result<()>
    where
        M: GlobalMatrix<T>,
    {
        {
            let mut matrix = matrix.lock();
            matrix.add_neighbor(origin, local.neighbor_entries())?;
        }
        local.clear_neighbor();
        self.num_neighbor_flushes += 1;
        Ok(())
    }
}

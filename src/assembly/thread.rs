use crate::assembly::{JacobianEvaluator, WorkerStats};
use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use crate::fields::{FieldInterpolator, FieldProvider};
use crate::matrix::GlobalMatrix;
use crate::mesh::{AssemblyMesh, ElementId};
use crate::registry::KernelRegistry;
use crate::setup::{SetupHooks, SetupPhase};
use crate::Real;
use eyre::WrapErr;
use log::{debug, trace};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Summary of a finished assembly pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    pub num_workers: usize,
    pub elements: usize,
    pub subdomain_changes: usize,
    pub boundary_faces: usize,
    pub internal_faces: usize,
    pub cached_flushes: usize,
    pub neighbor_flushes: usize,
    /// Statistics of every worker, in the order of their parts of the element range.
    pub workers: Vec<WorkerStats>,
}

impl AssemblyReport {
    pub fn from_workers(workers: Vec<WorkerStats>) -> Self {
        let mut report = Self {
            num_workers: workers.len(),
            ..Self::default()
        };
        for stats in &workers {
            report.elements += stats.elements;
            report.subdomain_changes += stats.subdomain_changes;
            report.boundary_faces += stats.boundary_faces;
            report.internal_faces += stats.internal_faces;
            report.cached_flushes += stats.cached_flushes;
            report.neighbor_flushes += stats.neighbor_flushes;
        }
        report.workers = workers;
        report
    }
}

/// Assembles Jacobians with a pool of workers over a statically partitioned element range.
///
/// The active elements of the mesh are split into contiguous, non-overlapping parts, one per
/// worker. Each worker owns a fresh [`JacobianEvaluator`] with its own field interpolator and
/// shares the mesh, the registry and the field provider read-only with the others. The global
/// matrix is the only shared mutable object and is guarded by a single mutex.
pub struct JacobianAssembler<'a, T, Mesh, Registry, Fields>
where
    Mesh: ?Sized,
    Registry: ?Sized,
    Fields: ?Sized,
{
    mesh: &'a Mesh,
    registry: &'a Registry,
    fields: &'a Fields,
    config: AssemblyConfig,
    lifecycle: Vec<&'a (dyn SetupHooks + Sync)>,
    /// Dedicated pool for `config.num_threads`, built on the first pass and reused afterwards.
    pool: OnceLock<rayon::ThreadPool>,
    marker: PhantomData<T>,
}

impl<'a, T, Mesh, Registry, Fields> JacobianAssembler<'a, T, Mesh, Registry, Fields>
where
    T: Real,
    Mesh: AssemblyMesh + ?Sized,
    Registry: KernelRegistry<T> + ?Sized,
    Fields: FieldProvider<T> + ?Sized,
{
    pub fn new(mesh: &'a Mesh, registry: &'a Registry, fields: &'a Fields) -> Self {
        Self {
            mesh,
            registry,
            fields,
            config: AssemblyConfig::default(),
            lifecycle: Vec::new(),
            pool: OnceLock::new(),
            marker: PhantomData,
        }
    }

    pub fn with_config(self, config: AssemblyConfig) -> Self {
        Self {
            config,
            pool: OnceLock::new(),
            ..self
        }
    }

    /// Attaches an object whose Jacobian setup hook runs before every pass, after the one of the
    /// registry.
    pub fn with_lifecycle(mut self, participant: &'a (dyn SetupHooks + Sync)) -> Self {
        self.lifecycle.push(participant);
        self
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Runs one Jacobian assembly pass, adding all contributions to `matrix`.
    ///
    /// The Jacobian setup hooks of the registry and of every attached lifecycle participant run
    /// first. If any worker fails, the remaining workers stop at their next element and the first
    /// error is returned. The matrix may then hold a partial Jacobian and must not be used.
    pub fn assemble_into<M>(&self, matrix: &mut M) -> eyre::Result<AssemblyReport>
    where
        M: GlobalMatrix<T>,
    {
        self.config.validate()?;

        self.registry
            .setup(SetupPhase::Jacobian)
            .wrap_err("Jacobian setup of the physics contributions failed")?;
        for participant in &self.lifecycle {
            participant
                .setup(SetupPhase::Jacobian)
                .wrap_err("Jacobian setup of a lifecycle participant failed")?;
        }

        match self.config.num_threads {
            Some(num_threads) => self
                .thread_pool(num_threads)?
                .install(|| self.run_workers(num_threads, matrix)),
            None => self.run_workers(self.config.num_workers(), matrix),
        }
    }

    fn thread_pool(&self, num_threads: usize) -> eyre::Result<&rayon::ThreadPool> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("femloop-worker-{index}"))
            .build()
            .wrap_err("Failed to build the assembly thread pool")?;
        debug!("Built assembly thread pool with {num_threads} threads");
        // A concurrent pass may have won the race, in which case our pool is dropped
        Ok(self.pool.get_or_init(|| pool))
    }

    fn run_workers<M>(&self, num_workers: usize, matrix: &mut M) -> eyre::Result<AssemblyReport>
    where
        M: GlobalMatrix<T>,
    {
        let elements = self.mesh.active_elements();
        let chunk_size = ((elements.len() + num_workers - 1) / num_workers).max(1);
        debug!(
            "Assembling Jacobian over {} active elements with up to {} workers",
            elements.len(),
            num_workers
        );

        let matrix = Mutex::new(matrix);
        let abort = AtomicBool::new(false);

        let workers = elements
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(thread_index, range)| {
                let result = self
                    .run_worker(thread_index, thread_index * chunk_size, range, &matrix, &abort)
                    .wrap_err_with(|| format!("Jacobian assembly failed on worker {thread_index}"));
                if result.is_err() {
                    abort.store(true, Ordering::Relaxed);
                }
                result
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        let report = AssemblyReport::from_workers(workers);
        debug!(
            "Assembled {} elements, {} boundary faces and {} internal faces with {} workers",
            report.elements,
            report.boundary_faces,
            report.internal_faces,
            report.num_workers
        );
        debug!(
            "Flushed {} cached batches and {} neighbor blocks",
            report.cached_flushes,
            report.neighbor_flushes
        );
        Ok(report)
    }

    /// Visits the elements of one part of the range. `offset` is the position of its first element.
    fn run_worker<M>(
        &self,
        thread_index: usize,
        offset: usize,
        range: &[ElementId],
        matrix: &Mutex<M>,
        abort: &AtomicBool,
    ) -> eyre::Result<WorkerStats>
    where
        M: GlobalMatrix<T>,
    {
        let fields = self.fields.interpolator(thread_index)?;
        let mut evaluator = JacobianEvaluator::new(
            thread_index,
            self.mesh,
            self.registry,
            fields,
            self.config.cache_batch_size,
        );

        match self.visit_range(&mut evaluator, offset, range, matrix, abort) {
            Ok(true) => evaluator.post(matrix)?,
            Ok(false) => {
                trace!("Worker {thread_index} stopped after another worker failed");
                evaluator.abandon();
            }
            Err(err) => {
                evaluator.abandon();
                return Err(err);
            }
        }
        Ok(evaluator.stats())
    }

    /// Runs the element loop over `range`. Returns `false` if it stopped early because another
    /// worker failed.
    fn visit_range<M, I>(
        &self,
        evaluator: &mut JacobianEvaluator<'_, T, Mesh, Registry, I>,
        offset: usize,
        range: &[ElementId],
        matrix: &Mutex<M>,
        abort: &AtomicBool,
    ) -> eyre::Result<bool>
    where
        M: GlobalMatrix<T>,
        I: FieldInterpolator<T>,
    {
        for (i, &id) in range.iter().enumerate() {
            if abort.load(Ordering::Relaxed) {
                return Ok(false);
            }

            let position = offset + i;
            let element = *self
                .mesh
                .element(id)
                .ok_or(AssemblyError::UnknownElement(id))?;

            evaluator.pre_element(&element)?;
            evaluator.on_element(&element)?;
            for side in 0..self.mesh.num_sides(id) {
                for &boundary in self.mesh.side_boundaries(id, side) {
                    evaluator.on_boundary(&element, side, boundary)?;
                }
                evaluator.on_internal_side(position, &element, side, matrix)?;
            }
            evaluator.post_element(position, matrix)?;
        }
        Ok(true)
    }
}

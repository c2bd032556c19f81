//! Threaded element-loop assembly of Jacobians.
//!
//! The pieces, from the leaves up:
//!
//! - [`LocalJacobian`] collects what the physics objects compute on one element.
//! - [`JacobianCache`] batches the local contributions of a worker and flushes them into the
//!   global matrix every `cache_batch_size` elements.
//! - [`needed_variables`] determines which variables need to be interpolated on a subdomain.
//! - [`JacobianEvaluator`] holds the state of one worker and evaluates elements, boundary faces
//!   and internal faces.
//! - [`JacobianAssembler`] partitions the active elements among the workers, runs them, and
//!   serializes their access to the global matrix.
mod cache;
mod dependency;
mod evaluator;
mod local;
mod thread;

pub use cache::*;
pub use dependency::*;
pub use evaluator::*;
pub use local::*;
pub use thread::*;

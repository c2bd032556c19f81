//! Threaded assembly of finite element Jacobians.
//!
//! The crate drives an element loop over a partitioned mesh: every worker visits its share of the
//! active elements, evaluates the volumetric kernels of the current subdomain, the boundary kernels
//! of labelled sides and the face kernels of internal faces, and accumulates the resulting local
//! contributions into a shared global matrix. The mesh, the physics objects, the field
//! interpolation and the global matrix are collaborators expressed as traits, with simple
//! reference implementations in [`mesh::ElementMesh`], [`kernels`], [`fields::piecewise_constant`]
//! and [`matrix::SparseJacobian`].
use nalgebra::RealField;

pub mod assembly;
pub mod config;
pub mod error;
pub mod fields;
pub mod kernels;
pub mod matrix;
pub mod mesh;
pub mod physics;
pub mod postprocessor;
pub mod registry;
pub mod setup;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Scalar type of assembled quantities.
///
/// Used as a trait alias for the traits needed by the generic routines of the crate.
pub trait Real: RealField + Copy {}

impl<T> Real for T where T: RealField + Copy {}

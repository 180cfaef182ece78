//! Two-dimensional finite element solver for the Poisson equation on
//! linear triangle meshes, such as the magnetic scalar potential of an
//! electromechanical device.
//!
//! The pipeline runs forward only: a [`mesher::MeshParser`] builds the
//! [`datatypes::Mesh`], [`region::apply_regions`] assigns material and
//! source values, [`assembler::build_global_system`] integrates and
//! scatters every triangle, [`boundary::apply_boundary_conditions`] fixes
//! Dirichlet values, and a [`solver::LinearSolver`] produces the nodal
//! potentials. [`solver::run`] sequences all of it.

pub mod assembler;
pub mod boundary;
pub mod config;
pub mod datatypes;
pub mod error;
pub mod mesher;
pub mod post_processor;
pub mod region;
pub mod solver;

pub use error::LodestoneError;

//! Build pipeline for notebook cells.
//!
//! # Architecture
//!
//! ```text
//! Cell source + BuildConfig
//!     │
//!     └── BuildPlanner::save (writes src/<name>.c, fingerprints it)
//!             │
//!             └── BuildPlanner::plan
//!                     │
//!                     ├── LinkGraph (target → required objects, cycle check)
//!                     │
//!                     └── BuildPlan
//!                             ├── compile steps (stale units, declaration order)
//!                             └── link step (at most one)
//!                                     │
//!                                     └── CompilerDriver::run (one process per step)
//!                                             │
//!                                             └── BuildPlanner::record (on success)
//! ```
//!
//! A unit is stale when its fingerprint (source bytes plus effective flags)
//! differs from the one its last object was built from, or that object is
//! gone. A link target is stale when any input is stale, its executable is
//! missing, or its inputs changed since the last successful link.

mod driver;
mod graph;
mod planner;
mod types;

pub use driver::CompilerDriver;
pub use graph::{LinkGraph, LinkNode};
pub use planner::BuildPlanner;
pub use types::{
    Artifact, BuildConfig, BuildMode, BuildPlan, BuildStep, CompilationUnit, Fingerprint,
    Language, RunSpec, StepKind,
};

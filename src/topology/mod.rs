//! Topology fusion and validation.
//!
//! [`fuse`] builds a [`Topology`] from the fact sets of a collection run;
//! [`validate_topology`] reports operator-facing issues found in it.

pub mod fusion;
pub mod types;
pub mod validate;

pub use fusion::fuse;
pub use types::{
    Conflict, ConflictCandidate, DanglingObservation, DanglingReason, Endpoint, HostNode, InterfaceNode, Link,
    LinkConflict, Topology,
};
pub use validate::{validate_topology, IssueKind, Severity, ValidationConfig, ValidationIssue};

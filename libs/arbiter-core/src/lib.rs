//! Grading and expectations engine for hierarchical test data.
//!
//! Terminology used throughout:
//!
//! - verdict: one of `AC`, `WA`, `TLE`, `RTE`, or `JE`
//! - grade: a (verdict, score) pair
//! - case: a leaf test unit with a globally unique short name
//! - group: an internal node of the test data hierarchy; the root is `.`
//!
//! The hierarchy of groups is a tree, but a case may be listed under several
//! groups, so the overall structure is a DAG with shared leaves. Grading is
//! driven by one transition, [`Grades::assign`]: record the observed verdict
//! for a case, then propagate aggregated grades upward through every group
//! that contains it. The verdict at the root is the final verdict of the
//! whole run.
//!
//! Aggregation policy (sum/min/max scoring, accept-if-any-accepted, ...)
//! belongs to an external "default grader" collaborator reached through the
//! [`Aggregate`] strategy; [`GraderCommand`] is the subprocess transport and
//! [`BuiltinGrader`] an in-process implementation of the default policy.

pub mod error;
pub mod expectations;
pub mod grader;
pub mod grading;
pub mod hierarchy;
pub mod settings;
pub mod verdict;


pub use error::{ConfigError, GradeError, JudgeError};
pub use expectations::{Expectation, Expectations};
pub use grader::{Aggregate, BuiltinGrader, GraderCommand};
pub use grading::{GradeEvent, Grades};
pub use hierarchy::{NodeId, TestHierarchy, ROOT};
pub use settings::{OnReject, Settings, SettingsResolver};
pub use verdict::{Grade, ScoreRange, Verdict, VerdictSet};

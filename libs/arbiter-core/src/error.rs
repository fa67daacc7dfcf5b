//! Error taxonomy of the engine.
//!
//! - [`ConfigError`]: malformed or self-contradictory expectations/settings,
//!   detected while the engine is constructed. Fatal to setup.
//! - [`GradeError`]: an assignment or derivation contradicts established
//!   state, or the caller addressed something that is not a test case.
//!   Fatal to the grading run.
//! - [`JudgeError`]: the external grader call failed. Absorbed into a `JE`
//!   grade rather than propagated, so a subtree that could not be judged is
//!   still representable; kept as a type for diagnostics.

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::verdict::Grade;

/// Construction-time configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown verdict code {0:?}")]
    UnknownVerdict(String),

    #[error("verdict JE cannot be expected at {path:?}")]
    JudgeErrorNotExpectable { path: String },

    #[error("invalid score range {text:?}")]
    InvalidScoreRange { text: String },

    #[error("score range {text:?} has reversed bounds")]
    ReversedScoreRange { text: String },

    #[error("empty test case path")]
    EmptyCasePath,

    #[error("invalid test case path {path:?}")]
    InvalidCasePath { path: String },

    #[error("{name:?} is used both as a test case and as a test group")]
    CaseGroupCollision { name: String },

    #[error("contradictory expectations at {path:?}: allowed verdict set became empty")]
    EmptyVerdictSet { path: String },

    #[error("contradictory root expectations: {left} vs {right}")]
    ContradictoryRoot { left: String, right: String },

    #[error("`score` at {path:?} requires `verdict` at the same node")]
    ScoreWithoutVerdict { path: String },

    #[error("score range {declared} at {path:?} exceeds the structural bound {bound}")]
    RangeExceedsBound {
        path: String,
        declared: String,
        bound: String,
    },

    #[error("unexpected key {key:?} at the expectation root; only `verdict`, `score`, `sample` and `secret` are allowed")]
    UnexpectedRootKey { key: String },

    #[error("invalid expectation spec at {path:?}: {reason}")]
    InvalidExpectation { path: String, reason: String },

    #[error("invalid setting {key:?} for {path:?}: {reason}")]
    InvalidSetting {
        path: String,
        key: String,
        reason: String,
    },
}

/// Failure during a grading run.
#[derive(Debug, Error)]
pub enum GradeError {
    /// API misuse: `assign` on a node that is not a known test case.
    #[error("{0:?} is not a known test case")]
    UnknownCase(String),

    /// A case was re-assigned a grade different from its established one.
    #[error("test case {case:?} is already graded {existing}; refusing to regrade as {new}")]
    AssignConflict {
        case: String,
        existing: Grade,
        new: Grade,
    },

    /// Re-deriving a group grade from the same children produced a different
    /// value. Indicates a non-deterministic grader or inconsistent state.
    #[error("derived grade {derived} for {node:?} conflicts with earlier grade {existing}")]
    DerivedConflict {
        node: String,
        existing: Grade,
        derived: Grade,
    },
}

/// Why an external grader call produced no usable grade.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("grader i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("grader stdout was not captured")]
    MissingStdout,

    #[error("grader timed out after {0:?}")]
    Timeout(Duration),

    #[error("grader exited with {0}, expected success")]
    Failed(ExitStatus),

    #[error("grader output {0:?} does not match \"<VERDICT> <score>\"")]
    MalformedOutput(String),
}

//! Aggregation of child grades into a group grade.
//!
//! Every group grade is produced by an [`Aggregate`] implementation fed the
//! grades of the group's direct children in child order. [`BuiltinGrader`]
//! implements the standard flag-driven policies; [`GraderCommand`] shells
//! out to an external program speaking the line protocol
//! `<VERDICT> <score>` on stdin/stdout.
//!
//! Children graded without an explicit score get the aggregating group's
//! default substituted (`accept_score` for `AC`, `reject_score` otherwise)
//! before any policy or external program sees them.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::JudgeError;
use crate::settings::Settings;
use crate::verdict::{Grade, Verdict};

/// How long an external grader may run before it is killed.
pub const GRADER_TIMEOUT: Duration = Duration::from_secs(1);

/// Turns the graded children of one group into that group's grade.
pub trait Aggregate {
    fn aggregate(&self, settings: &Settings, children: &[Grade]) -> Result<Grade, JudgeError>;
}

/// Substitute the group's default score for children graded without one.
fn scored(settings: &Settings, children: &[Grade]) -> Vec<(Verdict, f64)> {
    children
        .iter()
        .map(|grade| {
            let score = grade
                .score
                .unwrap_or_else(|| settings.default_score(grade.verdict));
            (grade.verdict, score)
        })
        .collect()
}

fn drop_ignored(settings: &Settings, mut children: Vec<(Verdict, f64)>) -> Vec<(Verdict, f64)> {
    if settings.has_flag("ignore_sample") && !children.is_empty() {
        children.remove(0);
    }
    children
}

/// The standard aggregation policies, selected by `grader_flags`.
///
/// Verdict: worst verdict of the children, or the first rejection with
/// `first_error`; `accept_if_any_accepted` accepts when any child does and
/// `always_accept` accepts unconditionally. Score: sum of child scores, or
/// `min`/`max`/`avg`. An empty child list grades `AC 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinGrader;

impl Aggregate for BuiltinGrader {
    fn aggregate(&self, settings: &Settings, children: &[Grade]) -> Result<Grade, JudgeError> {
        let children = drop_ignored(settings, scored(settings, children));
        if children.is_empty() {
            return Ok(Grade::new(Verdict::Ac, 0.0));
        }

        let mut verdict = if settings.has_flag("first_error") {
            children
                .iter()
                .map(|(verdict, _)| *verdict)
                .find(|verdict| !verdict.is_accepted())
                .unwrap_or(Verdict::Ac)
        } else {
            children
                .iter()
                .map(|(verdict, _)| *verdict)
                .max()
                .unwrap_or(Verdict::Ac)
        };
        if settings.has_flag("always_accept")
            || (settings.has_flag("accept_if_any_accepted")
                && children.iter().any(|(verdict, _)| verdict.is_accepted()))
        {
            verdict = Verdict::Ac;
        }
        if verdict == Verdict::Je {
            return Ok(Grade::judge_error());
        }

        let scores = children.iter().map(|(_, score)| *score);
        let score = if settings.has_flag("min") {
            scores.fold(f64::INFINITY, f64::min)
        } else if settings.has_flag("max") {
            scores.fold(f64::NEG_INFINITY, f64::max)
        } else if settings.has_flag("avg") {
            scores.sum::<f64>() / children.len() as f64
        } else {
            scores.sum()
        };
        Ok(Grade::new(verdict, score))
    }
}

/// An external grader program.
///
/// Invoked once per aggregation with the group's `grader_flags` as its
/// arguments. It receives one `<VERDICT> <score>` line per child on stdin
/// and must print a single such line on stdout within [`GRADER_TIMEOUT`].
#[derive(Debug, Clone)]
pub struct GraderCommand {
    program: PathBuf,
    timeout: Duration,
}

impl GraderCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        GraderCommand {
            program: program.into(),
            timeout: GRADER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, settings: &Settings, input: String) -> Result<String, JudgeError> {
        let mut child = Command::new(&self.program)
            .args(settings.grader_flags.split_whitespace())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // the grader may exit without draining stdin; that is its call
            let _ = stdin.write_all(input.as_bytes());
        }
        let mut stdout = child.stdout.take().ok_or(JudgeError::MissingStdout)?;

        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let mut output = String::new();
            let result = stdout.read_to_string(&mut output).map(|_| output);
            let _ = tx.send(result);
        });

        let output = match rx.recv_timeout(self.timeout) {
            Ok(read) => read?,
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(JudgeError::Timeout(self.timeout));
            }
        };
        let _ = reader.join();

        let status = child.wait()?;
        if !status.success() {
            return Err(JudgeError::Failed(status));
        }
        Ok(output)
    }
}

impl Aggregate for GraderCommand {
    fn aggregate(&self, settings: &Settings, children: &[Grade]) -> Result<Grade, JudgeError> {
        let mut input = String::new();
        for (verdict, score) in drop_ignored(settings, scored(settings, children)) {
            input.push_str(&format!("{} {score}\n", verdict.code()));
        }
        debug!(grader = %self.program.display(), lines = children.len(), "invoking external grader");
        let output = self.run(settings, input)?;
        parse_grade(&output)
    }
}

fn parse_grade(output: &str) -> Result<Grade, JudgeError> {
    let malformed = || JudgeError::MalformedOutput(output.to_string());
    let line = output
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(malformed)?;
    let mut tokens = line.split_whitespace();
    let verdict: Verdict = tokens
        .next()
        .ok_or_else(malformed)?
        .parse()
        .map_err(|_| malformed())?;
    let score: f64 = tokens
        .next()
        .ok_or_else(malformed)?
        .parse()
        .map_err(|_| malformed())?;
    if tokens.next().is_some() {
        return Err(malformed());
    }
    if verdict == Verdict::Je {
        return Ok(Grade::judge_error());
    }
    Ok(Grade::new(verdict, score))
}

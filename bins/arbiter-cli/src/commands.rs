// CLI commands for grading recorded judging runs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;
use serde::Deserialize;

use arbiter_core::{
    Aggregate, Expectations, Grade, GradeEvent, GraderCommand, Grades, NodeId, SettingsResolver,
    TestHierarchy, Verdict, VerdictSet,
};

use crate::report;

/// On-disk description of one judging run: the problem's test data layout
/// and the per-case verdicts some judge produced.
#[derive(Debug, Deserialize)]
pub struct ProblemFile {
    /// Full test case paths, e.g. `secret/group1/foo`.
    pub cases: Vec<String>,

    /// Per-group setting overrides, keyed by group path.
    #[serde(default)]
    pub testdata_settings: BTreeMap<String, BTreeMap<String, String>>,

    /// Declarative expectation tree.
    #[serde(default)]
    pub expectations: Option<serde_json::Value>,

    /// Legacy root expectation: a bare list of permitted verdict codes.
    #[serde(default)]
    pub expected_results: Option<Vec<String>>,

    /// Submission directory name ("accepted", "wrong_answer", ...) implying
    /// a root expectation.
    #[serde(default)]
    pub dirname: Option<String>,

    /// The judged outcomes, in judging order.
    pub results: Vec<CaseResult>,
}

#[derive(Debug, Deserialize)]
pub struct CaseResult {
    pub case: String,
    pub verdict: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Root verdicts implied by the conventional submission directory names.
fn dirname_verdicts(dirname: &str) -> Result<VerdictSet> {
    let code = match dirname {
        "accepted" => "AC",
        "wrong_answer" => "WA",
        "time_limit_exceeded" => "TLE",
        "run_time_error" => "RTE",
        other => bail!("unknown submission directory name '{}'", other),
    };
    Ok(VerdictSet::from_codes([code])?)
}

/// Grade a recorded run and report every node against expectations.
/// Returns whether every graded node was within expectations.
pub fn run_grade(problem_path: &str, grader: Option<&str>, tree_depth: usize) -> Result<bool> {
    let content = fs::read_to_string(problem_path)
        .with_context(|| format!("Failed to read {}", problem_path))?;
    let problem: ProblemFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", problem_path))?;

    let settings = SettingsResolver::new(&problem.testdata_settings)
        .context("Invalid testdata settings")?;
    let hierarchy = TestHierarchy::from_paths(&problem.cases)
        .context("Invalid test case paths")?;

    let legacy = problem
        .expected_results
        .as_ref()
        .map(|codes| VerdictSet::from_codes(codes))
        .transpose()
        .context("Invalid expected_results")?;
    let dirname = problem
        .dirname
        .as_deref()
        .map(dirname_verdicts)
        .transpose()?;
    let expectations = Expectations::build(
        problem.expectations.as_ref(),
        legacy,
        dirname,
        &settings,
    )
    .context("Invalid expectations")?;

    println!("🧮 Grading {} results from {}", problem.results.len(), problem_path);

    match grader {
        Some(program) => {
            if !Path::new(program).exists() {
                bail!("Grader program '{}' not found", program);
            }
            let grades = Grades::new(hierarchy, settings, GraderCommand::new(program));
            replay(grades, &expectations, &problem.results, tree_depth)
        }
        None => {
            let grades = Grades::builtin(hierarchy, settings);
            replay(grades, &expectations, &problem.results, tree_depth)
        }
    }
}

fn replay<A: Aggregate>(
    mut grades: Grades<A>,
    expectations: &Expectations,
    results: &[CaseResult],
    tree_depth: usize,
) -> Result<bool> {
    let mut all_expected = true;

    for result in results {
        let verdict: Verdict = result
            .verdict
            .parse()
            .with_context(|| format!("Invalid verdict for case '{}'", result.case))?;
        let events = grades
            .assign(&result.case, Grade::new(verdict, result.score))
            .with_context(|| format!("Failed to grade case '{}'", result.case))?;
        for event in &events {
            all_expected &= print_event(&grades, expectations, event);
        }
    }

    println!();
    report::print_tree(&grades, expectations, tree_depth);

    match grades.root_grade() {
        Some(root) => {
            let ok = expectations.is_expected(root, ".");
            if ok && all_expected {
                println!("\n✅ Final grade {} — all grades within expectations", root);
            } else {
                println!("\n❌ Final grade {} — some grades violated expectations", root);
            }
            Ok(ok && all_expected)
        }
        None => {
            println!("\n⚠️  Grading incomplete: the root never became ready");
            Ok(false)
        }
    }
}

/// Print one grading event, colored by whether it met expectations.
fn print_event<A: Aggregate>(
    grades: &Grades<A>,
    expectations: &Expectations,
    event: &GradeEvent,
) -> bool {
    let paths = expectation_paths(grades.hierarchy(), &event.node);
    let expected = paths
        .iter()
        .all(|path| expectations.is_expected(&event.grade, path));
    let label = match &event.node {
        NodeId::Group(path) => format!("group {}", path),
        NodeId::Case(name) => format!("case  {}", name),
    };
    if expected {
        println!("  → {:<30} {}", label, style(&event.grade).green());
    } else {
        let wanted = expectations.lookup(&paths[0]);
        println!(
            "  → {:<30} {}",
            label,
            style(format!("{}, expected {}", event.grade, wanted)).red()
        );
    }
    expected
}

/// The hierarchy paths an expectation check applies to for a node. A shared
/// case is checked under every group that lists it.
fn expectation_paths(hierarchy: &TestHierarchy, node: &NodeId) -> Vec<String> {
    match node {
        NodeId::Group(path) => vec![path.clone()],
        NodeId::Case(name) => hierarchy
            .case_parents(name)
            .map(|parents| {
                parents
                    .iter()
                    .map(|parent| format!("{}/{}", parent, name))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

// Verdict tree rendering for graded test groups
use console::style;

use arbiter_core::{Aggregate, Expectations, Grades, NodeId, ROOT};

/// Print the verdicts of all internal test groups as a tree, down to
/// `maxdepth` levels. Groups within expectations print green; violations
/// print red together with what was expected.
pub fn print_tree<A: Aggregate>(grades: &Grades<A>, expectations: &Expectations, maxdepth: usize) {
    if maxdepth == 0 {
        return;
    }
    let hierarchy = grades.hierarchy();
    let padding = hierarchy
        .group_paths()
        .filter(|path| depth_of(path) <= maxdepth)
        .map(|path| 3 * depth_of(path) + path.len())
        .max()
        .unwrap_or(0);
    print_level(grades, expectations, ROOT, padding, maxdepth, "");
}

/// Nesting depth of a group path; the root is depth zero.
fn depth_of(path: &str) -> usize {
    if path == ROOT {
        0
    } else {
        path.split('/').count()
    }
}

fn print_level<A: Aggregate>(
    grades: &Grades<A>,
    expectations: &Expectations,
    node: &str,
    padding: usize,
    depth: usize,
    prefix: &str,
) {
    if depth == 0 {
        return;
    }
    let subgroups: Vec<&str> = grades
        .hierarchy()
        .children(node)
        .iter()
        .filter_map(|child| match child {
            NodeId::Group(path) => Some(path.as_str()),
            NodeId::Case(_) => None,
        })
        .collect();
    let last = subgroups.len().saturating_sub(1);
    for (i, child) in subgroups.iter().enumerate() {
        let branch = if i == last { "└─ " } else { "├─ " };
        let label = format!("{prefix}{branch}{child}");
        let grade = grades.grade(child);
        let rendered = match grade {
            Some(grade) if expectations.is_expected(grade, child) => {
                style(grade.to_string()).green()
            }
            Some(grade) => style(format!("{}, expected {}", grade, expectations.lookup(child)))
                .red(),
            None => style("not graded".to_string()).dim(),
        };
        println!("{label:<padding$} {rendered}");
        let extension = if i == last { "   " } else { "│  " };
        print_level(
            grades,
            expectations,
            child,
            padding,
            depth - 1,
            &format!("{prefix}{extension}"),
        );
    }
}

use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{CellResolution, EntryPoint, Problem, ProblemKind};

/// Result of analyzing one package. Built once by the checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    package_name: Option<String>,
    package_version: Option<String>,
    contains_types: bool,
    entry_points: Vec<EntryPoint>,
    resolutions: Vec<CellResolution>,
    problems: Vec<Problem>,
}

impl Analysis {
    pub(crate) fn new(
        package_name: Option<String>,
        package_version: Option<String>,
        entry_points: Vec<EntryPoint>,
        resolutions: Vec<CellResolution>,
        problems: Vec<Problem>,
    ) -> Self {
        let contains_types = resolutions.iter().any(|r| r.types.is_found());
        Self { package_name, package_version, contains_types, entry_points, resolutions, problems }
    }

    pub fn package_name(&self) -> Option<&str> {
        self.package_name.as_deref()
    }

    pub fn package_version(&self) -> Option<&str> {
        self.package_version.as_deref()
    }

    /// Whether any entry point resolves to a declaration file.
    pub fn contains_types(&self) -> bool {
        self.contains_types
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn resolutions(&self) -> &[CellResolution] {
        &self.resolutions
    }

    /// Every problem, ordered by entry point, then resolution kind.
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }
}

/// Problems of `analysis` accepted by `filter`, in report order.
pub fn get_problems<'a>(
    analysis: &'a Analysis,
    filter: Option<&dyn Fn(&Problem) -> bool>,
) -> Vec<&'a Problem> {
    match filter {
        Some(filter) => analysis.problems.iter().filter(|p| filter(*p)).collect(),
        None => analysis.problems.iter().collect(),
    }
}

/// Buckets problems by kind; each bucket keeps the input order.
pub fn group_by_kind<'a>(
    problems: impl IntoIterator<Item = &'a Problem>,
) -> BTreeMap<ProblemKind, Vec<Problem>> {
    let mut groups: BTreeMap<ProblemKind, Vec<Problem>> = BTreeMap::new();
    for problem in problems {
        groups.entry(problem.kind).or_default().push(problem.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProblemDetails;
    use typeswrong_core::ResolutionKind;

    fn problem(kind: ProblemKind, entry_point: &str) -> Problem {
        Problem {
            kind,
            entry_point: entry_point.to_string(),
            resolution_kind: ResolutionKind::Node16Cjs,
            types_path: None,
            runtime_path: None,
            details: ProblemDetails::None,
        }
    }

    fn analysis(problems: Vec<Problem>) -> Analysis {
        Analysis::new(None, None, Vec::new(), Vec::new(), problems)
    }

    #[test]
    fn test_get_problems_with_filter() {
        let a = analysis(vec![
            problem(ProblemKind::NoResolution, "."),
            problem(ProblemKind::FalseEsm, "./sub"),
        ]);
        assert_eq!(get_problems(&a, None).len(), 2);

        let only_sub = |p: &Problem| p.entry_point == "./sub";
        let filtered = get_problems(&a, Some(&only_sub));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].kind, ProblemKind::FalseEsm);
    }

    #[test]
    fn test_group_by_kind_preserves_order() {
        let a = analysis(vec![
            problem(ProblemKind::FalseEsm, "."),
            problem(ProblemKind::NoResolution, "./a"),
            problem(ProblemKind::FalseEsm, "./b"),
        ]);
        let groups = group_by_kind(get_problems(&a, None));
        assert_eq!(groups.len(), 2);
        let false_esm: Vec<&str> =
            groups[&ProblemKind::FalseEsm].iter().map(|p| p.entry_point.as_str()).collect();
        assert_eq!(false_esm, vec![".", "./b"]);
        assert!(!groups.contains_key(&ProblemKind::NamedExports));
    }

    #[test]
    fn test_group_by_kind_matches_filtered_subsequence() {
        let a = analysis(vec![
            problem(ProblemKind::NoResolution, "."),
            problem(ProblemKind::FallbackCondition, "."),
            problem(ProblemKind::NoResolution, "./x"),
        ]);
        let groups = group_by_kind(a.problems());
        for (kind, grouped) in &groups {
            let same_kind = |p: &Problem| p.kind == *kind;
            let expected: Vec<Problem> =
                get_problems(&a, Some(&same_kind)).into_iter().cloned().collect();
            assert_eq!(grouped, &expected);
        }
    }

    #[test]
    fn test_contains_types_without_resolutions() {
        assert!(!analysis(Vec::new()).contains_types());
    }
}

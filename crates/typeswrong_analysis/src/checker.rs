use log::{debug, info, trace};
use rayon::prelude::*;
use std::collections::HashMap;
use typeswrong_core::{
    Error, ModuleFormat, PACKAGE_JSON, PackageDescriptor, Resolution, ResolutionKind,
    ResolutionMode, ResolutionResult, Resolver, Result, SyntaxKind, Vfs,
};

use crate::{
    analysis::Analysis,
    config::Config,
    entrypoints::enumerate_entry_points,
    types::{CellResolution, MismatchSource, Problem, ProblemDetails, ProblemKind},
};

/// Reads the root `package.json` from `vfs` and analyzes the package.
pub fn analyze(vfs: &Vfs, config: &Config) -> Result<Analysis> {
    let bytes = vfs.read(PACKAGE_JSON).map_err(|_| {
        Error::InvalidPackageMetadata(format!("no {PACKAGE_JSON} at the package root"))
    })?;
    let package = PackageDescriptor::parse(bytes)?;
    Ok(analyze_from_vfs(vfs, &package, config))
}

/// Resolves every entry point under every configured resolution kind and
/// classifies the mismatches.
pub fn analyze_from_vfs(vfs: &Vfs, package: &PackageDescriptor, config: &Config) -> Analysis {
    info!(
        "Analyzing {}@{}",
        package.name.as_deref().unwrap_or("<unnamed>"),
        package.version.as_deref().unwrap_or("<unversioned>")
    );

    let kinds = config.resolution_kinds();
    let entry_points = enumerate_entry_points(package, &kinds);
    let resolver = Resolver::new(vfs, package, &config.conditions);

    let cells: Vec<(&str, ResolutionKind)> = entry_points
        .iter()
        .flat_map(|e| e.resolution_kinds.iter().map(move |k| (e.subpath.as_str(), *k)))
        .collect();
    debug!("Resolving {} cells in parallel", cells.len());

    let resolutions: Vec<CellResolution> = cells
        .par_iter()
        .map(|&(subpath, kind)| CellResolution {
            entry_point: subpath.to_string(),
            resolution_kind: kind,
            types: resolver.resolve_entry_point(kind, subpath, ResolutionMode::Types),
            runtime: resolver.resolve_entry_point(kind, subpath, ResolutionMode::Runtime),
        })
        .collect();

    let contains_types = resolutions.iter().any(|r| r.types.is_found());
    let problems = if contains_types {
        let mut problems: Vec<Problem> =
            resolutions.par_iter().flat_map(|cell| compare_cell(&resolver, cell)).collect();
        problems.extend(untyped_resolution(&resolutions));

        // Report order: entry point, then resolution kind
        let order: HashMap<&str, usize> =
            entry_points.iter().enumerate().map(|(i, e)| (e.subpath.as_str(), i)).collect();
        problems.sort_by_key(|p| {
            (order.get(p.entry_point.as_str()).copied().unwrap_or(usize::MAX), p.resolution_kind)
        });
        problems
    } else {
        debug!("Package ships no types, skipping comparison");
        Vec::new()
    };

    info!("Analysis complete. Found {} problems", problems.len());
    Analysis::new(
        package.name.clone(),
        package.version.clone(),
        entry_points,
        resolutions,
        problems,
    )
}

/// Classifies one cell from its types and runtime results.
pub(crate) fn compare_cell(resolver: &Resolver<'_>, cell: &CellResolution) -> Vec<Problem> {
    let problem = |kind, types: Option<&Resolution>, runtime: Option<&Resolution>, details| {
        Problem {
            kind,
            entry_point: cell.entry_point.clone(),
            resolution_kind: cell.resolution_kind,
            types_path: types.map(|r| r.path.clone()),
            runtime_path: runtime.map(|r| r.path.clone()),
            details,
        }
    };

    let (types, runtime) = match (&cell.types, &cell.runtime) {
        (ResolutionResult::NotFound { .. }, ResolutionResult::NotFound { .. }) => {
            return Vec::new();
        }
        (ResolutionResult::NotFound { reason }, ResolutionResult::Found(runtime)) => {
            let details = ProblemDetails::ResolutionFailure { reason: *reason };
            return vec![problem(ProblemKind::NoResolution, None, Some(runtime), details)];
        }
        (ResolutionResult::Found(types), ResolutionResult::NotFound { reason }) => {
            let details = ProblemDetails::ResolutionFailure { reason: *reason };
            return vec![problem(ProblemKind::InternalResolutionError, Some(types), None, details)];
        }
        (ResolutionResult::Found(types), ResolutionResult::Found(runtime)) => (types, runtime),
    };

    let mut problems = Vec::new();
    let mut push = |kind: ProblemKind, details: ProblemDetails| {
        trace!("{} {} '{}': {}", cell.resolution_kind, cell.entry_point, runtime.path, kind);
        problems.push(problem(kind, Some(types), Some(runtime), details));
    };

    if types.used_fallback_condition {
        push(ProblemKind::FallbackCondition, ProblemDetails::None);
    }
    if !cell.resolution_kind.enforces_module_format() {
        return problems;
    }

    let classifier = resolver.classifier();
    let format_mismatch = |source, expected, actual| ProblemDetails::FormatMismatch {
        source,
        expected,
        actual,
    };

    // Declaration format vs runtime format
    let mut masquerade = match (types.module_format, runtime.module_format) {
        (ModuleFormat::Esm, ModuleFormat::Cjs) => Some(ProblemKind::FalseCjs),
        (ModuleFormat::Cjs, ModuleFormat::Esm) => Some(ProblemKind::FalseEsm),
        _ => None,
    };
    if let Some(kind) = masquerade {
        let source = MismatchSource::TypesVsRuntime;
        push(kind, format_mismatch(source, types.module_format, runtime.module_format));
    }

    // Runtime format vs the syntax the file is written in
    let runtime_syntax = classifier.syntax(&runtime.path);
    let authored = match runtime_syntax.as_deref().map(|s| s.kind) {
        Some(SyntaxKind::Esm) => Some(ModuleFormat::Esm),
        Some(SyntaxKind::Cjs) => Some(ModuleFormat::Cjs),
        _ => None,
    };
    let syntax_mismatch = match (runtime.module_format, authored) {
        (ModuleFormat::Cjs, Some(ModuleFormat::Esm)) => Some(ProblemKind::FalseEsm),
        (ModuleFormat::Esm, Some(ModuleFormat::Cjs)) => Some(ProblemKind::FalseCjs),
        _ => None,
    };
    if let (Some(kind), Some(actual)) = (syntax_mismatch, authored)
        && masquerade != Some(kind)
    {
        let source = MismatchSource::DeclaredVsSyntax;
        push(kind, format_mismatch(source, runtime.module_format, actual));
        masquerade = Some(kind);
    }

    if cell.resolution_kind == ResolutionKind::Node16Cjs && types.module_format == ModuleFormat::Esm
    {
        push(ProblemKind::CjsResolvesToEsm, ProblemDetails::None);
    }

    // ESM importing CommonJS: only statically detectable names survive
    if cell.resolution_kind == ResolutionKind::Node16Esm
        && runtime.module_format == ModuleFormat::Cjs
        && masquerade.is_none()
        && let Some(runtime_syntax) = runtime_syntax.as_deref()
        && let Some(types_syntax) = classifier.syntax(&types.path)
    {
        let cjs = &runtime_syntax.cjs;
        if types_syntax.esm_exports.contains("default")
            && cjs.names.contains("default")
            && !cjs.assigns_module_exports
        {
            push(ProblemKind::CjsOnlyExportsDefault, ProblemDetails::None);
        }

        if !cjs.opaque && !types_syntax.has_export_equals {
            let missing: Vec<String> = types_syntax
                .esm_exports
                .iter()
                .filter(|name| *name != "default" && !cjs.names.contains(*name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                push(ProblemKind::NamedExports, ProblemDetails::MissingExports { names: missing });
            }
        }
    }

    problems
}

/// Package-level problem for entry points that run without types while
/// others are typed.
fn untyped_resolution(resolutions: &[CellResolution]) -> Option<Problem> {
    if !resolutions.iter().any(|r| r.types.is_found()) {
        return None;
    }
    let untyped: Vec<&CellResolution> = resolutions.iter().filter(|r| r.is_untyped()).collect();
    let first = untyped.first()?;
    debug!("{} cells resolve without types", untyped.len());

    Some(Problem {
        kind: ProblemKind::UntypedResolution,
        entry_point: first.entry_point.clone(),
        resolution_kind: first.resolution_kind,
        types_path: None,
        runtime_path: first.runtime.path().map(str::to_string),
        details: ProblemDetails::UntypedCells { cells: untyped.iter().map(|r| r.cell()).collect() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeswrong_core::NotFoundReason;

    fn package(manifest: &str, files: &[(&str, &str)]) -> Vfs {
        let mut all = vec![(PACKAGE_JSON, manifest.as_bytes().to_vec())];
        all.extend(files.iter().map(|(p, c)| (*p, c.as_bytes().to_vec())));
        Vfs::from_files(all).unwrap()
    }

    fn run(manifest: &str, files: &[(&str, &str)]) -> Analysis {
        analyze(&package(manifest, files), &Config::default()).unwrap()
    }

    fn kinds_for(analysis: &Analysis, resolution_kind: ResolutionKind) -> Vec<ProblemKind> {
        analysis
            .problems()
            .iter()
            .filter(|p| p.resolution_kind == resolution_kind)
            .map(|p| p.kind)
            .collect()
    }

    fn find(analysis: &Analysis, kind: ProblemKind) -> Option<&Problem> {
        analysis.problems().iter().find(|p| p.kind == kind)
    }

    #[test]
    fn test_package_without_declarations_has_no_problems() {
        let analysis =
            run(r#"{"name":"plain","main":"index.js"}"#, &[("index.js", "exports.a = 1;")]);
        assert!(!analysis.contains_types());
        assert!(analysis.problems().is_empty());
        assert_eq!(analysis.package_name(), Some("plain"));
    }

    #[test]
    fn test_consistent_exports_sugar_has_no_problems() {
        let analysis = run(
            r#"{"name":"ok","exports":"./index.js","types":"./index.d.ts"}"#,
            &[
                ("index.js", "exports.hello = function () {};"),
                ("index.d.ts", "export declare function hello(): void;"),
            ],
        );
        assert!(analysis.contains_types());
        assert!(analysis.problems().is_empty(), "{:?}", analysis.problems());
        assert_eq!(analysis.resolutions().len(), 4);
    }

    #[test]
    fn test_esm_syntax_in_cjs_main_is_false_esm() {
        let analysis = run(
            r#"{"name":"fake","main":"./index.js"}"#,
            &[
                ("index.js", "export const a = 1;"),
                ("index.d.ts", "export declare const a: number;"),
            ],
        );
        let problem = analysis
            .problems()
            .iter()
            .find(|p| p.resolution_kind == ResolutionKind::Node16Cjs)
            .unwrap();
        assert_eq!(problem.kind, ProblemKind::FalseEsm);
        assert_eq!(problem.runtime_path.as_deref(), Some("index.js"));
        assert_eq!(
            problem.details,
            ProblemDetails::FormatMismatch {
                source: MismatchSource::DeclaredVsSyntax,
                expected: ModuleFormat::Cjs,
                actual: ModuleFormat::Esm,
            }
        );
        assert!(kinds_for(&analysis, ResolutionKind::Node10).is_empty());
        assert!(kinds_for(&analysis, ResolutionKind::Bundler).is_empty());
    }

    #[test]
    fn test_require_only_exports_without_types_condition() {
        let analysis = run(
            r#"{"name":"req","exports":{"require":"./index.js"}}"#,
            &[("index.js", "module.exports = {};"), ("index.d.ts", "export {};")],
        );
        let node16_cjs = kinds_for(&analysis, ResolutionKind::Node16Cjs);
        assert!(node16_cjs.contains(&ProblemKind::NoResolution));
        assert!(kinds_for(&analysis, ResolutionKind::Bundler).is_empty());

        let no_resolution = find(&analysis, ProblemKind::NoResolution).unwrap();
        assert_eq!(
            no_resolution.details,
            ProblemDetails::ResolutionFailure { reason: NotFoundReason::NotADeclaration }
        );
        // Neither types nor runtime resolve for import
        assert!(kinds_for(&analysis, ResolutionKind::Node16Esm).is_empty());
    }

    #[test]
    fn test_unresolvable_cell_is_not_a_problem() {
        let analysis = run(
            r#"{"name":"req","exports":{"require":"./index.js"},"types":"./index.d.ts"}"#,
            &[
                ("index.js", "exports.a = 1;"),
                ("index.d.ts", "export declare const a: number;"),
            ],
        );
        assert!(analysis.contains_types());
        let esm = analysis
            .resolutions()
            .iter()
            .find(|r| r.resolution_kind == ResolutionKind::Node16Esm)
            .unwrap();
        assert!(!esm.types.is_found());
        assert!(!esm.runtime.is_found());
        assert!(analysis.problems().is_empty(), "{:?}", analysis.problems());
    }

    #[test]
    fn test_cjs_syntax_in_esm_package_is_false_cjs() {
        let analysis = run(
            r#"{"name":"decl","type":"module","main":"./index.js"}"#,
            &[
                ("index.js", "exports.a = 1;"),
                ("index.d.ts", "export declare const a: number;"),
            ],
        );
        assert_eq!(kinds_for(&analysis, ResolutionKind::Node16Esm), vec![ProblemKind::FalseCjs]);
        let problem = analysis
            .problems()
            .iter()
            .find(|p| p.resolution_kind == ResolutionKind::Node16Esm)
            .unwrap();
        assert_eq!(
            problem.details,
            ProblemDetails::FormatMismatch {
                source: MismatchSource::DeclaredVsSyntax,
                expected: ModuleFormat::Esm,
                actual: ModuleFormat::Cjs,
            }
        );
    }

    #[test]
    fn test_bundler_does_not_hide_missing_export_target() {
        let analysis = run(
            r#"{"name":"gone","main":"./index.js","exports":{".":{"import":"./missing.mjs"}}}"#,
            &[("index.js", "exports.a = 1;"), ("index.d.ts", "export declare const a: number;")],
        );
        let bundler = analysis
            .resolutions()
            .iter()
            .find(|r| r.resolution_kind == ResolutionKind::Bundler)
            .unwrap();
        assert_eq!(bundler.runtime, ResolutionResult::not_found(NotFoundReason::FileNotFound));
        assert_eq!(bundler.types, ResolutionResult::not_found(NotFoundReason::NotADeclaration));
        assert!(kinds_for(&analysis, ResolutionKind::Bundler).is_empty());
    }

    #[test]
    fn test_package_json_only() {
        let analysis = run("{}", &[]);
        assert!(!analysis.contains_types());
        assert!(analysis.problems().is_empty());
        assert_eq!(analysis.entry_points().len(), 1);
        assert_eq!(analysis.entry_points()[0].subpath, ".");
        assert!(
            analysis.resolutions().iter().all(|r| !r.types.is_found() && !r.runtime.is_found())
        );
    }

    #[test]
    fn test_missing_package_json_is_an_error() {
        let vfs = Vfs::from_files(vec![("index.js", Vec::new())]).unwrap();
        let result = analyze(&vfs, &Config::default());
        assert!(matches!(result, Err(Error::InvalidPackageMetadata(_))));
    }

    #[test]
    fn test_invalid_manifest_is_an_error() {
        let vfs = package("{ nope", &[]);
        assert!(matches!(analyze(&vfs, &Config::default()), Err(Error::InvalidPackageMetadata(_))));
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let vfs = package(
            r#"{"name":"twice","exports":{".":{"types":"./index.d.ts","default":"./index.js"}}}"#,
            &[("index.js", "exports.a = 1;"), ("index.d.ts", "export declare const b: number;")],
        );
        let descriptor = PackageDescriptor::parse(vfs.read(PACKAGE_JSON).unwrap()).unwrap();
        let config = Config::default();
        assert_eq!(
            analyze_from_vfs(&vfs, &descriptor, &config),
            analyze_from_vfs(&vfs, &descriptor, &config)
        );
    }

    #[test]
    fn test_named_exports_missing_from_cjs() {
        let analysis = run(
            r#"{"name":"named","exports":{".":{"types":"./index.d.ts","default":"./index.js"}}}"#,
            &[
                ("index.js", "exports.a = 1;"),
                ("index.d.ts", "export declare const a: number;\nexport declare const b: number;"),
            ],
        );
        assert_eq!(
            kinds_for(&analysis, ResolutionKind::Node16Esm),
            vec![ProblemKind::NamedExports]
        );
        let problem = find(&analysis, ProblemKind::NamedExports).unwrap();
        let missing = vec!["b".to_string()];
        assert_eq!(problem.details, ProblemDetails::MissingExports { names: missing });
        assert!(kinds_for(&analysis, ResolutionKind::Node16Cjs).is_empty());
    }

    #[test]
    fn test_opaque_module_exports_skips_named_exports() {
        let analysis = run(
            r#"{"name":"opaque","exports":{".":{"types":"./index.d.ts","default":"./index.js"}}}"#,
            &[
                ("index.js", "module.exports = createApi();"),
                ("index.d.ts", "export declare const a: number;"),
            ],
        );
        assert!(analysis.problems().is_empty());
    }

    #[test]
    fn test_cjs_only_exports_default() {
        let analysis = run(
            r#"{"name":"dflt","exports":{".":{"types":"./index.d.ts","default":"./index.js"}}}"#,
            &[
                (
                    "index.js",
                    "Object.defineProperty(exports, '__esModule', { value: true });\n\
                     exports.default = function () {};",
                ),
                ("index.d.ts", "export default function f(): void;"),
            ],
        );
        assert_eq!(
            kinds_for(&analysis, ResolutionKind::Node16Esm),
            vec![ProblemKind::CjsOnlyExportsDefault]
        );
    }

    #[test]
    fn test_esm_types_for_cjs_runtime() {
        let analysis = run(
            r#"{"name":"mixed","exports":{".":{"types":"./index.d.mts","default":"./index.js"}}}"#,
            &[("index.js", "exports.a = 1;"), ("index.d.mts", "export declare const a: number;")],
        );
        assert_eq!(
            kinds_for(&analysis, ResolutionKind::Node16Cjs),
            vec![ProblemKind::FalseCjs, ProblemKind::CjsResolvesToEsm]
        );
        assert_eq!(kinds_for(&analysis, ResolutionKind::Node16Esm), vec![ProblemKind::FalseCjs]);
    }

    #[test]
    fn test_fallback_condition() {
        let analysis = run(
            r#"{
                "name": "fb",
                "type": "module",
                "exports": { ".": { "import": "./index.js", "types": "./index.d.ts" } }
            }"#,
            &[
                ("index.js", "export const a = 1;"),
                ("index.d.ts", "export declare const a: number;"),
            ],
        );
        assert_eq!(
            kinds_for(&analysis, ResolutionKind::Node16Esm),
            vec![ProblemKind::FallbackCondition]
        );
    }

    #[test]
    fn test_internal_resolution_error() {
        let analysis = run(
            r#"{
                "name": "broken",
                "exports": { ".": { "types": "./index.d.ts", "require": "./missing.js" } }
            }"#,
            &[("index.d.ts", "export {};")],
        );
        let problem = analysis
            .problems()
            .iter()
            .find(|p| p.resolution_kind == ResolutionKind::Node16Cjs)
            .unwrap();
        assert_eq!(problem.kind, ProblemKind::InternalResolutionError);
        assert_eq!(problem.types_path.as_deref(), Some("index.d.ts"));
        assert_eq!(problem.runtime_path, None);
    }

    #[test]
    fn test_untyped_resolution_is_reported_once() {
        let analysis = run(
            r#"{"name":"partial","exports":{
                ".":{"types":"./index.d.ts","default":"./index.js"},
                "./extra":"./extra.js"
            }}"#,
            &[
                ("index.js", "exports.a = 1;"),
                ("index.d.ts", "export declare const a: number;"),
                ("extra.js", "exports.b = 2;"),
            ],
        );
        let untyped: Vec<&Problem> = analysis
            .problems()
            .iter()
            .filter(|p| p.kind == ProblemKind::UntypedResolution)
            .collect();
        assert_eq!(untyped.len(), 1);
        assert_eq!(untyped[0].entry_point, "./extra");
        assert_eq!(untyped[0].resolution_kind, ResolutionKind::Node10);
        match &untyped[0].details {
            ProblemDetails::UntypedCells { cells } => assert_eq!(cells.len(), 4),
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_problems_reference_known_cells_in_order() {
        let analysis = run(
            r#"{"name":"order","exports":{
                "./b":{"types":"./b.d.ts","require":"./missing.js"},
                ".":"./index.js"
            }}"#,
            &[("index.js", "export default 1;"), ("index.d.ts", "export {};"), ("b.d.ts", "")],
        );
        let entry_index = |subpath: &str| {
            analysis.entry_points().iter().position(|e| e.subpath == subpath).unwrap()
        };
        for problem in analysis.problems() {
            let entry = &analysis.entry_points()[entry_index(&problem.entry_point)];
            assert!(entry.resolution_kinds.contains(&problem.resolution_kind));
        }
        let keys: Vec<(usize, ResolutionKind)> = analysis
            .problems()
            .iter()
            .map(|p| (entry_index(&p.entry_point), p.resolution_kind))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(analysis.problems()[0].entry_point, "./b");
    }

    #[test]
    fn test_configured_resolution_kinds_limit_cells() {
        let vfs = package(r#"{"main":"index.js"}"#, &[("index.js", ""), ("index.d.ts", "")]);
        let config =
            Config { resolution_kinds: vec![ResolutionKind::Bundler], conditions: Vec::new() };
        let analysis = analyze(&vfs, &config).unwrap();
        assert_eq!(analysis.resolutions().len(), 1);
        assert_eq!(analysis.resolutions()[0].resolution_kind, ResolutionKind::Bundler);
    }

    #[test]
    fn test_custom_condition_is_honored() {
        let vfs = package(
            r#"{"exports":{".":{"worker":"./worker.js","default":"./index.js"}}}"#,
            &[("worker.js", ""), ("index.js", "")],
        );
        let config = Config {
            resolution_kinds: vec![ResolutionKind::Node16Esm],
            conditions: vec!["worker".to_string()],
        };
        let analysis = analyze(&vfs, &config).unwrap();
        assert_eq!(analysis.resolutions()[0].runtime.path(), Some("worker.js"));
    }
}

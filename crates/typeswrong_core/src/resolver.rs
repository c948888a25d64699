use log::{debug, trace};
use serde_json::Value;

use crate::{
    constants::{
        BUNDLER_RUNTIME_EXTENSIONS, CJS_RUNTIME_EXTENSIONS, INDEX_STEM, PACKAGE_JSON,
        ROOT_SUBPATH, TYPES_CONDITION, TYPES_EXTENSIONS,
    },
    exports::{ConditionSet, ExportsLookup, lookup},
    module_kind::ModuleKindClassifier,
    package_json::{ExportsValue, PackageDescriptor},
    types::{
        NotFoundReason, Resolution, ResolutionKind, ResolutionMode, ResolutionResult,
        declaration_counterpart, is_declaration_path,
    },
    vfs::{Vfs, join, normalize, parent_dir},
};

/// Simulates node10, node16-cjs, node16-esm and bundler resolution over the
/// package files, for declaration files (types) or loaded JavaScript (runtime).
pub struct Resolver<'a> {
    vfs: &'a Vfs,
    package: &'a PackageDescriptor,
    extra_conditions: Vec<String>,
    classifier: ModuleKindClassifier<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(vfs: &'a Vfs, package: &'a PackageDescriptor, extra_conditions: &[String]) -> Self {
        Self {
            vfs,
            package,
            extra_conditions: extra_conditions.to_vec(),
            classifier: ModuleKindClassifier::new(vfs, package.package_type),
        }
    }

    pub fn vfs(&self) -> &'a Vfs {
        self.vfs
    }

    pub fn package(&self) -> &'a PackageDescriptor {
        self.package
    }

    pub fn classifier(&self) -> &ModuleKindClassifier<'a> {
        &self.classifier
    }

    /// Export conditions `kind` activates in `mode`, plus the configured extras.
    pub fn conditions_for(&self, kind: ResolutionKind, mode: ResolutionMode) -> ConditionSet {
        let base = match kind {
            ResolutionKind::Node10 | ResolutionKind::Node16Cjs => ["require", "node"],
            ResolutionKind::Node16Esm => ["import", "node"],
            ResolutionKind::Bundler => ["import", "module"],
        };
        let mut conditions = ConditionSet::new(base);
        if mode == ResolutionMode::Types {
            conditions.insert(TYPES_CONDITION);
        }
        for condition in &self.extra_conditions {
            conditions.insert(condition.clone());
        }
        conditions
    }

    /// Resolves a package subpath (`"."` or `"./sub"`) as an importer of the
    /// package would.
    pub fn resolve_entry_point(
        &self,
        kind: ResolutionKind,
        subpath: &str,
        mode: ResolutionMode,
    ) -> ResolutionResult {
        let conditions = self.conditions_for(kind, mode);
        self.resolve_subpath(kind, subpath, mode, &conditions)
    }

    /// Resolves `specifier` imported from `from_file` (package root when `None`).
    ///
    /// Bare specifiers must name this package; relative ones are resolved
    /// against the importing file's directory.
    pub fn resolve(
        &self,
        kind: ResolutionKind,
        specifier: &str,
        from_file: Option<&str>,
        mode: ResolutionMode,
        conditions: &ConditionSet,
    ) -> ResolutionResult {
        trace!("Resolving '{}' from {:?} ({}, {:?})", specifier, from_file, kind, mode);

        if is_relative(specifier) {
            let base = from_file.and_then(parent_dir).unwrap_or("");
            let Ok(path) = join(base, specifier) else {
                trace!("Relative specifier '{}' escapes the package", specifier);
                return ResolutionResult::not_found(NotFoundReason::FileNotFound);
            };
            return self.resolve_file_path(kind, &path, mode);
        }

        let Some(subpath) = self.package_subpath(specifier) else {
            trace!("'{}' does not name this package", specifier);
            return ResolutionResult::not_found(NotFoundReason::PackageNotFound);
        };
        self.resolve_subpath(kind, &subpath, mode, conditions)
    }

    fn package_subpath(&self, specifier: &str) -> Option<String> {
        let name = self.package.name.as_deref()?;
        if specifier == name {
            return Some(ROOT_SUBPATH.to_string());
        }
        let rest = specifier.strip_prefix(name)?.strip_prefix('/')?;
        Some(format!("./{rest}"))
    }

    fn resolve_subpath(
        &self,
        kind: ResolutionKind,
        subpath: &str,
        mode: ResolutionMode,
        conditions: &ConditionSet,
    ) -> ResolutionResult {
        let result = match (kind, &self.package.exports) {
            (ResolutionKind::Node10, _) | (_, None) => self.resolve_legacy(kind, subpath, mode),
            (ResolutionKind::Node16Cjs | ResolutionKind::Node16Esm, Some(exports)) => {
                self.resolve_node16_exports(exports, subpath, mode, conditions)
            }
            (ResolutionKind::Bundler, Some(exports)) => {
                self.resolve_bundler_exports(exports, subpath, mode, conditions)
            }
        };
        debug!("{} {:?} '{}' -> {:?}", kind, mode, subpath, result.path());
        result
    }

    fn resolve_node16_exports(
        &self,
        exports: &ExportsValue,
        subpath: &str,
        mode: ResolutionMode,
        conditions: &ConditionSet,
    ) -> ResolutionResult {
        let candidates = match lookup(exports, subpath, conditions) {
            ExportsLookup::Candidates(candidates) => candidates,
            ExportsLookup::NotExported => {
                return ResolutionResult::not_found(NotFoundReason::SubpathNotExported);
            }
            ExportsLookup::NoMatchingCondition => {
                return ResolutionResult::not_found(NotFoundReason::NoMatchingCondition);
            }
            ExportsLookup::InvalidTarget => {
                return ResolutionResult::not_found(NotFoundReason::InvalidTarget);
            }
        };

        match mode {
            ResolutionMode::Runtime => {
                // Node.js commits to the first target
                let Some(path) = candidates.first().and_then(|c| normalize(c).ok()) else {
                    return ResolutionResult::not_found(NotFoundReason::InvalidTarget);
                };
                if self.vfs.is_file(&path) {
                    self.found(path, false)
                } else {
                    trace!("Exports target '{}' does not exist", path);
                    ResolutionResult::not_found(NotFoundReason::FileNotFound)
                }
            }
            ResolutionMode::Types => {
                for (index, candidate) in candidates.iter().enumerate() {
                    let Ok(path) = normalize(candidate) else { continue };
                    if is_declaration_path(&path) && self.vfs.is_file(&path) {
                        return self.found(path, index > 0);
                    }
                    trace!("Exports target '{}' is not a declaration file", path);
                }
                self.types_field_or(subpath, mode, NotFoundReason::NotADeclaration)
            }
        }
    }

    /// The root falls back to `types`/`typings` when an exported target has
    /// no declaration file.
    fn types_field_or(
        &self,
        subpath: &str,
        mode: ResolutionMode,
        reason: NotFoundReason,
    ) -> ResolutionResult {
        if mode == ResolutionMode::Types
            && subpath == ROOT_SUBPATH
            && let Some(types) = self.package.types.as_deref()
            && let Ok(path) = normalize(types)
            && let Some(found) = self.load_types(&path)
        {
            trace!("Using the types field '{}' for the package root", found);
            return self.found(found, false);
        }
        ResolutionResult::not_found(reason)
    }

    fn resolve_bundler_exports(
        &self,
        exports: &ExportsValue,
        subpath: &str,
        mode: ResolutionMode,
        conditions: &ConditionSet,
    ) -> ResolutionResult {
        let ExportsLookup::Candidates(candidates) = lookup(exports, subpath, conditions) else {
            trace!("Bundler falls back to legacy fields for '{}'", subpath);
            return self.resolve_legacy(ResolutionKind::Bundler, subpath, mode);
        };

        // A matched target is authoritative even when its file is missing
        match mode {
            ResolutionMode::Types => {
                for (index, candidate) in candidates.iter().enumerate() {
                    let Ok(path) = normalize(candidate) else { continue };
                    if let Some(found) = self.load_types_file(&path) {
                        return self.found(found, index > 0);
                    }
                }
                ResolutionResult::not_found(NotFoundReason::NotADeclaration)
            }
            ResolutionMode::Runtime => {
                let extensions = BUNDLER_RUNTIME_EXTENSIONS;
                match candidates.first().and_then(|c| normalize(c).ok()) {
                    Some(path) => match self.load_runtime_file(&path, extensions) {
                        Some(found) => self.found(found, false),
                        None => ResolutionResult::not_found(NotFoundReason::FileNotFound),
                    },
                    None => ResolutionResult::not_found(NotFoundReason::InvalidTarget),
                }
            }
        }
    }

    /// Resolution through `main`/`module`/`types` and file probing.
    fn resolve_legacy(
        &self,
        kind: ResolutionKind,
        subpath: &str,
        mode: ResolutionMode,
    ) -> ResolutionResult {
        if subpath == ROOT_SUBPATH {
            return self.resolve_legacy_root(kind, mode);
        }
        let Ok(path) = normalize(subpath) else {
            return ResolutionResult::not_found(NotFoundReason::FileNotFound);
        };

        match mode {
            ResolutionMode::Runtime => self.resolve_file_path(kind, &path, mode),
            ResolutionMode::Types => {
                let mut result = ResolutionResult::not_found(NotFoundReason::FileNotFound);
                for candidate in self.types_versions_candidates(&path) {
                    result = self.resolve_file_path(kind, &candidate, mode);
                    if result.is_found() {
                        break;
                    }
                }
                result
            }
        }
    }

    fn resolve_legacy_root(&self, kind: ResolutionKind, mode: ResolutionMode) -> ResolutionResult {
        let main = self.package.main.as_deref().and_then(|m| normalize(m).ok());
        let found = match mode {
            ResolutionMode::Types => {
                let from_types_field = self
                    .package
                    .types
                    .as_deref()
                    .and_then(|t| normalize(t).ok())
                    .and_then(|t| self.first_types_versions_match(&t));
                from_types_field
                    .or_else(|| main.as_deref().and_then(|m| self.load_types(m)))
                    .or_else(|| self.first_types_versions_match(INDEX_STEM))
            }
            ResolutionMode::Runtime => {
                let extensions = runtime_extensions(kind);
                let module = match kind {
                    ResolutionKind::Bundler => {
                        self.package.module.as_deref().and_then(|m| normalize(m).ok())
                    }
                    _ => None,
                };
                module
                    .as_deref()
                    .and_then(|m| self.load_runtime(m, extensions))
                    .or_else(|| main.as_deref().and_then(|m| self.load_runtime(m, extensions)))
                    .or_else(|| self.load_runtime_file(INDEX_STEM, extensions))
            }
        };

        match found {
            Some(path) => self.found(path, false),
            None => ResolutionResult::not_found(NotFoundReason::FileNotFound),
        }
    }

    /// Resolves a package-relative file path with the probing rules of `kind`.
    fn resolve_file_path(
        &self,
        kind: ResolutionKind,
        path: &str,
        mode: ResolutionMode,
    ) -> ResolutionResult {
        if kind == ResolutionKind::Node16Esm {
            return self.resolve_exact(path, mode);
        }
        let found = match mode {
            ResolutionMode::Types => self.load_types(path),
            ResolutionMode::Runtime => self.load_runtime(path, runtime_extensions(kind)),
        };
        match found {
            Some(path) => self.found(path, false),
            None => ResolutionResult::not_found(NotFoundReason::FileNotFound),
        }
    }

    /// ESM specifiers name a file exactly: no extensions, no directories.
    fn resolve_exact(&self, path: &str, mode: ResolutionMode) -> ResolutionResult {
        let target = match mode {
            ResolutionMode::Runtime => Some(path.to_string()),
            ResolutionMode::Types if is_declaration_path(path) => Some(path.to_string()),
            ResolutionMode::Types => declaration_counterpart(path),
        };
        if let Some(target) = target
            && self.vfs.is_file(&target)
        {
            return self.found(target, false);
        }
        if self.vfs.is_dir(path) {
            return ResolutionResult::not_found(NotFoundReason::UnsupportedDirectoryImport);
        }
        ResolutionResult::not_found(NotFoundReason::FileNotFound)
    }

    fn types_versions_candidates(&self, path: &str) -> Vec<String> {
        let mapped = self.package.types_versions.as_ref().and_then(|tv| tv.map(path));
        match mapped {
            Some(targets) => {
                trace!("typesVersions maps '{}' to {:?}", path, targets);
                targets.iter().filter_map(|t| normalize(t).ok()).collect()
            }
            None => vec![path.to_string()],
        }
    }

    fn first_types_versions_match(&self, path: &str) -> Option<String> {
        self.types_versions_candidates(path).iter().find_map(|c| self.load_types(c))
    }

    /// Declaration file for `path` as a file, then as a directory.
    fn load_types(&self, path: &str) -> Option<String> {
        self.load_types_file(path).or_else(|| self.load_types_directory(path))
    }

    fn load_types_file(&self, path: &str) -> Option<String> {
        if is_declaration_path(path) {
            return self.vfs.is_file(path).then(|| path.to_string());
        }
        if let Some(counterpart) = declaration_counterpart(path)
            && self.vfs.is_file(&counterpart)
        {
            return Some(counterpart);
        }
        TYPES_EXTENSIONS
            .iter()
            .map(|ext| format!("{path}{ext}"))
            .find(|candidate| self.vfs.is_file(candidate))
    }

    fn load_types_directory(&self, dir: &str) -> Option<String> {
        if !self.vfs.is_dir(dir) {
            return None;
        }
        let manifest = self.nested_manifest(dir);
        let from_manifest = manifest.as_ref().and_then(|m| {
            let types = m.types.as_deref().and_then(|t| join(dir, t).ok());
            let main = m.main.as_deref().and_then(|t| join(dir, t).ok());
            types
                .and_then(|t| self.load_types_file(&t))
                .or_else(|| main.and_then(|m| self.load_types_file(&m)))
        });
        from_manifest.or_else(|| join(dir, INDEX_STEM).ok().and_then(|i| self.load_types_file(&i)))
    }

    /// Runtime file for `path` as a file, then as a directory.
    fn load_runtime(&self, path: &str, extensions: &[&str]) -> Option<String> {
        self.load_runtime_file(path, extensions)
            .or_else(|| self.load_runtime_directory(path, extensions))
    }

    fn load_runtime_file(&self, path: &str, extensions: &[&str]) -> Option<String> {
        if self.vfs.is_file(path) {
            return Some(path.to_string());
        }
        extensions.iter().map(|ext| format!("{path}{ext}")).find(|c| self.vfs.is_file(c))
    }

    fn load_runtime_directory(&self, dir: &str, extensions: &[&str]) -> Option<String> {
        if !self.vfs.is_dir(dir) {
            return None;
        }
        let from_main = self
            .nested_manifest(dir)
            .and_then(|m| m.main)
            .and_then(|main| join(dir, &main).ok())
            .and_then(|main| {
                let index = join(&main, INDEX_STEM).ok();
                self.load_runtime_file(&main, extensions)
                    .or_else(|| index.and_then(|i| self.load_runtime_file(&i, extensions)))
            });
        from_main.or_else(|| {
            join(dir, INDEX_STEM).ok().and_then(|i| self.load_runtime_file(&i, extensions))
        })
    }

    /// `package.json` of a directory; the package root uses the descriptor.
    fn nested_manifest(&self, dir: &str) -> Option<PackageDescriptor> {
        if dir.is_empty() {
            return Some(self.package.clone());
        }
        let bytes = self.vfs.read(&join(dir, PACKAGE_JSON).ok()?).ok()?;
        let value: Value = serde_json::from_slice(bytes).ok()?;
        PackageDescriptor::from_value(&value).ok()
    }

    fn found(&self, path: String, used_fallback_condition: bool) -> ResolutionResult {
        ResolutionResult::Found(Resolution {
            module_format: self.classifier.declared_format(&path),
            is_declaration: is_declaration_path(&path),
            used_fallback_condition,
            path,
        })
    }
}

fn runtime_extensions(kind: ResolutionKind) -> &'static [&'static str] {
    match kind {
        ResolutionKind::Bundler => BUNDLER_RUNTIME_EXTENSIONS,
        _ => CJS_RUNTIME_EXTENSIONS,
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
}

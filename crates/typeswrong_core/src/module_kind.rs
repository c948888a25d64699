use dashmap::DashMap;
use log::{debug, trace};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    constants::PACKAGE_JSON,
    package_json::PackageType,
    syntax::{SyntaxInfo, analyze_syntax},
    types::{FileExtension, ModuleFormat},
    vfs::{Vfs, parent_dir},
};

pub struct ModuleKindClassifier<'a> {
    vfs: &'a Vfs,
    /// Directories holding a `package.json`, mapped to its `type`.
    scopes: BTreeMap<String, Option<PackageType>>,
    cache: DashMap<String, Arc<SyntaxInfo>>,
}

impl<'a> ModuleKindClassifier<'a> {
    /// Indexes every `package.json` in `vfs`. The root scope takes `root_type`
    /// rather than whatever the root manifest in the VFS says.
    pub fn new(vfs: &'a Vfs, root_type: Option<PackageType>) -> Self {
        let mut scopes = BTreeMap::new();
        for file in vfs.files() {
            let Some(dir) = manifest_dir(file.path()) else { continue };
            if dir.is_empty() {
                continue;
            }
            // Unparsable manifests still bound the scope, without a type
            let package_type = serde_json::from_slice::<Value>(file.bytes())
                .ok()
                .and_then(|v| PackageType::from_value(v.get("type")));
            trace!("Found package scope '{}' ({:?})", dir, package_type);
            scopes.insert(dir.to_string(), package_type);
        }
        scopes.insert(String::new(), root_type);
        debug!("Indexed {} package scopes", scopes.len());

        Self { vfs, scopes, cache: DashMap::new() }
    }

    /// Format Node.js loads `path` as, without looking at its contents.
    pub fn declared_format(&self, path: &str) -> ModuleFormat {
        match FileExtension::from_path(path) {
            FileExtension::Mjs | FileExtension::Dmts => ModuleFormat::Esm,
            FileExtension::Cjs | FileExtension::Dcts => ModuleFormat::Cjs,
            FileExtension::Js | FileExtension::Dts => match self.scope_type(path) {
                Some(PackageType::Module) => ModuleFormat::Esm,
                _ => ModuleFormat::Cjs,
            },
            FileExtension::Json | FileExtension::Other => ModuleFormat::Unknown,
        }
    }

    /// `type` of the nearest `package.json` above `path`.
    fn scope_type(&self, path: &str) -> Option<PackageType> {
        let mut dir = parent_dir(path);
        while let Some(d) = dir {
            if let Some(package_type) = self.scopes.get(d) {
                return *package_type;
            }
            dir = parent_dir(d);
        }
        None
    }

    /// Scans a script or declaration file, parsing each path at most once.
    ///
    /// Returns `None` for missing files and for files that are neither.
    pub fn syntax(&self, path: &str) -> Option<Arc<SyntaxInfo>> {
        if let Some(info) = self.cache.get(path) {
            trace!("Cache hit for syntax: {}", path);
            return Some(Arc::clone(info.value()));
        }

        let file = self.vfs.file(path).ok()?;
        let extension = file.extension();
        if !extension.is_runtime_script() && !extension.is_declaration() {
            return None;
        }

        let info = Arc::new(analyze_syntax(file.path(), file.text()));
        self.cache.insert(path.to_string(), Arc::clone(&info));
        Some(info)
    }
}

fn manifest_dir(path: &str) -> Option<&str> {
    if path == PACKAGE_JSON {
        return Some("");
    }
    path.strip_suffix(PACKAGE_JSON)?.strip_suffix('/')
}

use log::{debug, trace};
use typeswrong_core::{ExportsValue, PACKAGE_JSON, PackageDescriptor, ROOT_SUBPATH, ResolutionKind};

use crate::types::EntryPoint;

/// Subpaths a consumer of `package` can import.
pub fn enumerate_entry_points(
    package: &PackageDescriptor,
    kinds: &[ResolutionKind],
) -> Vec<EntryPoint> {
    let manifest_subpath = format!("./{PACKAGE_JSON}");
    let mut entry_points: Vec<EntryPoint> = Vec::new();
    let mut push = |subpath: String, is_pattern: bool| {
        if entry_points.iter().any(|e| e.subpath == subpath) {
            return;
        }
        trace!("Entry point '{}' (pattern: {})", subpath, is_pattern);
        let resolution_kinds = if is_pattern { Vec::new() } else { kinds.to_vec() };
        entry_points.push(EntryPoint { subpath, is_pattern, resolution_kinds });
    };

    match &package.exports {
        Some(ExportsValue::Subpaths(entries)) => {
            for (key, value) in entries {
                if *key == manifest_subpath || *value == ExportsValue::Null {
                    continue;
                }
                push(key.clone(), key.contains('*'));
            }
        }
        Some(_) => push(ROOT_SUBPATH.to_string(), false),
        None => {
            push(ROOT_SUBPATH.to_string(), false);
            if let Some(types_versions) = &package.types_versions {
                for key in types_versions.literal_keys() {
                    push(format!("./{key}"), false);
                }
            }
        }
    }

    debug!("Enumerated {} entry points", entry_points.len());
    entry_points
}

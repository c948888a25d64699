//! Constants for file extensions, probing order and export conditions.
//!
//! This module centralizes extension handling so the resolver, the module
//! kind classifier and the virtual file system agree on what a file is.
//!
//! ## Runtime extensions
//!
//! - `.js`: format inherited from the nearest `package.json` `type`
//! - `.mjs`: always an ES module
//! - `.cjs`: always CommonJS
//!
//! ## Declaration extensions
//!
//! - `.d.ts` pairs with `.js`, `.d.mts` with `.mjs`, `.d.cts` with `.cjs`

/// Declaration file suffixes, longest first so `.d.mts` wins over `.ts` style checks
pub const DECLARATION_EXTENSIONS: &[&str] = &[".d.mts", ".d.cts", ".d.ts"];

/// Runtime extensions paired with the declaration extension TypeScript looks for
pub const DECLARATION_COUNTERPARTS: &[(&str, &str)] =
    &[(".mjs", ".d.mts"), (".cjs", ".d.cts"), (".js", ".d.ts")];

/// Extensions probed by legacy `require` resolution (in priority order)
pub const CJS_RUNTIME_EXTENSIONS: &[&str] = &[".js", ".json"];

/// Extensions probed by bundlers when a request has no extension
pub const BUNDLER_RUNTIME_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".json"];

/// Extensions probed in types mode when a request has no extension
pub const TYPES_EXTENSIONS: &[&str] = &[".d.ts"];

/// Index file stem tried when a request names a directory
pub const INDEX_STEM: &str = "index";

/// Condition that matches under every resolution kind
pub const DEFAULT_CONDITION: &str = "default";

/// Condition TypeScript adds in types mode
pub const TYPES_CONDITION: &str = "types";

/// Subpath of the package root
pub const ROOT_SUBPATH: &str = ".";

/// Name of the package manifest
pub const PACKAGE_JSON: &str = "package.json";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_runtime_extension_has_a_declaration_counterpart() {
        for (runtime, declaration) in DECLARATION_COUNTERPARTS {
            assert!(runtime.starts_with('.'));
            assert!(
                DECLARATION_EXTENSIONS.contains(declaration),
                "'{}' is not a declaration extension",
                declaration
            );
        }
    }

    #[test]
    fn test_compound_declaration_extensions_come_first() {
        // ".d.ts" must be checked last, otherwise "x.d.mts" would never match
        assert_eq!(DECLARATION_EXTENSIONS.last(), Some(&".d.ts"));
    }

    #[test]
    fn test_probe_lists_start_with_js() {
        assert_eq!(CJS_RUNTIME_EXTENSIONS.first(), Some(&".js"));
        assert_eq!(BUNDLER_RUNTIME_EXTENSIONS.first(), Some(&".js"));
        assert!(BUNDLER_RUNTIME_EXTENSIONS.contains(&".mjs"));
        assert!(BUNDLER_RUNTIME_EXTENSIONS.contains(&".cjs"));
    }
}

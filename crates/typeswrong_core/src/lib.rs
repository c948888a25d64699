//! Core of the typeswrong package analyzer.
//!
//! This crate simulates how TypeScript and JavaScript runtimes resolve the
//! files of a single npm package, including:
//! - An in-memory file system built once from the package contents
//! - The `package.json` model with ordered `exports` and `typesVersions`
//! - Node10, Node16 (CJS and ESM) and bundler resolution, in types and runtime modes
//! - Declared module format and authored syntax of resolved files

mod constants;
mod error;
mod exports;
mod module_kind;
mod package_json;
mod resolver;
mod syntax;
mod types;
mod vfs;

// Re-export public API
pub use constants::{DECLARATION_EXTENSIONS, PACKAGE_JSON, ROOT_SUBPATH};
pub use error::{Error, Result};
pub use exports::{ConditionSet, ExportsLookup, lookup};
pub use module_kind::ModuleKindClassifier;
pub use package_json::{ExportsValue, PackageDescriptor, PackageType, TypesVersions};
pub use resolver::Resolver;
pub use syntax::{CjsExports, SyntaxInfo, SyntaxKind, analyze_syntax};
pub use types::{
    FileExtension, ModuleFormat, NotFoundReason, Resolution, ResolutionKind, ResolutionMode,
    ResolutionResult, declaration_counterpart, is_declaration_path,
};
pub use vfs::{Vfs, VirtualFile, normalize};

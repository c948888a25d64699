use serde::Serialize;
use std::fmt;
use typeswrong_core::{ModuleFormat, NotFoundReason, ResolutionKind, ResolutionResult};

/// Kinds of mismatch between what the types promise and what runs.
///
/// Declaration order is the order problems of one cell are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ProblemKind {
    /// The runtime file resolves but no declaration file does.
    NoResolution,
    /// Some entry points are typed and others resolve without types.
    UntypedResolution,
    #[serde(rename = "FalseESM")]
    FalseEsm,
    #[serde(rename = "FalseCJS")]
    FalseCjs,
    #[serde(rename = "CJSResolvesToESM")]
    CjsResolvesToEsm,
    #[serde(rename = "CJSOnlyExportsDefault")]
    CjsOnlyExportsDefault,
    NamedExports,
    FallbackCondition,
    /// Types resolve but nothing would run.
    InternalResolutionError,
}

impl ProblemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoResolution => "NoResolution",
            Self::UntypedResolution => "UntypedResolution",
            Self::FalseEsm => "FalseESM",
            Self::FalseCjs => "FalseCJS",
            Self::CjsResolvesToEsm => "CJSResolvesToESM",
            Self::CjsOnlyExportsDefault => "CJSOnlyExportsDefault",
            Self::NamedExports => "NamedExports",
            Self::FallbackCondition => "FallbackCondition",
            Self::InternalResolutionError => "InternalResolutionError",
        }
    }

    /// Short human readable heading.
    pub fn title(self) -> &'static str {
        match self {
            Self::NoResolution => "Resolution failed",
            Self::UntypedResolution => "No types",
            Self::FalseEsm => "Masquerading as ESM",
            Self::FalseCjs => "Masquerading as CJS",
            Self::CjsResolvesToEsm => "ESM (dynamic import only)",
            Self::CjsOnlyExportsDefault => "CJS default export",
            Self::NamedExports => "Named exports",
            Self::FallbackCondition => "Used fallback condition",
            Self::InternalResolutionError => "Internal resolution error",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::NoResolution => "Import found at runtime, but no declaration file resolves.",
            Self::UntypedResolution => "Import resolves to an untyped JavaScript file.",
            Self::FalseEsm => "Declared as CommonJS, but the file is ESM.",
            Self::FalseCjs => "Declared as ESM, but the file is CommonJS.",
            Self::CjsResolvesToEsm => "A require() resolves to ES module types.",
            Self::CjsOnlyExportsDefault => {
                "Types export a default, but the CommonJS module only sets exports.default."
            }
            Self::NamedExports => "Types declare named exports the CommonJS module lacks.",
            Self::FallbackCondition => "Types were found only after an earlier condition failed.",
            Self::InternalResolutionError => "Types resolve, but the runtime import fails.",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pair of formats disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MismatchSource {
    /// Declaration file format vs runtime file format.
    TypesVsRuntime,
    /// Runtime file format vs the syntax it is written in.
    DeclaredVsSyntax,
}

/// A single (entry point, resolution kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub entry_point: String,
    pub resolution_kind: ResolutionKind,
}

/// Kind specific data attached to a [`Problem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProblemDetails {
    None,
    ResolutionFailure { reason: NotFoundReason },
    FormatMismatch { source: MismatchSource, expected: ModuleFormat, actual: ModuleFormat },
    MissingExports { names: Vec<String> },
    UntypedCells { cells: Vec<Cell> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub kind: ProblemKind,
    pub entry_point: String,
    pub resolution_kind: ResolutionKind,
    pub types_path: Option<String>,
    pub runtime_path: Option<String>,
    pub details: ProblemDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub subpath: String,
    /// `*` keys are listed but never resolved.
    pub is_pattern: bool,
    pub resolution_kinds: Vec<ResolutionKind>,
}

/// Types and runtime outcome of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellResolution {
    pub entry_point: String,
    pub resolution_kind: ResolutionKind,
    pub types: ResolutionResult,
    pub runtime: ResolutionResult,
}

impl CellResolution {
    pub fn cell(&self) -> Cell {
        Cell { entry_point: self.entry_point.clone(), resolution_kind: self.resolution_kind }
    }

    /// Resolves at runtime without a declaration file.
    pub fn is_untyped(&self) -> bool {
        self.runtime.is_found() && !self.types.is_found()
    }
}

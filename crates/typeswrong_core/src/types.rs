use serde::Serialize;
use std::{fmt, str::FromStr};

use crate::constants::{DECLARATION_COUNTERPARTS, DECLARATION_EXTENSIONS};

/// Extension category of a package file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileExtension {
    Js,
    Mjs,
    Cjs,
    Dts,
    Dmts,
    Dcts,
    Json,
    Other,
}

impl FileExtension {
    pub fn from_path(path: &str) -> Self {
        // Compound extensions first
        if path.ends_with(".d.mts") {
            return Self::Dmts;
        }
        if path.ends_with(".d.cts") {
            return Self::Dcts;
        }
        if path.ends_with(".d.ts") {
            return Self::Dts;
        }
        match path.rsplit_once('.').map(|(_, ext)| ext) {
            Some("js") => Self::Js,
            Some("mjs") => Self::Mjs,
            Some("cjs") => Self::Cjs,
            Some("json") => Self::Json,
            _ => Self::Other,
        }
    }

    pub fn is_declaration(self) -> bool {
        matches!(self, Self::Dts | Self::Dmts | Self::Dcts)
    }

    pub fn is_runtime_script(self) -> bool {
        matches!(self, Self::Js | Self::Mjs | Self::Cjs)
    }
}

/// Returns `true` if `path` ends in `.d.ts`, `.d.mts` or `.d.cts`.
pub fn is_declaration_path(path: &str) -> bool {
    DECLARATION_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Maps `x.js` to `x.d.ts`, `x.mjs` to `x.d.mts` and `x.cjs` to `x.d.cts`.
pub fn declaration_counterpart(path: &str) -> Option<String> {
    if is_declaration_path(path) {
        return None;
    }
    DECLARATION_COUNTERPARTS.iter().find_map(|(runtime, declaration)| {
        path.strip_suffix(runtime).map(|stem| format!("{stem}{declaration}"))
    })
}

/// Module format a file is loaded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    Esm,
    Cjs,
    Unknown,
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Esm => write!(f, "ESM"),
            Self::Cjs => write!(f, "CJS"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Module resolution algorithm being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResolutionKind {
    #[serde(rename = "node10")]
    Node10,
    #[serde(rename = "node16-cjs")]
    Node16Cjs,
    #[serde(rename = "node16-esm")]
    Node16Esm,
    #[serde(rename = "bundler")]
    Bundler,
}

impl ResolutionKind {
    /// Every resolution kind in canonical order.
    pub const ALL: [ResolutionKind; 4] = [
        ResolutionKind::Node10,
        ResolutionKind::Node16Cjs,
        ResolutionKind::Node16Esm,
        ResolutionKind::Bundler,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node10 => "node10",
            Self::Node16Cjs => "node16-cjs",
            Self::Node16Esm => "node16-esm",
            Self::Bundler => "bundler",
        }
    }

    /// Node16 kinds load files in the format Node.js assigns them.
    pub fn enforces_module_format(self) -> bool {
        matches!(self, Self::Node16Cjs | Self::Node16Esm)
    }

    /// Whether the algorithm consults the `exports` field at all.
    pub fn honors_exports(self) -> bool {
        !matches!(self, Self::Node10)
    }
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node10" | "node" => Ok(Self::Node10),
            "node16-cjs" => Ok(Self::Node16Cjs),
            "node16-esm" => Ok(Self::Node16Esm),
            "bundler" => Ok(Self::Bundler),
            other => Err(format!(
                "unknown resolution kind '{}' (expected node10, node16-cjs, node16-esm or bundler)",
                other
            )),
        }
    }
}

/// Which artifact class a resolution targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    Types,
    Runtime,
}

/// A successfully resolved file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub path: String,
    pub module_format: ModuleFormat,
    pub is_declaration: bool,
    /// The file was reached only after an earlier `exports` candidate failed.
    pub used_fallback_condition: bool,
}

/// Why a resolution produced no file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotFoundReason {
    /// A bare specifier names a different package.
    PackageNotFound,
    /// `exports` exists but has no key for the subpath, or maps it to `null`.
    SubpathNotExported,
    /// The subpath is exported but no condition matched.
    NoMatchingCondition,
    /// An `exports` target is not a `./` path inside the package.
    InvalidTarget,
    FileNotFound,
    /// Only runtime files were found where a declaration was required.
    NotADeclaration,
    /// ESM resolution does not load directories.
    UnsupportedDirectoryImport,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PackageNotFound => "package not found",
            Self::SubpathNotExported => "subpath not exported",
            Self::NoMatchingCondition => "no matching export condition",
            Self::InvalidTarget => "invalid export target",
            Self::FileNotFound => "file not found",
            Self::NotADeclaration => "no declaration file",
            Self::UnsupportedDirectoryImport => "directory import not supported",
        };
        f.write_str(text)
    }
}

/// Tagged outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ResolutionResult {
    Found(Resolution),
    NotFound { reason: NotFoundReason },
}

impl ResolutionResult {
    pub fn not_found(reason: NotFoundReason) -> Self {
        Self::NotFound { reason }
    }

    pub fn found(&self) -> Option<&Resolution> {
        match self {
            Self::Found(resolution) => Some(resolution),
            Self::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn path(&self) -> Option<&str> {
        self.found().map(|r| r.path.as_str())
    }
}

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    constants::ROOT_SUBPATH,
    error::{Error, Result},
};

/// The `type` field of a `package.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Module,
    CommonJs,
}

impl PackageType {
    pub(crate) fn from_value(value: Option<&Value>) -> Option<Self> {
        match value?.as_str()? {
            "module" => Some(Self::Module),
            "commonjs" => Some(Self::CommonJs),
            other => {
                warn!("Ignoring unknown package type '{}'", other);
                None
            }
        }
    }
}

/// Recursive shape of the `exports` field.
///
/// Object entries keep their declaration order: the first matching condition
/// wins, so order is semantic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ExportsValue {
    Target(String),
    Null,
    Fallback(Vec<ExportsValue>),
    Conditions(Vec<(String, ExportsValue)>),
    Subpaths(Vec<(String, ExportsValue)>),
}

impl ExportsValue {
    /// Parses the top-level `exports` value.
    pub fn parse(value: &Value) -> Result<Self> {
        Self::parse_inner(value, true)
    }

    fn parse_inner(value: &Value, top_level: bool) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Target(s.clone())),
            Value::Null => Ok(Self::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| Self::parse_inner(item, false))
                .collect::<Result<Vec<_>>>()
                .map(Self::Fallback),
            Value::Object(map) => Self::parse_object(map, top_level),
            other => Err(Error::InvalidPackageMetadata(format!(
                "unsupported exports value: {}",
                other
            ))),
        }
    }

    fn parse_object(map: &Map<String, Value>, top_level: bool) -> Result<Self> {
        let subpath_keys = map.keys().filter(|k| k.starts_with('.')).count();
        if subpath_keys > 0 && subpath_keys != map.len() {
            return Err(Error::InvalidPackageMetadata(
                "exports object mixes subpath keys and condition keys".to_string(),
            ));
        }
        if subpath_keys > 0 && !top_level {
            return Err(Error::InvalidPackageMetadata(
                "subpath keys are only allowed at the top level of exports".to_string(),
            ));
        }

        let entries = map
            .iter()
            .map(|(key, value)| Ok((key.clone(), Self::parse_inner(value, false)?)))
            .collect::<Result<Vec<_>>>()?;

        if subpath_keys > 0 { Ok(Self::Subpaths(entries)) } else { Ok(Self::Conditions(entries)) }
    }

    /// Subpath keys exposed by this exports value, in declaration order.
    ///
    /// Anything other than a subpath map exports only the package root.
    pub fn subpaths(&self) -> Vec<(&str, &ExportsValue)> {
        match self {
            Self::Subpaths(entries) => entries.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            other => vec![(ROOT_SUBPATH, other)],
        }
    }
}

/// The `typesVersions` mapping selected for the running compiler.
///
/// The first range is taken as the match; version ranges are not evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypesVersions {
    pub range: String,
    pub paths: Vec<(String, Vec<String>)>,
}

impl TypesVersions {
    fn parse(value: &Value) -> Option<Self> {
        let (range, mapping) = value.as_object()?.iter().next()?;
        let Some(mapping) = mapping.as_object() else {
            warn!("Ignoring typesVersions range '{}': mapping is not an object", range);
            return None;
        };

        let paths = mapping
            .iter()
            .filter_map(|(pattern, targets)| {
                let targets: Vec<String> = match targets {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => {
                        items.iter().filter_map(|t| t.as_str()).map(str::to_string).collect()
                    }
                    _ => return None,
                };
                Some((pattern.clone(), targets))
            })
            .collect();

        Some(Self { range: range.clone(), paths })
    }

    /// Maps a package-relative path (without `./`) to candidate targets.
    ///
    /// An exact key wins; otherwise the `*` pattern with the longest prefix.
    pub fn map(&self, path: &str) -> Option<Vec<String>> {
        if let Some((_, targets)) = self.paths.iter().find(|(pattern, _)| pattern == path) {
            return Some(targets.clone());
        }

        let mut best: Option<(usize, &str, &Vec<String>)> = None;
        for (pattern, targets) in &self.paths {
            if let Some(star) = match_star_pattern(pattern, path) {
                let prefix_len = pattern.find('*').unwrap_or(0);
                if best.is_none_or(|(len, _, _)| prefix_len > len) {
                    best = Some((prefix_len, star, targets));
                }
            }
        }

        best.map(|(_, star, targets)| targets.iter().map(|t| t.replace('*', star)).collect())
    }

    /// Literal (non-wildcard) keys, which name importable subpaths.
    pub fn literal_keys(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|(k, _)| k.as_str()).filter(|k| !k.contains('*'))
    }
}

/// Matches `subject` against a pattern containing a single `*`.
///
/// Returns the text the `*` stands for. Patterns without `*` never match.
pub(crate) fn match_star_pattern<'a>(pattern: &str, subject: &'a str) -> Option<&'a str> {
    let (prefix, suffix) = pattern.split_once('*')?;
    if subject.len() < prefix.len() + suffix.len() {
        return None;
    }
    if !subject.starts_with(prefix) || !subject.ends_with(suffix) {
        return None;
    }
    Some(&subject[prefix.len()..subject.len() - suffix.len()])
}

/// Parsed `package.json` of the analyzed package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub package_type: Option<PackageType>,
    pub main: Option<String>,
    pub module: Option<String>,
    /// `types`, or `typings` when `types` is absent.
    pub types: Option<String>,
    pub exports: Option<ExportsValue>,
    pub types_versions: Option<TypesVersions>,
}

impl PackageDescriptor {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidPackageMetadata(format!("package.json: {e}")))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(Error::InvalidPackageMetadata(
                "package.json must contain a JSON object".to_string(),
            ));
        };

        let exports = match obj.get("exports") {
            Some(v) => Some(ExportsValue::parse(v)?),
            None => None,
        };

        let descriptor = Self {
            name: string_field(obj, "name"),
            version: string_field(obj, "version"),
            package_type: PackageType::from_value(obj.get("type")),
            main: string_field(obj, "main"),
            module: string_field(obj, "module"),
            types: string_field(obj, "types").or_else(|| string_field(obj, "typings")),
            exports,
            types_versions: obj.get("typesVersions").and_then(TypesVersions::parse),
        };
        debug!(
            "Parsed package.json for {}@{} (exports: {}, typesVersions: {})",
            descriptor.name.as_deref().unwrap_or("<unnamed>"),
            descriptor.version.as_deref().unwrap_or("<unversioned>"),
            descriptor.exports.is_some(),
            descriptor.types_versions.is_some()
        );
        Ok(descriptor)
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => {
            warn!("Ignoring package.json field '{}': expected a string, found {}", key, other);
            None
        }
    }
}

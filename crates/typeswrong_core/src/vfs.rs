use log::{debug, trace};
use path_clean::clean;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::OnceLock,
};

use crate::{
    error::{Error, Result},
    types::FileExtension,
};

/// A single file of the package.
#[derive(Debug)]
pub struct VirtualFile {
    path: String,
    contents: Vec<u8>,
    text: OnceLock<String>,
    extension: FileExtension,
}

impl VirtualFile {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.contents
    }

    /// Contents decoded as UTF-8 on first use; invalid sequences are replaced.
    pub fn text(&self) -> &str {
        self.text.get_or_init(|| String::from_utf8_lossy(&self.contents).into_owned())
    }

    pub fn extension(&self) -> FileExtension {
        self.extension
    }
}

#[derive(Debug, Default)]
pub struct Vfs {
    files: BTreeMap<String, VirtualFile>,
    dirs: BTreeSet<String>,
}

impl Vfs {
    /// Builds the file system from `(path, contents)` pairs.
    ///
    /// Paths are normalized; a path escaping the root fails with
    /// [`Error::InvalidPath`]. Later duplicates replace earlier ones.
    pub fn from_files<I, P>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, Vec<u8>)>,
        P: AsRef<str>,
    {
        let mut vfs = Vfs::default();
        for (path, contents) in files {
            let path = normalize(path.as_ref())?;
            if path.is_empty() {
                return Err(Error::InvalidPath(String::new()));
            }
            trace!("Adding file to vfs: {}", path);

            // Register every ancestor directory
            let mut dir = parent_dir(&path);
            while let Some(d) = dir {
                if !vfs.dirs.insert(d.to_string()) {
                    break;
                }
                dir = parent_dir(d);
            }

            let extension = FileExtension::from_path(&path);
            vfs.files.insert(
                path.clone(),
                VirtualFile { path, contents, text: OnceLock::new(), extension },
            );
        }
        vfs.dirs.insert(String::new());
        debug!("Built vfs with {} files in {} directories", vfs.files.len(), vfs.dirs.len());
        Ok(vfs)
    }

    pub fn file(&self, path: &str) -> Result<&VirtualFile> {
        let path = normalize(path)?;
        self.files.get(&path).ok_or(Error::FileNotFound(path))
    }

    pub fn read(&self, path: &str) -> Result<&[u8]> {
        self.file(path).map(VirtualFile::bytes)
    }

    pub fn read_text(&self, path: &str) -> Result<&str> {
        self.file(path).map(VirtualFile::text)
    }

    /// Whether a file or directory exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    pub fn is_file(&self, path: &str) -> bool {
        normalize(path).map(|p| self.files.contains_key(&p)).unwrap_or(false)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        normalize(path).map(|p| self.dirs.contains(&p)).unwrap_or(false)
    }

    /// Names of the files and directories directly inside `dir`, sorted.
    pub fn list_children(&self, dir: &str) -> Result<Vec<String>> {
        let dir = normalize(dir)?;
        if !self.dirs.contains(&dir) {
            return Err(Error::FileNotFound(dir));
        }
        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };

        let mut names = BTreeSet::new();
        let candidates = self.files.keys().chain(self.dirs.iter());
        for path in candidates {
            if let Some(rest) = path.strip_prefix(&prefix)
                && !rest.is_empty()
                && !rest.contains('/')
            {
                names.insert(rest.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    pub fn files(&self) -> impl Iterator<Item = &VirtualFile> {
        self.files.values()
    }

    pub fn declaration_files(&self) -> impl Iterator<Item = &VirtualFile> {
        self.files.values().filter(|f| f.extension.is_declaration())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Normalizes a package-relative path to POSIX form without `.` or `..`.
///
/// The package root normalizes to the empty string.
pub fn normalize(path: &str) -> Result<String> {
    let slashed = path.replace('\\', "/");
    let relative = slashed.trim_start_matches('/');
    if relative.is_empty() {
        return Ok(String::new());
    }
    let cleaned = clean(relative).to_string_lossy().replace('\\', "/");
    if cleaned == ".." || cleaned.starts_with("../") {
        return Err(Error::InvalidPath(path.to_string()));
    }
    if cleaned == "." {
        return Ok(String::new());
    }
    Ok(cleaned)
}

/// Joins `request` onto the package-relative directory `dir` and normalizes.
pub fn join(dir: &str, request: &str) -> Result<String> {
    if dir.is_empty() { normalize(request) } else { normalize(&format!("{dir}/{request}")) }
}

/// Parent directory of a normalized path; the root is `""`.
pub fn parent_dir(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs(paths: &[(&str, &str)]) -> Vfs {
        Vfs::from_files(paths.iter().map(|(p, c)| (*p, c.as_bytes().to_vec()))).unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("./index.js").unwrap(), "index.js");
        assert_eq!(normalize("/lib/./a.js").unwrap(), "lib/a.js");
        assert_eq!(normalize("lib/sub/../a.js").unwrap(), "lib/a.js");
        assert_eq!(normalize("lib\\a.js").unwrap(), "lib/a.js");
        assert_eq!(normalize(".").unwrap(), "");
        assert_eq!(normalize("").unwrap(), "");
    }

    #[test]
    fn test_normalize_rejects_escaping_paths() {
        assert_eq!(normalize("../secret"), Err(Error::InvalidPath("../secret".to_string())));
        assert!(normalize("lib/../../secret").is_err());
        assert!(normalize("..").is_err());
    }

    #[test]
    fn test_read_and_exists() {
        let fs = vfs(&[("package.json", "{}"), ("lib/index.js", "module.exports = 1;")]);
        assert_eq!(fs.read_text("./lib/index.js").unwrap(), "module.exports = 1;");
        assert_eq!(fs.read("package.json").unwrap(), b"{}");
        assert!(fs.exists("lib"));
        assert!(fs.is_dir("lib"));
        assert!(!fs.is_file("lib"));
        assert!(fs.is_file("lib/index.js"));
        assert!(!fs.exists("lib/missing.js"));
        assert_eq!(fs.read("missing.js"), Err(Error::FileNotFound("missing.js".to_string())));
        assert!(matches!(fs.read("../outside.js"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_list_children_is_sorted_and_includes_directories() {
        let fs = vfs(&[
            ("package.json", "{}"),
            ("lib/b.js", ""),
            ("lib/a.js", ""),
            ("lib/nested/c.js", ""),
            ("README.md", ""),
        ]);
        assert_eq!(fs.list_children("").unwrap(), vec!["README.md", "lib", "package.json"]);
        assert_eq!(fs.list_children("lib").unwrap(), vec!["a.js", "b.js", "nested"]);
        assert!(fs.list_children("nope").is_err());
    }

    #[test]
    fn test_from_files_rejects_traversal() {
        let result = Vfs::from_files(vec![("../evil.js", Vec::new())]);
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_declaration_files() {
        let fs = vfs(&[
            ("index.js", ""),
            ("index.d.ts", ""),
            ("esm/index.d.mts", ""),
            ("cjs/index.d.cts", ""),
        ]);
        let decls: Vec<&str> = fs.declaration_files().map(|f| f.path()).collect();
        assert_eq!(decls, vec!["cjs/index.d.cts", "esm/index.d.mts", "index.d.ts"]);
    }

    #[test]
    fn test_text_is_decoded_lossily() {
        let fs = Vfs::from_files(vec![("bin.js", vec![0x66, 0xff, 0x6f])]).unwrap();
        assert_eq!(fs.read_text("bin.js").unwrap(), "f\u{fffd}o");
    }

    #[test]
    fn test_join_and_parent_dir() {
        assert_eq!(join("", "./a.js").unwrap(), "a.js");
        assert_eq!(join("lib", "../a.js").unwrap(), "a.js");
        assert!(join("", "../a.js").is_err());
        assert_eq!(parent_dir("lib/a.js"), Some("lib"));
        assert_eq!(parent_dir("a.js"), Some(""));
        assert_eq!(parent_dir(""), None);
    }
}

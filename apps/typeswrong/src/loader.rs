use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use ignore::WalkBuilder;
use log::{debug, trace};
use std::{
    fs::{self, File},
    io::Read,
    path::{Component, Path},
};
use tar::Archive;
use typeswrong_core::Vfs;

/// Directories that are never part of a published package.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

/// Loads a package directory or an npm `.tgz` tarball into memory.
pub fn load_package(path: &Path) -> Result<Vfs> {
    let files = if path.is_dir() {
        read_directory(path)?
    } else if is_tarball(path) {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        read_tarball(file).with_context(|| format!("Failed to extract {}", path.display()))?
    } else {
        bail!("{} is neither a package directory nor a .tgz tarball", path.display());
    };

    debug!("Read {} files from {}", files.len(), path.display());
    Vfs::from_files(files)
        .with_context(|| format!("Invalid package contents in {}", path.display()))
}

fn is_tarball(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    path.is_file() && (name.ends_with(".tgz") || name.ends_with(".tar.gz"))
}

/// Every file below `root`, ignore files included.
fn read_directory(root: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    debug!("Walking package directory: {}", root.display());
    // Published packages often contain files a .gitignore would hide
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !SKIPPED_DIRS.contains(&name.as_ref())
        })
        .build();

    let mut files = Vec::new();
    for res in walker {
        let dent = res?;
        if !dent.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let p = dent.path();
        let rel = p.strip_prefix(root).unwrap_or(p);
        let rel = rel.to_string_lossy().replace('\\', "/");
        trace!("Reading package file: {}", rel);
        let contents = fs::read(p).with_context(|| format!("Failed to read {}", p.display()))?;
        files.push((rel, contents));
    }
    Ok(files)
}

/// Regular files of a gzipped npm tarball, without the leading `package/`.
pub(crate) fn read_tarball<R: Read>(reader: R) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut files = Vec::new();

    for entry in archive.entries().context("Failed to read tarball entries")? {
        let mut entry = entry.context("Failed to read tarball entry")?;
        if !entry.header().entry_type().is_file() {
            // Directories, links and other special entries
            continue;
        }

        let path = entry.path().context("Failed to read entry path")?.into_owned();
        let rel: Vec<String> = path
            .components()
            .skip(1)
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                Component::ParentDir => Some("..".to_string()),
                _ => None,
            })
            .collect();
        if rel.is_empty() {
            continue;
        }

        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        trace!("Extracted tarball entry: {}", rel.join("/"));
        files.push((rel.join("/"), contents));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use tar::{Builder, EntryType, Header};
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) {
        let file_path = dir.join(name);
        fs::create_dir_all(file_path.parent().unwrap()).unwrap();
        fs::write(&file_path, content).expect("Failed to write test file");
    }

    fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content) in entries {
            let mut header = Header::new_gnu();
            if path.ends_with('/') {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
            } else {
                header.set_entry_type(EntryType::Regular);
                header.set_size(content.len() as u64);
            }
            header.set_mode(0o644);
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_load_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "package.json", "{}");
        create_test_file(temp_dir.path(), "lib/index.js", "exports.a = 1;");
        create_test_file(temp_dir.path(), "node_modules/dep/index.js", "");
        let vfs = load_package(temp_dir.path()).unwrap();
        assert_eq!(vfs.len(), 2);
        assert_eq!(vfs.read_text("lib/index.js").unwrap(), "exports.a = 1;");
        assert!(!vfs.exists("node_modules"));
    }

    #[test]
    fn test_load_directory_ignores_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "package.json", "{}");
        create_test_file(temp_dir.path(), ".gitignore", "dist/\n");
        create_test_file(temp_dir.path(), "dist/index.d.ts", "export {};");
        let vfs = load_package(temp_dir.path()).unwrap();
        assert!(vfs.is_file("dist/index.d.ts"));
    }

    #[test]
    fn test_read_tarball_strips_package_prefix() {
        let bytes = tarball(&[
            ("package/", ""),
            ("package/package.json", r#"{"name":"pkg"}"#),
            ("package/dist/index.js", "export {};"),
        ]);
        let files = read_tarball(bytes.as_slice()).unwrap();
        let paths: Vec<&str> = files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["package.json", "dist/index.js"]);
        assert_eq!(files[0].1, br#"{"name":"pkg"}"#.to_vec());
    }

    #[test]
    fn test_load_tarball_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("pkg-1.0.0.tgz");
        fs::write(&archive, tarball(&[("package/package.json", "{}"), ("package/index.js", "")]))
            .unwrap();
        let vfs = load_package(&archive).unwrap();
        assert!(vfs.is_file("package.json"));
        assert!(vfs.is_file("index.js"));
    }

    #[test]
    fn test_rejects_other_files() {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(temp_dir.path(), "notes.txt", "");
        assert!(load_package(&temp_dir.path().join("notes.txt")).is_err());
        assert!(load_package(&temp_dir.path().join("missing")).is_err());
    }
}

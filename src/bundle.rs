//! Application source bundles.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{DeployError, Result};

pub const REQUIREMENTS_FILE: &str = "requirements.txt";
const SKIPPED_DIRS: &[&str] = &[".git", "__pycache__", "venv", ".venv", "virtualenv", ".tierdeploy"];

/// every file under `root`, as sorted paths relative to `root`. Symlinks are not followed;
/// a link to a file is kept, a link to a directory is left out.
pub fn collect_files(root: &Path, skip: &dyn Fn(&DirEntry) -> bool) -> std::io::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in WalkDir::new(root).follow_links(false).min_depth(1).into_iter().filter_entry(|e| !skip(e)) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if entry.path_is_symlink() && !entry.path().is_file() {
            debug!(path = %entry.path().display(), "Skipping link that is not a file");
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// `a/b/c.txt` on every platform.
pub fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn skip_app_file(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_str().unwrap_or_default();
    if entry.file_type().is_dir() {
        return SKIPPED_DIRS.contains(&name);
    }
    name.ends_with(".pyc")
}

fn package_name(line: &str) -> String {
    line.split(|c: char| "=<>!~[; ".contains(c))
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
        .replace('_', "-")
}

/// `mysqlclient` needs native MySQL headers the host image does not ship,
/// so it is replaced by the pure-python `PyMySQL`.
pub fn rewrite_requirements(contents: &str, mysql_family: bool) -> String {
    let packages: Vec<String> = contents.lines().map(|l| package_name(l.trim())).collect();
    let has_pymysql = packages.iter().any(|p| p == "pymysql");
    let mut out = vec![];
    let mut has_client = has_pymysql;
    for (line, package) in contents.lines().zip(packages.iter()) {
        if package == "mysqlclient" {
            if !has_pymysql && !has_client {
                out.push("PyMySQL".to_string());
                has_client = true;
            }
            continue;
        }
        out.push(line.to_string());
    }
    if mysql_family && !has_client {
        out.push("PyMySQL".to_string());
    }
    let mut rewritten = out.join("\n");
    rewritten.push('\n');
    rewritten
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub version_label: String,
    /// object key in the artifact bucket
    pub key: String,
    pub bytes: Vec<u8>,
    pub files: usize,
}

/// zip the application directory. The label only depends on file paths and contents,
/// so an unchanged source tree maps to the same key.
pub fn bundle_app(app_path: &Path, app_name: &str, mysql_family: bool) -> Result<Bundle> {
    let bundle_err = |message: String| DeployError::Bundle { path: app_path.to_path_buf(), message };
    if !app_path.is_dir() {
        return Err(bundle_err("not a directory".to_string()));
    }
    let mut files = collect_files(app_path, &skip_app_file).map_err(|e| bundle_err(e.to_string()))?;
    let has_requirements = files.iter().any(|f| f == Path::new(REQUIREMENTS_FILE));
    if !has_requirements && mysql_family {
        files.push(PathBuf::from(REQUIREMENTS_FILE));
        files.sort();
    }

    let mut checksum = adler::Adler32::new();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for relative in files.iter() {
        let name = slash_path(relative);
        let contents = if relative == Path::new(REQUIREMENTS_FILE) {
            let original = match has_requirements {
                true => std::fs::read_to_string(app_path.join(relative)).map_err(|e| bundle_err(e.to_string()))?,
                false => String::new(),
            };
            rewrite_requirements(&original, mysql_family).into_bytes()
        } else {
            std::fs::read(app_path.join(relative)).map_err(|e| bundle_err(format!("{name}: {e}")))?
        };
        debug!(file = %name, size = contents.len(), "Adding to bundle");
        checksum.write_slice(name.as_bytes());
        checksum.write_slice(&contents);
        zip.start_file(name.as_str(), options).map_err(|e| bundle_err(e.to_string()))?;
        zip.write_all(&contents).map_err(|e| bundle_err(e.to_string()))?;
    }
    let bytes = zip.finish().map_err(|e| bundle_err(e.to_string()))?.into_inner();

    let version_label = format!("{}-{:08x}", app_name, checksum.checksum());
    let key = format!("{}/{}.zip", app_name, version_label);
    info!(label = %version_label, files = files.len(), size = bytes.len(), "Bundled application");
    Ok(Bundle { version_label, key, bytes, files: files.len() })
}

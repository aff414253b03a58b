//! Discovery of the editable web files inside a site's working tree.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

const EDITABLE_EXTENSIONS: &[&str] = &["html", "htm", "css", "js"];
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Directory the coding assistant edits: `site/` when the working tree has
/// one, otherwise the working tree itself.
pub fn edit_target(working_dir: &Path) -> PathBuf {
    let nested = working_dir.join("site");
    if nested.is_dir() {
        nested
    } else {
        working_dir.to_path_buf()
    }
}

/// All HTML/CSS/JS files under `dir`, relative to `dir`, sorted.
pub fn find_web_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EDITABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// Render file contents as `File: <path>` blocks for model context, stopping
/// once `max_chars` would be exceeded. Unreadable or non-UTF-8 files are
/// skipped.
pub fn render_file_context(dir: &Path, files: &[PathBuf], max_chars: usize) -> String {
    let mut out = String::new();
    for rel in files {
        let Ok(content) = std::fs::read_to_string(dir.join(rel)) else {
            tracing::debug!(path = %rel.display(), "skipping unreadable file");
            continue;
        };
        let block = format!("File: {}\n{}\n\n", rel.display(), content);
        if out.len() + block.len() > max_chars {
            if out.is_empty() {
                out.push_str(&block[..block.floor_char_boundary(max_chars)]);
            }
            break;
        }
        out.push_str(&block);
    }
    out
}

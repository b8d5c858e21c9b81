//! Discovery of ingestible files under the documentation root.
//!
//! Layout: `<docs_dir>/<collection>/*.md` and `<docs_dir>/<collection>/images/*.<img>`.
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceSet {
    pub markdowns: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
}

impl SourceSet {
    pub fn is_empty(&self) -> bool { self.markdowns.is_empty() && self.images.is_empty() }
}

/// MIME type for a supported screenshot extension (case-insensitive).
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Collection of a screenshot: the folder that contains its `images/` folder.
pub fn image_collection(path: &Path) -> String {
    path.parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sorted_entries(dir: &Path) -> Vec<walkdir::DirEntry> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .collect()
}

/// Lists markdown files and screenshots per collection, sorted by name.
///
/// With `collection_filter`, only the collection folder of that name is visited.
pub fn collect_sources(docs_dir: &Path, collection_filter: Option<&str>) -> Result<SourceSet> {
    if !docs_dir.is_dir() {
        return Err(Error::NotFound(format!("documentation folder {}", docs_dir.display())));
    }
    let mut set = SourceSet::default();
    for collection in sorted_entries(docs_dir).into_iter().filter(|e| e.file_type().is_dir()) {
        if let Some(wanted) = collection_filter {
            if collection.file_name().to_string_lossy() != wanted { continue; }
        }
        for entry in sorted_entries(collection.path()) {
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "md") {
                set.markdowns.push(path.to_path_buf());
            }
        }
        let images_dir = collection.path().join("images");
        if images_dir.is_dir() {
            for entry in sorted_entries(&images_dir) {
                if entry.file_type().is_file() && image_mime_type(entry.path()).is_some() {
                    set.images.push(entry.path().to_path_buf());
                }
            }
        }
    }
    Ok(set)
}

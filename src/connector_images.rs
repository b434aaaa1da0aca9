use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_GLOBS: &[&str] = &["**/*.png", "**/*.jpg", "**/*.jpeg"];

/// Every image under `root`, sorted by path. Matching is case-insensitive.
pub fn scan_images(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Image directory does not exist: {}", root.display());
    }

    let include_set = build_globset(IMAGE_GLOBS)?;
    let exclude_set = build_globset(&["**/.git/**"])?;

    let mut images = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) || !include_set.is_match(relative) {
            continue;
        }
        images.push(path.to_path_buf());
    }

    images.sort();
    tracing::info!(root = %root.display(), images = images.len(), "scanned image directory");
    Ok(images)
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_images_recursively_in_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("b/nested")).unwrap();
        std::fs::write(root.join("b/nested/z.JPG"), b"x").unwrap();
        std::fs::write(root.join("a.png"), b"x").unwrap();
        std::fs::write(root.join("notes.txt"), b"x").unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".git/logo.png"), b"x").unwrap();

        let found: Vec<String> = scan_images(root)
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(found, vec!["a.png", "b/nested/z.JPG"]);
    }

    #[test]
    fn missing_directory_errors() {
        assert!(scan_images(Path::new("/no/such/images")).is_err());
    }
}

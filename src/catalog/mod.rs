//! Command-set asset catalog
//!
//! Assets live under a root directory as `<manufacturer>/<model>.json`.
//! Discovery is a plain directory walk; nothing is cached because assets
//! are installed out-of-band.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Extension of command-set asset files
pub const ASSET_EXTENSION: &str = "json";

/// Read-only view of the installed command-set assets
#[derive(Debug, Clone)]
pub struct AssetCatalog {
    root: PathBuf,
}

impl AssetCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path of a manufacturer/model asset
    ///
    /// `None` unless both names are single path components, so the path
    /// always stays under the root.
    pub fn asset_path(&self, manufacturer: &str, model: &str) -> Option<PathBuf> {
        if !is_plain_name(manufacturer) || !is_plain_name(model) {
            return None;
        }
        Some(
            self.root
                .join(manufacturer)
                .join(format!("{model}.{ASSET_EXTENSION}")),
        )
    }

    /// Manufacturers with an asset directory, sorted, without duplicates
    pub fn list_manufacturers(&self) -> Vec<String> {
        let mut manufacturers = match read_entries(&self.root) {
            Ok(entries) => entries
                .into_iter()
                .filter(|(_, path)| path.is_dir())
                .map(|(name, _)| name)
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!("Cannot list command sets in {}: {}", self.root.display(), e);
                Vec::new()
            }
        };
        manufacturers.sort();
        manufacturers.dedup();
        debug!("Found {} manufacturer(s)", manufacturers.len());
        manufacturers
    }

    /// Models available for a manufacturer; empty when none are installed
    pub fn list_models(&self, manufacturer: &str) -> Vec<String> {
        if !is_plain_name(manufacturer) {
            warn!("Rejected manufacturer name {:?}", manufacturer);
            return Vec::new();
        }

        let dir = self.root.join(manufacturer);
        let entries = match read_entries(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot list command sets in {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut models: Vec<String> = entries
            .into_iter()
            .filter(|(_, path)| path.is_file())
            .filter_map(|(_, path)| {
                let is_asset = path.extension().is_some_and(|ext| ext == ASSET_EXTENSION);
                if !is_asset {
                    return None;
                }
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect();
        models.sort();
        models
    }

    pub fn contains(&self, manufacturer: &str, model: &str) -> bool {
        self.asset_path(manufacturer, model)
            .is_some_and(|path| path.is_file())
    }
}

/// Directory entries with UTF-8 names
fn read_entries(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Ok(name) = entry.file_name().into_string() {
            entries.push((name, entry.path()));
        }
    }
    Ok(entries)
}

/// A single path component (no separators, no `..`)
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(files: &[&str]) -> (tempfile::TempDir, AssetCatalog) {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "{}").unwrap();
        }
        let catalog = AssetCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn test_sony_scenario() {
        let (_dir, catalog) = catalog_with(&["sony/rm-s103.json"]);
        assert_eq!(catalog.list_manufacturers(), vec!["sony"]);
        assert_eq!(catalog.list_models("sony"), vec!["rm-s103"]);
        assert!(catalog.contains("sony", "rm-s103"));
    }

    #[test]
    fn test_multiple_manufacturers_sorted() {
        let (_dir, catalog) = catalog_with(&[
            "sony/rm-s103.json",
            "sony/rm-ed009.json",
            "lg/akb7.json",
            "README.md",
        ]);
        assert_eq!(catalog.list_manufacturers(), vec!["lg", "sony"]);
        assert_eq!(catalog.list_models("sony"), vec!["rm-ed009", "rm-s103"]);
    }

    #[test]
    fn test_empty_or_unknown_manufacturer() {
        let (dir, catalog) = catalog_with(&["sony/rm-s103.json"]);
        fs::create_dir(dir.path().join("philips")).unwrap();
        assert!(catalog.list_models("philips").is_empty());
        assert!(catalog.list_models("samsung").is_empty());
        assert!(catalog.list_models("../sony").is_empty());
    }

    #[test]
    fn test_non_asset_files_ignored() {
        let (_dir, catalog) = catalog_with(&["sony/notes.txt", "sony/rm-s103.json"]);
        assert_eq!(catalog.list_models("sony"), vec!["rm-s103"]);
    }

    #[test]
    fn test_missing_root() {
        let catalog = AssetCatalog::new("/nonexistent/command/sets");
        assert!(catalog.list_manufacturers().is_empty());
    }

    #[test]
    fn test_asset_path() {
        let catalog = AssetCatalog::new("commandSets");
        assert_eq!(
            catalog.asset_path("sony", "rm-s103"),
            Some(PathBuf::from("commandSets/sony/rm-s103.json"))
        );
    }

    #[test]
    fn test_asset_path_stays_under_root() {
        let catalog = AssetCatalog::new("commandSets");
        assert!(catalog.asset_path("..", "escaped").is_none());
        assert!(catalog.asset_path("sony", "../../etc/passwd").is_none());
        assert!(catalog.asset_path("sony/..", "rm-s103").is_none());
        assert!(catalog.asset_path("", "rm-s103").is_none());
        assert!(catalog.asset_path("sony", "").is_none());
        assert!(!catalog.contains("..", "escaped"));
    }
}

//
// discovery.rs
// HP-Stats-rs
//
// Walks a scan root, finds the folders that directly hold DICOM files, and maps each one onto
// the condition / metabolite / volume folder convention.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::models::AcquisitionLeaf;

const SCAN_EXTENSIONS: [&str; 2] = ["dcm", "ima"];

/// Finds every leaf directory under `root` and checks that all conditions share one parent.
pub fn discover(root: &Path, excluded: &BTreeSet<String>) -> Result<Vec<AcquisitionLeaf>> {
    let leaves = find_leaf_dirs(root, excluded)
        .iter()
        .map(|dir| decompose(dir))
        .collect::<Result<Vec<_>>>()?;

    let parents: BTreeSet<&Path> = leaves
        .iter()
        .map(|leaf| leaf.conditions_parent.as_path())
        .collect();
    if parents.len() > 1 {
        return Err(PipelineError::AmbiguousHierarchy {
            parents: parents.into_iter().map(Path::to_path_buf).collect(),
        });
    }

    Ok(leaves)
}

/// Directories that directly contain at least one scan file, deduplicated and sorted.
pub fn find_leaf_dirs(root: &Path, excluded: &BTreeSet<String>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir() && is_scan_file(entry.path()))
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .filter(|dir| !is_excluded(dir, excluded))
        .collect();

    dirs.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    dirs.dedup();
    debug!("found {} scan folder(s) under {:?}", dirs.len(), root);
    dirs
}

/// Splits a leaf path into volume id, metabolite, condition and the conditions' parent.
pub fn decompose(leaf: &Path) -> Result<AcquisitionLeaf> {
    let too_shallow = || {
        PipelineError::Configuration(format!(
            "scan folder {} is not nested as <condition>/<metabolite>/<volume>",
            leaf.display()
        ))
    };

    let volume_id = folder_name(leaf).ok_or_else(too_shallow)?;
    let metabolite_dir = leaf.parent().ok_or_else(too_shallow)?;
    let metabolite = folder_name(metabolite_dir).ok_or_else(too_shallow)?;
    let condition_dir = metabolite_dir.parent().ok_or_else(too_shallow)?;
    let condition = folder_name(condition_dir).ok_or_else(too_shallow)?;
    let conditions_parent = condition_dir.parent().ok_or_else(too_shallow)?;

    Ok(AcquisitionLeaf {
        path: leaf.to_path_buf(),
        condition,
        metabolite,
        volume_id,
        conditions_parent: conditions_parent.to_path_buf(),
    })
}

/// Distinct metabolite folder names among the discovered leaves of `condition`.
pub fn metabolites_of<'a>(leaves: &'a [AcquisitionLeaf], condition: &str) -> BTreeSet<&'a str> {
    leaves
        .iter()
        .filter(|leaf| leaf.condition == condition)
        .map(|leaf| leaf.metabolite.as_str())
        .collect()
}

fn is_scan_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map_or(false, |ext| {
            SCAN_EXTENSIONS
                .iter()
                .any(|scan| ext.eq_ignore_ascii_case(scan))
        })
}

fn is_excluded(dir: &Path, excluded: &BTreeSet<String>) -> bool {
    dir.file_name()
        .and_then(OsStr::to_str)
        .map_or(false, |name| excluded.contains(name))
}

fn folder_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

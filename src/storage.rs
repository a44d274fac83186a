//
// storage.rs
// HP-Stats-rs
//
// Scratch directory for intermediate volumes converted from each scan folder.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::AcquisitionLeaf;

/// Scratch directory shared by every conversion of a run. Only the volumes claimed by this
/// store are ever deleted; files already present are left alone.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    root: PathBuf,
    extension: String,
    created: bool,
    /// Lowercased file name -> leaf that owns it.
    claimed: HashMap<String, PathBuf>,
    outputs: Vec<PathBuf>,
}

impl ScratchStore {
    pub fn new(root: impl AsRef<Path>, extension: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let created = !root.exists();
        // create_dir_all is a no-op when the directory already exists.
        fs::create_dir_all(&root).map_err(|e| PipelineError::io(&root, e))?;
        Ok(Self {
            root,
            extension: extension.trim_start_matches('.').to_string(),
            created,
            claimed: HashMap::new(),
            outputs: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<condition>-<metabolite>_<volumeId>.<ext>` inside the scratch directory.
    pub fn volume_path(&self, leaf: &AcquisitionLeaf) -> PathBuf {
        let filename = format!(
            "{}-{}_{}.{}",
            sanitize_filename(&leaf.condition),
            sanitize_filename(&leaf.metabolite),
            sanitize_filename(&leaf.volume_id),
            self.extension
        );
        self.root.join(filename)
    }

    /// Reserves the volume path of `leaf` for this run.
    ///
    /// Two leaves whose names flatten to the same file (`A-B/C` and `A/B-C`, `a:b` and `a_b`,
    /// or names differing only by case) cannot share one volume, so the second claim fails.
    pub fn claim(&mut self, leaf: &AcquisitionLeaf) -> Result<PathBuf> {
        let path = self.volume_path(leaf);
        let key = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if let Some(owner) = self.claimed.get(&key) {
            if owner != &leaf.path {
                return Err(PipelineError::Configuration(format!(
                    "scan folders {} and {} would both be converted to {}; rename one of them",
                    owner.display(),
                    leaf.path.display(),
                    path.display()
                )));
            }
            return Ok(path);
        }
        self.claimed.insert(key, leaf.path.clone());
        self.outputs.push(path.clone());
        Ok(path)
    }

    /// Deletes the volumes claimed by this run. The directory itself goes only when this run
    /// created it and nothing else is left inside.
    pub fn remove(self) -> Result<()> {
        for output in &self.outputs {
            match fs::remove_file(output) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(PipelineError::io(output, e)),
            }
        }
        info!(
            "removed {} intermediate volume(s) from {:?}",
            self.outputs.len(),
            self.root
        );

        if self.created && is_empty_dir(&self.root)? {
            fs::remove_dir(&self.root).map_err(|e| PipelineError::io(&self.root, e))?;
            debug!("removed scratch directory {:?}", self.root);
        }
        Ok(())
    }
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(dir, e)),
    }
}

fn sanitize_filename(input: &str) -> String {
    // Replace only what file systems reject so names stay recognizable.
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn leaf(condition: &str, metabolite: &str, volume_id: &str) -> AcquisitionLeaf {
        AcquisitionLeaf {
            path: PathBuf::from("/scans").join(condition).join(metabolite).join(volume_id),
            condition: condition.into(),
            metabolite: metabolite.into(),
            volume_id: volume_id.into(),
            conditions_parent: PathBuf::from("/scans"),
        }
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("a:b*c?d"), "a_b_c_d");
        assert_eq!(sanitize_filename("20percentOxygen"), "20percentOxygen");
    }

    #[test]
    fn volume_path_follows_naming_convention() {
        let root = tempdir().expect("tmpdir");
        let store = ScratchStore::new(root.path().join("NrrdOutput"), ".nrrd").expect("store");

        let path = store.volume_path(&leaf("Cond100", "01_pyrBy6", "8001"));
        assert_eq!(
            path,
            root.path().join("NrrdOutput").join("Cond100-01_pyrBy6_8001.nrrd")
        );
    }

    #[test]
    fn colliding_names_cannot_share_a_volume() {
        let root = tempdir().expect("tmpdir");
        let mut store = ScratchStore::new(root.path(), "nrrd").expect("store");

        let first = store.claim(&leaf("A-B", "C", "T1")).expect("first claim");
        assert_eq!(store.claim(&leaf("A-B", "C", "T1")).expect("same leaf"), first);
        let err = store.claim(&leaf("A", "B-C", "T1")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains("B-C"));

        store.claim(&leaf("a:b", "M", "T1")).expect("reserved character");
        assert!(store.claim(&leaf("a_b", "M", "T1")).is_err());
        store.claim(&leaf("Cond", "MetaA", "T1")).expect("mixed case");
        assert!(store.claim(&leaf("Cond", "metaa", "T1")).is_err());
    }

    #[test]
    fn remove_leaves_foreign_files_alone() {
        let root = tempdir().expect("tmpdir");
        let scratch = root.path().join("shared");
        fs::create_dir_all(&scratch).expect("mkdir");
        fs::write(scratch.join("unrelated.txt"), b"keep me").expect("write foreign");

        let mut store = ScratchStore::new(&scratch, "nrrd").expect("store");
        let volume = store.claim(&leaf("Cond100", "MetaA", "T1")).expect("claim");
        fs::write(&volume, b"data").expect("write volume");
        store.remove().expect("remove");

        assert!(!volume.exists());
        assert!(scratch.join("unrelated.txt").is_file());
    }

    #[test]
    fn creation_is_idempotent_and_remove_cleans_up() {
        let root = tempdir().expect("tmpdir");
        let scratch = root.path().join("nested/NrrdOutput");
        let mut first = ScratchStore::new(&scratch, "nrrd").expect("first");
        let _second = ScratchStore::new(&scratch, "nrrd").expect("second");

        let volume = first.claim(&leaf("Cond100", "MetaA", "T1")).expect("claim");
        fs::write(volume, b"data").expect("write volume");
        first.remove().expect("remove");
        assert!(!scratch.exists());
    }
}

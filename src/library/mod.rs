//! Track source: the ordered list of files in a music directory.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::player::PlayerError;

/// One playable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEntry {
    pub path: PathBuf,
    /// File name, extension included; the decoder uses it as a format hint
    pub name: String,
}

impl TrackEntry {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self { path, name }
    }

    /// Read the whole file into memory.
    pub fn read(&self) -> Result<Vec<u8>, PlayerError> {
        std::fs::read(&self.path).map_err(|e| PlayerError::io(&self.path, e))
    }
}

/// Files directly inside one directory, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Library {
    root: PathBuf,
    tracks: Vec<TrackEntry>,
}

impl Library {
    /// List the regular files in `dir` (not recursive).
    pub fn load_directory(dir: &Path) -> Result<Self, PlayerError> {
        if !dir.is_dir() {
            return Err(PlayerError::io(
                dir,
                io::Error::new(io::ErrorKind::NotFound, "directory not found"),
            ));
        }

        let mut tracks = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| PlayerError::io(dir, io::Error::other(e)))?;
            if entry.file_type().is_file() {
                tracing::debug!("Found track: {}", entry.path().display());
                tracks.push(TrackEntry::from_path(entry.into_path()));
            }
        }

        tracing::info!("Loaded {} tracks from {}", tracks.len(), dir.display());
        Ok(Self {
            root: dir.to_path_buf(),
            tracks,
        })
    }

    /// Build a list from explicit paths, keeping their order.
    pub fn from_paths(root: impl Into<PathBuf>, paths: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tracks: paths.into_iter().map(TrackEntry::from_path).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[TrackEntry] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&TrackEntry> {
        self.tracks.get(index)
    }

    /// Clamp `index` into `[0, len - 1]`. `None` when the list is empty.
    pub fn clamp_index(&self, index: isize) -> Option<usize> {
        let last = self.tracks.len().checked_sub(1)?;
        Some(index.max(0).unsigned_abs().min(last))
    }

    /// Entry at the clamped index.
    pub fn get_clamped(&self, index: isize) -> Option<&TrackEntry> {
        self.clamp_index(index).and_then(|i| self.tracks.get(i))
    }
}

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ingest::SourceImage;

/// Scratch directory owned by exactly one pipeline run.
///
/// The directory name embeds the run id so concurrent runs sharing a work
/// root never see each other's files. Dropping the workspace removes it,
/// which also covers runs cancelled mid-flight.
#[derive(Debug)]
pub struct RunWorkspace {
    id: Uuid,
    dir: TempDir,
}

impl RunWorkspace {
    /// Create a fresh workspace under `root`, or the system temp dir
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let root = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                std::path::absolute(root)?
            }
            None => std::env::temp_dir(),
        };

        let id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("panel-kit-{}-", id))
            .tempdir_in(&root)?;
        debug!("Created run workspace {}", dir.path().display());

        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create (if needed) and return a subdirectory of the workspace
    pub fn subdir(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Materialise the source image so external tools can read it
    pub fn write_source(&self, image: &SourceImage) -> io::Result<PathBuf> {
        let path = self.dir.path().join(format!("source.{}", image.extension()));
        std::fs::write(&path, image.bytes())?;
        Ok(path)
    }

    /// Remove the workspace. Failures are logged, never returned.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed run workspace {}", path.display()),
            Err(e) => warn!("Failed to remove run workspace {}: {}", path.display(), e),
        }
    }
}

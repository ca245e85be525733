use std::fs;
use std::io;
use std::path::Path;

use tempfile::TempDir;

/// Fixed filename the submitted source is written under, matching what the
/// in-sandbox harness expects at `<root>/script/script`.
pub const SOURCE_FILE: &str = "script";

/// Ephemeral workspace holding one submission's source for the duration of
/// its judging.
///
/// Owned by exactly one dispatcher worker; the backing directory is removed
/// on drop, so cleanup happens on every exit path, verdict or error alike.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates a uniquely named `tmp-XXXXXX` directory under `base`.
    pub fn create(base: &Path) -> io::Result<Self> {
        fs::create_dir_all(base)?;
        let dir = tempfile::Builder::new().prefix("tmp-").tempdir_in(base)?;
        Ok(Self { dir })
    }

    /// Writes the submitted source under the fixed in-workspace filename.
    pub fn write_source(&self, code: &str) -> io::Result<()> {
        fs::write(self.dir.path().join(SOURCE_FILE), code)
    }

    /// Absolute host path of the workspace, bind-mounted into the sandbox.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

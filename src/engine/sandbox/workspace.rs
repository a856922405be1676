use std::{
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

use crate::engine::sandbox::language::STDIN_FILE;

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(root: &Path) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("judge-")
            .tempdir_in(root)?;
        // The sandboxed user has no CAP_DAC_OVERRIDE, so build outputs need a
        // world-writable directory.
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub async fn write_file(&self, name: &str, content: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, content.as_bytes()).await?;
        Ok(path)
    }

    pub async fn write_stdin(&self, content: &str) -> io::Result<PathBuf> {
        self.write_file(STDIN_FILE, content).await
    }
}

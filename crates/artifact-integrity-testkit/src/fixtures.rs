//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: artifacts on disk and scripted
//! stand-ins for the registrar tools.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use artifact_integrity::{IntegrityConfig, IntegrityKernel};
use artifact_integrity_registrar::RegistrarConfig;
use tempfile::TempDir;

use crate::vectors::pattern_bytes;

/// Registrar script that reports success and echoes its arguments.
pub const REGISTER_OK: &str = r#"echo "Using RPC http://127.0.0.1:8899"
printf '{"success":true,"txid":"tx-%s","model_pda":"pda-%s","program_id":"Prog111","wallet":"Wal111"}\n' "$1" "$1""#;

/// Rent script that reports success.
pub const RENT_OK: &str = r#"printf '{"success":true,"txid":"rent-%s","model_pda":"pda-%s","renter":"Renter1","uploader":"Wal111"}\n' "$1" "$1""#;

/// Script that reports a rejected request on a clean exit.
pub const REJECTS: &str = r#"echo '{"success":false,"error":"dup"}'"#;

/// Script that never finishes on its own.
pub const HANGS: &str = "echo 'waiting for confirmation'; exec sleep 60";

/// A scratch directory holding artifacts and fake registrar tools.
pub struct TestFixture {
    dir: TempDir,
}

impl TestFixture {
    /// Create a fixture in a fresh temporary directory.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Root of the fixture directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an artifact with the given bytes.
    pub fn artifact(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(path)
    }

    /// Write an artifact of `len` pattern bytes.
    pub fn pattern_artifact(&self, name: &str, len: usize) -> io::Result<PathBuf> {
        self.artifact(name, &pattern_bytes(len))
    }

    /// Write an executable `/bin/sh` script.
    #[cfg(unix)]
    pub fn script(&self, name: &str, body: &str) -> io::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Registrar config running the given script bodies directly.
    #[cfg(unix)]
    pub fn registrar(
        &self,
        register: &str,
        rent: &str,
        timeout: Duration,
    ) -> io::Result<RegistrarConfig> {
        Ok(RegistrarConfig::default()
            .interpreter(None)
            .register_script(self.script("register_model", register)?)
            .rent_script(self.script("rent_model", rent)?)
            .timeout(timeout))
    }

    /// Kernel whose registrar always succeeds.
    #[cfg(unix)]
    pub fn kernel(&self) -> io::Result<IntegrityKernel> {
        let registrar = self.registrar(REGISTER_OK, RENT_OK, Duration::from_secs(10))?;
        Ok(IntegrityKernel::new(IntegrityConfig::default().registrar(registrar)))
    }
}

//! Common test utilities for Kaien CLI tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated HOME so config and workspace land in a temp dir
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".kaien");
        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn workspace_file(&self, name: &str) -> PathBuf {
        self.data_dir.join("workspace").join(name)
    }

    /// Command with HOME pointed at the temp dir and LLM overrides cleared
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kaien"));
        cmd.env("HOME", self.temp_dir.path());
        for key in ["LLM_BASE_URL", "LLM_MODEL", "LLM_API_KEY", "KAIEN_MAX_STEPS", "RUST_LOG"] {
            cmd.env_remove(key);
        }
        cmd
    }

    /// Write a config file with the given JSON
    pub fn write_config(&self, json: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.config_file(), json)?;
        Ok(())
    }
}

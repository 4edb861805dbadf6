#![allow(dead_code)]

pub mod mock_query;

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper struct to run civic-sync commands in an isolated temp directory
pub struct CivicTest {
    pub temp_dir: TempDir,
    binary_path: String,
}

impl CivicTest {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        CivicTest {
            temp_dir,
            binary_path: env!("CARGO_BIN_EXE_civic-sync").to_string(),
        }
    }

    pub fn run(&self, args: &[&str]) -> Output {
        let home = self.temp_dir.path().join("home");
        Command::new(&self.binary_path)
            .args(args)
            .current_dir(self.temp_dir.path())
            // Keep the developer's own config and token out of the test
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env_remove("CIVIC_SYNC_ROOT")
            .env_remove("CIVIC_SYNC_TOKEN")
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to execute civic-sync command")
    }

    pub fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args);
        if !output.status.success() {
            panic!(
                "Command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
                args,
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    pub fn run_failure(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "Expected command {:?} to fail, but it succeeded",
            args
        );
        String::from_utf8_lossy(&output.stderr).to_string()
    }

    pub fn config_file(&self) -> std::path::PathBuf {
        self.temp_dir.path().join(".civic-sync").join("config.yaml")
    }

    pub fn read_config(&self) -> String {
        fs::read_to_string(self.config_file()).expect("Failed to read config file")
    }

    pub fn write_config(&self, content: &str) {
        let dir = self.temp_dir.path().join(".civic-sync");
        fs::create_dir_all(&dir).expect("Failed to create .civic-sync directory");
        fs::write(dir.join("config.yaml"), content).expect("Failed to write config file");
    }
}

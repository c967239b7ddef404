//! Process-backed harness
//!
//! Spawns an external harness command (e.g. `restraint`) on the local
//! machine, pointed at the guest, with the job descriptor written to disk.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::process::Command;
use tracing::{debug, info};

use super::{ExecutionOutput, Harness, HarnessOutput, JobDescriptor, JobDescriptorBuilder};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::guest::Guest;
use crate::models::TaskDescriptor;

/// File name of the job descriptor inside a results directory
const JOB_FILE: &str = "job.yaml";

/// Renders tasks as a YAML job document
#[derive(Clone, Copy, Debug, Default)]
pub struct YamlJobBuilder;

#[derive(Serialize)]
struct JobDocument<'a> {
    tasks: &'a [TaskDescriptor],
}

impl JobDescriptorBuilder for YamlJobBuilder {
    fn build(&self, tasks: &[TaskDescriptor]) -> Result<JobDescriptor> {
        let content = serde_yaml::to_string(&JobDocument { tasks })
            .map_err(|e| Error::Fatal(format!("Failed to render job descriptor: {e}")))?;

        Ok(JobDescriptor::new(content))
    }
}

/// Harness running a local command per task set
pub struct CommandHarness {
    config: HarnessConfig,
    invocations: AtomicUsize,
}

impl CommandHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Fresh directory for one invocation
    fn results_dir(&self, guest: &dyn Guest) -> PathBuf {
        let seq = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;

        self.config.results_root.join(format!(
            "{}-{}-{}",
            guest.name(),
            Utc::now().format("%Y%m%d%H%M%S"),
            seq
        ))
    }

    fn render_args(&self, guest: &dyn Guest, job_file: &Path, results_dir: &Path) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{host}", guest.hostname())
                    .replace("{port}", &guest.port().to_string())
                    .replace("{user}", guest.user())
                    .replace("{job}", &job_file.to_string_lossy())
                    .replace("{results}", &results_dir.to_string_lossy())
            })
            .collect()
    }
}

#[async_trait]
impl Harness for CommandHarness {
    async fn execute(&self, guest: &dyn Guest, job: &JobDescriptor) -> Result<HarnessOutput> {
        let results_dir = self.results_dir(guest);
        tokio::fs::create_dir_all(&results_dir).await?;

        let job_file = results_dir.join(JOB_FILE);
        tokio::fs::write(&job_file, job.as_str()).await?;

        let args = self.render_args(guest, &job_file, &results_dir);
        info!(
            "Running {} against {} ({})",
            self.config.command,
            guest.name(),
            results_dir.display()
        );
        debug!("Harness arguments: {:?}", args);

        let output = Command::new(&self.config.command)
            .args(&args)
            .output()
            .await
            .map_err(|e| Error::Invocation(format!("failed to run {}: {e}", self.config.command)))?;

        Ok(HarnessOutput {
            execution: ExecutionOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            results_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::{SshConfig, SshGuest};

    fn config(root: &Path) -> HarnessConfig {
        HarnessConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "cp {job} {results}/seen.yaml; echo {user}@{host}:{port}; exit 10".to_string(),
            ],
            results_root: root.to_path_buf(),
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn test_yaml_job_builder() {
        let job = YamlJobBuilder
            .build(&[
                TaskDescriptor::new("/distribution/install"),
                TaskDescriptor::new("/smoke").param("TIMEOUT", "10m"),
            ])
            .unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_str(job.as_str()).unwrap();
        assert_eq!(doc["tasks"][0]["name"], "/distribution/install");
        assert_eq!(doc["tasks"][1]["params"]["TIMEOUT"], "10m");
    }

    #[test]
    fn test_render_args() {
        let harness = CommandHarness::new(config(Path::new("/tmp/results")));
        let guest = SshGuest::new("g1", "10.0.0.9", SshConfig::new("fedora").port(2222));

        let args = harness.render_args(&guest, Path::new("/r/job.yaml"), Path::new("/r"));
        assert_eq!(
            args[1],
            "cp /r/job.yaml /r/seen.yaml; echo fedora@10.0.0.9:2222; exit 10"
        );
    }

    #[tokio::test]
    async fn test_command_harness_reports_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let harness = CommandHarness::new(config(root.path()));
        let guest = SshGuest::new("g1", "10.0.0.9", SshConfig::default());

        let output = harness
            .execute(&guest, &JobDescriptor::new("tasks: []\n"))
            .await
            .unwrap();

        assert_eq!(output.execution.exit_code, 10);
        assert_eq!(output.execution.stdout.trim(), "root@10.0.0.9:22");
        assert!(output.results_dir.starts_with(root.path()));
        assert!(output.results_dir.join("seen.yaml").exists());
    }

    #[tokio::test]
    async fn test_missing_command_is_invocation_fault() {
        let root = tempfile::tempdir().unwrap();
        let harness = CommandHarness::new(HarnessConfig {
            command: "/nonexistent/harness-binary".to_string(),
            args: Vec::new(),
            results_root: root.path().to_path_buf(),
            ..HarnessConfig::default()
        });
        let guest = SshGuest::new("g1", "10.0.0.9", SshConfig::default());

        let err = harness
            .execute(&guest, &JobDescriptor::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invocation(_)));
    }
}

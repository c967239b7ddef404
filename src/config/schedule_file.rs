//! Schedule definition files
//!
//! YAML (or JSON) description of schedule entries and the static guests
//! assigned to them.
//!
//! ```yaml
//! entries:
//!   - id: "1"
//!     capability: restraint
//!     environment: arch=x86_64,compose=Fedora-40,snapshots=no
//!     guest:
//!       host: 10.0.0.5
//!       username: root
//!     tasks:
//!       - name: /distribution/install
//!       - name: /smoke
//!         params:
//!           TIMEOUT: 10m
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::guest::{SshConfig, SshGuest};
use crate::models::{Schedule, ScheduleEntry, TaskDescriptor, TestingEnvironment};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScheduleFile {
    #[serde(default)]
    pub entries: Vec<EntryDefinition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryDefinition {
    pub id: String,

    #[serde(default = "default_capability")]
    pub capability: String,

    #[serde(default)]
    pub environment: EnvironmentDefinition,

    pub guest: GuestDefinition,

    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
}

/// Environment either as `key=value,...` or as a mapping
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentDefinition {
    Inline(String),
    Fields(TestingEnvironment),
}

impl Default for EnvironmentDefinition {
    fn default() -> Self {
        EnvironmentDefinition::Fields(TestingEnvironment::default())
    }
}

impl EnvironmentDefinition {
    pub fn resolve(&self) -> crate::error::Result<TestingEnvironment> {
        match self {
            EnvironmentDefinition::Inline(s) => s.parse(),
            EnvironmentDefinition::Fields(env) => Ok(env.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuestDefinition {
    /// Guest name, defaults to the host
    pub name: Option<String>,

    pub host: String,

    #[serde(flatten)]
    pub ssh: SshConfig,
}

fn default_capability() -> String {
    "restraint".to_string()
}

impl ScheduleFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schedule file {}", path.display()))?;

        let file: Self = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content).context("Failed to parse JSON schedule")?
        } else {
            serde_yaml::from_str(&content).context("Failed to parse YAML schedule")?
        };

        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut guests = HashSet::new();

        for entry in &self.entries {
            if !ids.insert(entry.id.as_str()) {
                anyhow::bail!("Duplicate schedule entry id '{}'", entry.id);
            }

            if entry.tasks.is_empty() {
                anyhow::bail!("Schedule entry {} declares no tasks", entry.id);
            }

            let guest = entry.guest.name.as_deref().unwrap_or(&entry.guest.host);
            if !guests.insert(guest) {
                anyhow::bail!("Guest '{}' is assigned to more than one entry", guest);
            }

            entry
                .environment
                .resolve()
                .with_context(|| format!("Schedule entry {} has invalid environment", entry.id))?;
        }

        Ok(())
    }

    /// Build a schedule of SSH-backed entries
    pub fn to_schedule(&self) -> Result<Schedule> {
        self.entries
            .iter()
            .map(|def| -> Result<ScheduleEntry> {
                let environment = def.environment.resolve()?;
                let name = def.guest.name.clone().unwrap_or_else(|| def.guest.host.clone());
                let guest = SshGuest::new(name, &def.guest.host, def.guest.ssh.clone());

                Ok(ScheduleEntry::new(&def.id, &def.capability, environment)
                    .with_guest(Arc::new(guest))
                    .with_tasks(def.tasks.iter().cloned()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;

    const SCHEDULE: &str = r#"
entries:
  - id: "1"
    environment: arch=x86_64,compose=Fedora-40,snapshots=yes
    guest:
      host: 10.0.0.5
      username: fedora
      port: 2222
    tasks:
      - name: /distribution/install
      - name: /smoke
        params:
          TIMEOUT: 10m
  - id: "2"
    capability: sti
    environment:
      arch: aarch64
    guest:
      name: arm-box
      host: 10.0.0.6
    tasks:
      - name: /smoke
"#;

    fn write(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.yaml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_schedule_file() {
        let (_dir, path) = write(SCHEDULE);
        let file = ScheduleFile::load(&path).unwrap();
        let schedule = file.to_schedule().unwrap();

        assert_eq!(schedule.len(), 2);

        let first = &schedule.entries()[0];
        assert_eq!(first.capability(), "restraint");
        assert!(first.environment().wants_isolation());
        assert_eq!(first.tasks().len(), 2);
        assert_eq!(first.guest().unwrap().name(), "10.0.0.5");
        assert_eq!(first.guest().unwrap().port(), 2222);
        assert_eq!(first.stage(), Stage::Prepared);

        let second = &schedule.entries()[1];
        assert_eq!(second.capability(), "sti");
        assert_eq!(second.environment().arch.as_deref(), Some("aarch64"));
        assert_eq!(second.guest().unwrap().name(), "arm-box");
        assert_eq!(second.guest().unwrap().user(), "root");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let (_dir, path) = write(&SCHEDULE.replace("id: \"2\"", "id: \"1\""));
        let err = ScheduleFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate schedule entry id"));
    }

    #[test]
    fn test_shared_guest_rejected() {
        let (_dir, path) = write(&SCHEDULE.replace("name: arm-box", "name: 10.0.0.5"));
        let err = ScheduleFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("more than one entry"));
    }

    #[test]
    fn test_bad_environment_rejected() {
        let (_dir, path) = write(&SCHEDULE.replace("snapshots=yes", "flavor=large"));
        assert!(ScheduleFile::load(&path).is_err());
    }
}

//! The Local Rule Manager: one node's view of rule-manager CRUD. On-disk
//! state under `rule_managers/<id>/` is the source of truth; the in-memory
//! map is a cache that `load` rebuilds from disk at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ms_base::{not_found, validation, Result};

/// One named group of recording/alerting rules. The rule expression
/// language itself is out of scope here; a manager just stores and
/// replicates groups, it doesn't evaluate them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub interval_seconds: u64,
    pub rules: Vec<String>,
}

/// `ca_cert`/`cert`/`key` may be either a filesystem path already reachable
/// on every node, or inline PEM material; `create_manager` materializes the
/// latter to a file under the manager's directory and rewrites the field to
/// the path it wrote, so a private key is never re-transmitted after the
/// create that first carried it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub cert: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct RulesDocument {
    groups: Vec<RuleGroup>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CreateOutcome {
    Created,
    Conflict,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MutateOutcome {
    Ok,
    NotFound,
}

struct RunningManager {
    groups: Vec<RuleGroup>,
    alertmanager: AlertmanagerConfig,
}

fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("yml.tmp");
    fs::write(&tmp, serde_yaml::to_string(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Manager ids become a directory name under `root` -- enforce the
/// documented `[a-zA-Z_][a-zA-Z0-9_-]*` format so an id can't smuggle a `/`
/// or `..` and escape `rule_managers/`.
pub fn validate_manager_id(id: &str) -> Result<()> {
    let mut chars = id.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !starts_ok || !rest_ok {
        return Err(validation(format!(
            "rule manager id {id:?} must match [a-zA-Z_][a-zA-Z0-9_-]*"
        )));
    }
    Ok(())
}

/// If `value` is inline PEM rather than an existing path, write it under
/// `tls_dir` and return that path instead.
fn materialize_pem(tls_dir: &Path, filename: &str, value: Option<String>) -> Result<Option<String>> {
    let Some(value) = value else { return Ok(None) };
    if !value.contains("-----BEGIN") {
        return Ok(Some(value));
    }
    let path = tls_dir.join(filename);
    fs::write(&path, value)?;
    Ok(Some(path.to_string_lossy().into_owned()))
}

fn materialize_alertmanager(dir: &Path, alertmanager: AlertmanagerConfig) -> Result<AlertmanagerConfig> {
    let tls_dir = dir.join("tls");
    fs::create_dir_all(&tls_dir)?;
    Ok(AlertmanagerConfig {
        urls: alertmanager.urls,
        ca_cert: materialize_pem(&tls_dir, "ca.pem", alertmanager.ca_cert)?,
        cert: materialize_pem(&tls_dir, "cert.pem", alertmanager.cert)?,
        key: materialize_pem(&tls_dir, "key.pem", alertmanager.key)?,
    })
}

pub struct LocalRuleManager {
    root: PathBuf,
    managers: RwLock<BTreeMap<String, RunningManager>>,
}

impl LocalRuleManager {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(LocalRuleManager {
            root,
            managers: RwLock::new(BTreeMap::new()),
        })
    }

    fn manager_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Rebuild the in-memory manager set from whatever is on disk. Called
    /// once at process startup.
    pub fn load(&self) -> Result<()> {
        let mut managers = self.managers.write().unwrap();
        managers.clear();
        if !self.root.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            let dir = entry.path();
            let rules_path = dir.join("rules.yml");
            let doc: RulesDocument = if rules_path.exists() {
                serde_yaml::from_slice(&fs::read(&rules_path)?)?
            } else {
                RulesDocument::default()
            };
            let am_path = dir.join("alertmanagers.yml");
            let alertmanager: AlertmanagerConfig = if am_path.exists() {
                serde_yaml::from_slice(&fs::read(&am_path)?)?
            } else {
                AlertmanagerConfig::default()
            };
            info!(manager_id = %id, groups = doc.groups.len(), "loaded rule manager");
            managers.insert(
                id,
                RunningManager {
                    groups: doc.groups,
                    alertmanager,
                },
            );
        }
        Ok(())
    }

    pub fn create_manager(&self, id: &str, alertmanager: AlertmanagerConfig) -> Result<CreateOutcome> {
        validate_manager_id(id)?;
        let dir = self.manager_dir(id);
        if dir.exists() {
            return Ok(CreateOutcome::Conflict);
        }
        fs::create_dir_all(&dir)?;
        let alertmanager = materialize_alertmanager(&dir, alertmanager)?;
        write_yaml_atomic(&dir.join("alertmanagers.yml"), &alertmanager)?;
        write_yaml_atomic(&dir.join("rules.yml"), &RulesDocument::default())?;
        self.managers.write().unwrap().insert(
            id.to_string(),
            RunningManager {
                groups: Vec::new(),
                alertmanager,
            },
        );
        metrics::gauge!("ms_rules_active_managers").increment(1.0);
        Ok(CreateOutcome::Created)
    }

    pub fn upsert_rule_group(&self, id: &str, group: RuleGroup) -> Result<MutateOutcome> {
        let dir = self.manager_dir(id);
        if !dir.exists() {
            return Ok(MutateOutcome::NotFound);
        }
        let mut managers = self.managers.write().unwrap();
        let Some(running) = managers.get_mut(id) else {
            return Ok(MutateOutcome::NotFound);
        };
        if let Some(existing) = running.groups.iter_mut().find(|g| g.name == group.name) {
            *existing = group;
        } else {
            running.groups.push(group);
        }
        write_yaml_atomic(
            &dir.join("rules.yml"),
            &RulesDocument {
                groups: running.groups.clone(),
            },
        )?;
        debug!(manager_id = %id, "rule group upserted, triggering reload");
        Ok(MutateOutcome::Ok)
    }

    pub fn delete_manager(&self, id: &str) -> Result<MutateOutcome> {
        let dir = self.manager_dir(id);
        if !dir.exists() {
            return Ok(MutateOutcome::NotFound);
        }
        let mut managers = self.managers.write().unwrap();
        if managers.remove(id).is_none() {
            return Ok(MutateOutcome::NotFound);
        }
        fs::remove_dir_all(&dir)?;
        metrics::gauge!("ms_rules_active_managers").decrement(1.0);
        debug!(manager_id = %id, "unregistered rule manager metric collectors");
        Ok(MutateOutcome::Ok)
    }

    pub fn list_managers(&self) -> Vec<String> {
        self.managers.read().unwrap().keys().cloned().collect()
    }

    pub fn list_rule_groups(&self, id: &str) -> Result<Vec<RuleGroup>> {
        self.managers
            .read()
            .unwrap()
            .get(id)
            .map(|m| m.groups.clone())
            .ok_or_else(|| not_found(format!("no rule manager {id}")))
    }

    pub fn list_alertmanagers(&self, id: &str) -> Result<AlertmanagerConfig> {
        self.managers
            .read()
            .unwrap()
            .get(id)
            .map(|m| m.alertmanager.clone())
            .ok_or_else(|| not_found(format!("no rule manager {id}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_is_idempotent_rejecting_with_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalRuleManager::new(dir.path()).unwrap();
        assert_eq!(mgr.create_manager("a", AlertmanagerConfig::default()).unwrap(), CreateOutcome::Created);
        assert_eq!(mgr.create_manager("a", AlertmanagerConfig::default()).unwrap(), CreateOutcome::Conflict);
    }

    #[test]
    fn create_rejects_ids_that_would_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalRuleManager::new(dir.path()).unwrap();
        assert!(mgr.create_manager("../escape", AlertmanagerConfig::default()).is_err());
        assert!(mgr.create_manager("has/slash", AlertmanagerConfig::default()).is_err());
        assert!(mgr.create_manager("9starts-with-digit", AlertmanagerConfig::default()).is_err());
        assert!(mgr.create_manager("valid_id-1", AlertmanagerConfig::default()).is_ok());
    }

    #[test]
    fn create_materializes_inline_pem_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalRuleManager::new(dir.path()).unwrap();
        mgr.create_manager(
            "a",
            AlertmanagerConfig {
                urls: vec![],
                ca_cert: Some("-----BEGIN CERTIFICATE-----\nzzz\n-----END CERTIFICATE-----".into()),
                cert: None,
                key: None,
            },
        )
        .unwrap();
        let stored = mgr.list_alertmanagers("a").unwrap();
        let ca_path = stored.ca_cert.expect("ca_cert materialized to a path");
        assert!(Path::new(&ca_path).is_file());
        assert!(fs::read_to_string(&ca_path).unwrap().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn upsert_on_missing_manager_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalRuleManager::new(dir.path()).unwrap();
        let outcome = mgr
            .upsert_rule_group(
                "missing",
                RuleGroup {
                    name: "g".into(),
                    interval_seconds: 30,
                    rules: vec![],
                },
            )
            .unwrap();
        assert_eq!(outcome, MutateOutcome::NotFound);
    }

    #[test]
    fn upsert_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalRuleManager::new(dir.path()).unwrap();
        mgr.create_manager("a", AlertmanagerConfig::default()).unwrap();
        mgr.upsert_rule_group(
            "a",
            RuleGroup {
                name: "g".into(),
                interval_seconds: 30,
                rules: vec!["up".into()],
            },
        )
        .unwrap();
        let groups = mgr.list_rule_groups("a").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "g");
    }

    #[test]
    fn delete_removes_directory_and_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = LocalRuleManager::new(dir.path()).unwrap();
        mgr.create_manager("a", AlertmanagerConfig::default()).unwrap();
        assert_eq!(mgr.delete_manager("a").unwrap(), MutateOutcome::Ok);
        assert_eq!(mgr.delete_manager("a").unwrap(), MutateOutcome::NotFound);
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn load_rebuilds_state_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mgr = LocalRuleManager::new(dir.path()).unwrap();
            mgr.create_manager(
                "a",
                AlertmanagerConfig { urls: vec!["http://am:9093".into()], ..Default::default() },
            )
            .unwrap();
            mgr.upsert_rule_group(
                "a",
                RuleGroup {
                    name: "g".into(),
                    interval_seconds: 15,
                    rules: vec!["up".into()],
                },
            )
            .unwrap();
        }
        let mgr = LocalRuleManager::new(dir.path()).unwrap();
        assert!(mgr.list_rule_groups("a").is_err());
        mgr.load().unwrap();
        let groups = mgr.list_rule_groups("a").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(mgr.list_alertmanagers("a").unwrap().urls, vec!["http://am:9093".to_string()]);
    }
}

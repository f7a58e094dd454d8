//! Recording/alerting rule-manager CRUD: a local, disk-backed manager per
//! node, and a replicated wrapper that fans operations out the same way
//! `ms-replicate` fans out points, keyed by manager id instead of a sample
//! fingerprint.

pub mod local;
pub mod replicated;

pub use local::{validate_manager_id, AlertmanagerConfig, CreateOutcome, LocalRuleManager, MutateOutcome, RuleGroup};
pub use replicated::{PeerRuleClient, ReplicatedRuleManager};

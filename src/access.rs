//! Community-based access policy.
//!
//! A rule grants a community read, write and/or notify rights over a subtree. A
//! community with no rule has no access at all.

use crate::oid::Oid;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Protocol version a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityModel {
    V1,
    V2c,
    Any,
}

/// How a rule's community is compared with the request credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRule {
    Exact,
}

/// Right being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Notify,
}

/// One community's view of the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub community: String,
    pub security_model: SecurityModel,
    pub match_rule: MatchRule,
    /// Absent roots grant nothing
    pub read_view: Option<Oid>,
    pub write_view: Option<Oid>,
    pub notify_view: Option<Oid>,
}

impl AccessRule {
    /// Rule granting nothing; add views with the builder methods
    pub fn new(community: impl Into<String>) -> Self {
        Self {
            community: community.into(),
            security_model: SecurityModel::Any,
            match_rule: MatchRule::Exact,
            read_view: None,
            write_view: None,
            notify_view: None,
        }
    }

    pub fn read(mut self, root: Oid) -> Self {
        self.read_view = Some(root);
        self
    }

    pub fn write(mut self, root: Oid) -> Self {
        self.write_view = Some(root);
        self
    }

    pub fn notify(mut self, root: Oid) -> Self {
        self.notify_view = Some(root);
        self
    }

    pub fn matches(&self, credential: &str) -> bool {
        match self.match_rule {
            MatchRule::Exact => self.community == credential,
        }
    }

    fn view(&self, permission: Permission) -> Option<&Oid> {
        match permission {
            Permission::Read => self.read_view.as_ref(),
            Permission::Write => self.write_view.as_ref(),
            Permission::Notify => self.notify_view.as_ref(),
        }
    }

    /// Whether this rule grants `permission` on `oid`
    pub fn allows(&self, permission: Permission, oid: &Oid) -> bool {
        self.view(permission)
            .map(|root| root.is_prefix_of(oid))
            .unwrap_or(false)
    }
}

/// Set of access rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// Rules for a get/set/trap community triple sharing one view root
    ///
    /// The get community reads, the set community reads and writes, and both may be
    /// notified. A trap community distinct from both gets notify only.
    pub fn from_communities(get: &str, set: &str, trap: &str, view_root: Oid) -> Self {
        let mut rules = Vec::new();
        if get == set {
            rules.push(
                AccessRule::new(get)
                    .read(view_root.clone())
                    .write(view_root.clone())
                    .notify(view_root.clone()),
            );
        } else {
            rules.push(
                AccessRule::new(get)
                    .read(view_root.clone())
                    .notify(view_root.clone()),
            );
            rules.push(
                AccessRule::new(set)
                    .read(view_root.clone())
                    .write(view_root.clone())
                    .notify(view_root.clone()),
            );
        }
        if trap != get && trap != set {
            rules.push(AccessRule::new(trap).notify(view_root));
        }
        Self { rules }
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn push(&mut self, rule: AccessRule) {
        self.rules.push(rule);
    }

    /// Whether any rule for `credential` grants `permission` on `oid`
    pub fn check(&self, credential: &str, permission: Permission, oid: &Oid) -> bool {
        let allowed = self
            .rules
            .iter()
            .filter(|rule| rule.matches(credential))
            .any(|rule| rule.allows(permission, oid));
        if !allowed {
            debug!(?permission, %oid, "Access denied");
        }
        allowed
    }

    pub fn check_read(&self, credential: &str, oid: &Oid) -> bool {
        self.check(credential, Permission::Read, oid)
    }

    pub fn check_write(&self, credential: &str, oid: &Oid) -> bool {
        self.check(credential, Permission::Write, oid)
    }

    pub fn check_notify(&self, credential: &str, oid: &Oid) -> bool {
        self.check(credential, Permission::Notify, oid)
    }
}

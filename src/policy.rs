//! # Policy Documents
//!
//! IAM-style access policies: an ordered list of role bindings, each holding
//! a set of members. Merging a member into a role is idempotent so the merge
//! can be replayed on every conflict retry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Concurrency token from the last read; writes carrying a stale tag are
    /// rejected with a conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `member` to `role`. Returns `false` when it was already there.
    pub fn add_member(&mut self, role: &str, member: &str) -> bool {
        match self.bindings.iter_mut().find(|b| b.role == role) {
            Some(binding) if binding.members.iter().any(|m| m == member) => false,
            Some(binding) => {
                binding.members.push(member.to_string());
                true
            }
            None => {
                self.bindings.push(Binding {
                    role: role.to_string(),
                    members: vec![member.to_string()],
                });
                true
            }
        }
    }

    /// Add `member` to every role in `roles`.
    pub fn grant(mut self, member: &str, roles: &[String]) -> Self {
        for role in roles {
            self.add_member(role, member);
        }
        self
    }

    pub fn has_member(&self, role: &str, member: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.role == role && b.members.iter().any(|m| m == member))
    }

    pub fn members(&self, role: &str) -> &[String] {
        self.bindings
            .iter()
            .find(|b| b.role == role)
            .map(|b| b.members.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_new_binding_for_unknown_role() {
        let mut policy = PolicyDocument::new();
        assert!(policy.add_member("roles/editor", "user:a@example.com"));
        assert_eq!(policy.members("roles/editor"), ["user:a@example.com"]);
    }

    #[test]
    fn appends_to_existing_binding() {
        let mut policy = PolicyDocument::new();
        policy.add_member("roles/editor", "user:a@example.com");
        policy.add_member("roles/editor", "user:b@example.com");
        assert_eq!(policy.bindings.len(), 1);
        assert_eq!(policy.members("roles/editor").len(), 2);
    }

    #[test]
    fn repeated_merge_is_a_no_op() {
        let roles = vec!["roles/cloudsql.client".to_string(), "roles/storage.admin".to_string()];
        let once = PolicyDocument::new().grant("serviceAccount:x", &roles);
        let twice = once.clone().grant("serviceAccount:x", &roles);
        assert_eq!(once, twice);
    }

    #[test]
    fn preserves_unrelated_bindings_and_order() {
        let mut policy = PolicyDocument {
            bindings: vec![
                Binding {
                    role: "roles/owner".into(),
                    members: vec!["user:owner@example.com".into()],
                },
                Binding {
                    role: "roles/viewer".into(),
                    members: vec![],
                },
            ],
            etag: Some("BwX".into()),
        };
        policy.add_member("roles/viewer", "allUsers");
        assert_eq!(policy.bindings[0].role, "roles/owner");
        assert!(policy.has_member("roles/viewer", "allUsers"));
        assert_eq!(policy.etag.as_deref(), Some("BwX"));
    }
}

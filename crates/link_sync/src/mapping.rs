//! Chat role to permission group table.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Mapping from chat role names to permission group names.
///
/// Built from config entries of the form `"<role> <group>"`. Entry order is
/// kept for display; lookups go through an index. A table is never edited
/// in place: reloads build a fresh one and swap it in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl RoleMapping {
    /// Builds a mapping from raw config lines.
    ///
    /// Each line is split on whitespace. Lines that do not yield exactly two
    /// tokens are skipped. When a role appears twice the later group wins,
    /// keeping the position of the first occurrence.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use link_sync::RoleMapping;
    ///
    /// let mapping = RoleMapping::build(["Moderator staff", "broken", "VIP vip"]);
    /// assert_eq!(mapping.group_for("Moderator"), Some("staff"));
    /// assert_eq!(mapping.len(), 2);
    /// ```
    pub fn build<I, S>(raw_entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mapping = RoleMapping::default();

        for raw in raw_entries {
            let raw = raw.as_ref();
            let tokens: Vec<&str> = raw.split_whitespace().collect();
            let [role, group] = tokens.as_slice() else {
                debug!(entry = raw, "Skipping malformed role mapping entry");
                continue;
            };
            mapping.insert(role, group);
        }

        mapping
    }

    fn insert(&mut self, role: &str, group: &str) {
        match self.index.get(role) {
            Some(&position) => self.entries[position].1 = group.to_string(),
            None => {
                self.index.insert(role.to_string(), self.entries.len());
                self.entries.push((role.to_string(), group.to_string()));
            }
        }
    }

    /// Group granted for `role`, if the role is mapped.
    pub fn group_for(&self, role: &str) -> Option<&str> {
        self.index
            .get(role)
            .map(|&position| self.entries[position].1.as_str())
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.index.contains_key(role)
    }

    /// Every group this mapping is allowed to add or remove.
    pub fn managed_groups(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|(_, group)| group.as_str()).collect()
    }

    pub fn manages_group(&self, group: &str) -> bool {
        self.entries.iter().any(|(_, managed)| managed == group)
    }

    /// Groups implied by a set of held roles. Unmapped roles are ignored.
    pub fn desired_groups<'a, I>(&self, roles: I) -> BTreeSet<&str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        roles
            .into_iter()
            .filter_map(|role| self.group_for(role))
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(role, group)| (role.as_str(), group.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

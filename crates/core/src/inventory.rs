//! Inventory graph resolution and rendering.
//!
//! A stored inventory is a root (own variables, direct hosts, direct groups)
//! over a DAG of groups. [`InventoryGraph::resolve`] walks that DAG into a
//! [`ResolvedInventory`], which renders both as ansible INI text and as the
//! JSON document ansible accepts from dynamic inventory scripts.
//!
//! Effective host variables follow
//! `inventory < outer group < inner group < host`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hosts::{self, HostKind};
use crate::types::DbId;
use crate::variables::{self, Variables};

/// Name of the implicit group every host belongs to.
pub const ALL_GROUP: &str = "all";

// ---------------------------------------------------------------------------
// Graph nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNode {
    pub id: DbId,
    pub name: String,
    pub kind: HostKind,
    pub vars: Variables,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    pub id: DbId,
    pub name: String,
    /// `true` when the group holds sub-groups, `false` when it holds hosts.
    pub children: bool,
    pub vars: Variables,
    pub hosts: Vec<DbId>,
    pub groups: Vec<DbId>,
}

impl GroupNode {
    fn member_hosts(&self) -> &[DbId] {
        if self.children {
            &[]
        } else {
            &self.hosts
        }
    }

    fn member_groups(&self) -> &[DbId] {
        if self.children {
            &self.groups
        } else {
            &[]
        }
    }
}

/// Everything needed to resolve one inventory, loaded up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryGraph {
    pub vars: Variables,
    /// Hosts attached directly to the inventory.
    pub hosts: Vec<DbId>,
    /// Groups attached directly to the inventory.
    pub groups: Vec<DbId>,
    pub host_nodes: HashMap<DbId, HostNode>,
    pub group_nodes: HashMap<DbId, GroupNode>,
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Whether linking `child` under `parent` would close a cycle.
///
/// `edges` maps each group id to its sub-group ids. A cycle exists iff
/// `parent` is reachable from `child` (or they are the same group).
pub fn would_create_cycle(edges: &HashMap<DbId, Vec<DbId>>, parent: DbId, child: DbId) -> bool {
    if parent == child {
        return true;
    }
    let mut stack = vec![child];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == parent {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = edges.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGroup {
    pub name: String,
    pub children: bool,
    pub vars: Variables,
    /// Host entries as stored (RANGE patterns unexpanded) with their own
    /// variables.
    pub host_entries: Vec<(String, Variables)>,
    /// Concrete host names with ranges expanded.
    pub hosts: Vec<String>,
    pub subgroups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedHost {
    pub name: String,
    /// Variables set on the host entry itself.
    pub vars: Variables,
    /// Variables after applying every enclosing scope.
    pub effective_vars: Variables,
}

/// A stored inventory walked into a flat, deduplicated structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInventory {
    pub vars: Variables,
    /// Direct host entries of the inventory (RANGE patterns unexpanded).
    pub host_entries: Vec<(String, Variables)>,
    /// Direct hosts of the inventory with ranges expanded.
    pub direct_hosts: Vec<String>,
    pub top_groups: Vec<String>,
    pub groups: BTreeMap<String, ResolvedGroup>,
    pub hosts: BTreeMap<String, ResolvedHost>,
    /// Ids of every host object reachable from the inventory.
    pub host_ids: BTreeSet<DbId>,
    /// Ids of every group object reachable from the inventory.
    pub group_ids: BTreeSet<DbId>,
}

impl InventoryGraph {
    fn host(&self, id: DbId) -> Result<&HostNode, CoreError> {
        self.host_nodes
            .get(&id)
            .ok_or(CoreError::NotFound { entity: "host", id })
    }

    fn group(&self, id: DbId) -> Result<&GroupNode, CoreError> {
        self.group_nodes
            .get(&id)
            .ok_or(CoreError::NotFound { entity: "group", id })
    }

    /// Walk the graph from the inventory root.
    pub fn resolve(&self) -> Result<ResolvedInventory, CoreError> {
        let mut resolved = ResolvedInventory {
            vars: self.vars.clone(),
            host_entries: Vec::new(),
            direct_hosts: Vec::new(),
            top_groups: Vec::new(),
            groups: BTreeMap::new(),
            hosts: BTreeMap::new(),
            host_ids: BTreeSet::new(),
            group_ids: BTreeSet::new(),
        };

        // Each concrete host collects the (depth, group name) scopes it sits in.
        let mut scopes: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();
        let mut own_vars: BTreeMap<String, Variables> = BTreeMap::new();

        for &id in &self.hosts {
            let host = self.host(id)?;
            resolved.host_ids.insert(id);
            resolved
                .host_entries
                .push((host.name.clone(), host.vars.clone()));
            for name in hosts::expand_host(host.kind, &host.name)? {
                if !resolved.direct_hosts.contains(&name) {
                    resolved.direct_hosts.push(name.clone());
                }
                scopes.entry(name.clone()).or_default();
                own_vars.entry(name).or_default().extend(host.vars.clone());
            }
        }

        let mut depths: HashMap<DbId, usize> = HashMap::new();
        for &id in &self.groups {
            let name = self.group(id)?.name.clone();
            if !resolved.top_groups.contains(&name) {
                resolved.top_groups.push(name);
            }
            self.walk_group(id, 1, &mut Vec::new(), &mut depths)?;
        }

        // Deepest placement of each group decides its precedence.
        for (&id, &depth) in &depths {
            let group = self.group(id)?;
            resolved.group_ids.insert(id);
            let mut entry = ResolvedGroup {
                name: group.name.clone(),
                children: group.children,
                vars: group.vars.clone(),
                host_entries: Vec::new(),
                hosts: Vec::new(),
                subgroups: Vec::new(),
            };
            for &host_id in group.member_hosts() {
                let host = self.host(host_id)?;
                resolved.host_ids.insert(host_id);
                entry
                    .host_entries
                    .push((host.name.clone(), host.vars.clone()));
                for name in hosts::expand_host(host.kind, &host.name)? {
                    if !entry.hosts.contains(&name) {
                        entry.hosts.push(name.clone());
                    }
                    scopes
                        .entry(name.clone())
                        .or_default()
                        .push((depth, group.name.clone()));
                    own_vars.entry(name).or_default().extend(host.vars.clone());
                }
            }
            for &sub_id in group.member_groups() {
                entry.subgroups.push(self.group(sub_id)?.name.clone());
            }
            resolved.groups.insert(group.name.clone(), entry);
        }

        // Every host below a group is also a member of its ancestors, so
        // extend scopes with ancestor groups at their own depths.
        let ancestors = self.ancestor_map(&depths)?;
        let mut depth_by_name = HashMap::new();
        for (&id, &depth) in &depths {
            depth_by_name.insert(self.group(id)?.name.clone(), depth);
        }
        for (name, host_scopes) in scopes.iter_mut() {
            let mut extra = Vec::new();
            for (_, group_name) in host_scopes.iter() {
                for ancestor in ancestors.get(group_name).into_iter().flatten() {
                    if let Some(&depth) = depth_by_name.get(ancestor) {
                        extra.push((depth, ancestor.clone()));
                    }
                }
            }
            host_scopes.extend(extra);
            host_scopes.sort();
            host_scopes.dedup();

            let mut effective = self.vars.clone();
            for (_, group_name) in host_scopes.iter() {
                if let Some(group) = resolved.groups.get(group_name) {
                    effective.extend(group.vars.clone());
                }
            }
            let own = own_vars.remove(name).unwrap_or_default();
            effective.extend(own.clone());
            resolved.hosts.insert(
                name.clone(),
                ResolvedHost {
                    name: name.clone(),
                    vars: own,
                    effective_vars: effective,
                },
            );
        }

        Ok(resolved)
    }

    /// Record the maximum depth of every reachable group, rejecting cycles.
    fn walk_group(
        &self,
        id: DbId,
        depth: usize,
        path: &mut Vec<DbId>,
        depths: &mut HashMap<DbId, usize>,
    ) -> Result<(), CoreError> {
        if path.contains(&id) {
            return Err(CoreError::Conflict(format!(
                "Group {id} is part of a membership cycle"
            )));
        }
        let group = self.group(id)?;
        let slot = depths.entry(id).or_insert(depth);
        *slot = (*slot).max(depth);
        path.push(id);
        for &child in group.member_groups() {
            self.walk_group(child, depth + 1, path, depths)?;
        }
        path.pop();
        Ok(())
    }

    /// Group name -> names of every group that (transitively) contains it.
    fn ancestor_map(
        &self,
        depths: &HashMap<DbId, usize>,
    ) -> Result<HashMap<String, BTreeSet<String>>, CoreError> {
        let mut parents: HashMap<DbId, Vec<DbId>> = HashMap::new();
        for &id in depths.keys() {
            for &child in self.group(id)?.member_groups() {
                parents.entry(child).or_default().push(id);
            }
        }
        let mut out = HashMap::new();
        for &id in depths.keys() {
            let mut names = BTreeSet::new();
            let mut stack = parents.get(&id).cloned().unwrap_or_default();
            let mut seen = HashSet::new();
            while let Some(parent) = stack.pop() {
                if !seen.insert(parent) {
                    continue;
                }
                names.insert(self.group(parent)?.name.clone());
                if let Some(next) = parents.get(&parent) {
                    stack.extend(next.iter().copied());
                }
            }
            out.insert(self.group(id)?.name.clone(), names);
        }
        Ok(out)
    }
}

impl ResolvedInventory {
    /// Copy with every variable value passed through `f(key, value)`.
    pub fn map_values(&self, f: impl Fn(&str, &str) -> String) -> Self {
        let map = |vars: &Variables| -> Variables {
            vars.iter().map(|(k, v)| (k.clone(), f(k, v))).collect()
        };
        let mut out = self.clone();
        out.vars = map(&self.vars);
        for (_, vars) in out.host_entries.iter_mut() {
            *vars = map(vars);
        }
        for group in out.groups.values_mut() {
            group.vars = map(&group.vars);
            for (_, vars) in group.host_entries.iter_mut() {
                *vars = map(vars);
            }
        }
        for host in out.hosts.values_mut() {
            host.vars = map(&host.vars);
            host.effective_vars = map(&host.effective_vars);
        }
        out
    }

    /// Copy with sensitive values replaced by the redaction marker.
    pub fn redacted(&self) -> Self {
        self.map_values(|k, v| variables::redact_value(k, v).to_string())
    }

    /// Render as ansible INI inventory text.
    ///
    /// RANGE entries keep their bracket pattern, which ansible expands
    /// itself.
    pub fn render_ini(&self) -> String {
        let mut out = String::new();
        for (name, vars) in &self.host_entries {
            out.push_str(&host_line(name, vars));
        }
        if !self.vars.is_empty() {
            out.push_str("\n[all:vars]\n");
            for (k, v) in &self.vars {
                let _ = writeln!(out, "{k}={}", ini_value(v));
            }
        }
        for group in self.groups.values() {
            let _ = write!(out, "\n[{}]\n", group.name);
            for (name, vars) in &group.host_entries {
                out.push_str(&host_line(name, vars));
            }
            if !group.subgroups.is_empty() {
                let _ = write!(out, "\n[{}:children]\n", group.name);
                for sub in &group.subgroups {
                    out.push_str(sub);
                    out.push('\n');
                }
            }
            if !group.vars.is_empty() {
                let _ = write!(out, "\n[{}:vars]\n", group.name);
                for (k, v) in &group.vars {
                    let _ = writeln!(out, "{k}={}", ini_value(v));
                }
            }
        }
        out
    }

    /// Render as the JSON document of an ansible dynamic inventory.
    pub fn to_json(&self) -> serde_json::Value {
        let mut doc = serde_json::Map::new();
        doc.insert(
            ALL_GROUP.to_string(),
            serde_json::json!({
                "hosts": self.direct_hosts,
                "children": self.top_groups,
                "vars": self.vars,
            }),
        );
        for group in self.groups.values() {
            doc.insert(
                group.name.clone(),
                serde_json::json!({
                    "hosts": group.hosts,
                    "children": group.subgroups,
                    "vars": group.vars,
                }),
            );
        }
        let hostvars: BTreeMap<&String, &Variables> =
            self.hosts.iter().map(|(name, h)| (name, &h.vars)).collect();
        doc.insert(
            "_meta".to_string(),
            serde_json::json!({ "hostvars": hostvars }),
        );
        serde_json::Value::Object(doc)
    }
}

fn host_line(name: &str, vars: &Variables) -> String {
    let mut line = name.to_string();
    for (k, v) in vars {
        let _ = write!(line, " {k}={}", ini_value(v));
    }
    line.push('\n');
    line
}

fn ini_value(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::variables::REDACTED_MARKER;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn host(id: DbId, name: &str, kind: HostKind, v: Variables) -> HostNode {
        HostNode {
            id,
            name: name.to_string(),
            kind,
            vars: v,
        }
    }

    fn group(id: DbId, name: &str, children: bool, hosts: &[DbId], groups: &[DbId]) -> GroupNode {
        GroupNode {
            id,
            name: name.to_string(),
            children,
            vars: Variables::new(),
            hosts: hosts.to_vec(),
            groups: groups.to_vec(),
        }
    }

    /// inventory -> [127.0.0.1], [outer -> inner -> 10.0.0.[1:3], db1]
    fn sample_graph() -> InventoryGraph {
        let mut g = InventoryGraph {
            vars: vars(&[("ansible_user", "centos"), ("ansible_ssh_pass", "secret")]),
            hosts: vec![1],
            groups: vec![10],
            ..Default::default()
        };
        g.host_nodes.insert(
            1,
            host(1, "127.0.0.1", HostKind::Host, vars(&[("ansible_connection", "local")])),
        );
        g.host_nodes
            .insert(2, host(2, "10.0.0.[1:3]", HostKind::Range, Variables::new()));
        g.host_nodes.insert(
            3,
            host(3, "db1", HostKind::Host, vars(&[("ansible_user", "db")])),
        );
        let mut outer = group(10, "outer", true, &[], &[11]);
        outer.vars = vars(&[("ansible_user", "outer"), ("tier", "outer")]);
        let mut inner = group(11, "inner", false, &[2, 3], &[]);
        inner.vars = vars(&[("tier", "inner")]);
        g.group_nodes.insert(10, outer);
        g.group_nodes.insert(11, inner);
        g
    }

    // -- cycles ------------------------------------------------------------

    #[test]
    fn self_link_is_cycle() {
        assert!(would_create_cycle(&HashMap::new(), 1, 1));
    }

    #[test]
    fn back_edge_is_cycle() {
        // 1 -> 2 -> 3; linking 3 -> 1 closes the loop.
        let edges = HashMap::from([(1, vec![2]), (2, vec![3])]);
        assert!(would_create_cycle(&edges, 3, 1));
        assert!(!would_create_cycle(&edges, 1, 3));
        assert!(!would_create_cycle(&edges, 4, 1));
    }

    // -- resolve -----------------------------------------------------------

    #[test]
    fn resolve_expands_ranges_and_dedups() {
        let resolved = sample_graph().resolve().unwrap();
        assert_eq!(resolved.hosts.len(), 5);
        assert!(resolved.hosts.contains_key("10.0.0.2"));
        assert_eq!(resolved.host_ids.len(), 3);
        assert_eq!(resolved.group_ids.len(), 2);
        assert_eq!(resolved.groups["inner"].hosts.len(), 4);
    }

    #[test]
    fn variable_precedence_inner_over_outer_host_over_all() {
        let resolved = sample_graph().resolve().unwrap();
        let ranged = &resolved.hosts["10.0.0.1"].effective_vars;
        assert_eq!(ranged["tier"], "inner");
        assert_eq!(ranged["ansible_user"], "outer");
        let db = &resolved.hosts["db1"].effective_vars;
        assert_eq!(db["ansible_user"], "db");
        let local = &resolved.hosts["127.0.0.1"].effective_vars;
        assert_eq!(local["ansible_user"], "centos");
    }

    #[test]
    fn shared_group_resolved_once() {
        let mut g = sample_graph();
        // inner is reachable directly and through outer.
        g.groups.push(11);
        let resolved = g.resolve().unwrap();
        assert_eq!(resolved.group_ids.len(), 2);
        assert_eq!(resolved.hosts["db1"].effective_vars["tier"], "inner");
    }

    #[test]
    fn cyclic_graph_is_rejected() {
        let mut g = sample_graph();
        g.group_nodes.get_mut(&11).unwrap().children = true;
        g.group_nodes.get_mut(&11).unwrap().groups = vec![10];
        assert_matches!(g.resolve(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn missing_member_is_not_found() {
        let mut g = sample_graph();
        g.hosts.push(99);
        assert_matches!(
            g.resolve(),
            Err(CoreError::NotFound { entity: "host", id: 99 })
        );
    }

    // -- render ------------------------------------------------------------

    #[test]
    fn ini_render_redacts_secrets() {
        let text = sample_graph().resolve().unwrap().redacted().render_ini();
        assert!(text.contains("127.0.0.1 ansible_connection=local\n"));
        assert!(text.contains("[all:vars]\n"));
        assert!(text.contains(&format!("ansible_ssh_pass={REDACTED_MARKER}")));
        assert!(!text.contains("secret"));
        assert!(text.contains("[outer:children]\ninner\n"));
        assert!(text.contains("[inner]\n10.0.0.[1:3]\ndb1 ansible_user=db\n"));
        assert!(text.contains("[inner:vars]\ntier=inner\n"));
    }

    #[test]
    fn ini_render_keeps_real_values() {
        let text = sample_graph().resolve().unwrap().render_ini();
        assert!(text.contains("ansible_ssh_pass=secret"));
    }

    #[test]
    fn json_document_shape() {
        let doc = sample_graph().resolve().unwrap().to_json();
        assert_eq!(doc["all"]["hosts"][0], "127.0.0.1");
        assert_eq!(doc["all"]["children"][0], "outer");
        assert_eq!(doc["outer"]["children"][0], "inner");
        assert_eq!(doc["inner"]["hosts"].as_array().unwrap().len(), 4);
        assert_eq!(doc["_meta"]["hostvars"]["db1"]["ansible_user"], "db");
    }
}

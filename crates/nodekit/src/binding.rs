//! Mapping created nodes back to roles.
//!
//! Providers do not promise to return nodes in request order, and some do not
//! echo the requested names either. Binding therefore prefers exact name
//! matches and only falls back to positional assignment when no returned name
//! matches at all and the policy allows it.

use crate::error::{Error, Result};
use crate::role::Role;
use crate::types::ProvisionedNode;
use std::collections::BTreeMap;

/// How to bind nodes whose names do not match the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingPolicy {
    /// Require every role to match a node by name
    NameOnly,
    /// Match by name; if no name matches at all, assign in declared role order
    #[default]
    NameThenPosition,
}

/// Read-only mapping from every role to the node fulfilling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    nodes: BTreeMap<Role, ProvisionedNode>,
}

impl RoleBinding {
    /// Build a binding; fails unless every role is present.
    pub fn new(nodes: BTreeMap<Role, ProvisionedNode>) -> Result<Self> {
        let missing: Vec<String> = Role::ALL
            .iter()
            .filter(|role| !nodes.contains_key(*role))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(Error::RoleBinding {
                message: format!("no node bound for {}", missing.join(", ")),
                nodes: nodes.into_values().collect(),
            });
        }
        Ok(Self { nodes })
    }

    /// Node bound to a role.
    pub fn get(&self, role: Role) -> &ProvisionedNode {
        // Totality is checked in `new`.
        &self.nodes[&role]
    }

    /// Bindings in declared role order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &ProvisionedNode)> {
        self.nodes.iter().map(|(role, node)| (*role, node))
    }

    /// Every bound node, in declared role order.
    pub fn nodes(&self) -> Vec<ProvisionedNode> {
        self.nodes.values().cloned().collect()
    }

    /// Web-server nodes in declared role order.
    pub fn web_servers(&self) -> impl Iterator<Item = (Role, &ProvisionedNode)> {
        self.iter().filter(|(role, _)| role.is_web_server())
    }
}

/// Assign created nodes to the requested roles.
///
/// `requested` lists each role with the name it was requested under.
pub fn bind_roles(
    requested: &[(Role, String)],
    nodes: Vec<ProvisionedNode>,
    policy: BindingPolicy,
) -> Result<RoleBinding> {
    if nodes.len() != requested.len() {
        return Err(Error::RoleBinding {
            message: format!(
                "expected {} nodes, provider returned {}",
                requested.len(),
                nodes.len()
            ),
            nodes,
        });
    }

    let mut matched: BTreeMap<Role, usize> = BTreeMap::new();
    for (role, name) in requested {
        let hits: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.name == *name)
            .map(|(i, _)| i)
            .collect();
        match hits.as_slice() {
            [] => {}
            [index] => {
                matched.insert(*role, *index);
            }
            _ => {
                return Err(Error::RoleBinding {
                    message: format!("{} nodes report the name '{name}'", hits.len()),
                    nodes,
                });
            }
        }
    }

    if matched.len() == requested.len() {
        log::debug!("Bound {} nodes by name", matched.len());
        let mut slots: Vec<Option<ProvisionedNode>> = nodes.into_iter().map(Some).collect();
        let bound = matched
            .into_iter()
            .filter_map(|(role, index)| slots[index].take().map(|node| (role, node)))
            .collect();
        return RoleBinding::new(bound);
    }

    if !matched.is_empty() {
        let unmatched: Vec<&str> = requested
            .iter()
            .filter(|(role, _)| !matched.contains_key(role))
            .map(|(_, name)| name.as_str())
            .collect();
        return Err(Error::RoleBinding {
            message: format!(
                "only {} of {} requested names matched; no node named {}",
                matched.len(),
                requested.len(),
                unmatched.join(", ")
            ),
            nodes,
        });
    }

    match policy {
        BindingPolicy::NameOnly => Err(Error::RoleBinding {
            message: "no returned node name matches a requested name".to_string(),
            nodes,
        }),
        BindingPolicy::NameThenPosition => {
            log::warn!(
                "No node names match the request; binding {} nodes by position",
                nodes.len()
            );
            let bound = requested
                .iter()
                .map(|(role, _)| *role)
                .zip(nodes)
                .inspect(|(role, node)| log::warn!("  {role} -> {} ({})", node.name, node.id))
                .collect();
            RoleBinding::new(bound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested() -> Vec<(Role, String)> {
        Role::ALL
            .iter()
            .map(|role| (*role, role.node_name("mcw")))
            .collect()
    }

    fn node(id: &str, name: &str) -> ProvisionedNode {
        ProvisionedNode::new(id, name)
            .with_public("203.0.113.1")
            .with_private("10.0.0.1")
    }

    #[test]
    fn test_bind_by_name_ignores_return_order() {
        let nodes = vec![
            node("4", "mcw-lb"),
            node("2", "mcw-webserver-02"),
            node("1", "mcw-db"),
            node("3", "mcw-webserver-01"),
        ];
        let binding = bind_roles(&requested(), nodes, BindingPolicy::NameOnly).unwrap();
        assert_eq!(binding.get(Role::Database).id, "1");
        assert_eq!(binding.get(Role::WebServer1).id, "3");
        assert_eq!(binding.get(Role::WebServer2).id, "2");
        assert_eq!(binding.get(Role::LoadBalancer).id, "4");
    }

    #[test]
    fn test_positional_fallback_when_no_names_match() {
        let nodes = vec![node("a", "x-1"), node("b", "x-2"), node("c", "x-3"), node("d", "x-4")];
        let binding = bind_roles(&requested(), nodes, BindingPolicy::NameThenPosition).unwrap();
        let ids: Vec<&str> = binding.iter().map(|(_, n)| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_name_only_rejects_unmatched() {
        let nodes = vec![node("a", "x-1"), node("b", "x-2"), node("c", "x-3"), node("d", "x-4")];
        let err = bind_roles(&requested(), nodes, BindingPolicy::NameOnly).unwrap_err();
        assert!(matches!(err, Error::RoleBinding { .. }));
        assert_eq!(err.orphaned_nodes().len(), 4);
    }

    #[test]
    fn test_partial_match_is_ambiguous() {
        let nodes = vec![
            node("1", "mcw-db"),
            node("2", "x-2"),
            node("3", "x-3"),
            node("4", "x-4"),
        ];
        let err = bind_roles(&requested(), nodes, BindingPolicy::NameThenPosition).unwrap_err();
        assert!(err.to_string().contains("only 1 of 4"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let nodes = vec![
            node("1", "mcw-db"),
            node("2", "mcw-db"),
            node("3", "mcw-webserver-02"),
            node("4", "mcw-lb"),
        ];
        let err = bind_roles(&requested(), nodes, BindingPolicy::NameThenPosition).unwrap_err();
        assert!(err.to_string().contains("2 nodes report the name 'mcw-db'"));
    }

    #[test]
    fn test_count_mismatch() {
        let nodes = vec![node("1", "mcw-db")];
        let err = bind_roles(&requested(), nodes, BindingPolicy::NameThenPosition).unwrap_err();
        assert!(err.to_string().contains("expected 4 nodes"));
    }

    #[test]
    fn test_binding_requires_every_role() {
        let mut map = BTreeMap::new();
        map.insert(Role::Database, node("1", "mcw-db"));
        assert!(RoleBinding::new(map).is_err());
    }

    #[test]
    fn test_web_servers_in_role_order() {
        let nodes = vec![
            node("4", "mcw-lb"),
            node("3", "mcw-webserver-02"),
            node("2", "mcw-webserver-01"),
            node("1", "mcw-db"),
        ];
        let binding = bind_roles(&requested(), nodes, BindingPolicy::NameOnly).unwrap();
        let web: Vec<Role> = binding.web_servers().map(|(role, _)| role).collect();
        assert_eq!(web, vec![Role::WebServer1, Role::WebServer2]);
    }
}

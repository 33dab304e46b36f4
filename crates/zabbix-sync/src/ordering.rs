//! Import ordering of linked templates.
//!
//! A template's level is one more than the highest level among the
//! templates it links to inside the same set, so importing in ascending
//! level order never imports a template before one it links to. Links to
//! templates outside the set are assumed to exist already.

use std::collections::HashMap;

use crate::assets::Template;
use crate::error::{Result, SyncError};

/// Something with a name that links to other names.
pub trait Linked {
    fn link_name(&self) -> &str;
    fn links(&self) -> Vec<String>;
}

impl Linked for Template {
    fn link_name(&self) -> &str {
        self.name()
    }

    fn links(&self) -> Vec<String> {
        self.linked_names()
    }
}

struct LevelWalk<'a> {
    links: HashMap<&'a str, Vec<String>>,
    levels: HashMap<String, usize>,
    /// Names currently being resolved, outermost first.
    stack: Vec<String>,
}

impl LevelWalk<'_> {
    fn level(&mut self, name: &str) -> Result<usize> {
        if let Some(&level) = self.levels.get(name) {
            return Ok(level);
        }
        if let Some(pos) = self.stack.iter().position(|n| n == name) {
            let mut chain = self.stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(SyncError::DependencyCycle { chain });
        }

        let linked: Vec<String> = self
            .links
            .get(name)
            .into_iter()
            .flatten()
            .filter(|l| self.links.contains_key(l.as_str()))
            .cloned()
            .collect();
        self.stack.push(name.to_string());
        let mut deepest = 0;
        for link in &linked {
            deepest = deepest.max(self.level(link)?);
        }
        self.stack.pop();

        let level = deepest + 1;
        self.levels.insert(name.to_string(), level);
        Ok(level)
    }
}

/// Level of every item, keyed by name.
///
/// Each level is computed once. A link cycle inside the set fails with
/// [`SyncError::DependencyCycle`].
pub fn dependency_levels<T: Linked>(items: &[T]) -> Result<HashMap<String, usize>> {
    let mut walk = LevelWalk {
        links: items.iter().map(|t| (t.link_name(), t.links())).collect(),
        levels: HashMap::with_capacity(items.len()),
        stack: Vec::new(),
    };
    for item in items {
        walk.level(item.link_name())?;
    }
    Ok(walk.levels)
}

/// Sorts items ascending by level. Items on the same level keep their
/// relative order.
pub fn sort_by_dependency<T: Linked>(mut items: Vec<T>) -> Result<Vec<T>> {
    let levels = dependency_levels(&items)?;
    items.sort_by_key(|t| levels.get(t.link_name()).copied().unwrap_or(1));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    struct Node {
        name: String,
        links: Vec<String>,
    }

    impl Linked for Node {
        fn link_name(&self) -> &str {
            &self.name
        }

        fn links(&self) -> Vec<String> {
            self.links.clone()
        }
    }

    fn node(name: &str, links: &[&str]) -> Node {
        Node {
            name: name.to_string(),
            links: links.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_levels_of_a_chain() {
        let nodes = vec![node("A", &["B"]), node("B", &["C"]), node("C", &[])];
        let levels = dependency_levels(&nodes).unwrap();
        assert_eq!(levels["C"], 1);
        assert_eq!(levels["B"], 2);
        assert_eq!(levels["A"], 3);
        assert_eq!(names(&sort_by_dependency(nodes).unwrap()), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_links_outside_the_set_are_ignored() {
        let nodes = vec![node("A", &["Not exported"]), node("B", &[])];
        let levels = dependency_levels(&nodes).unwrap();
        assert_eq!(levels["A"], 1);
        assert_eq!(names(&sort_by_dependency(nodes).unwrap()), vec!["A", "B"]);
    }

    #[test]
    fn test_diamond_takes_longest_path() {
        let nodes = vec![
            node("Top", &["Left", "Right"]),
            node("Left", &["Base"]),
            node("Right", &["Mid"]),
            node("Mid", &["Base"]),
            node("Base", &[]),
        ];
        let levels = dependency_levels(&nodes).unwrap();
        assert_eq!(levels["Top"], 4);
        assert_eq!(levels["Left"], 2);
    }

    #[test]
    fn test_cycle_is_reported_with_chain() {
        let nodes = vec![node("A", &["B"]), node("B", &["C"]), node("C", &["A"])];
        match dependency_levels(&nodes) {
            Err(SyncError::DependencyCycle { chain }) => {
                assert_eq!(chain, vec!["A", "B", "C", "A"]);
            }
            other => panic!("expected a cycle, got {:?}", other.map(|l| l.len())),
        }

        let self_link = vec![node("Self", &["Self"])];
        assert!(dependency_levels(&self_link).is_err());
    }

    #[test]
    fn test_wide_graph_is_resolved_without_blowup() {
        // every node links to all previous ones
        let nodes: Vec<Node> = (0..200)
            .map(|i| Node {
                name: format!("T{i}"),
                links: (0..i).map(|j| format!("T{j}")).collect(),
            })
            .rev()
            .collect();
        let levels = dependency_levels(&nodes).unwrap();
        assert_eq!(levels["T199"], 200);
    }

    fn acyclic_graph() -> impl Strategy<Value = Vec<Node>> {
        (1usize..25).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n)
                .prop_map(move |edges| {
                    edges
                        .into_iter()
                        .enumerate()
                        .map(|(i, targets)| Node {
                            name: format!("T{i}"),
                            // only link to lower indices, which keeps the graph acyclic
                            links: if i == 0 {
                                Vec::new()
                            } else {
                                targets.iter().map(|t| format!("T{}", t.index(i))).collect()
                            },
                        })
                        .rev()
                        .collect()
                })
        })
    }

    proptest! {
        #[test]
        fn sorted_order_respects_every_link(nodes in acyclic_graph()) {
            let sorted = sort_by_dependency(nodes).unwrap();
            let position: HashMap<&str, usize> = sorted
                .iter()
                .enumerate()
                .map(|(i, n)| (n.name.as_str(), i))
                .collect();
            for n in &sorted {
                for link in &n.links {
                    prop_assert!(position[link.as_str()] < position[n.name.as_str()]);
                }
            }
        }
    }
}

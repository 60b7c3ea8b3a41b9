//! Prefix tree used to match request paths against registered route patterns.
//!
//! Every edge of the tree consumes one path segment. A segment is either a literal
//! (`users`), a named parameter matching exactly one segment (`:id`), or a greedy
//! wildcard matching the remainder of the path (`*filepath`).
//!
//! When a literal child and a wildcard child can both accept a segment, the literal
//! child is explored first, whatever the registration order was. The search
//! backtracks, so a literal branch that dead-ends deeper in the tree still lets a
//! wildcard sibling match.

use std::fmt;

/// A node of the per-method routing tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Node {
    /// full route pattern when this node terminates a route, empty otherwise
    pattern: String,
    /// the segment as registered
    part: String,
    children: Vec<Node>,
    /// true when `part` starts with `:` or `*`
    is_wild: bool,
}

impl Node {
    pub(crate) fn new(part: &str) -> Self {
        let is_wild = part.starts_with(':') || part.starts_with('*');
        Self { pattern: String::new(), part: part.to_string(), children: Vec::new(), is_wild }
    }

    /// The route pattern terminating at this node, empty for intermediate nodes.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The segment this node consumes.
    pub fn part(&self) -> &str {
        &self.part
    }

    #[inline]
    pub fn is_wild(&self) -> bool {
        self.is_wild
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Inserts `parts[depth..]` below this node and marks the last node with `pattern`.
    ///
    /// A child is reused only when its segment is exactly the same, so `:name` and `list`
    /// registered at the same level become siblings.
    pub(crate) fn insert(&mut self, pattern: &str, parts: &[&str], depth: usize) {
        if parts.len() == depth {
            self.pattern = pattern.to_string();
            return;
        }

        let part = parts[depth];
        let index = if let Some(index) = self.children.iter().position(|child| child.part == part) {
            index
        } else {
            self.children.push(Node::new(part));
            self.children.len() - 1
        };

        self.children[index].insert(pattern, parts, depth + 1);
    }

    /// Finds the node terminating the route matching `parts`.
    ///
    /// Returns `None` when the path ends at a node that has no route registered, even if
    /// the segment count lines up.
    pub(crate) fn search(&self, parts: &[&str], depth: usize) -> Option<&Node> {
        if parts.len() == depth || self.part.starts_with('*') {
            return if self.pattern.is_empty() { None } else { Some(self) };
        }

        let part = parts[depth];
        self.match_children(part).find_map(|child| child.search(parts, depth + 1))
    }

    /// Children able to consume `part`: literal matches first, then wildcards, each in
    /// registration order.
    fn match_children<'n, 'p>(&'n self, part: &'p str) -> impl Iterator<Item = &'n Node> + use<'n, 'p> {
        let literals = self.children.iter().filter(move |child| !child.is_wild && child.part == part);
        let wilds = self.children.iter().filter(|child| child.is_wild);
        literals.chain(wilds)
    }

    /// Collects every node terminating a route, depth first in registration order.
    pub(crate) fn travel<'n>(&'n self, list: &mut Vec<&'n Node>) {
        if !self.pattern.is_empty() {
            list.push(self);
        }
        for child in &self.children {
            child.travel(list);
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{{pattern={}, part={}, is_wild={}}}", self.pattern, self.part, self.is_wild)
    }
}

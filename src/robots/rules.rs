//! Path-rule trees for robots policies

/// A node in an agent's path-rule tree
///
/// Each node carries a prefix-match target and an allow/disallow flag.
/// Children are tried before falling back to the node's own flag, and every
/// node's prefix is a prefix of all its descendants' prefixes.
///
/// Resolution descends depth-first into the *first* child (in insertion
/// order) whose prefix matches the path. This reproduces the historical
/// first-insertion-order semantics of the bot this engine replaces; it is
/// deliberately not longest-prefix-wins, because years of crawl state were
/// built against the old behavior.
#[derive(Debug, Clone)]
pub struct RuleNode {
    allowed: bool,
    prefix: String,
    children: Vec<RuleNode>,
}

impl RuleNode {
    /// Creates the default-allow root rule covering "/"
    pub fn root() -> Self {
        Self {
            allowed: true,
            prefix: "/".to_string(),
            children: Vec::new(),
        }
    }

    fn leaf(allowed: bool, prefix: &str) -> Self {
        Self {
            allowed,
            prefix: prefix.to_string(),
            children: Vec::new(),
        }
    }

    /// Inserts a directive pattern into the tree
    ///
    /// Scans existing children in insertion order:
    /// - identical prefix: overwrite the flag (last directive wins)
    /// - pattern extends a child's prefix: recurse into that child
    /// - a child's prefix extends the pattern: splice a new node for the
    ///   pattern above that child, re-parenting any later siblings the
    ///   pattern now covers
    /// - otherwise: append a new leaf
    pub fn add_pattern(&mut self, allowed: bool, pattern: &str) {
        for i in 0..self.children.len() {
            if self.children[i].prefix == pattern {
                self.children[i].allowed = allowed;
                return;
            }

            if pattern.starts_with(&self.children[i].prefix) {
                self.children[i].add_pattern(allowed, pattern);
                return;
            }

            if self.children[i].prefix.starts_with(pattern) {
                // Collect every sibling from here on that the new pattern
                // covers, preserving their relative order
                let mut covered = Vec::new();
                let mut j = i;
                while j < self.children.len() {
                    if self.children[j].prefix.starts_with(pattern) {
                        covered.push(self.children.remove(j));
                    } else {
                        j += 1;
                    }
                }

                self.children.insert(
                    i,
                    RuleNode {
                        allowed,
                        prefix: pattern.to_string(),
                        children: covered,
                    },
                );
                return;
            }
        }

        self.children.push(RuleNode::leaf(allowed, pattern));
    }

    /// Resolves a path against the tree
    ///
    /// Descends into the first child whose prefix matches, falling back to
    /// this node's own flag when no child matches.
    pub fn is_allowed(&self, path: &str) -> bool {
        for child in &self.children {
            if path.starts_with(&child.prefix) {
                return child.is_allowed(path);
            }
        }
        self.allowed
    }

    #[cfg(test)]
    fn child_prefixes(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.prefix.as_str()).collect()
    }
}

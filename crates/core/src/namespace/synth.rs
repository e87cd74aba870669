//! Directory synthesis over flat listing pages
//!
//! Keys under a prefix are grouped by their next path segment. A segment with
//! further segments collapses into one synthetic directory; a segment without
//! becomes an object node. Pages are folded in one at a time so entries are
//! never duplicated when a backend repeats a common prefix across pages.

use std::collections::HashSet;

use crate::traits::{ListingPage, Node};

/// Accumulates listing pages into the child nodes of one prefix
#[derive(Debug)]
pub struct Synthesizer {
    prefix: String,
    delimiter: String,
    directories: Vec<Node>,
    objects: Vec<Node>,
    seen: HashSet<String>,
}

impl Synthesizer {
    pub fn new(prefix: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: delimiter.into(),
            directories: Vec::new(),
            objects: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Fold one page of backend output into the listing
    pub fn push_page(&mut self, page: ListingPage) {
        for node in page.nodes {
            self.push(node);
        }
    }

    fn push(&mut self, node: Node) {
        let Some(rest) = node.key().strip_prefix(self.prefix.as_str()) else {
            return;
        };
        // Folder marker for the listed prefix itself
        if rest.is_empty() {
            return;
        }

        match rest.find(self.delimiter.as_str()) {
            Some(idx) => {
                let key = format!(
                    "{}{}",
                    self.prefix,
                    &rest[..idx + self.delimiter.len()]
                );
                if self.seen.insert(key.clone()) {
                    self.directories.push(Node::directory(&self.prefix, key));
                }
            }
            None => {
                if let Node::Object { meta, .. } = node {
                    if self.seen.insert(meta.key.clone()) {
                        self.objects.push(Node::object(&self.prefix, meta));
                    }
                }
            }
        }
    }

    /// Directories first, then objects, each in first-seen provider order
    pub fn finish(self) -> Vec<Node> {
        let mut nodes = self.directories;
        nodes.extend(self.objects);
        nodes
    }
}

/// Synthesize the child nodes of `prefix` from a sequence of pages
pub fn synthesize(
    prefix: &str,
    delimiter: &str,
    pages: impl IntoIterator<Item = ListingPage>,
) -> Vec<Node> {
    let mut synth = Synthesizer::new(prefix, delimiter);
    for page in pages {
        synth.push_page(page);
    }
    synth.finish()
}

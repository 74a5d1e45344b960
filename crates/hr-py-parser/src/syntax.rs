//! Syntax validation.

use std::fmt;

use tree_sitter::{Node, Tree};

/// Location of the first syntax problem in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, in bytes.
    pub column: usize,
    /// `true` when tree-sitter inserted a missing token rather than
    /// skipping unexpected input.
    pub missing: bool,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.missing {
            "missing token"
        } else {
            "invalid syntax"
        };
        write!(f, "{what} at line {}, column {}", self.line, self.column)
    }
}

/// Returns the first syntax problem in the tree, or `None` if it parsed cleanly.
#[must_use]
pub fn find_syntax_issue(tree: &Tree) -> Option<SyntaxIssue> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }

    // has_error() said so, but no ERROR/MISSING node was reachable; report the root
    Some(first_error(root).unwrap_or(SyntaxIssue {
        line: 1,
        column: 1,
        missing: false,
    }))
}

fn first_error(node: Node<'_>) -> Option<SyntaxIssue> {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        return Some(SyntaxIssue {
            line: pos.row + 1,
            column: pos.column + 1,
            missing: node.is_missing(),
        });
    }
    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

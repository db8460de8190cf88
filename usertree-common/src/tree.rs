//! Hierarchy tree from the flat `parent_id` table
//!
//! The forest is rebuilt from a single directory read on every request.
//! Assembly and markup rendering both use explicit stacks, so depth is
//! bounded only by memory, and a visited set keeps a corrupted parent cycle
//! from looping.

use crate::db::users::User;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// One user in the rendered hierarchy
///
/// Serializes as `{name, children?}`; `children` is omitted for leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            children: Vec::new(),
        }
    }
}

/// Build the forest rooted at every user without a parent
///
/// Sibling order follows the input order (storage order). Users that cannot
/// be reached from a root are left out and logged.
pub fn build_forest(users: &[User]) -> Vec<TreeNode> {
    // parent id -> child positions, in input order
    let mut children_of: HashMap<i64, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (pos, user) in users.iter().enumerate() {
        match user.parent_id {
            None => roots.push(pos),
            Some(parent_id) => children_of.entry(parent_id).or_default().push(pos),
        }
    }

    // Pre-order walk: every node is recorded before its descendants
    let mut visited = vec![false; users.len()];
    let mut order = Vec::with_capacity(users.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();

    while let Some(pos) = stack.pop() {
        if std::mem::replace(&mut visited[pos], true) {
            continue;
        }
        order.push(pos);

        if let Some(kids) = children_of.get(&users[pos].id) {
            stack.extend(kids.iter().rev().filter(|&&kid| !visited[kid]));
        }
    }

    let unreachable = users.len() - order.len();
    if unreachable > 0 {
        warn!(
            "{} user(s) unreachable from any root (parent cycle), omitted from tree",
            unreachable
        );
    }

    // Reverse pre-order finishes children before their parent
    let mut built: HashMap<usize, TreeNode> = HashMap::with_capacity(order.len());
    for &pos in order.iter().rev() {
        let user = &users[pos];
        let children = children_of
            .get(&user.id)
            .map(|kids| kids.iter().filter_map(|kid| built.remove(kid)).collect())
            .unwrap_or_default();

        built.insert(
            pos,
            TreeNode {
                id: user.id,
                name: user.name.clone(),
                children,
            },
        );
    }

    roots.iter().filter_map(|pos| built.remove(pos)).collect()
}

/// Nested `<ul>/<li>` markup with the same structure as the JSON projection
///
/// A node's inner `<ul>` is emitted only when it has children.
pub fn render_markup(forest: &[TreeNode]) -> String {
    enum Step<'a> {
        Open(&'a TreeNode),
        CloseItem,
        CloseList,
    }

    let mut out = String::from("<ul>");
    let mut stack: Vec<Step> = vec![Step::CloseList];
    stack.extend(forest.iter().rev().map(Step::Open));

    while let Some(step) = stack.pop() {
        match step {
            Step::Open(node) => {
                out.push_str("<li>");
                out.push_str(&escape_html(&node.name));
                stack.push(Step::CloseItem);

                if !node.children.is_empty() {
                    out.push_str("<ul>");
                    stack.push(Step::CloseList);
                    stack.extend(node.children.iter().rev().map(Step::Open));
                }
            }
            Step::CloseItem => out.push_str("</li>"),
            Step::CloseList => out.push_str("</ul>"),
        }
    }

    out
}

/// HTML escape for XSS prevention
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tree projection of an assembly for tree widgets

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TreeState {
    pub opened: bool,
    pub disabled: bool,
    pub selected: bool,
    pub highlighted: bool,
    pub visible: bool,
    pub opacity: f32,
}

impl Default for TreeState {
    fn default() -> Self {
        Self {
            opened: true,
            disabled: false,
            selected: false,
            highlighted: false,
            visible: true,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub text: String,
    pub state: TreeState,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, including itself
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }

    /// Depth first search by node id
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

use crate::utils::is_missing;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of a fitted regression tree.
///
/// Leaves carry `weight_value`. Split nodes send a row left when the split feature is
/// below `split_value`, right otherwise, and to `missing_node` when it is missing.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Node {
    pub num: usize,
    pub weight_value: f32,
    /// Training cover of the node, used to weight branches in attribution.
    pub hessian_sum: f32,
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub split_value: f64,
    #[serde(default)]
    pub split_feature: usize,
    #[serde(default)]
    pub split_gain: f32,
    #[serde(default)]
    pub missing_node: usize,
    #[serde(default)]
    pub left_child: usize,
    #[serde(default)]
    pub right_child: usize,
    pub is_leaf: bool,
}

impl Node {
    /// A leaf with the given weight and cover.
    pub fn leaf(num: usize, weight_value: f32, hessian_sum: f32) -> Self {
        Node {
            num,
            weight_value,
            hessian_sum,
            depth: 0,
            split_value: 0.0,
            split_feature: 0,
            split_gain: 0.0,
            missing_node: 0,
            left_child: 0,
            right_child: 0,
            is_leaf: true,
        }
    }

    /// A split node. Missing values follow the left branch unless `missing_node` says otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn split(
        num: usize,
        weight_value: f32,
        hessian_sum: f32,
        split_feature: usize,
        split_value: f64,
        left_child: usize,
        right_child: usize,
        missing_node: Option<usize>,
    ) -> Self {
        Node {
            num,
            weight_value,
            hessian_sum,
            depth: 0,
            split_value,
            split_feature,
            split_gain: 0.0,
            missing_node: missing_node.unwrap_or(left_child),
            left_child,
            right_child,
            is_leaf: false,
        }
    }

    /// Get the path that should be traveled down, given a value.
    pub fn get_child_idx(&self, v: &f64, missing: &f64) -> usize {
        if is_missing(v, missing) {
            self.missing_node
        } else if v < &self.split_value {
            self.left_child
        } else {
            self.right_child
        }
    }

    /// True when missing values have their own branch instead of sharing one with left or right.
    pub fn has_missing_branch(&self) -> bool {
        (self.missing_node != self.right_child) && (self.missing_node != self.left_child)
    }

    /// Children to visit, the branch taken by the row first.
    pub fn hot_cold_children(&self, taken: usize) -> Vec<usize> {
        let mut children = vec![taken];
        let mut others = vec![self.left_child, self.right_child];
        if self.has_missing_branch() {
            others.push(self.missing_node);
        }
        children.extend(others.into_iter().filter(|c| *c != taken));
        children
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_leaf {
            write!(f, "{}:leaf={},cover={}", self.num, self.weight_value, self.hessian_sum)
        } else {
            write!(
                f,
                "{}:[{} < {}] yes={},no={},missing={},gain={},cover={}",
                self.num,
                self.split_feature,
                self.split_value,
                self.left_child,
                self.right_child,
                self.missing_node,
                self.split_gain,
                self.hessian_sum
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_child_idx() {
        let node = Node::split(0, 0.0, 10.0, 2, 0.5, 1, 2, None);
        assert_eq!(node.get_child_idx(&0.1, &f64::NAN), 1);
        assert_eq!(node.get_child_idx(&0.5, &f64::NAN), 2);
        assert_eq!(node.get_child_idx(&f64::NAN, &f64::NAN), 1);
        assert!(!node.has_missing_branch());

        let node = Node::split(0, 0.0, 10.0, 2, 0.5, 1, 2, Some(3));
        assert_eq!(node.get_child_idx(&f64::NAN, &f64::NAN), 3);
        assert!(node.has_missing_branch());
    }

    #[test]
    fn test_hot_cold_children() {
        let node = Node::split(0, 0.0, 10.0, 0, 0.5, 1, 2, None);
        assert_eq!(node.hot_cold_children(2), vec![2, 1]);
        let node = Node::split(0, 0.0, 10.0, 0, 0.5, 1, 2, Some(3));
        assert_eq!(node.hot_cold_children(3), vec![3, 1, 2]);
        assert_eq!(node.hot_cold_children(1), vec![1, 2, 3]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Node::leaf(3, 1.5, 4.0).to_string(), "3:leaf=1.5,cover=4");
    }
}

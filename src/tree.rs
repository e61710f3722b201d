use crate::errors::PricerError;
use crate::node::Node;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A fitted regression tree, addressed by node number. Node `0` is the root.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Tree {
    pub nodes: HashMap<usize, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Tree { nodes: HashMap::new() }
    }

    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Tree {
            nodes: nodes.into_iter().map(|n| (n.num, n)).collect(),
        }
    }

    /// Check the tree is a well formed binary tree over `n_features` columns,
    /// so that prediction and attribution never index outside of it.
    pub fn validate(&self, n_features: usize) -> Result<(), PricerError> {
        let invalid = |msg: String| Err(PricerError::ModelService(msg));
        if !self.nodes.contains_key(&0) {
            return invalid("tree has no root node".to_string());
        }
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack = vec![0];
        while let Some(idx) = stack.pop() {
            if !seen.insert(idx) {
                return invalid(format!("node {} is reachable twice", idx));
            }
            let node = match self.nodes.get(&idx) {
                Some(n) => n,
                None => return invalid(format!("node {} does not exist", idx)),
            };
            if node.is_leaf {
                continue;
            }
            if node.split_feature >= n_features {
                return invalid(format!(
                    "node {} splits on feature {}, but rows have {} features",
                    idx, node.split_feature, n_features
                ));
            }
            if node.hessian_sum <= 0.0 {
                return invalid(format!("split node {} has no cover", idx));
            }
            stack.push(node.left_child);
            stack.push(node.right_child);
            if node.has_missing_branch() {
                stack.push(node.missing_node);
            }
        }
        Ok(())
    }

    pub fn predict_row(&self, row: &[f64], missing: &f64) -> f64 {
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[&node_idx];
            if node.is_leaf {
                return node.weight_value as f64;
            } else {
                node_idx = node.get_child_idx(&row[node.split_feature], missing);
            }
        }
    }

    /// Saabas contributions, from the internal node weights along the decision path.
    pub fn predict_contributions_row_weight(&self, row: &[f64], contribs: &mut [f64], missing: &f64) {
        // Bias first.
        contribs[contribs.len() - 1] += self.nodes[&0].weight_value as f64;
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[&node_idx];
            if node.is_leaf {
                break;
            }
            let child_idx = node.get_child_idx(&row[node.split_feature], missing);
            let delta = self.nodes[&child_idx].weight_value as f64 - node.weight_value as f64;
            contribs[node.split_feature] += delta;
            node_idx = child_idx;
        }
    }

    /// Approximate contributions, from cover weighted average leaf values along the decision path.
    pub fn predict_contributions_row_average(
        &self,
        row: &[f64],
        contribs: &mut [f64],
        weights: &HashMap<usize, f64>,
        missing: &f64,
    ) {
        contribs[contribs.len() - 1] += weights[&0];
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[&node_idx];
            if node.is_leaf {
                break;
            }
            let child_idx = node.get_child_idx(&row[node.split_feature], missing);
            contribs[node.split_feature] += weights[&child_idx] - weights[&node_idx];
            node_idx = child_idx;
        }
    }

    fn distribute_node_leaf_weights(&self, i: usize, weights: &mut HashMap<usize, f64>) -> f64 {
        let node = &self.nodes[&i];
        let mut w = node.weight_value as f64;
        if !node.is_leaf {
            w = self.nodes[&node.left_child].hessian_sum as f64 * self.distribute_node_leaf_weights(node.left_child, weights);
            w += self.nodes[&node.right_child].hessian_sum as f64
                * self.distribute_node_leaf_weights(node.right_child, weights);
            if node.has_missing_branch() {
                w += self.nodes[&node.missing_node].hessian_sum as f64
                    * self.distribute_node_leaf_weights(node.missing_node, weights);
            }
            w /= node.hessian_sum as f64;
        }
        weights.insert(i, w);
        w
    }

    /// Expected leaf value below every node, weighted by training cover.
    pub fn distribute_leaf_weights(&self) -> HashMap<usize, f64> {
        let mut weights = HashMap::with_capacity(self.nodes.len());
        self.distribute_node_leaf_weights(0, &mut weights);
        weights
    }

    /// Expected leaf value below node `i`.
    pub fn get_average_leaf_weights(&self, i: usize) -> f64 {
        let node = &self.nodes[&i];
        if node.is_leaf {
            return node.weight_value as f64;
        }
        let mut w = self.nodes[&node.left_child].hessian_sum as f64 * self.get_average_leaf_weights(node.left_child);
        w += self.nodes[&node.right_child].hessian_sum as f64 * self.get_average_leaf_weights(node.right_child);
        if node.has_missing_branch() {
            w += self.nodes[&node.missing_node].hessian_sum as f64 * self.get_average_leaf_weights(node.missing_node);
        }
        w / node.hessian_sum as f64
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.values().filter(|n| n.is_leaf).count()
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<(usize, usize)> = vec![(0, 0)];
        while let Some((idx, depth)) = print_buffer.pop() {
            let node = match self.nodes.get(&idx) {
                Some(n) => n,
                None => continue,
            };
            writeln!(f, "{}{}", "      ".repeat(depth), node)?;
            if !node.is_leaf {
                print_buffer.push((node.right_child, depth + 1));
                print_buffer.push((node.left_child, depth + 1));
                if node.has_missing_branch() {
                    print_buffer.push((node.missing_node, depth + 1));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two level tree over three features:
    /// root splits feature 0 at 0.5 (cover 10), left leaf -2 (cover 4),
    /// right splits feature 2 at 1.0 (cover 6) into 1 (cover 2) and 4 (cover 4).
    pub(crate) fn small_tree() -> Tree {
        Tree::from_nodes(vec![
            Node::split(0, 1.0, 10.0, 0, 0.5, 1, 2, None),
            Node::leaf(1, -2.0, 4.0),
            Node::split(2, 3.0, 6.0, 2, 1.0, 3, 4, None),
            Node::leaf(3, 1.0, 2.0),
            Node::leaf(4, 4.0, 4.0),
        ])
    }

    #[test]
    fn test_predict_row() {
        let tree = small_tree();
        assert_eq!(tree.predict_row(&[0.0, 9.0, 9.0], &f64::NAN), -2.0);
        assert_eq!(tree.predict_row(&[1.0, 9.0, 0.0], &f64::NAN), 1.0);
        assert_eq!(tree.predict_row(&[1.0, 9.0, 2.0], &f64::NAN), 4.0);
        // Missing follows the left branch.
        assert_eq!(tree.predict_row(&[f64::NAN, 0.0, 0.0], &f64::NAN), -2.0);
        assert_eq!(tree.n_leaves(), 3);
    }

    #[test]
    fn test_distribute_leaf_weights() {
        let tree = small_tree();
        let weights = tree.distribute_leaf_weights();
        // right: (2 * 1 + 4 * 4) / 6 = 3, root: (4 * -2 + 6 * 3) / 10 = 1
        assert_relative_eq!(weights[&2], 3.0);
        assert_relative_eq!(weights[&0], 1.0);
        assert_relative_eq!(tree.get_average_leaf_weights(0), 1.0);
    }

    #[test]
    fn test_contributions_sum_to_prediction() {
        let tree = small_tree();
        let weights = tree.distribute_leaf_weights();
        for row in [[0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 5.0]] {
            let pred = tree.predict_row(&row, &f64::NAN);

            let mut contribs = vec![0.0; 4];
            tree.predict_contributions_row_average(&row, &mut contribs, &weights, &f64::NAN);
            assert_relative_eq!(contribs.iter().sum::<f64>(), pred, epsilon = 1e-9);
            assert_eq!(contribs[1], 0.0);

            let mut contribs = vec![0.0; 4];
            tree.predict_contributions_row_weight(&row, &mut contribs, &f64::NAN);
            assert_relative_eq!(contribs.iter().sum::<f64>(), pred, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_validate() {
        let tree = small_tree();
        assert!(tree.validate(3).is_ok());
        assert!(matches!(tree.validate(2), Err(PricerError::ModelService(_))));
        assert!(Tree::new().validate(3).is_err());

        let mut broken = small_tree();
        broken.nodes.remove(&4);
        assert!(broken.validate(3).is_err());

        let looped = Tree::from_nodes(vec![
            Node::split(0, 0.0, 1.0, 0, 0.5, 1, 0, None),
            Node::leaf(1, 0.0, 1.0),
        ]);
        assert!(looped.validate(1).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let tree = small_tree();
        let json = serde_json::to_string(&tree).unwrap();
        let loaded: Tree = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, tree);
        println!("{}", loaded);
    }
}

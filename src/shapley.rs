//! Exact tree SHAP values for a single row, following the path-dependent
//! algorithm of Lundberg et al. Branch probabilities come from node cover.
use crate::tree::Tree;

const ROOT_FEATURE: usize = usize::MAX;

#[derive(Debug, Clone, Copy, Default)]
struct PathElement {
    feature_index: usize,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Features met on the way down to the current node, with the share of
/// permutations each one accounts for.
#[derive(Debug, Clone, Default)]
struct ShapPath {
    elements: Vec<PathElement>,
}

impl ShapPath {
    fn slot(&mut self, i: usize) -> &mut PathElement {
        if i == self.elements.len() {
            self.elements.push(PathElement::default());
        }
        &mut self.elements[i]
    }

    fn extend(&mut self, depth: usize, zero_fraction: f64, one_fraction: f64, feature_index: usize) {
        *self.slot(depth) = PathElement {
            feature_index,
            zero_fraction,
            one_fraction,
            pweight: if depth == 0 { 1.0 } else { 0.0 },
        };
        let width = (depth + 1) as f64;
        for i in (0..depth).rev() {
            let pweight = self.elements[i].pweight;
            self.elements[i + 1].pweight += one_fraction * pweight * (i + 1) as f64 / width;
            self.elements[i].pweight = zero_fraction * pweight * (depth - i) as f64 / width;
        }
    }

    /// Undo the extension made for `path_index`, when a feature is split on twice.
    fn unwind(&mut self, depth: usize, path_index: usize) {
        let PathElement {
            zero_fraction,
            one_fraction,
            ..
        } = self.elements[path_index];
        let width = (depth + 1) as f64;
        let mut next_one_portion = self.elements[depth].pweight;
        for i in (0..depth).rev() {
            if one_fraction != 0.0 {
                let previous = self.elements[i].pweight;
                self.elements[i].pweight = next_one_portion * width / ((i + 1) as f64 * one_fraction);
                next_one_portion = previous - self.elements[i].pweight * zero_fraction * (depth - i) as f64 / width;
            } else {
                self.elements[i].pweight = self.elements[i].pweight * width / (zero_fraction * (depth - i) as f64);
            }
        }
        for i in path_index..depth {
            self.elements[i].feature_index = self.elements[i + 1].feature_index;
            self.elements[i].zero_fraction = self.elements[i + 1].zero_fraction;
            self.elements[i].one_fraction = self.elements[i + 1].one_fraction;
        }
    }

    /// Total permutation weight the path would have without `path_index`.
    fn unwound_sum(&self, depth: usize, path_index: usize) -> f64 {
        let PathElement {
            zero_fraction,
            one_fraction,
            ..
        } = self.elements[path_index];
        let width = (depth + 1) as f64;
        let mut next_one_portion = self.elements[depth].pweight;
        let mut total = 0.0;
        for i in (0..depth).rev() {
            if one_fraction != 0.0 {
                let share = next_one_portion * width / ((i + 1) as f64 * one_fraction);
                total += share;
                next_one_portion = self.elements[i].pweight - share * zero_fraction * ((depth - i) as f64 / width);
            } else if zero_fraction != 0.0 {
                total += (self.elements[i].pweight / zero_fraction) / ((depth - i) as f64 / width);
            } else {
                debug_assert!(self.elements[i].pweight == 0.0, "path element {} must have zero weight", i);
            }
        }
        total
    }
}

#[allow(clippy::too_many_arguments)]
fn tree_shap(
    tree: &Tree,
    row: &[f64],
    contribs: &mut [f64],
    node_index: usize,
    mut depth: usize,
    mut path: ShapPath,
    parent_zero_fraction: f64,
    parent_one_fraction: f64,
    parent_feature_index: usize,
    missing: &f64,
) {
    let node = &tree.nodes[&node_index];
    path.extend(depth, parent_zero_fraction, parent_one_fraction, parent_feature_index);

    if node.is_leaf {
        for i in 1..=depth {
            let weight = path.unwound_sum(depth, i);
            let el = path.elements[i];
            contribs[el.feature_index] += weight * (el.one_fraction - el.zero_fraction) * node.weight_value as f64;
        }
        return;
    }

    let taken = node.get_child_idx(&row[node.split_feature], missing);
    let mut incoming_zero_fraction = 1.0;
    let mut incoming_one_fraction = 1.0;

    // A feature already on the path is removed, then re-added with combined fractions.
    if let Some(path_index) = (0..=depth).find(|&i| path.elements[i].feature_index == node.split_feature) {
        incoming_zero_fraction = path.elements[path_index].zero_fraction;
        incoming_one_fraction = path.elements[path_index].one_fraction;
        path.unwind(depth, path_index);
        depth -= 1;
    }

    for (i, child) in node.hot_cold_children(taken).into_iter().enumerate() {
        let zero_fraction = (tree.nodes[&child].hessian_sum as f64 / node.hessian_sum as f64) * incoming_zero_fraction;
        let one_fraction = if i == 0 { incoming_one_fraction } else { 0.0 };
        tree_shap(
            tree,
            row,
            contribs,
            child,
            depth + 1,
            path.clone(),
            zero_fraction,
            one_fraction,
            node.split_feature,
            missing,
        );
    }
}

/// Add the SHAP values of `row` under `tree` to `contribs`.
///
/// `contribs` holds one slot per feature followed by the bias slot, which receives
/// the cover weighted expected value of the tree.
pub fn predict_contributions_row_shapley(tree: &Tree, row: &[f64], contribs: &mut [f64], missing: &f64) {
    let bias = contribs.len() - 1;
    contribs[bias] += tree.get_average_leaf_weights(0);
    tree_shap(tree, row, contribs, 0, 0, ShapPath::default(), 1.0, 1.0, ROOT_FEATURE, missing);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::tree::tests::small_tree;
    use approx::assert_relative_eq;

    #[test]
    fn test_stump_shapley() {
        let tree = Tree::from_nodes(vec![
            Node::split(0, 1.0, 10.0, 0, 0.5, 1, 2, None),
            Node::leaf(1, -2.0, 4.0),
            Node::leaf(2, 3.0, 6.0),
        ]);
        let mut contribs = vec![0.0; 3];
        predict_contributions_row_shapley(&tree, &[1.0, 0.0], &mut contribs, &f64::NAN);
        assert_relative_eq!(contribs[2], 1.0, epsilon = 1e-9);
        assert_relative_eq!(contribs[0], 2.0, epsilon = 1e-9);
        assert_eq!(contribs[1], 0.0);
    }

    #[test]
    fn test_shapley_sums_to_prediction() {
        let tree = small_tree();
        for row in [[0.0, 7.0, 0.0], [1.0, 7.0, 0.0], [1.0, 7.0, 3.0], [f64::NAN, 7.0, 3.0]] {
            let mut contribs = vec![0.0; 4];
            predict_contributions_row_shapley(&tree, &row, &mut contribs, &f64::NAN);
            assert_relative_eq!(
                contribs.iter().sum::<f64>(),
                tree.predict_row(&row, &f64::NAN),
                epsilon = 1e-9
            );
            assert_eq!(contribs[1], 0.0);
        }
    }

    #[test]
    fn test_shapley_repeated_feature() {
        // Feature 0 is split on at both levels.
        let tree = Tree::from_nodes(vec![
            Node::split(0, 0.0, 8.0, 0, 5.0, 1, 2, None),
            Node::split(1, 0.0, 4.0, 0, 2.0, 3, 4, None),
            Node::leaf(2, 10.0, 4.0),
            Node::leaf(3, -4.0, 2.0),
            Node::leaf(4, 2.0, 2.0),
        ]);
        for row in [[1.0, 0.0], [3.0, 0.0], [6.0, 0.0]] {
            let mut contribs = vec![0.0; 3];
            predict_contributions_row_shapley(&tree, &row, &mut contribs, &f64::NAN);
            let pred = tree.predict_row(&row, &f64::NAN);
            // Single feature model: everything beyond the bias belongs to feature 0.
            assert_relative_eq!(contribs[0], pred - contribs[2], epsilon = 1e-9);
            assert_eq!(contribs[1], 0.0);
        }
    }

    #[test]
    fn test_shapley_interaction_split_evenly() {
        // f(x) = 1 only when both features are 1, uniform covers.
        let tree = Tree::from_nodes(vec![
            Node::split(0, 0.0, 4.0, 0, 0.5, 1, 2, None),
            Node::leaf(1, 0.0, 2.0),
            Node::split(2, 0.0, 2.0, 1, 0.5, 3, 4, None),
            Node::leaf(3, 0.0, 1.0),
            Node::leaf(4, 1.0, 1.0),
        ]);
        let mut contribs = vec![0.0; 3];
        predict_contributions_row_shapley(&tree, &[1.0, 1.0], &mut contribs, &f64::NAN);
        assert_relative_eq!(contribs[2], 0.25, epsilon = 1e-9);
        assert_relative_eq!(contribs[0], 0.375, epsilon = 1e-9);
        assert_relative_eq!(contribs[1], 0.375, epsilon = 1e-9);
    }
}

use glam::Vec3;

use crate::core::aabb::Aabb;

const NULL_NODE: i32 = -1;

#[derive(Debug, Clone)]
struct Node {
    aabb: Aabb,
    parent: i32,
    child1: i32,
    child2: i32,
    // Leaf height is 0; free nodes use -1.
    height: i32,
    data: u64,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic AABB tree with rotation-based rebalancing.
///
/// Leaves store a fattened box; [`BvhTree::update`] only reinserts a leaf when
/// the tight box escapes it, so resting bodies never churn the tree.
pub struct BvhTree {
    nodes: Vec<Node>,
    root: i32,
    free_list: i32,
    leaf_count: usize,
}

impl Default for BvhTree {
    fn default() -> Self {
        Self::new()
    }
}

impl BvhTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
            leaf_count: 0,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    fn allocate_node(&mut self) -> i32 {
        if self.free_list != NULL_NODE {
            let index = self.free_list;
            self.free_list = self.nodes[index as usize].parent;
            let node = &mut self.nodes[index as usize];
            node.parent = NULL_NODE;
            node.child1 = NULL_NODE;
            node.child2 = NULL_NODE;
            node.height = 0;
            node.data = 0;
            return index;
        }
        self.nodes.push(Node {
            aabb: Aabb::INVALID,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: 0,
            data: 0,
        });
        (self.nodes.len() - 1) as i32
    }

    fn free_node(&mut self, index: i32) {
        self.nodes[index as usize].parent = self.free_list;
        self.nodes[index as usize].height = -1;
        self.free_list = index;
    }

    /// Inserts a leaf with a pre-fattened box, returning its proxy index.
    pub fn insert(&mut self, aabb: Aabb, data: u64) -> u32 {
        let leaf = self.allocate_node();
        self.nodes[leaf as usize].aabb = aabb;
        self.nodes[leaf as usize].data = data;
        self.insert_leaf(leaf);
        self.leaf_count += 1;
        leaf as u32
    }

    pub fn remove(&mut self, proxy: u32) {
        let leaf = proxy as i32;
        self.remove_leaf(leaf);
        self.free_node(leaf);
        self.leaf_count -= 1;
    }

    pub fn leaf_aabb(&self, proxy: u32) -> Aabb {
        self.nodes[proxy as usize].aabb
    }

    pub fn leaf_data(&self, proxy: u32) -> u64 {
        self.nodes[proxy as usize].data
    }

    /// Moves a leaf. The fat box only changes when `tight` escapes it, in
    /// which case the leaf is reinserted with `tight` expanded by `margin`.
    /// Returns whether a reinsertion happened.
    pub fn update(&mut self, proxy: u32, tight: Aabb, margin: f32) -> bool {
        let leaf = proxy as i32;
        if self.nodes[leaf as usize].aabb.contains(&tight) {
            return false;
        }
        self.remove_leaf(leaf);
        self.nodes[leaf as usize].aabb = tight.expanded(margin);
        self.insert_leaf(leaf);
        true
    }

    fn insert_leaf(&mut self, leaf: i32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Descend towards the cheapest sibling by surface-area cost.
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let child1 = self.nodes[index as usize].child1;
            let child2 = self.nodes[index as usize].child2;

            let area = self.nodes[index as usize].aabb.surface_area();
            let combined = self.nodes[index as usize].aabb.merge(&leaf_aabb);
            let combined_area = combined.surface_area();

            let cost = 2.0 * combined_area;
            let inheritance = 2.0 * (combined_area - area);

            let child_cost = |tree: &Self, child: i32| {
                let child_aabb = &tree.nodes[child as usize].aabb;
                let merged_area = child_aabb.merge(&leaf_aabb).surface_area();
                if tree.nodes[child as usize].is_leaf() {
                    merged_area + inheritance
                } else {
                    (merged_area - child_aabb.surface_area()) + inheritance
                }
            };

            let cost1 = child_cost(self, child1);
            let cost2 = child_cost(self, child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent as usize].parent = old_parent;
        self.nodes[new_parent as usize].aabb =
            leaf_aabb.merge(&self.nodes[sibling as usize].aabb);
        self.nodes[new_parent as usize].height = self.nodes[sibling as usize].height + 1;
        self.nodes[new_parent as usize].child1 = sibling;
        self.nodes[new_parent as usize].child2 = leaf;
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent as usize].child1 == sibling {
                self.nodes[old_parent as usize].child1 = new_parent;
            } else {
                self.nodes[old_parent as usize].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.refit_upwards(self.nodes[leaf as usize].parent);
    }

    fn remove_leaf(&mut self, leaf: i32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].child1 == leaf {
            self.nodes[parent as usize].child2
        } else {
            self.nodes[parent as usize].child1
        };

        if grand_parent != NULL_NODE {
            if self.nodes[grand_parent as usize].child1 == parent {
                self.nodes[grand_parent as usize].child1 = sibling;
            } else {
                self.nodes[grand_parent as usize].child2 = sibling;
            }
            self.nodes[sibling as usize].parent = grand_parent;
            self.free_node(parent);
            self.refit_upwards(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    // Walks to the root rebalancing and refitting boxes.
    fn refit_upwards(&mut self, mut index: i32) {
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index as usize].child1;
            let child2 = self.nodes[index as usize].child2;
            self.nodes[index as usize].height = 1 + self.nodes[child1 as usize]
                .height
                .max(self.nodes[child2 as usize].height);
            self.nodes[index as usize].aabb = self.nodes[child1 as usize]
                .aabb
                .merge(&self.nodes[child2 as usize].aabb);

            index = self.nodes[index as usize].parent;
        }
    }

    // Single AVL-style rotation when the subtree leans by more than one level.
    fn balance(&mut self, a: i32) -> i32 {
        if self.nodes[a as usize].is_leaf() || self.nodes[a as usize].height < 2 {
            return a;
        }

        let b = self.nodes[a as usize].child1;
        let c = self.nodes[a as usize].child2;
        let balance = self.nodes[c as usize].height - self.nodes[b as usize].height;

        if balance > 1 {
            self.rotate(a, c, b)
        } else if balance < -1 {
            self.rotate(a, b, c)
        } else {
            a
        }
    }

    // Promotes `up` (the taller child of `a`) one level; `other` stays below.
    fn rotate(&mut self, a: i32, up: i32, other: i32) -> i32 {
        let f = self.nodes[up as usize].child1;
        let g = self.nodes[up as usize].child2;

        self.nodes[up as usize].child1 = a;
        self.nodes[up as usize].parent = self.nodes[a as usize].parent;
        self.nodes[a as usize].parent = up;

        let up_parent = self.nodes[up as usize].parent;
        if up_parent != NULL_NODE {
            if self.nodes[up_parent as usize].child1 == a {
                self.nodes[up_parent as usize].child1 = up;
            } else {
                self.nodes[up_parent as usize].child2 = up;
            }
        } else {
            self.root = up;
        }

        let (taller, shorter) = if self.nodes[f as usize].height > self.nodes[g as usize].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[up as usize].child2 = taller;
        if self.nodes[a as usize].child1 == up {
            self.nodes[a as usize].child1 = shorter;
        } else {
            self.nodes[a as usize].child2 = shorter;
        }
        self.nodes[shorter as usize].parent = a;

        self.nodes[a as usize].aabb = self.nodes[other as usize]
            .aabb
            .merge(&self.nodes[shorter as usize].aabb);
        self.nodes[up as usize].aabb = self.nodes[a as usize]
            .aabb
            .merge(&self.nodes[taller as usize].aabb);
        self.nodes[a as usize].height = 1 + self.nodes[other as usize]
            .height
            .max(self.nodes[shorter as usize].height);
        self.nodes[up as usize].height = 1 + self.nodes[a as usize]
            .height
            .max(self.nodes[taller as usize].height);

        up
    }

    /// Visits leaf data for every leaf overlapping `aabb`; the visitor returns
    /// `false` to stop the walk early.
    pub fn query(&self, aabb: &Aabb, mut visitor: impl FnMut(u64) -> bool) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !visitor(node.data) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Visits leaves whose box intersects the ray within `max_t`. The visitor
    /// returns a new clipping distance (return the same `max_t` to continue
    /// unchanged, or something smaller to narrow the walk).
    pub fn ray_query(
        &self,
        origin: Vec3,
        dir: Vec3,
        mut max_t: f32,
        mut visitor: impl FnMut(u64, f32) -> f32,
    ) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            let Some(t) = node.aabb.ray_hit(origin, dir, max_t) else {
                continue;
            };
            if node.is_leaf() {
                max_t = visitor(node.data, t).min(max_t);
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Emits overlapping leaf pairs between this tree and `other` via a
    /// simultaneous descent.
    pub fn pairs_with(&self, other: &BvhTree, mut visitor: impl FnMut(u64, u64)) {
        if self.root == NULL_NODE || other.root == NULL_NODE {
            return;
        }
        let mut stack = vec![(self.root, other.root)];
        while let Some((a, b)) = stack.pop() {
            let node_a = &self.nodes[a as usize];
            let node_b = &other.nodes[b as usize];
            if !node_a.aabb.overlaps(&node_b.aabb) {
                continue;
            }
            match (node_a.is_leaf(), node_b.is_leaf()) {
                (true, true) => visitor(node_a.data, node_b.data),
                (true, false) => {
                    stack.push((a, node_b.child1));
                    stack.push((a, node_b.child2));
                }
                (false, true) => {
                    stack.push((node_a.child1, b));
                    stack.push((node_a.child2, b));
                }
                (false, false) => {
                    // Split the larger box to keep the descent balanced.
                    if node_a.aabb.surface_area() > node_b.aabb.surface_area() {
                        stack.push((node_a.child1, b));
                        stack.push((node_a.child2, b));
                    } else {
                        stack.push((a, node_b.child1));
                        stack.push((a, node_b.child2));
                    }
                }
            }
        }
    }

    /// Emits overlapping leaf pairs within this tree, each unordered pair once.
    pub fn self_pairs(&self, mut visitor: impl FnMut(u64, u64)) {
        if self.root == NULL_NODE || self.nodes[self.root as usize].is_leaf() {
            return;
        }
        let mut stack = vec![(
            self.nodes[self.root as usize].child1,
            self.nodes[self.root as usize].child2,
        )];
        // Also recurse into each internal node's own children.
        let mut internal = vec![self.root];
        while let Some(index) = internal.pop() {
            let node = &self.nodes[index as usize];
            for child in [node.child1, node.child2] {
                if child != NULL_NODE && !self.nodes[child as usize].is_leaf() {
                    stack.push((
                        self.nodes[child as usize].child1,
                        self.nodes[child as usize].child2,
                    ));
                    internal.push(child);
                }
            }
        }

        while let Some((a, b)) = stack.pop() {
            let node_a = &self.nodes[a as usize];
            let node_b = &self.nodes[b as usize];
            if !node_a.aabb.overlaps(&node_b.aabb) {
                continue;
            }
            match (node_a.is_leaf(), node_b.is_leaf()) {
                (true, true) => visitor(node_a.data, node_b.data),
                (true, false) => {
                    stack.push((a, node_b.child1));
                    stack.push((a, node_b.child2));
                }
                (false, true) => {
                    stack.push((node_a.child1, b));
                    stack.push((node_a.child2, b));
                }
                (false, false) => {
                    stack.push((node_a.child1, node_b.child1));
                    stack.push((node_a.child1, node_b.child2));
                    stack.push((node_a.child2, node_b.child1));
                    stack.push((node_a.child2, node_b.child2));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box_at(x: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec3::new(x, 0.0, 0.0), Vec3::splat(0.5))
    }

    #[test]
    fn query_finds_overlapping_leaves() {
        let mut tree = BvhTree::new();
        for i in 0..16 {
            tree.insert(unit_box_at(i as f32 * 2.0), i);
        }
        let mut found = Vec::new();
        tree.query(&unit_box_at(4.0), |data| {
            found.push(data);
            true
        });
        assert_eq!(found, vec![2]);
    }

    #[test]
    fn update_without_escape_keeps_leaf() {
        let mut tree = BvhTree::new();
        let proxy = tree.insert(unit_box_at(0.0).expanded(0.2), 7);
        assert!(!tree.update(proxy, unit_box_at(0.05), 0.2));
        assert!(tree.update(proxy, unit_box_at(5.0), 0.2));
        let mut found = Vec::new();
        tree.query(&unit_box_at(5.0), |data| {
            found.push(data);
            true
        });
        assert_eq!(found, vec![7]);
    }

    #[test]
    fn self_pairs_reports_each_overlap_once() {
        let mut tree = BvhTree::new();
        // Three mutually overlapping boxes plus one far away.
        for i in 0..3 {
            tree.insert(unit_box_at(i as f32 * 0.25), i);
        }
        tree.insert(unit_box_at(100.0), 99);

        let mut pairs = Vec::new();
        tree.self_pairs(|a, b| {
            let (a, b) = (a.min(b), a.max(b));
            pairs.push((a, b));
        });
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn removal_keeps_tree_consistent() {
        let mut tree = BvhTree::new();
        let proxies: Vec<u32> = (0..8).map(|i| tree.insert(unit_box_at(i as f32), i)).collect();
        for p in proxies.iter().take(4) {
            tree.remove(*p);
        }
        assert_eq!(tree.leaf_count(), 4);
        let mut count = 0;
        tree.query(
            &Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0)),
            |_| {
                count += 1;
                true
            },
        );
        assert_eq!(count, 4);
    }
}

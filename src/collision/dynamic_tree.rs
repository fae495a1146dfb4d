//! Dynamic AABB tree
//!
//! A self-balancing binary tree of fattened AABBs. Leaves are proxies; each
//! internal node bounds its two children. Proxies are enlarged by a margin and
//! by their predicted displacement so small motions need no tree update.
//!
//! - **Insertion**: sibling chosen by the perimeter cost heuristic
//! - **Balancing**: AVL-style rotations keep child heights within one
//! - **Stable ids**: proxy ids survive re-insertion; freed nodes are recycled

use super::aabb::AABB;
use super::ray::RayCastInput;
use crate::math::Vec2;

/// Null node sentinel
pub const NULL_NODE: usize = usize::MAX;

/// Index of a leaf in the tree.
pub type ProxyId = usize;

/// A node in the dynamic AABB tree
#[derive(Clone, Debug)]
pub struct TreeNode<T> {
    /// Fat AABB for leaves, bounding box of the children otherwise
    pub aabb: AABB,
    /// Parent node index, or the next free node while on the free list
    pub parent: usize,
    pub child1: usize,
    pub child2: usize,
    /// Leaf = 0, free node = -1
    pub height: i32,
    /// Set for leaves only
    pub user_data: Option<T>,
    /// Leaf was re-inserted or created since the flag was last cleared
    pub moved: bool,
}

impl<T> TreeNode<T> {
    fn free() -> Self {
        Self {
            aabb: AABB::default(),
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            user_data: None,
            moved: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic AABB tree for incremental broadphase
#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    free_list: Vec<usize>,
    root: usize,
    /// Margin added on every side of a proxy's AABB
    aabb_extension: f64,
    /// Scales displacement when predicting where a proxy will be
    aabb_multiplier: f64,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new(0.1, 2.0)
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new(aabb_extension: f64, aabb_multiplier: f64) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            aabb_extension,
            aabb_multiplier,
        }
    }

    /// Create a proxy for a tight AABB. The stored AABB is fattened.
    pub fn create_proxy(&mut self, aabb: &AABB, user_data: T) -> ProxyId {
        let proxy_id = self.alloc_node();

        let node = &mut self.nodes[proxy_id];
        node.aabb = aabb.expanded(self.aabb_extension);
        node.user_data = Some(user_data);
        node.height = 0;
        node.moved = true;

        self.insert_leaf(proxy_id);
        proxy_id
    }

    pub fn destroy_proxy(&mut self, proxy_id: ProxyId) {
        debug_assert!(self.nodes[proxy_id].is_leaf());
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
    }

    /// Move a proxy with a swept AABB. Returns true if the proxy was re-inserted.
    ///
    /// Re-insertion happens when the tight AABB leaves the fat AABB, or when
    /// the fat AABB has grown far larger than needed.
    pub fn move_proxy(&mut self, proxy_id: ProxyId, aabb: &AABB, displacement: Vec2) -> bool {
        debug_assert!(self.nodes[proxy_id].is_leaf());

        // Extend AABB
        let mut fat_aabb = aabb.expanded(self.aabb_extension);

        // Predict AABB movement
        let d = displacement * self.aabb_multiplier;
        if d.x < 0.0 {
            fat_aabb.min.x += d.x;
        } else {
            fat_aabb.max.x += d.x;
        }
        if d.y < 0.0 {
            fat_aabb.min.y += d.y;
        } else {
            fat_aabb.max.y += d.y;
        }

        let tree_aabb = self.nodes[proxy_id].aabb;
        if tree_aabb.contains(aabb) {
            // The tree AABB still contains the object, but it might be too large.
            // Perhaps the object was moving fast but has since gone to sleep.
            let huge_aabb = fat_aabb.expanded(4.0 * self.aabb_extension);
            if huge_aabb.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id].aabb = fat_aabb;
        self.insert_leaf(proxy_id);
        self.nodes[proxy_id].moved = true;
        true
    }

    /// Get user data for a proxy
    #[inline]
    pub fn user_data(&self, proxy_id: ProxyId) -> Option<T> {
        self.nodes.get(proxy_id).and_then(|n| n.user_data)
    }

    /// Get the fat AABB for a proxy
    #[inline]
    pub fn get_fat_aabb(&self, proxy_id: ProxyId) -> AABB {
        self.nodes[proxy_id].aabb
    }

    #[inline]
    pub fn was_moved(&self, proxy_id: ProxyId) -> bool {
        self.nodes[proxy_id].moved
    }

    #[inline]
    pub fn clear_moved(&mut self, proxy_id: ProxyId) {
        self.nodes[proxy_id].moved = false;
    }

    /// Visit every proxy whose fat AABB overlaps `aabb`. Return false from the
    /// callback to stop the query.
    pub fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &AABB, mut callback: F) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[node_id];
            if !node.aabb.overlaps(aabb) {
                continue;
            }

            if node.is_leaf() {
                if !callback(node_id) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Ray cast against the proxies. The callback performs the exact shape
    /// cast and returns the new max fraction: 0 terminates the ray, a value
    /// in (0, 1] clips it, a negative value ignores the proxy.
    pub fn ray_cast<F: FnMut(&RayCastInput, ProxyId) -> f64>(&self, input: &RayCastInput, mut callback: F) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize();
        if r == Vec2::ZERO {
            return;
        }

        // v is perpendicular to the segment.
        let v = Vec2::scalar_cross(1.0, r);
        let abs_v = v.abs();

        // Separating axis for segment (Gino, p80).
        // |dot(v, p1 - c)| > dot(|v|, h)

        let mut max_fraction = input.max_fraction;

        // Build a bounding box for the segment.
        let segment_aabb = |max_fraction: f64| {
            let t = p1 + (p2 - p1) * max_fraction;
            AABB {
                min: p1.min(t),
                max: p1.max(t),
            }
        };
        let mut seg_aabb = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            if node_id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[node_id];
            if !node.aabb.overlaps(&seg_aabb) {
                continue;
            }

            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };

                let value = callback(&sub_input, node_id);

                if value == 0.0 {
                    // The client has terminated the ray cast.
                    return;
                }

                if value > 0.0 {
                    // Update segment bounding box.
                    max_fraction = value;
                    seg_aabb = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Tree height, 0 for an empty tree or a single leaf
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Largest height difference between the children of any internal node.
    pub fn get_max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of all node perimeters over the root perimeter.
    pub fn get_area_ratio(&self) -> f64 {
        if self.root == NULL_NODE {
            return 0.0;
        }

        let root_area = self.nodes[self.root].aabb.perimeter();
        let total_area: f64 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();

        total_area / root_area
    }

    /// Number of active proxies (leaf nodes)
    pub fn proxy_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.height == 0).count()
    }

    /// Total node count (including internal)
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Checks parent links, heights and bounding boxes. Panics on corruption.
    pub fn validate(&self) {
        self.validate_structure(self.root);
        self.validate_metrics(self.root);
        assert_eq!(self.height(), self.compute_height(self.root));
        let free = self.nodes.iter().filter(|n| n.height < 0).count();
        assert_eq!(free, self.free_list.len());
    }

    // =========== Internal methods ===========

    fn alloc_node(&mut self) -> usize {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = TreeNode::free();
            id
        } else {
            self.nodes.push(TreeNode::free());
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, node_id: usize) {
        self.nodes[node_id] = TreeNode::free();
        self.free_list.push(node_id);
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling for this node
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;

            let area = self.nodes[index].aabb.perimeter();
            let combined_area = AABB::combine(&self.nodes[index].aabb, &leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;

            // Minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.child_insertion_cost(child1, &leaf_aabb, inheritance_cost);
            let cost2 = self.child_insertion_cost(child2, &leaf_aabb, inheritance_cost);

            // Descend according to the minimum cost.
            if cost < cost1 && cost < cost2 {
                break;
            }

            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        // Create a new parent.
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.alloc_node();
        {
            let sibling_aabb = self.nodes[sibling].aabb;
            let sibling_height = self.nodes[sibling].height;
            let node = &mut self.nodes[new_parent];
            node.parent = old_parent;
            node.aabb = AABB::combine(&leaf_aabb, &sibling_aabb);
            node.height = sibling_height + 1;
            node.child1 = sibling;
            node.child2 = leaf;
        }

        if old_parent != NULL_NODE {
            // The sibling was not the root.
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            // The sibling was the root.
            self.root = new_parent;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        // Walk back up the tree fixing heights and AABBs
        self.fix_upwards(self.nodes[leaf].parent);
    }

    fn child_insertion_cost(&self, child: usize, leaf_aabb: &AABB, inheritance: f64) -> f64 {
        let combined = AABB::combine(leaf_aabb, &self.nodes[child].aabb);
        if self.nodes[child].is_leaf() {
            combined.perimeter() + inheritance
        } else {
            let old_area = self.nodes[child].aabb.perimeter();
            let new_area = combined.perimeter();
            (new_area - old_area) + inheritance
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            // Destroy parent and connect sibling to grandParent.
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);

            self.fix_upwards(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    fn fix_upwards(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);

            self.nodes[index].height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = AABB::combine(&self.nodes[child1].aabb, &self.nodes[child2].aabb);

            index = self.nodes[index].parent;
        }
    }

    /// Perform a left or right rotation if node A is imbalanced.
    /// Returns the new root index of the rotated subtree.
    fn balance(&mut self, i_a: usize) -> usize {
        if self.nodes[i_a].is_leaf() || self.nodes[i_a].height < 2 {
            return i_a;
        }

        let i_b = self.nodes[i_a].child1;
        let i_c = self.nodes[i_a].child2;

        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        // Rotate C up
        if balance > 1 {
            let i_f = self.nodes[i_c].child1;
            let i_g = self.nodes[i_c].child2;

            // Swap A and C
            self.nodes[i_c].child1 = i_a;
            self.nodes[i_c].parent = self.nodes[i_a].parent;
            self.nodes[i_a].parent = i_c;

            // A's old parent should point to C
            self.replace_child(self.nodes[i_c].parent, i_a, i_c);

            // Rotate
            let (keep, moved) = if self.nodes[i_f].height > self.nodes[i_g].height {
                (i_f, i_g)
            } else {
                (i_g, i_f)
            };
            self.nodes[i_c].child2 = keep;
            self.nodes[i_a].child2 = moved;
            self.nodes[moved].parent = i_a;
            self.nodes[i_a].aabb = AABB::combine(&self.nodes[i_b].aabb, &self.nodes[moved].aabb);
            self.nodes[i_c].aabb = AABB::combine(&self.nodes[i_a].aabb, &self.nodes[keep].aabb);
            self.nodes[i_a].height = 1 + self.nodes[i_b].height.max(self.nodes[moved].height);
            self.nodes[i_c].height = 1 + self.nodes[i_a].height.max(self.nodes[keep].height);

            return i_c;
        }

        // Rotate B up
        if balance < -1 {
            let i_d = self.nodes[i_b].child1;
            let i_e = self.nodes[i_b].child2;

            // Swap A and B
            self.nodes[i_b].child1 = i_a;
            self.nodes[i_b].parent = self.nodes[i_a].parent;
            self.nodes[i_a].parent = i_b;

            // A's old parent should point to B
            self.replace_child(self.nodes[i_b].parent, i_a, i_b);

            // Rotate
            let (keep, moved) = if self.nodes[i_d].height > self.nodes[i_e].height {
                (i_d, i_e)
            } else {
                (i_e, i_d)
            };
            self.nodes[i_b].child2 = keep;
            self.nodes[i_a].child1 = moved;
            self.nodes[moved].parent = i_a;
            self.nodes[i_a].aabb = AABB::combine(&self.nodes[i_c].aabb, &self.nodes[moved].aabb);
            self.nodes[i_b].aabb = AABB::combine(&self.nodes[i_a].aabb, &self.nodes[keep].aabb);
            self.nodes[i_a].height = 1 + self.nodes[i_c].height.max(self.nodes[moved].height);
            self.nodes[i_b].height = 1 + self.nodes[i_a].height.max(self.nodes[keep].height);

            return i_b;
        }

        i_a
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if parent == NULL_NODE {
            self.root = new;
        } else if self.nodes[parent].child1 == old {
            self.nodes[parent].child1 = new;
        } else {
            debug_assert_eq!(self.nodes[parent].child2, old);
            self.nodes[parent].child2 = new;
        }
    }

    fn compute_height(&self, node_id: usize) -> i32 {
        if node_id == NULL_NODE {
            return 0;
        }
        let node = &self.nodes[node_id];
        if node.is_leaf() {
            return 0;
        }
        1 + self.compute_height(node.child1).max(self.compute_height(node.child2))
    }

    fn validate_structure(&self, index: usize) {
        if index == NULL_NODE {
            return;
        }
        if index == self.root {
            assert_eq!(self.nodes[index].parent, NULL_NODE);
        }

        let node = &self.nodes[index];
        if node.is_leaf() {
            assert_eq!(node.child2, NULL_NODE);
            assert_eq!(node.height, 0);
            return;
        }

        assert_eq!(self.nodes[node.child1].parent, index);
        assert_eq!(self.nodes[node.child2].parent, index);
        self.validate_structure(node.child1);
        self.validate_structure(node.child2);
    }

    fn validate_metrics(&self, index: usize) {
        if index == NULL_NODE {
            return;
        }

        let node = &self.nodes[index];
        if node.is_leaf() {
            return;
        }

        let child1 = &self.nodes[node.child1];
        let child2 = &self.nodes[node.child2];
        assert_eq!(node.height, 1 + child1.height.max(child2.height));
        assert_eq!(node.aabb, AABB::combine(&child1.aabb, &child2.aabb));

        self.validate_metrics(node.child1);
        self.validate_metrics(node.child2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn unit_box(x: f64, y: f64) -> AABB {
        AABB::new(Vec2::new(x - 0.5, y - 0.5), Vec2::new(x + 0.5, y + 0.5))
    }

    #[test]
    fn test_create_and_query() {
        let mut tree = DynamicTree::new(0.1, 2.0);
        let a = tree.create_proxy(&unit_box(0.0, 0.0), 1u32);
        let b = tree.create_proxy(&unit_box(10.0, 0.0), 2u32);
        tree.validate();

        let mut hits = Vec::new();
        tree.query(&unit_box(0.3, 0.3), |id| {
            hits.push(tree.user_data(id));
            true
        });
        assert_eq!(hits, vec![Some(1)]);

        let fat = tree.get_fat_aabb(a);
        assert!(fat.contains(&unit_box(0.0, 0.0)));
        assert!((fat.min.x - -0.6).abs() < 1e-12);
        assert!(tree.was_moved(b));
    }

    #[test]
    fn test_move_proxy_inside_fat_box_is_free() {
        let mut tree = DynamicTree::new(0.1, 2.0);
        let id = tree.create_proxy(&unit_box(0.0, 0.0), 0u32);
        tree.clear_moved(id);

        assert!(!tree.move_proxy(id, &unit_box(0.05, 0.0), Vec2::new(0.05, 0.0)));
        assert!(!tree.was_moved(id));

        assert!(tree.move_proxy(id, &unit_box(1.0, 0.0), Vec2::new(0.95, 0.0)));
        assert!(tree.was_moved(id));
        // Displacement is predicted forward.
        let fat = tree.get_fat_aabb(id);
        assert!((fat.max.x - (1.5 + 0.1 + 2.0 * 0.95)).abs() < 1e-12);
        tree.validate();
    }

    #[test]
    fn test_shrinking_proxy_is_reinserted() {
        let mut tree = DynamicTree::new(0.1, 2.0);
        let id = tree.create_proxy(&unit_box(0.0, 0.0), 0u32);
        // A large displacement makes the fat box huge.
        assert!(tree.move_proxy(id, &unit_box(2.0, 0.0), Vec2::new(2.0, 0.0)));
        // At rest the fat box is far larger than needed and gets tightened.
        assert!(tree.move_proxy(id, &unit_box(2.0, 0.0), Vec2::ZERO));
        assert!((tree.get_fat_aabb(id).max.x - 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_balance_after_many_inserts_and_removals() {
        let mut tree = DynamicTree::new(0.1, 2.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut ids = Vec::new();
        for i in 0..200u32 {
            let x = rng.gen_range(-50.0..50.0);
            let y = rng.gen_range(-50.0..50.0);
            ids.push(tree.create_proxy(&unit_box(x, y), i));
        }
        tree.validate();
        assert!(tree.get_max_balance() <= 1);
        assert_eq!(tree.proxy_count(), 200);
        // A balanced tree of 200 leaves needs far fewer than 200 levels.
        assert!(tree.height() < 20);

        for id in ids.drain(..100) {
            tree.destroy_proxy(id);
        }
        for &id in &ids {
            let x = rng.gen_range(-50.0..50.0);
            let y = rng.gen_range(-50.0..50.0);
            tree.move_proxy(id, &unit_box(x, y), Vec2::ZERO);
        }
        tree.validate();
        assert_eq!(tree.proxy_count(), 100);
        assert_eq!(tree.node_count(), 199);
        assert!(tree.get_area_ratio() >= 1.0);
    }

    #[test]
    fn test_ray_cast_clips_and_terminates() {
        let mut tree = DynamicTree::new(0.1, 2.0);
        for i in 0..5 {
            tree.create_proxy(&unit_box(2.0 * i as f64 + 2.0, 0.0), i);
        }

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(20.0, 0.0),
            max_fraction: 1.0,
        };

        let mut visited = 0;
        tree.ray_cast(&input, |_, _| {
            visited += 1;
            -1.0
        });
        assert_eq!(visited, 5);

        let mut visited = 0;
        tree.ray_cast(&input, |_, _| {
            visited += 1;
            0.0
        });
        assert_eq!(visited, 1);

        // Clipping at the first box excludes the ones behind it.
        let mut clipped = false;
        let mut after_clip = 0;
        tree.ray_cast(&input, |sub, id| {
            if clipped {
                after_clip += 1;
            }
            if tree.user_data(id) == Some(0) {
                clipped = true;
                return 1.5 / 20.0;
            }
            sub.max_fraction
        });
        assert!(clipped);
        assert_eq!(after_clip, 0);
    }
}

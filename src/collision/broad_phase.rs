//! Broadphase pair management on top of the dynamic tree.
//!
//! Proxies that moved since the last update are buffered; `update_pairs`
//! queries the tree with each buffered proxy and reports every new
//! overlapping pair exactly once.

use super::aabb::AABB;
use super::dynamic_tree::{DynamicTree, ProxyId};
use super::ray::RayCastInput;
use crate::math::Vec2;

#[derive(Clone, Debug)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    proxy_count: usize,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new(DynamicTree::default())
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new(tree: DynamicTree<T>) -> Self {
        Self {
            tree,
            proxy_count: 0,
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
        }
    }

    /// Create a proxy with an initial AABB. Pairs are not reported until
    /// `update_pairs` is called.
    pub fn create_proxy(&mut self, aabb: &AABB, user_data: T) -> ProxyId {
        let proxy_id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.buffer_move(proxy_id);
        proxy_id
    }

    /// Destroy a proxy. Any pairs it was part of are left to the caller.
    pub fn destroy_proxy(&mut self, proxy_id: ProxyId) {
        self.unbuffer_move(proxy_id);
        self.proxy_count -= 1;
        self.tree.destroy_proxy(proxy_id);
    }

    /// Call as many times as you like. Only proxies that leave their fat AABB
    /// are buffered for pairing.
    pub fn move_proxy(&mut self, proxy_id: ProxyId, aabb: &AABB, displacement: Vec2) {
        if self.tree.move_proxy(proxy_id, aabb, displacement) {
            self.buffer_move(proxy_id);
        }
    }

    /// Re-buffer a proxy so its pairs are reported again on the next update.
    pub fn touch_proxy(&mut self, proxy_id: ProxyId) {
        self.buffer_move(proxy_id);
    }

    pub fn get_fat_aabb(&self, proxy_id: ProxyId) -> AABB {
        self.tree.get_fat_aabb(proxy_id)
    }

    pub fn get_user_data(&self, proxy_id: ProxyId) -> Option<T> {
        self.tree.user_data(proxy_id)
    }

    /// Test overlap of fat AABBs.
    pub fn test_overlap(&self, proxy_id_a: ProxyId, proxy_id_b: ProxyId) -> bool {
        self.tree
            .get_fat_aabb(proxy_id_a)
            .overlaps(&self.tree.get_fat_aabb(proxy_id_b))
    }

    pub fn get_proxy_count(&self) -> usize {
        self.proxy_count
    }

    pub fn get_tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn get_tree_balance(&self) -> i32 {
        self.tree.get_max_balance()
    }

    pub fn get_tree_quality(&self) -> f64 {
        self.tree.get_area_ratio()
    }

    /// Report each new overlapping pair of user data to `callback`, once per
    /// unordered pair, in ascending proxy order.
    pub fn update_pairs<F: FnMut(T, T)>(&mut self, mut callback: F) {
        self.pair_buffer.clear();

        // Perform tree queries for all moving proxies.
        for &query_proxy_id in &self.move_buffer {
            let fat_aabb = self.tree.get_fat_aabb(query_proxy_id);
            let tree = &self.tree;
            let pairs = &mut self.pair_buffer;

            // Query tree, create pairs and add them to the pair buffer.
            tree.query(&fat_aabb, |proxy_id| {
                // A proxy cannot form a pair with itself.
                if proxy_id == query_proxy_id {
                    return true;
                }

                // Both proxies are moving. Avoid duplicate pairs.
                if tree.was_moved(proxy_id) && proxy_id > query_proxy_id {
                    return true;
                }

                pairs.push((proxy_id.min(query_proxy_id), proxy_id.max(query_proxy_id)));
                true
            });
        }

        // Sort for a deterministic report order and drop duplicates.
        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            if let (Some(user_data_a), Some(user_data_b)) = (self.tree.user_data(a), self.tree.user_data(b)) {
                callback(user_data_a, user_data_b);
            }
        }

        // Clear move flags
        for &proxy_id in &self.move_buffer {
            self.tree.clear_moved(proxy_id);
        }

        // Reset move buffer
        self.move_buffer.clear();
    }

    /// Query proxies whose fat AABB overlaps `aabb`.
    pub fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &AABB, callback: F) {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F: FnMut(&RayCastInput, ProxyId) -> f64>(&self, input: &RayCastInput, callback: F) {
        self.tree.ray_cast(input, callback);
    }

    fn buffer_move(&mut self, proxy_id: ProxyId) {
        if !self.move_buffer.contains(&proxy_id) {
            self.move_buffer.push(proxy_id);
        }
    }

    fn unbuffer_move(&mut self, proxy_id: ProxyId) {
        self.move_buffer.retain(|&id| id != proxy_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;

    fn unit_box(x: f64, y: f64) -> AABB {
        AABB::new(Vec2::new(x - 0.5, y - 0.5), Vec2::new(x + 0.5, y + 0.5))
    }

    fn collect_pairs(bp: &mut BroadPhase<u32>) -> BTreeSet<(u32, u32)> {
        let mut pairs = BTreeSet::new();
        bp.update_pairs(|a, b| {
            assert!(pairs.insert((a.min(b), a.max(b))), "pair reported twice");
        });
        pairs
    }

    #[test]
    fn test_pairs_reported_once() {
        let mut bp = BroadPhase::default();
        bp.create_proxy(&unit_box(0.0, 0.0), 0u32);
        bp.create_proxy(&unit_box(0.8, 0.0), 1u32);
        bp.create_proxy(&unit_box(5.0, 0.0), 2u32);

        let pairs = collect_pairs(&mut bp);
        assert_eq!(pairs.into_iter().collect::<Vec<_>>(), vec![(0, 1)]);

        // Nothing moved, nothing new.
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_move_and_touch() {
        let mut bp = BroadPhase::default();
        let a = bp.create_proxy(&unit_box(0.0, 0.0), 0u32);
        let b = bp.create_proxy(&unit_box(5.0, 0.0), 1u32);
        assert!(collect_pairs(&mut bp).is_empty());
        assert!(!bp.test_overlap(a, b));

        bp.move_proxy(b, &unit_box(0.5, 0.0), Vec2::new(-4.5, 0.0));
        assert!(bp.test_overlap(a, b));
        assert_eq!(collect_pairs(&mut bp).len(), 1);

        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp).len(), 1);

        bp.destroy_proxy(b);
        assert_eq!(bp.get_proxy_count(), 1);
        bp.touch_proxy(a);
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_pairs_independent_of_insertion_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let centers: Vec<(f64, f64)> = (0..60)
            .map(|_| (rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)))
            .collect();

        let brute: BTreeSet<(u32, u32)> = (0..centers.len())
            .flat_map(|i| (i + 1..centers.len()).map(move |j| (i, j)))
            .filter(|&(i, j)| {
                let a = unit_box(centers[i].0, centers[i].1).expanded(0.1);
                let b = unit_box(centers[j].0, centers[j].1).expanded(0.1);
                a.overlaps(&b)
            })
            .map(|(i, j)| (i as u32, j as u32))
            .collect();

        let mut order: Vec<usize> = (0..centers.len()).collect();
        for _ in 0..3 {
            order.shuffle(&mut rng);
            let mut bp = BroadPhase::default();
            for &i in &order {
                bp.create_proxy(&unit_box(centers[i].0, centers[i].1), i as u32);
            }
            assert_eq!(collect_pairs(&mut bp), brute);
        }
    }
}

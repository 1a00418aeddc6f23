use glam::Vec3;

use crate::{
    collision::bvh::BvhTree,
    core::{aabb::Aabb, body::BodyId, layers::{BroadPhaseLayer, LayerConfig}},
};

fn pack(id: BodyId) -> u64 {
    ((id.index as u64) << 32) | id.generation as u64
}

fn unpack(data: u64) -> BodyId {
    BodyId::new((data >> 32) as u32, data as u32)
}

/// Broadphase driver: one dynamic AABB tree per broadphase layer.
pub struct BroadPhase {
    trees: Vec<BvhTree>,
    // Body slot index -> (tree, proxy). Bodies sit in exactly one tree.
    proxies: Vec<Option<(u8, u32)>>,
}

impl Default for BroadPhase {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadPhase {
    pub fn new() -> Self {
        Self {
            trees: Vec::new(),
            proxies: Vec::new(),
        }
    }

    fn ensure_layer(&mut self, layer: BroadPhaseLayer) {
        while self.trees.len() <= layer.0 as usize {
            self.trees.push(BvhTree::new());
        }
    }

    fn proxy_slot(&mut self, id: BodyId) -> &mut Option<(u8, u32)> {
        let index = id.index();
        if self.proxies.len() <= index {
            self.proxies.resize(index + 1, None);
        }
        &mut self.proxies[index]
    }

    pub fn add_body(&mut self, id: BodyId, layer: BroadPhaseLayer, aabb: Aabb, margin: f32) {
        self.ensure_layer(layer);
        let proxy = self.trees[layer.0 as usize].insert(aabb.expanded(margin), pack(id));
        *self.proxy_slot(id) = Some((layer.0, proxy));
    }

    pub fn remove_body(&mut self, id: BodyId) {
        if let Some((tree, proxy)) = self.proxy_slot(id).take() {
            self.trees[tree as usize].remove(proxy);
        }
    }

    /// Pushes a body's new tight bounds into its tree. The leaf is only
    /// reinserted when the tight box escapes the stored fattened box.
    pub fn update_body(&mut self, id: BodyId, aabb: Aabb, margin: f32) -> bool {
        let index = id.index();
        if let Some(Some((tree, proxy))) = self.proxies.get(index) {
            self.trees[*tree as usize].update(*proxy, aabb, margin)
        } else {
            false
        }
    }

    /// Moves a body to a different broadphase layer.
    pub fn change_layer(&mut self, id: BodyId, layer: BroadPhaseLayer, aabb: Aabb, margin: f32) {
        self.remove_body(id);
        self.add_body(id, layer, aabb, margin);
    }

    /// Emits candidate body pairs for every pair of layers the interaction
    /// matrix permits. Pairs arrive unordered and may repeat; the caller
    /// canonicalises and deduplicates.
    pub fn find_colliding_pairs(
        &self,
        layers: &LayerConfig,
        mut visitor: impl FnMut(BodyId, BodyId),
    ) {
        let count = self.trees.len();
        for a in 0..count {
            let layer_a = BroadPhaseLayer(a as u8);
            if layers.broad_phase_layers_interact(layer_a, layer_a) {
                self.trees[a].self_pairs(|x, y| visitor(unpack(x), unpack(y)));
            }
            for b in (a + 1)..count {
                let layer_b = BroadPhaseLayer(b as u8);
                if layers.broad_phase_layers_interact(layer_a, layer_b) {
                    self.trees[a]
                        .pairs_with(&self.trees[b], |x, y| visitor(unpack(x), unpack(y)));
                }
            }
        }
    }

    /// Visits every body whose fat box overlaps `aabb`, across all layers.
    /// The visitor returns `false` to early-out.
    pub fn query_aabb(&self, aabb: &Aabb, mut visitor: impl FnMut(BodyId) -> bool) {
        for tree in &self.trees {
            let mut keep_going = true;
            tree.query(aabb, |data| {
                keep_going = visitor(unpack(data));
                keep_going
            });
            if !keep_going {
                return;
            }
        }
    }

    /// Walks every tree with a ray; the visitor may shorten the ray by
    /// returning a smaller clip distance.
    pub fn cast_ray(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_t: f32,
        mut visitor: impl FnMut(BodyId, f32) -> f32,
    ) {
        let mut clip = max_t;
        for tree in &self.trees {
            tree.ray_query(origin, dir, clip, |data, t| {
                clip = visitor(unpack(data), t).min(clip);
                clip
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layers::LayerConfig;

    fn body(index: u32) -> BodyId {
        BodyId::new(index, 0)
    }

    fn box_at(x: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec3::new(x, 0.0, 0.0), Vec3::splat(0.5))
    }

    #[test]
    fn pairs_respect_the_interaction_matrix() {
        let (layers, _layer) = LayerConfig::single_layer();
        let mut broadphase = BroadPhase::new();
        broadphase.add_body(body(0), BroadPhaseLayer(0), box_at(0.0), 0.05);
        broadphase.add_body(body(1), BroadPhaseLayer(0), box_at(0.4), 0.05);
        broadphase.add_body(body(2), BroadPhaseLayer(0), box_at(50.0), 0.05);

        let mut pairs = Vec::new();
        broadphase.find_colliding_pairs(&layers, |a, b| {
            pairs.push((a.index.min(b.index), a.index.max(b.index)));
        });
        assert_eq!(pairs, vec![(0, 1)]);

        // An empty matrix silences everything.
        let silent = LayerConfig::new();
        let mut none = 0;
        broadphase.find_colliding_pairs(&silent, |_, _| none += 1);
        assert_eq!(none, 0);
    }

    #[test]
    fn bodies_in_non_interacting_layers_never_pair() {
        let mut layers = LayerConfig::new();
        let bp_moving = layers.add_broad_phase_layer();
        let bp_static = layers.add_broad_phase_layer();
        let moving = layers.add_object_layer(bp_moving).unwrap();
        let _statics = layers.add_object_layer(bp_static).unwrap();
        layers.enable_collision(moving, moving).unwrap();

        let mut broadphase = BroadPhase::new();
        broadphase.add_body(body(0), BroadPhaseLayer(0), box_at(0.0), 0.05);
        broadphase.add_body(body(1), BroadPhaseLayer(1), box_at(0.1), 0.05);

        let mut pairs = 0;
        broadphase.find_colliding_pairs(&layers, |_, _| pairs += 1);
        assert_eq!(pairs, 0);
    }

    #[test]
    fn ray_visits_bodies_along_the_ray() {
        let (_, _) = LayerConfig::single_layer();
        let mut broadphase = BroadPhase::new();
        broadphase.add_body(body(0), BroadPhaseLayer(0), box_at(5.0), 0.0);
        broadphase.add_body(body(1), BroadPhaseLayer(0), box_at(-5.0), 0.0);

        let mut hits = Vec::new();
        broadphase.cast_ray(Vec3::ZERO, Vec3::X, 100.0, |id, _t| {
            hits.push(id.index);
            100.0
        });
        assert_eq!(hits, vec![0]);
    }
}

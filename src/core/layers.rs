use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// Fine-grained collision layer assigned to each body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLayer(pub u16);

/// Coarse layer owning one broadphase tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BroadPhaseLayer(pub u8);

/// Maps object layers onto broadphase layers and stores which object-layer
/// pairs may collide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerConfig {
    broad_phase_layer_count: u8,
    object_to_broad_phase: Vec<BroadPhaseLayer>,
    // Row-major object-layer interaction matrix.
    interactions: Vec<bool>,
}

impl LayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_broad_phase_layer(&mut self) -> BroadPhaseLayer {
        let layer = BroadPhaseLayer(self.broad_phase_layer_count);
        self.broad_phase_layer_count += 1;
        layer
    }

    pub fn add_object_layer(&mut self, broad_phase: BroadPhaseLayer) -> PhysicsResult<ObjectLayer> {
        if broad_phase.0 >= self.broad_phase_layer_count {
            return Err(PhysicsError::UnknownBroadPhaseLayer(broad_phase.0));
        }
        let layer = ObjectLayer(self.object_to_broad_phase.len() as u16);
        self.object_to_broad_phase.push(broad_phase);

        // Rebuild the matrix with one extra row/column, preserving entries.
        let old = self.object_to_broad_phase.len() - 1;
        let new = self.object_to_broad_phase.len();
        let mut interactions = vec![false; new * new];
        for a in 0..old {
            for b in 0..old {
                interactions[a * new + b] = self.interactions[a * old + b];
            }
        }
        self.interactions = interactions;
        Ok(layer)
    }

    pub fn enable_collision(&mut self, a: ObjectLayer, b: ObjectLayer) -> PhysicsResult<()> {
        let n = self.object_layer_count();
        if a.0 as usize >= n {
            return Err(PhysicsError::UnknownObjectLayer(a.0));
        }
        if b.0 as usize >= n {
            return Err(PhysicsError::UnknownObjectLayer(b.0));
        }
        self.interactions[a.0 as usize * n + b.0 as usize] = true;
        self.interactions[b.0 as usize * n + a.0 as usize] = true;
        Ok(())
    }

    pub fn should_collide(&self, a: ObjectLayer, b: ObjectLayer) -> bool {
        let n = self.object_layer_count();
        if a.0 as usize >= n || b.0 as usize >= n {
            return false;
        }
        self.interactions[a.0 as usize * n + b.0 as usize]
    }

    /// Whether any object layer mapped to `a` may collide with one mapped to `b`.
    pub fn broad_phase_layers_interact(&self, a: BroadPhaseLayer, b: BroadPhaseLayer) -> bool {
        let n = self.object_layer_count();
        for la in 0..n {
            if self.object_to_broad_phase[la].0 != a.0 {
                continue;
            }
            for lb in 0..n {
                if self.object_to_broad_phase[lb].0 == b.0 && self.interactions[la * n + lb] {
                    return true;
                }
            }
        }
        false
    }

    pub fn broad_phase_layer(&self, layer: ObjectLayer) -> PhysicsResult<BroadPhaseLayer> {
        self.object_to_broad_phase
            .get(layer.0 as usize)
            .copied()
            .ok_or(PhysicsError::UnknownObjectLayer(layer.0))
    }

    pub fn broad_phase_layer_count(&self) -> usize {
        self.broad_phase_layer_count as usize
    }

    pub fn object_layer_count(&self) -> usize {
        self.object_to_broad_phase.len()
    }

    /// A single-layer configuration where everything collides. Handy default
    /// for tests and simple worlds.
    pub fn single_layer() -> (Self, ObjectLayer) {
        let mut config = Self::new();
        let bp = config.add_broad_phase_layer();
        let layer = config.add_object_layer(bp).expect("fresh broadphase layer");
        config.enable_collision(layer, layer).expect("fresh layer");
        (config, layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_matrix_is_symmetric() {
        let mut config = LayerConfig::new();
        let bp = config.add_broad_phase_layer();
        let moving = config.add_object_layer(bp).unwrap();
        let statics = config.add_object_layer(bp).unwrap();
        config.enable_collision(moving, statics).unwrap();

        assert!(config.should_collide(moving, statics));
        assert!(config.should_collide(statics, moving));
        assert!(!config.should_collide(statics, statics));
    }

    #[test]
    fn growing_the_matrix_preserves_entries() {
        let mut config = LayerConfig::new();
        let bp = config.add_broad_phase_layer();
        let a = config.add_object_layer(bp).unwrap();
        config.enable_collision(a, a).unwrap();
        let b = config.add_object_layer(bp).unwrap();

        assert!(config.should_collide(a, a));
        assert!(!config.should_collide(a, b));
    }

    #[test]
    fn unknown_layers_are_rejected() {
        let mut config = LayerConfig::new();
        let bp = config.add_broad_phase_layer();
        let a = config.add_object_layer(bp).unwrap();
        assert_eq!(
            config.enable_collision(a, ObjectLayer(7)),
            Err(PhysicsError::UnknownObjectLayer(7))
        );
    }
}

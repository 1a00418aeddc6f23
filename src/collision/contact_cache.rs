use std::collections::HashMap;

use glam::Vec3;

use crate::{config, core::body::BodyId, core::subshape::SubShapeId};

/// Cache key: ordered body pair plus the sub-shape pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactKey {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub sub_shape_a: u32,
    pub sub_shape_b: u32,
}

impl ContactKey {
    pub fn new(body_a: BodyId, body_b: BodyId, sub_a: SubShapeId, sub_b: SubShapeId) -> Self {
        debug_assert!(body_a < body_b, "contact keys are ordered by body id");
        Self {
            body_a,
            body_b,
            sub_shape_a: sub_a.raw(),
            sub_shape_b: sub_b.raw(),
        }
    }
}

/// Whether an updated contact is new this step or carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEvent {
    Added,
    Persisted,
}

/// Accumulated impulses of one cached contact point.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedImpulse {
    pub normal: f32,
    pub tangent: [f32; 2],
}

/// One persistent contact across steps.
#[derive(Debug, Clone)]
pub struct CachedContact {
    /// Contact points in body A local space, used to re-match points after
    /// both bodies moved.
    points: Vec<Vec3>,
    impulses: Vec<CachedImpulse>,
    pub processed: bool,
    /// Created by the CCD pipeline: the cached impulse refers to the stale
    /// pre-cast velocity and must not warm start the next solve.
    pub from_ccd: bool,
}

/// Deduplicated persistent contact store, keyed by body pair + sub-shape pair.
#[derive(Default)]
pub struct ContactCache {
    contacts: HashMap<ContactKey, CachedContact>,
}

impl ContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contains(&self, key: &ContactKey) -> bool {
        self.contacts.contains_key(key)
    }

    /// Step 1 of the update: every cached contact starts unprocessed.
    pub fn mark_all_unprocessed(&mut self) {
        for contact in self.contacts.values_mut() {
            contact.processed = false;
        }
    }

    /// Registers this step's manifold for a key and fetches warm-start data.
    ///
    /// `local_points` are the manifold points in body A local space;
    /// `impulses_out[i]` receives the cached impulse matched to point `i`
    /// (zero when the point is new). Returns whether the contact was added or
    /// persisted, plus whether warm starting is allowed.
    pub fn update(
        &mut self,
        key: ContactKey,
        local_points: &[Vec3],
        impulses_out: &mut [CachedImpulse],
    ) -> (ContactEvent, bool) {
        const MATCH_DISTANCE_SQ: f32 = 2.5e-3;

        match self.contacts.get_mut(&key) {
            Some(cached) => {
                let warm_start = !cached.from_ccd;
                for (i, point) in local_points.iter().enumerate() {
                    let mut best: Option<(usize, f32)> = None;
                    for (j, old) in cached.points.iter().enumerate() {
                        let d = (*old - *point).length_squared();
                        if d < MATCH_DISTANCE_SQ
                            && best.map(|(_, bd)| d < bd).unwrap_or(true)
                        {
                            best = Some((j, d));
                        }
                    }
                    impulses_out[i] = match best {
                        Some((j, _)) => cached.impulses[j],
                        None => CachedImpulse::default(),
                    };
                }
                cached.points = local_points.to_vec();
                cached.impulses = vec![CachedImpulse::default(); local_points.len()];
                cached.processed = true;
                cached.from_ccd = false;
                (ContactEvent::Persisted, warm_start)
            }
            None => {
                for slot in impulses_out.iter_mut() {
                    *slot = CachedImpulse::default();
                }
                self.contacts.insert(
                    key,
                    CachedContact {
                        points: local_points.to_vec(),
                        impulses: vec![CachedImpulse::default(); local_points.len()],
                        processed: true,
                        from_ccd: false,
                    },
                );
                (ContactEvent::Added, false)
            }
        }
    }

    /// Records a CCD-generated contact so the pair counts as touching this
    /// step; its impulses never warm start.
    pub fn record_ccd_contact(&mut self, key: ContactKey, local_point: Vec3) -> ContactEvent {
        match self.contacts.get_mut(&key) {
            Some(cached) => {
                cached.processed = true;
                cached.from_ccd = true;
                cached.points = vec![local_point];
                cached.impulses = vec![CachedImpulse::default()];
                ContactEvent::Persisted
            }
            None => {
                self.contacts.insert(
                    key,
                    CachedContact {
                        points: vec![local_point],
                        impulses: vec![CachedImpulse::default()],
                        processed: true,
                        from_ccd: true,
                    },
                );
                ContactEvent::Added
            }
        }
    }

    /// Marks a contact processed without changing its stored state. Used for
    /// pairs whose bodies are all asleep this step.
    pub fn touch(&mut self, key: &ContactKey) {
        if let Some(cached) = self.contacts.get_mut(key) {
            cached.processed = true;
        }
    }

    /// Stores the final impulses after the velocity solve.
    pub fn store_impulses(&mut self, key: &ContactKey, impulses: &[CachedImpulse]) {
        if let Some(cached) = self.contacts.get_mut(key) {
            let n = cached.impulses.len().min(impulses.len());
            cached.impulses[..n].copy_from_slice(&impulses[..n]);
        }
    }

    /// Removes every contact left unprocessed this step, reporting each key in
    /// deterministic order so `on_contact_removed` firing order is stable.
    pub fn sweep_unprocessed(&mut self, mut on_removed: impl FnMut(ContactKey)) {
        let mut stale: Vec<ContactKey> = self
            .contacts
            .iter()
            .filter(|(_, c)| !c.processed)
            .map(|(k, _)| *k)
            .collect();
        stale.sort_unstable();
        for key in stale {
            self.contacts.remove(&key);
            on_removed(key);
        }
    }

    /// Drops every contact involving `body`, reporting removals.
    pub fn remove_body(&mut self, body: BodyId, mut on_removed: impl FnMut(ContactKey)) {
        let mut dead: Vec<ContactKey> = self
            .contacts
            .keys()
            .filter(|k| k.body_a == body || k.body_b == body)
            .copied()
            .collect();
        dead.sort_unstable();
        for key in dead {
            self.contacts.remove(&key);
            on_removed(key);
        }
    }

    /// Iterates cached keys (unordered) for diagnostics and tests.
    pub fn keys(&self) -> impl Iterator<Item = &ContactKey> {
        self.contacts.keys()
    }
}

/// Sanity bound used by debug assertions on manifold sizes.
pub const MAX_CACHED_POINTS: usize = config::MAX_MANIFOLD_POINTS;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: u32, b: u32) -> ContactKey {
        ContactKey::new(
            BodyId::new(a, 0),
            BodyId::new(b, 0),
            SubShapeId::ROOT,
            SubShapeId::ROOT,
        )
    }

    #[test]
    fn first_update_adds_then_persists() {
        let mut cache = ContactCache::new();
        let mut out = [CachedImpulse::default(); 1];
        let (event, warm) = cache.update(key(0, 1), &[Vec3::ZERO], &mut out);
        assert_eq!(event, ContactEvent::Added);
        assert!(!warm);

        cache.mark_all_unprocessed();
        let (event, warm) = cache.update(key(0, 1), &[Vec3::ZERO], &mut out);
        assert_eq!(event, ContactEvent::Persisted);
        assert!(warm);
    }

    #[test]
    fn impulses_round_trip_through_the_cache() {
        let mut cache = ContactCache::new();
        let mut out = [CachedImpulse::default(); 1];
        cache.update(key(0, 1), &[Vec3::X], &mut out);
        cache.store_impulses(
            &key(0, 1),
            &[CachedImpulse {
                normal: 3.0,
                tangent: [0.5, -0.25],
            }],
        );

        cache.mark_all_unprocessed();
        // The point moved a little but still matches.
        cache.update(key(0, 1), &[Vec3::X + Vec3::splat(0.01)], &mut out);
        assert!((out[0].normal - 3.0).abs() < 1e-6);
        assert!((out[0].tangent[1] + 0.25).abs() < 1e-6);
    }

    #[test]
    fn moved_points_do_not_inherit_impulses() {
        let mut cache = ContactCache::new();
        let mut out = [CachedImpulse::default(); 1];
        cache.update(key(0, 1), &[Vec3::ZERO], &mut out);
        cache.store_impulses(&key(0, 1), &[CachedImpulse { normal: 9.0, tangent: [0.0; 2] }]);

        cache.mark_all_unprocessed();
        cache.update(key(0, 1), &[Vec3::new(1.0, 0.0, 0.0)], &mut out);
        assert_eq!(out[0].normal, 0.0);
    }

    #[test]
    fn sweep_removes_only_unprocessed_entries() {
        let mut cache = ContactCache::new();
        let mut out = [CachedImpulse::default(); 1];
        cache.update(key(0, 1), &[Vec3::ZERO], &mut out);
        cache.update(key(0, 2), &[Vec3::ZERO], &mut out);

        cache.mark_all_unprocessed();
        cache.update(key(0, 1), &[Vec3::ZERO], &mut out);

        let mut removed = Vec::new();
        cache.sweep_unprocessed(|k| removed.push(k));
        assert_eq!(removed, vec![key(0, 2)]);
        assert!(cache.contains(&key(0, 1)));
        assert!(!cache.contains(&key(0, 2)));
    }

    #[test]
    fn ccd_contacts_skip_warm_starting_once() {
        let mut cache = ContactCache::new();
        cache.record_ccd_contact(key(0, 1), Vec3::ZERO);

        cache.mark_all_unprocessed();
        let mut out = [CachedImpulse::default(); 1];
        let (event, warm) = cache.update(key(0, 1), &[Vec3::ZERO], &mut out);
        assert_eq!(event, ContactEvent::Persisted);
        assert!(!warm);

        cache.mark_all_unprocessed();
        let (_, warm) = cache.update(key(0, 1), &[Vec3::ZERO], &mut out);
        assert!(warm);
    }
}

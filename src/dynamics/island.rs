use crate::core::body::ConstraintId;

/// Union-find over body slot indices.
///
/// Only non-static, non-sleeping bodies participate; static bodies act as
/// pinned endpoints and never merge islands.
pub struct IslandBuilder {
    parent: Vec<u32>,
    rank: Vec<u8>,
    active: Vec<bool>,
}

impl Default for IslandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IslandBuilder {
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            rank: Vec::new(),
            active: Vec::new(),
        }
    }

    /// Resets for `slot_count` body slots; `is_active` marks the slots that
    /// participate in islands this step.
    pub fn prepare(&mut self, slot_count: usize, is_active: impl Fn(usize) -> bool) {
        self.parent.clear();
        self.rank.clear();
        self.active.clear();
        self.parent.extend(0..slot_count as u32);
        self.rank.resize(slot_count, 0);
        self.active.extend((0..slot_count).map(is_active));
    }

    pub fn is_active(&self, slot: usize) -> bool {
        self.active.get(slot).copied().unwrap_or(false)
    }

    fn find(&mut self, slot: u32) -> u32 {
        let mut root = slot;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        // Path compression.
        let mut current = slot;
        while self.parent[current as usize] != root {
            let next = self.parent[current as usize];
            self.parent[current as usize] = root;
            current = next;
        }
        root
    }

    /// Links two body slots; inactive endpoints are ignored.
    pub fn link(&mut self, a: u32, b: u32) {
        if !self.is_active(a as usize) || !self.is_active(b as usize) {
            return;
        }
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        match self.rank[root_a as usize].cmp(&self.rank[root_b as usize]) {
            std::cmp::Ordering::Less => self.parent[root_a as usize] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b as usize] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b as usize] = root_a;
                self.rank[root_a as usize] += 1;
            }
        }
    }

    /// Island id of a slot (the set representative).
    pub fn island_of(&mut self, slot: u32) -> u32 {
        self.find(slot)
    }
}

/// One solver island: sorted member lists rebuilt every step.
#[derive(Debug, Default)]
pub struct Island {
    pub bodies: Vec<u32>,
    /// Indices into the per-step contact constraint array, strictly sorted.
    pub contacts: Vec<u32>,
    /// User constraint ids, strictly sorted.
    pub constraints: Vec<ConstraintId>,
    pub num_velocity_steps: u32,
    pub num_position_steps: u32,
}

/// Groups active bodies, contacts, and constraints into islands.
///
/// The output island list is ordered by smallest member slot, and every
/// member list is sorted; this ordering is the solver's determinism lever.
pub fn collect_islands(
    builder: &mut IslandBuilder,
    slot_count: usize,
    contact_endpoints: &[(u32, u32, u32)],
    constraint_endpoints: &[(ConstraintId, u32, u32)],
    num_velocity_steps: u32,
    num_position_steps: u32,
) -> Vec<Island> {
    // Map each island root to a dense island index, in slot order so the
    // result is independent of union order.
    let mut island_index: Vec<i32> = vec![-1; slot_count];
    let mut islands: Vec<Island> = Vec::new();

    for slot in 0..slot_count as u32 {
        if !builder.is_active(slot as usize) {
            continue;
        }
        let root = builder.island_of(slot) as usize;
        let index = if island_index[root] >= 0 {
            island_index[root] as usize
        } else {
            let index = islands.len();
            island_index[root] = index as i32;
            islands.push(Island {
                num_velocity_steps,
                num_position_steps,
                ..Island::default()
            });
            index
        };
        islands[index].bodies.push(slot);
    }

    for (contact_index, a, b) in contact_endpoints {
        let slot = if builder.is_active(*a as usize) { *a } else { *b };
        if !builder.is_active(slot as usize) {
            continue;
        }
        let root = builder.island_of(slot) as usize;
        if island_index[root] >= 0 {
            islands[island_index[root] as usize]
                .contacts
                .push(*contact_index);
        }
    }

    for (constraint_id, a, b) in constraint_endpoints {
        let slot = if builder.is_active(*a as usize) { *a } else { *b };
        if !builder.is_active(slot as usize) {
            continue;
        }
        let root = builder.island_of(slot) as usize;
        if island_index[root] >= 0 {
            islands[island_index[root] as usize]
                .constraints
                .push(*constraint_id);
        }
    }

    for island in &mut islands {
        island.contacts.sort_unstable();
        island.contacts.dedup();
        island.constraints.sort_unstable();
        island.constraints.dedup();
    }

    islands
}

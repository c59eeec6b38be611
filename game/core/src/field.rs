use crate::geometry::{Matrix3x3, Vector};
use crate::presets::Presets;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use std::sync::Arc;

/// Colors on the field; one 4-bit lane per player in the generation pass.
pub const MAX_PLAYERS: usize = 8;

/// Neighbor-count lane mask (three bits per player).
const COUNT_MASK: u32 = 7;

/// The world: a torus of `size` cells, each holding at most one unit.
///
/// The unit set is keyed by position alone; the owning player is the value.
/// A generation step replaces the whole set, so nothing outside this type
/// ever observes a partially updated world.
pub struct GameField {
    presets: Arc<Presets>,
    units: HashMap<Vector, i32>,
    size: Vector,
    player: i32,
    distance_to_enemy: i32,
    turn_time: u32,
}

impl GameField {
    /// A field for a joining peer. Size and player arrive later with
    /// AcceptPlayer.
    #[inline]
    pub fn new(presets: Arc<Presets>, distance_to_enemy: i32) -> GameField {
        GameField {
            presets,
            units: HashMap::new(),
            size: Vector::ZERO,
            player: -1,
            distance_to_enemy,
            turn_time: 0,
        }
    }

    /// A fully configured field for a hosting peer.
    #[inline]
    pub fn with_size(
        presets: Arc<Presets>,
        size: Vector,
        turn_time: u32,
        player: i32,
        distance_to_enemy: i32,
    ) -> GameField {
        GameField {
            presets,
            units: HashMap::new(),
            size,
            player,
            distance_to_enemy,
            turn_time,
        }
    }

    #[inline]
    pub fn player(&self) -> i32 {
        self.player
    }

    #[inline]
    pub fn size(&self) -> Vector {
        self.size
    }

    #[inline]
    pub fn turn_time(&self) -> u32 {
        self.turn_time
    }

    #[inline]
    pub fn distance_to_enemy(&self) -> i32 {
        self.distance_to_enemy
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.player >= 0 && self.size.x > 0 && self.size.y > 0
    }

    #[inline]
    pub fn set_size(&mut self, size: Vector) {
        self.size = size;
    }

    #[inline]
    pub fn set_player(&mut self, player: i32) {
        self.player = player;
    }

    #[inline]
    pub fn set_turn_time(&mut self, turn_time: u32) {
        self.turn_time = turn_time;
    }

    #[inline]
    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    #[inline]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    #[inline]
    pub fn unit_at(&self, pos: Vector) -> Option<i32> {
        self.units.get(&pos).copied()
    }

    /// Iterate the live units as `(position, player)` pairs.
    #[inline]
    pub fn units(&self) -> impl Iterator<Item = (Vector, i32)> + '_ {
        self.units.iter().map(|(&pos, &player)| (pos, player))
    }

    /// Torus reduction with a non-negative remainder on both axes.
    #[inline]
    pub fn clamp(&self, v: Vector) -> Vector {
        debug_assert!(self.size.x > 0 && self.size.y > 0);
        Vector::new(v.x.rem_euclid(self.size.x), v.y.rem_euclid(self.size.y))
    }

    /// Insert a unit at an absolute position; the cell keeps its first
    /// owner.
    #[inline]
    pub fn emplace(&mut self, pos: Vector, player: i32) -> bool {
        debug_assert!(player >= 0 && (player as usize) < MAX_PLAYERS);

        match self.units.entry(pos) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(player);
                true
            }
        }
    }

    /// Placement gate for the local player: rejects cells with an enemy
    /// unit anywhere inside the `(2d + 1) x (2d + 1)` square, torus-wrapped.
    pub fn can_insert(&self, pos: Vector) -> bool {
        let distance = self.distance_to_enemy;

        for x in -distance..=distance {
            for y in -distance..=distance {
                let cell = self.clamp(pos + Vector::new(x, y));
                if let Some(owner) = self.unit_at(cell) {
                    if owner != self.player {
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Emplace a pattern mapped through `transform` for `player`. The
    /// sender validated the footprint; any disagreement surfaces through
    /// the turn checksum.
    pub fn apply_preset(&mut self, transform: &Matrix3x3, preset: usize, player: i32) {
        let units = match self.presets.get(preset) {
            Some(pattern) => pattern.units().to_vec(),
            None => {
                debug_assert!(false, "unknown preset {}", preset);
                return;
            }
        };

        for unit in units {
            let pos = self.clamp(*transform * unit);
            self.emplace(pos, player);
        }
    }

    /// One generation of the eight-color rule.
    ///
    /// Pass one accumulates a `u32` mask per candidate cell: bits
    /// `[4i .. 4i+2]` count player `i`'s neighbors (wrapping in three
    /// bits), bit `4i+3` records that player `i` occupies the cell. Pass
    /// two picks the strict maximum count; a tie for the maximum leaves
    /// the cell empty. Birth on 3 neighbors, survival on 2 plus the
    /// occupancy bit.
    pub fn process_units(&mut self) {
        let mut cells: HashMap<Vector, u32> = HashMap::with_capacity(self.units.len() * 9);
        let capacity = cells.capacity();

        for (&pos, &player) in &self.units {
            self.mark_unit(pos, player, &mut cells);
        }

        // The map must not rehash during the pass; the reservation above
        // covers the worst case of nine distinct cells per unit.
        debug_assert_eq!(capacity, cells.capacity());

        let mut next = HashMap::with_capacity(self.units.len());

        for (&pos, &mask) in &cells {
            if mask == 0 {
                continue;
            }

            let mut owner: Option<usize> = None;
            let mut max_neighbours = 0;

            for player in 0..MAX_PLAYERS {
                let neighbours = (mask >> (4 * player)) & COUNT_MASK;

                if neighbours > max_neighbours {
                    max_neighbours = neighbours;
                    owner = Some(player);
                } else if neighbours != 0 && neighbours == max_neighbours {
                    owner = None;
                }
            }

            if let Some(player) = owner {
                let occupied = mask & (1 << (4 * player + 3)) != 0;

                if max_neighbours == 3 || (max_neighbours == 2 && occupied) {
                    next.insert(pos, player as i32);
                }
            }
        }

        self.units = next;
    }

    fn mark_unit(&self, pos: Vector, player: i32, cells: &mut HashMap<Vector, u32>) {
        let shift = 4 * player as u32;

        for x in -1..=1 {
            for y in -1..=1 {
                let cell = self.clamp(pos + Vector::new(x, y));
                let mask = cells.entry(cell).or_insert(0);

                if x == 0 && y == 0 {
                    *mask |= 1 << (shift + 3);
                } else {
                    let neighbours = (((*mask >> shift) & COUNT_MASK) + 1) & COUNT_MASK;
                    *mask = (*mask & !(COUNT_MASK << shift)) | (neighbours << shift);
                }
            }
        }
    }

    /// Commutative divergence checksum over the unit set. Iteration order
    /// does not matter; the inner terms wrap in `u32` and the accumulator
    /// in `u64`.
    pub fn checksum(&self) -> u64 {
        let height = self.size.y as u32;
        let mut result: u64 = 0;

        for (&pos, &player) in &self.units {
            let x = pos.x as u32;
            let y = pos.y as u32;
            let player = (player + 1) as u32;
            let term = x
                .wrapping_mul(height)
                .wrapping_add(player)
                .wrapping_add(y.wrapping_mul(player));

            result = result.wrapping_add(u64::from(term));
        }

        result
    }

    /// Drop every unit. Used when the session tears down.
    #[inline]
    pub fn clear(&mut self) {
        self.units.clear();
    }
}

use crate::constraint::Constraint;
use crate::metalocation::lookup;
use anyhow::{Context, Result, bail};
use crysrando_game::LocationId;
use crysrando_game::location::{Location, Spawn};
use crysrando_game::sprites::SpriteData;
use log::{debug, info};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

// NPC action script that also draws the jumping-man sprite.
const JUMPING_ACTION: u8 = 0xd0;
const JUMPING_METASPRITE: u8 = 0xc0;
// Tornel on the sabre mountain keeps whatever palette he lands with.
const PALETTE_FREE_NPC: u8 = 0x5f;
// Chest contents at or above this id are mimics.
const FIRST_MIMIC: u8 = 0x70;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpawnKey {
    Monster(u8),
    Npc(u8),
}

/// Sprite pattern and palette requirements of every monster and NPC, solved
/// across all the locations each one appears in.
pub struct Graphics<'s> {
    sprites: &'s SpriteData,
    monster_constraints: BTreeMap<u8, Constraint>,
    npc_constraints: BTreeMap<u8, Constraint>,
    pub all_sprite_palettes: BTreeSet<u8>,
}

impl<'s> Graphics<'s> {
    pub fn new(locations: &[Location], sprites: &'s SpriteData) -> Result<Self> {
        let mut all_spawns: BTreeMap<SpawnKey, Vec<(&Location, &Spawn)>> = BTreeMap::new();
        for loc in locations.iter().filter(|l| l.used) {
            for spawn in loc.spawns.iter().filter(|s| s.used()) {
                let key = if spawn.is_monster() {
                    SpawnKey::Monster(spawn.monster_id())
                } else if spawn.is_npc() || spawn.is_boss() {
                    SpawnKey::Npc(spawn.id())
                } else {
                    continue;
                };
                all_spawns.entry(key).or_default().push((loc, spawn));
            }
        }

        let mut graphics = Graphics {
            sprites,
            monster_constraints: BTreeMap::new(),
            npc_constraints: BTreeMap::new(),
            all_sprite_palettes: BTreeSet::new(),
        };
        for (key, spawns) in &all_spawns {
            match *key {
                SpawnKey::Npc(id) => {
                    let npc = sprites.npc(id)?;
                    if sprites.metasprite(npc.metasprite).is_none() {
                        bail!("bad NPC: {id:02x}");
                    }
                    let mut metasprites = vec![npc.metasprite];
                    if npc.action == JUMPING_ACTION {
                        metasprites.push(JUMPING_METASPRITE);
                    }
                    let offset = if npc.action < 0x80 { npc.action & 0x70 } else { 0 };
                    let mut constraint = graphics
                        .compute_constraint(locations, &metasprites, spawns, true, offset)
                        .with_context(|| format!("Computing constraint for NPC {id:02x}"))?;
                    if id == PALETTE_FREE_NPC {
                        constraint = constraint.ignore_palette();
                    }
                    graphics.npc_constraints.insert(id, constraint);
                }
                SpawnKey::Monster(id) => {
                    let mut constraint = Constraint::all();
                    for obj in sprites.all_objects(id)? {
                        let child = graphics.compute_constraint(
                            locations,
                            &obj.metasprites,
                            spawns,
                            obj.id == id,
                            obj.pattern_offset,
                        )?;
                        constraint = constraint
                            .meet(&child)
                            .with_context(|| format!("Bad meet for {id:02x} with {:02x}", obj.id))?;
                        // Bonus sprites (e.g. wings) are drawn unshifted.
                        if let Some(bonus) = obj.bonus_metasprite {
                            let child = graphics.compute_constraint(
                                locations,
                                &[bonus],
                                spawns,
                                false,
                                obj.pattern_offset,
                            )?;
                            constraint = constraint.meet(&child).with_context(|| {
                                format!("Bad meet for {id:02x} bonus {:02x}", obj.id)
                            })?;
                        }
                    }
                    debug!("Monster {id:02x}: {constraint:?}");
                    graphics.monster_constraints.insert(id, constraint);
                }
            }
        }
        info!(
            "Computed graphics constraints for {} monsters and {} NPCs",
            graphics.monster_constraints.len(),
            graphics.npc_constraints.len()
        );
        Ok(graphics)
    }

    /// Joins the constraints of every location `spawns` appear in, one spawn
    /// per location and pattern bank.
    pub fn compute_constraint(
        &mut self,
        locations: &[Location],
        metasprite_ids: &[u8],
        spawns: &[(&Location, &Spawn)],
        shiftable: bool,
        offset: u8,
    ) -> Result<Constraint> {
        let mut patterns = BTreeSet::new();
        let mut palettes = BTreeSet::new();
        for &id in metasprite_ids {
            let metasprite = self
                .sprites
                .metasprite(id)
                .with_context(|| format!("unknown metasprite {id:02x}"))?;
            palettes.extend(metasprite.palettes.iter().copied());
            patterns.extend(metasprite.pattern_banks(offset));
        }
        // Only sprites drawn entirely from the third bank can move to the fourth.
        let shiftable = shiftable && patterns.len() == 1 && patterns.contains(&2);

        let mut locs: BTreeMap<(LocationId, bool), &Spawn> = BTreeMap::new();
        for &(loc, spawn) in spawns {
            locs.insert((loc.id, shiftable && spawn.pattern_bank() != 0), spawn);
        }
        let mut child: Option<Constraint> = None;
        for ((id, _), spawn) in locs {
            let loc = lookup(locations, id)?;
            for &pal in &palettes {
                if let Some(&p) = pal.checked_sub(2).and_then(|i| loc.sprite_palettes.get(i as usize)) {
                    self.all_sprite_palettes.insert(p);
                }
            }
            let c = Constraint::from_spawn(&palettes, &patterns, loc, spawn, shiftable);
            let mut next = match child {
                Some(prev) => prev.join(&c),
                None => c,
            };
            if !shiftable && spawn.pattern_bank() != 0 {
                next = next.shifted();
            }
            child = Some(next);
        }
        child.context("no spawns to constrain")
    }

    /// Constraint for a monster in a location, including its coin drop.
    pub fn monster_constraint(&self, location: LocationId, monster: u8) -> Constraint {
        let c = self
            .monster_constraints
            .get(&monster)
            .cloned()
            .unwrap_or_else(Constraint::none);
        // No drops on the sea.
        if (location & 0x58) == 0x58 {
            return c;
        }
        let gold = self.sprites.object(monster).map(|o| o.gold_drop).unwrap_or(false);
        if !gold {
            return c;
        }
        c.try_meet(&Constraint::coin()).unwrap_or_else(Constraint::none)
    }

    /// Constraint for an NPC in a location, including fight-specific sprites.
    pub fn npc_constraint(&self, location: LocationId, npc: u8) -> Result<Constraint> {
        let c = self
            .npc_constraints
            .get(&npc)
            .cloned()
            .unwrap_or_else(Constraint::none);
        match (location, npc) {
            (0x1e, 0x60) => c.meet(&Constraint::stom_fight()),
            (0xa0, 0xc9) => c.meet(&Constraint::guardian_statue()),
            _ => Ok(c),
        }
    }

    pub fn shuffle_palettes<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let pal: Vec<u8> = self.all_sprite_palettes.iter().copied().collect();
        for c in self.monster_constraints.values_mut() {
            *c = c.shuffle_palette(rng, &pal);
        }
        for c in self.npc_constraints.values_mut() {
            *c = c.shuffle_palette(rng, &pal);
        }
    }

    /// Sets the spawn's pattern-bank bit for the banks `location` ended up with.
    pub fn configure(&self, location: &Location, spawn: &mut Spawn) -> Result<()> {
        if !spawn.used() {
            return Ok(());
        }
        let c = if spawn.is_monster() {
            self.monster_constraints.get(&spawn.monster_id()).cloned()
        } else if spawn.is_npc() {
            self.npc_constraints.get(&spawn.id()).cloned()
        } else if spawn.is_chest() {
            if self.sprites.chest_item(spawn.id()) < FIRST_MIMIC {
                Some(Constraint::treasure_chest())
            } else {
                Some(Constraint::mimic())
            }
        } else {
            None
        };
        let Some(c) = c else {
            return Ok(());
        };
        if c.shift == 3 || c.float.len() >= 2 {
            bail!(
                "don't know what to do with two floats: spawn {:02x?} in {:02x}",
                spawn.data,
                location.id
            );
        }
        match c.float.first() {
            None => spawn.set_pattern_bank((c.shift == 2) as u8),
            Some(f) if f.contains(location.sprite_patterns[0]) => spawn.set_pattern_bank(0),
            Some(f) if f.contains(location.sprite_patterns[1]) => spawn.set_pattern_bank(1),
            Some(_) if spawn.is_monster() => bail!(
                "no matching pattern bank for {:02x} in {:02x}",
                spawn.monster_id(),
                location.id
            ),
            Some(_) => {}
        }
        Ok(())
    }

    /// Configures every spawn of a location.
    pub fn configure_location(&self, location: &mut Location) -> Result<()> {
        let mut spawns = std::mem::take(&mut location.spawns);
        let result = spawns
            .iter_mut()
            .try_for_each(|spawn| self.configure(location, spawn));
        location.spawns = spawns;
        result.with_context(|| format!("Configuring sprites in {:02x}", location.id))
    }
}

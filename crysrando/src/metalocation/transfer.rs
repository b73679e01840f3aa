use super::{ExitSpec, Metalocation};
use crate::world::World;
use anyhow::{Context, Result, bail};
use crysrando_game::flags::FlagRef;
use crysrando_game::location::{Location, WallType, yt_add, yt_diff};
use crysrando_game::{ConnectionType, Feature, LocPos, LocationId, Pos, ScreenUid};
use hashbrown::HashMap;
use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// Platform monsters; bit 1 = crumbling, bit 0 = horizontal.
const PLATFORMS: [u8; 4] = [0x7e, 0x7f, 0x9f, 0x8d];
const STATUE_MONSTER: u8 = 0x8f;

// Squared tile distances within which a spawn follows an anchor.
const ARENA_RANGE: i32 = 144;
const EXIT_RANGE: i32 = 25;
const POI_RANGE: i32 = 4;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum AnchorKind {
    Arena,
    Exit,
    Poi,
}

// A point in the old layout (yt, xt) and where it ended up in the new one.
#[derive(Copy, Clone, Debug)]
struct Anchor {
    old: (u8, u8),
    new: (u8, u8),
    range: i32,
    kind: AnchorKind,
}

/// Moves `start` by `plus - minus`, clamped to the grid of `meta`.
fn add_delta(start: Pos, plus: Pos, minus: Pos, meta: &Metalocation) -> Pos {
    let clamp = |v: i32, len: usize| v.clamp(0, len.max(1) as i32 - 1) as u8;
    let x = start.col as i32 + plus.col as i32 - minus.col as i32;
    let y = start.row as i32 + plus.row as i32 - minus.row as i32;
    Pos::new(clamp(y, meta.height()), clamp(x, meta.width()))
}

impl<'a> Metalocation<'a> {
    /// Carries flags over from the layout this one replaces. Each custom-flag
    /// screen takes a flag from a screen of the same kind in `orig`.
    pub fn transfer_flags<R: Rng + ?Sized>(&mut self, orig: &Metalocation, rng: &mut R) -> Result<()> {
        self.free_flags = orig.free_flags.clone();
        let mut customs: BTreeMap<ScreenUid, Vec<FlagRef>> = BTreeMap::new();
        for (&pos, &flag) in &orig.custom_flags {
            customs.entry(orig.get(pos).uid).or_default().push(flag);
        }
        for flags in customs.values_mut() {
            flags.shuffle(rng);
        }
        self.custom_flags.clear();
        for pos in self.all_pos() {
            let scr = self.get(pos);
            if !scr.data.flag.is_some_and(|f| f.is_custom()) {
                continue;
            }
            let Some(flag) = customs.get_mut(&scr.uid).and_then(|f| f.pop()) else {
                bail!("No flag for {} at {:02x} @{pos}", scr.name(), self.id);
            };
            self.custom_flags.insert(pos, flag);
        }
        Ok(())
    }

    /// Copies pit destinations as-is; `World::shuffle_pits` makes them sane.
    pub fn transfer_pits(&mut self, orig: &Metalocation) {
        self.pits = orig.pits.clone();
    }

    /// Re-places the non-monster spawns of `location` (laid out for `that`)
    /// onto this layout, following arenas, exits and points of interest.
    pub fn transfer_spawns<R: Rng + ?Sized>(
        &self,
        that: &Metalocation,
        location: &mut Location,
        rng: &mut R,
    ) -> Result<()> {
        let mut pits: BTreeMap<Pos, u8> = BTreeMap::new(); // 0 = vertical, 1 = horizontal
        let mut statues: Vec<(Pos, u16)> = vec![];
        let mut walls: VecDeque<(u8, u8)> = VecDeque::new();
        let mut bridges: VecDeque<(u8, u8)> = VecDeque::new();
        let mut arenas: Vec<(u8, u8)> = vec![];
        let mut anchors: Vec<Anchor> = vec![];

        for pos in self.all_pos() {
            let scr = self.get(pos);
            let (y, x) = (pos.row << 4, pos.col << 4);
            if scr.has_feature(Feature::Pit) {
                pits.insert(pos, if scr.edge_index('c') == 5 { 0 } else { 1 });
            } else {
                for (i, &row) in scr.data.statues.iter().enumerate() {
                    let parity = (pos.col ^ pos.row ^ i as u8) & 1;
                    let col = if parity != 0 { 0x50 } else { 0xa0 };
                    statues.push((pos, ((row as u16) << 12) | col));
                }
            }
            let is_wall = scr.has_feature(Feature::Wall);
            if is_wall || scr.has_feature(Feature::Bridge) {
                let wall = scr
                    .data
                    .wall
                    .with_context(|| format!("Missing wall prop on {}", scr.name()))?;
                let tile = (y | (wall >> 4), x | (wall & 0xf));
                if is_wall {
                    walls.push_back(tile);
                } else {
                    bridges.push_back(tile);
                }
            }
            if scr.has_feature(Feature::Arena) {
                arenas.push((y | 8, x | 8));
            }
        }
        arenas.shuffle(rng);
        statues.shuffle(rng);
        let mut statues: VecDeque<(Pos, u16)> = statues.into();

        for pos in that.all_pos() {
            if !that.get(pos).has_feature(Feature::Arena) {
                continue;
            }
            let new = arenas
                .pop()
                .with_context(|| format!("Not enough arenas in new {:02x}\n{}", self.id, self.show()))?;
            anchors.push(Anchor {
                old: ((pos.row << 4) | 8, (pos.col << 4) | 8),
                new,
                range: ARENA_RANGE,
                kind: AnchorKind::Arena,
            });
        }

        // Both layouts lead to the same destinations, so exits pair up by target.
        let exit_tile = |meta: &Metalocation, pos: Pos, kind: ConnectionType| -> Result<(u8, u8)> {
            let scr = meta.get(pos);
            let spec = scr
                .find_exit_by_type(kind)
                .with_context(|| format!("Invalid exit: {} {kind}", scr.name()))?;
            let tile = spec.exits.first().copied().unwrap_or(0);
            Ok(((pos.row << 4) | (tile >> 4), (pos.col << 4) | (tile & 0xf)))
        };
        let mut reverse: HashMap<ExitSpec, (u8, u8)> = HashMap::new();
        for (pos, kind, exit) in self.exits() {
            reverse.insert(exit, exit_tile(self, pos, kind)?);
        }
        for (pos, kind, exit) in that.exits() {
            if exit.dest.location == self.id {
                continue;
            }
            let new = *reverse.get(&exit).with_context(|| {
                format!("exit {kind} -> {} {} missing from new {:02x}", exit.dest, exit.dest_type, self.id)
            })?;
            anchors.push(Anchor {
                old: exit_tile(that, pos, kind)?,
                new,
                range: EXIT_RANGE,
                kind: AnchorKind::Exit,
            });
        }

        let mut ppoi: BTreeMap<usize, Vec<(u16, u16)>> = BTreeMap::new();
        for pos in self.all_pos() {
            for poi in &self.get(pos).data.poi {
                let y = ((pos.row as i32) << 8) + poi.dy;
                let x = ((pos.col as i32) << 8) + poi.dx;
                ppoi.entry(poi.priority).or_default().push((y as u16, x as u16));
            }
        }
        let mut all_poi: VecDeque<(u16, u16)> = VecDeque::new();
        for bucket in ppoi.values_mut() {
            bucket.shuffle(rng);
            all_poi.extend(bucket.iter().copied());
        }

        let mut order: Vec<usize> = (0..location.spawns.len()).collect();
        order.shuffle(rng);
        for i in order {
            let spawn = &mut location.spawns[i];
            if spawn.is_monster() {
                let monster = spawn.monster_id();
                if let Some(platform) = PLATFORMS.iter().position(|&m| m == monster) {
                    if let Some((pos, dir)) = pits.pop_first() {
                        spawn.set_monster_id(PLATFORMS[(platform & 2) | dir as usize]);
                        spawn.set_screen(pos);
                        spawn.set_tile(if dir != 0 { 0x73 } else { 0x47 });
                    }
                } else if monster == STATUE_MONSTER {
                    if let Some((screen, coord)) = statues.pop_front() {
                        spawn.set_screen(screen);
                        spawn.set_coord(coord);
                    }
                }
                // Everything else is left to the monster placer.
                continue;
            }
            if spawn.is_wall() {
                let bridge = spawn.wall_type() == Some(WallType::Bridge);
                let pool = if bridge { &mut bridges } else { &mut walls };
                let Some((y, x)) = pool.pop_front() else {
                    bail!(
                        "Not enough {} screens in new metalocation {:02x}\n{}",
                        if bridge { "bridge" } else { "wall" },
                        self.id,
                        self.show()
                    );
                };
                spawn.set_yt(y);
                spawn.set_xt(x);
                continue;
            }

            let (yt, xt) = (spawn.yt(), spawn.xt());
            let mut best: Option<(u8, u8, i32)> = None;
            for a in &anchors {
                if spawn.is_boss() && a.kind != AnchorKind::Arena {
                    continue;
                }
                let dx = xt as i32 - a.old.1 as i32;
                let d = yt_diff(yt, a.old.0).pow(2) + dx * dx;
                if d <= a.range && best.map_or(true, |b| d < b.2) {
                    let y = yt_add(yt, yt_diff(a.new.0, a.old.0));
                    let x = (xt as i32 + a.new.1 as i32 - a.old.1 as i32) as u8;
                    best = Some((y, x, d));
                }
            }
            if let Some((y, x, _)) = best {
                spawn.set_yt(y);
                spawn.set_xt(x);
                continue;
            }
            if spawn.is_trigger() || spawn.is_boss() {
                bail!(
                    "Could not place {:02x} {} {:02x?}\n{}",
                    self.id,
                    if spawn.is_boss() { "Boss" } else { "Trigger" },
                    spawn.data,
                    self.show()
                );
            }
            let (y, x) = all_poi
                .pop_front()
                .with_context(|| format!("Ran out of POI for {:02x}", self.id))?;
            // Anything stacked on this spawn follows it.
            anchors.push(Anchor {
                old: ((spawn.y() >> 4) as u8, (spawn.x() >> 4) as u8),
                new: ((y >> 4) as u8, (x >> 4) as u8),
                range: POI_RANGE,
                kind: AnchorKind::Poi,
            });
            spawn.set_y(y);
            spawn.set_x(x);
        }
        Ok(())
    }
}

impl<'a> World<'a> {
    /// Re-aims every pit of `id` at a landing screen in its destination's
    /// current layout, near where the closest exit into that destination leads.
    pub fn shuffle_pits(&mut self, id: LocationId) -> Result<()> {
        let meta = self.meta(id)?;
        if meta.pits().is_empty() {
            return Ok(());
        }
        let dests: BTreeSet<LocationId> = meta.pits().values().map(|d| d.location).collect();
        let Some(&fallback) = dests.first() else {
            return Ok(());
        };

        // (pit screen, target screen in the destination) per destination
        let mut lists: BTreeMap<LocationId, Vec<(Pos, Pos)>> = BTreeMap::new();
        for pos in meta.all_pos() {
            if !meta.get(pos).has_feature(Feature::Pit) {
                continue;
            }
            let mut closest: Option<(Pos, LocationId, i32)> = None;
            for (exit_pos, _, spec) in meta.exits() {
                let dist = pos.distance2(exit_pos);
                if dests.contains(&spec.dest.location) && closest.map_or(true, |c| dist < c.2) {
                    let dmeta = self.meta(spec.dest.location)?;
                    closest = Some((add_delta(pos, spec.dest.pos, exit_pos, dmeta), spec.dest.location, dist));
                }
            }
            match closest {
                Some((target, dest, _)) => lists.entry(dest).or_default().push((pos, target)),
                None => {
                    let dmeta = self.meta(fallback)?;
                    let target = add_delta(Pos::new(15, pos.col), Pos::default(), Pos::default(), dmeta);
                    lists.entry(fallback).or_default().push((pos, target));
                }
            }
        }

        let mut pits = BTreeMap::new();
        for (dest, list) in lists {
            let dmeta = self.meta(dest)?;
            // Landing screens for vertical and horizontal falls.
            let mut eligible: [Vec<Pos>; 2] = [vec![], vec![]];
            let mut spikes: HashMap<Pos, usize> = HashMap::new();
            for pos in dmeta.all_pos() {
                let scr = dmeta.get(pos);
                if scr.has_feature(Feature::River) || scr.is_empty() {
                    continue;
                }
                let e = scr.edges();
                let spiky = scr.has_feature(Feature::Spikes);
                if e[0] != ' ' && e[2] != ' ' {
                    eligible[0].push(pos);
                }
                // Spike screens take either direction.
                if (e[1] != ' ' && e[3] != ' ') || spiky {
                    eligible[1].push(pos);
                }
                if spiky {
                    spikes.insert(pos, e.iter().filter(|&&c| c == 's').count());
                }
            }
            let mut delta = (Pos::default(), Pos::default());
            for (upstairs, downstairs) in list {
                let e = meta.get(upstairs).edges();
                let dir = if e[1] == 'c' && e[3] == 'c' { 1 } else { 0 };
                let target = add_delta(downstairs, delta.0, delta.1, dmeta);
                let end = eligible[dir]
                    .iter()
                    .copied()
                    .min_by_key(|&p| (spikes.get(&p).copied().unwrap_or(0), target.distance2(p)))
                    .with_context(|| format!("no eligible dest for pit {id:02x}:{upstairs} in {dest:02x}"))?;
                delta = (end, target);
                pits.insert(upstairs, LocPos::new(dest, end));
            }
        }
        debug!("Shuffled {} pits in {id:02x}", pits.len());
        let meta = self.meta_mut(id)?;
        meta.pits = pits;
        Ok(())
    }

    /// Gives each exit of the installed layout for `new.id` a random screen of
    /// the same exit type in `new`, repointing partners that pointed back.
    pub fn transfer_exits<R: Rng + ?Sized>(&mut self, new: &mut Metalocation<'a>, rng: &mut R) -> Result<()> {
        let id = new.id;
        let orig: Vec<(Pos, ConnectionType, ExitSpec)> = self.meta(id)?.exits().collect();
        let mut pools: BTreeMap<ConnectionType, Vec<Pos>> = BTreeMap::new();
        for pos in new.all_pos() {
            for exit in new.get(pos).exits() {
                let usable = match exit.kind {
                    ConnectionType::EdgeTop => pos.row == 0,
                    ConnectionType::EdgeLeft => pos.col == 0,
                    ConnectionType::EdgeBottom => pos.row as usize + 1 >= new.height(),
                    ConnectionType::EdgeRight => pos.col as usize + 1 >= new.width(),
                    _ => true,
                };
                if usable {
                    pools.entry(exit.kind).or_default().push(pos);
                }
            }
        }
        for pool in pools.values_mut() {
            pool.shuffle(rng);
        }
        new.clear_exits();

        let mut self_exits: BTreeSet<(Pos, ConnectionType)> = BTreeSet::new();
        for (opos, kind, exit) in orig {
            if self_exits.contains(&(opos, kind)) {
                continue;
            }
            let Some(pos) = pools.get_mut(&kind).and_then(|p| p.pop()) else {
                bail!(
                    "Could not transfer exit {kind} in {id:02x}: no eligible screen\n{}",
                    new.show()
                );
            };
            if exit.dest.location == id {
                // Both ends are here: pick a screen for the other end too.
                let Some(npos) = pools.get_mut(&exit.dest_type).and_then(|p| p.pop()) else {
                    bail!(
                        "Could not transfer exit {} in {id:02x}: no eligible screen\n{}",
                        exit.dest_type,
                        new.show()
                    );
                };
                new.set_exit_one_way(pos, kind, ExitSpec::new(id, npos, exit.dest_type));
                new.set_exit_one_way(npos, exit.dest_type, ExitSpec::new(id, pos, kind));
                self_exits.insert((exit.dest.pos, exit.dest_type));
                continue;
            }
            let ret = self.meta(exit.dest.location)?.get_exit(exit.dest.pos, exit.dest_type);
            match ret {
                Some(ret) if ret == ExitSpec::new(id, opos, kind) => {
                    self.point(exit.dest, exit.dest_type, ExitSpec::new(id, pos, kind))?;
                }
                Some(_) => {}
                None if kind.is_seamless() => {}
                None => bail!(
                    "No exit for {:02x} at {} {}\n{}",
                    exit.dest.location,
                    exit.dest.pos,
                    exit.dest_type,
                    self.meta(exit.dest.location)?.show()
                ),
            }
            new.set_exit_one_way(pos, kind, exit);
        }
        Ok(())
    }

    /// Moves the spawns of `new.id` from the installed layout onto `new`.
    pub fn transfer_spawns<R: Rng + ?Sized>(&mut self, new: &Metalocation<'a>, rng: &mut R) -> Result<()> {
        let id = new.id;
        let orig = self
            .metas
            .get(&id)
            .with_context(|| format!("no metalocation for {id:02x}"))?;
        let location = match self.locations.get_mut(id as usize) {
            Some(loc) if loc.id == id => loc,
            _ => bail!("no location {id:02x}"),
        };
        new.transfer_spawns(orig, location, rng)
    }
}

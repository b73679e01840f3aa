use crate::metalocation::{ExitSpec, Metalocation};
use anyhow::{Context, Result, bail, ensure};
use crysrando_game::flags::{ALWAYS_TRUE, CALMED_ANGRY_SEA, FlagAllocator, FlagRef};
use crysrando_game::location::Location;
use crysrando_game::{
    ConnectionType, LocPos, LocationId, Metascreen, Metatileset, Pos, ScreenCatalog, TileKey,
};
use hashbrown::{HashMap, HashSet};
use log::{info, warn};
use rand::Rng;
use std::collections::BTreeMap;

/// Picks new positions for monster spawns.
pub trait MonsterPlacer {
    fn is_monster(&self, monster_id: u8) -> bool;
    fn is_bird(&self, monster_id: u8) -> bool;
    /// Full tile key (pos << 8 | yx) for the monster, or `None` if it fits nowhere.
    fn place<R: Rng + ?Sized>(
        &mut self,
        location: &Location,
        monster_id: u8,
        rng: &mut R,
    ) -> Option<TileKey>;
}

/// Arena of raw locations and the metalocations built from them. Every
/// cross-location exit edit goes through here so both ends stay in sync.
pub struct World<'a> {
    pub catalog: &'a ScreenCatalog,
    pub locations: Vec<Location>,
    pub flags: FlagAllocator,
    pub(crate) metas: BTreeMap<LocationId, Metalocation<'a>>,
}

impl<'a> World<'a> {
    pub fn new(catalog: &'a ScreenCatalog, locations: Vec<Location>) -> Result<Self> {
        for (i, loc) in locations.iter().enumerate() {
            ensure!(
                loc.id as usize == i,
                "location {:02x} stored at index {i:02x}",
                loc.id
            );
        }
        let used = locations
            .iter()
            .flat_map(|l| l.flags.iter())
            .filter_map(|f| match f.flag {
                FlagRef::Fixed(id) => Some(id),
                FlagRef::Pending(_) => None,
            });
        let flags = FlagAllocator::new(used.chain([ALWAYS_TRUE, CALMED_ANGRY_SEA]));
        Ok(World {
            catalog,
            locations,
            flags,
            metas: BTreeMap::new(),
        })
    }

    pub fn location(&self, id: LocationId) -> Result<&Location> {
        crate::metalocation::lookup(&self.locations, id)
    }

    pub fn location_mut(&mut self, id: LocationId) -> Result<&mut Location> {
        match self.locations.get_mut(id as usize) {
            Some(loc) if loc.id == id => Ok(loc),
            _ => bail!("no location {id:02x}"),
        }
    }

    /// Parses the raw location into its metalocation and installs it.
    pub fn parse(
        &mut self,
        id: LocationId,
        reachable: &HashMap<TileKey, u8>,
        tileset: Option<&'a Metatileset>,
    ) -> Result<()> {
        let location = self.location(id)?;
        let meta = Metalocation::of(location, &self.locations, self.catalog, reachable, tileset)
            .with_context(|| format!("Parsing location {id:02x}"))?;
        self.metas.insert(id, meta);
        Ok(())
    }

    pub fn has_meta(&self, id: LocationId) -> bool {
        self.metas.contains_key(&id)
    }

    pub fn meta(&self, id: LocationId) -> Result<&Metalocation<'a>> {
        self.metas
            .get(&id)
            .with_context(|| format!("no metalocation for {id:02x}"))
    }

    pub fn meta_mut(&mut self, id: LocationId) -> Result<&mut Metalocation<'a>> {
        self.metas
            .get_mut(&id)
            .with_context(|| format!("no metalocation for {id:02x}"))
    }

    pub fn metas(&self) -> impl Iterator<Item = &Metalocation<'a>> {
        self.metas.values()
    }

    /// Installs a metalocation, returning the one it replaces.
    pub fn install(&mut self, meta: Metalocation<'a>) -> Option<Metalocation<'a>> {
        self.metas.insert(meta.id, meta)
    }

    /// Removes a metalocation from the arena, e.g. while a replacement is built.
    pub fn take(&mut self, id: LocationId) -> Result<Metalocation<'a>> {
        self.metas
            .remove(&id)
            .with_context(|| format!("no metalocation for {id:02x}"))
    }

    /// Sets one direction of an exit.
    pub fn point(&mut self, from: LocPos, from_type: ConnectionType, to: ExitSpec) -> Result<()> {
        self.meta_mut(from.location)?
            .set_exit_one_way(from.pos, from_type, to);
        Ok(())
    }

    /// Connects two exit slots in both directions.
    pub fn connect_slots(
        &mut self,
        a: (LocPos, ConnectionType),
        b: (LocPos, ConnectionType),
    ) -> Result<()> {
        ensure!(
            self.has_meta(a.0.location) && self.has_meta(b.0.location),
            "Cannot set two-way exit without meta: {} {} <-> {} {}",
            a.0,
            a.1,
            b.0,
            b.1
        );
        self.point(a.0, a.1, ExitSpec { dest: b.0, dest_type: b.1 })?;
        self.point(b.0, b.1, ExitSpec { dest: a.0, dest_type: a.1 })
    }

    pub fn set_exit(
        &mut self,
        id: LocationId,
        pos: Pos,
        kind: ConnectionType,
        spec: ExitSpec,
    ) -> Result<()> {
        self.connect_slots((LocPos::new(id, pos), kind), (spec.dest, spec.dest_type))
    }

    /// Attaches an exit pair in both directions, then joins the two former
    /// partners to each other (or drops a lone stale partner).
    pub fn attach(
        &mut self,
        src: LocPos,
        dest: LocPos,
        src_type: Option<ConnectionType>,
        dest_type: Option<ConnectionType>,
    ) -> Result<()> {
        let src_type = match src_type {
            Some(t) => t,
            None => self.meta(src.location)?.pick_type_from_exits(src.pos)?,
        };
        let dest_type = match dest_type {
            Some(t) => t,
            None => self.meta(dest.location)?.pick_type_from_exits(dest.pos)?,
        };
        let prev_dest = self.meta(src.location)?.get_exit(src.pos, src_type);
        let prev_src = self.meta(dest.location)?.get_exit(dest.pos, dest_type);
        let want_dest = ExitSpec { dest, dest_type };
        let want_src = ExitSpec { dest: src, dest_type: src_type };
        if prev_dest == Some(want_dest) && prev_src == Some(want_src) {
            return Ok(());
        }
        self.connect_slots((src, src_type), (dest, dest_type))?;
        match (prev_src, prev_dest) {
            (Some(prev_src), Some(prev_dest)) => {
                self.point(prev_src.dest, prev_src.dest_type, prev_dest)?;
                self.point(prev_dest.dest, prev_dest.dest_type, prev_src)?;
            }
            (Some(prev), None) | (None, Some(prev)) => {
                // A one-way exit being given its reverse keeps its other side.
                if prev != want_src && prev != want_dest {
                    self.meta_mut(prev.dest.location)?
                        .delete_exit(prev.dest.pos, prev.dest_type);
                }
            }
            (None, None) => {}
        }
        Ok(())
    }

    pub fn connect(&mut self, a: ExitSpec, b: ExitSpec) -> Result<()> {
        self.attach(a.dest, b.dest, Some(a.dest_type), Some(b.dest_type))
    }

    /// Moves exits within a location as one batch, repointing their partners.
    /// Nothing changes unless every move can be made.
    pub fn move_exits(
        &mut self,
        id: LocationId,
        moves: &[(Pos, ConnectionType, Pos, ConnectionType)],
    ) -> Result<()> {
        let new_exits = self.plan_moves(id, moves)?;
        self.apply_moves(id, moves, new_exits)
    }

    /// Resolves the exits a batch of moves carries, checking that each one
    /// exists and that every partner outside the batch has a metalocation.
    fn plan_moves(
        &self,
        id: LocationId,
        moves: &[(Pos, ConnectionType, Pos, ConnectionType)],
    ) -> Result<Vec<(Pos, ConnectionType, ExitSpec)>> {
        let remap: BTreeMap<(Pos, ConnectionType), (Pos, ConnectionType)> = moves
            .iter()
            .map(|&(p, t, np, nt)| ((p, t), (np, nt)))
            .collect();
        let meta = self.meta(id)?;
        let mut new_exits = vec![];
        for &(old_pos, old_type, new_pos, new_type) in moves {
            let mut spec = meta
                .get_exit(old_pos, old_type)
                .with_context(|| format!("no {old_type} exit at {id:02x}:{old_pos}"))?;
            if spec.dest.location == id {
                if let Some(&(p, t)) = remap.get(&(spec.dest.pos, spec.dest_type)) {
                    spec = ExitSpec::new(id, p, t);
                }
            }
            ensure!(
                self.has_meta(spec.dest.location),
                "no metalocation for {:02x}, partner of {old_type} exit at {id:02x}:{old_pos}",
                spec.dest.location
            );
            new_exits.push((new_pos, new_type, spec));
        }
        Ok(new_exits)
    }

    fn apply_moves(
        &mut self,
        id: LocationId,
        moves: &[(Pos, ConnectionType, Pos, ConnectionType)],
        new_exits: Vec<(Pos, ConnectionType, ExitSpec)>,
    ) -> Result<()> {
        for &(new_pos, new_type, spec) in &new_exits {
            let moved_here = spec.dest.location == id
                && moves
                    .iter()
                    .any(|&(_, _, np, nt)| (np, nt) == (spec.dest.pos, spec.dest_type));
            if !moved_here {
                self.point(spec.dest, spec.dest_type, ExitSpec::new(id, new_pos, new_type))?;
            }
        }
        let meta = self.meta_mut(id)?;
        for &(pos, kind, _, _) in moves {
            meta.delete_exit(pos, kind);
        }
        for (pos, kind, spec) in new_exits {
            meta.set_exit_one_way(pos, kind, spec);
        }
        Ok(())
    }

    pub fn move_exit(
        &mut self,
        id: LocationId,
        prev: Pos,
        next: Pos,
        prev_type: Option<ConnectionType>,
        next_type: Option<ConnectionType>,
    ) -> Result<()> {
        let meta = self.meta(id)?;
        let prev_type = match prev_type {
            Some(t) => t,
            None => meta.pick_type_from_exits(prev)?,
        };
        let next_type = match next_type {
            Some(t) => t,
            None => meta.pick_type_from_screens(next)?,
        };
        self.move_exits(id, &[(prev, prev_type, next, next_type)])
    }

    /// Moves the exits and pits of every screen of `other` not marked for
    /// deletion from location `from` into `other`.
    pub fn move_exits_and_pits_to(
        &mut self,
        from: LocationId,
        other: &mut Metalocation<'a>,
    ) -> Result<()> {
        let moved: HashSet<Pos> = other
            .all_pos()
            .into_iter()
            .filter(|&pos| !other.get(pos).data.delete)
            .collect();
        let src = self.meta(from)?;
        let exits: Vec<(Pos, ConnectionType, ExitSpec)> =
            src.exits().filter(|(pos, _, _)| moved.contains(pos)).collect();
        let pits: Vec<(Pos, LocPos)> = src
            .pits()
            .iter()
            .filter(|(pos, _)| moved.contains(*pos))
            .map(|(&pos, &dest)| (pos, dest))
            .collect();
        for (pos, kind, spec) in exits {
            let back = ExitSpec::new(other.id, pos, kind);
            if spec.dest.location == other.id {
                other.set_exit_one_way(spec.dest.pos, spec.dest_type, back);
            } else {
                self.point(spec.dest, spec.dest_type, back)?;
            }
            other.set_exit_one_way(pos, kind, spec);
            self.meta_mut(from)?.delete_exit(pos, kind);
        }
        for (pos, dest) in pits {
            other.set_pit(pos, dest);
            self.meta_mut(from)?.delete_pit(pos);
        }
        Ok(())
    }

    /// Drops exits of `a` and `b` whose destination doesn't point straight back,
    /// and copies each reciprocated exit to the other location of the pair.
    pub fn reconcile_exits(&mut self, a: LocationId, b: LocationId) -> Result<()> {
        let mut adds = vec![];
        let mut dels = vec![];
        for (loc, other) in [(a, b), (b, a)] {
            for (pos, kind, spec) in self.meta(loc)?.exits() {
                if spec.dest_type.is_seamless() {
                    continue;
                }
                let reverse = self
                    .metas
                    .get(&spec.dest.location)
                    .and_then(|m| m.get_exit(spec.dest.pos, spec.dest_type));
                if reverse == Some(ExitSpec::new(loc, pos, kind)) {
                    adds.push((other, pos, kind, spec));
                } else {
                    dels.push((loc, pos, kind));
                }
            }
        }
        for (loc, pos, kind) in dels {
            self.meta_mut(loc)?.delete_exit(pos, kind);
        }
        for (loc, pos, kind, spec) in adds {
            let meta = self.meta_mut(loc)?;
            if meta.get_exit(pos, kind).is_none() {
                meta.set_exit_one_way(pos, kind, spec);
            }
        }
        Ok(())
    }

    /// Splices columns into a location's grid, moving exits past the splice
    /// and dropping those inside the deleted span, and shifting the raw
    /// spawns and flags to match. On error the location is left untouched.
    pub fn splice_columns(
        &mut self,
        id: LocationId,
        left: usize,
        deleted: usize,
        inserted: usize,
        screens: &[Vec<&Metascreen>],
    ) -> Result<()> {
        self.location(id)?;
        let mut spliced = self.meta(id)?.clone();
        spliced.splice_screens(left, deleted, inserted, screens)?;
        let delta = inserted as i32 - deleted as i32;
        let span = left..left + deleted;
        let in_span = |dest: LocPos| dest.location == id && span.contains(&(dest.pos.col as usize));

        let meta = self.meta(id)?;
        let mut dropped = vec![];
        for (pos, kind, spec) in meta.exits() {
            if !in_span(LocPos::new(id, pos)) {
                continue;
            }
            dropped.push((LocPos::new(id, pos), kind));
            let back = self
                .metas
                .get(&spec.dest.location)
                .and_then(|m| m.get_exit(spec.dest.pos, spec.dest_type));
            if back == Some(ExitSpec::new(id, pos, kind)) {
                dropped.push((spec.dest, spec.dest_type));
            }
        }
        let mut moves = vec![];
        for (pos, kind, spec) in meta.exits() {
            let key = (LocPos::new(id, pos), kind);
            if dropped.contains(&key) {
                continue;
            }
            // The screen it leads to is going away.
            if in_span(spec.dest) {
                dropped.push(key);
                continue;
            }
            if (pos.col as usize) < left + deleted {
                continue;
            }
            let next = pos
                .offset(0, delta)
                .with_context(|| format!("exit at {id:02x}:{pos} shifted off the grid"))?;
            moves.push((pos, kind, next, kind));
        }
        let new_exits = self.plan_moves(id, &moves)?;

        self.metas.insert(id, spliced);
        for (at, kind) in dropped {
            if let Some(meta) = self.metas.get_mut(&at.location) {
                meta.delete_exit(at.pos, kind);
            }
        }
        self.apply_moves(id, &moves, new_exits)?;

        let location = self.location_mut(id)?;
        let xt0 = ((left + deleted) << 4) as i32;
        for spawn in location.spawns.iter_mut() {
            if (spawn.xt() as i32) < xt0 {
                continue;
            }
            spawn.set_xt((spawn.xt() as i32 + (delta << 4)) as u8);
        }
        location.flags.retain(|f| {
            let x = f.pos().col as usize;
            !(left..left + deleted).contains(&x)
        });
        for flag in location.flags.iter_mut() {
            let pos = flag.pos();
            if (pos.col as usize) >= left + deleted {
                flag.screen = Pos::new(pos.row, (pos.col as i32 + delta) as u8).packed();
            }
        }
        location.width = (location.width as i32 + delta) as usize;
        Ok(())
    }

    /// Hands every monster spawn to `placer`; spawns it can't place are disabled.
    pub fn replace_monsters<P: MonsterPlacer, R: Rng + ?Sized>(
        &mut self,
        id: LocationId,
        placer: &mut P,
        rng: &mut R,
    ) -> Result<()> {
        // Sea monsters are placed along with the sea itself.
        if id == 0x68 {
            return Ok(());
        }
        let count = self.location(id)?.spawns.len();
        let mut placed = 0;
        for i in 0..count {
            let spawn = self.location(id)?.spawns[i];
            if !spawn.used() || !spawn.is_monster() {
                continue;
            }
            let monster = spawn.monster_id();
            if !placer.is_monster(monster) {
                continue;
            }
            let result = placer.place(self.location(id)?, monster, rng);
            let spawn = &mut self.location_mut(id)?.spawns[i];
            match result {
                None => {
                    warn!("Could not place monster {monster:02x} in {id:02x}");
                    spawn.set_used(false);
                }
                Some(_) if placer.is_bird(monster) => {
                    spawn.set_y(0xfd0);
                    spawn.set_x(0x7f0);
                    spawn.set_timed(true);
                    placed += 1;
                }
                Some(key) => {
                    spawn.set_screen(Pos::from_packed((key >> 8) as u8));
                    spawn.set_tile((key & 0xff) as u8);
                    placed += 1;
                }
            }
        }
        info!("Placed {placed} monsters in {id:02x}");
        Ok(())
    }

    /// Verifies that every non-seamless exit's destination points back at it.
    pub fn check_exits(&self) -> Result<()> {
        for meta in self.metas.values() {
            for (pos, kind, spec) in meta.exits() {
                if kind.is_seamless() {
                    continue;
                }
                let back = self
                    .metas
                    .get(&spec.dest.location)
                    .and_then(|m| m.get_exit(spec.dest.pos, spec.dest_type));
                if back != Some(ExitSpec::new(meta.id, pos, kind)) {
                    bail!(
                        "exit {:02x}:{pos} {kind} -> {} {} does not point back (found {back:?})",
                        meta.id,
                        spec.dest,
                        spec.dest_type
                    );
                }
            }
        }
        Ok(())
    }
}

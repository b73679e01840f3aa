use crate::world::World;
use anyhow::{Context, Result, bail};
use crysrando_game::flags::{ALWAYS_TRUE, CALMED_ANGRY_SEA, FlagRef};
use crysrando_game::location::{Entrance, Exit, LocationFlag, Pit};
use crysrando_game::{FlagKind, LocationId, Pos};
use hashbrown::HashSet;
use log::debug;
use pathfinding::undirected::connected_components::components;

// Entrance byte of a seamless exit.
const SEAMLESS_ENTRANCE: u8 = 0x20;

impl<'a> World<'a> {
    /// Flushes the metalocation for `id` back into its raw location: exits
    /// (adding destination entrances as needed), the screen grid, flags and pits.
    pub fn write(&mut self, id: LocationId) -> Result<()> {
        let meta = self
            .metas
            .get(&id)
            .with_context(|| format!("no metalocation for {id:02x}"))?;

        let mut exits = vec![];
        let mut seamless: HashSet<Pos> = HashSet::new();
        for (src_pos, src_type, spec) in meta.exits() {
            let src_screen = meta.get(src_pos);
            let dest_meta = self
                .metas
                .get(&spec.dest.location)
                .with_context(|| format!("no metalocation for {:02x}", spec.dest.location))?;
            let dest_screen = dest_meta.get(spec.dest.pos);
            let src_exit = src_screen.find_exit_by_type(src_type);
            let dest_exit = dest_screen.find_exit_by_type(spec.dest_type);
            let (Some(src_exit), Some(dest_exit)) = (src_exit, dest_exit) else {
                bail!(
                    "Missing {} exit:\n  From: {id:02x} @ {src_pos}:{src_type} {}\n  To:   {:02x} @ {}:{} {}",
                    if src_exit.is_some() { "dest" } else { "source" },
                    src_screen.name(),
                    spec.dest.location,
                    spec.dest.pos,
                    spec.dest_type,
                    dest_screen.name()
                );
            };
            let entrance = if dest_exit.kind.is_seamless() {
                seamless.insert(src_pos);
                SEAMLESS_ENTRANCE
            } else {
                let mut dest_pos = spec.dest.pos;
                let mut coord = dest_exit.entrance;
                // Entrances past the bottom of the screen land in the one below.
                if coord > 0xefff {
                    dest_pos = dest_pos
                        .offset(1, 0)
                        .with_context(|| format!("entrance below the grid of {:02x}", spec.dest.location))?;
                    coord -= 0x10000;
                }
                let dest = match self.locations.get_mut(spec.dest.location as usize) {
                    Some(loc) if loc.id == spec.dest.location => loc,
                    _ => bail!("no location {:02x}", spec.dest.location),
                };
                dest.find_or_add_entrance(dest_pos, coord as u16)?
            };
            for &tile in &src_exit.exits {
                let (screen, tile) = if tile & 0xf0 == 0xf0 {
                    let below = src_pos
                        .offset(1, 0)
                        .with_context(|| format!("exit below the grid of {id:02x}"))?;
                    (below, tile & 0xf)
                } else {
                    (src_pos, tile)
                };
                exits.push(Exit {
                    screen: screen.packed(),
                    tile,
                    dest: spec.dest.location,
                    entrance,
                });
            }
        }

        let mut screens = vec![];
        for y in 0..meta.height() {
            let mut row = vec![];
            for x in 0..meta.width() {
                let scr = meta.get(Pos::new(y as u8, x as u8));
                let Ok(sid) = u8::try_from(scr.sid()) else {
                    bail!("screen {} has no raw id (in {id:02x})", scr.name());
                };
                row.push(sid);
            }
            screens.push(row);
        }

        // Screens reachable from an exit without crossing a seamless seam.
        let mut groups: Vec<Vec<Pos>> = vec![];
        for pos in meta.all_pos() {
            if seamless.contains(&pos) {
                continue;
            }
            let e = meta.get(pos).edges();
            let mut group = vec![pos];
            for (edge, (dy, dx)) in [(e[2], (1, 0)), (e[3], (0, 1))] {
                if edge == ' ' {
                    continue;
                }
                if let Some(next) = pos.offset(dy, dx) {
                    if !seamless.contains(&next) {
                        group.push(next);
                    }
                }
            }
            groups.push(group);
        }
        let mut reachable: HashSet<Pos> = HashSet::new();
        for component in components(&groups) {
            if meta.exits().any(|(pos, _, _)| component.contains(&pos)) {
                reachable.extend(component);
            }
        }

        let mut flags = vec![];
        let mut free: Vec<FlagRef> = meta.free_flags.iter().copied().collect();
        for pos in meta.all_pos() {
            let scr = meta.get(pos);
            let flag = if scr.data.wall.is_some() && reachable.contains(&pos) {
                match free.pop() {
                    Some(flag) => Some(flag),
                    None => Some(self.flags.alloc(0x200)?),
                }
            } else {
                match scr.data.flag {
                    Some(FlagKind::Always) => Some(FlagRef::Fixed(ALWAYS_TRUE)),
                    Some(FlagKind::Calm) => Some(FlagRef::Fixed(CALMED_ANGRY_SEA)),
                    Some(FlagKind::CustomFalse) => meta.custom_flags.get(&pos).copied(),
                    Some(FlagKind::CustomTrue) => Some(
                        meta.custom_flags
                            .get(&pos)
                            .copied()
                            .unwrap_or(FlagRef::Fixed(ALWAYS_TRUE)),
                    ),
                    None => None,
                }
            };
            if let Some(flag) = flag {
                flags.push(LocationFlag {
                    screen: pos.packed(),
                    flag,
                });
            }
        }

        let pits: Vec<Pit> = meta
            .pits()
            .iter()
            .map(|(from, to)| Pit {
                from_screen: from.packed(),
                to_screen: to.pos.packed(),
                dest: to.location,
            })
            .collect();

        let (width, height) = (meta.width(), meta.height());
        let tileset = meta.tileset();
        let location = match self.locations.get_mut(id as usize) {
            Some(loc) if loc.id == id => loc,
            _ => bail!("no location {id:02x}"),
        };
        debug!(
            "Writing {id:02x}: {} exits, {} flags, {} pits",
            exits.len(),
            flags.len(),
            pits.len()
        );
        location.exits = exits;
        location.width = width;
        location.height = height;
        location.screens = screens;
        location.tileset = tileset.tileset_id;
        location.tile_effects = tileset.tile_effects;
        location.flags = flags;
        location.pits = pits;
        Ok(())
    }

    /// Points entrance 0 at the exit it originally sat on, if that exit survived.
    pub fn write_entrance0(&mut self, id: LocationId) -> Result<()> {
        let meta = self.meta(id)?;
        let Some(kind) = meta.entrance0() else {
            return Ok(());
        };
        let Some((pos, _, _)) = meta.exits().find(|&(_, t, _)| t == kind) else {
            return Ok(());
        };
        let exit = meta
            .get(pos)
            .find_exit_by_type(kind)
            .with_context(|| format!("no {kind} exit on screen {pos} of {id:02x}"))?;
        let entrance = Entrance::new(pos, exit.entrance as u16);
        let location = self.location_mut(id)?;
        match location.entrances.first_mut() {
            Some(e0) => *e0 = entrance,
            None => location.entrances.push(entrance),
        }
        Ok(())
    }
}

pub mod transfer;
pub mod write;

use crate::traverse::{Traversal, TraverseOpts, traverse};
use anyhow::{Context, Result, bail, ensure};
use crysrando_game::flags::{ALWAYS_TRUE, FlagRef};
use crysrando_game::location::Location;
use crysrando_game::{
    ConnectionType, FlagKind, LocPos, LocationId, Metascreen, Metatileset, Pos, ScreenCatalog,
    ScreenId, ScreenUid, TileKey,
};
use hashbrown::{HashMap, HashSet};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const DIR_NAME: [&str; 4] = ["above", "left of", "below", "right of"];

// Raw exits known not to match any screen exit: loc << 16 | screen << 8 | tile.
const UNKNOWN_EXIT_WHITELIST: [u32; 12] = [
    0x01003a, 0x01003b, 0x1540a0, 0x1a3060, 0x402000, 0x402030, 0x4180d0, 0x6087bf, 0xa10326,
    0xa10329, 0xa90626, 0xa90629,
];

/// Where an exit leads: the destination screen and the exit type there.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExitSpec {
    pub dest: LocPos,
    pub dest_type: ConnectionType,
}

impl ExitSpec {
    pub fn new(location: LocationId, pos: Pos, dest_type: ConnectionType) -> Self {
        ExitSpec {
            dest: LocPos::new(location, pos),
            dest_type,
        }
    }
}

/// Editable grid-graph of one location: screens on a 16-column grid plus its
/// exits, pits, and flag bookkeeping.
#[derive(Clone, Debug)]
pub struct Metalocation<'a> {
    pub id: LocationId,
    catalog: &'a ScreenCatalog,
    tileset: &'a Metatileset,
    width: usize,
    height: usize,
    screens: Vec<ScreenUid>, // indexed by packed pos
    exits: BTreeMap<(Pos, ConnectionType), ExitSpec>,
    pits: BTreeMap<Pos, LocPos>,
    pub custom_flags: BTreeMap<Pos, FlagRef>,
    pub free_flags: BTreeSet<FlagRef>,
    entrance0: Option<ConnectionType>,
}

pub(crate) fn lookup(locations: &[Location], id: LocationId) -> Result<&Location> {
    match locations.get(id as usize) {
        Some(loc) if loc.id == id => Ok(loc),
        _ => bail!("no location {id:02x}"),
    }
}

fn infer_tileset<'a>(location: &Location, catalog: &'a ScreenCatalog) -> Result<&'a Metatileset> {
    let mut candidates: Vec<&Metatileset> = catalog
        .tilesets()
        .filter(|ts| ts.tileset_id == location.tileset)
        .filter(|ts| ts.exclusive_locations.is_empty() || ts.exclusive_locations.contains(&location.id))
        .collect();
    if candidates.iter().any(|ts| ts.exclusive_locations.contains(&location.id)) {
        candidates.retain(|ts| ts.exclusive_locations.contains(&location.id));
    }
    for row in location.screens.iter().take(location.height) {
        for &sid in row.iter().take(location.width) {
            candidates.retain(|ts| !ts.get_metascreens(sid as ScreenId).is_empty());
            if candidates.is_empty() {
                bail!("No tileset for {sid:02x} in {:02x}", location.id);
            }
        }
    }
    if candidates.len() != 1 {
        let names: Vec<&str> = candidates.iter().map(|ts| ts.name.as_str()).collect();
        bail!(
            "Non-unique tileset for {:02x}: [{}]",
            location.id,
            names.join(", ")
        );
    }
    Ok(candidates[0])
}

fn find_entrance_type(
    dest: &Location,
    sid: ScreenId,
    coord: u32,
    catalog: &ScreenCatalog,
) -> Option<ConnectionType> {
    for scr in catalog.metascreens_by_sid(sid, dest.tileset) {
        if let Some(t) = scr.find_entrance_type(coord, dest.height == 1) {
            return Some(t);
        }
    }
    None
}

impl<'a> Metalocation<'a> {
    pub fn new(
        id: LocationId,
        catalog: &'a ScreenCatalog,
        tileset: &'a Metatileset,
        height: usize,
        width: usize,
    ) -> Self {
        Metalocation {
            id,
            catalog,
            tileset,
            width,
            height,
            screens: vec![tileset.empty; height << 4],
            exits: BTreeMap::new(),
            pits: BTreeMap::new(),
            custom_flags: BTreeMap::new(),
            free_flags: BTreeSet::new(),
            entrance0: None,
        }
    }

    /// Builds the metalocation for `location` from its raw records.
    ///
    /// `reachable` is the flood-filled set of reachable tile keys (with their
    /// terrain), used to tell apart screens that share a raw id.
    pub fn of(
        location: &Location,
        locations: &[Location],
        catalog: &'a ScreenCatalog,
        reachable: &HashMap<TileKey, u8>,
        tileset: Option<&'a Metatileset>,
    ) -> Result<Metalocation<'a>> {
        let tileset = match tileset {
            Some(ts) => ts,
            None => infer_tileset(location, catalog)?,
        };
        let (width, height) = (location.width, location.height);
        ensure!(width <= 16, "location {:02x} too wide: {width}", location.id);
        ensure!(height <= 16, "location {:02x} too tall: {height}", location.id);

        let mut reachable_tiles: HashSet<TileKey> = reachable.keys().copied().collect();
        let mut reachable_screens: HashSet<Pos> = reachable
            .keys()
            .map(|&t| Pos::from_packed((t >> 8) as u8))
            .collect();
        for entrance in &location.entrances {
            if entrance.used() {
                reachable_screens.insert(entrance.screen());
            }
        }
        for exit in &location.exits {
            reachable_screens.insert(exit.pos());
            if exit.is_seamless() {
                // Seamless exits are only reachable from their own side.
                let y = exit.tile >> 4;
                if y == 0 && exit.screen >= 0x10 {
                    reachable_tiles.insert(((exit.screen as TileKey - 0x10) << 8) | 0x88);
                } else if y == 0xe {
                    reachable_tiles.insert(((exit.screen as TileKey) << 8) | 0x88);
                }
            }
        }

        let mut meta = Metalocation::new(location.id, catalog, tileset, height, width);
        for y in 0..height {
            for x in 0..width {
                let pos = Pos::new(y as u8, x as u8);
                let sid = location
                    .screen_id(pos)
                    .with_context(|| format!("missing screen {pos} in {:02x}", location.id))?
                    as ScreenId;
                let uid = match tileset.get_metascreens(sid) {
                    [] => bail!("No metascreen {sid:02x} in {} for {:02x}", tileset.name, location.id),
                    [uid] => *uid,
                    uids => pick_screen(location, catalog, uids, pos, &reachable_tiles)
                        .with_context(|| {
                            format!("No match for screen {sid:02x} at {pos} in {:02x}", location.id)
                        })?,
                };
                meta.screens[pos.packed() as usize] = uid;
            }
        }

        for exit in &location.exits {
            if exit.dest == 0xff {
                continue;
            }
            let mut src_pos = exit.pos();
            let mut tile = exit.tile;
            // Vertical seamless exits declared at y=0 actually belong to the screen above.
            if exit.is_seamless() && exit.yt() & 0xf == 0 && (location.id & 0x58) != 0x58 {
                src_pos = src_pos
                    .offset(-1, 0)
                    .with_context(|| format!("seamless exit off the top of {:02x}", location.id))?;
                tile |= 0xf0;
            }
            ensure!(
                reachable_screens.contains(&src_pos),
                "exit from unreachable screen {src_pos} in {:02x}",
                location.id
            );
            let src_screen = meta.get(src_pos);
            let Some(src_exit) = src_screen.find_exit_type(tile, height == 1, exit.is_seamless())
            else {
                let key = ((location.id as u32) << 16) | ((src_pos.packed() as u32) << 8) | exit.tile as u32;
                if UNKNOWN_EXIT_WHITELIST.contains(&key) {
                    warn!(
                        "Skipping unknown exit {:02x}: {} in {:02x} @ {src_pos}",
                        exit.tile,
                        src_screen.name(),
                        location.id
                    );
                    continue;
                }
                let all: Vec<String> = src_screen
                    .exits()
                    .iter()
                    .map(|e| format!("{}: {:02x?}", e.kind, e.exits))
                    .collect();
                bail!(
                    "Unknown exit {:02x}: {} in {:02x} @ {src_pos}:\n  {}",
                    exit.tile,
                    src_screen.name(),
                    location.id,
                    all.join("\n  ")
                );
            };
            let src_type = src_exit.kind;
            if meta.exits.contains_key(&(src_pos, src_type)) {
                continue;
            }
            let dest = lookup(locations, exit.dest)?;
            if let Some(dest_type) = src_type.seamless_opposite() {
                let down = src_type == ConnectionType::SeamlessDown;
                let t = src_exit.exits.first().copied().unwrap_or(0) as i32 + if down { -16 } else { 16 };
                let dest_pos = if t < 0 {
                    src_pos
                        .offset(-1, 0)
                        .with_context(|| format!("seamless exit off the top of {:02x}", location.id))?
                } else {
                    src_pos
                };
                meta.exits
                    .insert((src_pos, src_type), ExitSpec::new(dest.id, dest_pos, dest_type));
                continue;
            }
            let entrance = dest
                .entrances
                .get((exit.entrance & 0x1f) as usize)
                .with_context(|| {
                    format!("missing entrance {:02x} in {:02x}", exit.entrance, dest.id)
                })?;
            let mut dest_pos = entrance.screen();
            let mut dest_coord = entrance.coord() as u32;
            if src_type == ConnectionType::Door && (entrance.y & 0xf0) == 0 {
                // Doors whose entrance sits at the very top of a screen belong
                // to the screen above.
                dest_pos = dest_pos
                    .offset(-1, 0)
                    .with_context(|| format!("door entrance off the top of {:02x}", dest.id))?;
                dest_coord += 0x10000;
            }
            let dest_sid = dest
                .screen_id(dest_pos)
                .with_context(|| format!("missing screen {dest_pos} in {:02x}", dest.id))?
                as ScreenId;
            let Some(dest_type) = find_entrance_type(dest, dest_sid, dest_coord, catalog) else {
                let mut lines = vec![];
                for scr in catalog.metascreens_by_sid(dest_sid, dest.tileset) {
                    for e in scr.exits().iter().filter(|e| !e.kind.is_seamless()) {
                        lines.push(format!("  {} {}: {:04x}", scr.name(), e.kind, e.entrance));
                    }
                }
                bail!(
                    "Bad entrance {dest_coord:04x}: raw {dest_sid:02x} in {:02x} @ {dest_pos}\n{}",
                    dest.id,
                    lines.join("\n")
                );
            };
            meta.exits
                .insert((src_pos, src_type), ExitSpec::new(dest.id, dest_pos, dest_type));

            if let Some(e0) = location.entrances.first() {
                if e0.screen() == src_pos {
                    let coord = e0.coord() as i64;
                    let entrance = src_exit.entrance as i64;
                    let dx = (entrance & 0xff) - (coord & 0xff);
                    let dy = (entrance >> 8) - (coord >> 8);
                    if dx * dx + dy * dy <= 0x400 {
                        meta.entrance0 = Some(src_type);
                    }
                }
            }
        }

        for pit in &location.pits {
            meta.pits.insert(
                Pos::from_packed(pit.from_screen),
                LocPos::new(pit.dest, Pos::from_packed(pit.to_screen)),
            );
        }

        for flag in &location.flags {
            let pos = flag.pos();
            match meta.get(pos).data.flag {
                Some(kind) if kind.is_custom() => {
                    meta.custom_flags.insert(pos, flag.flag);
                }
                None => {
                    meta.free_flags.insert(flag.flag);
                }
                Some(_) => {}
            }
        }
        debug!(
            "Parsed location {:02x} ({}x{}) in {}: {} exits",
            location.id,
            width,
            height,
            tileset.name,
            meta.exits.len()
        );
        Ok(meta)
    }

    pub fn catalog(&self) -> &'a ScreenCatalog {
        self.catalog
    }

    pub fn tileset(&self) -> &'a Metatileset {
        self.tileset
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_width(&mut self, width: usize) {
        self.width = width;
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        self.screens.resize(height << 4, self.tileset.empty);
    }

    pub fn entrance0(&self) -> Option<ConnectionType> {
        self.entrance0
    }

    pub fn set_entrance0(&mut self, entrance0: Option<ConnectionType>) {
        self.entrance0 = entrance0;
    }

    pub fn in_bounds(&self, pos: Pos) -> bool {
        (pos.row as usize) < self.height && (pos.col as usize) < self.width
    }

    /// All in-bounds positions, row-major.
    pub fn all_pos(&self) -> Vec<Pos> {
        let mut out = vec![];
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(Pos::new(y as u8, x as u8));
            }
        }
        out
    }

    /// Screen at `pos`; positions past the stored grid read as the empty screen.
    pub fn get(&self, pos: Pos) -> &'a Metascreen {
        let uid = self
            .screens
            .get(pos.packed() as usize)
            .copied()
            .unwrap_or(self.tileset.empty);
        self.catalog.screen(uid)
    }

    pub fn set(&mut self, pos: Pos, screen: Option<&Metascreen>) {
        let idx = pos.packed() as usize;
        if idx >= self.screens.len() {
            self.screens.resize((idx | 0xf) + 1, self.tileset.empty);
        }
        self.screens[idx] = screen.map_or(self.tileset.empty, |s| s.uid);
    }

    /// Places a block of screens with its top-left corner at `pos`, skipping `None`s.
    pub fn set2d(&mut self, pos: Pos, screens: &[Vec<Option<&Metascreen>>]) {
        for (dy, row) in screens.iter().enumerate() {
            for (dx, scr) in row.iter().enumerate() {
                let Some(scr) = scr else { continue };
                if let Some(p) = pos.offset(dy as i32, dx as i32) {
                    self.set(p, Some(scr));
                }
            }
        }
    }

    pub fn screen_names(&self) -> Vec<Vec<String>> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| self.get(Pos::new(y as u8, x as u8)).name().to_string())
                    .collect()
            })
            .collect()
    }

    /// Text rendering of the grid using each screen's icon.
    pub fn show(&self) -> String {
        let mut lines = vec![];
        let border = format!("+{}+", "---".repeat(self.width));
        lines.push(border.clone());
        for y in 0..self.height {
            let mut rows = [String::from("|"), String::from("|"), String::from("|")];
            for x in 0..self.width {
                let scr = self.get(Pos::new(y as u8, x as u8));
                match &scr.data.icon {
                    Some(icon) => {
                        for i in 0..3 {
                            rows[i].push_str(&icon.full[i]);
                        }
                    }
                    None => {
                        rows[0].push_str("   ");
                        rows[1].push_str(if scr.is_empty() { "   " } else { " ? " });
                        rows[2].push_str("   ");
                    }
                }
            }
            for mut row in rows {
                row.push('|');
                lines.push(row);
            }
        }
        lines.push(border);
        lines.join("\n")
    }

    /// Checks that every pair of adjacent non-empty screens agrees on its shared edge.
    pub fn validate(&self) -> Result<()> {
        for dir in 0..2 {
            let y0 = if dir == 0 { 1 } else { 0 };
            for y in y0..self.height {
                for x in dir..self.width {
                    let pos0 = Pos::new(y as u8, x as u8);
                    let pos1 = if dir == 0 {
                        Pos::new(y as u8 - 1, x as u8)
                    } else {
                        Pos::new(y as u8, x as u8 - 1)
                    };
                    let scr0 = self.get(pos0);
                    let scr1 = self.get(pos1);
                    if scr0.is_empty() || scr1.is_empty() {
                        continue;
                    }
                    if !scr1.check_neighbor(scr0, dir) {
                        bail!(
                            "bad neighbor {} ({pos1}) {} {} ({pos0})",
                            scr1.name(),
                            DIR_NAME[dir],
                            scr0.name()
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Replaces columns `left..left + deleted` of every row with `inserted`
    /// columns from `screens`, shifting the rest of the grid and the pits.
    /// Exits and raw spawn records are handled by `World::splice_columns`.
    pub fn splice_screens(
        &mut self,
        left: usize,
        deleted: usize,
        inserted: usize,
        screens: &[Vec<&Metascreen>],
    ) -> Result<()> {
        ensure!(left + deleted <= self.width, "splice past the right edge of {:02x}", self.id);
        let new_width = self.width + inserted - deleted;
        ensure!(new_width <= 16, "splice makes {:02x} too wide: {new_width}", self.id);
        ensure!(
            screens.len() >= self.height && screens.iter().all(|row| row.len() == inserted),
            "splice into {:02x} needs {} rows of {inserted} screens",
            self.id,
            self.height
        );
        for y in 0..self.height {
            let start = y << 4;
            let old: Vec<ScreenUid> = self.screens[start..start + 16].to_vec();
            let mut row: Vec<ScreenUid> = old[..left].to_vec();
            row.extend(screens[y].iter().map(|s| s.uid));
            row.extend_from_slice(&old[left + deleted..self.width]);
            row.resize(16, self.tileset.empty);
            self.screens[start..start + 16].copy_from_slice(&row);
        }
        let delta = inserted as i32 - deleted as i32;
        let mut pits = BTreeMap::new();
        for (&pos, &dest) in &self.pits {
            let x = pos.col as usize;
            if x < left {
                pits.insert(pos, dest);
            } else if x >= left + deleted {
                let p = pos.offset(0, delta).context("pit shifted off the grid")?;
                pits.insert(p, dest);
            }
        }
        self.pits = pits;
        self.width = new_width;
        Ok(())
    }

    // Exit table

    pub fn get_exit(&self, pos: Pos, kind: ConnectionType) -> Option<ExitSpec> {
        self.exits.get(&(pos, kind)).copied()
    }

    pub fn set_exit_one_way(&mut self, pos: Pos, kind: ConnectionType, spec: ExitSpec) {
        self.exits.insert((pos, kind), spec);
    }

    pub fn delete_exit(&mut self, pos: Pos, kind: ConnectionType) -> Option<ExitSpec> {
        self.exits.remove(&(pos, kind))
    }

    pub fn exits(&self) -> impl Iterator<Item = (Pos, ConnectionType, ExitSpec)> + '_ {
        self.exits.iter().map(|(&(pos, kind), &spec)| (pos, kind, spec))
    }

    pub fn exits_at(&self, pos: Pos) -> impl Iterator<Item = (ConnectionType, ExitSpec)> + '_ {
        self.exits
            .range((pos, ConnectionType::StairUp)..=(pos, ConnectionType::Windmill))
            .map(|(&(_, kind), &spec)| (kind, spec))
    }

    pub(crate) fn clear_exits(&mut self) {
        self.exits.clear();
    }

    pub fn pits(&self) -> &BTreeMap<Pos, LocPos> {
        &self.pits
    }

    pub fn set_pit(&mut self, pos: Pos, dest: LocPos) {
        self.pits.insert(pos, dest);
    }

    pub fn delete_pit(&mut self, pos: Pos) -> Option<LocPos> {
        self.pits.remove(&pos)
    }

    /// The only exit type already recorded at `pos`, falling back to the screen's.
    pub fn pick_type_from_exits(&self, pos: Pos) -> Result<ConnectionType> {
        let types: Vec<ConnectionType> = self.exits_at(pos).map(|(t, _)| t).collect();
        match types.as_slice() {
            [] => self.pick_type_from_screens(pos),
            [t] => Ok(*t),
            _ => bail!("Too many exits at {:02x}:{pos}: {types:?}", self.id),
        }
    }

    /// The only exit type the screen at `pos` supports.
    pub fn pick_type_from_screens(&self, pos: Pos) -> Result<ConnectionType> {
        let scr = self.get(pos);
        match scr.exits() {
            [exit] => Ok(exit.kind),
            exits => bail!(
                "Cannot pick exit type at {:02x}:{pos} ({}): {} exits",
                self.id,
                scr.name(),
                exits.len()
            ),
        }
    }

    /// Full tile keys (pos << 8 | yx) of the raw exit tiles for the exit of
    /// the given type at `pos`.
    pub fn find_exit_tiles(&self, pos: Pos, kind: ConnectionType) -> Result<Vec<TileKey>> {
        let scr = self.get(pos);
        let con = scr.find_exit_by_type(kind).with_context(|| {
            format!("no {kind} exit on {} at {:02x}:{pos}", scr.name(), self.id)
        })?;
        Ok(con.exits.iter().map(|&t| pos.tile_key(t as u32)).collect())
    }

    /// Screens of this tileset that offer an exit of the given type.
    pub fn exit_candidates(&self, kind: ConnectionType) -> Vec<&'a Metascreen> {
        self.tileset
            .screens()
            .iter()
            .map(|&uid| self.catalog.screen(uid))
            .filter(|s| s.exits().iter().any(|e| e.kind == kind))
            .collect()
    }

    /// Exit type behind an exit-marker tile key, if the exit is usable here.
    /// Edge exits only count on the matching edge of the grid.
    pub fn exit_type(&self, edge: TileKey) -> Option<ConnectionType> {
        if edge & 0xf0 != 0xe0 {
            return None;
        }
        let pos = Pos::from_packed(((edge >> 8) & 0xff) as u8);
        let scr = self.get(pos);
        let kind = scr.exits().get((edge & 0xf) as usize)?.kind;
        let on_edge = match kind {
            ConnectionType::EdgeTop => pos.row == 0,
            ConnectionType::EdgeLeft => pos.col == 0,
            ConnectionType::EdgeBottom => pos.row as usize + 1 == self.height,
            ConnectionType::EdgeRight => pos.col as usize + 1 == self.width,
            _ => true,
        };
        on_edge.then_some(kind)
    }

    pub fn traverse(&self, opts: &TraverseOpts) -> Traversal {
        traverse(self, opts)
    }
}

// Chooses among screens sharing a raw id, using match predicates first and
// otherwise preferring screens whose flag expectations fit the raw flag.
fn pick_screen(
    location: &Location,
    catalog: &ScreenCatalog,
    uids: &[ScreenUid],
    pos: Pos,
    reachable: &HashSet<TileKey>,
) -> Option<ScreenUid> {
    let flag = location.flags.iter().find(|f| f.screen == pos.packed());
    let mut matchers: Vec<&Metascreen> = vec![];
    let mut best: VecDeque<ScreenUid> = VecDeque::new();
    for &uid in uids {
        let s = catalog.screen(uid);
        if s.data.matcher.is_some() {
            matchers.push(s);
        } else if (s.data.flag == Some(FlagKind::Always)
            && flag.map(|f| f.flag) == Some(FlagRef::Fixed(ALWAYS_TRUE)))
            || (s.data.flag.is_none() && s.data.wall.is_none() && flag.is_none())
        {
            best.push_front(uid);
        } else {
            best.push_back(uid);
        }
    }
    let (x, y) = (pos.col as i32, pos.row as i32);
    let reach = |dy: i32, dx: i32| {
        let x0 = (x << 8) + dx;
        let y0 = (y << 8) + dy;
        if x0 < 0 || y0 < 0 {
            return false;
        }
        let t = ((y0 << 4) & 0xf000) | (x0 & 0xf00) | (y0 & 0xf0) | ((x0 >> 4) & 0xf);
        reachable.contains(&(t as TileKey))
    };
    for m in matchers {
        if let Some(matcher) = &m.data.matcher {
            if matcher.matches(reach, flag.is_some()) {
                return Some(m.uid);
            }
        }
    }
    best.front().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crysrando_game::{CatalogData, Connection, MetascreenData};

    fn data(name: &str, id: ScreenId, edges: &str, connect: &str, exits: Vec<Connection>) -> MetascreenData {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "id": id,
            "tilesets": ["cave"],
            "edges": edges,
            "connect": connect,
            "exits": exits,
        }))
        .unwrap()
    }

    fn edge_exit(kind: ConnectionType) -> Connection {
        Connection {
            kind,
            dir: 0,
            entrance: 0x8078,
            exits: vec![0x07],
            allowed_exits: vec![],
        }
    }

    fn catalog() -> ScreenCatalog {
        let mut empty = data("empty", 0x80, "    ", "", vec![]);
        empty.feature = vec![crysrando_game::Feature::Empty];
        ScreenCatalog::new(CatalogData {
            screens: vec![
                empty,
                data("hall", 0x01, " c c", "6e", vec![]),
                data("shaft", 0x02, "c c ", "2a", vec![]),
                data("top", 0x03, "c c ", "2ax", vec![edge_exit(ConnectionType::EdgeTop)]),
                data("right", 0x04, " c c", "6ex", vec![edge_exit(ConnectionType::EdgeRight)]),
            ],
            tilesets: vec![serde_json::from_value(serde_json::json!({
                "name": "cave", "tilesetId": 0x88, "tileEffects": 0xb9, "empty": "empty"
            }))
            .unwrap()],
        })
        .unwrap()
    }

    #[test]
    fn test_validate() {
        let catalog = catalog();
        let ts = catalog.tileset("cave").unwrap();
        let hall = catalog.screen_by_name("hall").unwrap();
        let shaft = catalog.screen_by_name("shaft").unwrap();
        let mut meta = Metalocation::new(1, &catalog, ts, 2, 2);
        meta.set(Pos::new(0, 0), Some(hall));
        meta.set(Pos::new(0, 1), Some(hall));
        meta.validate().unwrap();
        meta.set(Pos::new(0, 1), Some(shaft));
        let err = meta.validate().unwrap_err().to_string();
        assert_eq!(err, "bad neighbor hall (00) left of shaft (01)");
        meta.set(Pos::new(0, 1), None);
        meta.set(Pos::new(1, 0), Some(shaft));
        let err = meta.validate().unwrap_err().to_string();
        assert_eq!(err, "bad neighbor hall (00) above shaft (10)");
    }

    #[test]
    fn test_exit_type_on_edges() {
        let catalog = catalog();
        let ts = catalog.tileset("cave").unwrap();
        let top = catalog.screen_by_name("top").unwrap();
        let right = catalog.screen_by_name("right").unwrap();
        let mut meta = Metalocation::new(1, &catalog, ts, 2, 2);
        meta.set(Pos::new(0, 0), Some(top));
        meta.set(Pos::new(1, 0), Some(top));
        meta.set(Pos::new(1, 1), Some(right));
        assert_eq!(meta.exit_type(0x00e0), Some(ConnectionType::EdgeTop));
        assert_eq!(meta.exit_type(0x10e0), None);
        assert_eq!(meta.exit_type(0x11e0), Some(ConnectionType::EdgeRight));
        assert_eq!(meta.exit_type(0x0020), None);
        assert_eq!(meta.exit_type(0x00e1), None);
        meta.set(Pos::new(0, 1), Some(right));
        meta.set_width(3);
        assert_eq!(meta.exit_type(0x01e0), None);
    }

    #[test]
    fn test_traverse_joins_neighbors() {
        let catalog = catalog();
        let ts = catalog.tileset("cave").unwrap();
        let hall = catalog.screen_by_name("hall").unwrap();
        let shaft = catalog.screen_by_name("shaft").unwrap();
        let mut meta = Metalocation::new(1, &catalog, ts, 2, 2);
        meta.set(Pos::new(0, 0), Some(hall));
        meta.set(Pos::new(0, 1), Some(hall));
        meta.set(Pos::new(1, 0), Some(shaft));
        let t = meta.traverse(&TraverseOpts::default());
        assert!(t.connected(0x0020, 0x0120));
        assert!(t.connected(0x0020, 0x0220));
        assert!(!t.connected(0x0020, 0x1002));
        let mut with = HashMap::new();
        with.insert(Pos::new(0, 1), shaft.uid);
        let t = meta.traverse(&TraverseOpts {
            with: Some(&with),
            ..Default::default()
        });
        assert!(!t.connected(0x0020, 0x0220));
    }

    #[test]
    fn test_splice_screens() {
        let catalog = catalog();
        let ts = catalog.tileset("cave").unwrap();
        let hall = catalog.screen_by_name("hall").unwrap();
        let shaft = catalog.screen_by_name("shaft").unwrap();
        let mut meta = Metalocation::new(1, &catalog, ts, 1, 5);
        for x in 0..5 {
            meta.set(Pos::new(0, x), Some(hall));
        }
        meta.set(Pos::new(0, 4), Some(shaft));
        meta.set_pit(Pos::new(0, 3), LocPos::new(2, Pos::new(0, 0)));
        meta.set_pit(Pos::new(0, 2), LocPos::new(2, Pos::new(0, 1)));
        meta.splice_screens(2, 1, 2, &[vec![shaft, shaft]]).unwrap();
        assert_eq!(meta.width(), 6);
        let names: Vec<String> = meta.screen_names().remove(0);
        assert_eq!(names, vec!["hall", "hall", "shaft", "shaft", "hall", "shaft"]);
        assert_eq!(meta.pits().keys().copied().collect::<Vec<_>>(), vec![Pos::new(0, 4)]);
        assert!(meta.splice_screens(0, 0, 1, &[vec![]]).is_err());
    }

    #[test]
    fn test_pick_type() {
        let catalog = catalog();
        let ts = catalog.tileset("cave").unwrap();
        let mut meta = Metalocation::new(1, &catalog, ts, 1, 2);
        meta.set(Pos::new(0, 0), Some(catalog.screen_by_name("top").unwrap()));
        meta.set(Pos::new(0, 1), Some(catalog.screen_by_name("hall").unwrap()));
        assert_eq!(meta.pick_type_from_exits(Pos::new(0, 0)).unwrap(), ConnectionType::EdgeTop);
        assert!(meta.pick_type_from_screens(Pos::new(0, 1)).is_err());
        let spec = ExitSpec::new(2, Pos::new(0, 0), ConnectionType::Cave);
        meta.set_exit_one_way(Pos::new(0, 1), ConnectionType::Cave, spec);
        assert_eq!(meta.pick_type_from_exits(Pos::new(0, 1)).unwrap(), ConnectionType::Cave);
        meta.set_exit_one_way(Pos::new(0, 1), ConnectionType::Door, spec);
        assert!(meta.pick_type_from_exits(Pos::new(0, 1)).is_err());
        assert_eq!(
            meta.find_exit_tiles(Pos::new(0, 0), ConnectionType::EdgeTop).unwrap(),
            vec![0x0007]
        );
        assert_eq!(meta.exit_candidates(ConnectionType::EdgeTop).len(), 1);
    }
}

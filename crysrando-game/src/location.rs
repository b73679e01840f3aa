use crate::flags::FlagRef;
use crate::{LocationId, Pos, TilesetId};
use anyhow::{Result, bail};
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

/// Raw location records as they sit in the ROM tables.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: LocationId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub used: bool,
    pub width: usize,
    pub height: usize,
    pub screens: Vec<Vec<u8>>, // [row][col] raw screen ids
    pub tileset: TilesetId,
    #[serde(default)]
    pub tile_effects: u8,
    #[serde(default)]
    pub entrances: Vec<Entrance>,
    #[serde(default)]
    pub exits: Vec<Exit>,
    #[serde(default)]
    pub flags: Vec<LocationFlag>,
    #[serde(default)]
    pub pits: Vec<Pit>,
    #[serde(default)]
    pub spawns: Vec<Spawn>,
    #[serde(default)]
    pub sprite_palettes: [u8; 2],
    #[serde(default)]
    pub sprite_patterns: [u8; 2],
}

fn default_true() -> bool {
    true
}

impl Location {
    pub fn screen_id(&self, pos: Pos) -> Option<u8> {
        self.screens
            .get(pos.row as usize)
            .and_then(|row| row.get(pos.col as usize))
            .copied()
    }

    /// Index of the entrance at the given screen and coordinate, appending one if needed.
    pub fn find_or_add_entrance(&mut self, screen: Pos, coord: u16) -> Result<u8> {
        for (i, entrance) in self.entrances.iter().enumerate() {
            if entrance.screen() == screen && entrance.coord() == coord {
                return Ok(i as u8);
            }
        }
        if self.entrances.len() >= 0x20 {
            bail!("too many entrances in {:02x}", self.id);
        }
        self.entrances.push(Entrance::new(screen, coord));
        Ok((self.entrances.len() - 1) as u8)
    }
}

/// Entrance: full pixel coordinates of where the player appears.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entrance {
    pub x: u16,
    pub y: u16,
}

impl Entrance {
    pub fn new(screen: Pos, coord: u16) -> Self {
        Entrance {
            x: ((screen.col as u16) << 8) | (coord & 0xff),
            y: ((screen.row as u16) << 8) | (coord >> 8),
        }
    }

    pub fn screen(&self) -> Pos {
        Pos::new(((self.y >> 8) & 0xf) as u8, ((self.x >> 8) & 0xf) as u8)
    }

    /// yyxx within the screen.
    pub fn coord(&self) -> u16 {
        ((self.y & 0xff) << 8) | (self.x & 0xff)
    }

    pub fn tile(&self) -> u8 {
        (self.y & 0xf0) as u8 | ((self.x >> 4) & 0xf) as u8
    }

    pub fn used(&self) -> bool {
        (self.x >> 8) < 8
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Exit {
    pub screen: u8, // yx
    pub tile: u8,   // yx
    pub dest: LocationId,
    pub entrance: u8,
}

impl Exit {
    pub fn pos(&self) -> Pos {
        Pos::from_packed(self.screen)
    }

    /// 8-bit y tile: screen row in the high nibble.
    pub fn yt(&self) -> u8 {
        (self.screen & 0xf0) | (self.tile >> 4)
    }

    pub fn is_seamless(&self) -> bool {
        self.entrance & 0x20 != 0
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationFlag {
    pub screen: u8,
    pub flag: FlagRef,
}

impl LocationFlag {
    pub fn pos(&self) -> Pos {
        Pos::from_packed(self.screen)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pit {
    pub from_screen: u8,
    pub to_screen: u8,
    pub dest: LocationId,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum SpawnKind {
    Monster = 0,
    Npc = 1, // includes bosses
    Chest = 2, // includes triggers
    Wall = 3,
    Generic = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WallType {
    Wall,
    Bridge,
}

/// Four-byte spawn record:
/// `[yt, timed<<7 | xt, bank<<7 | xhalf<<6 | wall bits | type, id]`, with `yt == 0xfe` for unused.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spawn {
    pub data: [u8; 4],
}

impl Spawn {
    pub fn new(kind: SpawnKind, id: u8, screen: Pos, tile: u8) -> Self {
        let mut spawn = Spawn {
            data: [0, 0, kind as u8, id],
        };
        spawn.set_screen(screen);
        spawn.set_tile(tile);
        spawn
    }

    pub fn kind(&self) -> Result<SpawnKind> {
        match SpawnKind::try_from(self.data[2] & 0x07) {
            Ok(kind) => Ok(kind),
            Err(_) => bail!("bad spawn type in {:02x?}", self.data),
        }
    }

    fn raw_type(&self) -> u8 {
        self.data[2] & 0x07
    }

    pub fn id(&self) -> u8 {
        self.data[3]
    }

    pub fn set_id(&mut self, id: u8) {
        self.data[3] = id;
    }

    pub fn used(&self) -> bool {
        self.data[0] != 0xfe
    }

    pub fn set_used(&mut self, used: bool) {
        self.data[0] = if used { 0 } else { 0xfe };
    }

    pub fn timed(&self) -> bool {
        self.data[1] & 0x80 != 0
    }

    pub fn set_timed(&mut self, timed: bool) {
        self.data[1] = (self.data[1] & 0x7f) | if timed { 0x80 } else { 0 };
    }

    pub fn pattern_bank(&self) -> u8 {
        self.data[2] >> 7
    }

    pub fn set_pattern_bank(&mut self, bank: u8) {
        self.data[2] = (self.data[2] & 0x7f) | ((bank & 1) << 7);
    }

    /// 12-bit pixel y.
    pub fn y(&self) -> u16 {
        (self.data[0] as u16) << 4
    }

    pub fn set_y(&mut self, y: u16) {
        self.data[0] = (y >> 4) as u8;
    }

    /// 11-bit pixel x (half-tile resolution).
    pub fn x(&self) -> u16 {
        (((self.data[1] & 0x7f) as u16) << 4) | (((self.data[2] & 0x40) as u16) >> 3)
    }

    pub fn set_x(&mut self, x: u16) {
        self.data[1] = (self.data[1] & 0x80) | ((x >> 4) & 0x7f) as u8;
        self.data[2] = (self.data[2] & !0x40) | (((x & 8) << 3) as u8);
    }

    pub fn yt(&self) -> u8 {
        self.data[0]
    }

    pub fn set_yt(&mut self, yt: u8) {
        self.data[0] = yt;
    }

    pub fn xt(&self) -> u8 {
        self.data[1] & 0x7f
    }

    pub fn set_xt(&mut self, xt: u8) {
        self.data[1] = (self.data[1] & 0x80) | (xt & 0x7f);
    }

    pub fn screen(&self) -> Pos {
        Pos::new(self.data[0] >> 4, (self.data[1] >> 4) & 0x7)
    }

    pub fn set_screen(&mut self, pos: Pos) {
        self.data[0] = (pos.row << 4) | (self.data[0] & 0x0f);
        self.data[1] = (self.data[1] & 0x8f) | ((pos.col & 0x7) << 4);
    }

    pub fn tile(&self) -> u8 {
        ((self.data[0] & 0x0f) << 4) | (self.data[1] & 0x0f)
    }

    pub fn set_tile(&mut self, tile: u8) {
        self.data[0] = (self.data[0] & 0xf0) | (tile >> 4);
        self.data[1] = (self.data[1] & 0xf0) | (tile & 0x0f);
    }

    /// 16-bit pixel coordinate within the screen (y0xx).
    pub fn coord(&self) -> u16 {
        (((self.data[0] & 0x0f) as u16) << 12)
            | (((self.data[1] & 0x0f) as u16) << 4)
            | (((self.data[2] & 0x40) as u16) >> 3)
    }

    pub fn set_coord(&mut self, coord: u16) {
        self.data[0] = (self.data[0] & 0xf0) | (coord >> 12) as u8;
        self.data[1] = (self.data[1] & 0xf0) | ((coord >> 4) & 0x0f) as u8;
        self.data[2] = (self.data[2] & !0x40) | (((coord & 8) << 3) as u8);
    }

    /// Object id of a monster spawn.
    pub fn monster_id(&self) -> u8 {
        self.data[3].wrapping_add(0x50)
    }

    pub fn set_monster_id(&mut self, id: u8) {
        self.data[3] = id.wrapping_sub(0x50);
    }

    pub fn is_chest(&self) -> bool {
        self.raw_type() == 2 && self.id() < 0x80
    }

    pub fn is_trigger(&self) -> bool {
        self.raw_type() == 2 && self.id() >= 0x80
    }

    pub fn is_npc(&self) -> bool {
        self.raw_type() == 1 && self.id() < 0xc0
    }

    pub fn is_boss(&self) -> bool {
        self.raw_type() == 1 && self.id() >= 0xc0
    }

    pub fn is_monster(&self) -> bool {
        self.raw_type() == 0
    }

    pub fn is_generic(&self) -> bool {
        self.raw_type() == 4
    }

    pub fn is_wall(&self) -> bool {
        self.raw_type() == 3 && (self.id() < 4 || self.data[2] & 0x20 != 0)
    }

    pub fn wall_type(&self) -> Option<WallType> {
        if self.raw_type() != 3 {
            return None;
        }
        let obj = if self.data[2] & 0x20 != 0 { self.id() >> 4 } else { self.id() };
        match obj {
            2 => Some(WallType::Bridge),
            0..=3 => Some(WallType::Wall),
            _ => None,
        }
    }
}

/// Difference of two y tiles, skipping the missing 16th tile row of each screen.
pub fn yt_diff(yt1: u8, yt0: u8) -> i32 {
    let dy = yt1 as i32 - yt0 as i32;
    dy - ((yt1 >> 4) as i32 - (yt0 >> 4) as i32)
}

/// Adds a tile-row delta to a y tile, carrying across 15-row screens.
pub fn yt_add(yt: u8, dy: i32) -> u8 {
    let subscreen = dy % 15;
    let screens = (dy - subscreen) / 15;
    let mut ys1 = (yt >> 4) as i32 + screens;
    let mut yt1 = (yt & 0xf) as i32 + subscreen;
    if yt1 < 0 {
        ys1 -= 1;
        yt1 += 0xf;
    } else if yt1 >= 0xf {
        ys1 += 1;
        yt1 -= 0xf;
    }
    ((ys1.clamp(0, 0xf) << 4) | yt1) as u8
}

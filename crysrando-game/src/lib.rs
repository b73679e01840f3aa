// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod flags;
pub mod location;
pub mod sprites;

use anyhow::{Context, Result, bail, ensure};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use strum_macros::{Display, EnumString, IntoStaticStr};

pub type LocationId = u8;
pub type FlagId = u16;
pub type TilesetId = u8;
pub type ScreenId = i32; // Raw screen id; negative for screens not yet placed in the ROM
pub type ScreenUid = usize; // Index into ScreenCatalog screens
pub type TileKey = u32; // pos << 8 | offset, see Metascreen::connections

/// Screen position within a location's grid. Locations are at most 16 screens wide.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub row: u8,
    pub col: u8,
}

impl Pos {
    pub const fn new(row: u8, col: u8) -> Self {
        Pos { row, col }
    }

    pub fn from_packed(yx: u8) -> Self {
        Pos {
            row: yx >> 4,
            col: yx & 0xf,
        }
    }

    pub fn packed(self) -> u8 {
        (self.row << 4) | (self.col & 0xf)
    }

    pub fn tile_key(self, offset: u32) -> TileKey {
        ((self.packed() as TileKey) << 8) + offset
    }

    pub fn offset(self, drow: i32, dcol: i32) -> Option<Pos> {
        let row = self.row as i32 + drow;
        let col = self.col as i32 + dcol;
        if (0..16).contains(&row) && (0..16).contains(&col) {
            Some(Pos::new(row as u8, col as u8))
        } else {
            None
        }
    }

    pub fn distance2(self, other: Pos) -> i32 {
        let dy = self.row as i32 - other.row as i32;
        let dx = self.col as i32 - other.col as i32;
        dy * dy + dx * dx
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.packed())
    }
}

/// Screen position qualified by its location.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocPos {
    pub location: LocationId,
    pub pos: Pos,
}

impl LocPos {
    pub const fn new(location: LocationId, pos: Pos) -> Self {
        LocPos { location, pos }
    }

    pub fn packed(self) -> u16 {
        ((self.location as u16) << 8) | self.pos.packed() as u16
    }
}

impl fmt::Display for LocPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.packed())
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    IntoStaticStr,
    Display,
    Serialize,
    Deserialize,
)]
pub enum ConnectionType {
    #[strum(serialize = "stair:up")]
    #[serde(rename = "stair:up")]
    StairUp,
    #[strum(serialize = "stair:down")]
    #[serde(rename = "stair:down")]
    StairDown,
    #[strum(serialize = "edge:top")]
    #[serde(rename = "edge:top")]
    EdgeTop,
    #[strum(serialize = "edge:bottom")]
    #[serde(rename = "edge:bottom")]
    EdgeBottom,
    #[strum(serialize = "edge:left")]
    #[serde(rename = "edge:left")]
    EdgeLeft,
    #[strum(serialize = "edge:right")]
    #[serde(rename = "edge:right")]
    EdgeRight,
    #[strum(serialize = "seamless:up")]
    #[serde(rename = "seamless:up")]
    SeamlessUp,
    #[strum(serialize = "seamless:down")]
    #[serde(rename = "seamless:down")]
    SeamlessDown,
    #[strum(serialize = "cave")]
    #[serde(rename = "cave")]
    Cave,
    #[strum(serialize = "crypt")]
    #[serde(rename = "crypt")]
    Crypt,
    #[strum(serialize = "door")]
    #[serde(rename = "door")]
    Door,
    #[strum(serialize = "door2")]
    #[serde(rename = "door2")]
    Door2,
    #[strum(serialize = "door3")]
    #[serde(rename = "door3")]
    Door3,
    #[strum(serialize = "fortress")]
    #[serde(rename = "fortress")]
    Fortress,
    #[strum(serialize = "gate")]
    #[serde(rename = "gate")]
    Gate,
    #[strum(serialize = "swamp")]
    #[serde(rename = "swamp")]
    Swamp,
    #[strum(serialize = "teleporter")]
    #[serde(rename = "teleporter")]
    Teleporter,
    #[strum(serialize = "windmill")]
    #[serde(rename = "windmill")]
    Windmill,
}

impl ConnectionType {
    pub fn is_edge(self) -> bool {
        self.edge_dir().is_some()
    }

    pub fn is_seamless(self) -> bool {
        matches!(self, ConnectionType::SeamlessUp | ConnectionType::SeamlessDown)
    }

    /// Direction index (0 = up, 1 = left, 2 = down, 3 = right) for edge exits.
    pub fn edge_dir(self) -> Option<usize> {
        match self {
            ConnectionType::EdgeTop => Some(0),
            ConnectionType::EdgeLeft => Some(1),
            ConnectionType::EdgeBottom => Some(2),
            ConnectionType::EdgeRight => Some(3),
            _ => None,
        }
    }

    pub fn seamless_opposite(self) -> Option<ConnectionType> {
        match self {
            ConnectionType::SeamlessUp => Some(ConnectionType::SeamlessDown),
            ConnectionType::SeamlessDown => Some(ConnectionType::SeamlessUp),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Feature {
    Empty,
    Pit,
    Arena,
    Spikes,
    Bridge,
    Wall,
    Ramp,
    River,
    Overpass,
    Underpass,
    Whirlpool,
    Deadend,
    Lake,
    Lighthouse,
    Cabin,
    Windmill,
    Altar,
    Pyramid,
    Crypt,
    Consolidate,
    Portoa1,
    Portoa2,
    Portoa3,
}

/// How a screen's location flag is chosen when writing a location back out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "calm")]
    Calm,
    #[serde(rename = "custom:true")]
    CustomTrue,
    #[serde(rename = "custom:false")]
    CustomFalse,
}

impl FlagKind {
    pub fn is_custom(self) -> bool {
        matches!(self, FlagKind::CustomTrue | FlagKind::CustomFalse)
    }
}

/// One exit socket on a screen.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    #[serde(default)]
    pub dir: u8,
    pub entrance: u32, // yyxx within the screen; values above 0xffff straddle into the next row
    pub exits: Vec<u8>, // yx tiles; 0xf_ rows belong to the screen below
    #[serde(default)]
    pub allowed_exits: Vec<u8>,
}

impl Connection {
    fn has_tile(&self, tile: u32) -> bool {
        self.exits.iter().chain(self.allowed_exits.iter()).any(|&t| t as u32 == tile)
    }
}

fn default_poi_dy() -> i32 {
    0x70
}

fn default_poi_dx() -> i32 {
    0x78
}

/// Point of interest: a pixel offset within the screen where a spawn may be placed.
/// Lower priority values are consumed first.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Poi {
    pub priority: usize,
    #[serde(default = "default_poi_dy")]
    pub dy: i32,
    #[serde(default = "default_poi_dx")]
    pub dx: i32,
}

/// Declarative reachability predicate used to tell apart screens that share a raw id.
/// Probes are (dy, dx) pixel offsets from the screen's top-left corner.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenMatch {
    #[serde(default)]
    pub reachable: Vec<(i32, i32)>,
    #[serde(default)]
    pub unreachable: Vec<(i32, i32)>,
    #[serde(default)]
    pub flag: Option<bool>,
}

impl ScreenMatch {
    pub fn matches(&self, reach: impl Fn(i32, i32) -> bool, flag: bool) -> bool {
        if let Some(f) = self.flag {
            if f != flag {
                return false;
            }
        }
        self.reachable.iter().all(|&(dy, dx)| reach(dy, dx))
            && self.unreachable.iter().all(|&(dy, dx)| !reach(dy, dx))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Icon {
    pub short: String,
    pub full: [String; 3],
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MetascreenData {
    pub name: String,
    pub id: ScreenId,
    #[serde(default)]
    pub tilesets: Vec<String>,
    #[serde(default)]
    pub feature: Vec<Feature>,
    #[serde(default)]
    pub edges: Option<String>, // up, left, down, right
    #[serde(default)]
    pub connect: Option<String>,
    #[serde(default)]
    pub exits: Vec<Connection>,
    #[serde(default)]
    pub wall: Option<u8>, // yx tile of the wall/bridge spawn
    #[serde(default)]
    pub flag: Option<FlagKind>,
    #[serde(default, rename = "match")]
    pub matcher: Option<ScreenMatch>,
    #[serde(default)]
    pub poi: Vec<Poi>,
    #[serde(default)]
    pub statues: Vec<u8>, // tile rows
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub icon: Option<Icon>,
}

const CONNECTION_BLOCKS: [&str; 4] = ["|:", "|:=-", "|", "|="];

#[derive(Clone, Debug)]
pub struct Metascreen {
    pub uid: ScreenUid,
    pub data: MetascreenData,
    // Per traversal variant ((flight ? 2 : 0) | (no_flagged ? 1 : 0)), the
    // connected segments of tile-key offsets within this screen.
    pub connections: [Vec<Vec<TileKey>>; 4],
    edges: Option<[char; 4]>,
}

impl Metascreen {
    pub fn new(uid: ScreenUid, data: MetascreenData) -> Result<Self> {
        let edges = match &data.edges {
            None => None,
            Some(e) => {
                let chars: Vec<char> = e.chars().collect();
                ensure!(chars.len() == 4, "bad edges {e:?} for {}", data.name);
                Some([chars[0], chars[1], chars[2], chars[3]])
            }
        };
        let connections = parse_connections(&data)?;
        Ok(Metascreen {
            uid,
            data,
            connections,
            edges,
        })
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn sid(&self) -> ScreenId {
        self.data.id
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.data.feature.contains(&feature)
    }

    pub fn is_empty(&self) -> bool {
        self.has_feature(Feature::Empty)
    }

    pub fn exits(&self) -> &[Connection] {
        &self.data.exits
    }

    /// Edge characters (up, left, down, right); blank when the screen declares none.
    pub fn edges(&self) -> [char; 4] {
        self.edges.unwrap_or([' '; 4])
    }

    /// Bitmask of the directions whose edge character is `c`.
    pub fn edge_index(&self, c: char) -> u8 {
        let mut index = 0;
        for (i, &e) in self.edges().iter().enumerate() {
            if e == c {
                index |= 1 << i;
            }
        }
        index
    }

    pub fn find_exit_by_type(&self, kind: ConnectionType) -> Option<&Connection> {
        self.data.exits.iter().find(|c| c.kind == kind)
    }

    /// Finds the exit socket containing a raw exit tile. Single-row locations
    /// clamp bottom-edge exits up by two tile rows.
    pub fn find_exit_type(&self, tile: u8, single: bool, seamless: bool) -> Option<&Connection> {
        for exit in &self.data.exits {
            if exit.kind.is_seamless() != seamless {
                continue;
            }
            let mut t0 = tile as u32;
            if single && exit.kind == ConnectionType::EdgeBottom && tile >= 0xc0 {
                t0 += 0x20;
            }
            if exit.has_tile(t0) {
                return Some(exit);
            }
        }
        None
    }

    /// Finds the exit socket an entrance at `coord` (yyxx) lands on.
    pub fn find_entrance_type(&self, coord: u32, single: bool) -> Option<ConnectionType> {
        for exit in &self.data.exits {
            if exit.kind.is_seamless() {
                continue;
            }
            let c0 = if single && exit.kind == ConnectionType::EdgeBottom && coord >= 0xbf00 {
                coord + 0x2000
            } else {
                coord
            };
            let t0 = ((c0 & 0xf0) >> 4) | ((c0 & 0xf000) >> 8);
            if exit.entrance == c0 || exit.has_tile(t0) {
                return Some(exit.kind);
            }
        }
        None
    }

    /// Whether `that` may sit below (dir 0) or to the right of (dir 1) this screen.
    ///
    /// A `'*'` edge is unmatched: it only goes on the border of the map, so it
    /// is compatible with no neighbor, not even another `'*'`.
    pub fn check_neighbor(&self, that: &Metascreen, dir: usize) -> bool {
        let (Some(e1), Some(e2)) = (self.edges, that.edges) else {
            return false;
        };
        let (mine, theirs) = if dir == 0 { (e1[2], e2[0]) } else { (e1[3], e2[1]) };
        mine != '*' && mine == theirs
    }
}

fn parse_connections(data: &MetascreenData) -> Result<[Vec<Vec<TileKey>>; 4]> {
    let mut out: [Vec<Vec<TileKey>>; 4] = Default::default();
    let connect = data.connect.as_deref().unwrap_or("");
    for (variant, blocks) in CONNECTION_BLOCKS.iter().enumerate() {
        let mut segments: Vec<Vec<TileKey>> = vec![vec![]];
        let mut poi_index: u32 = 0;
        let mut exit_index: u32 = 0;
        for c in connect.chars() {
            if blocks.contains(c) {
                segments.push(vec![]);
                continue;
            }
            let cur = segments.last_mut().context("no segment")?;
            match c {
                '|' | ':' | '-' | '=' => {}
                'p' => {
                    cur.push(0xf0 | poi_index);
                    poi_index += 1;
                }
                'x' => {
                    cur.push(0xe0 | exit_index);
                    exit_index += 1;
                }
                _ => {
                    let num = match c.to_digit(16) {
                        Some(n) if n != 0 => n,
                        _ => bail!("bad connect term {c:?} in {}", data.name),
                    };
                    let channel = (num & 3) << (num & 4);
                    let offset = if num & 8 != 0 {
                        if num & 4 != 0 { 0x0100 } else { 0x1000 }
                    } else {
                        0
                    };
                    cur.push(channel | offset);
                }
            }
        }
        let cur = segments.last_mut().context("no segment")?;
        while (poi_index as usize) < data.poi.len() {
            cur.push(0xf0 | poi_index);
            poi_index += 1;
        }
        while (exit_index as usize) < data.exits.len() {
            cur.push(0xe0 | exit_index);
            exit_index += 1;
        }
        segments.retain(|s| !s.is_empty());
        out[variant] = segments;
    }
    Ok(out)
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TilesetData {
    pub name: String,
    pub tileset_id: TilesetId,
    pub tile_effects: u8,
    pub empty: String,
    // When non-empty, the tileset only applies to these locations, and no
    // other tileset with the same raw id applies to them.
    #[serde(default)]
    pub exclusive_locations: Vec<LocationId>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CatalogData {
    pub screens: Vec<MetascreenData>,
    pub tilesets: Vec<TilesetData>,
}

#[derive(Clone, Debug)]
pub struct Metatileset {
    pub name: String,
    pub tileset_id: TilesetId,
    pub tile_effects: u8,
    pub empty: ScreenUid,
    pub exclusive_locations: Vec<LocationId>,
    screens: Vec<ScreenUid>,
    by_sid: HashMap<ScreenId, Vec<ScreenUid>>,
}

impl Metatileset {
    pub fn screens(&self) -> &[ScreenUid] {
        &self.screens
    }

    pub fn get_metascreens(&self, sid: ScreenId) -> &[ScreenUid] {
        self.by_sid.get(&sid).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, uid: ScreenUid) -> bool {
        self.screens.contains(&uid)
    }
}

/// All metascreens and metatilesets, read-only once loaded.
#[derive(Clone, Debug)]
pub struct ScreenCatalog {
    screens: Vec<Metascreen>,
    tilesets: Vec<Metatileset>,
    by_name: HashMap<String, ScreenUid>,
}

impl ScreenCatalog {
    pub fn new(data: CatalogData) -> Result<Self> {
        let mut screens = vec![];
        let mut by_name = HashMap::new();
        for (uid, screen_data) in data.screens.into_iter().enumerate() {
            let name = screen_data.name.clone();
            if by_name.insert(name.clone(), uid).is_some() {
                bail!("duplicate screen name {name}");
            }
            screens.push(
                Metascreen::new(uid, screen_data)
                    .with_context(|| format!("Processing screen {name}"))?,
            );
        }
        let mut tilesets = vec![];
        for ts in data.tilesets {
            let empty = *by_name
                .get(&ts.empty)
                .with_context(|| format!("unknown empty screen {} for {}", ts.empty, ts.name))?;
            let mut members = vec![];
            let mut by_sid: HashMap<ScreenId, Vec<ScreenUid>> = HashMap::new();
            for s in &screens {
                if s.data.tilesets.contains(&ts.name) || s.uid == empty {
                    members.push(s.uid);
                    by_sid.entry(s.sid()).or_default().push(s.uid);
                }
            }
            tilesets.push(Metatileset {
                name: ts.name,
                tileset_id: ts.tileset_id,
                tile_effects: ts.tile_effects,
                empty,
                exclusive_locations: ts.exclusive_locations,
                screens: members,
                by_sid,
            });
        }
        Ok(ScreenCatalog {
            screens,
            tilesets,
            by_name,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
        let data: CatalogData = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("unable to parse {}", path.display()))?;
        ScreenCatalog::new(data)
    }

    pub fn screen(&self, uid: ScreenUid) -> &Metascreen {
        &self.screens[uid]
    }

    pub fn screens(&self) -> &[Metascreen] {
        &self.screens
    }

    pub fn screen_by_name(&self, name: &str) -> Result<&Metascreen> {
        let uid = self
            .by_name
            .get(name)
            .with_context(|| format!("unknown screen {name}"))?;
        Ok(&self.screens[*uid])
    }

    pub fn tilesets(&self) -> impl Iterator<Item = &Metatileset> {
        self.tilesets.iter()
    }

    pub fn tileset(&self, name: &str) -> Result<&Metatileset> {
        self.tilesets
            .iter()
            .find(|ts| ts.name == name)
            .with_context(|| format!("unknown tileset {name}"))
    }

    /// Metascreens with the given raw id in any tileset using the raw tileset id.
    pub fn metascreens_by_sid(&self, sid: ScreenId, tileset_id: TilesetId) -> Vec<&Metascreen> {
        let mut uids: Vec<ScreenUid> = vec![];
        for ts in self.tilesets.iter().filter(|ts| ts.tileset_id == tileset_id) {
            for &uid in ts.get_metascreens(sid) {
                if !uids.contains(&uid) {
                    uids.push(uid);
                }
            }
        }
        uids.into_iter().map(|uid| &self.screens[uid]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn screen(name: &str, connect: &str, poi: usize, exits: usize) -> Metascreen {
        let data = MetascreenData {
            name: name.to_string(),
            id: 0,
            tilesets: vec![],
            feature: vec![],
            edges: Some(" c c".to_string()),
            connect: Some(connect.to_string()),
            exits: (0..exits)
                .map(|_| Connection {
                    kind: ConnectionType::Cave,
                    dir: 0,
                    entrance: 0x8078,
                    exits: vec![0x87],
                    allowed_exits: vec![],
                })
                .collect(),
            wall: None,
            flag: None,
            matcher: None,
            poi: (0..poi)
                .map(|_| Poi {
                    priority: 1,
                    dy: 0x70,
                    dx: 0x78,
                })
                .collect(),
            statues: vec![],
            delete: false,
            icon: None,
        };
        Metascreen::new(0, data).unwrap()
    }

    #[test]
    fn test_pos_packing() {
        let p = Pos::new(3, 0xa);
        assert_eq!(p.packed(), 0x3a);
        assert_eq!(Pos::from_packed(0x3a), p);
        assert_eq!(p.tile_key(0x20), 0x3a20);
        assert_eq!(p.offset(-4, 0), None);
        assert_eq!(p.offset(1, 1), Some(Pos::new(4, 0xb)));
        assert_eq!(LocPos::new(0x12, p).packed(), 0x123a);
    }

    #[test]
    fn test_connection_type_strings() {
        assert_eq!(ConnectionType::from_str("stair:up").unwrap(), ConnectionType::StairUp);
        assert_eq!(ConnectionType::SeamlessDown.to_string(), "seamless:down");
        assert!(ConnectionType::EdgeRight.is_edge());
        assert_eq!(ConnectionType::EdgeLeft.edge_dir(), Some(1));
        assert_eq!(
            ConnectionType::SeamlessUp.seamless_opposite(),
            Some(ConnectionType::SeamlessDown)
        );
    }

    #[test]
    fn test_parse_connections() {
        let s = screen("s", "6e|2a", 0, 0);
        // Walls block in every variant.
        assert_eq!(s.connections[0], vec![vec![0x20, 0x120], vec![0x02, 0x1002]]);
        assert_eq!(s.connections[2], s.connections[0]);
    }

    #[test]
    fn test_parse_connections_flagged() {
        let s = screen("s", "6=e", 0, 0);
        assert_eq!(s.connections[0], vec![vec![0x20, 0x120]]);
        assert_eq!(s.connections[1], vec![vec![0x20], vec![0x120]]);
        assert_eq!(s.connections[2], vec![vec![0x20, 0x120]]);
        assert_eq!(s.connections[3], vec![vec![0x20], vec![0x120]]);
    }

    #[test]
    fn test_parse_connections_markers() {
        let s = screen("s", "6p:ex", 2, 2);
        assert_eq!(s.connections[0], vec![vec![0x20, 0xf0], vec![0x120, 0xe0, 0xf1, 0xe1]]);
        assert_eq!(s.connections[2], vec![vec![0x20, 0xf0, 0x120, 0xe0, 0xf1, 0xe1]]);
    }

    #[test]
    fn test_check_neighbor() {
        let with_edges = |edges: &str| {
            let mut data = screen("s", "", 0, 0).data;
            data.edges = Some(edges.to_string());
            Metascreen::new(0, data).unwrap()
        };
        let hall = with_edges(" c c");
        assert!(hall.check_neighbor(&hall, 1));
        assert!(hall.check_neighbor(&hall, 0));
        assert!(!hall.check_neighbor(&with_edges("c   "), 0));
        assert!(with_edges("  c ").check_neighbor(&with_edges("c   "), 0));

        // Unmatched edges never pair, even with each other.
        let border = with_edges("**c*");
        assert!(!border.check_neighbor(&border, 1));
        assert!(!with_edges("  * ").check_neighbor(&with_edges("*   "), 0));
        assert!(!hall.check_neighbor(&with_edges("c*  "), 1));
    }

    #[test]
    fn test_bad_connect_term() {
        let mut data = screen("s", "", 0, 0).data;
        data.connect = Some("6g".to_string());
        assert!(Metascreen::new(0, data).is_err());
    }

    #[test]
    fn test_screen_match() {
        let m = ScreenMatch {
            reachable: vec![(0x80, 0x80)],
            unreachable: vec![(0x20, 0x20)],
            flag: Some(true),
        };
        let reach = |dy: i32, dx: i32| dy == 0x80 && dx == 0x80;
        assert!(m.matches(reach, true));
        assert!(!m.matches(reach, false));
        assert!(!m.matches(|_, _| true, true));
    }
}

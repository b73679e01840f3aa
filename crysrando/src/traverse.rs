use crate::metalocation::Metalocation;
use crysrando_game::{Pos, ScreenUid, TileKey};
use hashbrown::HashMap;
use pathfinding::undirected::connected_components::components;

#[derive(Default, Clone, Copy)]
pub struct TraverseOpts<'b> {
    // Screens to use in place of the current ones.
    pub with: Option<&'b HashMap<Pos, ScreenUid>>,
    // Treat walls and bridges as impassable.
    pub no_flagged: bool,
    pub flight: bool,
}

impl TraverseOpts<'_> {
    fn variant(&self) -> usize {
        (if self.flight { 2 } else { 0 }) | (if self.no_flagged { 1 } else { 0 })
    }
}

/// Connected components of tile keys across a metalocation.
pub struct Traversal {
    components: Vec<std::collections::HashSet<TileKey>>,
    index: HashMap<TileKey, usize>,
}

impl Traversal {
    pub fn component(&self, key: TileKey) -> Option<&std::collections::HashSet<TileKey>> {
        self.index.get(&key).map(|&i| &self.components[i])
    }

    pub fn component_index(&self, key: TileKey) -> Option<usize> {
        self.index.get(&key).copied()
    }

    pub fn contains(&self, key: TileKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn connected(&self, a: TileKey, b: TileKey) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(i), Some(j)) => i == j,
            _ => false,
        }
    }

    pub fn components(&self) -> &[std::collections::HashSet<TileKey>] {
        &self.components
    }

    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.index.keys().copied()
    }
}

/// Unions every screen's connectivity segments. Segment offsets that cross
/// into a neighbor (0x0100, 0x1000) produce the same key the neighbor uses
/// for its own edge, which is what stitches screens together.
pub fn traverse(meta: &Metalocation, opts: &TraverseOpts) -> Traversal {
    let variant = opts.variant();
    let catalog = meta.catalog();
    let mut groups: Vec<Vec<TileKey>> = vec![];
    for pos in meta.all_pos() {
        let scr = match opts.with.and_then(|w| w.get(&pos)) {
            Some(&uid) => catalog.screen(uid),
            None => meta.get(pos),
        };
        let base = pos.tile_key(0);
        for segment in &scr.connections[variant] {
            if segment.is_empty() {
                continue;
            }
            groups.push(segment.iter().map(|&c| base + c).collect());
        }
    }
    let components = components(&groups);
    let mut index = HashMap::new();
    for (i, component) in components.iter().enumerate() {
        for &key in component {
            index.insert(key, i);
        }
    }
    Traversal { components, index }
}

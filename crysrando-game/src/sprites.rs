use anyhow::{Context, Result, bail};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Metasprite {
    pub id: u8,
    pub palettes: Vec<u8>, // palette slots 0..3 used by the sprite
    pub tiles: Vec<u8>,    // pattern tile ids
}

impl Metasprite {
    /// Pattern slots (tile >> 6) the sprite draws from after adding `offset`.
    pub fn pattern_banks(&self, offset: u8) -> BTreeSet<u8> {
        self.tiles
            .iter()
            .map(|&t| (((t as u16 + offset as u16) >> 6) & 0xff) as u8)
            .collect()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectData {
    pub id: u8,
    pub metasprites: Vec<u8>,
    #[serde(default)]
    pub pattern_offset: u8,
    #[serde(default)]
    pub bonus_metasprite: Option<u8>,
    #[serde(default)]
    pub replacement: Option<u8>,
    #[serde(default)]
    pub child: Option<u8>,
    #[serde(default)]
    pub gold_drop: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct NpcData {
    pub id: u8,
    pub metasprite: u8,
    pub action: u8,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpriteDataFile {
    pub metasprites: Vec<Metasprite>,
    pub objects: Vec<ObjectData>,
    pub npcs: Vec<NpcData>,
    #[serde(default)]
    pub chest_items: Vec<(u8, u8)>,
    #[serde(default)]
    pub extra_objects: Vec<(u8, u8)>, // (monster, object that spawns in its place)
}

#[derive(Clone, Debug, Default)]
pub struct SpriteData {
    metasprites: HashMap<u8, Metasprite>,
    objects: HashMap<u8, ObjectData>,
    npcs: HashMap<u8, NpcData>,
    chest_items: HashMap<u8, u8>,
    extra_objects: HashMap<u8, Vec<u8>>,
}

impl SpriteData {
    pub fn new(file: SpriteDataFile) -> Self {
        let mut extra_objects: HashMap<u8, Vec<u8>> = HashMap::new();
        for (monster, obj) in file.extra_objects {
            extra_objects.entry(monster).or_default().push(obj);
        }
        SpriteData {
            metasprites: file.metasprites.into_iter().map(|m| (m.id, m)).collect(),
            objects: file.objects.into_iter().map(|o| (o.id, o)).collect(),
            npcs: file.npcs.into_iter().map(|n| (n.id, n)).collect(),
            chest_items: file.chest_items.into_iter().collect(),
            extra_objects,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
        let data: SpriteDataFile = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("unable to parse {}", path.display()))?;
        Ok(SpriteData::new(data))
    }

    pub fn metasprite(&self, id: u8) -> Option<&Metasprite> {
        self.metasprites.get(&id)
    }

    pub fn object(&self, id: u8) -> Result<&ObjectData> {
        self.objects
            .get(&id)
            .with_context(|| format!("unknown object {id:02x}"))
    }

    pub fn npc(&self, id: u8) -> Result<&NpcData> {
        self.npcs.get(&id).with_context(|| format!("unknown NPC {id:02x}"))
    }

    /// Item held by a chest; chests without an override hold their own id.
    pub fn chest_item(&self, chest: u8) -> u8 {
        self.chest_items.get(&chest).copied().unwrap_or(chest)
    }

    /// The object, its replacement and child chains, and any extra objects
    /// that can appear in its place.
    pub fn all_objects(&self, parent: u8) -> Result<Vec<&ObjectData>> {
        let mut out: Vec<&ObjectData> = vec![];
        let mut stack = vec![parent];
        while let Some(id) = stack.pop() {
            if out.iter().any(|o| o.id == id) {
                continue;
            }
            if out.len() > 0x100 {
                bail!("object tree for {parent:02x} does not terminate");
            }
            let obj = self.object(id)?;
            out.push(obj);
            if let Some(extra) = self.extra_objects.get(&id) {
                stack.extend(extra.iter().rev());
            }
            if let Some(child) = obj.child {
                stack.push(child);
            }
            if let Some(replacement) = obj.replacement {
                stack.push(replacement);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_banks() {
        let m = Metasprite {
            id: 1,
            palettes: vec![2],
            tiles: vec![0x80, 0xbf, 0xc0],
        };
        assert_eq!(m.pattern_banks(0), BTreeSet::from([2, 3]));
        assert_eq!(m.pattern_banks(0x40), BTreeSet::from([3, 4]));
    }

    #[test]
    fn test_all_objects() {
        let data = SpriteData::new(SpriteDataFile {
            metasprites: vec![],
            objects: vec![
                ObjectData {
                    id: 0x50,
                    replacement: Some(0x51),
                    ..Default::default()
                },
                ObjectData {
                    id: 0x51,
                    child: Some(0x50),
                    ..Default::default()
                },
                ObjectData {
                    id: 0x5c,
                    ..Default::default()
                },
            ],
            npcs: vec![],
            chest_items: vec![],
            extra_objects: vec![(0x50, 0x5c)],
        });
        let ids: Vec<u8> = data.all_objects(0x50).unwrap().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0x50, 0x51, 0x5c]);
        assert!(data.all_objects(0x99).is_err());
    }
}

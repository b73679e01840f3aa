use anyhow::{Context, Result};
use clap::Parser;
use crysrando::graphics::Graphics;
use crysrando::world::World;
use crysrando_game::{ScreenCatalog, TileKey};
use crysrando_game::location::Location;
use crysrando_game::sprites::SpriteData;
use hashbrown::HashMap;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Parses a location and the locations it connects to, then prints its
/// screens, exits and rewritten raw data.
///
/// Reachable tiles come from `--reachable`. Locations left out of that file
/// parse with no reachable tiles, so screens sharing a raw id fall back to
/// flag ordering and seamless exits on the top row fail to parse.
#[derive(Parser)]
struct Args {
    #[arg(long)]
    catalog: PathBuf,

    // JSON array of raw locations, indexed by id
    #[arg(long)]
    world: PathBuf,

    #[arg(long, value_parser = parse_hex)]
    location: u8,

    /// JSON object from hex location id to `[tile key, terrain]` pairs
    #[arg(long)]
    reachable: Option<PathBuf>,

    #[arg(long)]
    sprites: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long)]
    shuffle_pits: bool,
}

fn parse_hex(s: &str) -> Result<u8> {
    let s = s.trim_start_matches("0x");
    u8::from_str_radix(s, 16).with_context(|| format!("bad location id {s}"))
}

fn load_locations(path: &Path) -> Result<Vec<Location>> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("unable to parse {}", path.display()))
}

fn parse_reachable(json: &str) -> Result<HashMap<u8, HashMap<TileKey, u8>>> {
    let raw: BTreeMap<String, Vec<(TileKey, u8)>> =
        serde_json::from_str(json).context("unable to parse reachable tiles")?;
    raw.into_iter()
        .map(|(id, tiles)| Ok((parse_hex(&id)?, tiles.into_iter().collect())))
        .collect()
}

fn load_reachable(path: &Path) -> Result<HashMap<u8, HashMap<TileKey, u8>>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("unable to open {}", path.display()))?;
    parse_reachable(&json).with_context(|| format!("in {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let catalog = ScreenCatalog::load(&args.catalog)?;
    let locations = load_locations(&args.world)?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut world = World::new(&catalog, locations)?;
    let ids: Vec<u8> = world.locations.iter().filter(|l| l.used).map(|l| l.id).collect();
    let reachable = match &args.reachable {
        Some(path) => load_reachable(path)?,
        None => HashMap::new(),
    };
    let none = HashMap::new();
    for id in ids {
        let tiles = reachable.get(&id).unwrap_or(&none);
        if let Err(e) = world.parse(id, tiles, None) {
            if id == args.location {
                return Err(e);
            }
            warn!("{e:#}");
        }
    }
    let id = args.location;
    let meta = world.meta(id)?;
    println!("{}", meta.show());
    meta.validate()?;
    for (pos, kind, spec) in meta.exits() {
        println!("{pos} {kind} -> {} {}", spec.dest, spec.dest_type);
    }
    if let Err(e) = world.check_exits() {
        warn!("{e:#}");
    }

    if args.shuffle_pits {
        world.shuffle_pits(id)?;
        for (pos, dest) in world.meta(id)?.pits() {
            println!("pit {pos} -> {dest}");
        }
    }
    world.write(id)?;
    world.write_entrance0(id)?;

    if let Some(path) = &args.sprites {
        let sprites = SpriteData::load(path)?;
        let mut graphics = Graphics::new(&world.locations, &sprites)?;
        graphics.shuffle_palettes(&mut rng);
        graphics.configure_location(world.location_mut(id)?)?;
        info!("Sprite palettes in use: {:02x?}", graphics.all_sprite_palettes);
    }
    println!("{}", serde_json::to_string_pretty(world.location(id)?)?);
    Ok(())
}

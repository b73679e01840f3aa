use anyhow::{Result, anyhow};
use arrayvec::ArrayVec;
use crysrando_game::location::{Location, Spawn};
use crysrando_game::LocationId;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use std::fmt;

const TREASURE_CHEST_BANKS: &[u8] = &[
    0x5e, 0x5f, 0x60, 0x61, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x6c, 0x6d, 0x6e, 0x6f, 0x70,
    0x74, 0x75, 0x76, 0x77,
];

const COIN_BANKS: &[u8] = &[
    0x5e, 0x5f, 0x60, 0x61, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x6b, 0x6c, 0x6d, 0x6e,
    0x6f, 0x70, 0x74, 0x75, 0x76, 0x77,
];

/// Set of pattern-bank or palette ids, with an explicit unconstrained variant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CSet {
    All,
    Only([u64; 4]),
}

impl Default for CSet {
    fn default() -> Self {
        CSet::All
    }
}

impl CSet {
    pub const ALL: CSet = CSet::All;
    pub const NONE: CSet = CSet::Only([0; 4]);

    pub fn single(x: u8) -> CSet {
        let mut bits = [0; 4];
        bits[(x >> 6) as usize] |= 1 << (x & 63);
        CSet::Only(bits)
    }

    pub fn of(xs: &[u8]) -> CSet {
        xs.iter().copied().collect()
    }

    pub fn is_all(&self) -> bool {
        matches!(self, CSet::All)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CSet::Only(bits) if bits.iter().all(|&b| b == 0))
    }

    /// Number of members, or `None` for `All`.
    pub fn len(&self) -> Option<usize> {
        match self {
            CSet::All => None,
            CSet::Only(bits) => Some(bits.iter().map(|b| b.count_ones() as usize).sum()),
        }
    }

    pub fn contains(&self, x: u8) -> bool {
        match self {
            CSet::All => true,
            CSet::Only(bits) => bits[(x >> 6) as usize] & (1 << (x & 63)) != 0,
        }
    }

    /// Members in ascending order. Iterating `All` is a logic error.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        let bits = match self {
            CSet::All => panic!("cannot iterate over an unconstrained set"),
            CSet::Only(bits) => bits,
        };
        (0..=255u8).filter(move |&x| bits[(x >> 6) as usize] & (1 << (x & 63)) != 0)
    }

    pub fn intersect(&self, that: &CSet) -> CSet {
        match (self, that) {
            (CSet::All, _) => that.clone(),
            (_, CSet::All) => self.clone(),
            (CSet::Only(a), CSet::Only(b)) => CSet::Only(std::array::from_fn(|i| a[i] & b[i])),
        }
    }

    pub fn union(&self, that: &CSet) -> CSet {
        match (self, that) {
            (CSet::All, _) | (_, CSet::All) => CSet::All,
            (CSet::Only(a), CSet::Only(b)) => CSet::Only(std::array::from_fn(|i| a[i] | b[i])),
        }
    }

    pub fn is_subset(&self, that: &CSet) -> bool {
        match (self, that) {
            (_, CSet::All) => true,
            (CSet::All, _) => false,
            (CSet::Only(a), CSet::Only(b)) => (0..4).all(|i| a[i] & !b[i] == 0),
        }
    }

    pub fn label(&self) -> String {
        match self {
            CSet::All => "all".to_string(),
            CSet::Only(_) => {
                let items: Vec<String> = self.iter().map(|x| format!("{x:02x}")).collect();
                format!("{{{}}}", items.join(","))
            }
        }
    }
}

impl FromIterator<u8> for CSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut bits = [0; 4];
        for x in iter {
            bits[(x >> 6) as usize] |= 1 << (x & 63);
        }
        CSet::Only(bits)
    }
}

impl fmt::Debug for CSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Which sprite pattern banks and palettes a set of spawns can share.
///
/// `fixed` holds the allowed ids for pattern slots 0 and 1 and palette slots 2
/// and 3. A float is a pattern requirement that may be satisfied by either
/// pattern slot, depending on the spawn's pattern-bank bit. `shift` records which
/// pattern slots were pinned down by a float or by a shifted spawn.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Constraint {
    pub fixed: [CSet; 4],
    pub float: ArrayVec<CSet, 2>,
    pub shift: u8,
}

impl Constraint {
    fn with(fixed: [CSet; 4], float: &[CSet], shift: u8) -> Constraint {
        Constraint {
            fixed,
            float: float.iter().cloned().collect(),
            shift,
        }
    }

    pub fn all() -> Constraint {
        Constraint::with([CSet::ALL, CSet::ALL, CSet::ALL, CSet::ALL], &[], 0)
    }

    pub fn none() -> Constraint {
        Constraint::with([CSet::NONE, CSet::NONE, CSet::NONE, CSet::NONE], &[], 0)
    }

    pub fn mimic() -> Constraint {
        Constraint::with([CSet::ALL, CSet::single(0x6c), CSet::ALL, CSet::ALL], &[], 2)
    }

    pub fn treasure_chest() -> Constraint {
        Constraint::with(
            [CSet::ALL, CSet::ALL, CSet::ALL, CSet::ALL],
            &[CSet::of(TREASURE_CHEST_BANKS)],
            0,
        )
    }

    pub fn boss() -> Constraint {
        Constraint::with([CSet::of(TREASURE_CHEST_BANKS), CSet::ALL, CSet::ALL, CSet::ALL], &[], 0)
    }

    pub fn coin() -> Constraint {
        Constraint::with([CSet::of(COIN_BANKS), CSet::ALL, CSet::ALL, CSet::ALL], &[], 0)
    }

    pub fn stom_fight() -> Constraint {
        Constraint::with([CSet::ALL, CSet::single(0x4d), CSet::ALL, CSet::ALL], &[], 0)
    }

    pub fn guardian_statue() -> Constraint {
        Constraint::with([CSet::single(0x74), CSet::single(0x62), CSet::ALL, CSet::ALL], &[], 0)
    }

    pub fn shooting_wall() -> Constraint {
        Constraint::with([CSet::single(0x61), CSet::ALL, CSet::ALL, CSet::ALL], &[], 0)
    }

    pub fn kensu_chest() -> Constraint {
        Constraint::with([CSet::single(0x51), CSet::ALL, CSet::ALL, CSet::ALL], &[], 0)
    }

    /// Starting constraint for a location's own sprite banks.
    pub fn for_location(id: LocationId) -> Constraint {
        match id {
            // Windmill cave: windmill sprite and palette
            0x03 => Constraint::with(
                [CSet::ALL, CSet::single(0x60), CSet::ALL, CSet::single(0x20)],
                &[],
                0,
            ),
            // Sea maps: boat and channel sprites
            0x60 | 0x64 | 0x68 => Constraint::with(
                [CSet::ALL, CSet::single(0x52), CSet::ALL, CSet::single(0x08)],
                &[],
                0,
            ),
            _ => Constraint::all(),
        }
    }

    pub fn pat0(&self) -> &CSet {
        &self.fixed[0]
    }

    pub fn pat1(&self) -> &CSet {
        &self.fixed[1]
    }

    pub fn pal2(&self) -> &CSet {
        &self.fixed[2]
    }

    pub fn pal3(&self) -> &CSet {
        &self.fixed[3]
    }

    /// Constraint imposed by one spawn in one location.
    ///
    /// A sprite drawn only from pattern slot 2 is shiftable: its spawn's
    /// pattern-bank bit can point it at either of the location's banks.
    pub fn from_spawn(
        palettes: &BTreeSet<u8>,
        patterns: &BTreeSet<u8>,
        location: &Location,
        spawn: &Spawn,
        shiftable: bool,
    ) -> Constraint {
        let shiftable = shiftable && patterns.len() == 1 && patterns.contains(&2);
        let pat0 = if shiftable || !patterns.contains(&2) {
            CSet::ALL
        } else {
            CSet::single(location.sprite_patterns[0])
        };
        let pat1 = if shiftable || !patterns.contains(&3) {
            CSet::ALL
        } else {
            CSet::single(location.sprite_patterns[1])
        };
        let float: &[CSet] = if shiftable {
            &[CSet::single(location.sprite_patterns[spawn.pattern_bank() as usize])]
        } else {
            &[]
        };
        let pal2 = if palettes.contains(&2) {
            CSet::single(location.sprite_palettes[0])
        } else {
            CSet::ALL
        };
        let pal3 = if palettes.contains(&3) {
            CSet::single(location.sprite_palettes[1])
        } else {
            CSet::ALL
        };
        Constraint::with([pat0, pat1, pal2, pal3], float, 0)
    }

    pub fn ignore_palette(&self) -> Constraint {
        let mut out = self.clone();
        out.fixed[2] = CSet::ALL;
        out.fixed[3] = CSet::ALL;
        out
    }

    /// Loosens each constrained palette slot to a few random palettes from `used`.
    pub fn shuffle_palette<R: Rng + ?Sized>(&self, rng: &mut R, used: &[u8]) -> Constraint {
        let mut out = self.clone();
        if used.is_empty() {
            return out;
        }
        for i in 2..4 {
            if out.fixed[i].is_all() {
                continue;
            }
            let size = (5.0 - ((rng.gen_range(0..15) + 2) as f64).log2()).floor() as usize;
            out.fixed[i] = (0..size).filter_map(|_| used.choose(rng).copied()).collect();
        }
        out
    }

    pub fn shifted(&self) -> Constraint {
        let mut out = self.clone();
        out.shift |= 2;
        out
    }

    /// Union of two constraints from different spawns of the same sprite.
    pub fn join(&self, that: &Constraint) -> Constraint {
        assert_eq!(
            self.float.len(),
            that.float.len(),
            "incompatible floats joining {self:?} with {that:?}"
        );
        Constraint {
            fixed: std::array::from_fn(|i| self.fixed[i].union(&that.fixed[i])),
            float: self
                .float
                .iter()
                .zip(that.float.iter())
                .map(|(a, b)| a.union(b))
                .collect(),
            shift: self.shift | that.shift,
        }
    }

    /// Intersection of two constraints, or `None` when they cannot both hold.
    pub fn try_meet(&self, that: &Constraint) -> Option<Constraint> {
        let mut fixed: [CSet; 4] = std::array::from_fn(|i| self.fixed[i].intersect(&that.fixed[i]));
        if fixed.iter().any(CSet::is_empty) {
            return None;
        }
        let mut floats: Vec<CSet> = vec![];
        for s in self.float.iter().chain(that.float.iter()) {
            assert!(!s.is_all(), "unexpected unconstrained float");
            if let Some(f) = floats.iter_mut().find(|f| !f.intersect(s).is_empty()) {
                *f = f.intersect(s);
            } else {
                floats.push(s.clone());
            }
        }
        if floats.len() > 2 {
            return None;
        }
        floats.sort();
        let mut shift = self.shift | that.shift;
        // A float that can't live in one pattern slot must live in the other.
        'outer: loop {
            for i in 0..floats.len() {
                for j in 0..2 {
                    if floats[i].intersect(&fixed[j]).is_empty() {
                        let k = 1 - j;
                        fixed[k] = floats[i].intersect(&fixed[k]);
                        shift |= 1 << k;
                        if fixed[k].is_empty() {
                            return None;
                        }
                        floats.remove(i);
                        continue 'outer;
                    }
                }
            }
            break;
        }
        Some(Constraint {
            fixed,
            float: floats.into_iter().collect(),
            shift,
        })
    }

    pub fn meet(&self, that: &Constraint) -> Result<Constraint> {
        self.try_meet(that)
            .ok_or_else(|| anyhow!("Could not reconcile patterns: {self:?} and {that:?}"))
    }

    /// Picks concrete banks and palettes and writes them into the location.
    pub fn fix<R: Rng + ?Sized>(&self, location: &mut Location, rng: &mut R) {
        self.fix_with(location, |n| rng.gen_range(0..n));
    }

    /// As `fix`, always taking the first option.
    pub fn fix_first(&self, location: &mut Location) {
        self.fix_with(location, |_| 0);
    }

    fn fix_with(&self, location: &mut Location, mut pick: impl FnMut(usize) -> usize) {
        let mut fixed = self.fixed.clone();
        if !self.float.is_empty() {
            let x0 = pick(2);
            let x1 = 1 - x0;
            if let Some(f) = self.float.get(x0) {
                fixed[0] = fixed[0].intersect(f);
            }
            if let Some(f) = self.float.get(x1) {
                fixed[1] = fixed[1].intersect(f);
            }
        }
        for i in 0..4 {
            if fixed[i].is_all() || fixed[i].is_empty() {
                continue;
            }
            let options: Vec<u8> = fixed[i].iter().collect();
            let value = options[pick(options.len())];
            match i {
                0 | 1 => location.sprite_patterns[i] = value,
                _ => location.sprite_palettes[i - 2] = value,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crysrando_game::location::SpawnKind;
    use crysrando_game::Pos;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fixed0(xs: &[u8]) -> Constraint {
        Constraint::with([CSet::of(xs), CSet::ALL, CSet::ALL, CSet::ALL], &[], 0)
    }

    fn random_cset(rng: &mut StdRng) -> CSet {
        if rng.gen_range(0..4) == 0 {
            return CSet::ALL;
        }
        let n = rng.gen_range(0..4);
        (0..n).map(|_| rng.gen_range(0x60..0x68)).collect()
    }

    #[test]
    fn test_cset_identities() {
        let x = CSet::of(&[1, 2, 0x80]);
        assert_eq!(x.intersect(&CSet::ALL), x);
        assert_eq!(CSet::ALL.intersect(&x), x);
        assert_eq!(x.union(&CSet::ALL), CSet::ALL);
        assert_eq!(x.intersect(&CSet::NONE), CSet::NONE);
        assert_eq!(x.union(&CSet::NONE), x);
        assert_eq!(CSet::NONE.intersect(&CSet::ALL), CSet::NONE);
        assert_eq!(CSet::NONE.union(&CSet::ALL), CSet::ALL);
        assert_eq!(x.len(), Some(3));
        assert_eq!(CSet::ALL.len(), None);
        assert!(CSet::of(&[1]).is_subset(&x));
        assert!(!x.is_subset(&CSet::of(&[1])));
        assert_eq!(x.label(), "{01,02,80}");
        assert_eq!(x.iter().collect::<Vec<_>>(), vec![1, 2, 0x80]);
    }

    #[test]
    fn test_cset_commutative() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let a = random_cset(&mut rng);
            let b = random_cset(&mut rng);
            assert_eq!(a.intersect(&b), b.intersect(&a));
            assert_eq!(a.union(&b), b.union(&a));
        }
    }

    #[test]
    fn test_cset_intersect_and_union() {
        assert_eq!(CSet::of(&[1, 2, 3]).intersect(&CSet::of(&[2, 3, 4])), CSet::of(&[2, 3]));
        assert_eq!(CSet::NONE.union(&CSet::single(5)), CSet::single(5));
    }

    #[test]
    fn test_meet_disjoint_slots() {
        let a = Constraint::with(
            [CSet::single(1), CSet::single(2), CSet::ALL, CSet::ALL],
            &[],
            0,
        );
        let b = Constraint::with(
            [CSet::ALL, CSet::ALL, CSet::single(5), CSet::single(6)],
            &[],
            0,
        );
        let want = [CSet::single(1), CSet::single(2), CSet::single(5), CSet::single(6)];
        assert_eq!(a.meet(&b).unwrap().fixed, want);
        assert_eq!(b.meet(&a).unwrap().fixed, want);
        assert!(a.meet(&b).unwrap().float.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_iterate_all_panics() {
        let _ = CSet::ALL.iter().count();
    }

    #[test]
    fn test_meet_narrows() {
        let c = fixed0(&[0x10, 0x11]).meet(&fixed0(&[0x11, 0x12])).unwrap();
        assert_eq!(c.fixed[0], CSet::single(0x11));
        assert!(c.fixed[1].is_all());
    }

    #[test]
    fn test_meet_infeasible() {
        let a = fixed0(&[0x10]);
        let b = fixed0(&[0x12]);
        assert_eq!(a.try_meet(&b), None);
        assert!(a.meet(&b).is_err());
    }

    #[test]
    fn test_meet_idempotent() {
        let x = Constraint::with(
            [CSet::of(&[1, 2]), CSet::ALL, CSet::single(5), CSet::ALL],
            &[CSet::of(&[1, 2])],
            0,
        );
        assert_eq!(x.meet(&x).unwrap(), x);
        assert_eq!(Constraint::all().meet(&x).unwrap(), x);
    }

    #[test]
    fn test_meet_commutative() {
        let mut rng = StdRng::seed_from_u64(12345);
        for _ in 0..500 {
            let make = |rng: &mut StdRng| {
                let fixed = std::array::from_fn(|_| random_cset(rng));
                let floats: Vec<CSet> = (0..rng.gen_range(0..2))
                    .map(|_| CSet::single(rng.gen_range(0x60..0x68)))
                    .collect();
                Constraint::with(fixed, &floats, 0)
            };
            let a = make(&mut rng);
            let b = make(&mut rng);
            assert_eq!(a.try_meet(&b), b.try_meet(&a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_float_merge_and_limit() {
        let a = Constraint::with(Constraint::all().fixed, &[CSet::of(&[1, 2])], 0);
        let b = Constraint::with(Constraint::all().fixed, &[CSet::of(&[2, 3])], 0);
        let c = a.meet(&b).unwrap();
        assert_eq!(c.float.as_slice(), &[CSet::single(2)]);

        let d = Constraint::with(Constraint::all().fixed, &[CSet::single(4), CSet::single(5)], 0);
        assert_eq!(a.try_meet(&d), None);
    }

    #[test]
    fn test_float_resolved_by_fixed() {
        let a = Constraint::with(
            [CSet::single(0x30), CSet::ALL, CSet::ALL, CSet::ALL],
            &[],
            0,
        );
        let b = Constraint::with(Constraint::all().fixed, &[CSet::of(&[0x20, 0x21])], 0);
        let c = a.meet(&b).unwrap();
        assert!(c.float.is_empty());
        assert_eq!(c.fixed[0], CSet::single(0x30));
        assert_eq!(c.fixed[1], CSet::of(&[0x20, 0x21]));
        assert_eq!(c.shift, 2);
    }

    #[test]
    fn test_join() {
        let a = Constraint::with(Constraint::all().fixed, &[CSet::single(0x60)], 0);
        let b = Constraint::with(Constraint::all().fixed, &[CSet::single(0x62)], 0);
        let c = a.join(&b);
        assert_eq!(c.float.as_slice(), &[CSet::of(&[0x60, 0x62])]);
        let d = fixed0(&[1]).join(&fixed0(&[2])).shifted();
        assert_eq!(d.fixed[0], CSet::of(&[1, 2]));
        assert_eq!(d.shift, 2);
    }

    #[test]
    #[should_panic]
    fn test_join_float_mismatch() {
        let a = Constraint::with(Constraint::all().fixed, &[CSet::single(0x60)], 0);
        let _ = a.join(&Constraint::all());
    }

    fn location() -> Location {
        Location {
            sprite_patterns: [0x60, 0x61],
            sprite_palettes: [0x10, 0x11],
            ..Default::default()
        }
    }

    #[test]
    fn test_from_spawn() {
        let loc = location();
        let mut spawn = Spawn::new(SpawnKind::Npc, 0x10, Pos::new(0, 0), 0x55);
        let palettes = BTreeSet::from([2]);
        let c = Constraint::from_spawn(&palettes, &BTreeSet::from([2]), &loc, &spawn, true);
        assert_eq!(c.float.as_slice(), &[CSet::single(0x60)]);
        assert!(c.pat0().is_all() && c.pat1().is_all());
        assert_eq!(c.pal2(), &CSet::single(0x10));
        assert!(c.pal3().is_all());

        spawn.set_pattern_bank(1);
        let c = Constraint::from_spawn(&palettes, &BTreeSet::from([2]), &loc, &spawn, true);
        assert_eq!(c.float.as_slice(), &[CSet::single(0x61)]);

        let c = Constraint::from_spawn(&palettes, &BTreeSet::from([3]), &loc, &spawn, true);
        assert!(c.float.is_empty());
        assert!(c.pat0().is_all());
        assert_eq!(c.pat1(), &CSet::single(0x61));

        let c = Constraint::from_spawn(&palettes, &BTreeSet::from([2]), &loc, &spawn, false);
        assert_eq!(c.pat0(), &CSet::single(0x60));
    }

    #[test]
    fn test_join_same_shape_never_panics() {
        let mut rng = StdRng::seed_from_u64(99);
        let palettes = BTreeSet::from([2, 3]);
        for _ in 0..100 {
            let shiftable = rng.gen_bool(0.5);
            let patterns: BTreeSet<u8> = if rng.gen_bool(0.5) { [2].into() } else { [2, 3].into() };
            let mut acc: Option<Constraint> = None;
            for _ in 0..4 {
                let mut loc = location();
                loc.sprite_patterns = [rng.gen_range(0x50..0x70), rng.gen_range(0x50..0x70)];
                let mut spawn = Spawn::new(SpawnKind::Npc, 0x10, Pos::new(0, 0), 0x55);
                spawn.set_pattern_bank(rng.gen_range(0..2));
                let c = Constraint::from_spawn(&palettes, &patterns, &loc, &spawn, shiftable);
                acc = Some(match acc {
                    Some(a) => a.join(&c),
                    None => c,
                });
            }
        }
    }

    #[test]
    fn test_fix() {
        let mut loc = location();
        let c = Constraint::with(
            [CSet::ALL, CSet::single(0x6c), CSet::of(&[0x20, 0x21]), CSet::ALL],
            &[CSet::single(0x70)],
            0,
        );
        c.fix_first(&mut loc);
        assert_eq!(loc.sprite_patterns, [0x70, 0x6c]);
        assert_eq!(loc.sprite_palettes, [0x20, 0x11]);

        let mut rng = StdRng::seed_from_u64(1);
        let mut loc = location();
        c.fix(&mut loc, &mut rng);
        assert!([0x20, 0x21].contains(&loc.sprite_palettes[0]));
    }

    #[test]
    fn test_presets() {
        assert_eq!(Constraint::mimic().shift, 2);
        assert_eq!(Constraint::treasure_chest().float.len(), 1);
        assert!(Constraint::for_location(0x64).pat1().contains(0x52));
        assert_eq!(Constraint::for_location(0x10), Constraint::all());
        let shuffled = Constraint::for_location(0x03).shuffle_palette(&mut StdRng::seed_from_u64(3), &[1, 2]);
        assert!(shuffled.pal3().is_subset(&CSet::of(&[1, 2])));
        assert!(shuffled.pal2().is_all());
        assert!(Constraint::stom_fight().ignore_palette().pal2().is_all());
    }
}

//! Material signatures generalised over [`PieceKind`], grounded on the
//! collaborator crate's `MaterialSide`/`Material`: same normalisation
//! (stronger side always labelled white), same `descendants` walk for
//! sub-tablebase discovery, same "KQvK" textual form. The per-kind mate
//! arithmetic that used to hard-code chess roles now goes through
//! `PieceKind::solo_mate_class`, so one implementation serves both games.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools as _;
use serde::{de, Deserialize, Deserializer};

use crate::board::{ByColor, Color, Piece, PieceKind, SoloMateClass};

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct MaterialSide<K: PieceKind> {
    by_kind: Vec<u8>,
    _kind: std::marker::PhantomData<K>,
}

impl<K: PieceKind> MaterialSide<K> {
    fn empty() -> Self {
        Self {
            by_kind: vec![0; K::CANONICAL_ORDER.len()],
            _kind: std::marker::PhantomData,
        }
    }

    fn index_of(kind: K) -> usize {
        K::CANONICAL_ORDER
            .iter()
            .position(|&k| k == kind)
            .expect("kind listed in CANONICAL_ORDER")
    }

    #[must_use]
    pub fn get(&self, kind: K) -> u8 {
        self.by_kind[Self::index_of(kind)]
    }

    fn get_mut(&mut self, kind: K) -> &mut u8 {
        &mut self.by_kind[Self::index_of(kind)]
    }

    fn from_str_part(s: &str) -> Option<Self> {
        let mut side = Self::empty();
        for ch in s.chars() {
            let kind = K::from_char(ch)?;
            *side.get_mut(kind) += 1;
        }
        Some(side)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.by_kind.iter().map(|&c| usize::from(c)).sum()
    }

    #[must_use]
    pub fn has_pawns(&self) -> bool {
        K::CANONICAL_ORDER
            .iter()
            .any(|&k| !k.promotions().is_empty() && self.get(k) > 0)
    }

    fn unique_kinds(&self) -> u8 {
        self.by_kind.iter().filter(|&&c| c == 1).sum()
    }

    /// Material configurations reachable in one legal move: a promotable
    /// piece (chess pawn) promoting, or any non-king piece being captured.
    #[must_use]
    pub fn descendants(&self) -> Vec<Self> {
        let mut out = Vec::with_capacity(6);
        for &kind in K::CANONICAL_ORDER {
            if kind == K::king() {
                continue;
            }
            if self.get(kind) == 0 {
                continue;
            }
            for &promoted in kind.promotions() {
                let mut d = self.clone();
                *d.get_mut(kind) -= 1;
                *d.get_mut(promoted) += 1;
                out.push(d);
            }
            let mut d = self.clone();
            *d.get_mut(kind) -= 1;
            out.push(d);
        }
        out
    }

    fn can_mate(&self) -> CanMate {
        let king_count = self.get(K::king());
        let extra = self.count() - usize::from(king_count);
        let decisive_present = K::CANONICAL_ORDER
            .iter()
            .any(|&k| k != K::king() && k.solo_mate_class() == SoloMateClass::Decisive && self.get(k) > 0);
        if extra > 1 || decisive_present {
            CanMate::Yes
        } else if extra == 1 {
            CanMate::NeedHelp
        } else {
            CanMate::No
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Copy)]
enum CanMate {
    Yes,
    No,
    NeedHelp,
}

impl CanMate {
    fn is_mate_possible(self, other_side: Self) -> bool {
        match self {
            Self::Yes => true,
            Self::No => other_side == Self::Yes,
            Self::NeedHelp => other_side != Self::No,
        }
    }
}

impl<K: PieceKind> Ord for MaterialSide<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count().cmp(&other.count()).then_with(|| {
            K::CANONICAL_ORDER
                .iter()
                .map(|&k| self.get(k).cmp(&other.get(k)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
    }
}

impl<K: PieceKind> PartialOrd for MaterialSide<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: PieceKind> fmt::Display for MaterialSide<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &kind in K::CANONICAL_ORDER {
            for _ in 0..self.get(kind) {
                f.write_str(&kind.to_char().to_ascii_uppercase().to_string())?;
            }
        }
        Ok(())
    }
}

impl<K: PieceKind> fmt::Debug for MaterialSide<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count() > 0 {
            fmt::Display::fmt(self, f)
        } else {
            f.write_str("-")
        }
    }
}

/// A material key, always normalised so the numerically stronger side is
/// labelled white (swapping colors and, for asymmetric games, mirroring the
/// board is the caller's job when probing with this key).
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Material<K: PieceKind> {
    pub by_color: ByColor<MaterialSide<K>>,
}

impl<K: PieceKind> Material<K> {
    fn normalized(by_color: ByColor<MaterialSide<K>>) -> Self {
        if by_color.black > by_color.white {
            Self {
                by_color: ByColor {
                    white: by_color.black,
                    black: by_color.white,
                },
            }
        } else {
            Self { by_color }
        }
    }

    #[must_use]
    pub fn from_pieces(pieces: impl IntoIterator<Item = Piece<K>>) -> Self {
        Self::from_pieces_with_flip(pieces).0
    }

    /// Like [`Material::from_pieces`], but also reports whether the stronger
    /// side turned out to be black on the board (so normalising to this
    /// crate's "white is always listed first" convention required a color
    /// swap). The index codec's `flip_side` (§4.C) is exactly this bit.
    #[must_use]
    pub fn from_pieces_with_flip(pieces: impl IntoIterator<Item = Piece<K>>) -> (Self, bool) {
        let mut by_color = ByColor::new_with(|_| MaterialSide::empty());
        for piece in pieces {
            *by_color.get_mut(piece.color).get_mut(piece.kind) += 1;
        }
        let flip = by_color.black > by_color.white;
        (Self::normalized(by_color), flip)
    }

    /// Non-king factor groups in the order the index codec lays them out
    /// (§4.B): kind-major (per [`PieceKind::CANONICAL_ORDER`]), white before
    /// black, one entry per side that actually has pieces of that kind.
    #[must_use]
    pub fn order_vector(&self) -> Vec<(K, Color, u8)> {
        let mut out = Vec::new();
        for &kind in K::CANONICAL_ORDER {
            if kind == K::king() {
                continue;
            }
            for &color in &[Color::White, Color::Black] {
                let count = self.by_color.get(color).get(kind);
                if count > 0 {
                    out.push((kind, color, count));
                }
            }
        }
        out
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.by_color.iter().map(MaterialSide::count).sum()
    }

    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.by_color.white == self.by_color.black
    }

    #[must_use]
    pub fn has_pawns(&self) -> bool {
        self.by_color.iter().any(MaterialSide::has_pawns)
    }

    #[must_use]
    pub fn unique_pieces(&self) -> u8 {
        self.by_color.iter().map(MaterialSide::unique_kinds).sum()
    }

    #[must_use]
    pub fn min_like_man(&self) -> u8 {
        self.by_color
            .iter()
            .flat_map(|side| side.by_kind.iter())
            .copied()
            .filter(|&c| c >= 2)
            .min()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_mate_possible(&self) -> bool {
        let (white, black) = (
            self.by_color.white.can_mate(),
            self.by_color.black.can_mate(),
        );
        white.is_mate_possible(black)
    }

    #[must_use]
    pub fn can_mate(&self, color: Color) -> bool {
        // NeedsHelp (lone bishop/knight) requires the defender to have more
        // than a bare king for mate to be forceable at all.
        match self.by_color.get(color).can_mate() {
            CanMate::Yes => true,
            CanMate::NeedHelp => self.by_color.get(!color).count() > 1,
            CanMate::No => false,
        }
    }

    fn descendants(&self) -> impl Iterator<Item = Self> + '_ {
        self.by_color
            .iter()
            .circular_tuple_windows()
            .flat_map(|(mat_1, mat_2)| {
                mat_1.descendants().into_iter().map(move |d| {
                    Self::normalized(ByColor {
                        white: d,
                        black: mat_2.clone(),
                    })
                })
            })
    }

    pub fn descendants_not_draw(&self) -> impl Iterator<Item = Self> + '_ {
        self.descendants().filter(Self::is_mate_possible)
    }

    #[must_use]
    pub fn descendants_recursive(&self, include_drawn_materials: bool) -> Vec<Self>
    where
        Self: Ord,
    {
        let mut out = self.descendants_recursive_internal(include_drawn_materials);
        out.sort();
        out.dedup();
        out
    }

    fn descendants_recursive_internal(&self, include_drawn_materials: bool) -> Vec<Self> {
        self.descendants()
            .filter(|mat| include_drawn_materials || mat.is_mate_possible())
            .flat_map(|x| {
                std::iter::once(x.clone())
                    .chain(x.descendants_recursive_internal(include_drawn_materials))
            })
            .collect()
    }

    #[must_use]
    pub fn by_piece(&self, piece: Piece<K>) -> u8 {
        self.by_color.get(piece.color).get(piece.kind)
    }
}

impl<K: PieceKind> Ord for Material<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count()
            .cmp(&other.count())
            .then_with(|| self.by_color.white.cmp(&other.by_color.white))
            .then_with(|| self.by_color.black.cmp(&other.by_color.black))
    }
}

impl<K: PieceKind> PartialOrd for Material<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: PieceKind> FromStr for Material<K> {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 64 + 1 {
            return Err("string too long to be proper material");
        }
        let (white, black) = s
            .split_once('v')
            .ok_or("should contain 'v' to separate the two sides, e.g. \"KQvK\"")?;
        Ok(Self::normalized(ByColor {
            white: MaterialSide::from_str_part(white).ok_or("invalid material on the first side")?,
            black: MaterialSide::from_str_part(black).ok_or("invalid material on the second side")?,
        }))
    }
}

impl<K: PieceKind> fmt::Debug for Material<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.by_color.white, self.by_color.black)
    }
}

struct MaterialVisitor<K>(std::marker::PhantomData<K>);

impl<'de, K: PieceKind> de::Visitor<'de> for MaterialVisitor<K> {
    type Value = Material<K>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a material signature string, e.g. \"KQvK\"")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Material::from_str(v).map_err(de::Error::custom)
    }
}

impl<'de, K: PieceKind> Deserialize<'de> for Material<K> {
    fn deserialize<D>(deserializer: D) -> Result<Material<K>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(MaterialVisitor(std::marker::PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::chess::ChessRole;
    use std::collections::HashSet;

    type Material = super::Material<ChessRole>;
    type MaterialSide = super::MaterialSide<ChessRole>;

    #[test]
    fn material_side_descendants() {
        for (ancestor, descendants) in [
            ("KN", vec!["K"]),
            ("KP", vec!["K", "KN", "KB", "KR", "KQ"]),
            ("KPP", vec!["KP", "KPN", "KPB", "KPR", "KPQ"]),
            ("KRR", vec!["KR"]),
            ("K", vec![]),
        ] {
            let mat = MaterialSide::from_str_part(ancestor).unwrap();
            assert_eq!(
                HashSet::<MaterialSide>::from_iter(mat.descendants()),
                HashSet::from_iter(descendants.iter().map(|s| MaterialSide::from_str_part(s).unwrap()))
            );
        }
    }

    #[test]
    fn is_mate_possible() {
        for (mat, expect) in [
            ("KBNvKRQ", true),
            ("KNvKB", true),
            ("KBvK", false),
            ("KvKB", false),
            ("KNvK", false),
            ("KvK", false),
            ("KPvK", true),
            ("KPvKP", true),
            ("KRvKP", true),
            ("KQvKP", true),
        ] {
            assert_eq!(Material::from_str(mat).unwrap().is_mate_possible(), expect, "{mat}");
        }
    }

    #[test]
    fn can_mate_per_color() {
        for (mat, expect) in [
            ("KBNvKRQ", (true, true)),
            ("KBvKN", (true, true)),
            ("KBvK", (false, false)),
            ("KvKB", (false, false)),
            ("KNvK", (false, false)),
            ("KvK", (false, false)),
            ("KPvK", (true, false)),
            ("KPvKP", (true, true)),
            ("KRvKP", (true, true)),
            ("KQvKP", (true, true)),
            ("KQvKN", (true, false)),
            ("KQvKB", (true, false)),
            ("KRvKB", (true, false)),
            ("KRvKN", (true, true)),
        ] {
            let m = Material::from_str(mat).unwrap();
            assert_eq!(m.can_mate(Color::White), expect.0, "white {mat}");
            assert_eq!(m.can_mate(Color::Black), expect.1, "black {mat}");
        }
    }

    #[test]
    fn material_buildin_normalisation() {
        for (a, b) in [
            ("KBNvKRQ", "KRQvKBN"),
            ("KNvKB", "KBvKN"),
            ("KBvK", "KvKB"),
            ("KNvK", "KvKN"),
            ("KPvK", "KvKP"),
            ("KRvKP", "KPvKR"),
            ("KQvKP", "KPvKQ"),
        ] {
            assert_eq!(Material::from_str(a).unwrap(), Material::from_str(b).unwrap());
        }
    }

    #[test]
    fn material_descendants_not_draw() {
        for (mat, descendants) in [
            ("KvK", vec![]),
            ("KBvK", vec![]),
            ("KRRvK", vec!["KRvK"]),
            ("KPvK", vec!["KRvK", "KQvK"]),
        ] {
            let m = Material::from_str(mat).unwrap();
            assert_eq!(
                HashSet::<Material>::from_iter(m.descendants_not_draw()),
                HashSet::from_iter(descendants.iter().map(|s| Material::from_str(s).unwrap()))
            );
        }
    }
}

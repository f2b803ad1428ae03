//! The per-cell value domain (§3 Score). Grounded on the original's
//! `fegtb.h` numeric bands (`EGTB_SCORE_*`, `TB_*`) rather than inventing new
//! magic numbers (SPEC_FULL §C), generalised into a typed enum the rest of
//! the crate matches on instead of comparing raw integers.
//!
//! `Score` is the in-memory, semantic representation; [`Score::to_u16`]/
//! [`Score::from_u16`] are the wire encoding used by the 1-byte and 2-byte
//! cell modes of the tablebase file (§4.D).

use std::cmp::Ordering;

/// `EGTB_SCORE_MATE` in the original: the "distance from mate" origin.
pub const MATE: i32 = 10_000;

/// Cell reserved codes, shared by both games (`TB_ILLEGAL`/`TB_UNSET`/`TB_MISSING`).
const ILLEGAL_CODE: u16 = 0;
const UNSET_CODE: u16 = 1;
const MISSING_CODE: u16 = 2;

/// `TB_DRAW`: 5 for chess, 7 for xiangqi (the 2-code gap is reserved for the
/// xiangqi-only perpetual bands, which sit just below the draw code).
const CHESS_DRAW_CODE: u16 = 5;
const XIANGQI_DRAW_CODE: u16 = 7;

/// The variant discriminator this crate's header carries explicitly per
/// REDESIGN FLAGS (the original used `_FELICITY_CHESS_`/`_FELICITY_XQ_`
/// conditional compilation for the same distinction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Chess,
    Xiangqi,
}

impl Variant {
    #[must_use]
    pub const fn draw_code(self) -> u16 {
        match self {
            Self::Chess => CHESS_DRAW_CODE,
            Self::Xiangqi => XIANGQI_DRAW_CODE,
        }
    }
}

/// A single tablebase cell value (§3 Score).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Score {
    /// Position cannot arise with the side to move (`TB_ILLEGAL`).
    Illegal,
    /// Not yet computed (build time) or missing at probe time.
    Unset,
    /// File absent at probe time (`TB_MISSING`).
    Missing,
    /// Exact draw.
    Draw,
    /// Win in `plies` for the side to move.
    Win(u16),
    /// Loss in `plies` for the side to move.
    Lose(u16),
    /// Xiangqi only: the side to move perpetually checks and eventually
    /// wins under AXF repetition rules. `plies` counts toward the 120-ply
    /// (`rule120`) bound, mirroring `EGTB_SCORE_PERPETUAL_CHECK`/`_120`.
    PerpetualWin(u16),
    /// Xiangqi only: the side to move is on the losing end of a perpetual
    /// check/chase cycle.
    PerpetualLose(u16),
}

impl Score {
    #[must_use]
    pub const fn is_decisive(self) -> bool {
        matches!(
            self,
            Self::Win(_) | Self::Lose(_) | Self::PerpetualWin(_) | Self::PerpetualLose(_)
        )
    }

    #[must_use]
    pub const fn is_defined(self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// `revert_score` (§4.E): negate a child score into the parent's frame,
    /// advancing the ply count by `inc`. `Missing` propagating here is a
    /// fatal build error per §7, so it is not representable as an input.
    #[must_use]
    pub fn revert(self, inc: u16) -> Self {
        match self {
            Self::Illegal | Self::Unset | Self::Missing => self,
            Self::Draw => Self::Draw,
            Self::Win(d) => Self::Lose(d + inc),
            Self::Lose(d) => Self::Win(d + inc),
            Self::PerpetualWin(d) => Self::PerpetualLose(d + inc),
            Self::PerpetualLose(d) => Self::PerpetualWin(d + inc),
        }
    }

    /// Clamp any score whose absolute DTM/ply count exceeds `dtm_max` (or
    /// 120 plies under `rule120`) down to `Draw` (§4.E, §8 property 5).
    #[must_use]
    pub fn clamp(self, limit: u16) -> Self {
        match self {
            Self::Win(d) | Self::Lose(d) | Self::PerpetualWin(d) | Self::PerpetualLose(d)
                if d > limit =>
            {
                Self::Draw
            }
            other => other,
        }
    }

    /// Total order used by `pick_best_from_rival_score` (§4.E):
    /// `Win(small)` > `Win(large)` > `PerpetualWin` > `Draw` > `PerpetualLose`
    /// > `Lose(large)` > `Lose(small)`. `Illegal`/`Unset`/`Missing` have no
    /// defined order and panic if compared.
    fn rank(self) -> (i32, i32) {
        match self {
            Self::Win(d) => (3, -i32::from(d)),
            Self::PerpetualWin(d) => (2, -i32::from(d)),
            Self::Draw => (1, 0),
            Self::PerpetualLose(d) => (0, i32::from(d)),
            Self::Lose(d) => (-1, i32::from(d)),
            Self::Illegal | Self::Unset | Self::Missing => {
                panic!("no defined order for {self:?}")
            }
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// `pick_best_from_rival_score` (§4.E): `best` is replaced by `child` iff
/// `best` is `Unset` or `child` is strictly greater under [`Score::cmp`].
/// Ties keep the earlier move (`best` is left untouched).
#[must_use]
pub fn pick_best_from_rival_score(best: Score, child: Score) -> Score {
    if !child.is_defined() || matches!(child, Score::Illegal | Score::Missing) {
        return best;
    }
    if best == Score::Unset {
        return child;
    }
    if child > best {
        child
    } else {
        best
    }
}

// 2-byte cell bands: disjoint ranges above the reserved/draw codes, one per
// `Score` variant, wide enough for any DTM this crate will ever produce
// (rule120 clamps well below the headroom here).
const WIN_BASE: u16 = 10;
const PERPETUAL_WIN_BASE: u16 = 40_000;
const PERPETUAL_LOSE_BASE: u16 = 50_000;
const LOSE_BASE: u16 = 60_000;

impl Score {
    /// Encode into the file format's 2-byte cell representation (§4.D
    /// payload layout). Bands are disjoint, so decoding is unambiguous.
    #[must_use]
    pub fn to_u16(self, variant: Variant) -> u16 {
        match self {
            Self::Illegal => ILLEGAL_CODE,
            Self::Unset => UNSET_CODE,
            Self::Missing => MISSING_CODE,
            Self::Draw => variant.draw_code(),
            Self::Win(d) => WIN_BASE + d,
            Self::PerpetualWin(d) => PERPETUAL_WIN_BASE + d,
            Self::PerpetualLose(d) => PERPETUAL_LOSE_BASE + d,
            Self::Lose(d) => LOSE_BASE + d,
        }
    }

    #[must_use]
    pub fn from_u16(code: u16, variant: Variant) -> Self {
        match code {
            ILLEGAL_CODE => Self::Illegal,
            UNSET_CODE => Self::Unset,
            MISSING_CODE => Self::Missing,
            c if c == variant.draw_code() => Self::Draw,
            c if c >= LOSE_BASE => Self::Lose(c - LOSE_BASE),
            c if c >= PERPETUAL_LOSE_BASE => Self::PerpetualLose(c - PERPETUAL_LOSE_BASE),
            c if c >= PERPETUAL_WIN_BASE => Self::PerpetualWin(c - PERPETUAL_WIN_BASE),
            c if c >= WIN_BASE => Self::Win(c - WIN_BASE),
            _ => Self::Illegal,
        }
    }

    /// Encode into the file format's 1-byte cell representation, valid only
    /// while the absolute DTM fits under `dtm_max` (§4.D property flags,
    /// `TWO_BYTES`). Returns `None` when 2-byte mode is required. Perpetual
    /// scores always require 2-byte mode.
    #[must_use]
    pub fn to_u8(self, variant: Variant, dtm_max: u8) -> Option<u8> {
        let half = (255 - variant.draw_code() as u16) / 2;
        match self {
            Self::Illegal => Some(0),
            Self::Unset => Some(1),
            Self::Missing => Some(2),
            Self::Draw => Some(variant.draw_code() as u8),
            Self::Win(d) if d <= u16::from(dtm_max).min(half - 1) => {
                Some((variant.draw_code() + 1 + d) as u8)
            }
            Self::Lose(d) if d <= u16::from(dtm_max).min(half - 1) => {
                Some((variant.draw_code() + 1 + half + d) as u8)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn from_u8(code: u8, variant: Variant) -> Self {
        let half = (255 - variant.draw_code() as u16) / 2;
        let code = u16::from(code);
        match code {
            ILLEGAL_CODE => Self::Illegal,
            UNSET_CODE => Self::Unset,
            MISSING_CODE => Self::Missing,
            c if c == variant.draw_code() => Self::Draw,
            c if c > variant.draw_code() && c <= variant.draw_code() + half => {
                Self::Win(c - variant.draw_code() - 1)
            }
            c if c > variant.draw_code() + half => {
                Self::Lose(c - variant.draw_code() - 1 - half)
            }
            _ => Self::Illegal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_swaps_win_lose() {
        assert_eq!(Score::Win(3).revert(1), Score::Lose(4));
        assert_eq!(Score::Lose(2).revert(1), Score::Win(3));
        assert_eq!(Score::Draw.revert(1), Score::Draw);
        assert_eq!(Score::Unset.revert(1), Score::Unset);
    }

    #[test]
    fn ordering_prefers_faster_mate_and_slower_loss() {
        assert!(Score::Win(1) > Score::Win(2));
        assert!(Score::Win(100) > Score::Draw);
        assert!(Score::Draw > Score::Lose(100));
        assert!(Score::Lose(2) > Score::Lose(1));
        assert!(Score::Win(1) > Score::PerpetualWin(0));
        assert!(Score::PerpetualWin(0) > Score::Draw);
        assert!(Score::Draw > Score::PerpetualLose(0));
        assert!(Score::PerpetualLose(0) > Score::Lose(0));
    }

    #[test]
    fn pick_best_keeps_unset_until_a_defined_child_arrives() {
        let mut best = Score::Unset;
        best = pick_best_from_rival_score(best, Score::Unset);
        assert_eq!(best, Score::Unset);
        best = pick_best_from_rival_score(best, Score::Lose(3));
        assert_eq!(best, Score::Lose(3));
        best = pick_best_from_rival_score(best, Score::Win(5));
        assert_eq!(best, Score::Win(5));
        best = pick_best_from_rival_score(best, Score::Win(1));
        assert_eq!(best, Score::Win(1), "shorter mate wins");
    }

    #[test]
    fn clamp_applies_rule120() {
        assert_eq!(Score::Win(121).clamp(120), Score::Draw);
        assert_eq!(Score::Win(119).clamp(120), Score::Win(119));
    }

    #[test]
    fn byte_roundtrip_chess() {
        for s in [Score::Illegal, Score::Unset, Score::Missing, Score::Draw, Score::Win(10), Score::Lose(20)] {
            let code = s.to_u16(Variant::Chess);
            assert_eq!(Score::from_u16(code, Variant::Chess), s, "{s:?}");
        }
    }

    #[test]
    fn byte_roundtrip_xiangqi_perpetual() {
        for s in [
            Score::Draw,
            Score::PerpetualWin(5),
            Score::PerpetualLose(3),
        ] {
            let code = s.to_u16(Variant::Xiangqi);
            assert_eq!(Score::from_u16(code, Variant::Xiangqi), s, "{s:?}");
        }
    }
}

//! Xiangqi implementation of the [`Board`] capability. Unlike chess there is
//! no teacher crate to lean on, so move generation, check detection and
//! retrograde unmoves are hand-rolled here, loosely styled after the way
//! `shakmaty`/`retroboard` shape the same surface (plain `Vec` move lists,
//! `make`/`unmake` with an opaque history token, a `flip` for canonicalisation)
//! so that `chess.rs` and `xiangqi.rs` read as two implementations of one idea
//! rather than two unrelated engines.

use super::{invalid_fen, Board, Color, FlipMode, MoveLike, Piece, PieceKind, SoloMateClass};
use crate::error::Result;

pub const FILES: u16 = 9;
pub const RANKS: u16 = 10;
pub const CELLS: u16 = FILES * RANKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XiangqiRole {
    King,
    Advisor,
    Elephant,
    Horse,
    Rook,
    Cannon,
    Pawn,
}

impl PieceKind for XiangqiRole {
    // k r c n p a e, per §4.B's canonical xiangqi order.
    const CANONICAL_ORDER: &'static [Self] = &[
        Self::King,
        Self::Rook,
        Self::Cannon,
        Self::Horse,
        Self::Pawn,
        Self::Advisor,
        Self::Elephant,
    ];

    fn king() -> Self {
        Self::King
    }

    fn to_char(self) -> char {
        match self {
            Self::King => 'k',
            Self::Advisor => 'a',
            Self::Elephant => 'e',
            Self::Horse => 'n',
            Self::Rook => 'r',
            Self::Cannon => 'c',
            Self::Pawn => 'p',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        Some(match c.to_ascii_lowercase() {
            'k' | 'g' => Self::King,
            'a' => Self::Advisor,
            'e' | 'b' => Self::Elephant,
            'n' | 'h' => Self::Horse,
            'r' => Self::Rook,
            'c' => Self::Cannon,
            'p' => Self::Pawn,
            _ => return None,
        })
    }

    fn factor_cardinality(self) -> u32 {
        match self {
            Self::Pawn => 55, // 5 files x 2 ranks before the river + 9 files x 5 ranks after
            Self::Advisor => 5, // the palace's diagonal points, one side
            Self::Elephant => 7, // the seven points an elephant can ever stand on, one side
            _ => u32::from(CELLS),
        }
    }

    fn solo_mate_class(self) -> SoloMateClass {
        match self {
            Self::King | Self::Advisor | Self::Elephant => SoloMateClass::NonAttacker,
            Self::Horse | Self::Rook | Self::Cannon | Self::Pawn => SoloMateClass::Decisive,
        }
    }

    fn promotions(self) -> &'static [Self] {
        &[]
    }
}

#[inline]
const fn file_of(sq: u16) -> u16 {
    sq % FILES
}

#[inline]
const fn rank_of(sq: u16) -> u16 {
    sq / FILES
}

#[inline]
const fn sq(file: u16, rank: u16) -> u16 {
    rank * FILES + file
}

fn in_bounds(file: i16, rank: i16) -> bool {
    (0..FILES as i16).contains(&file) && (0..RANKS as i16).contains(&rank)
}

fn in_palace(color: Color, file: u16, rank: u16) -> bool {
    let rank_range = match color {
        Color::White => 0..3,
        Color::Black => 7..10,
    };
    (3..6).contains(&file) && rank_range.contains(&rank)
}

fn on_own_side(color: Color, rank: u16) -> bool {
    match color {
        Color::White => rank < 5,
        Color::Black => rank >= 5,
    }
}

#[derive(Debug, Clone)]
pub struct XiangqiMove {
    pub from: u16,
    pub to: u16,
    pub captured: Option<Piece<XiangqiRole>>,
}

impl MoveLike for XiangqiMove {
    fn is_capture(&self) -> bool {
        self.captured.is_some()
    }

    fn is_promotion(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct XiangqiBoard {
    cells: [Option<Piece<XiangqiRole>>; CELLS as usize],
    turn: Color,
}

impl XiangqiBoard {
    fn empty(turn: Color) -> Self {
        Self {
            cells: [None; CELLS as usize],
            turn,
        }
    }

    fn find(&self, pred: impl Fn(Piece<XiangqiRole>) -> bool) -> Vec<u16> {
        (0..CELLS)
            .filter(|&s| self.cells[s as usize].is_some_and(&pred))
            .collect()
    }

    /// Squares attacked by `color`'s pieces, as seen from the destination
    /// side: used both for `in_check` and, in reverse, to drive retrograde
    /// generation for the direction-symmetric piece kinds.
    fn attacks_from(&self, from: u16, kind: XiangqiRole, color: Color) -> Vec<u16> {
        let f = i16::from(file_of(from));
        let r = i16::from(rank_of(from));
        let mut out = Vec::new();
        match kind {
            XiangqiRole::King => {
                for (df, dr) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                    let (nf, nr) = (f + df, r + dr);
                    if in_bounds(nf, nr) && in_palace(color, nf as u16, nr as u16) {
                        out.push(sq(nf as u16, nr as u16));
                    }
                }
                // Flying general: the opposing general is a pseudo-attacker
                // along a clear file.
                for other in self.find(|p| p.kind == XiangqiRole::King && p.color != color) {
                    if file_of(other) == file_of(from) {
                        let (lo, hi) = (rank_of(from).min(rank_of(other)), rank_of(from).max(rank_of(other)));
                        let clear = (lo + 1..hi).all(|rk| self.cells[sq(file_of(from), rk) as usize].is_none());
                        if clear {
                            out.push(other);
                        }
                    }
                }
            }
            XiangqiRole::Advisor => {
                for (df, dr) in [(1, 1), (1, -1), (-1, 1), (-1, -1)] {
                    let (nf, nr) = (f + df, r + dr);
                    if in_bounds(nf, nr) && in_palace(color, nf as u16, nr as u16) {
                        out.push(sq(nf as u16, nr as u16));
                    }
                }
            }
            XiangqiRole::Elephant => {
                for (df, dr) in [(2, 2), (2, -2), (-2, 2), (-2, -2)] {
                    let (nf, nr) = (f + df, r + dr);
                    let (ef, er) = (f + df / 2, r + dr / 2);
                    if in_bounds(nf, nr)
                        && on_own_side(color, nr as u16)
                        && self.cells[sq(ef as u16, er as u16) as usize].is_none()
                    {
                        out.push(sq(nf as u16, nr as u16));
                    }
                }
            }
            XiangqiRole::Horse => {
                for (df, dr, lf, lr) in [
                    (1, 2, 0, 1),
                    (-1, 2, 0, 1),
                    (1, -2, 0, -1),
                    (-1, -2, 0, -1),
                    (2, 1, 1, 0),
                    (2, -1, 1, 0),
                    (-2, 1, -1, 0),
                    (-2, -1, -1, 0),
                ] {
                    let (nf, nr) = (f + df, r + dr);
                    let (lf, lr) = (f + lf, r + lr);
                    if in_bounds(nf, nr) && self.cells[sq(lf as u16, lr as u16) as usize].is_none() {
                        out.push(sq(nf as u16, nr as u16));
                    }
                }
            }
            XiangqiRole::Rook => {
                for (df, dr) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                    let (mut nf, mut nr) = (f + df, r + dr);
                    while in_bounds(nf, nr) {
                        out.push(sq(nf as u16, nr as u16));
                        if self.cells[sq(nf as u16, nr as u16) as usize].is_some() {
                            break;
                        }
                        nf += df;
                        nr += dr;
                    }
                }
            }
            XiangqiRole::Cannon => {
                // Pseudo-attacks here include both the quiet-rook-like reach
                // (every empty square before the screen) and the one-screen
                // capture reach (the first occupied square strictly beyond
                // the screen); capture legality is filtered by the caller
                // comparing occupancy at `to`. The screen square itself is
                // never a reachable square — a cannon cannot capture (or
                // pass through as quiet) the piece it's jumping over.
                for (df, dr) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                    let (mut nf, mut nr) = (f + df, r + dr);
                    let mut screened = false;
                    while in_bounds(nf, nr) {
                        let occupied = self.cells[sq(nf as u16, nr as u16) as usize].is_some();
                        if !screened {
                            if occupied {
                                screened = true;
                            } else {
                                out.push(sq(nf as u16, nr as u16));
                            }
                        } else if occupied {
                            out.push(sq(nf as u16, nr as u16));
                            break;
                        }
                        nf += df;
                        nr += dr;
                    }
                }
            }
            XiangqiRole::Pawn => {
                let forward = if color == Color::White { 1 } else { -1 };
                let (nf, nr) = (f, r + forward);
                if in_bounds(nf, nr) {
                    out.push(sq(nf as u16, nr as u16));
                }
                if !on_own_side(color, rank_of(from)) {
                    for df in [-1, 1] {
                        let nf2 = f + df;
                        if in_bounds(nf2, r) {
                            out.push(sq(nf2 as u16, r as u16));
                        }
                    }
                }
            }
        }
        out
    }

    fn pseudo_legal_moves(&self, side: Color) -> Vec<XiangqiMove> {
        let mut moves = Vec::new();
        for from in 0..CELLS {
            let Some(piece) = self.cells[from as usize] else {
                continue;
            };
            if piece.color != side {
                continue;
            }
            for to in self.attacks_from(from, piece.kind, side) {
                let target = self.cells[to as usize];
                if piece.kind == XiangqiRole::Cannon {
                    // A cannon's non-screened reach is quiet-only; the
                    // screened extension beyond is a capture-only square.
                    let quiet = target.is_none();
                    let is_capture_square = target.is_some_and(|t| t.color != side);
                    if !quiet && !is_capture_square {
                        continue;
                    }
                } else if target.is_some_and(|t| t.color == side) {
                    continue;
                }
                moves.push(XiangqiMove { from, to, captured: target });
            }
        }
        moves
    }

    fn simulate(&self, mv: &XiangqiMove) -> Self {
        let mut b = self.clone();
        b.cells[mv.to as usize] = b.cells[mv.from as usize];
        b.cells[mv.from as usize] = None;
        b
    }
}

impl Board for XiangqiBoard {
    type Kind = XiangqiRole;
    type Move = XiangqiMove;
    type Hist = (u16, u16, Option<Piece<XiangqiRole>>);

    const CELLS: usize = CELLS as usize;

    // The board isn't square and has no rank symmetry (river, palace), so
    // the left-right mirror is the only king-pair symmetry in either band.
    const KING_PAIR_SYMMETRY_FULL: &'static [FlipMode] = &[FlipMode::Horizontal];
    const KING_PAIR_SYMMETRY_PAWN: &'static [FlipMode] = &[FlipMode::Horizontal];

    fn kings_always_illegal(_wk: u16, _bk: u16) -> bool {
        // The two palaces never share a rank, so the kings are never close
        // enough to attack each other directly; the flying-general rule is a
        // per-position legality check, not a static property of the pair.
        false
    }

    fn zone(kind: Self::Kind, color: Color) -> Vec<u16> {
        let rank_range: [u16; 3] = match color {
            Color::White => [0, 1, 2],
            Color::Black => [7, 8, 9],
        };
        match kind {
            XiangqiRole::King => rank_range.iter().flat_map(|&r| (3..6).map(move |f| sq(f, r))).collect(),
            XiangqiRole::Advisor => [(3, 0), (5, 0), (4, 1), (3, 2), (5, 2)]
                .into_iter()
                .map(|(f, r)| sq(f, if color == Color::White { r } else { 9 - r }))
                .collect(),
            XiangqiRole::Elephant => {
                let base: [(u16, u16); 7] = [(0, 2), (2, 0), (2, 4), (4, 2), (6, 0), (6, 4), (8, 2)];
                base.into_iter()
                    .map(|(f, r)| sq(f, if color == Color::White { r } else { 9 - r }))
                    .collect()
            }
            XiangqiRole::Pawn => (0..CELLS)
                .filter(|&s| {
                    let (f, r) = (file_of(s), rank_of(s));
                    let crossed = !on_own_side(color, r);
                    let pre_river_ranks: [u16; 2] = if color == Color::White { [3, 4] } else { [5, 6] };
                    crossed || (pre_river_ranks.contains(&r) && f % 2 == 0)
                })
                .collect(),
            XiangqiRole::Horse | XiangqiRole::Rook | XiangqiRole::Cannon => (0..CELLS).collect(),
        }
    }

    fn empty() -> Self {
        Self::empty(Color::White)
    }

    fn new_game(fen: Option<&str>) -> Result<Self> {
        let fen = fen.unwrap_or("rheakaehr/9/1c5c1/p1p1p1p1p/9/9/P1P1P1P1P/1C5C1/9/RHEAKAEHR w");
        let mut parts = fen.split_whitespace();
        let placement = parts
            .next()
            .ok_or_else(|| invalid_fen("empty xiangqi FEN"))?;
        let turn = parts
            .next()
            .and_then(|s| s.chars().next())
            .and_then(Color::from_char)
            .unwrap_or(Color::White);

        let mut board = Self::empty(turn);
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != RANKS as usize {
            return Err(invalid_fen(format!(
                "expected {} ranks, got {}",
                RANKS,
                ranks.len()
            )));
        }
        for (i, rank_str) in ranks.iter().enumerate() {
            // FEN ranks run from black's (rank 9) side down to white's (rank 0).
            let rank = RANKS - 1 - i as u16;
            let mut file = 0u16;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u16;
                    continue;
                }
                let color = if c.is_ascii_uppercase() {
                    Color::White
                } else {
                    Color::Black
                };
                let kind = XiangqiRole::from_char(c)
                    .ok_or_else(|| invalid_fen(format!("unknown piece char '{c}'")))?;
                if file >= FILES {
                    return Err(invalid_fen("rank overflows board width"));
                }
                board.cells[sq(file, rank) as usize] = Some(Piece::new(color, kind));
                file += 1;
            }
        }
        Ok(board)
    }

    fn to_fen(&self) -> String {
        let mut ranks = Vec::with_capacity(RANKS as usize);
        for rank in (0..RANKS).rev() {
            let mut s = String::new();
            let mut empty = 0u32;
            for file in 0..FILES {
                match self.cells[sq(file, rank) as usize] {
                    None => empty += 1,
                    Some(p) => {
                        if empty > 0 {
                            s.push_str(&empty.to_string());
                            empty = 0;
                        }
                        s.push(p.to_char());
                    }
                }
            }
            if empty > 0 {
                s.push_str(&empty.to_string());
            }
            ranks.push(s);
        }
        format!("{} {}", ranks.join("/"), self.turn.char())
    }

    fn side_to_move(&self) -> Color {
        self.turn
    }

    fn set_side_to_move(&mut self, color: Color) {
        self.turn = color;
    }

    fn legal_moves(&self, side: Color) -> Vec<Self::Move> {
        self.pseudo_legal_moves(side)
            .into_iter()
            .filter(|mv| !self.simulate(mv).in_check(side))
            .collect()
    }

    fn make(&mut self, mv: &Self::Move) -> Self::Hist {
        let hist = (mv.from, mv.to, self.cells[mv.to as usize]);
        self.cells[mv.to as usize] = self.cells[mv.from as usize];
        self.cells[mv.from as usize] = None;
        self.turn = self.turn.other();
        hist
    }

    fn unmake(&mut self, hist: Self::Hist) {
        let (from, to, captured) = hist;
        self.cells[from as usize] = self.cells[to as usize];
        self.cells[to as usize] = captured;
        self.turn = self.turn.other();
    }

    fn in_check(&self, side: Color) -> bool {
        let Some(king_sq) = self.find_king(side) else {
            return false;
        };
        self.find(|p| p.color != side)
            .into_iter()
            .any(|from| {
                let kind = self.cells[from as usize].expect("occupied square").kind;
                self.attacks_from(from, kind, side.other()).contains(&king_sq)
            })
    }

    fn find_king(&self, side: Color) -> Option<u16> {
        self.find(|p| p.kind == XiangqiRole::King && p.color == side)
            .into_iter()
            .next()
    }

    fn piece_at(&self, sq: u16) -> Option<Piece<Self::Kind>> {
        self.cells[sq as usize]
    }

    fn set_piece(&mut self, sq: u16, piece: Option<Piece<Self::Kind>>) {
        self.cells[sq as usize] = piece;
    }

    fn has_attackers(&self) -> bool {
        self.cells.iter().flatten().any(|p| {
            matches!(
                p.kind,
                XiangqiRole::Horse | XiangqiRole::Rook | XiangqiRole::Cannon | XiangqiRole::Pawn
            )
        })
    }

    fn piece_list_is_draw(&self) -> bool {
        !self.has_attackers()
    }

    fn is_legal_position(&self) -> bool {
        let kings: Vec<_> = self.find(|p| p.kind == XiangqiRole::King);
        let white_kings = kings.iter().filter(|&&s| self.cells[s as usize].unwrap().color == Color::White).count();
        let black_kings = kings.iter().filter(|&&s| self.cells[s as usize].unwrap().color == Color::Black).count();
        if white_kings != 1 || black_kings != 1 {
            return false;
        }
        for &k in &kings {
            let piece = self.cells[k as usize].unwrap();
            if !in_palace(piece.color, file_of(k), rank_of(k)) {
                return false;
            }
        }
        !self.in_check(self.turn.other())
    }

    fn flip(&mut self, mode: FlipMode) {
        assert!(
            mode == FlipMode::Horizontal,
            "xiangqi's board has only a left-right mirror symmetry"
        );
        let mut mirrored = [None; CELLS as usize];
        for s in 0..CELLS {
            let mirror_file = FILES - 1 - file_of(s);
            mirrored[sq(mirror_file, rank_of(s)) as usize] = self.cells[s as usize];
        }
        self.cells = mirrored;
    }

    fn quiet_predecessors(&self) -> Vec<(Self, Self::Move)> {
        let last_mover = self.turn.other();
        let mut out = Vec::new();
        for to in self.find(|p| p.color == last_mover) {
            let piece = self.cells[to as usize].expect("occupied");
            let mut without = self.clone();
            without.cells[to as usize] = None;
            let candidates: Vec<u16> = if piece.kind == XiangqiRole::Pawn {
                without.pawn_retreat_candidates(to, last_mover)
            } else {
                without.attacks_from(to, piece.kind, last_mover)
            };
            for from in candidates {
                if without.cells[from as usize].is_some() {
                    continue;
                }
                if piece.kind == XiangqiRole::Cannon {
                    // Only the unscreened (quiet-capable) reach is a valid
                    // quiet predecessor origin for a cannon.
                    if !without.cannon_quiet_reach(to).contains(&from) {
                        continue;
                    }
                }
                let mut predecessor = without.clone();
                predecessor.cells[from as usize] = Some(piece);
                predecessor.turn = last_mover;
                if !predecessor.is_legal_position() {
                    continue;
                }
                let mv = XiangqiMove { from, to, captured: None };
                out.push((predecessor, mv));
            }
        }
        out
    }

    fn all_predecessors(&self) -> Vec<(Self, Self::Move)> {
        let mut out = self.quiet_predecessors();
        let last_mover = self.turn.other();
        for to in self.find(|p| p.color == last_mover) {
            let piece = self.cells[to as usize].expect("occupied");
            let mut without = self.clone();
            without.cells[to as usize] = None;
            let candidates: Vec<u16> = if piece.kind == XiangqiRole::Pawn {
                without.pawn_retreat_candidates(to, last_mover)
            } else {
                without.attacks_from(to, piece.kind, last_mover)
            };
            for from in candidates {
                if without.cells[from as usize].is_some() {
                    continue;
                }
                for uncaptured in XiangqiRole::CANONICAL_ORDER
                    .iter()
                    .copied()
                    .filter(|&k| k != XiangqiRole::King)
                {
                    let mut predecessor = without.clone();
                    predecessor.cells[from as usize] = Some(piece);
                    predecessor.cells[to as usize] = Some(Piece::new(last_mover.other(), uncaptured));
                    predecessor.turn = last_mover;
                    if !predecessor.is_legal_position() {
                        continue;
                    }
                    let mv = XiangqiMove {
                        from,
                        to,
                        captured: Some(Piece::new(last_mover.other(), uncaptured)),
                    };
                    out.push((predecessor, mv));
                }
            }
        }
        out
    }
}

impl XiangqiBoard {
    fn cannon_quiet_reach(&self, from: u16) -> Vec<u16> {
        let f = i16::from(file_of(from));
        let r = i16::from(rank_of(from));
        let mut out = Vec::new();
        for (df, dr) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let (mut nf, mut nr) = (f + df, r + dr);
            while in_bounds(nf, nr) {
                if self.cells[sq(nf as u16, nr as u16) as usize].is_some() {
                    break;
                }
                out.push(sq(nf as u16, nr as u16));
                nf += df;
                nr += dr;
            }
        }
        out
    }

    /// Candidate squares a pawn belonging to `color` could have quietly
    /// moved from to reach `to`: one step back along its own file, or (only
    /// once it has crossed the river) one step sideways.
    fn pawn_retreat_candidates(&self, to: u16, color: Color) -> Vec<u16> {
        let f = i16::from(file_of(to));
        let r = i16::from(rank_of(to));
        let backward = if color == Color::White { -1 } else { 1 };
        let mut out = Vec::new();
        let (bf, br) = (f, r + backward);
        if in_bounds(bf, br) {
            out.push(sq(bf as u16, br as u16));
        }
        if !on_own_side(color, rank_of(to)) {
            // to is across the river: sideways retreat is also possible.
            for df in [-1, 1] {
                let (nf, nr) = (f + df, r);
                if in_bounds(nf, nr) {
                    out.push(sq(nf as u16, nr as u16));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_round_trips_fen() {
        let b = XiangqiBoard::new_game(None).unwrap();
        assert_eq!(b.side_to_move(), Color::White);
        assert!(b.is_legal_position());
    }

    #[test]
    fn kings_facing_with_clear_file_is_check() {
        let b = XiangqiBoard::new_game(Some("4k4/9/9/9/9/9/9/9/9/4K4 w")).unwrap();
        assert!(b.in_check(Color::White));
        assert!(!b.is_legal_position());
    }

    #[test]
    fn bare_kings_has_no_attackers() {
        let b = XiangqiBoard::new_game(Some("3k5/9/9/9/9/9/9/9/9/3K5 w")).unwrap();
        assert!(!b.has_attackers());
        assert!(b.piece_list_is_draw());
    }
}

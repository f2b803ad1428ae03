//! The index codec (§4.C): a bijection between a canonicalised `(Board,
//! side to move)` and a dense `u64` used to address the tablebase file.
//!
//! Grounded on the collaborator crate's king-triangle + combinatorial
//! ranking approach (`indexer.rs`/`indexer_syzygy.rs`), generalised over
//! [`Board`] instead of hardcoding `shakmaty`: every non-king piece group is
//! ranked as an unordered choice of squares out of that piece's
//! [`Board::zone`], using the combinatorial number system (the same "choose
//! k of n" trick the collaborator applies to its pawn/knight/bishop
//! factors).
//!
//! The king pair is the one factor that needs its own table rather than a
//! plain combination rank: [`KingPairs`] enumerates every `(white_king,
//! black_king)` placement that isn't trivially illegal (the two kings
//! adjacent), groups the rest into orbits under whichever board symmetry
//! applies (the full 8-element group with no pawn on the board, the
//! mirror-only group once a pawn restricts it — [`Board::KING_PAIR_SYMMETRY_FULL`]/
//! [`Board::KING_PAIR_SYMMETRY_PAWN`]), and keeps one representative per
//! orbit. For chess this reproduces the original engine's exact
//! `EGTB_SIZE_KK8`/`EGTB_SIZE_KK2` counts (462/1806); [`Indexer::space_size`]
//! is therefore a tight count of the legal representative space, not an
//! upper bound padded by symmetric duplicates. See DESIGN.md.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use crate::board::{Board, Color, FlipMode, Piece, PieceKind};
use crate::material::Material;

/// `n choose k`, computed directly since the codec never deals with boards
/// larger than xiangqi's 90 cells.
fn comb(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        result = result * u128::from(n - i) / u128::from(i + 1);
    }
    result as u64
}

/// Combinatorial number system rank of an ascending list of distinct
/// positions drawn from `0..n` (§4.C "identical piece group" ranking).
fn rank_combination(sorted_ascending: &[usize]) -> u64 {
    sorted_ascending
        .iter()
        .enumerate()
        .map(|(i, &e)| comb(e as u64, (i + 1) as u64))
        .sum()
}

/// Inverse of [`rank_combination`]: the unique ascending `k`-subset of
/// `0..n` with this rank.
fn unrank_combination(mut rank: u64, n: usize, k: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(k);
    let mut upper = n;
    for i in (1..=k).rev() {
        let mut chosen = i - 1;
        for cand in (i - 1..upper).rev() {
            if comb(cand as u64, i as u64) <= rank {
                chosen = cand;
                break;
            }
        }
        out.push(chosen);
        rank -= comb(chosen as u64, i as u64);
        upper = chosen;
    }
    out.reverse();
    out
}

/// Swap every piece's color and flip the side to move, using only the
/// generic [`Board`] surface (works identically for chess and xiangqi).
fn swap_colors<B: Board>(board: &mut B) {
    for sq in 0..B::CELLS as u16 {
        if let Some(piece) = board.piece_at(sq) {
            board.set_piece(
                sq,
                Some(Piece {
                    color: piece.color.other(),
                    kind: piece.kind,
                }),
            );
        }
    }
    board.set_side_to_move(board.side_to_move().other());
}

/// Place two marker kings at `wk`/`bk`, apply `mode`, and read back where
/// they landed. Reuses the board's own [`Board::flip`] instead of hand
/// rolling file/rank arithmetic per game.
fn flip_king_pair<B: Board>(mode: FlipMode, wk: u16, bk: u16) -> (u16, u16) {
    let mut board = B::empty();
    board.set_piece(wk, Some(Piece::new(Color::White, B::Kind::king())));
    board.set_piece(bk, Some(Piece::new(Color::Black, B::Kind::king())));
    board.flip(mode);
    (
        board.find_king(Color::White).expect("white king marker survives flip"),
        board.find_king(Color::Black).expect("black king marker survives flip"),
    )
}

/// Among `symmetries` plus doing nothing, the flip (if any) that carries
/// `board`'s king pair to the lexicographically smallest `(white_king,
/// black_king)` square pair. `None` means the board is already canonical.
fn best_king_pair_flip<B: Board>(board: &B, symmetries: &'static [FlipMode]) -> Option<FlipMode> {
    let wk = board.find_king(Color::White).expect("board has a white king");
    let bk = board.find_king(Color::Black).expect("board has a black king");
    let mut best = (wk, bk);
    let mut chosen = None;
    for &mode in symmetries {
        let mut probe = board.clone();
        probe.flip(mode);
        let pair = (
            probe.find_king(Color::White).expect("king survives flip"),
            probe.find_king(Color::Black).expect("king survives flip"),
        );
        if pair < best {
            best = pair;
            chosen = Some(mode);
        }
    }
    chosen
}

/// The exact, symmetry-reduced king-pair table for one board type and one
/// symmetry band (with or without a pawn on the board). One entry per orbit
/// of `(white_king, black_king)` under the chosen symmetry group, adjacent
/// (always-illegal) pairs excluded entirely (§4.C).
struct KingPairs {
    pairs: Vec<(u16, u16)>,
    rank_of: HashMap<(u16, u16), u32>,
}

impl KingPairs {
    fn build<B: Board>(symmetries: &'static [FlipMode]) -> Self {
        let mut seen = HashSet::new();
        let mut reps = Vec::new();
        for wk in 0..B::CELLS as u16 {
            for bk in 0..B::CELLS as u16 {
                if wk == bk || B::kings_always_illegal(wk, bk) || seen.contains(&(wk, bk)) {
                    continue;
                }
                let mut orbit = vec![(wk, bk)];
                for &mode in symmetries {
                    orbit.push(flip_king_pair::<B>(mode, wk, bk));
                }
                let rep = *orbit.iter().min().expect("orbit always has the base pair");
                seen.extend(orbit);
                reps.push(rep);
            }
        }
        reps.sort_unstable();
        let rank_of = reps.iter().enumerate().map(|(i, &pair)| (pair, i as u32)).collect();
        Self { pairs: reps, rank_of }
    }
}

/// Lazily built, cached per board type and per symmetry band: building the
/// table is a handful of thousand [`Board::flip`] calls, cheap once, but
/// `Indexer`s are constructed far more often than that (once per
/// sub-tablebase probed during generation), so it's worth not repeating.
fn king_pairs_for<B: Board>(has_pawns: bool) -> Arc<KingPairs> {
    static NO_PAWNS: OnceLock<Arc<KingPairs>> = OnceLock::new();
    static WITH_PAWNS: OnceLock<Arc<KingPairs>> = OnceLock::new();
    let cell = if has_pawns { &WITH_PAWNS } else { &NO_PAWNS };
    cell.get_or_init(|| {
        let symmetries = if has_pawns { B::KING_PAIR_SYMMETRY_PAWN } else { B::KING_PAIR_SYMMETRY_FULL };
        Arc::new(KingPairs::build::<B>(symmetries))
    })
    .clone()
}

/// Available squares shrink as each factor is placed; both `encode` and
/// `decode` walk the same factor order so the shrinking is reproducible
/// without the decoder ever having seen a real board (§4.C).
struct Pool {
    remaining: Vec<u16>,
}

impl Pool {
    fn new(cells: usize) -> Self {
        Self {
            remaining: (0..cells as u16).collect(),
        }
    }

    fn restrict(&self, zone: &[u16]) -> Vec<u16> {
        self.remaining
            .iter()
            .copied()
            .filter(|sq| zone.contains(sq))
            .collect()
    }

    fn remove(&mut self, sq: u16) {
        self.remaining.retain(|&s| s != sq);
    }

    fn remove_all(&mut self, squares: &[u16]) {
        self.remaining.retain(|s| !squares.contains(s));
    }
}

/// Bijective `(canonical board) <-> u64` mapping for one material signature
/// (§4.C). One `Indexer` serves both sides' boards: the material is already
/// normalised (white = stronger side), so encoding a board with black the
/// stronger side implicitly swaps colors first and reports it via the
/// returned `flip` bit, matching `Material::from_pieces_with_flip`.
pub struct Indexer<B: Board> {
    material: Material<B::Kind>,
    king_pairs: Arc<KingPairs>,
}

impl<B: Board> Indexer<B> {
    #[must_use]
    pub fn new(material: Material<B::Kind>) -> Self {
        let king_pairs = king_pairs_for::<B>(material.has_pawns());
        for (kind, color, _count) in material.order_vector() {
            debug_assert_eq!(
                B::zone(kind, color).len() as u32,
                kind.factor_cardinality(),
                "{kind:?}'s zone and its declared factor_cardinality disagree"
            );
        }
        Self { material, king_pairs }
    }

    #[must_use]
    pub fn material(&self) -> &Material<B::Kind> {
        &self.material
    }

    fn king_pair_symmetry(&self) -> &'static [FlipMode] {
        if self.material.has_pawns() {
            B::KING_PAIR_SYMMETRY_PAWN
        } else {
            B::KING_PAIR_SYMMETRY_FULL
        }
    }

    /// Exact number of indices this material signature can produce: the
    /// legal, symmetry-reduced king-pair count, times `C(|zone(kind,
    /// color)|, count)` for every other piece group. Some indices below this
    /// bound still never decode to a legal position (two pieces sharing a
    /// square, or a king left in check by the side not to move); those probe
    /// as [`crate::score::Score::Illegal`].
    #[must_use]
    pub fn space_size(&self) -> u64 {
        let mut size = self.king_pairs.pairs.len() as u64;
        for (kind, color, count) in self.material.order_vector() {
            let zone_len = B::zone(kind, color).len() as u64;
            size *= comb(zone_len, u64::from(count));
        }
        size
    }

    /// Canonicalise `board` into this indexer's convention: stronger side
    /// relabelled white if needed, then whichever board symmetry (per
    /// [`Indexer::king_pair_symmetry`]) carries the king pair to its
    /// lexicographically smallest table representative. Returns the
    /// color-swap bit alongside the canonical board, mirroring `encode`'s
    /// `flip` output so callers can apply it to a looked-up score via
    /// [`crate::score::Score::revert`] semantics where relevant (a pure
    /// color swap does not change the value, only the geometric reflection
    /// does; see §4.C).
    #[must_use]
    pub fn canonical(&self, board: &B) -> (B, bool) {
        let pieces = (0..B::CELLS as u16).filter_map(|sq| board.piece_at(sq));
        let (_, flip) = Material::<B::Kind>::from_pieces_with_flip(pieces);
        let mut out = board.clone();
        if flip {
            swap_colors(&mut out);
        }
        if let Some(mode) = best_king_pair_flip(&out, self.king_pair_symmetry()) {
            out.flip(mode);
        }
        (out, flip)
    }

    /// Encode a board already known to match this indexer's material
    /// signature. Returns `(index, flip)`; `flip` is `true` iff the board
    /// had to be color-swapped to match the signature's "stronger side is
    /// white" convention (§4.C `flip_side`).
    #[must_use]
    pub fn encode(&self, board: &B) -> (u64, bool) {
        let (canonical, flip) = self.canonical(board);
        let mut pool = Pool::new(B::CELLS);

        let wk = canonical
            .find_king(Color::White)
            .expect("canonical board has a white king");
        let bk = canonical
            .find_king(Color::Black)
            .expect("canonical board has a black king");
        let king_rank = *self
            .king_pairs
            .rank_of
            .get(&(wk, bk))
            .expect("canonicalize leaves the king pair at a table representative");
        pool.remove(wk);
        pool.remove(bk);

        // The king pair is the least-significant digit, matching the decode
        // order below.
        let mut idx = u64::from(king_rank);
        let mut place = self.king_pairs.pairs.len() as u64;

        for (kind, color, count) in self.material.order_vector() {
            let zone: Vec<u16> = pool.restrict(&B::zone(kind, color));
            let squares: Vec<u16> = (0..B::CELLS as u16)
                .filter(|&sq| {
                    canonical
                        .piece_at(sq)
                        .is_some_and(|p| p.kind == kind && p.color == color)
                })
                .collect();
            let positions: Vec<usize> = squares
                .iter()
                .map(|sq| zone.iter().position(|z| z == sq).expect("piece occupies a square in its own zone"))
                .collect();
            let mut sorted_positions = positions.clone();
            sorted_positions.sort_unstable();
            let card = comb(zone.len() as u64, u64::from(count));
            let rank = rank_combination(&sorted_positions);
            idx += place * rank;
            place *= card.max(1);
            pool.remove_all(&squares);
        }

        (idx, flip)
    }

    /// Decode an index produced by this indexer's material signature back
    /// into a concrete board. The result may fail [`Board::is_legal_position`]
    /// for indices past the exact legal-position count; callers that only
    /// probe legal positions never hit this, but the generator's
    /// classification phase (§4.E) walks every index and must check.
    #[must_use]
    pub fn decode(&self, mut idx: u64) -> B {
        let mut board = B::empty();
        let mut pool = Pool::new(B::CELLS);

        let king_card = self.king_pairs.pairs.len() as u64;
        let king_rank = (idx % king_card) as usize;
        idx /= king_card;
        let (wk, bk) = self.king_pairs.pairs[king_rank];
        board.set_piece(wk, Some(Piece::new(Color::White, B::Kind::king())));
        board.set_piece(bk, Some(Piece::new(Color::Black, B::Kind::king())));
        pool.remove(wk);
        pool.remove(bk);

        for (kind, color, count) in self.material.order_vector() {
            let zone: Vec<u16> = pool.restrict(&B::zone(kind, color));
            let card = comb(zone.len() as u64, u64::from(count)).max(1);
            let rank = idx % card;
            idx /= card;
            let positions = unrank_combination(rank, zone.len(), usize::from(count));
            let squares: Vec<u16> = positions.iter().map(|&p| zone[p]).collect();
            for &sq in &squares {
                board.set_piece(sq, Some(Piece::new(color, kind)));
            }
            pool.remove_all(&squares);
        }

        board.set_side_to_move(Color::White);
        board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::chess::ChessBoard;

    fn indexer(material: &str) -> Indexer<ChessBoard> {
        Indexer::new(material.parse().unwrap())
    }

    #[test]
    fn king_pair_round_trips() {
        let idx = indexer("KvK");
        let board = ChessBoard::new_game(Some("4k3/8/8/8/8/8/8/K7 w - - 0 1")).unwrap();
        let (canonical, _) = idx.canonical(&board);
        let (code, _) = idx.encode(&canonical);
        let decoded = idx.decode(code);
        assert_eq!(decoded.find_king(Color::White), canonical.find_king(Color::White));
        assert_eq!(decoded.find_king(Color::Black), canonical.find_king(Color::Black));
    }

    #[test]
    fn single_extra_piece_round_trips() {
        let idx = indexer("KQvK");
        let board = ChessBoard::new_game(Some("4k3/8/8/8/3Q4/8/8/K7 w - - 0 1")).unwrap();
        let (canonical, _) = idx.canonical(&board);
        let (code, _) = idx.encode(&canonical);
        let decoded = idx.decode(code);
        for sq in 0..64u16 {
            assert_eq!(decoded.piece_at(sq).map(|p| p.to_char()), canonical.piece_at(sq).map(|p| p.to_char()), "square {sq}");
        }
    }

    #[test]
    fn decode_then_encode_is_idempotent_on_legal_positions() {
        let idx = indexer("KRvK");
        let board = ChessBoard::new_game(Some("4k3/8/8/8/8/8/8/1R1K4 w - - 0 1")).unwrap();
        let (canonical, _) = idx.canonical(&board);
        let (code, _) = idx.encode(&canonical);
        let decoded = idx.decode(code);
        let (code2, _) = idx.encode(&decoded);
        assert_eq!(code, code2);
    }

    #[test]
    fn space_size_matches_exact_king_pair_count() {
        let idx = indexer("KQvK");
        // 462 legal, symmetry-reduced king placements (matches the original
        // engine's pawnless EGTB_SIZE_KK8) * C(64, 1) queen squares.
        assert_eq!(idx.space_size(), 462 * 64);
    }

    #[test]
    fn pawn_material_uses_the_mirror_only_king_pair_count() {
        let idx = indexer("KPvK");
        // 1806 legal king placements under the mirror-only band (matches the
        // original engine's EGTB_SIZE_KK2); the pawn's zone is 48 squares.
        assert_eq!(idx.space_size(), 1806 * 48);
    }

    #[test]
    fn adjacent_kings_never_appear_in_the_king_pair_table() {
        let pairs = king_pairs_for::<ChessBoard>(false);
        for &(wk, bk) in &pairs.pairs {
            assert!(!ChessBoard::kings_always_illegal(wk, bk), "{wk} {bk}");
        }
    }

    #[test]
    fn flip_side_swaps_colors_for_black_stronger_material() {
        let idx = indexer("KQvK");
        // Black holds the queen here; canonicalisation must relabel it white.
        let board = ChessBoard::new_game(Some("4k3/8/8/8/3q4/8/8/K7 w - - 0 1")).unwrap();
        let (_, flip) = idx.encode(&board);
        assert!(flip);
    }
}

//! Chess implementation of the [`Board`] capability, grounded directly on the
//! teacher's own dependency: `retroboard`/`shakmaty` already provide piece
//! placement, FEN I/O, full legal move generation, check detection and
//! retrograde ("unmove") generation, which is exactly the collaborator
//! surface §4.A asks for — so this module is a thin adapter, not a
//! reimplementation.

use retroboard::shakmaty::{
    self, Bitboard, ByColor, CastlingMode, Color as ShColor, FromSetup, Piece as ShPiece,
    Position, Rank, Role as ShRole, Setup, Square,
};
use retroboard::RetroBoard;

use super::{invalid_fen, Board, Color, FlipMode, MoveLike, Piece, PieceKind, SoloMateClass};
use crate::error::Result;

/// Newtype so the generic indexer/material code can implement [`PieceKind`]
/// for chess without reaching into `shakmaty` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChessRole(pub ShRole);

impl PieceKind for ChessRole {
    // k q r b n p, per §4.B's canonical chess order.
    const CANONICAL_ORDER: &'static [Self] = &[
        Self(ShRole::King),
        Self(ShRole::Queen),
        Self(ShRole::Rook),
        Self(ShRole::Bishop),
        Self(ShRole::Knight),
        Self(ShRole::Pawn),
    ];

    fn king() -> Self {
        Self(ShRole::King)
    }

    fn to_char(self) -> char {
        self.0.char()
    }

    fn from_char(c: char) -> Option<Self> {
        ShRole::from_char(c.to_ascii_lowercase()).map(Self)
    }

    fn factor_cardinality(self) -> u32 {
        match self.0 {
            ShRole::Pawn => 48, // ranks 2..7, §4.C
            _ => 64,
        }
    }

    fn solo_mate_class(self) -> SoloMateClass {
        match self.0 {
            ShRole::King => SoloMateClass::NonAttacker,
            ShRole::Bishop | ShRole::Knight => SoloMateClass::NeedsHelp,
            ShRole::Rook | ShRole::Queen | ShRole::Pawn => SoloMateClass::Decisive,
        }
    }

    fn promotions(self) -> &'static [Self] {
        match self.0 {
            ShRole::Pawn => &[
                Self(ShRole::Queen),
                Self(ShRole::Rook),
                Self(ShRole::Bishop),
                Self(ShRole::Knight),
            ],
            _ => &[],
        }
    }
}

fn to_sh_color(c: Color) -> ShColor {
    match c {
        Color::White => ShColor::White,
        Color::Black => ShColor::Black,
    }
}

fn from_sh_color(c: ShColor) -> Color {
    match c {
        ShColor::White => Color::White,
        ShColor::Black => Color::Black,
    }
}

fn to_sh_piece(p: Piece<ChessRole>) -> ShPiece {
    ShPiece {
        color: to_sh_color(p.color),
        role: p.kind.0,
    }
}

fn from_sh_piece(p: ShPiece) -> Piece<ChessRole> {
    Piece::new(from_sh_color(p.color), ChessRole(p.role))
}

#[derive(Debug, Clone)]
pub enum ChessMove {
    Forward(shakmaty::Move),
    /// A retracted unmove: the move that, played from `self`, would reach
    /// the board this was generated against.
    Retracted {
        role: ShRole,
        from: Square,
        to: Square,
        uncapture: Option<ShRole>,
        unpromotion: bool,
    },
}

impl MoveLike for ChessMove {
    fn is_capture(&self) -> bool {
        match self {
            Self::Forward(m) => m.is_capture(),
            Self::Retracted { uncapture, .. } => uncapture.is_some(),
        }
    }

    fn is_promotion(&self) -> bool {
        match self {
            Self::Forward(m) => m.is_promotion(),
            Self::Retracted { unpromotion, .. } => *unpromotion,
        }
    }
}

/// Is every right in `castling_rights` a rook sitting on one of the four
/// standard home corners? If so a FEN's `KQkq` notation is unambiguous and
/// `CastlingMode::Standard` applies; anything else (a rook elsewhere, as
/// chess960 shredder-FEN castling produces) needs `CastlingMode::Chess960`.
fn detect_castling_mode(castling_rights: Bitboard) -> CastlingMode {
    let standard_corners =
        Bitboard::from(Square::A1) | Bitboard::from(Square::H1) | Bitboard::from(Square::A8) | Bitboard::from(Square::H8);
    if (castling_rights & !standard_corners).is_empty() {
        CastlingMode::Standard
    } else {
        CastlingMode::Chess960
    }
}

/// §4.A's board capability for chess: a raw piece placement + side to move,
/// converted to a full `shakmaty::Chess` position only when forward legality
/// (move generation, check detection) is actually needed. Kept separate from
/// `Chess` itself because the index codec reconstructs boards piece-by-piece
/// (§4.C's retrograde reconstruction contract) before they are known legal.
/// `castling_rights`/`ep_square` carry the game-specific state a bare piece
/// placement can't: a rook's home square still matters for castling even
/// after the rook itself no longer threatens anything relevant to the index.
#[derive(Debug, Clone)]
pub struct ChessBoard {
    board: shakmaty::Board,
    turn: Color,
    castling_rights: Bitboard,
    ep_square: Option<Square>,
    castling_mode: CastlingMode,
}

impl ChessBoard {
    #[must_use]
    pub fn from_board(board: shakmaty::Board, turn: Color) -> Self {
        Self {
            board,
            turn,
            castling_rights: Bitboard::EMPTY,
            ep_square: None,
            castling_mode: CastlingMode::Standard,
        }
    }

    #[must_use]
    pub fn shakmaty_board(&self) -> &shakmaty::Board {
        &self.board
    }

    fn setup(&self) -> Setup {
        let mut setup = Setup::empty();
        setup.board = self.board.clone();
        setup.turn = to_sh_color(self.turn);
        setup.castling_rights = self.castling_rights;
        setup.ep_square = self.ep_square;
        setup
    }

    /// Attempt to view this as a fully legal chess position, ignoring the
    /// "no more than one checker" restriction the way the generator's
    /// reconstruction does (`to_chess_with_illegal_checks`): a position one
    /// ply before a move was made can have the side not to move in check
    /// from more than one piece only if it's about to be resolved, which
    /// never survives `is_legal_position`, so callers that already checked
    /// legality won't notice the relaxation.
    fn to_chess(&self) -> Option<shakmaty::Chess> {
        shakmaty::Chess::from_setup(self.setup(), self.castling_mode)
            .or_else(shakmaty::PositionError::ignore_impossible_check)
            .ok()
    }

    fn to_retro(&self) -> Option<RetroBoard> {
        RetroBoard::from_setup(self.setup(), self.castling_mode).ok()
    }
}

impl Board for ChessBoard {
    type Kind = ChessRole;
    type Move = ChessMove;
    type Hist = (shakmaty::Board, Color, Bitboard, Option<Square>);

    const CELLS: usize = 64;

    // The full 8-element symmetry group of a square board: the 3 non-trivial
    // rotations and the 4 reflections, matching the original's pawnless
    // EGTB_SIZE_KK8 king-pair reduction.
    const KING_PAIR_SYMMETRY_FULL: &'static [FlipMode] = &[
        FlipMode::Horizontal,
        FlipMode::Vertical,
        FlipMode::Rotate180,
        FlipMode::FlipVH,
        FlipMode::FlipHV,
        FlipMode::Rotate90,
        FlipMode::Rotate270,
    ];

    // A pawn's forward direction survives only the left-right mirror.
    const KING_PAIR_SYMMETRY_PAWN: &'static [FlipMode] = &[FlipMode::Horizontal];

    fn kings_always_illegal(wk: u16, bk: u16) -> bool {
        let (wf, wr) = (i32::from(wk % 8), i32::from(wk / 8));
        let (bf, br) = (i32::from(bk % 8), i32::from(bk / 8));
        (wf - bf).abs() <= 1 && (wr - br).abs() <= 1
    }

    fn zone(kind: Self::Kind, _color: Color) -> Vec<u16> {
        if kind.0 == ShRole::Pawn {
            (8..56).collect()
        } else {
            (0..64).collect()
        }
    }

    fn empty() -> Self {
        Self {
            board: shakmaty::Board::empty(),
            turn: Color::White,
            castling_rights: Bitboard::EMPTY,
            ep_square: None,
            castling_mode: CastlingMode::Standard,
        }
    }

    fn new_game(fen: Option<&str>) -> Result<Self> {
        let fen = fen.unwrap_or("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        let setup: Setup = shakmaty::fen::Fen::from_ascii(fen.as_bytes())
            .map_err(|e| invalid_fen(e.to_string()))?
            .into_setup();
        let turn = from_sh_color(setup.turn);
        let castling_mode = detect_castling_mode(setup.castling_rights);
        let board = Self {
            board: setup.board,
            turn,
            castling_rights: setup.castling_rights,
            ep_square: setup.ep_square,
            castling_mode,
        };
        // `Chess::from_setup` rejects castling rights that don't point at an
        // actual rook/king on its home square and en-passant squares that
        // aren't legally capturable; surface either as an invalid FEN rather
        // than silently dropping the offending state.
        if board.to_chess().is_none() {
            return Err(invalid_fen(format!("illegal castling rights or en-passant square in {fen:?}")));
        }
        Ok(board)
    }

    fn to_fen(&self) -> String {
        self.to_chess()
            .map(|c| {
                shakmaty::fen::Fen::from_position(c, shakmaty::EnPassantMode::Legal).to_string()
            })
            .unwrap_or_else(|| format!("{} {}", self.board.board_fen(Bitboard::EMPTY), self.turn.char()))
    }

    fn side_to_move(&self) -> Color {
        self.turn
    }

    fn set_side_to_move(&mut self, color: Color) {
        self.turn = color;
    }

    fn legal_moves(&self, side: Color) -> Vec<Self::Move> {
        let effective = if side == self.turn {
            self.to_chess()
        } else {
            let mut flipped = self.clone();
            flipped.turn = side;
            flipped.to_chess()
        };
        effective
            .map(|pos| {
                pos.legal_moves()
                    .iter()
                    .cloned()
                    .map(ChessMove::Forward)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn make(&mut self, mv: &Self::Move) -> Self::Hist {
        let hist = (self.board.clone(), self.turn, self.castling_rights, self.ep_square);
        if let ChessMove::Forward(m) = mv {
            if let Some(pos) = self.to_chess() {
                let after = pos.play(m).expect("move generated as legal");
                let setup = after.into_setup(shakmaty::EnPassantMode::Legal);
                self.board = setup.board;
                self.turn = from_sh_color(setup.turn);
                self.castling_rights = setup.castling_rights;
                self.ep_square = setup.ep_square;
            }
        }
        hist
    }

    fn unmake(&mut self, hist: Self::Hist) {
        self.board = hist.0;
        self.turn = hist.1;
        self.castling_rights = hist.2;
        self.ep_square = hist.3;
    }

    fn in_check(&self, side: Color) -> bool {
        self.find_king(side)
            .is_some_and(|king| self.board.attacks_to(
                Square::new(u32::from(king)),
                to_sh_color(side).other(),
                self.board.occupied(),
            ).any())
    }

    fn find_king(&self, side: Color) -> Option<u16> {
        self.board
            .king_of(to_sh_color(side))
            .map(|sq| sq as u16)
    }

    fn piece_at(&self, sq: u16) -> Option<Piece<Self::Kind>> {
        self.board
            .piece_at(Square::new(u32::from(sq)))
            .map(from_sh_piece)
    }

    fn set_piece(&mut self, sq: u16, piece: Option<Piece<Self::Kind>>) {
        let square = Square::new(u32::from(sq));
        match piece {
            Some(p) => self.board.set_piece_at(square, to_sh_piece(p)),
            None => self.board.remove_piece_at(square),
        };
    }

    fn has_attackers(&self) -> bool {
        ShColor::ALL.iter().any(|&c| {
            self.board.by_color(c).count()
                > usize::from(self.board.king_of(c).is_some())
        })
    }

    fn piece_list_is_draw(&self) -> bool {
        !self.has_attackers()
    }

    fn is_legal_position(&self) -> bool {
        self.to_chess().is_some()
            && !self.in_check(self.turn.other())
            && ByColor::<Bitboard>::new_with(|c| self.board.by_color(c) & self.board.kings())
                .iter()
                .all(|bb| bb.count() == 1)
            && Rank::ALL.iter().all(|&r| {
                (r == Rank::First || r == Rank::Eighth)
                    .then(|| (self.board.pawns() & Bitboard::from_rank(r)).is_empty())
                    .unwrap_or(true)
            })
    }

    fn has_legal_en_passant_capture(&self) -> bool {
        self.ep_square.is_some()
            && self
                .to_chess()
                .map(|pos| pos.legal_moves().iter().any(shakmaty::Move::is_en_passant))
                .unwrap_or(false)
    }

    fn flip(&mut self, mode: FlipMode) {
        match mode {
            FlipMode::Horizontal => self.board.flip_horizontal(),
            FlipMode::Vertical => self.board.flip_vertical(),
            FlipMode::Rotate180 => self.board.rotate_180(),
            FlipMode::FlipVH => self.board.flip_diagonal(),
            FlipMode::FlipHV => self.board.flip_anti_diagonal(),
            FlipMode::Rotate90 => self.board.rotate_90(),
            FlipMode::Rotate270 => self.board.rotate_270(),
        }
    }

    fn quiet_predecessors(&self) -> Vec<(Self, Self::Move)> {
        self.all_predecessors()
            .into_iter()
            .filter(|(_, mv)| !mv.is_capture() && !mv.is_promotion())
            .collect()
    }

    fn all_predecessors(&self) -> Vec<(Self, Self::Move)> {
        let Some(rboard) = self.to_retro() else {
            return Vec::new();
        };
        rboard
            .legal_unmoves()
            .into_iter()
            .map(|unmove| {
                let mut after = rboard.clone();
                after.push(&unmove);
                let predecessor = Self {
                    board: after.board().clone(),
                    turn: from_sh_color(!after.retro_turn()),
                    castling_rights: self.castling_rights,
                    ep_square: None,
                    castling_mode: self.castling_mode,
                };
                let mv = ChessMove::Retracted {
                    role: unmove.role,
                    from: unmove.from,
                    to: unmove.to,
                    uncapture: unmove.uncapture,
                    unpromotion: unmove.promotion,
                };
                (predecessor, mv)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_fen() {
        let b = ChessBoard::new_game(Some("8/8/8/8/4k3/8/4K3/4Q3 w - - 0 1")).unwrap();
        assert_eq!(b.side_to_move(), Color::White);
        assert!(b.is_legal_position());
    }

    #[test]
    fn starting_position_has_attackers_flag() {
        let b = ChessBoard::new_game(None).unwrap();
        assert!(b.has_attackers());
    }

    #[test]
    fn two_kings_is_draw() {
        let b = ChessBoard::new_game(Some("8/8/8/8/4k3/8/4K3/8 w - - 0 1")).unwrap();
        assert!(b.piece_list_is_draw());
    }
}

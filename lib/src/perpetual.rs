//! Xiangqi perpetual-check/chase classifier (§4.F). Runs once, after
//! [`crate::generation::Generator::converge`] reaches its fixed point, over
//! whatever cells are still `Unset`: by construction (any cell with even one
//! resolving child would already have been classified) every surviving
//! `Unset` cell's entire legal subtree is a repetition cycle.
//!
//! Grounded on the original's `xqchasejudge`/`xqchaselist`/`xqchaserecord`
//! trio, folded into one module per SPEC_FULL §C: [`ChaseRecord`] captures
//! what `XqChaseRecord` captured (attacker/victim piece and square, whether
//! the victim is really protected), [`ChaseList`] is `XqChaseListPair`'s
//! per-cycle collection plus the AXF 1999 exemption test, and [`classify`]
//! plays the role of `XqChaseJudge::evaluate` but driven by the same
//! backward-quiet worklist the generator itself uses instead of a
//! forward game-tree walk.

use crate::board::{Board, Color, PieceKind};
use crate::indexer::Indexer;
use crate::score::{pick_best_from_rival_score, Score};

/// One attack inside a suspected perpetual-chase cycle: `attacker` threatens
/// to capture `victim` next ply unless the chased side moves it away again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaseRecord<K> {
    pub attacker_kind: K,
    pub attacker_square: u16,
    pub victim_kind: K,
    pub victim_square: u16,
    /// The victim has a legal recapture available at the square the attacker
    /// would take it on ("really protected": a root recaptures legally).
    pub protected: bool,
    /// The victim itself threatens to capture the attacker, on the
    /// attacker's own square, rather than recapturing on its own square
    /// (AXF rule 3's "counter-attack list is non-empty" — distinct from
    /// `protected`, which is rule 4's root-recapture test).
    pub counter_attack_available: bool,
    /// The victim has not yet crossed its own river (xiangqi pawns only;
    /// irrelevant, and left `false`, for every other piece).
    pub victim_before_river: bool,
}

impl<K: PieceKind> ChaseRecord<K> {
    fn is_king_or_pawn_attacker(&self) -> bool {
        self.attacker_kind == K::king() || kind_name(self.attacker_kind) == "Pawn"
    }

    fn is_pre_river_pawn_victim(&self) -> bool {
        kind_name(self.victim_kind) == "Pawn" && self.victim_before_river
    }

    fn is_same_type_exchange(&self) -> bool {
        self.attacker_kind == self.victim_kind && self.counter_attack_available
    }

    /// The one AXF exception that is *never* exempt even when every other
    /// rule would otherwise grant it: a rook perpetually chased by a horse
    /// or a cannon.
    fn is_rook_chased_by_horse_or_cannon(&self) -> bool {
        kind_name(self.victim_kind) == "Rook"
            && matches!(kind_name(self.attacker_kind).as_str(), "Horse" | "Cannon")
    }
}

fn kind_name<K: std::fmt::Debug>(kind: K) -> String {
    format!("{kind:?}")
}

/// Every attack the chasing side made across one suspected cycle (one per
/// legal reply the chased side had available, per §4.F pass 1's DFS).
#[derive(Debug, Clone)]
pub struct ChaseList<K>(pub Vec<ChaseRecord<K>>);

impl<K> ChaseList<K> {
    fn empty() -> Self {
        Self(Vec::new())
    }
}

impl<K: PieceKind> ChaseList<K> {
    /// AXF 1999 chase rules (§4.F): exempt (drawn, not a forced perpetual
    /// result) iff any of the four textual rules holds across every attack
    /// in the cycle.
    #[must_use]
    pub fn is_exempt(&self) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let king_or_pawn_chase = self.0.iter().all(ChaseRecord::is_king_or_pawn_attacker);
        let pre_river_pawn_victim = self.0.iter().all(ChaseRecord::is_pre_river_pawn_victim);
        if king_or_pawn_chase || pre_river_pawn_victim {
            return true;
        }
        if self.0.iter().all(ChaseRecord::is_same_type_exchange) {
            return true;
        }
        self.0.iter().all(|r| r.protected && !r.is_rook_chased_by_horse_or_cannon())
    }
}

fn get(white: &[Score], black: &[Score], side: Color, idx: u64) -> Score {
    match side {
        Color::White => white[idx as usize],
        Color::Black => black[idx as usize],
    }
}

fn set(white: &mut [Score], black: &mut [Score], side: Color, idx: u64, score: Score) {
    match side {
        Color::White => white[idx as usize] = score,
        Color::Black => black[idx as usize] = score,
    }
}

/// Pass 1 seed (§4.F): a side stuck in check with no way to stop it is
/// unconditionally adjudicated in the evading side's favour ("positions
/// involving perpetual check unconditionally favour the evading side"),
/// regardless of the chase exemption rules (those only ever apply to
/// checkless chases).
fn seed_score<B: Board>(board: &B, side: Color) -> Option<Score> {
    if board.in_check(side) {
        return Some(Score::PerpetualWin(0));
    }
    detect_chase(board, side).map(|chases| if chases.is_exempt() { Score::Draw } else { Score::PerpetualWin(0) })
}

/// Does every legal reply `side` has leave one of its own pieces under
/// immediate, unanswerable capture? If so this is a chase cycle: `side` is
/// being perpetually chased and (absent an AXF exemption) its opponent
/// forfeits for refusing to vary the attack.
fn detect_chase<B: Board>(board: &B, side: Color) -> Option<ChaseList<B::Kind>> {
    let moves = board.legal_moves(side);
    if moves.is_empty() {
        return None;
    }
    let mut chases = ChaseList::empty();
    for mv in &moves {
        let mut after = board.clone();
        after.make(mv);
        chases.0.push(threat_against::<B>(&after, side)?);
    }
    Some(chases)
}

/// From a position where `side.other()` is to move, find a legal capture of
/// one of `side`'s pieces and describe it as a [`ChaseRecord`]. `None` means
/// this particular reply escapes the chase entirely.
fn threat_against<B: Board>(after: &B, side: Color) -> Option<ChaseRecord<B::Kind>> {
    let opp = side.other();
    for mv in after.legal_moves(opp) {
        if !mv.is_capture() {
            continue;
        }
        let mut captured = after.clone();
        captured.make(&mv);

        let victim_square = (0..B::CELLS as u16).find(|&sq| {
            matches!(after.piece_at(sq), Some(p) if p.color == side)
                && !matches!(captured.piece_at(sq), Some(p) if p.color == side)
        })?;
        let victim = after.piece_at(victim_square)?;

        let attacker_square = (0..B::CELLS as u16).find(|&sq| {
            matches!(after.piece_at(sq), Some(p) if p.color == opp) && captured.piece_at(sq).is_none()
        })?;
        let attacker = after.piece_at(attacker_square)?;

        let protected = recapture_available(&captured, side, victim_square);
        let counter_attack_available = counter_attack_available(after, side, attacker_square);
        let victim_before_river = !crossed_river::<B>(victim_square, side);

        return Some(ChaseRecord {
            attacker_kind: attacker.kind,
            attacker_square,
            victim_kind: victim.kind,
            victim_square,
            protected,
            counter_attack_available,
            victim_before_river,
        });
    }
    None
}

fn recapture_available<B: Board>(captured: &B, side: Color, victim_square: u16) -> bool {
    for mv in captured.legal_moves(side) {
        let mut after = captured.clone();
        after.make(&mv);
        if matches!(after.piece_at(victim_square), Some(p) if p.color == side) {
            return true;
        }
    }
    false
}

/// Does `side`, from `after` (before the opponent's capture is made), have a
/// legal capture landing on `attacker_square`? Unlike `recapture_available`
/// (which asks whether the victim's own square is retaken after the
/// capture), this asks whether the victim threatens the attacker directly.
fn counter_attack_available<B: Board>(after: &B, side: Color, attacker_square: u16) -> bool {
    if !matches!(after.piece_at(attacker_square), Some(p) if p.color != side) {
        return false;
    }
    for mv in after.legal_moves(side) {
        if !mv.is_capture() {
            continue;
        }
        let mut post = after.clone();
        post.make(&mv);
        if post.piece_at(attacker_square).is_none() {
            return true;
        }
    }
    false
}

/// Assumes xiangqi's 9-file, 10-rank geometry (the only board this
/// exemption rule ever applies to); every other board reports "crossed" so
/// the pre-river exemption never misfires outside xiangqi.
fn crossed_river<B: Board>(square: u16, color: Color) -> bool {
    if B::CELLS != 90 {
        return true;
    }
    let rank = square / 9;
    match color {
        Color::White => rank >= 5,
        Color::Black => rank <= 4,
    }
}

fn resolved_score_from_children<B: Board>(
    indexer: &Indexer<B>,
    board: &B,
    side: Color,
    white: &[Score],
    black: &[Score],
) -> Option<Score> {
    let mut board = board.clone();
    board.set_side_to_move(side);
    let mut best = Score::Unset;
    for mv in &board.legal_moves(side) {
        let mut after = board.clone();
        after.make(mv);
        let (enc_idx, flip) = indexer.encode(&after);
        let child = get(white, black, after.side_to_move() ^ flip, enc_idx);
        best = pick_best_from_rival_score(best, child.revert(1));
    }
    if best == Score::Unset {
        None
    } else {
        Some(best)
    }
}

/// Run both passes of §4.F to completion, mutating `white`/`black` in
/// place. Cells that remain `Unset` afterwards are symmetric cycles neither
/// side can break out of by varying its own moves and are scored `Draw`.
pub fn classify<B: Board>(indexer: &Indexer<B>, white: &mut [Score], black: &mut [Score]) {
    let n = white.len() as u64;
    let mut worklist = Vec::new();

    // Pass 1: seed every still-unresolved cell that is itself an evasion
    // (check) or chase (threatened capture) dead end.
    for idx in 0..n {
        for side in [Color::White, Color::Black] {
            if get(white, black, side, idx) != Score::Unset {
                continue;
            }
            let mut board = indexer.decode(idx);
            board.set_side_to_move(side);
            if let Some(score) = seed_score(&board, side) {
                set(white, black, side, idx, score);
                worklist.push((idx, side));
            }
        }
    }

    // Pass 2: propagate backward over quiet moves only (§4.F); captures and
    // promotions change material and were already resolved by the
    // classical retrograde fixed point before this module ever runs.
    while let Some((idx, side)) = worklist.pop() {
        let mut board = indexer.decode(idx);
        board.set_side_to_move(side);
        for (predecessor, _mv) in board.quiet_predecessors() {
            let (pred_idx, flip) = indexer.encode(&predecessor);
            let pred_side = predecessor.side_to_move() ^ flip;
            if get(white, black, pred_side, pred_idx) != Score::Unset {
                continue;
            }
            if let Some(score) =
                resolved_score_from_children(indexer, &predecessor, predecessor.side_to_move(), white, black)
            {
                set(white, black, pred_side, pred_idx, score);
                worklist.push((pred_idx, pred_side));
            }
        }
    }

    for idx in 0..n {
        for side in [Color::White, Color::Black] {
            if get(white, black, side, idx) == Score::Unset {
                set(white, black, side, idx, Score::Draw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::xiangqi::XiangqiRole;

    fn record(
        attacker: XiangqiRole,
        victim: XiangqiRole,
        protected: bool,
        counter_attack_available: bool,
        victim_before_river: bool,
    ) -> ChaseRecord<XiangqiRole> {
        ChaseRecord {
            attacker_kind: attacker,
            attacker_square: 0,
            victim_kind: victim,
            victim_square: 1,
            protected,
            counter_attack_available,
            victim_before_river,
        }
    }

    #[test]
    fn king_or_pawn_attacker_is_exempt() {
        let chases = ChaseList(vec![record(XiangqiRole::King, XiangqiRole::Rook, false, false, false)]);
        assert!(chases.is_exempt());
    }

    #[test]
    fn pre_river_pawn_victim_is_exempt() {
        let chases = ChaseList(vec![record(XiangqiRole::Cannon, XiangqiRole::Pawn, false, false, true)]);
        assert!(chases.is_exempt());
    }

    #[test]
    fn same_type_protected_exchange_is_exempt() {
        let chases = ChaseList(vec![record(XiangqiRole::Rook, XiangqiRole::Rook, true, true, false)]);
        assert!(chases.is_exempt());
    }

    #[test]
    fn same_type_exchange_with_counter_attack_but_no_root_recapture_is_exempt() {
        // Rule 3 is distinct from rule 4: the victim threatens the attacker
        // directly without being able to retake on its own square.
        let chases = ChaseList(vec![record(XiangqiRole::Rook, XiangqiRole::Rook, false, true, false)]);
        assert!(chases.is_exempt());
    }

    #[test]
    fn rook_chased_by_horse_is_never_exempt_even_if_protected() {
        let chases = ChaseList(vec![record(XiangqiRole::Horse, XiangqiRole::Rook, true, false, false)]);
        assert!(!chases.is_exempt());
    }

    #[test]
    fn unprotected_cross_type_chase_is_not_exempt() {
        let chases = ChaseList(vec![record(XiangqiRole::Cannon, XiangqiRole::Horse, false, false, false)]);
        assert!(!chases.is_exempt());
    }
}

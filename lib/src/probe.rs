//! Read-only access to already-built tablebase files (§4.G). Grounded on
//! the collaborator crate's `TablebaseProber`: a cache of opened
//! [`TablebaseFile`]s keyed by material name, probed lazily the first time
//! a position of that material is seen.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::board::{Board, Color};
use crate::config::EgtbMemMode;
use crate::error::{Error, Result};
use crate::file_handler::TablebaseFile;
use crate::indexer::Indexer;
use crate::material::Material;
use crate::score::{pick_best_from_rival_score, Score, Variant};

/// A cycle length at which xiangqi's AXF rules force a repetition verdict
/// regardless of what the tablebase says about the position in isolation
/// (§4.G "a re-entry whose cycle length >= 4 terminates the line").
const MIN_REPETITION_CYCLE: u16 = 4;

/// Halfmoves since the last capture/promotion before a line is forcibly cut
/// (§4.G, mirroring the generator's `rule120`).
const HALFMOVE_CAP: u16 = 120;

pub struct TablebaseProber<B: Board> {
    table_dir: PathBuf,
    variant: Variant,
    mem_mode: EgtbMemMode,
    tables: HashMap<String, TablebaseFile>,
    _board: PhantomData<fn() -> B>,
}

impl<B: Board> TablebaseProber<B> {
    #[must_use]
    pub fn new(table_dir: impl AsRef<Path>, variant: Variant, mem_mode: EgtbMemMode) -> Self {
        Self {
            table_dir: table_dir.as_ref().to_path_buf(),
            variant,
            mem_mode,
            tables: HashMap::new(),
            _board: PhantomData,
        }
    }

    /// Loads `material`'s file on first use. A missing or unreadable file is
    /// reported as [`Error::MaterialNotLoaded`] rather than the raw I/O
    /// error, so [`probe`](Self::probe) can tell "not generated yet" apart
    /// from a genuinely corrupt file and degrade accordingly (§7).
    fn table_for(&mut self, material: &Material<B::Kind>) -> Result<&TablebaseFile> {
        let name = format!("{material:?}");
        if !self.tables.contains_key(&name) {
            let path = self.table_dir.join(format!("{name}.fdtm"));
            let file = TablebaseFile::open(&path, self.mem_mode)
                .map_err(|_| Error::MaterialNotLoaded { material: name.clone() })?;
            self.tables.insert(name.clone(), file);
        }
        Ok(self.tables.get(&name).expect("just inserted"))
    }

    /// `probe(board) -> Score` (§4.G): canonicalise via the index codec and
    /// fetch the cell. Drawn-by-insufficient-material positions never hit
    /// disk, matching the generator's own sub-tablebase shortcut. Per §7's
    /// propagation policy, a missing table is non-fatal: it degrades to
    /// [`Score::Missing`] instead of failing the whole probe.
    pub fn probe(&mut self, board: &B) -> Result<Score> {
        let pieces = (0..B::CELLS as u16).filter_map(|sq| board.piece_at(sq));
        let material = Material::<B::Kind>::from_pieces(pieces);
        if !material.is_mate_possible() {
            return Ok(Score::Draw);
        }

        // The index codec never encodes en passant (§4.C): a position whose
        // en-passant capture is legally available would alias, under the
        // index, to the otherwise-identical position without that right.
        // Degrade to one ply of direct move expansion instead of trusting a
        // stored score that may not have accounted for the capture.
        if board.has_legal_en_passant_capture() {
            let legal = board.legal_moves(board.side_to_move());
            if !legal.is_empty() {
                let mut best = Score::Unset;
                for mv in &legal {
                    let mut after = board.clone();
                    after.make(mv);
                    let reverted = self.probe(&after)?.revert(1);
                    best = pick_best_from_rival_score(best, reverted);
                }
                return Ok(best);
            }
        }

        let indexer = Indexer::<B>::new(material.clone());
        let (idx, flip) = indexer.encode(board);
        let side = board.side_to_move() ^ flip;
        match self.table_for(&material) {
            Ok(file) => file.score_at(idx, side),
            Err(Error::MaterialNotLoaded { .. }) => Ok(Score::Missing),
            Err(e) => Err(e),
        }
    }

    /// `best_line(board) -> (Result, moves[])` (§4.G): greedily follow, at
    /// each step, the move whose reverted score is
    /// [`pick_best_from_rival_score`]'s pick among that position's legal
    /// moves — the same selection rule the generator used to build the
    /// table, so this always recovers a line consistent with the stored
    /// score. Repetition (cycle length >= 4) and the 120-halfmove cap both
    /// terminate the line early, matching the lattice's own closed
    /// repetition/perpetual outcomes.
    pub fn best_line(&mut self, board: &B) -> Result<(Score, Vec<B::Move>)> {
        let root_score = self.probe(board)?;
        let mut line = Vec::new();
        let mut current = board.clone();
        let mut visited: HashMap<(u64, Color), u16> = HashMap::new();
        let mut halfmove_clock: u16 = 0;
        let mut ply: u16 = 0;

        loop {
            let pieces = (0..B::CELLS as u16).filter_map(|sq| current.piece_at(sq));
            let material = Material::<B::Kind>::from_pieces(pieces);
            let indexer = Indexer::<B>::new(material);
            let (canonical_idx, flip) = indexer.encode(&current);
            let key = (canonical_idx, current.side_to_move() ^ flip);
            if let Some(&seen_ply) = visited.get(&key) {
                if ply - seen_ply >= MIN_REPETITION_CYCLE {
                    break;
                }
            }
            visited.insert(key, ply);

            if halfmove_clock >= HALFMOVE_CAP {
                break;
            }

            let side = current.side_to_move();
            let legal = current.legal_moves(side);
            if legal.is_empty() {
                break;
            }

            let mut best_score = Score::Unset;
            let mut best_move = None;
            for mv in &legal {
                let mut after = current.clone();
                after.make(mv);
                let reverted = self.probe(&after)?.revert(1);
                let updated = pick_best_from_rival_score(best_score, reverted);
                if updated != best_score {
                    best_score = updated;
                    best_move = Some(mv.clone());
                }
            }
            let Some(mv) = best_move else { break };

            halfmove_clock = if mv.is_capture() || mv.is_promotion() { 0 } else { halfmove_clock + 1 };
            current.make(&mv);
            line.push(mv);
            ply += 1;
        }

        Ok((root_score, line))
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        self.variant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::chess::ChessBoard;
    use crate::board::ByColor;
    use crate::config::GeneratorConfig;
    use crate::generation::Generator;

    fn build_and_write(mat: &str, dir: &std::path::Path) {
        let material: Material<<ChessBoard as Board>::Kind> = mat.parse().unwrap();
        let generator =
            Generator::<ChessBoard>::new(material, Variant::Chess, GeneratorConfig::default(), dir).unwrap();
        let (white, black) = generator.generate().unwrap();
        let sides = ByColor { white: Some(white), black: Some(black) };
        let order_id = crate::file_handler::factor_order_id(generator.material());
        TablebaseFile::write(dir.join(format!("{mat}.fdtm")), mat, Variant::Chess, 125, order_id, &sides).unwrap();
    }

    #[test]
    fn probe_matches_a_freshly_built_table() {
        let dir = std::env::temp_dir().join(format!("felicity_egtb_probe_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        build_and_write("KvK", &dir);

        let mut prober = TablebaseProber::<ChessBoard>::new(&dir, Variant::Chess, EgtbMemMode::All);
        let board = ChessBoard::new_game(Some("4k3/8/8/8/8/8/8/4K3 w - - 0 1")).unwrap();
        assert_eq!(prober.probe(&board).unwrap(), Score::Draw);

        std::fs::remove_dir_all(&dir).ok();
    }
}

//! The retrograde fixed-point generator (§4.E), partitioned across a
//! `std::thread::scope` worker pool per §5's concurrency model. Grounded on
//! the collaborator crate's `Tagger`/`process_one_queue` two-phase
//! backward search (classify terminal positions, then repeatedly pull a
//! `DRAW`/`WIN`/`LOSE` value back one ply until nothing changes), generalised
//! from chess-only single-winner helpmate scoring to two-sided [`Score`]
//! over any [`Board`] implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use crate::board::{Board, Color};
use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::file_handler::TablebaseFile;
use crate::indexer::Indexer;
use crate::material::Material;
use crate::score::{pick_best_from_rival_score, Score, Variant};

/// Both sides' score arrays for one material signature, stored as atomics
/// so the worker pool can read/write cells concurrently without a lock.
/// Per §5, ordering between workers within a pass is unspecified and
/// tolerated (the fixed point is monotone), so `Relaxed` is sufficient —
/// the pass barrier (not per-cell ordering) is what makes each pass's
/// writes visible to the next.
struct Table {
    white: Vec<AtomicU16>,
    black: Vec<AtomicU16>,
    variant: Variant,
}

impl Table {
    fn new(n: usize, variant: Variant) -> Self {
        let unset = Score::Unset.to_u16(variant);
        Self {
            white: (0..n).map(|_| AtomicU16::new(unset)).collect(),
            black: (0..n).map(|_| AtomicU16::new(unset)).collect(),
            variant,
        }
    }

    fn arr(&self, side: Color) -> &[AtomicU16] {
        match side {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn get(&self, side: Color, idx: u64) -> Score {
        Score::from_u16(self.arr(side)[idx as usize].load(Ordering::Relaxed), self.variant)
    }

    fn set(&self, side: Color, idx: u64, score: Score) {
        self.arr(side)[idx as usize].store(score.to_u16(self.variant), Ordering::Relaxed);
    }

    fn into_vecs(self) -> (Vec<Score>, Vec<Score>) {
        let variant = self.variant;
        let to_scores = |v: Vec<AtomicU16>| v.into_iter().map(|a| Score::from_u16(a.into_inner(), variant)).collect();
        (to_scores(self.white), to_scores(self.black))
    }
}

/// Split `0..n` into `threads` contiguous ranges and run `f` over each
/// range on its own scoped thread, joining before returning (§5 "a
/// fixed-size worker pool processes disjoint index ranges").
fn parallel_for(n: u64, threads: usize, f: impl Fn(u64) + Sync) {
    let threads = threads.max(1);
    let chunk = n.div_ceil(threads as u64).max(1);
    std::thread::scope(|scope| {
        for t in 0..threads {
            let start = (t as u64) * chunk;
            let end = ((t as u64 + 1) * chunk).min(n);
            if start >= end {
                continue;
            }
            let f = &f;
            scope.spawn(move || {
                for idx in start..end {
                    f(idx);
                }
            });
        }
    });
}

/// Like [`parallel_for`], but `f` can fail: a required sub-tablebase missing
/// mid-build (§7) is fatal, not something a worker can silently paper over.
/// The first error any worker observes is latched into a shared cell and
/// returned once every worker has stopped; workers that haven't hit it yet
/// keep running their own remaining indices rather than being torn down
/// mid-range; the pass barrier still holds since this still joins every
/// thread before returning.
fn parallel_for_fallible(n: u64, threads: usize, f: impl Fn(u64) -> Result<()> + Sync) -> Result<()> {
    let threads = threads.max(1);
    let chunk = n.div_ceil(threads as u64).max(1);
    let error: std::sync::Mutex<Option<Error>> = std::sync::Mutex::new(None);
    std::thread::scope(|scope| {
        for t in 0..threads {
            let start = (t as u64) * chunk;
            let end = ((t as u64 + 1) * chunk).min(n);
            if start >= end {
                continue;
            }
            let f = &f;
            let error = &error;
            scope.spawn(move || {
                for idx in start..end {
                    if error.lock().unwrap().is_some() {
                        break;
                    }
                    if let Err(e) = f(idx) {
                        let mut guard = error.lock().unwrap();
                        if guard.is_none() {
                            *guard = Some(e);
                        }
                        break;
                    }
                }
            });
        }
    });
    match error.into_inner().unwrap() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub struct Generator<B: Board> {
    material: Material<B::Kind>,
    indexer: Indexer<B>,
    variant: Variant,
    config: GeneratorConfig,
    sub_tables: HashMap<String, TablebaseFile>,
}

impl<B: Board> Generator<B> {
    /// Load every non-draw descendant material's file from `table_dir`
    /// (§4.E "sub-tablebase probing"). Fails with
    /// [`Error::MissingSubTablebase`] if the build order was violated.
    pub fn new(
        material: Material<B::Kind>,
        variant: Variant,
        config: GeneratorConfig,
        table_dir: &Path,
    ) -> Result<Self> {
        let indexer = Indexer::new(material.clone());
        let mut sub_tables = HashMap::new();
        for sub in material.descendants_not_draw() {
            let name = format!("{sub:?}");
            let path = table_dir.join(format!("{name}.fdtm"));
            let file = TablebaseFile::open(&path, config.mem_mode)
                .map_err(|_| Error::MissingSubTablebase(name.clone()))?;
            sub_tables.insert(name, file);
        }
        Ok(Self { material, indexer, variant, config, sub_tables })
    }

    #[must_use]
    pub fn material(&self) -> &Material<B::Kind> {
        &self.material
    }

    /// Run the full two-phase build and return the converged score arrays,
    /// one per side to move, ready for [`TablebaseFile::write`]. Fails with
    /// [`Error::MissingSubTablebase`] if a capture or promotion needs a
    /// sub-tablebase that wasn't loaded (§7: this is a fatal build error, not
    /// something to silently record as `Score::Missing`).
    pub fn generate(&self) -> Result<(Vec<Score>, Vec<Score>)> {
        let n = self.indexer.space_size();
        let table = Table::new(n as usize, self.variant);
        self.classify(&table);
        self.converge(&table)?;
        let (mut white, mut black) = table.into_vecs();
        if self.variant == Variant::Xiangqi {
            crate::perpetual::classify(&self.indexer, &mut white, &mut black);
        }
        Ok((white, black))
    }

    /// Phase 1 (§4.E): every index starts `Unset`; terminal and illegal
    /// positions are written once and never revisited by phase 2.
    fn classify(&self, table: &Table) {
        let n = table.white.len() as u64;
        let threads = self.config.resolved_threads();
        parallel_for(n, threads, |idx| {
            for side in [Color::White, Color::Black] {
                let score = self.classify_cell(idx, side);
                if score != Score::Unset {
                    table.set(side, idx, score);
                }
            }
        });
    }

    fn classify_cell(&self, idx: u64, side: Color) -> Score {
        let mut board = self.indexer.decode(idx);
        board.set_side_to_move(side);
        if !board.is_legal_position() {
            return Score::Illegal;
        }
        let moves = board.legal_moves(side);
        if moves.is_empty() {
            // Stalemate is a loss in xiangqi, a draw in chess (checkmate is
            // a loss either way).
            return if self.variant == Variant::Xiangqi || board.in_check(side) {
                Score::Lose(0)
            } else {
                Score::Draw
            };
        }
        if board.piece_list_is_draw() {
            return Score::Draw;
        }
        Score::Unset
    }

    /// Phase 2 (§4.E): repeat full passes until two consecutive passes make
    /// no change. `parallel_for_fallible` joining all workers before
    /// returning is this crate's realisation of the pass barrier §5
    /// requires; a missing sub-tablebase aborts the whole build as soon as
    /// every worker has stopped.
    fn converge(&self, table: &Table) -> Result<()> {
        let n = table.white.len() as u64;
        let threads = self.config.resolved_threads();
        let mut idle_passes = 0;
        loop {
            let changed = AtomicU64::new(0);
            parallel_for_fallible(n, threads, |idx| {
                for side in [Color::White, Color::Black] {
                    if table.get(side, idx) == Score::Unset {
                        if let Some(score) = self.compute_cell(table, idx, side)? {
                            table.set(side, idx, score);
                            changed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Ok(())
            })?;
            if changed.load(Ordering::Relaxed) == 0 {
                idle_passes += 1;
                if idle_passes >= 2 {
                    break;
                }
            } else {
                idle_passes = 0;
            }
        }
        Ok(())
    }

    fn compute_cell(&self, table: &Table, idx: u64, side: Color) -> Result<Option<Score>> {
        let mut board = self.indexer.decode(idx);
        board.set_side_to_move(side);
        let moves = board.legal_moves(side);

        let mut best = Score::Unset;
        for mv in &moves {
            let mut after = board.clone();
            after.make(mv);
            let child = if mv.is_capture() || mv.is_promotion() {
                self.probe_sub_table(&after)?
            } else {
                let (enc_idx, flip) = self.indexer.encode(&after);
                table.get(after.side_to_move() ^ flip, enc_idx)
            };
            best = pick_best_from_rival_score(best, child.revert(1));
        }

        if best == Score::Unset {
            Ok(None)
        } else {
            Ok(Some(self.clamp(best)))
        }
    }

    /// Probe a capture/promotion's resulting position in the relevant
    /// descendant material's sub-tablebase. A sub-table this position
    /// actually needs but that wasn't loaded at [`Generator::new`] is a hard
    /// build error (§7): silently recording `Score::Missing` here would let
    /// a build finish having never backed up through that line at all.
    fn probe_sub_table(&self, board: &B) -> Result<Score> {
        let pieces = (0..B::CELLS as u16).filter_map(|sq| board.piece_at(sq));
        let material = Material::<B::Kind>::from_pieces(pieces);
        if !material.is_mate_possible() {
            return Ok(Score::Draw);
        }
        let name = format!("{material:?}");
        let file = self
            .sub_tables
            .get(&name)
            .ok_or_else(|| Error::MissingSubTablebase(name.clone()))?;
        let sub_indexer = Indexer::<B>::new(material);
        let (sub_idx, flip) = sub_indexer.encode(board);
        Ok(file.score_at(sub_idx, board.side_to_move() ^ flip).unwrap_or(Score::Missing))
    }

    fn clamp(&self, score: Score) -> Score {
        if self.config.rule120 {
            score.clamp(120)
        } else {
            score
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::chess::ChessBoard;

    fn without_sub_tables<B: Board>(mat: &str, variant: Variant) -> Generator<B> {
        let material: Material<B::Kind> = mat.parse().unwrap();
        Generator {
            indexer: Indexer::new(material.clone()),
            material,
            variant,
            config: GeneratorConfig::default(),
            sub_tables: HashMap::new(),
        }
    }

    #[test]
    fn kvk_converges_to_all_draws() {
        let generator = without_sub_tables::<ChessBoard>("KvK", Variant::Chess);
        let (white, black) = generator.generate().unwrap();
        for scores in [&white, &black] {
            for &score in scores {
                assert!(matches!(score, Score::Draw | Score::Illegal), "{score:?}");
            }
        }
    }

    #[test]
    fn missing_sub_tablebase_is_a_fatal_build_error() {
        // KQvK has captures that land on bare KvK; without_sub_tables never
        // loads it, so converging must surface the gap instead of quietly
        // treating those captures as missing.
        let generator = without_sub_tables::<ChessBoard>("KQvK", Variant::Chess);
        match generator.generate() {
            Err(Error::MissingSubTablebase(material)) => assert_eq!(material, "KvK"),
            other => panic!("expected a missing sub-tablebase error, got {other:?}"),
        }
    }

    #[test]
    fn classify_marks_checkmate_as_an_immediate_loss() {
        let generator = without_sub_tables::<ChessBoard>("KQvK", Variant::Chess);
        let board = ChessBoard::new_game(Some("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1")).unwrap();
        let (idx, flip) = generator.indexer.encode(&board);
        let side = board.side_to_move() ^ flip;
        assert_eq!(generator.classify_cell(idx, side), Score::Lose(0));
    }
}

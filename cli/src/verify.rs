use std::collections::HashMap;
use std::path::PathBuf;

use clap::Args;
use log::{error, info};

use felicity_egtb::board::chess::ChessBoard;
use felicity_egtb::board::xiangqi::XiangqiBoard;
use felicity_egtb::board::{Board, Color};
use felicity_egtb::{EgtbMemMode, Indexer, Material, Score, TablebaseFile, Variant};

#[derive(Args, Debug)]
pub struct Verify {
    #[arg(help = "example \"KQvK\"")]
    material: String,
    #[arg(long, default_value = "table/")]
    tb_dir: PathBuf,
}

impl Verify {
    pub fn run(self, variant: Variant) -> i32 {
        match variant {
            Variant::Chess => self.run_for::<ChessBoard>(),
            Variant::Xiangqi => self.run_for::<XiangqiBoard>(),
        }
    }

    /// Every non-`Unset`/`Illegal` cell must be consistent with its
    /// children: no legal move should lead to a child whose reverted score
    /// beats what this cell claims (the retrograde fixed point's own
    /// invariant, re-checked by forward replay against the written file).
    /// Captures and promotions change material, so their children live in a
    /// descendant's own file, not this one (§4.E "sub-tablebase probing") —
    /// those sub-tables are opened on demand, the same set `Generator` would
    /// have needed to build this file in the first place.
    fn run_for<B: Board>(&self) -> i32 {
        let Ok(material) = self.material.parse::<Material<B::Kind>>() else {
            error!("invalid material signature {:?}", self.material);
            return 1;
        };
        info!("verifying {material:?}");

        let name = format!("{material:?}");
        let path = self.tb_dir.join(format!("{name}.fdtm"));
        let file = match TablebaseFile::open(&path, EgtbMemMode::All) {
            Ok(file) => file,
            Err(e) => {
                error!("could not open {}: {e}", path.display());
                return 1;
            }
        };

        let mut sub_tables: HashMap<String, TablebaseFile> = HashMap::new();
        let indexer = Indexer::<B>::new(material);
        let n = indexer.space_size();
        let mut mismatches = 0u64;

        for idx in 0..n {
            for side in [Color::White, Color::Black] {
                let Ok(score) = file.score_at(idx, side) else { continue };
                if !score.is_defined() {
                    continue;
                }
                let mut board = indexer.decode(idx);
                board.set_side_to_move(side);
                for mv in &board.legal_moves(side) {
                    let mut after = board.clone();
                    after.make(mv);

                    let child = if mv.is_capture() || mv.is_promotion() {
                        match child_score(&after, &self.tb_dir, &mut sub_tables) {
                            Some(s) => s,
                            None => continue,
                        }
                    } else {
                        let (child_idx, flip) = indexer.encode(&after);
                        let Ok(s) = file.score_at(child_idx, after.side_to_move() ^ flip) else { continue };
                        s
                    };
                    if !child.is_defined() || matches!(child, Score::Illegal | Score::Missing) {
                        continue;
                    }
                    if child.revert(1) > score {
                        error!(
                            "idx {idx}, side {side:?}: stored {score:?}, but after {mv:?} reverted child is {:?}",
                            child.revert(1)
                        );
                        mismatches += 1;
                    }
                }
            }
        }

        if mismatches == 0 {
            info!("{name}: no inconsistencies over {n} indices");
            0
        } else {
            error!("{name}: {mismatches} inconsistencies found");
            1
        }
    }
}

/// Look up `after`'s score in whichever descendant material's file covers
/// it, opening and caching that file on first use. `None` means the
/// position is a known draw (no sub-table was ever generated for it) or the
/// sub-table genuinely can't be read, in which case this move is simply
/// skipped rather than treated as a mismatch.
fn child_score<B: Board>(
    after: &B,
    tb_dir: &std::path::Path,
    sub_tables: &mut HashMap<String, TablebaseFile>,
) -> Option<Score> {
    let pieces = (0..B::CELLS as u16).filter_map(|sq| after.piece_at(sq));
    let material = Material::<B::Kind>::from_pieces(pieces);
    if !material.is_mate_possible() {
        return Some(Score::Draw);
    }
    let name = format!("{material:?}");
    if !sub_tables.contains_key(&name) {
        let path = tb_dir.join(format!("{name}.fdtm"));
        let file = TablebaseFile::open(&path, EgtbMemMode::All).ok()?;
        sub_tables.insert(name.clone(), file);
    }
    let sub_indexer = Indexer::<B>::new(material);
    let (sub_idx, flip) = sub_indexer.encode(after);
    sub_tables.get(&name)?.score_at(sub_idx, after.side_to_move() ^ flip).ok()
}

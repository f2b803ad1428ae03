use std::path::PathBuf;

use clap::Args;
use log::{error, info, warn};

use felicity_egtb::board::chess::ChessBoard;
use felicity_egtb::board::xiangqi::XiangqiBoard;
use felicity_egtb::board::{Board, Color};
use felicity_egtb::{EgtbMemMode, Indexer, Material, Score, TablebaseFile, Variant};

#[derive(Args, Debug)]
pub struct Diff {
    #[arg(help = "example \"KQvK\"")]
    material: String,
    #[arg(long, default_value = "old_table/")]
    old_tb_dir: PathBuf,
    #[arg(long, default_value = "table/")]
    tb_dir: PathBuf,
    #[arg(short, long, default_value_t = usize::MAX, help = "max number of differences to report")]
    number: usize,
}

impl Diff {
    pub fn run(self, variant: Variant) -> i32 {
        match variant {
            Variant::Chess => self.run_for::<ChessBoard>(),
            Variant::Xiangqi => self.run_for::<XiangqiBoard>(),
        }
    }

    fn run_for<B: Board>(&self) -> i32 {
        let Ok(material) = self.material.parse::<Material<B::Kind>>() else {
            error!("invalid material signature {:?}", self.material);
            return 1;
        };
        let name = format!("{material:?}");
        info!("diffing {name}");

        let old = match TablebaseFile::open(self.old_tb_dir.join(format!("{name}.fdtm")), EgtbMemMode::All) {
            Ok(file) => file,
            Err(e) => {
                error!("could not open old table: {e}");
                return 1;
            }
        };
        let new = match TablebaseFile::open(self.tb_dir.join(format!("{name}.fdtm")), EgtbMemMode::All) {
            Ok(file) => file,
            Err(e) => {
                error!("could not open new table: {e}");
                return 1;
            }
        };

        let indexer = Indexer::<B>::new(material);
        let n = indexer.space_size();

        let mut old_better = 0usize;
        let mut new_better = 0usize;
        for idx in 0..n {
            for side in [Color::White, Color::Black] {
                let (Ok(old_score), Ok(new_score)) = (old.score_at(idx, side), new.score_at(idx, side)) else {
                    continue;
                };
                if old_score != new_score {
                    // `Illegal`/`Unset`/`Missing` have no defined order against each
                    // other or against a resolved score (`Score::cmp` panics on
                    // them), so only rank the difference when both sides are
                    // actually comparable; otherwise just count it as a mismatch.
                    if is_comparable(old_score) && is_comparable(new_score) && old_score > new_score {
                        old_better += 1;
                    } else {
                        new_better += 1;
                    }
                    if old_better + new_better <= self.number {
                        let board = indexer.decode(idx);
                        log::debug!("idx {idx}, side {side:?}: old {old_score:?}, new {new_score:?}, pos {board:?}");
                    }
                }
            }
            if old_better + new_better >= self.number {
                break;
            }
        }

        warn!("found {} differences; old better: {old_better}, new better: {new_better}", old_better + new_better);
        0
    }
}

/// `Score::cmp` only has a defined total order over `Draw` and the four
/// decisive variants; `Illegal`/`Unset`/`Missing` panic if ranked.
fn is_comparable(score: Score) -> bool {
    !matches!(score, Score::Illegal | Score::Unset | Score::Missing)
}

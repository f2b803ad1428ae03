use std::collections::HashMap;
use std::path::PathBuf;

use clap::Args;
use log::{debug, error, info};

use felicity_egtb::board::chess::ChessBoard;
use felicity_egtb::board::xiangqi::XiangqiBoard;
use felicity_egtb::board::{Board, Color};
use felicity_egtb::{EgtbMemMode, Indexer, Material, Score, TablebaseFile, Variant};

#[derive(Args, Debug)]
pub struct Explore {
    #[arg(help = "example \"KQvK\"")]
    material: String,
    #[arg(long, help = "look up a single position instead of (or alongside) the summary")]
    fen: Option<String>,
    #[arg(long, default_value = "table/")]
    tb_dir: PathBuf,
}

impl Explore {
    pub fn run(self, variant: Variant) -> i32 {
        match variant {
            Variant::Chess => self.run_for::<ChessBoard>(variant),
            Variant::Xiangqi => self.run_for::<XiangqiBoard>(variant),
        }
    }

    fn run_for<B: Board>(&self, variant: Variant) -> i32 {
        let Ok(material) = self.material.parse::<Material<B::Kind>>() else {
            error!("invalid material signature {:?}", self.material);
            return 1;
        };
        let name = format!("{material:?}");
        let path = self.tb_dir.join(format!("{name}.fdtm"));
        let file = match TablebaseFile::open(&path, EgtbMemMode::Smart) {
            Ok(file) => file,
            Err(e) => {
                error!("could not open {}: {e}", path.display());
                return 1;
            }
        };
        let indexer = Indexer::<B>::new(material);

        if let Some(fen) = &self.fen {
            match B::new_game(Some(fen)) {
                Ok(board) => {
                    let (idx, flip) = indexer.encode(&board);
                    let side = board.side_to_move() ^ flip;
                    match file.score_at(idx, side) {
                        Ok(score) => info!("{fen}: idx {idx} ({side:?} to move), score {score:?}"),
                        Err(e) => {
                            error!("lookup failed: {e}");
                            return 1;
                        }
                    }
                }
                Err(e) => {
                    error!("invalid fen: {e}");
                    return 1;
                }
            }
        }

        stats(&file, &indexer, variant);
        0
    }
}

/// Distribution of stored scores across the whole material, the way the
/// teacher's own `explore` summarises an `Outcome` table before exiting.
fn stats<B: Board>(file: &TablebaseFile, indexer: &Indexer<B>, variant: Variant) {
    let n = indexer.space_size();
    let mut distrib: HashMap<String, u64> = HashMap::new();
    let mut illegal = 0u64;
    let mut missing = 0u64;

    for idx in 0..n {
        for side in [Color::White, Color::Black] {
            match file.score_at(idx, side) {
                Ok(score) => {
                    *distrib.entry(format!("{score:?}")).or_insert(0) += 1;
                    match score {
                        Score::Illegal => illegal += 1,
                        Score::Missing => missing += 1,
                        _ => {}
                    }
                }
                Err(_) => missing += 1,
            }
        }
    }

    let total = (n * 2).max(1);
    debug!("{variant:?}: {n} indices, legal density = {}%", (total - illegal) * 100 / total);
    if missing > 0 {
        debug!("{missing} cells had no answer (side not loaded)");
    }
    let mut labels: Vec<_> = distrib.into_iter().collect();
    labels.sort_by(|a, b| a.0.cmp(&b.0));
    for (label, count) in labels {
        debug!("{label}: {count}");
    }
}

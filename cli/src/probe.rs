use std::path::PathBuf;

use clap::{ArgAction, Args};
use log::info;

use felicity_egtb::board::chess::ChessBoard;
use felicity_egtb::board::xiangqi::XiangqiBoard;
use felicity_egtb::board::Board;
use felicity_egtb::{EgtbMemMode, Score, TablebaseProber, Variant};

#[derive(Args, Debug)]
pub struct Probe {
    #[arg(short, long, help = "example \"8/8/8/4k3/8/8/3KQ3/8 w - - 0 1\"")]
    fen: String,
    #[arg(long, default_value = "table/")]
    tb_dir: PathBuf,
    #[arg(long, action = ArgAction::SetTrue, help = "follow and print the best line to the result")]
    best_line: bool,
}

impl Probe {
    pub fn run(self, variant: Variant) -> i32 {
        match variant {
            Variant::Chess => self.run_for::<ChessBoard>(variant),
            Variant::Xiangqi => self.run_for::<XiangqiBoard>(variant),
        }
    }

    fn run_for<B: Board>(&self, variant: Variant) -> i32 {
        let board = match B::new_game(Some(&self.fen)) {
            Ok(board) => board,
            Err(e) => {
                log::error!("invalid fen: {e}");
                return 1;
            }
        };

        let mut prober = TablebaseProber::<B>::new(&self.tb_dir, variant, EgtbMemMode::Smart);

        if self.best_line {
            match prober.best_line(&board) {
                Ok((score, line)) => {
                    if score == Score::Missing {
                        log::error!("no tablebase data for this material");
                        return 2;
                    }
                    info!("score: {score:?}, {} ply line", line.len());
                    0
                }
                Err(e) => {
                    log::error!("probe failed: {e}");
                    1
                }
            }
        } else {
            match prober.probe(&board) {
                Ok(score) => {
                    if score == Score::Missing {
                        log::error!("no tablebase data for this material");
                        return 2;
                    }
                    info!("score: {score:?}");
                    0
                }
                Err(e) => {
                    log::error!("probe failed: {e}");
                    1
                }
            }
        }
    }
}

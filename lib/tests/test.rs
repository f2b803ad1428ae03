//! End-to-end scenarios covering the literal cases from the concrete
//! scenarios table: build a small tablebase with [`Generator`], write it,
//! reopen it with [`TablebaseProber`], and check the scores it reports.

use felicity_egtb::board::chess::ChessBoard;
use felicity_egtb::board::xiangqi::XiangqiBoard;
use felicity_egtb::board::{Board, ByColor};
use felicity_egtb::{
    factor_order_id, EgtbMemMode, Generator, GeneratorConfig, Material, Score, TablebaseFile, TablebaseProber, Variant,
};

fn build<B: Board>(mat: &str, variant: Variant, dir: &std::path::Path) {
    let material: Material<B::Kind> = mat.parse().unwrap();
    let order_id = factor_order_id(&material);
    let generator = Generator::<B>::new(material, variant, GeneratorConfig::default(), dir).unwrap();
    let (white, black) = generator.generate().unwrap();
    let sides = ByColor { white: Some(white), black: Some(black) };
    TablebaseFile::write(dir.join(format!("{mat}.fdtm")), mat, variant, 125, order_id, &sides).unwrap();
}

fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("felicity_egtb_e2e_{tag}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn kqvk_is_a_won_mate_for_white() {
    let dir = scratch_dir("kqvk");
    build::<ChessBoard>("KvK", Variant::Chess, &dir);
    build::<ChessBoard>("KQvK", Variant::Chess, &dir);

    let mut prober = TablebaseProber::<ChessBoard>::new(&dir, Variant::Chess, EgtbMemMode::All);
    let board = ChessBoard::new_game(Some("8/8/8/8/4k3/8/4K3/4Q3 w - - 0 1")).unwrap();
    let score = prober.probe(&board).unwrap();
    match score {
        Score::Win(dtm) => assert!(dtm <= 20, "expected a mate within 20 plies, got {dtm}"),
        other => panic!("expected a white win, got {other:?}"),
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn kvk_is_always_drawn() {
    let dir = scratch_dir("kvk");
    build::<ChessBoard>("KvK", Variant::Chess, &dir);

    let mut prober = TablebaseProber::<ChessBoard>::new(&dir, Variant::Chess, EgtbMemMode::All);
    let board = ChessBoard::new_game(Some("8/8/8/8/4k3/8/4K3/8 w - - 0 1")).unwrap();
    assert_eq!(prober.probe(&board).unwrap(), Score::Draw);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn kpk_draws_when_the_defending_king_blocks_the_pawn() {
    let dir = scratch_dir("kpk");
    build::<ChessBoard>("KvK", Variant::Chess, &dir);
    build::<ChessBoard>("KPvK", Variant::Chess, &dir);

    let mut prober = TablebaseProber::<ChessBoard>::new(&dir, Variant::Chess, EgtbMemMode::All);
    let board = ChessBoard::new_game(Some("8/8/8/4k3/8/8/4P3/K7 b - - 0 1")).unwrap();
    assert_eq!(prober.probe(&board).unwrap(), Score::Draw);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn xiangqi_krk_wins_for_the_rook_side() {
    let dir = scratch_dir("xq_krk");
    build::<XiangqiBoard>("KvK", Variant::Xiangqi, &dir);
    build::<XiangqiBoard>("KRvK", Variant::Xiangqi, &dir);

    let mut prober = TablebaseProber::<XiangqiBoard>::new(&dir, Variant::Xiangqi, EgtbMemMode::All);
    let board = XiangqiBoard::new_game(Some("3k5/9/9/9/9/9/9/9/9/4K1R2 w - - 0 1")).unwrap();
    assert!(prober.probe(&board).unwrap().is_decisive());

    std::fs::remove_dir_all(&dir).ok();
}

/// Builds every descendant material a bigger signature needs before the
/// signature itself, in ascending piece-count order, so `Generator::new`'s
/// sub-tablebase lookups always find a file already on disk.
fn build_with_descendants<B: Board>(mat: &str, variant: Variant, dir: &std::path::Path) {
    let material: Material<B::Kind> = mat.parse().unwrap();
    for sub in material.descendants_recursive(false) {
        let name = format!("{sub:?}");
        if !dir.join(format!("{name}.fdtm")).exists() {
            build::<B>(&name, variant, dir);
        }
    }
    build::<B>(mat, variant, dir);
}

#[test]
fn xiangqi_perpetual_chase_regression_scenario() {
    // The chase-judge regression position from the concrete scenarios table:
    // black's cannon/pawn keep checking/chasing white's king and advisor.
    // Per the propagation policy, the classifier must always resolve this to
    // a definite outcome rather than ever leaving it `Unset`/`Missing`.
    let dir = scratch_dir("xq_perpetual");
    build_with_descendants::<XiangqiBoard>("KAACPvKRA", Variant::Xiangqi, &dir);

    let mut prober = TablebaseProber::<XiangqiBoard>::new(&dir, Variant::Xiangqi, EgtbMemMode::All);
    let board = XiangqiBoard::new_game(Some("3aka3/1R7/9/9/9/9/1c7/9/4A4/2p1KA3 b - - 0 1")).unwrap();
    let score = prober.probe(&board).unwrap();
    assert!(
        matches!(score, Score::Draw) || score.is_decisive(),
        "chase classification must always reach a definite outcome, got {score:?}"
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn side_independence_is_respected_across_separate_writes() {
    let dir = scratch_dir("side_independence");
    let material: Material<<ChessBoard as Board>::Kind> = "KvK".parse().unwrap();
    let order_id = factor_order_id(&material);
    let generator = Generator::<ChessBoard>::new(material, Variant::Chess, GeneratorConfig::default(), &dir).unwrap();
    let (white, _black) = generator.generate().unwrap();
    let sides = ByColor { white: Some(white), black: None };
    let path = dir.join("KvK.fdtm");
    TablebaseFile::write(&path, "KvK", Variant::Chess, 125, order_id, &sides).unwrap();

    let file = TablebaseFile::open(&path, EgtbMemMode::All).unwrap();
    let board = ChessBoard::new_game(Some("8/8/8/8/4k3/8/4K3/8 w - - 0 1")).unwrap();
    let indexer = felicity_egtb::Indexer::<ChessBoard>::new("KvK".parse().unwrap());
    let (idx, flip) = indexer.encode(&board);
    assert_eq!(file.score_at(idx, board.side_to_move() ^ flip).unwrap(), Score::Draw);
    assert_eq!(file.score_at(idx, (board.side_to_move() ^ flip).other()).unwrap(), Score::Missing);

    std::fs::remove_dir_all(&dir).ok();
}

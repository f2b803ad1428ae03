use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use felicity_egtb::board::chess::ChessBoard;
use felicity_egtb::board::xiangqi::XiangqiBoard;
use felicity_egtb::board::Board;
use felicity_egtb::{Indexer, Material};

fn bench_chess(c: &mut Criterion) {
    let fens = [
        ("KvK", "8/8/8/4k3/8/8/3K4/8 w - - 0 1"),
        ("KQvK", "8/8/8/4k3/8/8/3KQ3/8 w - - 0 1"),
        ("KRvK", "8/8/8/4k3/8/8/3KR3/8 w - - 0 1"),
        ("KBNvK", "8/8/2k5/8/8/2K5/3BN3/8 w - - 0 1"),
        ("KPvK", "8/8/8/4k3/8/3P4/3K4/8 w - - 0 1"),
    ];
    let mut group = c.benchmark_group("chess_indexer");
    for (i, (mat, fen)) in fens.iter().enumerate() {
        let material: Material<<ChessBoard as Board>::Kind> = mat.parse().unwrap();
        let indexer = Indexer::<ChessBoard>::new(material);
        let board = ChessBoard::new_game(Some(fen)).unwrap();
        group.bench_with_input(BenchmarkId::new("encode", i), &board, |b, board| {
            b.iter(|| indexer.encode(board));
        });
        let (idx, _) = indexer.encode(&board);
        group.bench_with_input(BenchmarkId::new("decode", i), &idx, |b, &idx| {
            b.iter(|| indexer.decode(idx));
        });
    }
}

fn bench_xiangqi(c: &mut Criterion) {
    let fens = [
        ("KvK", "4k4/9/9/9/9/9/9/9/9/4K4 w - - 0 1"),
        ("KRvK", "4k4/9/9/9/9/9/9/9/9/3RK4 w - - 0 1"),
    ];
    let mut group = c.benchmark_group("xiangqi_indexer");
    for (i, (mat, fen)) in fens.iter().enumerate() {
        let material: Material<<XiangqiBoard as Board>::Kind> = mat.parse().unwrap();
        let indexer = Indexer::<XiangqiBoard>::new(material);
        let board = XiangqiBoard::new_game(Some(fen)).unwrap();
        group.bench_with_input(BenchmarkId::new("encode", i), &board, |b, board| {
            b.iter(|| indexer.encode(board));
        });
        let (idx, _) = indexer.encode(&board);
        group.bench_with_input(BenchmarkId::new("decode", i), &idx, |b, &idx| {
            b.iter(|| indexer.decode(idx));
        });
    }
}

criterion_group!(benches, bench_chess, bench_xiangqi);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use logkv::db::Db;
use logkv::io::file::StdFileIo;
use tempfile::tempdir;

const PAYLOAD: &[u8] = b"benchmark-payload-bytes";

fn append_ascending(c: &mut Criterion) {
    c.bench_function("append_ascending_1k", |b| {
        b.iter_batched(
            || tempdir().unwrap(),
            |dir| {
                let mut db = Db::open(
                    StdFileIo::new(dir.path()),
                    StdFileIo::new(dir.path()),
                    "b.log",
                    "b.idx",
                )
                .unwrap();
                for key in 0..1_000u32 {
                    db.append(key, 1, PAYLOAD).unwrap();
                }
                db.close().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn append_descending(c: &mut Criterion) {
    // worst case: every insert lands at position 0 and spills forward
    c.bench_function("append_descending_1k", |b| {
        b.iter_batched(
            || tempdir().unwrap(),
            |dir| {
                let mut db = Db::open(
                    StdFileIo::new(dir.path()),
                    StdFileIo::new(dir.path()),
                    "b.log",
                    "b.idx",
                )
                .unwrap();
                for key in (0..1_000u32).rev() {
                    db.append(key, 1, PAYLOAD).unwrap();
                }
                db.close().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn get_sweep(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut db = Db::open(
        StdFileIo::new(dir.path()),
        StdFileIo::new(dir.path()),
        "b.log",
        "b.idx",
    )
    .unwrap();
    for key in 0..10_000u32 {
        db.append(key, 1, PAYLOAD).unwrap();
    }

    c.bench_function("get_sweep_10k", |b| {
        b.iter(|| {
            let mut buf = [0u8; 64];
            for key in (0..10_000u32).step_by(97) {
                db.get(key, &mut buf).unwrap();
            }
        });
    });
}

criterion_group!(benches, append_ascending, append_descending, get_sweep);
criterion_main!(benches);

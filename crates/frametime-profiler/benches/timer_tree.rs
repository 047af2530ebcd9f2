use criterion::{black_box, criterion_group, criterion_main, Criterion};
use frametime_profiler::{TimerKind, TimerTree};

fn record_frame(tree: &mut TimerTree) {
    tree.reset(false);
    tree.start("Render");
    tree.start("ZPrepass");
    tree.start("solid");
    tree.stop();
    tree.start("transparent");
    tree.stop();
    tree.stop();
    tree.start("main");
    tree.stop();
    tree.stop();
}

fn bench_timer_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("TimerTree");

    group.bench_function("start/stop pair", |b| {
        let mut tree = TimerTree::new();
        b.iter(|| {
            tree.start(black_box("Render"));
            tree.stop();
        });
    });

    group.bench_function("frame of five timers", |b| {
        let mut tree = TimerTree::new();
        record_frame(&mut tree);
        b.iter(|| record_frame(black_box(&mut tree)));
    });

    group.bench_function("dynamic names", |b| {
        let mut tree = TimerTree::new();
        let names: Vec<String> = (0..64).map(|i| format!("batch {i}")).collect();
        let mut frame = 0usize;
        b.iter(|| {
            tree.reset(false);
            tree.start("loop");
            for name in names.iter().skip(frame % 32).take(32) {
                tree.start(name);
                tree.stop();
            }
            tree.stop();
            frame += 1;
        });
    });

    group.bench_function("path lookup", |b| {
        let mut tree = TimerTree::new();
        record_frame(&mut tree);
        b.iter(|| tree.time(TimerKind::Cpu, black_box("Render|ZPrepass|transparent"), false));
    });

    group.finish();
}

criterion_group!(benches, bench_timer_tree);
criterion_main!(benches);

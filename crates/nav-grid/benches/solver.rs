use nav_grid::{smooth_path, solve, GridCoord, NavGrid, PathRequest, SearchScratch};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn maze_grid(size: u32) -> NavGrid {
    let mut grid = NavGrid::new(size, size, 1.0).expect("grid");
    let size = size as i32;
    // Staggered walls with alternating gaps.
    for x in (4..size - 4).step_by(6) {
        let gap = if (x / 6) % 2 == 0 { size - 3 } else { 2 };
        for y in 0..size {
            if (y - gap).abs() > 1 {
                grid.set_walkable(GridCoord::new(x, y), false);
            }
        }
    }
    grid
}

fn bench_solver(c: &mut Criterion) {
    let open = NavGrid::new(64, 64, 1.0).expect("grid");
    let maze = maze_grid(64);
    let request = PathRequest {
        request_id: 1,
        agent_id: 1,
        start: GridCoord::new(1, 1),
        goal: GridCoord::new(40, 30),
    };

    let mut group = c.benchmark_group("nav-grid/solver");

    let mut scratch = SearchScratch::new(4096, 256);
    let mut buffer = vec![GridCoord::default(); 256];
    group.bench_function("open_reuse_scratch", |b| {
        b.iter(|| {
            let result = solve(&open, &request, &mut scratch, &mut buffer, 0);
            black_box(result.path_len);
        })
    });

    group.bench_function("maze_reuse_scratch", |b| {
        b.iter(|| {
            let result = solve(&maze, &request, &mut scratch, &mut buffer, 0);
            black_box(result.success);
        })
    });

    group.bench_function("open_fresh_scratch", |b| {
        b.iter(|| {
            let mut scratch = SearchScratch::new(4096, 256);
            let result = solve(&open, &request, &mut scratch, &mut buffer, 0);
            black_box(result.path_len);
        })
    });

    let result = solve(&maze, &request, &mut scratch, &mut buffer, 0);
    let raw = buffer[..result.path_len].to_vec();
    group.bench_function("smooth_maze_path", |b| {
        b.iter(|| {
            let smoothed = smooth_path(&maze, &raw);
            black_box(smoothed.len());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_solver);
criterion_main!(benches);

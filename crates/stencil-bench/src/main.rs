//! Quick timing of render and rerender passes.

use std::time::{Duration, Instant};

use anyhow::Result;
use stencil_bench::{RowsFixture, TagFixture};
use stencil_reactive::validate_tag;

fn per_item(elapsed: Duration, items: usize) -> f64 {
    elapsed.as_micros() as f64 / items.max(1) as f64
}

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Render vs. rerender ===\n");

    for n in [10, 100, 1000] {
        println!("--- {n} rows ---");
        let mut fixture = RowsFixture::new(n)?;

        let start = Instant::now();
        fixture.render()?;
        let render = start.elapsed();
        println!("Initial render: {render:?} ({:.2}µs per row)", per_item(render, fixture.rows()));

        let start = Instant::now();
        let stats = fixture.rerender()?;
        let steady = start.elapsed();
        println!(
            "Steady rerender: {steady:?} ({} ops evaluated, {} groups skipped)",
            stats.evaluated, stats.skipped_groups
        );

        fixture.touch(n / 2);
        let start = Instant::now();
        let stats = fixture.rerender()?;
        let single = start.elapsed();
        println!(
            "One row changed: {single:?} ({} ops evaluated, {} groups skipped)",
            stats.evaluated, stats.skipped_groups
        );

        for row in 0..n {
            fixture.touch(row);
        }
        let start = Instant::now();
        fixture.rerender()?;
        let all = start.elapsed();
        println!("Every row changed: {all:?}");
        println!("Ratio (all/render): {:.2}x\n", all.as_secs_f64() / render.as_secs_f64());
        log::debug!("final markup is {} bytes", fixture.html().len());
    }

    println!("=== Tag validation ===\n");

    for width in [1, 16, 256] {
        let fixture = TagFixture::new(width);
        let snapshot = fixture.snapshot();
        let rounds = 100_000;
        let start = Instant::now();
        let mut valid = 0;
        for _ in 0..rounds {
            if validate_tag(&fixture.combined, snapshot) {
                valid += 1;
            }
        }
        let elapsed = start.elapsed();
        println!(
            "width {width}: {:.3}µs per validation ({valid}/{rounds} valid)",
            per_item(elapsed, rounds)
        );
    }

    Ok(())
}

//! Quick benchmark to verify key template performance

use chrono::NaiveDate;
use sparkify_etl::template::KeyTemplate;
use sparkify_etl::RunContext;
use std::time::Instant;

fn main() {
    let ctx = RunContext::for_date(NaiveDate::from_ymd_opt(2018, 11, 1).unwrap());

    // Patterns of varying complexity
    let patterns = vec![
        "song-data/A/A/A/",
        "log-data/{year}/{month}/",
        "log-data/{year}/{month}/{ds}-events.json",
        "runs/{run_id}/{ds_nodash}/{hour}/{{literal}}/part-{ts}.json",
    ];

    println!("Key Template Performance Test");
    println!("=============================\n");

    for pattern in &patterns {
        let iterations = 100_000;

        let start = Instant::now();
        for _ in 0..iterations {
            let _ = KeyTemplate::parse(pattern);
        }
        let parse_elapsed = start.elapsed();

        let template = KeyTemplate::parse(pattern).unwrap();
        let start = Instant::now();
        for _ in 0..iterations {
            let _ = template.render(&ctx);
        }
        let render_elapsed = start.elapsed();

        println!("Pattern: {:60}", format!("\"{}\"", pattern));
        println!("  Rendered: {}", template.render(&ctx));
        println!("  Parse per operation: {:?}", parse_elapsed / iterations);
        println!("  Render per operation: {:?}\n", render_elapsed / iterations);
    }
}

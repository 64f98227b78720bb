//! Index command - parse a data file and write its index file.

use crate::app::App;
use crate::DataArgs;
use geofile_core::{GeofileConfig, IndexDefinition};
use std::time::Instant;

/// Run the index command.
pub fn run(
    config: GeofileConfig,
    args: DataArgs,
    definitions: Vec<IndexDefinition>,
    force: bool,
) -> anyhow::Result<()> {
    let app = App::new(config, args)?;

    if app.store.exists() && !force {
        println!(
            "Index file already exists: {}",
            app.store.index_path().display()
        );
        println!("Use --force to rebuild it.");
        return Ok(());
    }

    println!("Indexing {}...", app.data_path.display());
    let start = Instant::now();

    let file = app.geofile();
    let bytes = file.build_indexes(&definitions)?;
    app.store.save(&bytes)?;

    let elapsed = start.elapsed();
    let count = file.count();

    println!();
    println!("Indexing complete!");
    println!("  Records:  {}", count);
    for info in file.indexes()? {
        println!("  Index:    {} ({} entries)", info, info.entries);
    }
    println!("  Size:     {} bytes", bytes.len());
    println!("  Written:  {}", app.store.index_path().display());
    println!("  Time:     {:.2}s", elapsed.as_secs_f64());
    if elapsed.as_secs_f64() > 0.0 {
        println!(
            "  Rate:     {:.0} records/sec",
            count as f64 / elapsed.as_secs_f64()
        );
    }

    Ok(())
}

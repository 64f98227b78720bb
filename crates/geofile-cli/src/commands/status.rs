//! Status command - show the index file and the indexes it holds.

use crate::app::App;
use crate::DataArgs;
use chrono::{DateTime, Local};
use geofile_core::GeofileConfig;

/// Run the status command.
pub fn run(config: GeofileConfig, args: DataArgs) -> anyhow::Result<()> {
    let app = App::new(config, args)?;

    println!("Geofile Index Status");
    println!("====================");
    println!();
    println!("Data file:  {} ({})", app.data_path.display(), app.format.name());
    println!("Index file: {}", app.store.index_path().display());
    println!();

    if !app.store.exists() {
        println!(
            "No index file. Run 'geofile index {}' to build it.",
            app.data_path.display()
        );
        return Ok(());
    }

    let file = app.open()?;
    let metadata = std::fs::metadata(app.store.index_path())?;

    println!("Summary:");
    println!("  Records:    {}", file.count());
    println!(
        "  Size:       {} bytes ({:.2} MB)",
        metadata.len(),
        metadata.len() as f64 / (1024.0 * 1024.0)
    );
    if let Ok(modified) = metadata.modified() {
        let modified: DateTime<Local> = modified.into();
        println!("  Written:    {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }
    if app.store.backup_path().exists() {
        println!("  Backup:     {}", app.store.backup_path().display());
    }

    println!();
    println!("Indexes:");
    for info in file.indexes()? {
        println!(
            "  {:<24} {:>10} entries {:>12} bytes",
            info.to_string(),
            info.entries,
            info.bytes
        );
    }

    Ok(())
}

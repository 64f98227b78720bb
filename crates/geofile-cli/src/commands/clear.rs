//! Clear command - remove the index file of a data file.

use crate::app::App;
use crate::DataArgs;
use geofile_core::GeofileConfig;
use std::io::{self, Write};

/// Run the clear command.
pub fn run(config: GeofileConfig, args: DataArgs, skip_confirm: bool) -> anyhow::Result<()> {
    let app = App::new(config, args)?;
    let store = &app.store;

    if !store.exists() {
        println!("No index found. Nothing to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!(
            "This will delete {} and its backup. Are you sure? [y/N] ",
            store.index_path().display()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.clear()?;
    println!("Index cleared.");

    Ok(())
}

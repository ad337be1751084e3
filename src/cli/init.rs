use std::path::PathBuf;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path, Settings};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();

    match data_dir {
        Some(dir) => settings.data_dir = shellexpand_path(&dir),
        None if settings.data_dir == Settings::default().data_dir => {
            // Nothing configured yet: ask once.
            println!("Data directory [{}]: ", settings.data_dir);
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).ok();
            let chosen = input.trim();
            if !chosen.is_empty() {
                settings.data_dir = shellexpand_path(chosen);
            }
        }
        None => {}
    }
    save_settings(&settings)?;

    let data_dir = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(data_dir.join("snapshots"))?;

    let conn = get_connection(&data_dir.join("penny.db"))?;
    init_db(&conn)?;

    println!(
        "Initialized penny at {} (default currency {})",
        data_dir.display(),
        settings.default_currency
    );
    Ok(())
}

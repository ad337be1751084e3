use crate::cli::import_wizard::ImportWizardScreen;
use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{get_data_dir, load_settings};
use crate::tui::run_screen;

pub fn run(file: Option<&str>, account: Option<&str>) -> Result<()> {
    let settings = load_settings();
    let data_dir = get_data_dir();
    let conn = get_connection(&data_dir.join("penny.db"))?;

    let mut screen = ImportWizardScreen::new(&conn, &settings, file, account);
    run_screen(&mut screen)?;

    if !screen.completed() {
        println!("Import cancelled.");
    }
    Ok(())
}

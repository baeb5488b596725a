use std::path::PathBuf;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::grammar::RowGrammar;
use crate::settings::{load_settings, save_settings, settings_file_exists, shellexpand_path};

pub fn run(
    data_dir: Option<String>,
    grammar: Option<String>,
    statements_dir: Option<String>,
) -> Result<()> {
    let mut settings = load_settings()?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    if let Some(grammar) = grammar {
        settings.grammar = grammar;
    }
    if let Some(dir) = statements_dir {
        settings.statements_dir = Some(shellexpand_path(&dir));
    }

    let row_grammar = RowGrammar::resolve(&settings.grammar)?;

    let data_path = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&data_path)?;
    let db_path = settings.db_path();
    let existed = db_path.exists();
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;

    let had_settings = settings_file_exists();
    save_settings(&settings)?;

    if existed {
        println!("Database already initialized at {}", db_path.display());
    } else {
        println!("Initialized ledger at {}", db_path.display());
    }
    println!("Grammar:    {}", row_grammar.name());
    if let Some(dir) = &settings.statements_dir {
        println!("Statements: {dir}");
    }
    if !had_settings {
        log::info!("wrote new settings file");
    }
    Ok(())
}

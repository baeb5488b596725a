mod aggregator;
mod categorizer;
mod cli;
mod db;
mod error;
mod extractor;
mod fmt;
mod grammar;
mod importer;
mod ledger;
mod merger;
mod models;
mod parser;
mod reviewer;
mod settings;

use clap::Parser;

use cli::{CategoriesCommands, Cli, Commands, ReportCommands, RulesCommands, RunsCommands};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            data_dir,
            grammar,
            statements_dir,
        } => cli::init::run(data_dir, grammar, statements_dir),
        Commands::Ingest {
            paths,
            grammar,
            no_categorize,
        } => cli::ingest::run(paths, grammar, no_categorize),
        Commands::Categorize => cli::categorize::run(),
        Commands::Categories { command } => match command {
            CategoriesCommands::Add { name, description } => {
                cli::categories::add(&name, description.as_deref())
            }
            CategoriesCommands::List => cli::categories::list(),
        },
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                match_type,
                priority,
            } => cli::rules::add(&pattern, &category, &match_type, priority),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Delete { id } => cli::rules::delete(id),
        },
        Commands::Assign {
            id,
            category,
            clear,
            same_description,
            keyword,
        } => cli::assign::run(id, category, clear, same_description, keyword),
        Commands::Transactions {
            period,
            uncategorized,
            category,
        } => cli::transactions::run(period, uncategorized, category),
        Commands::Report { command } => match command {
            ReportCommands::Monthly { period } => cli::report::monthly(period),
            ReportCommands::Categories { period, income } => cli::report::categories(period, income),
            ReportCommands::Totals { period } => cli::report::totals(period),
        },
        Commands::Dashboard { period, output } => cli::dashboard::run(period, output),
        Commands::Runs { command } => match command {
            RunsCommands::List { limit } => cli::runs::list(limit),
            RunsCommands::Show { id } => cli::runs::show(id),
        },
        Commands::Export { period, output } => cli::export::run(period, output),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

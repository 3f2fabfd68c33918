use std::path::PathBuf;

use clap::Subcommand;

use crate::Result;

pub(crate) mod fixtures;
pub(crate) mod info;
pub(crate) mod serve;

#[derive(Subcommand, Default)]
pub(crate) enum Command {
    /// Run the HTTP API (the default)
    #[default]
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Load JSON fixtures from a directory into empty tables
    LoadFixtures {
        /// Directory holding `users.json`, `recipes.json` and friends
        dir: PathBuf,
    },
    /// Print version and row counts
    Info,
}

impl Command {
    pub(crate) async fn run(&self) -> Result<()> {
        match &self {
            Command::Serve => serve::serve().await,
            Command::Migrate => {
                db::setup_db_pool().await?;
                println!("Migrations applied");
                Ok(())
            }
            Command::LoadFixtures { dir } => fixtures::load_fixtures(dir).await,
            Command::Info => info::print_info().await,
        }
    }
}

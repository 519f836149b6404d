pub mod plz;
pub mod rom;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle PLZ archives
    Plz {
        #[command(subcommand)]
        command: plz::PlzCommands,
    },
    /// Handle game image filesystems
    Rom {
        #[command(subcommand)]
        command: rom::RomCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Plz { command } => command.handle(),
            Commands::Rom { command } => command.handle(),
        }
    }
}

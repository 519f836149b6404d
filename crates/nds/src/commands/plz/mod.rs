pub mod create;
pub mod extract;
pub mod list;

#[derive(clap::Subcommand)]
pub enum PlzCommands {
    /// List the entries of a PLZ archive
    List(list::ListArgs),
    /// Extract a PLZ archive into a directory
    Extract(extract::ExtractArgs),
    /// Create a PLZ archive from a directory
    Create(create::CreateArgs),
}

impl PlzCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            PlzCommands::List(list) => list.handle(),
            PlzCommands::Extract(extract) => extract.handle(),
            PlzCommands::Create(create) => create.handle(),
        }
    }
}

pub mod extract;
pub mod ls;

#[derive(clap::Subcommand)]
pub enum RomCommands {
    /// List the files inside a game image
    Ls(ls::LsArgs),
    /// Extract a game image's filesystem into a directory
    Extract(extract::ExtractArgs),
}

impl RomCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            RomCommands::Ls(ls) => ls.handle(),
            RomCommands::Extract(extract) => extract.handle(),
        }
    }
}

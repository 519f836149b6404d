use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use nds_fs::RomFs;
use owo_colors::{OwoColorize, Stream::Stdout};
use std::{fs::File, path::PathBuf};

#[derive(Args)]
pub struct LsArgs {
    /// An input game image
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl LsArgs {
    pub fn handle(&self) -> Result<()> {
        let mut f = File::open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;
        let fs = RomFs::read(&mut f)?;

        for (path, id) in fs.walk() {
            let size = fs.file_bytes(id).map(|d| d.len()).unwrap_or(0);
            println!(
                "{id:4}  {size:10}  {}",
                path.if_supports_color(Stdout, |t| t.cyan())
            );
        }

        Ok(())
    }
}

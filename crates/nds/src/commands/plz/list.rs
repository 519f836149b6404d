use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use nds_fs::{compression, PlzArchive};
use owo_colors::{OwoColorize, Stream::Stdout};
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input PLZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let raw = std::fs::read(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;
        let (plain, double_typed) = compression::decompress(&raw, None)?;
        let plz = PlzArchive::from_bytes(&plain)?;

        println!(
            "{} entries ({})",
            plz.len(),
            if double_typed {
                "double typed"
            } else {
                "single typed"
            }
        );
        for (id, name) in plz.file_names().iter().enumerate() {
            let size = plz.file_bytes(id as u32).map(|d| d.len()).unwrap_or(0);
            println!(
                "{id:4}  {size:10}  {}",
                name.if_supports_color(Stdout, |t| t.cyan())
            );
        }

        Ok(())
    }
}

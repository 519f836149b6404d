use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use nds_fs::{compression, PlzArchive};
use std::{fs::File, io::Write, path::PathBuf};
use tracing::info;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input PLZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let raw = std::fs::read(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;
        let (plain, _) = compression::decompress(&raw, None)?;
        let plz = PlzArchive::from_bytes(&plain)?;

        std::fs::create_dir_all(&self.directory)
            .into_diagnostic()
            .context(format!("creating {}", &self.directory.display()))?;

        for (id, name) in plz.file_names().iter().enumerate() {
            let p = self.directory.join(name);
            info!("writing {}", p.display());

            let mut out = if !self.overwrite {
                File::create_new(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            } else {
                File::create(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            };

            let data = plz.file_bytes(id as u32).unwrap_or_default();
            out.write_all(&data).into_diagnostic()?;
        }

        Ok(())
    }
}

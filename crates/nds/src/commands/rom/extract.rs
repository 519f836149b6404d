use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use nds_fs::RomFs;
use std::{fs::File, io::Write, path::PathBuf};
use tracing::info;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input game image
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
        let mut f = File::open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", &self.file.display()))?;
        let fs = RomFs::read(&mut f)?;

        for (path, id) in fs.walk() {
            let p = self.directory.join(&path);
            info!("writing {}", p.display());

            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)
                    .into_diagnostic()
                    .context(format!("creating {}", parent.display()))?;
            }

            let mut out = if !self.overwrite {
                File::create_new(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            } else {
                File::create(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            };

            let data = fs.file_bytes(id).unwrap_or_default();
            out.write_all(&data).into_diagnostic()?;
        }

        Ok(())
    }
}

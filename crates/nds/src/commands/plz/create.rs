use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use nds_fs::{compression, Filesystem, PlzArchive, Stream};
use std::{fs::File, io::Write, path::PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Args)]
pub struct CreateArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target PLZ file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Store the compression type tag twice
    #[arg(long, default_value_t = false)]
    double_typed: bool,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl CreateArgs {
    pub fn handle(&self) -> Result<()> {
        info!("creating {}", &self.file.display());

        let files = WalkDir::new(&self.directory)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .collect::<Vec<_>>();

        if files.is_empty() {
            return Err(miette!("directory is empty"));
        }

        let plz = PlzArchive::new();
        for file in files {
            let name = file
                .path()
                .strip_prefix(&self.directory)
                .into_diagnostic()?;
            // The archive is flat; nested paths would not survive.
            if name.components().count() > 1 {
                return Err(miette!("{} is nested, archives are flat", name.display()));
            }
            let name = name
                .to_str()
                .ok_or(miette!("unable to convert {} to a string", name.display()))?;
            info!("adding {name}");

            let data = std::fs::read(file.path())
                .into_diagnostic()
                .context(format!("opening {}", file.path().display()))?;

            let mut f = plz.open(name.into(), "wb+")?;
            f.write_all(&data).into_diagnostic()?;
            f.close()?;
        }

        let packed = compression::compress(&plz.to_bytes()?, self.double_typed)?;

        let mut out = if !self.overwrite {
            File::create_new(&self.file)
                .into_diagnostic()
                .context(format!("creating {}", &self.file.display()))?
        } else {
            File::create(&self.file)
                .into_diagnostic()
                .context(format!("creating {}", &self.file.display()))?
        };
        out.write_all(&packed).into_diagnostic()?;

        Ok(())
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use macb_image::config::{parse_size, RunConfig};
use macb_image::error::exit_code;
use macb_image::export::DEFAULT_EXCLUDES;
use macb_image::pipeline::image_container;

/// Image a running container into an ext4 disk image that keeps the container's MACB timestamps
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Name or id of the running container
    container: String,
    /// Entry whose metadata is shown before and after restoration
    #[arg(short, long, default_value = "/etc/hostname")]
    verify_path: String,
    /// Directory for the image and intermediate artifacts
    #[arg(short, long, default_value = "macb-output")]
    output: PathBuf,
    /// Image capacity, e.g. 10G or 512M
    #[arg(short, long, default_value = "10G", value_parser = parse_size)]
    size: u64,
    /// Source directory left out of the export (repeatable)
    #[arg(long = "exclude", value_name = "DIR")]
    excludes: Vec<String>,
    /// Leave the empty mount point in place after the run
    #[arg(long)]
    keep_mount: bool,
}

impl Args {
    fn into_config(self) -> RunConfig {
        let excludes = if self.excludes.is_empty() {
            DEFAULT_EXCLUDES.iter().map(|root| root.to_string()).collect()
        } else {
            self.excludes
        };

        RunConfig {
            source: self.container,
            verify_path: self.verify_path,
            output: self.output,
            image_size: self.size,
            excludes,
            keep_mount: self.keep_mount,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();

    match image_container(config) {
        Ok(report) => {
            println!(
                "{}: {} (offset {}s)",
                report.source, report.restore, report.offset_seconds
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

//! Command-line entry point.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use labdeploy::backend::Backend;
use labdeploy::config::RunConfig;
use labdeploy::driver::Driver;

/// Deployment orchestrator for a fixed-topology detection lab.
#[derive(Debug, Parser)]
#[command(name = "labdeploy", version, about)]
struct Cli {
    /// Lab working directory (templates, boxes, environment files).
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Virtualization backend to use; prompted interactively when omitted.
    #[arg(long, value_parser = parse_backend)]
    provider: Option<Backend>,

    /// Path to the image builder executable.
    #[arg(long, default_value = "packer")]
    packer_path: PathBuf,

    /// Path to the environment manager executable.
    #[arg(long, default_value = "vagrant")]
    vagrant_path: PathBuf,

    /// Download prebuilt images from the mirror instead of building them.
    #[arg(long)]
    download: bool,

    /// Number of workstation hosts to deploy.
    #[arg(long, default_value_t = 1)]
    workstations: usize,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("labdeploy=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = RunConfig::new(cli.workdir)
        .with_builder_path(cli.packer_path)
        .with_manager_path(cli.vagrant_path)
        .with_download(cli.download)
        .with_workstation_count(cli.workstations);
    if let Some(backend) = cli.provider {
        config = config.with_backend(backend);
    }

    let summary = Driver::new(config).run().await;
    print!("{}", summary.render());

    if summary.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

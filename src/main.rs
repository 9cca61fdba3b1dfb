use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use tf_scene::app::{self, ViewerOptions};
use tf_scene::RendererConfig;

/// Transform-aware 3D viewer for robotics messages.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON renderer configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Publish the synthetic map/odom/base_link scene.
    #[arg(long)]
    demo: bool,

    /// Demo publish rate in Hz.
    #[arg(long, default_value_t = 20.0)]
    rate: f64,

    /// Overrides the configured fixed frame.
    #[arg(long)]
    fixed_frame: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match RendererConfig::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("{}", err);
                return ExitCode::FAILURE;
            }
        },
        None => RendererConfig::default(),
    };
    if args.fixed_frame.is_some() {
        config.fixed_frame = args.fixed_frame;
    }

    let options = ViewerOptions {
        config,
        demo_rate: args.demo.then_some(args.rate),
    };
    match app::run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

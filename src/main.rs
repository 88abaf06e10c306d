// SPDX-License-Identifier: GPL-3.0-only

use camstream::config::ServerConfig;
use camstream::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_JPEG_QUALITY, DEFAULT_SUBSCRIBER_QUEUE};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camstream")]
#[command(about = "Live camera stream with recording, snapshots and a stopwatch")]
#[command(version = camstream::constants::app_info::version())]
#[command(subcommand_required = false, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stream server (default)
    Serve(ServeArgs),

    /// List available cameras
    List,

    /// Take a photo
    Photo {
        /// Camera index to use (from 'camstream list')
        #[arg(short, long, default_value = "0")]
        camera: u32,

        /// Output directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a video
    Record {
        /// Camera index to use (from 'camstream list')
        #[arg(short, long, default_value = "0")]
        camera: u32,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: SocketAddr,

    /// Camera index opened at startup
    #[arg(short, long, default_value = "0")]
    camera: u32,

    /// Start without opening a camera
    #[arg(long, conflicts_with = "camera")]
    no_camera: bool,

    /// Directory for snapshots and recordings
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// JPEG quality for the stream and snapshots (1-100)
    #[arg(short, long, default_value_t = DEFAULT_JPEG_QUALITY)]
    quality: u8,

    /// Stream parts buffered per viewer before frames are dropped
    #[arg(long, default_value_t = DEFAULT_SUBSCRIBER_QUEUE)]
    queue: usize,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind,
            initial_camera: (!self.no_camera).then_some(self.camera),
            output_dir: self.output,
            jpeg_quality: self.quality,
            subscriber_queue: self.queue,
        }
        .normalized()
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camstream=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => cli::run_server(args.into_config()),
        Some(Commands::List) => cli::list_cameras(),
        Some(Commands::Photo { camera, output }) => cli::take_photo(camera, output),
        Some(Commands::Record {
            camera,
            duration,
            output,
        }) => cli::record_video(camera, duration, output),
        None => cli::run_server(cli.serve.into_config()),
    }
}

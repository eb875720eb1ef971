use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use partstream::transport::UploadMethod;
use partstream::{cli, config, Core};

#[derive(Parser)]
#[command(name = "partstream")]
#[command(version, about = "Chunked uploads, multipart orchestration and POST event streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Disable SSL certificate verification
    #[arg(long, global = true)]
    insecure: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Put,
    Post,
}

impl From<MethodArg> for UploadMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Put => UploadMethod::Put,
            MethodArg::Post => UploadMethod::Post,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files through the multipart coordinator
    Upload {
        /// Files to upload, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Owner/project identifier (defaults to the profile's owner_id)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Upload one file to a URL over a single connection
    Put {
        /// Destination URL
        url: String,

        /// Local file
        file: PathBuf,

        /// HTTP method
        #[arg(long, value_enum, default_value = "put")]
        method: MethodArg,

        /// Bytes per chunk request (defaults to transport.chunk_size)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Open a POST event stream and print its messages
    Stream {
        /// Endpoint path or absolute URL (defaults to stream.path)
        #[arg(long)]
        path: Option<String>,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },

    /// Apply the header-equivalent signature to a presigned GET URL
    Resign {
        /// Presigned URL
        url: String,

        /// Secret access key (defaults to the profile's secret_key)
        #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
        secret_key: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Single-threaded: every stream and upload is one sequential task
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;
    if cli.insecure {
        config.transport.insecure_tls = true;
    }

    let core = Core::new(config)?;

    match cli.command {
        Commands::Upload { files, owner } => {
            cli::cmd_upload(&core, &files, owner.as_deref()).await?;
        }
        Commands::Put {
            url,
            file,
            method,
            chunk_size,
        } => {
            cli::cmd_put(&core, &url, &file, method.into(), chunk_size).await?;
        }
        Commands::Stream { path, body } => {
            cli::cmd_stream(&core, path.as_deref(), body.as_deref()).await?;
        }
        Commands::Resign { url, secret_key } => {
            cli::cmd_resign(&core, &url, secret_key.as_deref()).await?;
        }
    }

    Ok(())
}

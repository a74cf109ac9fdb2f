//! Drive a Hyper-V guest through PowerShell Direct.
//!
//! Run with: cargo run -p psdirect-cli -- --vm build-vm exec hostname
//!
//! Credentials fall back to `PSDIRECT_VM_NAME`, `PSDIRECT_USERNAME` and
//! `PSDIRECT_PASSWORD`. Set `RUST_LOG=debug` and `PSDIRECT_VERBOSE=1` to see
//! every script invocation.

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use psdirect_core::{Communicator, PowershellDirectConfig, RemoteCmd};
use psdirect_session::DirectCommunicator;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "psdirect", about = "Run commands and copy files in a Hyper-V guest")]
struct Cli {
    /// Name of the virtual machine.
    #[arg(long, env = "PSDIRECT_VM_NAME", default_value = "")]
    vm: String,

    /// Guest account name.
    #[arg(long, env = "PSDIRECT_USERNAME", default_value = "")]
    username: String,

    /// Guest account password.
    #[arg(long, env = "PSDIRECT_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command in the guest and exit with its status.
    Exec {
        /// Command text, joined with spaces.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Copy a local file into the guest.
    Upload { local: PathBuf, remote: String },

    /// Copy a guest file to the local machine.
    Download { remote: String, local: PathBuf },

    /// Copy a local directory into the guest. A trailing separator on `src`
    /// copies only its contents.
    UploadDir {
        src: String,
        dst: String,
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Copy a guest directory to the local machine.
    DownloadDir {
        src: String,
        dst: String,
        #[arg(long)]
        exclude: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = PowershellDirectConfig {
        vm_name: cli.vm,
        username: cli.username,
        password: cli.password,
    };

    let problems = config.prepare();
    if !problems.is_empty() {
        let messages: Vec<String> = problems.iter().map(ToString::to_string).collect();
        bail!("invalid configuration:\n  {}", messages.join("\n  "));
    }

    let comm = DirectCommunicator::new("", &config)?;

    match cli.command {
        Command::Exec { command } => return exec(&comm, command.join(" ")).await,
        Command::Upload { local, remote } => {
            let mut file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("open {}", local.display()))?;
            comm.upload(&remote, Some(&mut file)).await?;
        }
        Command::Download { remote, local } => {
            let mut file = tokio::fs::File::create(&local)
                .await
                .with_context(|| format!("create {}", local.display()))?;
            comm.download(&remote, Some(&mut file)).await?;
        }
        Command::UploadDir { src, dst, exclude } => comm.upload_dir(&dst, &src, &exclude).await?,
        Command::DownloadDir { src, dst, exclude } => {
            comm.download_dir(&src, &dst, &exclude).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn exec(comm: &DirectCommunicator, command: String) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let cmd = RemoteCmd::new(command)
        .with_stdout(tokio::io::stdout())
        .with_stderr(tokio::io::stderr());
    let handle = cmd.exit_handle();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling remote command");
                cancel.cancel();
            }
        }
    });

    comm.start(Some(cmd), &cancel).await?;
    let code = handle.wait().await?;
    tracing::debug!(code, "Remote command finished");

    Ok(u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from))
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use irec_core::{Session, StdoutSink};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Recovery-mode USB bootloader tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show device mode and chip identifier
    Info,
    /// Send a single command and stream device output
    Cmd {
        /// Command text, e.g. "printenv"
        command: String,
    },
    /// Upload a firmware image
    File {
        /// Path to the image file
        path: PathBuf,
    },
    /// Dump the device environment buffer
    Env,
    /// Reset the device
    Reset,
    /// Stream device output until the console goes quiet
    Listen,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::WARN.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut session = Session::discover().context("no device in a recognized mode")?;
    info!(mode = %session.mode(), "connected");

    match args.command {
        Command::Info => {
            println!("mode: {}", session.mode());
            println!("product id: {:#06x}", session.mode().product_id());
            let ecid = session.get_ecid().context("failed to read ECID")?;
            println!("ECID: {ecid:016X}");
        }
        Command::Cmd { command } => {
            session.set_receiver(StdoutSink);
            session.send(command.as_bytes()).context("send failed")?;
            session.receive().context("receive failed")?;
        }
        Command::File { path } => {
            session
                .send_file(&path)
                .with_context(|| format!("upload of {} failed", path.display()))?;
            println!("uploaded {}", path.display());
        }
        Command::Env => {
            let env = session.get_env().context("environment query failed")?;
            let text = match env.iter().position(|&b| b == 0) {
                Some(end) => &env[..end],
                None => &env[..],
            };
            println!("{}", String::from_utf8_lossy(text));
        }
        Command::Reset => {
            session.reset().context("reset failed")?;
            println!("device reset");
        }
        Command::Listen => {
            session.set_receiver(StdoutSink);
            session.receive().context("receive failed")?;
        }
    }

    Ok(())
}

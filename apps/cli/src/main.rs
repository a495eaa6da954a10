use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use patchlink_core::{
    Command, Dispatcher, DispatcherConfig, MockTransport, Outcome, ShellTask, TracingObserver,
    TransferSource,
};
use tracing::{error, info, warn};

/// Upper bound on a single command, uploads included.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Parser, Debug)]
#[command(author, version, about = "Patch device command tool (simulated device)", long_about = None)]
struct Args {
    /// Dispatcher configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Upload files to a directory on the SD card
    Upload {
        files: Vec<PathBuf>,
        /// Destination directory on the device
        #[arg(long, default_value = "/")]
        dest: String,
        /// Continue with the next file when one fails
        #[arg(long)]
        keep_going: bool,
    },
    /// Upload a firmware image to device memory
    Firmware { image: PathBuf },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file
    Rm { path: String },
    /// Request the file list
    Ls,
    /// Request file info
    Info { path: String },
    /// Start the loaded patch
    Start,
    /// Stop the running patch
    Stop,
    /// Run an external build tool
    RunShell {
        program: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Write the default configuration
    Config {
        #[arg(long)]
        write: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Action::Config { write } = &args.command {
        DispatcherConfig::default().save_to_file(write)?;
        info!(path = %write.display(), "Wrote default configuration");
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => DispatcherConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DispatcherConfig::default(),
    };

    info!("Starting patchlink (simulated device)...");
    let dispatcher = Dispatcher::new(
        Arc::new(MockTransport::new()),
        Arc::new(TracingObserver),
        config,
    );
    dispatcher.start();

    let result = run(&dispatcher, args.command);
    dispatcher.shutdown();
    if let Err(e) = &result {
        error!("Error: {:#}", e);
    }
    result
}

fn run(dispatcher: &Dispatcher, action: Action) -> Result<()> {
    match action {
        Action::Upload {
            files,
            dest,
            keep_going,
        } => upload(dispatcher, &files, &dest, keep_going),
        Action::Firmware { image } => {
            let data =
                std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            dispatcher
                .admission()
                .long_operation(|| submit(dispatcher, Command::upload_firmware(&data), true))
        }
        Action::Mkdir { path } => submit(dispatcher, Command::create_directory(path), false),
        Action::Rm { path } => submit(dispatcher, Command::delete_file(path), false),
        Action::Ls => submit(dispatcher, Command::get_file_list(), false),
        Action::Info { path } => submit(dispatcher, Command::get_file_info(path), false),
        Action::Start => submit(dispatcher, Command::start_patch(), false),
        Action::Stop => submit(dispatcher, Command::stop_patch(), false),
        Action::RunShell { program, args } => {
            submit(dispatcher, Command::shell(ShellTask::build(program).args(args)), false)
        }
        Action::Config { .. } => Ok(()),
    }
}

/// Queue one command and wait for it. `owned` commands bypass admission.
fn submit(dispatcher: &Dispatcher, command: Command, owned: bool) -> Result<()> {
    let completion = command.completion();
    let offered = if owned {
        dispatcher.enqueue(command)
    } else {
        dispatcher.offer(command)
    };
    if !offered.is_queued() {
        bail!("Command not accepted: {:?}", offered);
    }
    match completion.wait(COMMAND_TIMEOUT) {
        Some(Outcome { success: true, .. }) => Ok(()),
        Some(outcome) => bail!("Command failed: {}", outcome.status),
        None => bail!("Command did not finish within {:?}", COMMAND_TIMEOUT),
    }
}

fn upload(dispatcher: &Dispatcher, files: &[PathBuf], dest: &str, keep_going: bool) -> Result<()> {
    if files.is_empty() {
        bail!("No files to upload");
    }
    let dest = dest.trim_end_matches('/');

    let failures = dispatcher.admission().long_operation(|| -> Result<usize> {
        if !dest.is_empty() {
            submit(dispatcher, Command::create_directory(dest), true)?;
        }
        let mut failures = 0;
        for file in files {
            let name = file
                .file_name()
                .with_context(|| format!("{} has no file name", file.display()))?
                .to_string_lossy();
            let target = format!("{}/{}", dest, name);
            let source = TransferSource::from_file(file)
                .with_context(|| format!("opening {}", file.display()))?;

            if let Err(e) = submit(dispatcher, Command::upload_file(source, target.as_str()), true) {
                failures += 1;
                if !keep_going {
                    return Err(e.context(format!("uploading {}", file.display())));
                }
                warn!(file = %file.display(), error = %e, "Upload failed, continuing");
            }
        }
        Ok(failures)
    })?;

    // Still inside the cooldown, so the refresh is admitted.
    submit(dispatcher, Command::get_file_list(), false)?;

    if failures > 0 {
        bail!("{} of {} uploads failed", failures, files.len());
    }
    info!(count = files.len(), "All uploads complete");
    Ok(())
}

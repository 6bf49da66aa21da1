//! Saltyvault CLI - encrypted single-file containers for directory trees
//!
//! Creates containers, adds files to them, and mounts them into a private
//! temporary directory for interactive editing.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use saltyvault::container::Container;
use saltyvault::error::{ErrorCategory, ErrorKind, Result, VaultError};
use saltyvault::passphrase::{
    ConfirmingPassphraseReader, LinePassphraseReader, PassphraseReader, TerminalPassphraseReader,
};
use saltyvault::shell::Shell;

#[derive(Parser)]
#[command(name = "saltyvault")]
#[command(version)]
#[command(about = "Passphrase-encrypted containers for directory trees.", long_about = None)]
struct Cli {
    /// Read the passphrase from the first line of stdin instead of from the terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty container
    Init {
        /// Path to the container file to create
        #[arg(value_name = "CONTAINER")]
        container: PathBuf,
    },

    /// Add a file to a container
    Add {
        /// Path to the container file
        #[arg(value_name = "CONTAINER")]
        container: PathBuf,

        /// Path to the file to add
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Path within the container (defaults to the file's name)
        #[arg(long, value_name = "PATH")]
        target: Option<String>,
    },

    /// Mount a container for interactive editing
    Mount {
        /// Path to the container file
        #[arg(value_name = "CONTAINER")]
        container: PathBuf,
    },

    /// List the files in a container
    Ls {
        /// Path to the container file
        #[arg(value_name = "CONTAINER")]
        container: PathBuf,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let result = match cli.command {
        Commands::Init { container } => {
            init_container(&container, cli.passphrase_stdin, &mut input)
        }
        Commands::Add {
            container,
            file,
            target,
        } => add_file(
            &container,
            &file,
            target.as_deref(),
            cli.passphrase_stdin,
            &mut input,
        ),
        Commands::Mount { container } => {
            mount_container(&container, cli.passphrase_stdin, &mut input)
        }
        Commands::Ls { container } => list_container(&container, cli.passphrase_stdin, &mut input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_container(path: &Path, use_stdin: bool, input: &mut impl BufRead) -> Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::ContainerExists,
            format!("container already exists at {}", path.display()),
        ));
    }

    let key = if use_stdin {
        LinePassphraseReader::new(input).read_passphrase()?
    } else {
        ConfirmingPassphraseReader::new(
            Box::new(TerminalPassphraseReader::with_prompt(
                "Passphrase for new container: ",
            )),
            Box::new(TerminalPassphraseReader::with_prompt("Confirm passphrase: ")),
        )
        .read_passphrase()?
    };

    Container::create(path, &key)?;
    println!("Empty container created: {}", path.display());
    Ok(())
}

fn add_file(
    path: &Path,
    file: &Path,
    target: Option<&str>,
    use_stdin: bool,
    input: &mut impl BufRead,
) -> Result<()> {
    require_container(path)?;
    if !file.is_file() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SourceNotFound,
            format!("file not found at {}", file.display()),
        ));
    }

    let key = read_key(use_stdin, input)?;
    let mut container = Container::open(path);
    container.add_file(file, &key, target)?;

    let target_name = match target {
        Some(target) => target.to_string(),
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    println!("File added to container: {target_name}");
    Ok(())
}

fn mount_container(path: &Path, use_stdin: bool, input: &mut impl BufRead) -> Result<()> {
    require_container(path)?;
    let key = read_key(use_stdin, input)?;

    let mut container = Container::open(path);
    let mount_path = container.mount(&key)?.to_path_buf();
    install_interrupt_cleanup(mount_path.clone())?;

    println!("Container mounted at: {}", mount_path.display());
    println!("\nFiles in container:");
    let shell = Shell::new(&container, &key, Shell::editor_from_env());
    let mut stdout = io::stdout();
    let result = shell
        .print_files(&mut stdout)
        .and_then(|()| {
            println!("\nYou can now edit files at: {}", mount_path.display());
            shell.run(input, &mut stdout)
        });

    container.unmount();
    result.map(|_| ())
}

fn list_container(path: &Path, use_stdin: bool, input: &mut impl BufRead) -> Result<()> {
    require_container(path)?;
    let key = read_key(use_stdin, input)?;

    let mut container = Container::open(path);
    container.mount(&key)?;
    let files = container.list_files();
    container.unmount();

    for file in files? {
        println!("{file}");
    }
    Ok(())
}

fn read_key(use_stdin: bool, input: &mut impl BufRead) -> Result<Zeroizing<Vec<u8>>> {
    if use_stdin {
        LinePassphraseReader::new(input).read_passphrase()
    } else {
        TerminalPassphraseReader::new().read_passphrase()
    }
}

fn require_container(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::ContainerNotFound,
            format!("container not found at {}", path.display()),
        ))
    }
}

/// Deletes the working tree and exits on Ctrl-C, so an interrupted session
/// never leaves plaintext behind.
fn install_interrupt_cleanup(tree: PathBuf) -> Result<()> {
    ctrlc::set_handler(move || {
        if let Err(e) = fs::remove_dir_all(&tree) {
            warn!(tree = %tree.display(), error = %e, "failed to remove working tree");
        }
        eprintln!("\nInterrupted; exiting without saving changes");
        process::exit(130);
    })
    .map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to install Ctrl-C handler",
            e,
        )
    })
}

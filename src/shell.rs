//! Interactive shell for editing a mounted container
//!
//! Reads one command per line: `ls`, `edit <file>`, `save` (save and leave)
//! and `exit` (leave without saving). End of input also leaves without
//! saving. The caller owns mounting and unmounting.

use crate::archive;
use crate::container::Container;
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use std::io::{self, BufRead, Write};
use std::process;
use tracing::debug;

/// Editor used when `$EDITOR` is unset.
pub const DEFAULT_EDITOR: &str = "nano";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List,
    Edit(String),
    Save,
    Exit,
    Blank,
    Unknown,
}

impl Command {
    fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (None, _, _) => Self::Blank,
            (Some("ls"), None, _) => Self::List,
            (Some("edit"), Some(file), None) => Self::Edit(file.to_string()),
            (Some("save"), None, _) => Self::Save,
            (Some("exit"), None, _) => Self::Exit,
            _ => Self::Unknown,
        }
    }
}

/// How the shell session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellOutcome {
    Saved,
    Discarded,
}

pub struct Shell<'a> {
    container: &'a Container,
    key: &'a [u8],
    editor: String,
}

impl<'a> Shell<'a> {
    /// `container` must already be mounted.
    pub fn new(container: &'a Container, key: &'a [u8], editor: impl Into<String>) -> Self {
        Self {
            container,
            key,
            editor: editor.into(),
        }
    }

    /// Editor from `$EDITOR`, falling back to [`DEFAULT_EDITOR`].
    pub fn editor_from_env() -> String {
        std::env::var("EDITOR")
            .ok()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EDITOR.to_string())
    }

    /// Runs until `save`, `exit` or end of input.
    pub fn run(&self, input: &mut impl BufRead, out: &mut impl Write) -> Result<ShellOutcome> {
        writeln!(out, "Available commands:").map_err(write_error)?;
        writeln!(out, "  ls - List files").map_err(write_error)?;
        writeln!(out, "  edit <file> - Edit a file").map_err(write_error)?;
        writeln!(out, "  save - Save changes and exit").map_err(write_error)?;
        writeln!(out, "  exit - Exit without saving").map_err(write_error)?;

        let mut line = String::new();
        loop {
            write!(out, "\n> ").map_err(write_error)?;
            out.flush().map_err(write_error)?;

            line.clear();
            let n = input.read_line(&mut line).map_err(|e| {
                VaultError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to read command",
                    e,
                )
            })?;
            if n == 0 {
                writeln!(out, "\nExiting without saving changes").map_err(write_error)?;
                return Ok(ShellOutcome::Discarded);
            }

            match Command::parse(&line) {
                Command::Blank => {}
                Command::List => self.print_files(out)?,
                Command::Edit(file) => self.edit(&file, out)?,
                Command::Save => {
                    self.container.save(self.key)?;
                    writeln!(out, "Changes saved to container").map_err(write_error)?;
                    return Ok(ShellOutcome::Saved);
                }
                Command::Exit => {
                    writeln!(out, "Exiting without saving changes").map_err(write_error)?;
                    return Ok(ShellOutcome::Discarded);
                }
                Command::Unknown => {
                    writeln!(out, "Unknown command. Use: ls, edit <file>, save, or exit")
                        .map_err(write_error)?;
                }
            }
        }
    }

    /// Prints the container's files, one per line, or `(empty)`.
    pub fn print_files(&self, out: &mut impl Write) -> Result<()> {
        let files = self.container.list_files()?;
        if files.is_empty() {
            writeln!(out, "  (empty)").map_err(write_error)?;
        }
        for file in files {
            writeln!(out, "  {file}").map_err(write_error)?;
        }
        Ok(())
    }

    fn edit(&self, file: &str, out: &mut impl Write) -> Result<()> {
        let root = self.container.mount_path().ok_or_else(|| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::NotMounted,
                "container is not mounted",
            )
        })?;
        let target = match archive::sanitize_rel_path(file) {
            Ok(rel_path) => root.join(rel_path),
            Err(_) => {
                writeln!(out, "Invalid path: {file}").map_err(write_error)?;
                return Ok(());
            }
        };
        if !target.is_file() {
            writeln!(out, "File not found: {file}").map_err(write_error)?;
            return Ok(());
        }

        let mut words = self.editor.split_whitespace();
        let Some(program) = words.next() else {
            writeln!(out, "No editor configured").map_err(write_error)?;
            return Ok(());
        };
        debug!(editor = %program, file, "launching editor");
        match process::Command::new(program).args(words).arg(&target).status() {
            Ok(status) if status.success() => {}
            Ok(status) => writeln!(out, "Editor exited with {status}").map_err(write_error)?,
            Err(e) => writeln!(out, "Failed to launch editor {program}: {e}").map_err(write_error)?,
        }
        Ok(())
    }
}

fn write_error(e: io::Error) -> VaultError {
    VaultError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        "failed to write shell output",
        e,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn run_shell(container: &Container, script: &str, editor: &str) -> (ShellOutcome, String) {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        let outcome = Shell::new(container, b"pw", editor)
            .run(&mut input, &mut out)
            .unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("  \n"), Command::Blank);
        assert_eq!(Command::parse("ls\n"), Command::List);
        assert_eq!(
            Command::parse("edit notes.txt"),
            Command::Edit("notes.txt".to_string())
        );
        assert_eq!(Command::parse("edit"), Command::Unknown);
        assert_eq!(Command::parse("edit a b"), Command::Unknown);
        assert_eq!(Command::parse("save"), Command::Save);
        assert_eq!(Command::parse("exit"), Command::Exit);
        assert_eq!(Command::parse("rm -rf"), Command::Unknown);
    }

    // These use the real cipher, so each save or mount pays for one scrypt run.
    fn mounted(dir: &TempDir) -> Container {
        let mut container = Container::create(dir.path().join("c.vault"), b"pw")
            .unwrap()
            .with_work_root(dir.path());
        container.mount(b"pw").unwrap();
        container
    }

    #[test]
    fn test_ls_and_exit_discards() {
        let dir = TempDir::new().unwrap();
        let container = mounted(&dir);
        let before = fs::read(container.path()).unwrap();
        let root = container.mount_path().unwrap().to_path_buf();

        let (outcome, out) = run_shell(&container, "ls\nbogus\n", DEFAULT_EDITOR);
        assert_eq!(outcome, ShellOutcome::Discarded);
        assert!(out.contains("(empty)"));
        assert!(out.contains("Unknown command"));

        fs::write(root.join("a.txt"), b"x").unwrap();
        let (outcome, out) = run_shell(&container, "ls\nexit\nsave\n", DEFAULT_EDITOR);
        assert_eq!(outcome, ShellOutcome::Discarded);
        assert!(out.contains("  a.txt\n"));
        assert_eq!(fs::read(container.path()).unwrap(), before);
    }

    #[test]
    fn test_save_writes_container() {
        let dir = TempDir::new().unwrap();
        let mut container = mounted(&dir);
        let root = container.mount_path().unwrap().to_path_buf();
        fs::write(root.join("notes.txt"), b"hello").unwrap();

        let (outcome, out) = run_shell(&container, "save\n", DEFAULT_EDITOR);
        assert_eq!(outcome, ShellOutcome::Saved);
        assert!(out.contains("Changes saved to container"));

        container.unmount();
        container.mount(b"pw").unwrap();
        assert_eq!(container.list_files().unwrap(), vec!["notes.txt"]);
    }

    #[test]
    fn test_edit_missing_and_escaping() {
        let dir = TempDir::new().unwrap();
        let container = mounted(&dir);
        let (_, out) = run_shell(
            &container,
            "edit nope.txt\nedit ../c.vault\n",
            DEFAULT_EDITOR,
        );
        assert!(out.contains("File not found: nope.txt"));
        assert!(out.contains("Invalid path: ../c.vault"));
    }

    #[test]
    #[cfg(unix)]
    fn test_edit_runs_editor() {
        let dir = TempDir::new().unwrap();
        let container = mounted(&dir);
        let root = container.mount_path().unwrap().to_path_buf();
        fs::write(root.join("notes.txt"), b"hello").unwrap();

        // `touch` stands in for an editor; only the exit status matters.
        let (_, out) = run_shell(&container, "edit notes.txt\n", "touch");
        assert!(!out.contains("Editor exited"));
        assert!(!out.contains("Failed to launch"));

        let (_, out) = run_shell(&container, "edit notes.txt\n", "false");
        assert!(out.contains("Editor exited with"));

        let (_, out) = run_shell(&container, "edit notes.txt\n", "no-such-editor-binary");
        assert!(out.contains("Failed to launch editor no-such-editor-binary"));
    }
}

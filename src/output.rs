use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

use crate::markup::markdown_to_text;

pub const STDOUT: &str = "stdout";

/// True when `path` means "print to the terminal".
pub fn is_stdout(path: &str) -> bool {
    let path = path.trim();
    path.is_empty() || path == STDOUT
}

/// Prints `content` for the terminal, or writes it untouched to `path` when one is given.
pub fn handle_output(path: &str, content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    write_output(path, content, &mut lock)
}

fn write_output<W: Write>(path: &str, content: &str, terminal: &mut W) -> Result<()> {
    if is_stdout(path) {
        writeln!(terminal, "{}", markdown_to_text(content)).context("Failed to write response to stdout")?;
        return terminal.flush().context("Failed to flush stdout");
    }

    let path = Path::new(path.trim());
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory '{}'", parent.display()))?;
    }
    fs::write(path, content)
        .with_context(|| format!("Failed to write response to '{}'", path.display()))?;
    info!(path = %path.display(), bytes = content.len(), "wrote response to file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{is_stdout, write_output};

    #[test]
    fn stdout_targets() {
        assert!(is_stdout(""));
        assert!(is_stdout(" stdout "));
        assert!(!is_stdout("answer.md"));
    }

    #[test]
    fn terminal_output_is_rendered_markdown() {
        let mut terminal = Vec::new();
        write_output("", "# Answer\n\nUse **cargo**.", &mut terminal).expect("write");
        assert_eq!(String::from_utf8(terminal).expect("utf-8"), "Answer\n\nUse cargo.\n");

        let mut terminal = Vec::new();
        write_output("stdout", "plain", &mut terminal).expect("write");
        assert_eq!(String::from_utf8(terminal).expect("utf-8"), "plain\n");
    }

    #[test]
    fn file_output_keeps_raw_markdown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/answer.md");
        let mut terminal = Vec::new();

        write_output(path.to_str().expect("utf-8 path"), "# Answer\n", &mut terminal).expect("write");

        assert_eq!(fs::read_to_string(&path).expect("read back"), "# Answer\n");
        assert!(terminal.is_empty());
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut terminal = Vec::new();
        let err = write_output(dir.path().to_str().expect("utf-8 path"), "x", &mut terminal)
            .expect_err("writing to a directory should fail");
        assert!(
            err.to_string().contains("Failed to write response"),
            "unexpected: {err}"
        );
    }
}

//! Compilation database loading.
//!
//! The canonical input is a Clang-style `compile_commands.json`. Projects
//! without one fall back to a directory scan that synthesizes one unit per
//! C or C++ source file found under the project root.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::Deserialize;
use tracing::{debug, info};

/// One translation unit: the source file plus the compiler flags that
/// matter for parsing it.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub file: PathBuf,
    pub arguments: Vec<String>,
}

/// Raw `compile_commands.json` entry. The format allows either a single
/// `command` string or a pre-split `arguments` array.
#[derive(Debug, Deserialize)]
struct CommandEntry {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// Flag prefixes worth keeping for parsing: include paths, macro
/// definitions, language standard, optimization level.
const KEPT_FLAG_PREFIXES: [&str; 4] = ["-I", "-D", "-std=", "-O"];

fn filter_arguments<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept = Vec::new();
    let mut skip_next = false;
    for arg in args {
        let arg = arg.as_ref();
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "-o" {
            skip_next = true;
            continue;
        }
        if KEPT_FLAG_PREFIXES
            .iter()
            .any(|prefix| arg.starts_with(prefix))
        {
            kept.push(arg.to_string());
        }
    }
    kept
}

impl CommandEntry {
    fn into_unit(self) -> CompilationUnit {
        let file = if self.file.is_absolute() {
            self.file
        } else {
            self.directory.join(&self.file)
        };

        let arguments = match (self.arguments, self.command) {
            (Some(args), _) => filter_arguments(args),
            (None, Some(command)) => filter_arguments(command.split_whitespace()),
            (None, None) => Vec::new(),
        };

        CompilationUnit { file, arguments }
    }
}

/// Load compilation units from a `compile_commands.json` file.
pub fn load_compilation_database(path: &Path) -> Result<Vec<CompilationUnit>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read compilation database {}", path.display()))?;
    let entries: Vec<CommandEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid compilation database {}", path.display()))?;

    let units: Vec<CompilationUnit> = entries
        .into_iter()
        .map(CommandEntry::into_unit)
        .collect();
    info!(
        "Loaded {} compilation units from {}",
        units.len(),
        path.display()
    );
    Ok(units)
}

/// Synthesize compilation units by scanning the project directory.
///
/// Honors .gitignore and skips hidden files. Each matching source file
/// becomes a unit with a single `-I<project root>` argument so headers next
/// to the sources resolve.
pub fn scan_directory(root: &Path, extensions: &[String]) -> Result<Vec<CompilationUnit>> {
    let extensions: HashSet<String> = extensions
        .iter()
        .map(|e| e.to_lowercase())
        .collect();

    let mut builder = WalkBuilder::new(root);
    builder.git_ignore(true);
    builder.git_global(true);
    builder.git_exclude(true);
    builder.hidden(true);

    let include_flag = format!("-I{}", root.display());
    let units: Vec<CompilationUnit> = builder
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| extensions.contains(&ext.to_lowercase()))
        })
        .map(|entry| CompilationUnit {
            file: entry.into_path(),
            arguments: vec![include_flag.clone()],
        })
        .collect();

    debug!(
        "Directory scan of {} produced {} compilation units",
        root.display(),
        units.len()
    );
    Ok(units)
}

/// Load the database at `compile_commands` if given, otherwise scan `root`.
pub fn resolve_units(
    root: &Path,
    compile_commands: Option<&Path>,
    extensions: &[String],
) -> Result<Vec<CompilationUnit>> {
    match compile_commands {
        Some(path) => load_compilation_database(path),
        None => {
            let default_db = root.join("compile_commands.json");
            if default_db.is_file() {
                load_compilation_database(&default_db)
            } else {
                info!("No compilation database found, scanning {}", root.display());
                scan_directory(root, extensions)
            }
        }
    }
}

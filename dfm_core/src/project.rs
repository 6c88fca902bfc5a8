use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use rayon::prelude::*;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::CONFIG_FILE_CANDIDATES;
use crate::DfmConfig;
use crate::DfmError;
use crate::DfmResult;
use crate::Engine;
use crate::RenderedDocument;
use crate::SourceDocument;

/// Options controlling which files a project build picks up.
#[derive(Debug, Clone)]
pub struct ScanOptions {
	/// Gitignore-style patterns for files and directories to skip.
	pub exclude_patterns: Vec<String>,
	/// When non-empty, only markdown files matching one of these globs are
	/// built.
	pub file_set: GlobSet,
	/// Whether `file_set` holds any patterns.
	pub has_file_patterns: bool,
	/// Files larger than this are skipped.
	pub max_file_size: u64,
	pub disable_gitignore: bool,
}

impl Default for ScanOptions {
	fn default() -> Self {
		Self {
			exclude_patterns: Vec::new(),
			file_set: GlobSet::empty(),
			has_file_patterns: false,
			max_file_size: crate::DEFAULT_MAX_FILE_SIZE,
			disable_gitignore: false,
		}
	}
}

impl ScanOptions {
	pub fn from_config(config: &DfmConfig) -> DfmResult<Self> {
		Ok(Self {
			exclude_patterns: config.exclude.patterns.clone(),
			file_set: build_glob_set(&config.files.patterns)?,
			has_file_patterns: !config.files.patterns.is_empty(),
			max_file_size: config.max_file_size,
			disable_gitignore: config.disable_gitignore,
		})
	}
}

/// A directory of markdown documents and the config that applies to them.
#[derive(Debug, Clone)]
pub struct Project {
	pub root: PathBuf,
	pub config: DfmConfig,
	/// The markdown files to build, sorted.
	pub files: Vec<PathBuf>,
}

impl Project {
	/// Load the config at `root` (or the defaults) and discover the
	/// project's markdown files.
	pub fn open(root: &Path) -> DfmResult<Self> {
		let config = DfmConfig::load(root)?.unwrap_or_default();
		let options = ScanOptions::from_config(&config)?;
		let files = discover_documents(root, &options)?;
		info!(root = %root.display(), files = files.len(), "discovered documents");

		Ok(Self {
			root: root.to_path_buf(),
			config,
			files,
		})
	}

	pub fn engine(&self) -> DfmResult<Engine> {
		self.config.engine(&self.root)
	}

	/// Build every document of the project in parallel.
	pub fn build(&self, engine: &Engine, cancellation: &CancellationFlag) -> BuildReport {
		build_documents(engine, &self.files, cancellation)
	}

	/// Where the HTML of `file` is written.
	pub fn output_path(&self, file: &Path) -> PathBuf {
		file.with_extension(&self.config.output.extension)
	}

	/// Write the HTML of every successfully built document next to its
	/// source. Returns the number of files written.
	pub fn write_outputs(&self, report: &BuildReport) -> DfmResult<usize> {
		self.config.validate()?;

		let mut written = 0;
		for outcome in &report.outcomes {
			let Ok(rendered) = &outcome.result else {
				continue;
			};
			let output = self.output_path(&outcome.path);
			std::fs::write(&output, &rendered.html)?;
			debug!(path = %output.display(), "wrote document");
			written += 1;
		}

		Ok(written)
	}
}

/// A shared flag that stops a running build. Documents that have not started
/// when the flag is set fail with [`DfmError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// The outcome of building one document.
#[derive(Debug)]
pub struct BuildOutcome {
	pub path: PathBuf,
	pub result: DfmResult<RenderedDocument>,
}

/// The outcomes of a build, in input order.
#[derive(Debug, Default)]
pub struct BuildReport {
	pub outcomes: Vec<BuildOutcome>,
}

impl BuildReport {
	/// Documents that failed to build.
	pub fn failures(&self) -> impl Iterator<Item = (&Path, &DfmError)> {
		self.outcomes.iter().filter_map(|outcome| {
			outcome
				.result
				.as_ref()
				.err()
				.map(|error| (outcome.path.as_path(), error))
		})
	}

	/// Documents that built.
	pub fn rendered(&self) -> impl Iterator<Item = &RenderedDocument> {
		self.outcomes
			.iter()
			.filter_map(|outcome| outcome.result.as_ref().ok())
	}

	/// True when any document failed or reported an error diagnostic.
	pub fn has_errors(&self) -> bool {
		self.failures().next().is_some()
			|| self
				.rendered()
				.any(|rendered| rendered.diagnostics.has_errors())
	}

	pub fn diagnostic_count(&self) -> usize {
		self.rendered()
			.map(|rendered| rendered.diagnostics.len())
			.sum()
	}
}

/// Build `files` in parallel with a shared engine. Each document gets its
/// own parser state, include chain and diagnostics.
pub fn build_documents(
	engine: &Engine,
	files: &[PathBuf],
	cancellation: &CancellationFlag,
) -> BuildReport {
	let outcomes = files
		.par_iter()
		.map(|path| {
			BuildOutcome {
				path: path.clone(),
				result: build_document(engine, path, cancellation),
			}
		})
		.collect();

	BuildReport { outcomes }
}

fn build_document(
	engine: &Engine,
	path: &Path,
	cancellation: &CancellationFlag,
) -> DfmResult<RenderedDocument> {
	if cancellation.is_cancelled() {
		return Err(DfmError::Cancelled(path.display().to_string()));
	}

	let source = SourceDocument::read(path)?;
	let result = engine.markup(&source);
	if let Err(e) = &result {
		warn!(path = %path.display(), error = %e, "document failed to build");
	}

	result
}

/// Build a `GlobSet` from a list of glob pattern strings.
fn build_glob_set(patterns: &[String]) -> DfmResult<GlobSet> {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = Glob::new(pattern).map_err(|e| {
			DfmError::ConfigParse(format!("invalid file pattern `{pattern}`: {e}"))
		})?;
		builder.add(glob);
	}
	builder
		.build()
		.map_err(|e| DfmError::ConfigParse(format!("failed to build file patterns: {e}")))
}

/// Build a `Gitignore` matcher from exclude patterns specified in
/// `dfm.toml` `[exclude]`. These follow `.gitignore` syntax and are applied
/// on top of any `.gitignore` rules.
fn build_exclude_matcher(root: &Path, patterns: &[String]) -> DfmResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			DfmError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
		})?;
	}
	builder
		.build()
		.map_err(|e| DfmError::ConfigParse(format!("failed to build exclude rules: {e}")))
}

/// Build a `Gitignore` matcher from the project's `.gitignore` file (if any).
fn build_gitignore(root: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore_path = root.join(".gitignore");
	if gitignore_path.exists() {
		if let Some(e) = builder.add(&gitignore_path) {
			warn!(path = %gitignore_path.display(), error = %e, "ignoring unreadable .gitignore");
		}
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Collect the markdown files of a directory tree, sorted.
///
/// When `disable_gitignore` is false (the default), files matched by the
/// project's `.gitignore` are skipped. Exclude patterns from `[exclude]` in
/// `dfm.toml` follow gitignore syntax and are always applied on top.
pub fn discover_documents(root: &Path, options: &ScanOptions) -> DfmResult<Vec<PathBuf>> {
	let gitignore = if options.disable_gitignore {
		Gitignore::empty()
	} else {
		build_gitignore(root)
	};
	let walker = Walker {
		root,
		options,
		gitignore,
		custom_exclude: build_exclude_matcher(root, &options.exclude_patterns)?,
	};

	let mut files = Vec::new();
	let mut visited_dirs = HashSet::new();
	walker.walk_dir(root, true, &mut files, &mut visited_dirs)?;
	files.sort();

	Ok(files)
}

struct Walker<'a> {
	root: &'a Path,
	options: &'a ScanOptions,
	gitignore: Gitignore,
	custom_exclude: Gitignore,
}

impl Walker<'_> {
	fn walk_dir(
		&self,
		dir: &Path,
		is_root: bool,
		files: &mut Vec<PathBuf>,
		visited_dirs: &mut HashSet<PathBuf>,
	) -> DfmResult<()> {
		if !dir.is_dir() {
			return Ok(());
		}

		// Detect symlink cycles by tracking canonical paths.
		let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
		if !visited_dirs.insert(canonical) {
			return Err(DfmError::SymlinkCycle {
				path: dir.display().to_string(),
			});
		}

		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();

			if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
				if is_ignored_directory_name(name) {
					continue;
				}
			}

			let is_dir = path.is_dir();
			if self.gitignore.matched(&path, is_dir).is_ignore()
				|| self.custom_exclude.matched(&path, is_dir).is_ignore()
			{
				continue;
			}

			if is_dir {
				// A subdirectory with its own config is a separate project.
				if !is_root && has_project_config(&path) {
					continue;
				}
				self.walk_dir(&path, false, files, visited_dirs)?;
			} else if self.accepts(&path) {
				files.push(path);
			}
		}

		Ok(())
	}

	fn accepts(&self, path: &Path) -> bool {
		if !is_markdown_file(path) {
			return false;
		}

		if self.options.has_file_patterns {
			let relative = path.strip_prefix(self.root).unwrap_or(path);
			if !self.options.file_set.is_match(relative) {
				return false;
			}
		}

		match std::fs::metadata(path) {
			Ok(metadata) if metadata.len() > self.options.max_file_size => {
				warn!(
					path = %path.display(),
					size = metadata.len(),
					limit = self.options.max_file_size,
					"skipping file larger than the size limit"
				);
				false
			}
			Ok(_) => true,
			Err(_) => false,
		}
	}
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "node_modules" || name == "target"
}

fn has_project_config(dir: &Path) -> bool {
	CONFIG_FILE_CANDIDATES
		.iter()
		.any(|candidate| dir.join(candidate).is_file())
}

/// Check if a file is a markdown document.
pub fn is_markdown_file(path: &Path) -> bool {
	let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
		return false;
	};

	matches!(ext, "md" | "markdown")
}

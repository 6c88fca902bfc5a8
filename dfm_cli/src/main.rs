use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use dfm_cli::Commands;
use dfm_cli::DfmCli;
use dfm_cli::FlavorArg;
use dfm_cli::OutputFormat;
use dfm_core::BuildReport;
use dfm_core::CancellationFlag;
use dfm_core::DfmConfig;
use dfm_core::Diagnostic;
use dfm_core::Engine;
use dfm_core::Project;
use dfm_core::SAMPLE_CONFIG;
use dfm_core::Severity;
use dfm_core::SourceDocument;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
	let args = DfmCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	let result = match &args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Render { file, out, flavor }) => {
			run_render(&args, file, out.as_deref(), *flavor)
		}
		Some(Commands::Tokens { file, flavor }) => run_tokens(&args, file, *flavor),
		Some(Commands::Check { format, strict }) => run_check(&args, *format, *strict),
		Some(Commands::Build) => run_build(&args),
		None => {
			eprintln!("No subcommand specified. Run `dfm --help` for usage.");
			process::exit(1);
		}
	};

	match result {
		Ok(true) => {}
		Ok(false) => process::exit(1),
		Err(e) => {
			// Try to render through miette for rich diagnostics with help
			// text and error codes.
			match e.downcast::<dfm_core::DfmError>() {
				Ok(dfm_err) => {
					let report: miette::Report = (*dfm_err).into();
					eprintln!("{report:?}");
				}
				Err(e) => {
					eprintln!("{} {e}", colored!("error:", red));
				}
			}
			process::exit(2);
		}
	}
}

/// Engine events go to stderr. `--verbose` shows the pipeline at debug
/// level, otherwise only what `RUST_LOG` asks for.
fn init_tracing(verbose: bool, use_color: bool) {
	let filter = if verbose {
		EnvFilter::new("dfm_core=debug")
	} else {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"))
	};

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.init();
}

fn resolve_root(args: &DfmCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}

fn load_engine(root: &Path, flavor: Option<FlavorArg>) -> CliResult<Engine> {
	let mut config = DfmConfig::load(root)?.unwrap_or_default();
	if let Some(flavor) = flavor {
		config.flavor = flavor.into();
	}

	Ok(config.engine(root)?)
}

fn format_diagnostic(diagnostic: &Diagnostic, root: &Path) -> String {
	let file = diagnostic
		.file
		.as_deref()
		.map_or_else(|| "<input>".to_string(), |path| make_relative(path, root));
	let severity = match diagnostic.severity {
		Severity::Warning => colored!("warning", yellow),
		Severity::Error => colored!("error", red),
	};

	format!(
		"{file}:{}:{}: {severity}[{}]: {}",
		diagnostic.line,
		diagnostic.column,
		diagnostic.code.code(),
		diagnostic.message
	)
}

fn run_init(args: &DfmCli) -> CliResult<bool> {
	let root = resolve_root(args);

	if let Some(existing) = DfmConfig::resolve_path(&root) {
		println!("Config file already exists: {}", existing.display());
		return Ok(true);
	}

	let config_path = root.join("dfm.toml");
	std::fs::write(&config_path, SAMPLE_CONFIG)?;
	println!("Created dfm.toml");
	println!();
	println!("Next steps:");
	println!("  1. Pick a flavor and any HTML tag rules in dfm.toml");
	println!("  2. Run `dfm check` to report broken includes");
	println!("  3. Run `dfm build` to write the HTML");

	Ok(true)
}

fn run_render(
	args: &DfmCli,
	file: &Path,
	out: Option<&Path>,
	flavor: Option<FlavorArg>,
) -> CliResult<bool> {
	let root = resolve_root(args);
	let engine = load_engine(&root, flavor)?;
	let source = SourceDocument::read(file)?;
	let rendered = engine.markup(&source)?;

	for diagnostic in rendered.diagnostics.iter() {
		eprintln!("{}", format_diagnostic(diagnostic, &root));
	}

	match out {
		Some(out) => {
			std::fs::write(out, &rendered.html)?;
			eprintln!("Wrote {}", out.display());
		}
		None => print!("{}", rendered.html),
	}

	Ok(!rendered.diagnostics.has_errors())
}

fn run_tokens(args: &DfmCli, file: &Path, flavor: Option<FlavorArg>) -> CliResult<bool> {
	let root = resolve_root(args);
	let engine = load_engine(&root, flavor)?;
	let source = SourceDocument::read(file)?;
	let document = engine.parse(&source)?;

	println!("{}", serde_json::to_string_pretty(&document.root)?);

	Ok(true)
}

fn build_project(args: &DfmCli) -> CliResult<(PathBuf, Project, BuildReport)> {
	let root = resolve_root(args);
	let project = Project::open(&root)?;
	let engine = project.engine()?;
	let report = project.build(&engine, &CancellationFlag::new());

	Ok((root, project, report))
}

fn run_check(args: &DfmCli, format: OutputFormat, strict: bool) -> CliResult<bool> {
	let (root, project, report) = build_project(args)?;
	let passed = if strict {
		!report.has_errors() && report.diagnostic_count() == 0
	} else {
		!report.has_errors()
	};

	let diagnostics: Vec<&Diagnostic> = report
		.rendered()
		.flat_map(|rendered| rendered.diagnostics.iter())
		.collect();

	match format {
		OutputFormat::Json => {
			let diagnostic_entries: Vec<serde_json::Value> = diagnostics
				.iter()
				.map(|diagnostic| {
					serde_json::json!({
						"file": diagnostic.file.as_deref().map(|path| make_relative(path, &root)),
						"line": diagnostic.line,
						"column": diagnostic.column,
						"severity": diagnostic.severity.to_string(),
						"code": diagnostic.code.code(),
						"message": diagnostic.message,
					})
				})
				.collect();
			let failure_entries: Vec<serde_json::Value> = report
				.failures()
				.map(|(path, error)| {
					serde_json::json!({
						"file": make_relative(path, &root),
						"message": error.to_string(),
					})
				})
				.collect();
			let output = serde_json::json!({
				"ok": passed,
				"documents": project.files.len(),
				"diagnostics": diagnostic_entries,
				"failures": failure_entries,
			});
			println!("{output}");
		}
		OutputFormat::Github => {
			for (path, error) in report.failures() {
				println!("::error file={}::{error}", make_relative(path, &root));
			}
			for diagnostic in &diagnostics {
				let level = match diagnostic.severity {
					Severity::Warning => "warning",
					Severity::Error => "error",
				};
				let file = diagnostic
					.file
					.as_deref()
					.map(|path| make_relative(path, &root))
					.unwrap_or_default();
				println!(
					"::{level} file={file},line={},col={}::[{}] {}",
					diagnostic.line,
					diagnostic.column,
					diagnostic.code.code(),
					diagnostic.message
				);
			}
			eprintln!("{}", check_summary(&project, &report));
		}
		OutputFormat::Text => {
			for (path, error) in report.failures() {
				eprintln!(
					"{} {}: {error}",
					colored!("error:", red),
					make_relative(path, &root)
				);
			}
			for diagnostic in &diagnostics {
				eprintln!("{}", format_diagnostic(diagnostic, &root));
			}

			if passed {
				println!(
					"{} {}",
					colored!("Check passed:", green),
					check_summary(&project, &report)
				);
			} else {
				eprintln!(
					"{} {}",
					colored!("Check failed:", red),
					check_summary(&project, &report)
				);
			}
		}
	}

	Ok(passed)
}

fn check_summary(project: &Project, report: &BuildReport) -> String {
	format!(
		"{} document(s), {} diagnostic(s), {} failure(s).",
		project.files.len(),
		report.diagnostic_count(),
		report.failures().count()
	)
}

fn run_build(args: &DfmCli) -> CliResult<bool> {
	let (root, project, report) = build_project(args)?;

	for (path, error) in report.failures() {
		eprintln!(
			"{} {}: {error}",
			colored!("error:", red),
			make_relative(path, &root)
		);
	}
	for rendered in report.rendered() {
		for diagnostic in rendered.diagnostics.iter() {
			eprintln!("{}", format_diagnostic(diagnostic, &root));
		}
	}

	let written = project.write_outputs(&report)?;
	println!("Built {written} of {} document(s).", project.files.len());

	Ok(!report.has_errors())
}

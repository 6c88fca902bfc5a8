use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use derive_more::Deref;
use serde::Serialize;
use tracing::error;
use tracing::warn;

use crate::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Warning,
	Error,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Warning => f.write_str("warning"),
			Self::Error => f.write_str("error"),
		}
	}
}

/// The recoverable problems the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
	IncludeNotFound,
	CircularReference,
	DisallowedTag,
}

impl DiagnosticKind {
	pub fn code(self) -> &'static str {
		match self {
			Self::IncludeNotFound => "include-not-found",
			Self::CircularReference => "circular-reference",
			Self::DisallowedTag => "disallowed-tag",
		}
	}
}

/// A problem found while building a document. Diagnostics never abort the
/// build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
	pub code: DiagnosticKind,
	pub severity: Severity,
	pub message: String,
	pub file: Option<PathBuf>,
	pub line: usize,
	pub column: usize,
}

impl Diagnostic {
	pub fn warning(code: DiagnosticKind, message: impl Into<String>) -> Self {
		Self {
			code,
			severity: Severity::Warning,
			message: message.into(),
			file: None,
			line: 0,
			column: 0,
		}
	}

	#[must_use]
	pub fn with_severity(mut self, severity: Severity) -> Self {
		self.severity = severity;
		self
	}

	#[must_use]
	pub fn at(mut self, file: Option<&Path>, point: Point) -> Self {
		self.file = file.map(Path::to_path_buf);
		self.line = point.line;
		self.column = point.column;
		self
	}
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let file = self
			.file
			.as_deref()
			.map_or_else(|| "<input>".to_string(), |path| path.display().to_string());

		write!(
			f,
			"{file}:{}:{}: {}[{}]: {}",
			self.line,
			self.column,
			self.severity,
			self.code.code(),
			self.message
		)
	}
}

/// The diagnostics collected for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a diagnostic and emit it as a log event.
	pub fn push(&mut self, diagnostic: Diagnostic) {
		match diagnostic.severity {
			Severity::Warning => {
				warn!(code = diagnostic.code.code(), "{diagnostic}");
			}
			Severity::Error => {
				error!(code = diagnostic.code.code(), "{diagnostic}");
			}
		}
		self.0.push(diagnostic);
	}

	pub fn has_errors(&self) -> bool {
		self.0
			.iter()
			.any(|diagnostic| diagnostic.severity == Severity::Error)
	}

	pub fn count(&self, code: DiagnosticKind) -> usize {
		self.0
			.iter()
			.filter(|diagnostic| diagnostic.code == code)
			.count()
	}

	pub fn into_vec(self) -> Vec<Diagnostic> {
		self.0
	}
}

impl Extend<Diagnostic> for Diagnostics {
	fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
		for diagnostic in iter {
			self.0.push(diagnostic);
		}
	}
}

impl IntoIterator for Diagnostics {
	type IntoIter = std::vec::IntoIter<Diagnostic>;
	type Item = Diagnostic;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

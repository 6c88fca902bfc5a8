use std::path::Path;
use std::path::PathBuf;

use crate::Point;
use crate::Position;

/// A markdown document handed to the engine: its text and, when it came from
/// disk, the path used to resolve relative includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
	pub path: Option<PathBuf>,
	pub content: String,
}

impl SourceDocument {
	pub fn new(content: impl Into<String>) -> Self {
		Self {
			path: None,
			content: content.into(),
		}
	}

	pub fn with_path(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
		Self {
			path: Some(path.into()),
			content: content.into(),
		}
	}

	/// Read a document from disk.
	pub fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path)?;
		Ok(Self::with_path(path, normalize_line_endings(&content)))
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}
}

/// Normalize `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_line_endings(content: &str) -> String {
	if content.contains('\r') {
		content.replace("\r\n", "\n").replace('\r', "\n")
	} else {
		content.to_string()
	}
}

/// The remaining input of a tokenization pass.
///
/// Rules inspect [`SourceCursor::remaining`] and, when they match, call
/// [`SourceCursor::consume`] with the length of the matched prefix. The cursor
/// keeps absolute line/column information so tokens created from nested
/// content still point into the original file.
#[derive(Debug, Clone)]
pub struct SourceCursor<'a> {
	text: &'a str,
	consumed: usize,
	point: Point,
}

impl<'a> SourceCursor<'a> {
	pub fn new(text: &'a str) -> Self {
		Self::with_origin(text, Point::default())
	}

	/// Create a cursor for text that starts at `origin` in its file.
	pub fn with_origin(text: &'a str, origin: Point) -> Self {
		Self {
			text,
			consumed: 0,
			point: origin,
		}
	}

	pub fn remaining(&self) -> &'a str {
		&self.text[self.consumed..]
	}

	pub fn is_empty(&self) -> bool {
		self.consumed >= self.text.len()
	}

	/// Number of bytes consumed so far.
	pub fn consumed(&self) -> usize {
		self.consumed
	}

	/// The location of the first unconsumed character.
	pub fn point(&self) -> Point {
		self.point
	}

	/// Consume `len` bytes and return the consumed slice together with its
	/// span. `len` is clamped to the remaining input and to a character
	/// boundary.
	pub fn consume(&mut self, len: usize) -> (&'a str, Position) {
		let remaining = self.remaining();
		let mut len = len.min(remaining.len());
		while !remaining.is_char_boundary(len) {
			len += 1;
		}

		let slice = &remaining[..len];
		let start = self.point;
		self.point.advance_str(slice);
		self.consumed += len;

		(slice, Position::from_points(start, self.point))
	}

	/// A short excerpt of the remaining input, used in error messages.
	pub fn snippet(&self) -> String {
		const MAX_CHARS: usize = 40;
		let remaining = self.remaining();
		let mut snippet: String = remaining.chars().take(MAX_CHARS).collect();
		if remaining.chars().count() > MAX_CHARS {
			snippet.push('…');
		}
		snippet
	}
}

use serde::Deserialize;
use serde::Serialize;

/// A single location in a source file. Lines and columns are 1-indexed, the
/// offset is a 0-indexed byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
	pub line: usize,
	pub column: usize,
	pub offset: usize,
}

impl Default for Point {
	fn default() -> Self {
		Self {
			line: 1,
			column: 1,
			offset: 0,
		}
	}
}

impl Point {
	pub const fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}

	/// Move the point past `text`, counting newlines and characters.
	pub fn advance_str(&mut self, text: &str) {
		for ch in text.chars() {
			if ch == '\n' {
				self.line += 1;
				self.column = 1;
			} else {
				self.column += 1;
			}
			self.offset += ch.len_utf8();
		}
	}

	/// Return a copy of this point advanced past `text`.
	#[must_use]
	pub fn advanced(mut self, text: &str) -> Self {
		self.advance_str(text);
		self
	}
}

/// The span of source text a token was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
	pub start: Point,
	pub end: Point,
}

impl Position {
	pub const fn new(
		start_line: usize,
		start_column: usize,
		start_offset: usize,
		end_line: usize,
		end_column: usize,
		end_offset: usize,
	) -> Self {
		Self {
			start: Point::new(start_line, start_column, start_offset),
			end: Point::new(end_line, end_column, end_offset),
		}
	}

	pub const fn from_points(start: Point, end: Point) -> Self {
		Self { start, end }
	}

	/// The number of bytes covered by this span.
	pub fn len(&self) -> usize {
		self.end.offset.saturating_sub(self.start.offset)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

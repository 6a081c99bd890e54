use std::fmt;

use derive_new::new;

use crate::driver::Locator;

pub mod classify;
pub mod completion;
pub mod config;
pub mod driver;
pub mod extract;
pub mod llm;
pub mod login;
pub mod persist;
pub mod quiz;
pub mod runner;
pub mod selectors;
pub mod slides;
pub mod vtt;

/// What a lesson page holds. Derived fresh on every page load, never cached across navigations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContentType {
	Video,
	Slides,
	Pdf,
	Mcq,
	Unknown,
}

impl ContentType {
	pub fn name(&self) -> &'static str {
		match self {
			ContentType::Video => "video",
			ContentType::Slides => "slides",
			ContentType::Pdf => "pdf",
			ContentType::Mcq => "mcq",
			ContentType::Unknown => "unknown",
		}
	}
}

impl fmt::Display for ContentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Kind of text pulled out of a lesson page
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentKind {
	Slides,
	Video,
}

impl ContentKind {
	/// Directory the extracted text is written under
	pub fn dir_name(&self) -> &'static str {
		match self {
			ContentKind::Slides => "slides",
			ContentKind::Video => "transcripts",
		}
	}

	/// Middle part of the output filename (`extracted_<stem>_<timestamp>.txt`)
	pub fn file_stem(&self) -> &'static str {
		match self {
			ContentKind::Slides => "slides",
			ContentKind::Video => "transcript",
		}
	}
}

/// Text extracted from one lesson page.
///
/// Persisted right after extraction, then kept in memory only as quiz context for the page that follows.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct ExtractedContent {
	pub text: String,
	pub kind: ContentKind,
}

/// One selectable answer of a quiz question
#[derive(Clone, Debug, PartialEq, new)]
pub struct McqOption {
	/// Label shown next to the control
	pub text: String,
	/// Clickable control. Only valid against the DOM it was read from.
	pub control: Locator,
}

/// A multiple-choice question as read from the current page
#[derive(Clone, Debug, PartialEq, new)]
pub struct McqQuestion {
	pub text: String,
	pub options: Vec<McqOption>,
}

impl McqQuestion {
	pub fn option_count(&self) -> usize {
		self.options.len()
	}

	/// Options enumerated `1. text` one per line, as shown to the model
	pub fn numbered_options(&self) -> String {
		self.options.iter().enumerate().map(|(i, o)| format!("{}. {}", i + 1, o.text)).collect::<Vec<_>>().join("\n")
	}
}

impl fmt::Display for McqQuestion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{}", self.text)?;
		writeln!(f)?;
		for (i, option) in self.options.iter().enumerate() {
			writeln!(f, "( ) {}. {}", i + 1, option.text)?;
		}
		Ok(())
	}
}

/// Answer picked for a question: 1-based option index plus the model's justification, if any
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct AnswerChoice {
	pub index: usize,
	pub reason: Option<String>,
}

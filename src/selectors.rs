//! Hand-identified selectors of the ALX platform pages

use crate::driver::Locator;

pub const ADMISSIONS_LOGIN_URL: &str = "https://admissions.alxafrica.com/users/sign_in";
pub const EHUB_LOGIN_URL: &str = "https://ehub.alxafrica.com/login";

pub fn vimeo_frame() -> Locator {
	Locator::css(r#"iframe[title*="player.vimeo.com"]"#)
}

pub fn walkthrough_heading() -> Locator {
	Locator::css_text("h3", "[Walk-through]")
}

pub fn slides_frame() -> Locator {
	Locator::css(r#"iframe[src*="docs.google.com/presentation"]"#)
}

pub fn slides_heading() -> Locator {
	Locator::css_text("h3", "[Slides]")
}

pub fn pdf_heading() -> Locator {
	Locator::css_text("h2", "[PDF]")
}

pub fn pdf_embed() -> Locator {
	Locator::css(r#"embed[type*="pdf"]"#)
}

pub fn quiz_question_text() -> Locator {
	Locator::css(".mcq-question-text")
}

pub fn quiz_heading() -> Locator {
	Locator::css_text("h2", "TEST YOUR KNOWLEDGE!")
}

/// Either form of the quiz widget signature
pub fn quiz_markers() -> Vec<Locator> {
	vec![quiz_question_text(), quiz_heading()]
}

/// The block holding the quiz heading, its question paragraph and the radio options
pub fn quiz_container() -> Locator {
	quiz_heading().ancestor("div")
}

/// Question paragraph of the heading-style widget
pub fn quiz_prompt() -> Locator {
	quiz_container().within("p")
}

pub fn quiz_radios() -> Locator {
	quiz_container().within(r#"input[type="radio"]"#)
}

/// Label block of an option's radio control
pub fn quiz_option_label(control: &Locator) -> Locator {
	control.ancestor("div")
}

pub fn quiz_next() -> Locator {
	Locator::button("Next")
}

pub fn play_button() -> Locator {
	Locator::button("Play")
}

pub fn captions_button() -> Locator {
	Locator::button("CC/subtitles")
}

pub const COMPLETE_LABEL: &str = "Set as Complete";

pub fn complete_link() -> Locator {
	Locator::link(COMPLETE_LABEL)
}

pub fn complete_button() -> Locator {
	Locator::button(COMPLETE_LABEL)
}

pub fn confirm_yes() -> Locator {
	Locator::text_in("#lightbox-body", "Yes")
}

pub fn next_lesson() -> Locator {
	Locator::link("Next ⇒")
}

pub fn course_link(course: &str) -> Locator {
	Locator::link(course)
}

use futures::future::join_all;
use tracing::{debug, warn};

use crate::{ContentType, driver::{Locator, PageDriver}, selectors};

/// Marker sets in priority order. The first tier with any marker present decides the type.
fn tiers() -> [(ContentType, Vec<Locator>); 4] {
	[
		(ContentType::Video, vec![selectors::vimeo_frame(), selectors::walkthrough_heading()]),
		(ContentType::Slides, vec![selectors::slides_frame(), selectors::slides_heading()]),
		(ContentType::Pdf, vec![selectors::pdf_heading(), selectors::pdf_embed()]),
		(ContentType::Mcq, selectors::quiz_markers()),
	]
}

/// Work out what the current lesson page holds.
///
/// Markers of one tier are counted concurrently. A failed count is logged and read as absent.
pub async fn classify<P: PageDriver + ?Sized>(page: &P) -> ContentType {
	for (content_type, markers) in tiers() {
		let counts = join_all(markers.iter().map(|m| page.count(m))).await;
		let present = counts.into_iter().zip(&markers).any(|(count, marker)| match count {
			Ok(n) => n > 0,
			Err(e) => {
				warn!("Failed to check {:?} while classifying: {}", marker, e);
				false
			}
		});
		if present {
			debug!("Classified page as {}", content_type);
			return content_type;
		}
	}
	ContentType::Unknown
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::driver::fake::{FakeElement, FakePage, Screen};

	fn page(markers: &[Locator]) -> FakePage {
		let screen = markers.iter().fold(Screen::new("https://lesson"), |s, m| s.with(m.clone(), FakeElement::shown()));
		FakePage::new(vec![screen])
	}

	#[tokio::test]
	async fn single_marker_sets() {
		assert_eq!(classify(&page(&[selectors::walkthrough_heading()])).await, ContentType::Video);
		assert_eq!(classify(&page(&[selectors::slides_frame()])).await, ContentType::Slides);
		assert_eq!(classify(&page(&[selectors::pdf_embed()])).await, ContentType::Pdf);
		assert_eq!(classify(&page(&[selectors::quiz_heading()])).await, ContentType::Mcq);
		assert_eq!(classify(&page(&[selectors::quiz_question_text()])).await, ContentType::Mcq);
	}

	#[tokio::test]
	async fn no_markers_is_unknown() {
		assert_eq!(classify(&page(&[])).await, ContentType::Unknown);
	}

	#[tokio::test]
	async fn earlier_tier_wins() {
		let both = page(&[selectors::slides_heading(), selectors::vimeo_frame()]);
		assert_eq!(classify(&both).await, ContentType::Video);

		let pdf_and_quiz = page(&[selectors::quiz_heading(), selectors::pdf_heading()]);
		assert_eq!(classify(&pdf_and_quiz).await, ContentType::Pdf);
	}

	#[tokio::test]
	async fn failed_check_counts_as_absent() {
		let screen = Screen::new("https://lesson").failing(selectors::vimeo_frame()).with(selectors::slides_heading(), FakeElement::shown());
		assert_eq!(classify(&FakePage::new(vec![screen])).await, ContentType::Slides);
	}
}

use color_eyre::Result;
use tracing::{error, info, warn};

use crate::{
	ContentKind, ContentType, ExtractedContent,
	config::Timeouts,
	driver::{Locator, PageDriver},
	selectors,
	slides::{self, SlidesClient},
	vtt,
};

/// Caption tracks are the only `.vtt` responses a lesson page makes
const CAPTION_URL_FRAGMENT: &str = ".vtt";

/// Pulls the readable content out of a classified lesson page
pub struct Extractor {
	slides: Option<SlidesClient>,
	timeouts: Timeouts,
}

impl Extractor {
	/// `slides: None` disables slide extraction (no Google credentials available)
	pub fn new(slides: Option<SlidesClient>, timeouts: Timeouts) -> Self {
		Self { slides, timeouts }
	}

	/// Extracted text for slide and video lessons. Everything else, and any failure, yields `None`.
	pub async fn extract<P: PageDriver + ?Sized>(&self, page: &P, content_type: ContentType) -> Option<ExtractedContent> {
		let (kind, result) = match content_type {
			ContentType::Slides => (ContentKind::Slides, self.slide_text(page).await),
			ContentType::Video => (ContentKind::Video, self.video_transcript(page).await),
			ContentType::Pdf => {
				info!("PDF lesson, leaving it for manual reading");
				return None;
			}
			ContentType::Mcq | ContentType::Unknown => return None,
		};
		match result {
			Ok(Some(text)) => Some(ExtractedContent::new(text, kind)),
			Ok(None) => None,
			Err(e) => {
				let url = page.url().await.unwrap_or_default();
				error!("Failed to extract {} from {}: {}", kind.file_stem(), url, e);
				None
			}
		}
	}

	async fn slide_text<P: PageDriver + ?Sized>(&self, page: &P) -> Result<Option<String>> {
		let Some(client) = &self.slides else {
			warn!("No Google credentials configured, skipping slides");
			return Ok(None);
		};
		let frame = selectors::slides_frame();
		if !page.is_visible(&frame).await? {
			warn!("Slides iframe not found");
			return Ok(None);
		}
		let Some(src) = page.attribute(&frame, "src").await? else {
			warn!("Slides iframe has no src");
			return Ok(None);
		};
		let Some(id) = slides::presentation_id(&src) else {
			warn!("Could not find a presentation id in {}", src);
			return Ok(None);
		};
		info!("Reading presentation {}", id);
		client.slide_text(&id).await
	}

	/// Play the embedded video with captions on, and capture the caption track it downloads.
	async fn video_transcript<P: PageDriver + ?Sized>(&self, page: &P) -> Result<Option<String>> {
		let frame = selectors::vimeo_frame();
		if page.count(&frame).await? == 0 {
			warn!("Video iframe not found");
			return Ok(None);
		}

		// Armed before playback: the track can load as soon as the player starts
		let watch = page.watch_response(CAPTION_URL_FRAGMENT).await?;

		let play = selectors::play_button();
		if page.frame_count(&frame, &play).await? > 0 {
			info!("Starting playback");
			page.frame_click(&frame, &play).await?;
		}
		if let Err(e) = self.enable_captions(page, &frame).await {
			warn!("Could not enable captions: {}", e);
		}

		let Some(body) = watch.wait(self.timeouts.caption()).await else {
			return Ok(None);
		};
		let transcript = vtt::transcript(&body)?;
		if transcript.is_empty() {
			warn!("Caption track has no cues");
			return Ok(None);
		}
		info!("Captured transcript ({} chars)", transcript.len());
		Ok(Some(transcript))
	}

	async fn enable_captions<P: PageDriver + ?Sized>(&self, page: &P, frame: &Locator) -> Result<()> {
		let cc = selectors::captions_button();
		if !page.frame_wait_visible(frame, &cc, self.timeouts.cc_button()).await? {
			warn!("CC button never became visible");
			return Ok(());
		}
		if page.frame_attribute(frame, &cc, "aria-pressed").await?.as_deref() == Some("true") {
			info!("Captions already enabled");
		} else {
			page.frame_click(frame, &cc).await?;
		}
		Ok(())
	}
}

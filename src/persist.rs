use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use color_eyre::{Result, eyre::eyre};
use tracing::info;

use crate::{ContentKind, ExtractedContent, driver::PageDriver};

/// `<root>/<slides|transcripts>/extracted_<slides|transcript>_<YYYYMMDD_HHMMSS>.txt`
pub fn output_path(root: &Path, kind: ContentKind, at: DateTime<Local>) -> PathBuf {
	root.join(kind.dir_name()).join(format!("extracted_{}_{}.txt", kind.file_stem(), at.format("%Y%m%d_%H%M%S")))
}

/// Write extracted text to its timestamped file, creating the directory if needed
pub fn save(root: &Path, content: &ExtractedContent) -> Result<PathBuf> {
	let path = output_path(root, content.kind, Local::now());
	if let Some(dir) = path.parent() {
		std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create {}: {}", dir.display(), e))?;
	}
	std::fs::write(&path, &content.text).map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
	info!("Extracted content saved to {}", path.display());
	Ok(path)
}

/// Save the current page's HTML to disk for debugging
/// Uses the page URL as the filename label
pub async fn save_page_html<P: PageDriver + ?Sized>(page: &P, dir: &Path) -> Result<PathBuf> {
	std::fs::create_dir_all(dir).map_err(|e| eyre!("Failed to create HTML dir: {}", e))?;

	let url = page.url().await.unwrap_or_default();
	let label = url.replace("https://", "").replace("http://", "");
	let html = page.html().await?;

	let safe_label: String = label.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect();
	let filename = format!("{}_{}.html", Local::now().format("%Y%m%d_%H%M%S"), safe_label);
	let filepath = dir.join(&filename);

	std::fs::write(&filepath, html).map_err(|e| eyre!("Failed to write HTML file: {}", e))?;

	info!("Saved page HTML to: {}", filepath.display());
	Ok(filepath)
}

/// Where page snapshots of a session go
#[cfg(feature = "xdg")]
pub fn snapshot_dir(session_id: &str) -> Option<PathBuf> {
	let state = dirs::state_dir().or_else(dirs::data_local_dir)?;
	Some(state.join("alx_headless").join("persist_htmls").join(session_id))
}

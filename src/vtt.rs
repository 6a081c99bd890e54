//! WebVTT caption files. Only cue text is kept; timings, settings and markup are dropped.

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use regex::Regex;

fn decode_entities(s: &str) -> String {
	s.replace("&lt;", "<").replace("&gt;", ">").replace("&nbsp;", " ").replace("&lrm;", "").replace("&rlm;", "").replace("&amp;", "&")
}

/// Text of every cue, in file order
pub fn parse_cues(vtt: &str) -> Result<Vec<String>> {
	let vtt = vtt.trim_start_matches('\u{feff}').replace("\r\n", "\n").replace('\r', "\n");
	if !vtt.starts_with("WEBVTT") {
		bail!("Not a WebVTT file (missing WEBVTT header)");
	}

	let tag_re = Regex::new(r"<[^>]*>").map_err(|e| eyre!("Regex error: {}", e))?;
	let mut cues = Vec::new();
	// first block is the header
	for block in vtt.split("\n\n").skip(1) {
		let block = block.trim_matches('\n');
		if block.is_empty() || ["NOTE", "STYLE", "REGION"].iter().any(|kw| block.starts_with(kw)) {
			continue;
		}
		let mut lines = block.lines();
		// optional cue identifier precedes the timing line
		if !lines.by_ref().any(|l| l.contains("-->")) {
			continue;
		}
		let text = lines.map(|l| decode_entities(&tag_re.replace_all(l, ""))).collect::<Vec<_>>().join("\n");
		cues.push(text);
	}
	Ok(cues)
}

/// Cue texts trimmed and joined by single spaces
pub fn transcript(vtt: &str) -> Result<String> {
	let cues = parse_cues(vtt)?;
	Ok(cues.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect::<Vec<_>>().join(" "))
}

use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ProviderError;

const WATCH_URL: &str = "https://www.youtube.com/watch";
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// One timestamped line of a video's captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub text: String,
    /// Seconds from the start of the video.
    pub start: f64,
    pub duration: f64,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch_transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, ProviderError>;
}

/// Scrapes captions the way the YouTube web player loads them: the watch
/// page embeds the caption track list, and each track serves timedtext XML.
pub struct YoutubeTranscripts {
    client: reqwest::Client,
}

impl YoutubeTranscripts {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, ProviderError> {
        let mut request = self.client.get(url).header("Accept-Language", "en-US,en;q=0.9");
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UpstreamFailure(format!("HTTP {} from {}", status, url)));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscripts {
    async fn fetch_transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, ProviderError> {
        let video_id = extract_video_id(video_id)
            .ok_or_else(|| ProviderError::InvalidInput(format!("not a YouTube video id: {}", video_id)))?;

        let html = self.get_text(WATCH_URL, &[("v", video_id.as_str())]).await?;
        let tracks = parse_caption_tracks(&html, &video_id)?;
        let track = tracks
            .first()
            .ok_or_else(|| ProviderError::NotFound(video_id.clone()))?;
        debug!(
            "Using {} caption track {} ({} available) for {}",
            track.kind.as_deref().unwrap_or("manual"),
            track.language_code,
            tracks.len(),
            video_id
        );

        let xml = self.get_text(&track.base_url, &[]).await?;
        let segments = parse_transcript_xml(&xml);
        if segments.is_empty() {
            return Err(ProviderError::NotFound(video_id));
        }

        info!("Fetched {} transcript segments for {}", segments.len(), video_id);
        Ok(segments)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionsBlob {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

/// Accepts a bare 11-character id or any of the usual YouTube URL shapes.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    let patterns = [
        r"^([A-Za-z0-9_-]{11})$",
        r"(?:youtube\.com/(?:watch\?(?:.*&)?v=|embed/|shorts/|v/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    ];

    for pattern_str in patterns {
        if let Ok(pattern) = Regex::new(pattern_str) {
            if let Some(id) = pattern.captures(input).and_then(|c| c.get(1)) {
                return Some(id.as_str().to_string());
            }
        }
    }
    None
}

pub fn parse_caption_tracks(html: &str, video_id: &str) -> Result<Vec<CaptionTrack>, ProviderError> {
    if html.contains("class=\"g-recaptcha\"") {
        return Err(ProviderError::UpstreamFailure(
            "YouTube is rate limiting transcript requests".to_string(),
        ));
    }

    let Some((_, after)) = html.split_once("\"captions\":") else {
        return Err(ProviderError::NotFound(video_id.to_string()));
    };
    let blob = after
        .split_once(",\"videoDetails")
        .map(|(captions, _)| captions)
        .ok_or_else(|| ProviderError::UpstreamFailure("unrecognised watch page layout".to_string()))?;

    let captions: CaptionsBlob = serde_json::from_str(blob)
        .map_err(|e| ProviderError::UpstreamFailure(format!("bad caption metadata: {}", e)))?;

    let tracks = captions
        .player_captions_tracklist_renderer
        .map(|renderer| renderer.caption_tracks)
        .unwrap_or_default();
    if tracks.is_empty() {
        return Err(ProviderError::NotFound(video_id.to_string()));
    }
    Ok(tracks)
}

pub fn parse_transcript_xml(xml: &str) -> Vec<TranscriptSegment> {
    let Ok(pattern) = Regex::new(r#"<text start="([^"]*)" dur="([^"]*)"[^>]*>([^<]*)</text>"#) else {
        return Vec::new();
    };

    pattern
        .captures_iter(xml)
        .filter_map(|captures| {
            let text = decode_entities(captures.get(3)?.as_str());
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(TranscriptSegment {
                text: text.to_string(),
                start: captures.get(1)?.as_str().parse().unwrap_or(0.0),
                duration: captures.get(2)?.as_str().parse().unwrap_or(0.0),
            })
        })
        .collect()
}

// Timedtext escapes twice, so `&amp;#39;` has to become `'`.
fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace('\n', " ")
}

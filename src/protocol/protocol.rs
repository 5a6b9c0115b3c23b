use serde::{Deserialize, Serialize};

use crate::provider::error::{ErrorKind, ProviderError};
use crate::provider::segment::TranslatedSegment;
use crate::provider::transcript::TranscriptSegment;
use crate::similarity::similarity::{MatchGrade, SimilarityResult};

/// Messages sent by the extension. Video signals carry the player's
/// `currentTime` in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    StartSession {
        video_id: String,
        #[serde(default)]
        target_lang: Option<String>,
        #[serde(default)]
        min_interval_seconds: Option<u64>,
        #[serde(default)]
        max_interval_seconds: Option<u64>,
        #[serde(default)]
        current_time: f64,
        #[serde(default = "default_playing")]
        playing: bool,
    },
    Play {
        #[serde(default)]
        current_time: f64,
    },
    Pause {
        #[serde(default)]
        current_time: f64,
    },
    TimeUpdate {
        #[serde(default)]
        current_time: f64,
    },
    Ended,
    /// The overlay was dismissed.
    Resume,
    /// Speech recognition output for the segment currently presented.
    Recognized {
        spoken: String,
    },
    CheckSimilarity {
        #[serde(default)]
        original: String,
        #[serde(default)]
        spoken: String,
    },
    Transcript {
        video_id: String,
    },
    RandomSegment {
        video_id: String,
        #[serde(default)]
        target_lang: Option<String>,
    },
    /// Practice mode switched off.
    Stop,
}

fn default_playing() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Scheduled {
        delay_seconds: u64,
    },
    /// The client must pause the video now.
    Pause {
        at_time: f64,
    },
    Present {
        original_text: String,
        translated_text: String,
        target_lang: String,
        fallback: bool,
    },
    Similarity {
        similarity: f64,
        grade: MatchGrade,
        original: String,
        spoken: String,
    },
    Transcript {
        video_id: String,
        transcript: Vec<TranscriptSegment>,
    },
    Segment {
        original_segment: TranscriptSegment,
        translated_text: String,
        target_lang: String,
    },
    Summary {
        video_id: String,
        cycles: u32,
        attempts: u32,
        average_similarity: Option<f64>,
        minutes: i64,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl ServerMessage {
    pub fn present(segment: &TranslatedSegment) -> Self {
        ServerMessage::Present {
            original_text: segment.original_segment.text.clone(),
            translated_text: segment.translated_text.clone(),
            target_lang: segment.target_lang.clone(),
            fallback: segment.fallback,
        }
    }

    pub fn segment(segment: TranslatedSegment) -> Self {
        ServerMessage::Segment {
            original_segment: segment.original_segment,
            translated_text: segment.translated_text,
            target_lang: segment.target_lang,
        }
    }

    pub fn similarity(result: SimilarityResult) -> Self {
        ServerMessage::Similarity {
            similarity: result.score_percent,
            grade: result.grade(),
            original: result.reference_text,
            spoken: result.candidate_text,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind: ErrorKind::InvalidInput,
            message: message.into(),
        }
    }
}

impl From<ProviderError> for ServerMessage {
    fn from(e: ProviderError) -> Self {
        ServerMessage::Error {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

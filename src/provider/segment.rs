use log::{info, warn};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::config::translation_code;

use super::error::ProviderError;
use super::transcript::{TranscriptSegment, TranscriptSource, YoutubeTranscripts};
use super::translate::{GoogleTranslator, Translator};

pub const FALLBACK_ORIGINAL: &str = "This is a fallback transcript segment.";
pub const FALLBACK_TRANSLATED: &str = "Este es un segmento de transcripción de respaldo.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedSegment {
    pub original_segment: TranscriptSegment,
    pub translated_text: String,
    pub target_lang: String,
    /// True when the pair is the canned placeholder rather than real content.
    pub fallback: bool,
}

impl TranslatedSegment {
    pub fn fallback(target_lang: &str) -> Self {
        Self {
            original_segment: TranscriptSegment {
                text: FALLBACK_ORIGINAL.to_string(),
                start: 0.0,
                duration: 0.0,
            },
            translated_text: FALLBACK_TRANSLATED.to_string(),
            target_lang: target_lang.to_string(),
            fallback: true,
        }
    }
}

/// Picks practice material: a random transcript line and its translation.
pub struct SegmentProvider {
    transcripts: Arc<dyn TranscriptSource>,
    translator: Arc<dyn Translator>,
}

impl SegmentProvider {
    pub fn new(transcripts: Arc<dyn TranscriptSource>, translator: Arc<dyn Translator>) -> Self {
        Self {
            transcripts,
            translator,
        }
    }

    pub fn youtube(timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self::new(
            Arc::new(YoutubeTranscripts::new(timeout)?),
            Arc::new(GoogleTranslator::new(timeout)?),
        ))
    }

    pub async fn fetch_transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, ProviderError> {
        if video_id.trim().is_empty() {
            return Err(ProviderError::InvalidInput("missing video id".to_string()));
        }
        info!("Fetching transcript for video: {}", video_id);

        let transcript = self.transcripts.fetch_transcript(video_id).await?;
        if transcript.is_empty() {
            return Err(ProviderError::NotFound(video_id.to_string()));
        }
        Ok(transcript)
    }

    /// `target_lang` may be a locale (`es-ES`) or a bare code (`es`); the
    /// returned segment echoes it unchanged.
    pub async fn fetch_random_translated_segment(
        &self,
        video_id: &str,
        target_lang: &str,
    ) -> Result<TranslatedSegment, ProviderError> {
        let transcript = self.fetch_transcript(video_id).await?;

        let segment = {
            let mut rng = rand::thread_rng();
            transcript.choose(&mut rng).cloned()
        }
        .ok_or_else(|| ProviderError::NotFound(video_id.to_string()))?;

        let translated_text = self
            .translator
            .translate(&segment.text, translation_code(target_lang))
            .await?;

        Ok(TranslatedSegment {
            original_segment: segment,
            translated_text,
            target_lang: target_lang.to_string(),
            fallback: false,
        })
    }

    /// Like [`Self::fetch_random_translated_segment`], but degrades to the
    /// fallback pair so a pause cycle can always complete.
    pub async fn fetch_or_fallback(&self, video_id: &str, target_lang: &str) -> TranslatedSegment {
        match self.fetch_random_translated_segment(video_id, target_lang).await {
            Ok(segment) => segment,
            Err(e) => {
                warn!("Using fallback segment for {}: {}", video_id, e);
                TranslatedSegment::fallback(target_lang)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub struct FakeTranscripts(pub Result<Vec<TranscriptSegment>, ProviderError>);

    impl FakeTranscripts {
        pub fn lines(lines: &[&str]) -> Self {
            FakeTranscripts(Ok(lines
                .iter()
                .enumerate()
                .map(|(i, text)| TranscriptSegment {
                    text: text.to_string(),
                    start: i as f64 * 2.0,
                    duration: 2.0,
                })
                .collect()))
        }
    }

    #[async_trait]
    impl TranscriptSource for FakeTranscripts {
        async fn fetch_transcript(&self, _video_id: &str) -> Result<Vec<TranscriptSegment>, ProviderError> {
            self.0.clone()
        }
    }

    /// Serves `lines` only after `delay`, so a fetch can still be in flight
    /// when the session moves on.
    pub struct SlowTranscripts {
        pub delay: std::time::Duration,
        pub inner: FakeTranscripts,
    }

    #[async_trait]
    impl TranscriptSource for SlowTranscripts {
        async fn fetch_transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_transcript(video_id).await
        }
    }

    /// Prefixes text with the language code and remembers the codes it saw.
    #[derive(Default)]
    pub struct FakeTranslator {
        pub fail: bool,
        pub seen_langs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Translator for FakeTranslator {
        async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
            self.seen_langs.lock().unwrap().push(target_lang.to_string());
            if self.fail {
                return Err(ProviderError::UpstreamFailure("translation failed".to_string()));
            }
            Ok(format!("[{}] {}", target_lang, text))
        }
    }

    pub fn provider(lines: &[&str]) -> SegmentProvider {
        SegmentProvider::new(
            Arc::new(FakeTranscripts::lines(lines)),
            Arc::new(FakeTranslator::default()),
        )
    }
}

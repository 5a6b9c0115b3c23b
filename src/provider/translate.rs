use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::time::Duration;

use super::error::ProviderError;
use super::transcript::BROWSER_USER_AGENT;

const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` into `target_lang`, a bare language code such as `es`.
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError>;
}

/// Client for the unauthenticated `gtx` endpoint used by browser widgets.
/// Source language is auto-detected.
pub struct GoogleTranslator {
    client: reqwest::Client,
}

impl GoogleTranslator {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidInput("nothing to translate".to_string()));
        }
        if target_lang.is_empty() {
            return Err(ProviderError::InvalidInput("missing target language".to_string()));
        }

        let response = self
            .client
            .get(TRANSLATE_URL)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UpstreamFailure(format!(
                "translation endpoint returned HTTP {}",
                status
            )));
        }

        let body: Value = response.json().await?;
        let translated = parse_translation(&body)?;
        debug!("Translated {:?} -> {:?} ({})", text, translated, target_lang);
        Ok(translated)
    }
}

/// The response is a nested array; `[0]` holds one `[translated, original, ...]`
/// entry per sentence.
pub fn parse_translation(body: &Value) -> Result<String, ProviderError> {
    let sentences = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::UpstreamFailure("unexpected translation response".to_string()))?;

    let translated: String = sentences
        .iter()
        .filter_map(|sentence| sentence.get(0).and_then(Value::as_str))
        .collect();

    if translated.is_empty() {
        return Err(ProviderError::UpstreamFailure("empty translation".to_string()));
    }
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_sentence() {
        let body = json!([[["Hola mundo", "Hello world", null, null, 10]], null, "en"]);
        assert_eq!(parse_translation(&body).unwrap(), "Hola mundo");
    }

    #[test]
    fn sentences_are_joined() {
        let body = json!([
            [
                ["Hola. ", "Hello. ", null, null, 10],
                ["¿Cómo estás?", "How are you?", null, null, 10]
            ],
            null,
            "en"
        ]);
        assert_eq!(parse_translation(&body).unwrap(), "Hola. ¿Cómo estás?");
    }

    #[test]
    fn malformed_bodies_are_upstream_failures() {
        for body in [json!({}), json!([]), json!([[]]), json!([[[null]]])] {
            assert!(matches!(
                parse_translation(&body),
                Err(ProviderError::UpstreamFailure(_))
            ));
        }
    }
}

//! Text-to-speech queue.
//!
//! The host platform supplies a [`SpeechEngine`]. [`Narrator`] keeps at most
//! one utterance in flight; a request that is overtaken by a newer one while
//! it waits for its turn is dropped without reaching the engine.

use async_trait::async_trait;
use phrasebook_core::types::Language;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech engine failed: {0}")]
    Engine(String),
}

/// What to say and how.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub text: String,
    pub language_tag: String,
    pub rate: f64,
    pub pitch: f64,
    pub voice_uri: Option<String>,
}

impl Utterance {
    /// Use the voice settings of a language.
    pub fn for_language(text: impl Into<String>, language: &Language) -> Self {
        Self {
            text: text.into(),
            language_tag: language.lang_tag.clone(),
            rate: language.tts_rate,
            pitch: language.tts_pitch,
            voice_uri: language.tts_voice.clone(),
        }
    }
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Speak and return once the utterance ended or failed.
    async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError>;
}

/// Engine for hosts without speech output; utterances only go to the log.
#[derive(Debug, Default)]
pub struct LogEngine;

#[async_trait]
impl SpeechEngine for LogEngine {
    async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
        info!(
            text = %utterance.text,
            lang = %utterance.language_tag,
            rate = utterance.rate,
            pitch = utterance.pitch,
            "speak"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakOutcome {
    Spoken,
    /// A newer request arrived before this one started.
    Superseded,
}

pub struct Narrator<E> {
    engine: E,
    generation: AtomicU64,
    turn: Mutex<()>,
}

impl<E: SpeechEngine> Narrator<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            generation: AtomicU64::new(0),
            turn: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Queue an utterance behind the one being spoken.
    pub async fn speak(&self, utterance: Utterance) -> Result<SpeakOutcome, SpeechError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _turn = self.turn.lock().await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!(ticket, "utterance superseded");
            return Ok(SpeakOutcome::Superseded);
        }
        self.engine.speak(&utterance).await?;
        Ok(SpeakOutcome::Spoken)
    }

    /// Drop every request still waiting; the one being spoken finishes.
    pub fn cancel_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct GatedEngine {
        gate: Notify,
        spoken: StdMutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SpeechEngine for GatedEngine {
        async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
            let first = {
                let mut spoken = self.spoken.lock().unwrap();
                spoken.push(utterance.text.clone());
                spoken.len() == 1
            };
            if first {
                self.gate.notified().await;
            }
            if self.fail_on == Some(utterance.text.as_str()) {
                return Err(SpeechError::Engine("no voice".into()));
            }
            Ok(())
        }
    }

    fn utterance(text: &str) -> Utterance {
        let language = Language::new("el".into(), "Greek".into(), "el-GR".into(), Utc::now());
        Utterance::for_language(text, &language)
    }

    #[tokio::test]
    async fn waiting_request_is_superseded_by_newer_one() {
        let narrator = Narrator::new(GatedEngine::default());
        let (a, b, c, ()) = tokio::join!(
            narrator.speak(utterance("a")),
            narrator.speak(utterance("b")),
            narrator.speak(utterance("c")),
            async { narrator.engine().gate.notify_one() },
        );

        assert_eq!(a.unwrap(), SpeakOutcome::Spoken);
        assert_eq!(b.unwrap(), SpeakOutcome::Superseded);
        assert_eq!(c.unwrap(), SpeakOutcome::Spoken);
        assert_eq!(*narrator.engine().spoken.lock().unwrap(), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn engine_failure_settles_the_request() {
        let engine = GatedEngine {
            fail_on: Some("a"),
            ..GatedEngine::default()
        };
        let narrator = Narrator::new(engine);
        narrator.engine().gate.notify_one();

        let err = narrator.speak(utterance("a")).await.unwrap_err();
        assert_eq!(err.to_string(), "speech engine failed: no voice");
        assert_eq!(narrator.speak(utterance("b")).await.unwrap(), SpeakOutcome::Spoken);
    }

    #[test]
    fn uses_language_voice_settings() {
        let mut language = Language::new("ja".into(), "Japanese".into(), "ja-JP".into(), Utc::now());
        language.tts_rate = 0.8;
        language.tts_voice = Some("kyoko".into());
        let u = Utterance::for_language("こんにちは", &language);
        assert_eq!(u.language_tag, "ja-JP");
        assert_eq!(u.rate, 0.8);
        assert_eq!(u.voice_uri.as_deref(), Some("kyoko"));
    }
}

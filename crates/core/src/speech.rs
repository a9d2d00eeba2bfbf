//! Speech Playback
//!
//! Turns an agent's utterance into audio and waits, within a bounded time,
//! for the listener to finish playing it. The `speaking` flag for the agent is
//! raised for the duration and is always cleared again before
//! [`SpeechPlayback::speak`] returns. Failures are logged and never
//! propagated to the caller.

use crate::{
    agent::{AgentConfig, AgentId},
    error::{PlaybackError, ProviderError},
    log::ConversationLog,
    transcript::TranscriptStore,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

const MIN_SPEAKING_TIME: Duration = Duration::from_millis(1500);
const PER_WORD: Duration = Duration::from_millis(400);
const PAUSE_PER_WORD: Duration = Duration::from_millis(50);
const MAX_PAUSES: Duration = Duration::from_secs(2);

/// Estimated time to read `text` aloud.
pub fn speaking_time(text: &str) -> Duration {
    let words = text.split_whitespace().count() as u32;
    let pauses = (PAUSE_PER_WORD * words).min(MAX_PAUSES);
    (PER_WORD * words + pauses).max(MIN_SPEAKING_TIME)
}

/// A text-to-speech provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, voice: &str, text: &str) -> Result<Bytes, ProviderError>;
}

/// Somewhere audio is played, one slot per agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Resolves once the audio for `message_index` has finished playing.
    async fn play(
        &self,
        agent: AgentId,
        message_index: usize,
        audio: Bytes,
    ) -> Result<(), PlaybackError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechTiming {
    /// Added to the estimated speaking time to bound a playback wait.
    pub grace: Duration,
    /// Waited instead of playback when synthesis fails.
    pub fallback: Duration,
}

impl Default for SpeechTiming {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(500),
            fallback: Duration::from_millis(1000),
        }
    }
}

pub struct SpeechPlayback {
    log: ConversationLog,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    archive: Option<Arc<dyn TranscriptStore>>,
    timing: SpeechTiming,
}

impl SpeechPlayback {
    pub fn new(
        log: ConversationLog,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            log,
            synthesizer,
            output,
            archive: None,
            timing: SpeechTiming::default(),
        }
    }

    /// Saves every synthesized utterance to `store`.
    pub fn with_archive(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.archive = Some(store);
        self
    }

    pub fn with_timing(mut self, timing: SpeechTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Plays `text` in `agent`'s voice as part of run `generation`. No-op when
    /// speech is disabled or the run is no longer live.
    pub async fn speak(
        &self,
        agent: &AgentConfig,
        text: &str,
        conversation_id: &str,
        generation: u64,
        message_index: usize,
    ) {
        if !agent.tts.enabled {
            return;
        }
        if !self.log.begin_speaking(generation, agent.id).await {
            debug!(agent = %agent.id, index = message_index, "Run no longer live, not speaking");
            return;
        }

        let synthesized = self.synthesizer.synthesize(&agent.tts.voice, text).await;
        // A stop may have landed while synthesis was in flight.
        if !self.log.is_live(generation).await {
            debug!(agent = %agent.id, index = message_index, "Run stopped during synthesis, dropping audio");
            return;
        }
        let audio = match synthesized {
            Ok(audio) => audio,
            Err(e) => {
                warn!(agent = %agent.id, index = message_index, error = %e, "Speech synthesis failed, skipping playback");
                self.log.end_speaking(generation, agent.id).await;
                tokio::time::sleep(self.timing.fallback).await;
                return;
            }
        };

        if let Some(store) = &self.archive {
            if let Err(e) = store.save_audio(conversation_id, message_index, &audio).await {
                warn!(conversation_id, index = message_index, error = %e, "Failed to archive audio");
            }
        }

        let ceiling = speaking_time(text) + self.timing.grace;
        debug!(agent = %agent.id, index = message_index, bytes = audio.len(), ?ceiling, "Starting playback");
        match tokio::time::timeout(ceiling, self.output.play(agent.id, message_index, audio)).await {
            Ok(Ok(())) => debug!(agent = %agent.id, index = message_index, "Playback finished"),
            Ok(Err(e)) => warn!(agent = %agent.id, index = message_index, error = %e, "Playback failed"),
            Err(_) => warn!(agent = %agent.id, index = message_index, ?ceiling, "Playback did not finish in time"),
        }

        self.log.end_speaking(generation, agent.id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProviderErrorKind,
        log::LogEvent,
        testing::{StalledOutput, assert_elapsed, drain_events},
        transcript::MockTranscriptStore,
    };
    use mockall::predicate::eq;
    use tokio::time::Instant;

    fn speaking_agent() -> AgentConfig {
        let mut agent = AgentConfig::default_ai1();
        agent.model = "openai/gpt-4o-mini".to_string();
        agent.tts.enabled = true;
        agent
    }

    #[test]
    fn test_speaking_time_estimate() {
        assert_eq!(speaking_time(""), Duration::from_millis(1500));
        assert_eq!(speaking_time("one two three"), Duration::from_millis(1500));
        // 10 words: 4s + 0.5s of pauses
        assert_eq!(
            speaking_time("a b c d e f g h i j"),
            Duration::from_millis(4500)
        );
        // 100 words: pauses cap at 2s
        let long = vec!["word"; 100].join(" ");
        assert_eq!(speaking_time(&long), Duration::from_secs(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_speech_is_a_no_op() {
        let log = ConversationLog::new();
        let generation = log.start().await;
        let mut events = log.subscribe();
        let playback = SpeechPlayback::new(
            log.clone(),
            Arc::new(MockSpeechSynthesizer::new()),
            Arc::new(MockAudioOutput::new()),
        );

        let started = Instant::now();
        playback
            .speak(&AgentConfig::default_ai2(), "hello", "conv_1", generation, 1)
            .await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(drain_events(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_failure_waits_fallback_and_clears_flag() {
        let log = ConversationLog::new();
        let generation = log.start().await;
        let mut events = log.subscribe();

        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer.expect_synthesize().times(1).returning(|_, _| {
            Err(ProviderError::new(
                ProviderErrorKind::RateLimited,
                "Groq rate limit exceeded",
            ))
        });
        let playback = SpeechPlayback::new(
            log.clone(),
            Arc::new(synthesizer),
            Arc::new(MockAudioOutput::new()),
        );

        let started = Instant::now();
        playback
            .speak(&speaking_agent(), "hello", "conv_1", generation, 1)
            .await;

        assert_elapsed(started, Duration::from_millis(1000));
        assert!(!log.snapshot().await.speaking.ai1);
        assert_eq!(
            drain_events(&mut events),
            vec![
                LogEvent::Speaking {
                    agent: AgentId::Ai1,
                    value: true
                },
                LogEvent::Speaking {
                    agent: AgentId::Ai1,
                    value: false
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_playback_archives_and_plays() {
        let log = ConversationLog::new();
        let generation = log.start().await;

        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .withf(|voice, text| voice == "Arista-PlayAI" && text == "hello there")
            .returning(|_, _| Ok(Bytes::from_static(b"mp3")));
        let mut output = MockAudioOutput::new();
        output
            .expect_play()
            .with(eq(AgentId::Ai1), eq(3), eq(Bytes::from_static(b"mp3")))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut store = MockTranscriptStore::new();
        store
            .expect_save_audio()
            .withf(|id, index, audio| id == "conv_1" && *index == 3 && audio == b"mp3")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let playback = SpeechPlayback::new(log.clone(), Arc::new(synthesizer), Arc::new(output))
            .with_archive(Arc::new(store));
        playback
            .speak(&speaking_agent(), "hello there", "conv_1", generation, 3)
            .await;

        assert!(!log.snapshot().await.speaking.ai1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_archive_failure_does_not_block_playback() {
        let log = ConversationLog::new();
        let generation = log.start().await;

        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .returning(|_, _| Ok(Bytes::from_static(b"mp3")));
        let mut output = MockAudioOutput::new();
        output.expect_play().times(1).returning(|_, _, _| Ok(()));
        let mut store = MockTranscriptStore::new();
        store.expect_save_audio().returning(|_, _, _| {
            Err(std::io::Error::other("disk full").into())
        });

        let playback = SpeechPlayback::new(log, Arc::new(synthesizer), Arc::new(output))
            .with_archive(Arc::new(store));
        playback
            .speak(&speaking_agent(), "hi", "conv_1", generation, 0)
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_playback_resolves_at_ceiling() {
        let log = ConversationLog::new();
        let generation = log.start().await;

        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .returning(|_, _| Ok(Bytes::from_static(b"mp3")));
        let playback = SpeechPlayback::new(log.clone(), Arc::new(synthesizer), Arc::new(StalledOutput));

        let started = Instant::now();
        playback
            .speak(&speaking_agent(), "one two three", "conv_1", generation, 1)
            .await;

        // 1500ms minimum speaking time + 500ms grace
        assert_elapsed(started, Duration::from_millis(2000));
        assert!(!log.snapshot().await.speaking.ai1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_error_resolves_immediately() {
        let log = ConversationLog::new();
        let generation = log.start().await;

        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .returning(|_, _| Ok(Bytes::from_static(b"mp3")));
        let mut output = MockAudioOutput::new();
        output
            .expect_play()
            .returning(|_, _, _| Err(PlaybackError::Disconnected));

        let playback = SpeechPlayback::new(log.clone(), Arc::new(synthesizer), Arc::new(output));
        let started = Instant::now();
        playback
            .speak(&speaking_agent(), "hi", "conv_1", generation, 0)
            .await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!log.snapshot().await.speaking.ai1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_run_does_not_speak() {
        let log = ConversationLog::new();
        let generation = log.start().await;
        log.stop(None).await;

        let playback = SpeechPlayback::new(
            log.clone(),
            Arc::new(MockSpeechSynthesizer::new()),
            Arc::new(MockAudioOutput::new()),
        );
        playback
            .speak(&speaking_agent(), "hello", "conv_1", generation, 1)
            .await;

        assert!(!log.snapshot().await.speaking.ai1);
    }

    /// Stops the log while the synthesis request is in flight.
    struct StopDuringSynthesis {
        log: ConversationLog,
        result: Result<Bytes, ProviderError>,
    }

    #[async_trait]
    impl SpeechSynthesizer for StopDuringSynthesis {
        async fn synthesize(&self, _: &str, _: &str) -> Result<Bytes, ProviderError> {
            self.log.stop(Some("Conversation stopped by user".to_string())).await;
            self.result.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_synthesis_drops_the_audio() {
        let log = ConversationLog::new();
        let generation = log.start().await;

        let synthesizer = StopDuringSynthesis {
            log: log.clone(),
            result: Ok(Bytes::from_static(b"mp3")),
        };
        let mut output = MockAudioOutput::new();
        output.expect_play().times(0);
        let mut store = MockTranscriptStore::new();
        store.expect_save_audio().times(0);

        let playback = SpeechPlayback::new(log.clone(), Arc::new(synthesizer), Arc::new(output))
            .with_archive(Arc::new(store));
        let started = Instant::now();
        playback
            .speak(&speaking_agent(), "hello there", "conv_1", generation, 2)
            .await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        let run = log.snapshot().await;
        assert!(!run.active);
        assert!(!run.speaking.ai1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_synthesis_after_stop_skips_fallback_delay() {
        let log = ConversationLog::new();
        let generation = log.start().await;

        let synthesizer = StopDuringSynthesis {
            log: log.clone(),
            result: Err(ProviderError::unavailable("Groq is down")),
        };
        let playback = SpeechPlayback::new(
            log.clone(),
            Arc::new(synthesizer),
            Arc::new(MockAudioOutput::new()),
        );
        let started = Instant::now();
        playback
            .speak(&speaking_agent(), "hello", "conv_1", generation, 1)
            .await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!log.snapshot().await.speaking.ai1);
    }
}

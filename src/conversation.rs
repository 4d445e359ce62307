//! Conversation turns: chat history, voice input and the turn pipeline that
//! runs a gesture alongside animated speech.

use crate::{
    animator::{AnimationReport, SpeechAnimator},
    audio::{AudioPlayer, SpeechListener},
    config::ConversationConfig,
    emotion::{EmotionClassifier, EmotionLabel},
    gesture::{GestureOutcome, GesturePlayer},
    services::{ChatClient, ChatMessage, SpeechSynthesizer, Transcriber},
    Result,
};
use log::{error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

/// In-memory message history capped at a fixed length, dropping the oldest
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<ChatMessage>,
    max_len: usize,
}

impl ConversationHistory {
    /// Create an empty history holding at most `max_len` messages
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_len {
            self.messages.pop_front();
        }
    }

    /// Messages oldest first
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Chat with history; service failures become the apology reply
pub struct Conversation {
    chat: Arc<dyn ChatClient>,
    history: ConversationHistory,
    system_prompt: String,
    apology: String,
}

impl Conversation {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatClient>, config: &ConversationConfig) -> Self {
        Self {
            chat,
            history: ConversationHistory::new(config.max_history),
            system_prompt: config.system_prompt.clone(),
            apology: config.apology.clone(),
        }
    }

    /// Record `user_text`, get a reply and record it
    pub fn respond(&mut self, user_text: &str) -> String {
        self.history.push(ChatMessage::user(user_text));
        let reply = match self.chat.complete(&self.system_prompt, &self.history.messages()) {
            Ok(reply) => reply,
            Err(e) => {
                error!("Chat failed: {e}");
                self.apology.clone()
            }
        };
        self.history.push(ChatMessage::assistant(reply.clone()));
        reply
    }

    #[must_use]
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Forget every message
    pub fn clear_history(&mut self) {
        self.history.clear();
        info!("Conversation history cleared");
    }
}

/// Microphone utterance → transcript
pub struct VoiceInput {
    listener: SpeechListener,
    transcriber: Arc<dyn Transcriber>,
}

impl VoiceInput {
    #[must_use]
    pub fn new(listener: SpeechListener, transcriber: Arc<dyn Transcriber>) -> Self {
        Self { listener, transcriber }
    }

    /// Listen and transcribe one utterance. `None` when nothing was said or
    /// transcription failed; the transcriber is only called after voice.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SensorUnavailable`] if the microphone cannot be opened
    pub fn capture(&self) -> Result<Option<String>> {
        let Some(audio) = self.listener.listen()? else {
            return Ok(None);
        };
        match self.transcriber.transcribe(&audio) {
            Ok(text) => Ok(text),
            Err(e) => {
                error!("Transcription failed: {e}");
                Ok(None)
            }
        }
    }
}

/// Outcome of one conversational turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    /// Spoken reply, or the apology when chat failed
    pub reply: String,
    /// Label classified from the reply
    pub emotion: EmotionLabel,
    /// Result of the turn-start gesture
    pub gesture: GestureOutcome,
    /// `None` when speech could not be synthesized
    pub animation: Option<AnimationReport>,
}

/// respond → classify → gesture and animated speech together
pub struct TurnPipeline {
    conversation: Conversation,
    classifier: Box<dyn EmotionClassifier>,
    gestures: Arc<GesturePlayer>,
    animator: Arc<SpeechAnimator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
}

impl TurnPipeline {
    #[must_use]
    pub fn new(
        conversation: Conversation,
        classifier: Box<dyn EmotionClassifier>,
        gestures: Arc<GesturePlayer>,
        animator: Arc<SpeechAnimator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
    ) -> Self {
        Self {
            conversation,
            classifier,
            gestures,
            animator,
            synthesizer,
            player,
        }
    }

    /// Run a full turn for `user_text`; returns only when both the gesture
    /// and the speech have finished. Blank input does nothing.
    pub fn run_turn(&mut self, user_text: &str) -> Option<TurnReport> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return None;
        }

        let reply = self.conversation.respond(user_text);
        let emotion = self.classifier.classify(&reply);
        info!("Reply ({emotion}): {reply}");

        let gestures = &self.gestures;
        let (gesture, animation) = thread::scope(|s| {
            let gesture = s.spawn(|| gestures.play(emotion));
            let animation = self.speak(&reply);
            let gesture = gesture.join().unwrap_or_else(|_| {
                error!("Gesture thread panicked");
                GestureOutcome::Dropped
            });
            (gesture, animation)
        });

        Some(TurnReport {
            reply,
            emotion,
            gesture,
            animation,
        })
    }

    /// Synthesize `text` and play it while the animator runs for its duration
    fn speak(&self, text: &str) -> Option<AnimationReport> {
        let speech = match self.synthesizer.synthesize(text) {
            Ok(speech) => speech,
            Err(e) => {
                error!("Speech synthesis failed: {e}");
                return None;
            }
        };

        let animator = &self.animator;
        animator.clear_stop();
        thread::scope(|s| {
            let animation = s.spawn(|| animator.animate(speech.duration));
            if let Err(e) = self.player.play(&speech) {
                warn!("Playback failed: {e}");
                animator.stop();
            }
            animation.join().ok()
        })
    }

    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Forget the chat history
    pub fn clear_history(&mut self) {
        self.conversation.clear_history();
    }

    /// Classifier counters, if the classifier keeps them
    #[must_use]
    pub fn classifier_metrics(&self) -> Option<crate::emotion::ClassifierMetrics> {
        self.classifier.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;

    struct EchoChat {
        seen: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl ChatClient for EchoChat {
        fn complete(&self, _system: &str, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.len());
            if self.fail {
                return Err(Error::Service("offline".into()));
            }
            Ok(format!("echo {}", messages.last().map_or("", |m| m.content.as_str())))
        }
    }

    fn conversation(fail: bool, max_history: usize) -> (Conversation, Arc<EchoChat>) {
        let chat = Arc::new(EchoChat {
            seen: Mutex::new(Vec::new()),
            fail,
        });
        let config = ConversationConfig {
            max_history,
            ..ConversationConfig::default()
        };
        (Conversation::new(chat.clone(), &config), chat)
    }

    #[test]
    fn test_history_drops_from_head() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            history.push(ChatMessage::user(format!("m{i}")));
        }
        let contents: Vec<String> = history.messages().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_respond_sends_capped_history() {
        let (mut conversation, chat) = conversation(false, 4);
        assert_eq!(conversation.respond("hi"), "echo hi");
        conversation.respond("again");
        conversation.respond("third");

        assert_eq!(*chat.seen.lock().unwrap(), vec![1, 3, 4]);
        assert_eq!(conversation.history().len(), 4);
    }

    #[test]
    fn test_failure_substitutes_apology() {
        let (mut conversation, _) = conversation(true, 20);
        let reply = conversation.respond("hello?");
        assert_eq!(reply, crate::constants::DEFAULT_APOLOGY);
        assert_eq!(conversation.history().len(), 2);
    }
}

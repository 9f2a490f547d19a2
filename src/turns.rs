//! Reconciles streamed transcript deltas into finished turns.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    User,
    Agent,
}

/// One actor's complete utterance between two turn boundaries.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    actor: Actor,
    content: String,
    index: u64,
}

impl Turn {
    pub fn new(actor: Actor, content: &str, index: u64) -> Self {
        Self {
            actor,
            content: content.to_string(),
            index,
        }
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Position of the boundary that produced this turn. Turns flushed at the
    /// same boundary share it.
    pub fn index(&self) -> u64 {
        self.index
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("turn rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Destination for finished turns, e.g. a conversation store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn append_turn(&self, turn: Turn) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
struct Buffer {
    text: String,
    chars: usize,
    truncated: bool,
}

impl Buffer {
    fn push(&mut self, delta: &str, limit: Option<usize>) {
        let Some(limit) = limit else {
            self.text.push_str(delta);
            return;
        };
        let room = limit.saturating_sub(self.chars);
        let taken: String = delta.chars().take(room).collect();
        self.chars += taken.chars().count();
        self.text.push_str(&taken);
        if taken.len() < delta.len() && !self.truncated {
            self.truncated = true;
            tracing::warn!("transcript buffer reached {} chars, dropping the rest of the turn", limit);
        }
    }

    fn take(&mut self) -> String {
        let text = std::mem::take(&mut self.text);
        *self = Self::default();
        text.trim().to_string()
    }
}

/// Per-actor transcript buffers, reset together at every turn boundary.
#[derive(Debug, Default)]
pub struct TurnAggregator {
    user: Buffer,
    agent: Buffer,
    max_buffer_chars: Option<usize>,
    next_index: u64,
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps each actor's buffer. Text past the cap is dropped until the turn ends.
    pub fn with_max_buffer_chars(mut self, max: Option<usize>) -> Self {
        self.max_buffer_chars = max;
        self
    }

    pub fn push(&mut self, actor: Actor, delta: &str) {
        let limit = self.max_buffer_chars;
        self.buffer_mut(actor).push(delta, limit);
    }

    pub fn buffer(&self, actor: Actor) -> &str {
        match actor {
            Actor::User => &self.user.text,
            Actor::Agent => &self.agent.text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.text.is_empty() && self.agent.text.is_empty()
    }

    fn buffer_mut(&mut self, actor: Actor) -> &mut Buffer {
        match actor {
            Actor::User => &mut self.user,
            Actor::Agent => &mut self.agent,
        }
    }

    /// Ends the current turn: both buffers are emptied and the non-blank ones
    /// come back as turns, user first.
    pub fn take_completed(&mut self) -> Vec<Turn> {
        let index = self.next_index;
        let turns: Vec<Turn> = [Actor::User, Actor::Agent]
            .into_iter()
            .filter_map(|actor| {
                let content = self.buffer_mut(actor).take();
                (!content.is_empty()).then(|| Turn {
                    actor,
                    content,
                    index,
                })
            })
            .collect();
        if !turns.is_empty() {
            self.next_index += 1;
        }
        turns
    }

    /// Drops an unfinished turn without emitting it. Returns whether any
    /// text was buffered.
    pub fn discard(&mut self) -> bool {
        let had_text = !self.is_empty();
        self.user = Buffer::default();
        self.agent = Buffer::default();
        had_text
    }

    /// Ends the current turn and hands the result to `sink`. Failures are
    /// returned, not retried; the buffers are reset either way.
    pub async fn flush_to(&mut self, sink: &dyn TurnSink) -> Vec<SinkError> {
        write_turns(sink, self.take_completed()).await
    }
}

/// Appends `turns` in order, collecting the failures.
pub(crate) async fn write_turns(sink: &dyn TurnSink, turns: Vec<Turn>) -> Vec<SinkError> {
    let mut errors = Vec::new();
    for turn in turns {
        let actor = turn.actor();
        if let Err(e) = sink.append_turn(turn).await {
            tracing::warn!("failed to store {:?} turn: {}", actor, e);
            errors.push(e);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;

    #[tokio::test]
    async fn test_deltas_become_one_turn() {
        let mut sink = MockTurnSink::new();
        sink.expect_append_turn()
            .with(eq(Turn::new(Actor::User, "Hello", 0)))
            .times(1)
            .returning(|_| Ok(()));

        let mut aggregator = TurnAggregator::new();
        aggregator.push(Actor::User, "Hel");
        aggregator.push(Actor::User, "lo");
        assert_eq!(aggregator.buffer(Actor::User), "Hello");

        let errors = aggregator.flush_to(&sink).await;
        assert!(errors.is_empty());
        assert!(aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_turns_do_not_leak() {
        let mut seq = Sequence::new();
        let mut sink = MockTurnSink::new();
        for (actor, content, index) in [
            (Actor::User, "What time is it?", 0),
            (Actor::Agent, "It is noon.", 0),
            (Actor::User, "Thanks", 1),
        ] {
            sink.expect_append_turn()
                .with(eq(Turn::new(actor, content, index)))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let mut aggregator = TurnAggregator::new();
        aggregator.push(Actor::User, " What time");
        aggregator.push(Actor::Agent, "It is ");
        aggregator.push(Actor::User, " is it? ");
        aggregator.push(Actor::Agent, "noon.");
        assert!(aggregator.flush_to(&sink).await.is_empty());

        aggregator.push(Actor::User, "Thanks");
        assert!(aggregator.flush_to(&sink).await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_still_resets() {
        let mut sink = MockTurnSink::new();
        sink.expect_append_turn()
            .times(2)
            .returning(|turn| match turn.actor() {
                Actor::User => Err(SinkError::Rejected("store offline".into())),
                Actor::Agent => Ok(()),
            });

        let mut aggregator = TurnAggregator::new();
        aggregator.push(Actor::User, "hi");
        aggregator.push(Actor::Agent, "hello");
        let errors = aggregator.flush_to(&sink).await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "turn rejected: store offline");
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_blank_buffers_produce_no_turns() {
        let mut aggregator = TurnAggregator::new();
        assert!(aggregator.take_completed().is_empty());
        aggregator.push(Actor::Agent, "   ");
        assert!(aggregator.take_completed().is_empty());

        // Boundaries without turns do not advance the index.
        aggregator.push(Actor::Agent, "ok");
        assert_eq!(aggregator.take_completed(), vec![Turn::new(Actor::Agent, "ok", 0)]);
    }

    #[test]
    fn test_discard_drops_the_unfinished_turn() {
        let mut aggregator = TurnAggregator::new().with_max_buffer_chars(Some(4));
        assert!(!aggregator.discard());
        aggregator.push(Actor::User, "half a sent");
        aggregator.push(Actor::Agent, "and a reply");
        assert!(aggregator.discard());
        assert!(aggregator.is_empty());
        assert!(aggregator.take_completed().is_empty());

        aggregator.push(Actor::User, "next");
        assert_eq!(aggregator.take_completed(), vec![Turn::new(Actor::User, "next", 0)]);
    }

    #[test]
    fn test_buffer_cap() {
        let mut aggregator = TurnAggregator::new().with_max_buffer_chars(Some(5));
        aggregator.push(Actor::User, "héllo");
        aggregator.push(Actor::User, " world");
        assert_eq!(aggregator.buffer(Actor::User), "héllo");
        assert_eq!(aggregator.take_completed()[0].content(), "héllo");

        aggregator.push(Actor::User, "again");
        assert_eq!(aggregator.buffer(Actor::User), "again");
    }

    #[test]
    fn test_turn_serialization() {
        let turn = Turn::new(Actor::Agent, "hi", 3);
        assert_eq!(
            serde_json::to_string(&turn).unwrap(),
            r#"{"actor":"agent","content":"hi","index":3}"#
        );
    }
}

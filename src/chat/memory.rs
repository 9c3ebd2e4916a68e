use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Sliding window over the last `capacity` turns; the oldest turn is evicted
/// first.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    capacity: usize,
    turns: VecDeque<Turn>,
    /// Bumped by every [`clear`](Self::clear).
    generation: u64,
}

impl ConversationMemory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            turns: VecDeque::with_capacity(capacity),
            generation: 0,
        }
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.generation += 1;
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Turns oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_is_bounded() {
        let mut memory = ConversationMemory::new(2);
        memory.push("q1", "a1");
        memory.push("q2", "a2");
        memory.push("q3", "a3");

        assert_eq!(memory.len(), 2);
        let questions: Vec<&str> = memory.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3"]);
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::new(5);
        memory.push("q", "a");
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.capacity(), 5);
        assert_eq!(memory.generation(), 1);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut memory = ConversationMemory::new(0);
        memory.push("q", "a");
        assert!(memory.is_empty());
    }
}

//! Bounded log of recent chat lines

use shared::PeerId;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub sender: PeerId,
    /// Name of the sender when the line arrived.
    pub sender_name: String,
    pub text: String,
}

#[derive(Debug)]
pub struct ChatLog {
    capacity: usize,
    lines: VecDeque<ChatLine>,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::new(),
        }
    }

    /// Appends a line, evicting the oldest once full.
    pub fn push(&mut self, line: ChatLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ChatLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

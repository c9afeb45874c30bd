use chrono::Local;

use datachat_core::{
    domain::{Message, Sender},
    events::SessionEvent,
};

const TYPING: &str = "assistant is typing...";

/// Tracks how much of the transcript has been printed.
#[derive(Debug, Default)]
pub struct TranscriptView {
    rendered: usize,
}

impl TranscriptView {
    /// Lines to print for one event. Only messages not shown yet are returned.
    pub fn lines_for(&mut self, ev: &SessionEvent) -> Vec<String> {
        match ev {
            SessionEvent::TranscriptChanged(snapshot) => {
                let lines = snapshot
                    .iter()
                    .skip(self.rendered)
                    .map(format_message)
                    .collect();
                self.rendered = snapshot.len();
                lines
            }
            SessionEvent::ComposingChanged(true) => vec![TYPING.to_string()],
            SessionEvent::ComposingChanged(false) => Vec::new(),
        }
    }

    pub fn print(&mut self, ev: &SessionEvent) {
        for line in self.lines_for(ev) {
            println!("{line}");
        }
    }

    pub fn print_history(&self, messages: &[Message]) {
        for m in messages {
            println!("{}", format_message(m));
        }
    }
}

pub fn format_message(m: &Message) -> String {
    let ts = m.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let who = match m.sender {
        Sender::User => "you",
        Sender::Bot => "assistant",
    };
    format!("[{ts}] {who}: {}", m.content)
}

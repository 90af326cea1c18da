//! Operator Console Exchanges
//!
//! Device faults the I/O manager cannot resolve on its own are put to the
//! operator as a read-reply prompt: a single-line message listing the
//! responses that will be accepted. The prompt is posted without waiting;
//! the console collaborator stores the reply (or cancels the prompt when
//! the system is going down) and the owning tracker inspects it on later
//! poll passes.
//!
//! # Responses
//!
//! - **R** retry the operation
//! - **M** fail, with a side effect (disk: mark the track bad; tape: mark
//!   position lost)
//! - **A** fail without side effects
//! - **D** print diagnostics and ask again

use core::fmt;
use spin::Mutex;
use std::sync::Arc;

/// Prefix attached to a prompt reposted after an unacceptable reply
pub const NOT_UNDERSTOOD_MARKER: &str = "RESPONSE NOT UNDERSTOOD -";

bitflags::bitflags! {
    /// Set of responses a prompt accepts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResponseSet: u8 {
        /// Retry the operation
        const RETRY = 0x01;
        /// Fail with side effect
        const MARK = 0x02;
        /// Fail cleanly
        const ABORT = 0x04;
        /// Diagnose and ask again
        const DIAGNOSE = 0x08;
    }
}

impl ResponseSet {
    /// Comma separated response letters, e.g. `R,M,A,D`
    pub fn hint(self) -> String {
        [
            OperatorResponse::Retry,
            OperatorResponse::Mark,
            OperatorResponse::Abort,
            OperatorResponse::Diagnose,
        ]
        .iter()
        .filter(|r| self.contains(r.flag()))
        .map(|r| r.letter().to_string())
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// Decoded operator response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorResponse {
    Retry,
    Mark,
    Abort,
    Diagnose,
}

impl OperatorResponse {
    /// Decode a reply; exactly one letter, case-insensitive
    pub fn from_reply(reply: &str) -> Option<Self> {
        let mut chars = reply.trim().chars();
        let letter = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        match letter.to_ascii_uppercase() {
            'R' => Some(Self::Retry),
            'M' => Some(Self::Mark),
            'A' => Some(Self::Abort),
            'D' => Some(Self::Diagnose),
            _ => None,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Self::Retry => 'R',
            Self::Mark => 'M',
            Self::Abort => 'A',
            Self::Diagnose => 'D',
        }
    }

    pub const fn flag(self) -> ResponseSet {
        match self {
            Self::Retry => ResponseSet::RETRY,
            Self::Mark => ResponseSet::MARK,
            Self::Abort => ResponseSet::ABORT,
            Self::Diagnose => ResponseSet::DIAGNOSE,
        }
    }
}

#[derive(Debug, Default)]
struct ReplyState {
    response: Option<String>,
    cancelled: bool,
}

/// Non-blocking read-reply prompt
#[derive(Debug)]
pub struct ReadReplyMessage {
    text: String,
    accepted: ResponseSet,
    /// Console should sound the alarm for this prompt
    urgent: bool,
    state: Mutex<ReplyState>,
}

impl ReadReplyMessage {
    pub fn new(text: String, accepted: ResponseSet, urgent: bool) -> Self {
        Self {
            text,
            accepted,
            urgent,
            state: Mutex::new(ReplyState::default()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn accepted(&self) -> ResponseSet {
        self.accepted
    }

    pub fn is_urgent(&self) -> bool {
        self.urgent
    }

    /// Store the operator's reply (console side)
    pub fn respond(&self, reply: &str) {
        self.state.lock().response = Some(reply.to_string());
    }

    /// Withdraw the prompt (console side, at shutdown)
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn response(&self) -> Option<String> {
        self.state.lock().response.clone()
    }
}

impl fmt::Display for ReadReplyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Operator console as seen from the I/O manager
pub trait ConsoleCollaborator: Send + Sync {
    /// Post a prompt; the reply arrives through `message`
    fn post_read_reply(&self, message: Arc<ReadReplyMessage>);

    /// Post an informational line
    fn post_status(&self, text: &str);
}

/// What a pending exchange currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Waiting,
    Cancelled,
    /// A reply arrived but is not in the accepted set
    NotUnderstood,
    Answered(OperatorResponse),
}

/// Outstanding operator exchange owned by one tracker
#[derive(Debug)]
pub struct ConsoleExchange {
    base_text: String,
    accepted: ResponseSet,
    message: Arc<ReadReplyMessage>,
}

impl ConsoleExchange {
    /// Post `text` as an urgent prompt accepting `accepted`
    pub fn post(console: &dyn ConsoleCollaborator, text: String, accepted: ResponseSet) -> Self {
        let message = Arc::new(ReadReplyMessage::new(text.clone(), accepted, true));
        console.post_read_reply(Arc::clone(&message));
        Self {
            base_text: text,
            accepted,
            message,
        }
    }

    pub fn text(&self) -> &str {
        &self.base_text
    }

    pub fn state(&self) -> ExchangeState {
        if self.message.is_cancelled() {
            return ExchangeState::Cancelled;
        }
        let Some(reply) = self.message.response() else {
            return ExchangeState::Waiting;
        };
        match OperatorResponse::from_reply(&reply) {
            Some(response) if self.accepted.contains(response.flag()) => {
                ExchangeState::Answered(response)
            }
            _ => ExchangeState::NotUnderstood,
        }
    }

    /// Post the original prompt again
    pub fn repost(&mut self, console: &dyn ConsoleCollaborator) {
        self.replace(console, self.base_text.clone());
    }

    /// Post the prompt again flagged as not understood
    pub fn repost_not_understood(&mut self, console: &dyn ConsoleCollaborator) {
        let text = format!("{} {}", NOT_UNDERSTOOD_MARKER, self.base_text);
        self.replace(console, text);
    }

    fn replace(&mut self, console: &dyn ConsoleCollaborator, text: String) {
        let message = Arc::new(ReadReplyMessage::new(text, self.accepted, true));
        console.post_read_reply(Arc::clone(&message));
        self.message = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<Arc<ReadReplyMessage>>>,
    }

    impl ConsoleCollaborator for Recorder {
        fn post_read_reply(&self, message: Arc<ReadReplyMessage>) {
            self.prompts.lock().push(message);
        }

        fn post_status(&self, _text: &str) {}
    }

    #[test]
    fn test_hint_order() {
        assert_eq!(ResponseSet::all().hint(), "R,M,A,D");
        assert_eq!((ResponseSet::ABORT | ResponseSet::RETRY).hint(), "R,A");
        assert_eq!(ResponseSet::empty().hint(), "");
    }

    #[test]
    fn test_reply_decoding() {
        assert_eq!(OperatorResponse::from_reply(" r "), Some(OperatorResponse::Retry));
        assert_eq!(OperatorResponse::from_reply("D"), Some(OperatorResponse::Diagnose));
        assert_eq!(OperatorResponse::from_reply("RA"), None);
        assert_eq!(OperatorResponse::from_reply(""), None);
        assert_eq!(OperatorResponse::from_reply("X"), None);
    }

    #[test]
    fn test_exchange_states() {
        let console = Recorder::default();
        let mut exchange = ConsoleExchange::post(
            &console,
            "DISK1 DCHK".to_string(),
            ResponseSet::RETRY | ResponseSet::ABORT,
        );
        assert_eq!(exchange.state(), ExchangeState::Waiting);
        let latest = || console.prompts.lock().last().cloned().unwrap();

        latest().respond("M");
        assert_eq!(exchange.state(), ExchangeState::NotUnderstood);

        exchange.repost_not_understood(&console);
        assert_eq!(exchange.state(), ExchangeState::Waiting);
        assert!(latest().text().starts_with(NOT_UNDERSTOOD_MARKER));
        assert_eq!(exchange.text(), "DISK1 DCHK");

        latest().respond("a");
        assert_eq!(exchange.state(), ExchangeState::Answered(OperatorResponse::Abort));

        latest().cancel();
        assert_eq!(exchange.state(), ExchangeState::Cancelled);
        assert_eq!(console.prompts.lock().len(), 2);
    }
}

use crate::topics::Topic;

const TECHNICAL_SYSTEM_INSTRUCTION: &str = "Act as an expert metallurgist. Provide a concise, \
     technical explanation (250 words at most) of the requested defect. Use bold (**) to \
     highlight key terms. The answer must be formal.";

const CHAT_SYSTEM_INSTRUCTION: &str = "Act as a metallurgical assistant. Answer questions about \
     defects, metallurgy and material quality concisely (150 words at most).";

/// What a dispatched request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Topic button: single-shot query whose answer replaces the panel.
    TechnicalLookup,
    /// Free-text query appended to the running transcript.
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
}

/// One request cycle. Idle until the first dispatch, Loading while a call is
/// in flight, then Success or Error until the next dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Loading,
    Success(String),
    Error(String),
}

/// Everything the caller needs to run the network call for one dispatch.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub mode: Mode,
    pub user_prompt: String,
    pub system_instruction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// Client initialization failed at startup; AI controls stay disabled.
    Unavailable,
    /// A request is already in flight.
    Busy,
    /// Chat submit with nothing but whitespace.
    EmptyPrompt,
}

/// One block of the output panel, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Informational text (startup placeholder, unavailable notice).
    Notice(String),
    /// A technical-lookup answer, rendered with markdown emphasis.
    Answer(String),
    /// A chat entry with its role prefix.
    Entry(ConversationEntry),
    /// An error-styled failure message.
    Failure(String),
}

/// Owns the request state and the output panel. All reads and mutations
/// happen on the UI thread; the background call only hands back a result.
pub struct Controller {
    state: RequestState,
    available: bool,
    in_flight: Option<Mode>,
    blocks: Vec<Block>,
}

impl Controller {
    pub fn new(available: bool, notice: String) -> Self {
        Controller {
            state: RequestState::Idle,
            available,
            in_flight: None,
            blocks: vec![Block::Notice(notice)],
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == RequestState::Loading
    }

    /// Controls are live only between requests, and only when the client
    /// came up at startup.
    pub fn controls_enabled(&self) -> bool {
        self.available && !self.is_loading()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Chat entries currently on the panel, oldest first.
    pub fn transcript(&self) -> Vec<&ConversationEntry> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Entry(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    /// Start a technical lookup for `topic`.
    pub fn dispatch_topic(&mut self, topic: Topic) -> Result<Dispatch, DispatchError> {
        self.guard()?;

        self.state = RequestState::Loading;
        self.in_flight = Some(Mode::TechnicalLookup);

        Ok(Dispatch {
            mode: Mode::TechnicalLookup,
            user_prompt: technical_query(topic),
            system_instruction: TECHNICAL_SYSTEM_INSTRUCTION.to_string(),
        })
    }

    /// Start a chat request with the user's literal text.
    pub fn dispatch_chat(&mut self, input: &str) -> Result<Dispatch, DispatchError> {
        self.guard()?;

        let prompt = input.trim();
        if prompt.is_empty() {
            return Err(DispatchError::EmptyPrompt);
        }

        // A leading placeholder or stale failure makes way for the transcript.
        if matches!(self.blocks.as_slice(), [Block::Notice(_)] | [Block::Failure(_)]) {
            self.blocks.clear();
        }
        self.blocks.push(Block::Entry(ConversationEntry {
            role: Role::User,
            text: prompt.to_string(),
        }));

        self.state = RequestState::Loading;
        self.in_flight = Some(Mode::Chat);

        Ok(Dispatch {
            mode: Mode::Chat,
            user_prompt: prompt.to_string(),
            system_instruction: CHAT_SYSTEM_INSTRUCTION.to_string(),
        })
    }

    fn guard(&self) -> Result<(), DispatchError> {
        if !self.available {
            return Err(DispatchError::Unavailable);
        }
        if self.is_loading() {
            return Err(DispatchError::Busy);
        }
        Ok(())
    }

    /// Terminal transition for a successful call. A technical answer replaces
    /// the whole panel; a chat reply is appended to the transcript.
    pub fn complete(&mut self, text: String) {
        let Some(mode) = self.in_flight.take() else {
            return;
        };
        match mode {
            Mode::TechnicalLookup => {
                self.blocks = vec![Block::Answer(text.clone())];
            }
            Mode::Chat => {
                self.blocks.push(Block::Entry(ConversationEntry {
                    role: Role::Assistant,
                    text: text.clone(),
                }));
            }
        }
        self.state = RequestState::Success(text);
    }

    /// Terminal transition for a failed call. The panel shows the failure
    /// detail; controls come back so the user can retry.
    pub fn fail(&mut self, message: String) {
        if self.in_flight.take().is_none() {
            return;
        }
        self.blocks = vec![Block::Failure(message.clone())];
        self.state = RequestState::Error(message);
    }
}

fn technical_query(topic: Topic) -> String {
    format!(
        "Tell me everything relevant about the metallurgical defect '{}'. Focus on its cause, \
         morphology and impact on material quality. Be concise, 250 words at most. Use bold (**) \
         to highlight key terms.",
        topic.id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> Controller {
        Controller::new(true, "pick a defect".to_string())
    }

    #[test]
    fn test_dispatch_rejected_while_loading() {
        let mut controller = ready();
        controller.dispatch_topic(Topic::Crazing).unwrap();
        assert_eq!(*controller.state(), RequestState::Loading);

        assert!(matches!(
            controller.dispatch_topic(Topic::Patches),
            Err(DispatchError::Busy)
        ));
        assert!(matches!(
            controller.dispatch_chat("hello"),
            Err(DispatchError::Busy)
        ));
        assert_eq!(*controller.state(), RequestState::Loading);
        assert!(!controller.controls_enabled());
    }

    #[test]
    fn test_unavailable_stays_disabled() {
        let mut controller = Controller::new(false, "client missing".to_string());
        assert!(!controller.controls_enabled());

        assert!(matches!(
            controller.dispatch_topic(Topic::Scratches),
            Err(DispatchError::Unavailable)
        ));
        assert!(matches!(
            controller.dispatch_chat("hello"),
            Err(DispatchError::Unavailable)
        ));

        // Stray completion events change nothing either.
        controller.complete("late".to_string());
        controller.fail("late".to_string());
        assert_eq!(*controller.state(), RequestState::Idle);
        assert!(!controller.controls_enabled());
    }

    #[test]
    fn test_blank_chat_is_rejected_without_transition() {
        let mut controller = ready();
        assert!(matches!(
            controller.dispatch_chat("   \t  "),
            Err(DispatchError::EmptyPrompt)
        ));
        assert_eq!(*controller.state(), RequestState::Idle);
        assert_eq!(controller.blocks().len(), 1);
        assert!(matches!(controller.blocks()[0], Block::Notice(_)));
    }

    #[test]
    fn test_technical_answer_replaces_panel() {
        let mut controller = ready();
        controller.dispatch_chat("what is crazing?").unwrap();
        controller.complete("a surface crack network".to_string());

        controller.dispatch_topic(Topic::Crazing).unwrap();
        controller.complete("**Crazing** is a network of fine cracks.".to_string());

        assert_eq!(
            controller.blocks(),
            &[Block::Answer("**Crazing** is a network of fine cracks.".to_string())]
        );
        assert_eq!(
            *controller.state(),
            RequestState::Success("**Crazing** is a network of fine cracks.".to_string())
        );
        assert!(controller.controls_enabled());
    }

    #[test]
    fn test_chat_transcript_ordering() {
        let mut controller = ready();

        controller.dispatch_chat("hello").unwrap();
        controller.complete("reply1".to_string());
        controller.dispatch_chat("world").unwrap();
        controller.complete("reply2".to_string());

        let transcript = controller.transcript();
        let flattened: Vec<(Role, &str)> = transcript
            .iter()
            .map(|entry| (entry.role, entry.text.as_str()))
            .collect();
        assert_eq!(
            flattened,
            vec![
                (Role::User, "hello"),
                (Role::Assistant, "reply1"),
                (Role::User, "world"),
                (Role::Assistant, "reply2"),
            ]
        );

        // The startup placeholder was cleared by the first chat dispatch.
        assert!(controller.blocks().iter().all(|b| matches!(b, Block::Entry(_))));
    }

    #[test]
    fn test_failure_then_retry() {
        let mut controller = ready();
        controller.dispatch_topic(Topic::Inclusion).unwrap();
        controller.fail("quota exhausted".to_string());

        assert_eq!(
            *controller.state(),
            RequestState::Error("quota exhausted".to_string())
        );
        assert_eq!(
            controller.blocks(),
            &[Block::Failure("quota exhausted".to_string())]
        );
        assert!(controller.controls_enabled());

        // A new dispatch is accepted from the error state.
        assert!(controller.dispatch_topic(Topic::Inclusion).is_ok());
        assert_eq!(*controller.state(), RequestState::Loading);
    }

    #[test]
    fn test_chat_clears_stale_failure() {
        let mut controller = ready();
        controller.dispatch_chat("first").unwrap();
        controller.fail("connection reset".to_string());

        controller.dispatch_chat("second").unwrap();
        assert_eq!(controller.blocks().len(), 1);
        assert!(matches!(
            &controller.blocks()[0],
            Block::Entry(ConversationEntry { role: Role::User, .. })
        ));
    }

    #[test]
    fn test_prompts_follow_mode() {
        let mut controller = ready();

        let lookup = controller.dispatch_topic(Topic::RolledInScale).unwrap();
        assert_eq!(lookup.mode, Mode::TechnicalLookup);
        assert!(lookup.user_prompt.contains("'rolled-in_scale'"));
        assert!(lookup.system_instruction.contains("expert metallurgist"));

        controller.complete("done".to_string());

        let chat = controller.dispatch_chat("  why does it happen?  ").unwrap();
        assert_eq!(chat.mode, Mode::Chat);
        assert_eq!(chat.user_prompt, "why does it happen?");
        assert!(chat.system_instruction.contains("metallurgical assistant"));
        assert_ne!(chat.system_instruction, lookup.system_instruction);
    }
}

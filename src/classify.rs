use crate::platform::{MessageKind, SourceMessage};

/// Whether a message goes out to recipients, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Eligible,
    SkippedPoll,
    SkippedEmpty,
}

impl Classification {
    pub fn is_eligible(self) -> bool {
        self == Classification::Eligible
    }

    pub fn reason(self) -> &'static str {
        match self {
            Classification::Eligible => "eligible",
            Classification::SkippedPoll => "poll",
            Classification::SkippedEmpty => "empty",
        }
    }
}

/// Text and non-poll media are forwarded. Polls never are, since a copied
/// poll loses its votes. Anything without content is skipped as empty.
pub fn classify(message: &SourceMessage) -> Classification {
    match message.kind {
        MessageKind::Text | MessageKind::Media => Classification::Eligible,
        MessageKind::Poll => Classification::SkippedPoll,
        MessageKind::Empty | MessageKind::Other => Classification::SkippedEmpty,
    }
}

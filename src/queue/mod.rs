//! Serialized drivers on top of a [`Session`](crate::session::Session).

mod command_queue;
mod transaction_queue;

use std::fmt;

pub use command_queue::{Command, CommandQueue, QueueItem};
pub use transaction_queue::{QueuedStatement, TransactionQueue};

/// Tag of a [`Command`] without its payload, carried in queue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Insert,
    Replace,
    Update,
    Delete,
    Drop,
    Exec,
}

impl CommandKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Insert => "INSERT",
            CommandKind::Replace => "REPLACE",
            CommandKind::Update => "UPDATE",
            CommandKind::Delete => "DELETE",
            CommandKind::Drop => "DROP",
            CommandKind::Exec => "EXEC",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

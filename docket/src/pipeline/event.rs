use crossbeam::channel::{self, Receiver, Sender};

use crate::collection::{Document, FlushReport};
use crate::errors::DocketResult;

/// A unit of work for a collection worker.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Store a new document.
    Create(Document),
    /// Shallow merge the document into the one stored under the id.
    Update(String, Document),
    /// Remove the document stored under the id.
    Delete(String),
    /// Persist every dirty batch.
    FlushToDisk,
    /// Clear the collection and terminate its worker.
    StopWorker,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Create(_) => "create",
            Event::Update(_, _) => "update",
            Event::Delete(_) => "delete",
            Event::FlushToDisk => "flush",
            Event::StopWorker => "stop",
        }
    }
}

/// What applying an [Event] produced.
#[derive(Clone, Debug, PartialEq)]
pub enum EventOutcome {
    Created(Document),
    Updated(Document),
    Deleted(Document),
    Flushed(FlushReport),
    Stopped,
}

pub(crate) type Reply = Sender<DocketResult<EventOutcome>>;

/// An [Event] addressed to a collection, as placed on the intake queue.
#[derive(Debug)]
pub struct IncomeRequest {
    pub database: String,
    pub collection: String,
    pub event: Event,
    pub(crate) reply: Option<Reply>,
}

impl IncomeRequest {
    /// A fire-and-forget request.
    pub fn new(database: &str, collection: &str, event: Event) -> Self {
        IncomeRequest {
            database: database.to_string(),
            collection: collection.to_string(),
            event,
            reply: None,
        }
    }

    /// A request whose outcome is sent back on the returned receiver.
    pub fn with_reply(
        database: &str,
        collection: &str,
        event: Event,
    ) -> (Self, Receiver<DocketResult<EventOutcome>>) {
        let (sender, receiver) = channel::bounded(1);
        let mut request = Self::new(database, collection, event);
        request.reply = Some(sender);
        (request, receiver)
    }

    pub(crate) fn respond(self, outcome: DocketResult<EventOutcome>) {
        if let Some(reply) = self.reply {
            // the submitter may have stopped waiting
            let _ = reply.send(outcome);
        }
    }
}

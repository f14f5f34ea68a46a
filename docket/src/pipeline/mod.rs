//! Serialized mutation pipeline: the intake queue, its dispatcher and one
//! worker thread per collection.
mod broker;
mod event;
mod worker;

pub use broker::{Broker, BrokerConfig, CollectionResolver, FlushSummary};
pub use event::{Event, EventOutcome, IncomeRequest};

//! Live event streaming to remote clients.
//!
//! A [`StreamWorker`] serves one connection. Clients send JSON commands:
//!
//! ```text
//! {"command":"subscribe","graph_id":"<id>"}
//! {"command":"unsubscribe","graph_id":"<id>"}
//! ```
//!
//! and receive one text frame per event:
//!
//! ```text
//! {"type":"model.StageAddedEvent","sub":"<id>","data":{...}}
//! ```
//!
//! Graph created/completed events from the supervisor are always forwarded
//! under the subscription ID `_all`.

mod command;
mod connection;
mod worker;

pub use command::{Command, EventMessage};
pub use connection::{Connection, Frame};
pub use worker::{StreamWorker, WorkerConfig};

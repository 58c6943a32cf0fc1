//! Inbound document channels.
//!
//! All mailbox network I/O sits behind `MailboxSource`; the poller
//! drives it and feeds parsed documents into the pipeline.

pub mod email;
pub mod poller;
pub mod spool;

pub use email::{MailboxSource, RawMail, parse_inbound};
pub use poller::spawn_poller;
pub use spool::SpoolMailbox;

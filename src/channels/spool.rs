//! Spool-directory mailbox — local delivery of raw messages.
//!
//! The network-facing mail fetcher (an external collaborator) drops raw
//! RFC 822 files into a spool directory; `fetch_new` picks them up and
//! moves them into a `seen/` subdirectory so they are yielded exactly
//! once. Useful on its own for piped local delivery and as the test
//! double for the IMAP collaborator.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::channels::email::{MailboxSource, RawMail};
use crate::error::ChannelError;

/// Mailbox source reading raw message files from a spool directory.
pub struct SpoolMailbox {
    dir: PathBuf,
}

impl SpoolMailbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn seen_dir(&self) -> PathBuf {
        self.dir.join("seen")
    }
}

#[async_trait]
impl MailboxSource for SpoolMailbox {
    async fn fetch_new(&self) -> Result<Vec<RawMail>, ChannelError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::create_dir_all(self.seen_dir())?;

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        let mut mails = Vec::new();
        for path in entries {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read spooled message");
                    continue;
                }
            };

            // Moved to seen/ before yielding: a file is never yielded
            // twice, even across a crash mid-batch.
            let target = self.seen_dir().join(
                path.file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| "message".into()),
            );
            if let Err(e) = std::fs::rename(&path, &target) {
                warn!(path = %path.display(), error = %e, "Failed to move spooled message");
                continue;
            }

            debug!(path = %path.display(), "Picked up spooled message");
            mails.push(RawMail { bytes });
        }

        Ok(mails)
    }
}

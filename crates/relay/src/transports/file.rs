//! FileTransport - every channel is a directory, every message a file
//!
//! Layout: `<root>/<channel>/<message_id>.log`. Edits rewrite the file; sends
//! write a new one. Content beyond `max_content_len` bytes is refused with
//! `ContentTooLarge`, like a chat service's hard message ceiling.

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{ChannelId, DestinationTransport, MessageHandle, TransportConfig, TransportError};
use tracing::{debug, instrument};

/// Configuration for FileTransport
#[derive(Debug, Clone)]
pub struct FileTransportConfig {
    /// Base output directory
    pub root: PathBuf,
    /// Hard content ceiling in bytes
    pub max_content_len: usize,
}

impl From<&TransportConfig> for FileTransportConfig {
    fn from(config: &TransportConfig) -> Self {
        Self {
            root: config.root.clone(),
            max_content_len: config.max_content_len,
        }
    }
}

/// Transport that writes messages to disk files
#[derive(Debug)]
pub struct FileTransport {
    config: FileTransportConfig,
    next_message_id: u64,
}

impl FileTransport {
    /// Create a new FileTransport, creating the root directory.
    ///
    /// Message ids continue after the highest id already on disk.
    pub fn new(config: FileTransportConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.root)?;
        let next_message_id = highest_message_id(&config.root)?;
        Ok(Self {
            config,
            next_message_id,
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Path of a message file
    pub fn message_path(&self, handle: &MessageHandle) -> PathBuf {
        self.channel_dir(handle.channel)
            .join(format!("{}.log", handle.message_id))
    }

    fn channel_dir(&self, channel: ChannelId) -> PathBuf {
        self.config.root.join(channel.to_string())
    }

    fn check_len(&self, content: &str) -> Result<(), TransportError> {
        if content.len() > self.config.max_content_len {
            return Err(TransportError::ContentTooLarge {
                len: content.len(),
                max: self.config.max_content_len,
            });
        }
        Ok(())
    }

    fn write_new(&mut self, channel: ChannelId, content: &str) -> Result<MessageHandle, TransportError> {
        self.check_len(content)?;
        let dir = self.channel_dir(channel);
        fs::create_dir_all(&dir)?;
        self.next_message_id += 1;
        let handle = MessageHandle::new(channel, self.next_message_id);
        fs::write(self.message_path(&handle), content)?;
        Ok(handle)
    }
}

fn highest_message_id(root: &Path) -> std::io::Result<u64> {
    let mut highest = 0;
    for channel in fs::read_dir(root)? {
        let channel = channel?;
        if !channel.file_type()?.is_dir() {
            continue;
        }
        for message in fs::read_dir(channel.path())? {
            let id = message?
                .path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok());
            if let Some(id) = id {
                highest = highest.max(id);
            }
        }
    }
    Ok(highest)
}

impl DestinationTransport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    fn resolve(&self, channel: ChannelId) -> bool {
        channel != 0
    }

    #[instrument(name = "file_transport_create", skip(self, content))]
    async fn create(
        &mut self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageHandle, TransportError> {
        let handle = self.write_new(channel, content)?;
        debug!(message_id = handle.message_id, "message file created");
        Ok(handle)
    }

    #[instrument(
        name = "file_transport_edit",
        skip(self, handle, content),
        fields(channel = handle.channel, message_id = handle.message_id)
    )]
    async fn edit(&mut self, handle: &MessageHandle, content: &str) -> Result<(), TransportError> {
        self.check_len(content)?;
        let path = self.message_path(handle);
        if !path.is_file() {
            return Err(TransportError::MessageNotFound {
                channel: handle.channel,
                message_id: handle.message_id,
            });
        }
        fs::write(path, content)?;
        Ok(())
    }

    #[instrument(name = "file_transport_send", skip(self, content))]
    async fn send(&mut self, channel: ChannelId, content: &str) -> Result<(), TransportError> {
        self.write_new(channel, content).map(|_| ())
    }
}

use std::borrow::Cow;

use tracing::warn;

use parley_crypto::ChannelCipher;
use parley_types::Message;

use crate::error::TransformError;

/// Turns stored message content into displayable text. The engine treats it
/// as opaque and never checks whether content is ciphertext.
pub trait ContentTransform {
    fn decrypt(&self, content: &str, sender_key_hint: Option<&str>) -> Result<String, TransformError>;
}

/// Content is already plaintext.
pub struct PassThrough;

impl ContentTransform for PassThrough {
    fn decrypt(&self, content: &str, _sender_key_hint: Option<&str>) -> Result<String, TransformError> {
        Ok(content.to_string())
    }
}

impl ContentTransform for ChannelCipher {
    fn decrypt(&self, content: &str, _sender_key_hint: Option<&str>) -> Result<String, TransformError> {
        self.open(content).map_err(|e| TransformError(e.to_string()))
    }
}

/// Body text for display. Falls back to the raw content when the transform fails.
pub fn display_body<'a, T>(transform: &T, message: &'a Message) -> Cow<'a, str>
where
    T: ContentTransform + ?Sized,
{
    let hint = message.sender_id.to_string();
    match transform.decrypt(&message.content, Some(&hint)) {
        Ok(plaintext) => Cow::Owned(plaintext),
        Err(e) => {
            warn!(id = %message.id, "Showing raw content: {}", e);
            Cow::Borrowed(&message.content)
        }
    }
}

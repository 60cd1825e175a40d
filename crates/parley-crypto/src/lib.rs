/// Parley Crypto Library
///
/// Shared symmetric key per conversation (AES-256-GCM). Message bodies travel
/// as `base64(nonce).base64(ciphertext)` so they fit the opaque string
/// `content` field of a message.

pub mod encrypt;
pub mod keys;

pub use encrypt::ChannelCipher;
pub use keys::ChannelKey;

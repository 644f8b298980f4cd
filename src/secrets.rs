//! Credential decryption contract.
//!
//! Stored passwords are opaque to the core. Encrypted values carry a tag
//! prefix; everything else passes through unchanged so plain development
//! setups keep working. The real cipher lives outside the core and is
//! injected at startup.

use async_trait::async_trait;

use crate::error::SecretError;

/// Prefix marking an encrypted opaque value.
pub const ENCRYPTED_TAG: &str = "enc:v1:";

/// Decrypts stored credentials.
#[async_trait]
pub trait SecretCipher: Send + Sync {
    /// Decrypt an opaque stored value into the plain credential.
    async fn decrypt(&self, opaque: &str) -> Result<String, SecretError>;
}

/// Pass-through cipher: accepts plain values, rejects tagged ones.
///
/// The default when no external cipher is configured. Encountering an
/// `enc:v1:` value with this cipher is a configuration error, not a value to
/// be passed along as if it were a password.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCipher;

#[async_trait]
impl SecretCipher for PlainCipher {
    async fn decrypt(&self, opaque: &str) -> Result<String, SecretError> {
        if opaque.starts_with(ENCRYPTED_TAG) {
            return Err(SecretError::Decrypt(
                "encrypted credential present but no cipher is configured".to_string(),
            ));
        }
        Ok(opaque.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_values_pass_through() {
        let cipher = PlainCipher;
        assert_eq!(cipher.decrypt("hunter2").await.unwrap(), "hunter2");
        assert_eq!(cipher.decrypt("").await.unwrap(), "");
    }

    #[tokio::test]
    async fn tagged_values_are_rejected_without_a_cipher() {
        let cipher = PlainCipher;
        assert!(cipher.decrypt("enc:v1:deadbeef").await.is_err());
    }
}

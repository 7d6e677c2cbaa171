//! Toy encryption service for tests. Not secure in any way.

use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{ItemId, MasterKey};

use super::EncryptionService;

const MAGIC: &str = "quill-xor:";
const METHOD: i64 = 1;

/// XOR "encryption" keyed by a data key that is itself sealed with a password
/// inside a [`MasterKey`].
pub struct XorEncryption {
    enabled: bool,
    key: RwLock<Option<Vec<u8>>>,
}

impl XorEncryption {
    /// Enabled, with a data key derived directly from `secret`.
    pub fn unlocked(secret: &str) -> Self {
        Self {
            enabled: true,
            key: RwLock::new(Some(secret.as_bytes().to_vec())),
        }
    }

    /// Enabled, but no master key loaded yet.
    pub fn locked() -> Self {
        Self {
            enabled: true,
            key: RwLock::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            key: RwLock::new(None),
        }
    }

    /// Create a master key protected by `password` and load it.
    pub fn generate_master_key(&self, password: &str) -> MasterKey {
        let data_key = ItemId::new().as_str();
        *self.key.write().unwrap() = Some(data_key.as_bytes().to_vec());
        MasterKey::new(
            "quill-tests",
            METHOD,
            checksum(data_key.as_bytes()),
            to_hex(&xor(data_key.as_bytes(), password.as_bytes())),
        )
    }

    /// Unlock a master key with `password`.
    pub fn load_master_key(&self, master_key: &MasterKey, password: &str) -> Result<()> {
        let sealed = from_hex(&master_key.content)?;
        let data_key = xor(&sealed, password.as_bytes());
        if checksum(&data_key) != master_key.checksum {
            return Err(Error::Encryption("invalid master key password".to_string()));
        }
        *self.key.write().unwrap() = Some(data_key);
        Ok(())
    }
}

impl EncryptionService for XorEncryption {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn encrypt_string(&self, plain_text: &str) -> Result<String> {
        let key = self.key.read().unwrap();
        let key = key
            .as_ref()
            .ok_or_else(|| Error::Encryption("master key not loaded".to_string()))?;
        Ok(to_hex(&xor(format!("{MAGIC}{plain_text}").as_bytes(), key)))
    }

    fn decrypt_string(&self, cipher_text: &str) -> Result<String> {
        let key = self.key.read().unwrap();
        let key = key
            .as_ref()
            .ok_or_else(|| Error::Encryption("master key not loaded".to_string()))?;
        let plain = String::from_utf8(xor(&from_hex(cipher_text)?, key))
            .map_err(|_| Error::Encryption("wrong key".to_string()))?;
        plain
            .strip_prefix(MAGIC)
            .map(str::to_string)
            .ok_or_else(|| Error::Encryption("wrong key".to_string()))
    }
}

fn xor(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, key)| byte ^ key)
        .collect()
}

fn checksum(data: &[u8]) -> String {
    let sum = data
        .iter()
        .fold(0u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(u32::from(*byte)));
    format!("{sum:08x}")
}

fn to_hex(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn from_hex(value: &str) -> Result<Vec<u8>> {
    if value.len() % 2 != 0 {
        return Err(Error::Encryption("invalid hex payload".to_string()));
    }
    (0..value.len())
        .step_by(2)
        .map(|index| {
            u8::from_str_radix(&value[index..index + 2], 16)
                .map_err(|_| Error::Encryption("invalid hex payload".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_round_trip() {
        let sender = XorEncryption::locked();
        let key = sender.generate_master_key("123456");
        let cipher = sender.encrypt_string("hello").unwrap();

        let receiver = XorEncryption::locked();
        assert!(receiver.decrypt_string(&cipher).is_err());
        assert!(receiver.load_master_key(&key, "wrong").is_err());
        receiver.load_master_key(&key, "123456").unwrap();
        assert_eq!(receiver.decrypt_string(&cipher).unwrap(), "hello");
    }
}

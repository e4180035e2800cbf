use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

// Master key comes from CRM_BRIDGE_MASTER_KEY (32 bytes, hex). Without it
// we fall back to a fixed dev key so local setups work out of the box;
// production deployments must set the env var.
const DEV_KEY: &[u8; 32] = b"crm-bridge-dev-key-do-not-ship!!";

fn master_key() -> [u8; 32] {
    if let Ok(key_hex) = std::env::var("CRM_BRIDGE_MASTER_KEY") {
        if let Ok(bytes) = hex::decode(key_hex) {
            if bytes.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                return key;
            }
        }
        tracing::warn!("CRM_BRIDGE_MASTER_KEY is set but not 32 hex-encoded bytes, using dev key");
    }
    *DEV_KEY
}

/// Encrypts a credential for storage: AES-256-GCM, random 96-bit nonce
/// prepended to the ciphertext, base64 over the lot.
pub fn encrypt(plaintext: &str) -> Result<String> {
    let key = master_key();
    let cipher = Aes256Gcm::new(&key.into());

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("encryption failure: {:?}", e))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend(ciphertext);

    Ok(BASE64.encode(combined))
}

pub fn decrypt(encrypted: &str) -> Result<String> {
    let key = master_key();
    let cipher = Aes256Gcm::new(&key.into());

    let decoded = BASE64.decode(encrypted)?;
    if decoded.len() < 12 {
        return Err(anyhow!("invalid encrypted credential length"));
    }

    let (nonce_bytes, ciphertext) = decoded.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("decryption failure: {:?}", e))?;

    Ok(String::from_utf8(plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let secret = "hunter2!";
        let blob = encrypt(secret).unwrap();
        assert_ne!(blob, secret);
        assert_eq!(decrypt(&blob).unwrap(), secret);
    }

    #[test]
    fn nonce_makes_blobs_unique() {
        let a = encrypt("same").unwrap();
        let b = encrypt("same").unwrap();
        assert_ne!(a, b);
    }
}

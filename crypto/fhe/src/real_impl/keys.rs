//! FHE Key Management with TFHE-rs
//!
//! - ClientKey: decrypts revealed totals (oracle only)
//! - ServerKey: homomorphic addition over contributions
//! - PublicKey: lets providers encrypt contributions

use std::cell::RefCell;

use rand::RngCore;
use tfhe::{generate_keys, ConfigBuilder};
use tfhe::{ClientKey as TfheClientKey, PublicKey as TfhePublicKey, ServerKey as TfheServerKey};

use crate::{FHEConfig, FHEError, FHEResult};

thread_local! {
    // TFHE-rs keeps the server key per thread; remember which key set is live here.
    static INSTALLED_KEY_SET: RefCell<Option<[u8; 32]>> = const { RefCell::new(None) };
}

fn build_config(config: &FHEConfig) -> tfhe::Config {
    if config.security_bits >= 128 {
        ConfigBuilder::default().build()
    } else {
        ConfigBuilder::default_with_small_encryption().build()
    }
}

/// Client key for decryption. Only the decryption oracle should hold it.
#[derive(Clone)]
pub struct ClientKey {
    pub(crate) inner: TfheClientKey,
    key_set_id: [u8; 32],
}

impl ClientKey {
    /// Get reference to inner TFHE key
    pub fn inner(&self) -> &TfheClientKey {
        &self.inner
    }

    /// Identifier of the key set this key belongs to
    pub fn key_set_id(&self) -> [u8; 32] {
        self.key_set_id
    }
}

impl std::fmt::Debug for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientKey")
            .field("key_set", &hex::encode(&self.key_set_id[..8]))
            .finish()
    }
}

/// Server key for homomorphic operations
#[derive(Clone)]
pub struct ServerKey {
    pub(crate) inner: TfheServerKey,
    key_set_id: [u8; 32],
}

impl ServerKey {
    /// Identifier of the key set this key belongs to
    pub fn key_set_id(&self) -> [u8; 32] {
        self.key_set_id
    }

    /// Install this key for the calling thread.
    ///
    /// Returns `true` when the key had to be (re)installed, `false` when it was
    /// already the live key on this thread.
    pub fn install(&self) -> bool {
        INSTALLED_KEY_SET.with(|installed| {
            let mut installed = installed.borrow_mut();
            if installed.as_ref() == Some(&self.key_set_id) {
                return false;
            }
            tfhe::set_server_key(self.inner.clone());
            *installed = Some(self.key_set_id);
            true
        })
    }

    /// Whether this key is the live server key on the calling thread
    pub fn is_installed(&self) -> bool {
        INSTALLED_KEY_SET.with(|installed| installed.borrow().as_ref() == Some(&self.key_set_id))
    }
}

impl std::fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKey")
            .field("key_set", &hex::encode(&self.key_set_id[..8]))
            .finish()
    }
}

/// Public key for encryption only
#[derive(Clone)]
pub struct PublicKey {
    pub(crate) inner: TfhePublicKey,
    key_set_id: [u8; 32],
}

impl PublicKey {
    /// Get reference to inner key
    pub fn inner(&self) -> &TfhePublicKey {
        &self.inner
    }

    /// Identifier of the key set this key belongs to
    pub fn key_set_id(&self) -> [u8; 32] {
        self.key_set_id
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_set", &hex::encode(&self.key_set_id[..8]))
            .finish()
    }
}

/// Complete key set for one pool deployment
#[derive(Clone)]
pub struct FheKeySet {
    /// Client key (secret, oracle side)
    pub client: ClientKey,
    /// Server key (accumulation side)
    pub server: ServerKey,
    /// Public key (handed to providers)
    pub public: PublicKey,
}

impl FheKeySet {
    /// Generate a new key set.
    ///
    /// Key generation is slow (seconds at the default parameters).
    pub fn generate(config: &FHEConfig) -> FHEResult<Self> {
        let (client_key, server_key) = generate_keys(build_config(config));
        let public_key = TfhePublicKey::new(&client_key);

        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        let mut hasher = blake3::Hasher::new();
        hasher.update(&config.digest());
        hasher.update(&nonce);
        let key_set_id = *hasher.finalize().as_bytes();

        Ok(Self {
            client: ClientKey {
                inner: client_key,
                key_set_id,
            },
            server: ServerKey {
                inner: server_key,
                key_set_id,
            },
            public: PublicKey {
                inner: public_key,
                key_set_id,
            },
        })
    }

    /// Identifier shared by all three keys
    pub fn id(&self) -> [u8; 32] {
        self.client.key_set_id
    }

    /// Check that all three keys come from the same generation
    pub fn verify_consistent(&self) -> FHEResult<()> {
        let id = self.client.key_set_id;
        if self.server.key_set_id != id || self.public.key_set_id != id {
            return Err(FHEError::KeyMismatch(
                "client, server and public keys belong to different key sets".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for FheKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FheKeySet")
            .field("id", &hex::encode(&self.id()[..8]))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_set_generation() {
        let keys = FheKeySet::generate(&FHEConfig::default()).unwrap();
        keys.verify_consistent().unwrap();
        assert_eq!(keys.server.key_set_id(), keys.id());
    }

    #[test]
    fn test_install_is_sticky_per_thread() {
        let keys = FheKeySet::generate(&FHEConfig::default()).unwrap();
        assert!(keys.server.install());
        assert!(keys.server.is_installed());
        assert!(!keys.server.install());

        let handle = {
            let server = keys.server.clone();
            std::thread::spawn(move || server.is_installed())
        };
        assert!(!handle.join().unwrap());
    }
}

//! Join secret generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::distributions::Uniform;
use rand::{Rng, RngCore};
use secrecy::SecretString;

use crate::models::credential::CredentialKind;

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Mint a fresh secret suitable for the given credential kind.
///
/// Cluster join tokens use the bootstrap token shape
/// (`[a-z0-9]{6}.[a-z0-9]{16}`) that `kubeadm token create` and
/// `k3s token create` require. Other kinds get 32 random bytes encoded as
/// URL-safe base64.
pub fn generate_secret(kind: CredentialKind) -> SecretString {
    match kind {
        CredentialKind::ClusterJoin => {
            let id = random_token_chars(6);
            let secret = random_token_chars(16);
            SecretString::from(format!("{}.{}", id, secret))
        }
        CredentialKind::SwarmWorker | CredentialKind::SwarmManager => {
            let mut raw = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut raw);
            SecretString::from(URL_SAFE_NO_PAD.encode(raw))
        }
    }
}

fn random_token_chars(len: usize) -> String {
    let dist = Uniform::from(0..TOKEN_ALPHABET.len());
    rand::thread_rng()
        .sample_iter(dist)
        .take(len)
        .map(|i| TOKEN_ALPHABET[i] as char)
        .collect()
}

/// Whether `token` has the kubeadm bootstrap token shape
pub fn is_bootstrap_token(token: &str) -> bool {
    let valid = |part: &str, len: usize| {
        part.len() == len
            && part
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    };
    match token.split_once('.') {
        Some((id, secret)) => valid(id, 6) && valid(secret, 16),
        None => false,
    }
}

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac as _};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey as _;
use rsa::signature::{SignatureEncoding as _, Signer as _};
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::Error;
use crate::{Result, Timestamp};

/// Default tolerance, in milliseconds, the server applies to signed REST timestamps.
pub const DEFAULT_RECV_WINDOW: u64 = 5000;

/// Prefix of the WebSocket login preimage. The expiry timestamp is appended to it.
const WS_AUTH_PREFIX: &str = "GET/realtime";

/// Signature algorithm family used to authenticate.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SignStyle {
    /// HMAC-SHA256 over a shared secret, hex encoded
    Hmac,
    /// RSASSA-PKCS1-v1_5 with SHA-256 over an RSA private key, base64 encoded
    Rsa,
}

impl FromStr for SignStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HMAC" => Ok(Self::Hmac),
            "RSA" => Ok(Self::Rsa),
            other => Err(Error::configuration(format!(
                "invalid sign style `{other}`, must be HMAC or RSA"
            ))),
        }
    }
}

#[derive(Clone)]
enum Secret {
    Shared(SecretString),
    PrivateKey(SigningKey<Sha256>),
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared(_) => f.write_str("Shared([REDACTED])"),
            Self::PrivateKey(_) => f.write_str("PrivateKey([REDACTED])"),
        }
    }
}

/// API key plus the secret material used to sign WebSocket logins and REST requests.
///
/// The secret is either a shared secret ([`SignStyle::Hmac`]) or an RSA private key
/// ([`SignStyle::Rsa`]). Neither is ever printed by the [`fmt::Debug`] implementation.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub(crate) key: String,
    secret: Secret,
}

impl Credentials {
    /// Credentials signing with HMAC-SHA256 over `secret`.
    pub fn hmac<K: Into<String>, S: Into<String>>(key: K, secret: S) -> Result<Self> {
        let key = non_empty_key(key.into())?;
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::configuration("api_secret must not be empty"));
        }

        Ok(Self {
            key,
            secret: Secret::Shared(SecretString::from(secret)),
        })
    }

    /// Credentials signing with an already decoded RSA private key.
    pub fn rsa<K: Into<String>>(key: K, private_key: RsaPrivateKey) -> Result<Self> {
        Ok(Self {
            key: non_empty_key(key.into())?,
            secret: Secret::PrivateKey(SigningKey::<Sha256>::new(private_key)),
        })
    }

    /// Credentials signing with an RSA private key read from a PEM file.
    ///
    /// PKCS#8 (`BEGIN PRIVATE KEY`), PKCS#1 (`BEGIN RSA PRIVATE KEY`) and, when `passphrase` is
    /// given, encrypted PKCS#8 (`BEGIN ENCRYPTED PRIVATE KEY`) are accepted.
    pub fn rsa_from_pem_file<K: Into<String>, P: AsRef<Path>>(
        key: K,
        path: P,
        passphrase: Option<&SecretString>,
    ) -> Result<Self> {
        let key = non_empty_key(key.into())?;
        let pem = std::fs::read_to_string(path)?;

        Self::rsa(key, decode_private_key(&pem, passphrase)?)
    }

    /// Builds credentials from loosely typed parts. For [`SignStyle::Rsa`] the `secret` is the path
    /// of the PEM file holding the private key.
    pub fn from_parts<K: Into<String>>(
        key: K,
        secret: &str,
        sign_style: SignStyle,
        passphrase: Option<&SecretString>,
    ) -> Result<Self> {
        match sign_style {
            SignStyle::Hmac => Self::hmac(key, secret),
            SignStyle::Rsa => Self::rsa_from_pem_file(key, secret, passphrase),
        }
    }

    /// Returns the API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn sign_style(&self) -> SignStyle {
        match self.secret {
            Secret::Shared(_) => SignStyle::Hmac,
            Secret::PrivateKey(_) => SignStyle::Rsa,
        }
    }

    /// Signs `message` with the configured algorithm.
    pub fn sign(&self, message: &str) -> Result<String> {
        match &self.secret {
            Secret::Shared(secret) => hmac(secret, message),
            Secret::PrivateKey(signing_key) => {
                let signature = signing_key.try_sign(message.as_bytes())?;
                Ok(STANDARD.encode(signature.to_bytes()))
            }
        }
    }

    /// Signature for the private stream login, valid until `expires` (milliseconds).
    pub fn sign_websocket(&self, expires: Timestamp) -> Result<String> {
        self.sign(&format!("{WS_AUTH_PREFIX}{expires}"))
    }

    /// Signature for a REST request. `params` is the canonical query string for `GET` requests
    /// and the JSON body otherwise.
    pub fn sign_rest(&self, timestamp: Timestamp, recv_window: u64, params: &str) -> Result<String> {
        let key = &self.key;
        self.sign(&format!("{timestamp}{key}{recv_window}{params}"))
    }
}

fn non_empty_key(key: String) -> Result<String> {
    if key.is_empty() {
        return Err(Error::configuration("api_key must not be empty"));
    }
    Ok(key)
}

fn decode_private_key(pem: &str, passphrase: Option<&SecretString>) -> Result<RsaPrivateKey> {
    if let Some(passphrase) = passphrase {
        return Ok(RsaPrivateKey::from_pkcs8_encrypted_pem(
            pem,
            passphrase.expose_secret().as_bytes(),
        )?);
    }

    if pem.contains("BEGIN RSA PRIVATE KEY") {
        Ok(RsaPrivateKey::from_pkcs1_pem(pem)?)
    } else {
        Ok(RsaPrivateKey::from_pkcs8_pem(pem)?)
    }
}

fn hmac(secret: &SecretString, message: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())?;
    mac.update(message.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

//! Secure credential storage via the device keystore and GPG.
//!
//! Credentials never live on disk in the clear. A signing key held in the
//! hardware-backed device keystore (non-exportable, accessed through the
//! `termux-keystore` tool) signs a fixed message; the SHA-256 of that
//! signature becomes a deterministic passphrase which symmetrically
//! encrypts a JSON secrets file with GPG. The private key never leaves the
//! keystore, keeping the encryption key separate from the encrypted data.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Fixed message for key derivation. Changing this invalidates all
/// previously encrypted secrets.
const DERIVATION_MESSAGE: &[u8] = b"satchel-derive-secrets-v1";

/// Signing algorithm (RSA with SHA-512 for wide device compatibility).
const SIGN_ALGORITHM: &str = "SHA512withRSA";

/// Secret name for the object-store key id.
const SECRET_KEY_ID: &str = "key_id";

/// Secret name for the object-store application key.
const SECRET_APP_KEY: &str = "app_key";

/// Errors when accessing the keystore or the encrypted secrets file.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// An external command exited unsuccessfully.
    #[error("command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    /// An external command could not be started.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// Running an external command failed with an I/O error.
    #[error("command I/O: {0}")]
    Io(#[from] std::io::Error),

    /// A key with this alias already exists.
    #[error("key '{0}' already exists")]
    KeyExists(String),

    /// The encrypted secrets file does not exist.
    #[error("secrets file not found: {0}")]
    SecretsNotFound(std::path::PathBuf),

    /// The decrypted payload is not the expected JSON document.
    #[error("invalid secrets file format: {0}")]
    InvalidSecrets(#[from] serde_json::Error),

    /// A required secret is missing from the payload.
    #[error("missing '{0}' in secrets file")]
    MissingSecret(&'static str),
}

/// Object-store credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub key_id: String,
    pub app_key: String,
}

fn run_command(program: &str, args: &[&str], input: Option<&[u8]>) -> Result<Vec<u8>, KeystoreError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program, ?args, "running keystore command");

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KeystoreError::CommandNotFound(program.to_string())
        } else {
            KeystoreError::Io(e)
        }
    })?;

    if let Some(data) = input
        && let Some(mut stdin) = child.stdin.take()
    {
        use std::io::Write;
        stdin.write_all(data)?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(KeystoreError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output.stdout)
}

/// Whether a signing key with this alias exists in the keystore.
pub fn key_exists(alias: &str) -> bool {
    match run_command("termux-keystore", &["list"], None) {
        Ok(output) => String::from_utf8_lossy(&output).contains(alias),
        Err(_) => false,
    }
}

/// Generate a new non-exportable signing key in the device keystore.
pub fn generate_key(alias: &str) -> Result<(), KeystoreError> {
    if key_exists(alias) {
        return Err(KeystoreError::KeyExists(alias.to_string()));
    }

    run_command(
        "termux-keystore",
        &["generate", alias, "-a", "RSA", "-s", "4096"],
        None,
    )?;
    Ok(())
}

/// Delete a signing key from the keystore.
pub fn delete_key(alias: &str) -> Result<(), KeystoreError> {
    run_command("termux-keystore", &["delete", alias], None)?;
    Ok(())
}

/// Derive the secrets passphrase by signing the fixed derivation message.
///
/// The signature is hashed with SHA-256 for a uniformly distributed
/// 256-bit secret, returned hex-encoded.
pub fn derive_passphrase(alias: &str) -> Result<String, KeystoreError> {
    let signature = run_command(
        "termux-keystore",
        &["sign", alias, SIGN_ALGORITHM],
        Some(DERIVATION_MESSAGE),
    )?;

    Ok(passphrase_from_signature(&signature))
}

fn passphrase_from_signature(signature: &[u8]) -> String {
    hex::encode(Sha256::digest(signature))
}

/// Encrypt secrets to a GPG file using the derived passphrase.
pub fn encrypt_secrets(
    secrets: &BTreeMap<String, String>,
    output_path: &Path,
    alias: &str,
) -> Result<(), KeystoreError> {
    let passphrase = derive_passphrase(alias)?;
    let plaintext = serde_json::to_vec_pretty(secrets)?;

    // GPG reads the passphrase from fd 0 first, then the plaintext.
    let mut input = passphrase.into_bytes();
    input.push(b'\n');
    input.extend_from_slice(&plaintext);

    let output_arg = output_path.to_string_lossy();
    run_command(
        "gpg",
        &[
            "--batch",
            "--yes",
            "--symmetric",
            "--cipher-algo",
            "AES256",
            "--passphrase-fd",
            "0",
            "--output",
            output_arg.as_ref(),
        ],
        Some(&input),
    )?;
    Ok(())
}

/// Decrypt the secrets file using the derived passphrase.
pub fn decrypt_secrets(
    secrets_path: &Path,
    alias: &str,
) -> Result<BTreeMap<String, String>, KeystoreError> {
    if !secrets_path.exists() {
        return Err(KeystoreError::SecretsNotFound(secrets_path.to_path_buf()));
    }

    let passphrase = derive_passphrase(alias)?;
    let mut input = passphrase.into_bytes();
    input.push(b'\n');

    let path_arg = secrets_path.to_string_lossy();
    let plaintext = run_command(
        "gpg",
        &[
            "--batch",
            "--quiet",
            "--decrypt",
            "--passphrase-fd",
            "0",
            path_arg.as_ref(),
        ],
        Some(&input),
    )?;

    parse_secrets(&plaintext)
}

fn parse_secrets(plaintext: &[u8]) -> Result<BTreeMap<String, String>, KeystoreError> {
    Ok(serde_json::from_slice(plaintext)?)
}

/// Retrieve typed object-store credentials from the encrypted secrets file.
pub fn credentials(secrets_path: &Path, alias: &str) -> Result<StorageCredentials, KeystoreError> {
    let secrets = decrypt_secrets(secrets_path, alias)?;
    credentials_from_secrets(&secrets)
}

fn credentials_from_secrets(
    secrets: &BTreeMap<String, String>,
) -> Result<StorageCredentials, KeystoreError> {
    let key_id = secrets
        .get(SECRET_KEY_ID)
        .ok_or(KeystoreError::MissingSecret(SECRET_KEY_ID))?;
    let app_key = secrets
        .get(SECRET_APP_KEY)
        .ok_or(KeystoreError::MissingSecret(SECRET_APP_KEY))?;

    Ok(StorageCredentials {
        key_id: key_id.clone(),
        app_key: app_key.clone(),
    })
}

/// Build the secrets payload for [`encrypt_secrets`].
pub fn secrets_payload(key_id: &str, app_key: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (SECRET_KEY_ID.to_string(), key_id.to_string()),
        (SECRET_APP_KEY.to_string(), app_key.to_string()),
    ])
}

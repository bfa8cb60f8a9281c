//! Document Registry Command Line Interface
//!
//! Derives fingerprints locally, signs registration and transfer requests
//! with a local Ed25519 key, and talks to a node over its HTTP API.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docreg_crypto::{derive, registration_digest, sign_digest_hex, transfer_digest, KeyPair};
use docreg_rpc::{RegisterRequest, SignedEnvelope, TransferRequest};
use docreg_time::{Clock, SystemClock};
use docreg_types::{AccountId, Fingerprint};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docreg-cli")]
#[command(about = "Document Registry Command Line Interface", long_about = None)]
#[command(version)]
struct Cli {
    /// RPC endpoint URL
    #[arg(long, alias = "rpc", default_value = "http://localhost:8080")]
    rpc_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a signing key; its public key is your account id
    Keygen {
        /// Where to write the hex-encoded secret key
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },
    /// Derive a fingerprint for a file without registering it
    Fingerprint {
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
        #[arg(long)]
        metadata: String,
    },
    /// Register a document under the key's account
    Register(RegisterCommand),
    /// Look up the owner of a fingerprint
    Verify {
        /// Fingerprint (64 hex characters)
        fingerprint: String,
    },
    /// List registered documents, oldest first
    List {
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List documents owned by an account
    Owned {
        /// Account id (0x-prefixed hex)
        owner: String,
    },
    /// Transfer a document you own to another account
    Transfer {
        /// Path to the owner's secret key file
        #[arg(long, value_name = "PATH")]
        key_file: PathBuf,
        fingerprint: String,
        new_owner: String,
    },
}

#[derive(Args)]
struct RegisterCommand {
    /// Path to the signing key file (see `keygen`)
    #[arg(long, value_name = "PATH")]
    key_file: PathBuf,
    /// Human-readable description of the document
    #[arg(long)]
    metadata: String,
    /// Off-registry location of the content (e.g. an IPFS CID)
    #[arg(long, default_value = "")]
    storage_pointer: String,
    /// Derive the fingerprint from this file with a fresh nonce
    #[arg(
        long,
        value_name = "PATH",
        conflicts_with = "fingerprint",
        required_unless_present = "fingerprint"
    )]
    file: Option<PathBuf>,
    /// Register a fingerprint derived elsewhere
    #[arg(long)]
    fingerprint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let rpc_url = cli.rpc_url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Keygen { out, force } => handle_keygen(&out, force),
        Commands::Fingerprint { file, metadata } => handle_fingerprint(&file, &metadata),
        Commands::Register(cmd) => handle_register(cmd, &rpc_url).await,
        Commands::Verify { fingerprint } => {
            let fingerprint = parse_fingerprint(&fingerprint)?;
            get_and_print(&format!("{rpc_url}/documents/{fingerprint}")).await
        }
        Commands::List { offset, limit } => {
            let mut url = format!("{rpc_url}/documents");
            let query: Vec<String> = [("offset", offset), ("limit", limit)]
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| format!("{name}={v}")))
                .collect();
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query.join("&"));
            }
            get_and_print(&url).await
        }
        Commands::Owned { owner } => {
            let owner = AccountId::from_hex(&owner).context("invalid owner account id")?;
            get_and_print(&format!("{rpc_url}/owners/{owner}/documents")).await
        }
        Commands::Transfer {
            key_file,
            fingerprint,
            new_owner,
        } => handle_transfer(&key_file, &fingerprint, &new_owner, &rpc_url).await,
    }
}

fn parse_fingerprint(value: &str) -> Result<Fingerprint> {
    Fingerprint::from_hex(value).with_context(|| format!("invalid fingerprint {value:?}"))
}

fn load_key(path: &Path) -> Result<KeyPair> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    KeyPair::from_secret_hex(&contents)
        .with_context(|| format!("invalid key file {}", path.display()))
}

fn handle_keygen(out: &Path, force: bool) -> Result<()> {
    let key = KeyPair::generate();

    let mut options = fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options.open(out).with_context(|| {
        format!(
            "failed to create key file {} (use --force to overwrite)",
            out.display()
        )
    })?;
    writeln!(file, "{}", key.secret_hex())
        .with_context(|| format!("failed to write key file {}", out.display()))?;

    println!("Key written to {}", out.display());
    println!("Account: {}", key.account_id());
    Ok(())
}

fn handle_fingerprint(file: &Path, metadata: &str) -> Result<()> {
    let document =
        fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let derived = derive(&document, metadata);
    println!("Fingerprint: {}", derived.fingerprint);
    println!("Nonce: {}", derived.nonce);
    Ok(())
}

fn build_register_request(
    key: &KeyPair,
    fingerprint: Fingerprint,
    metadata: String,
    storage_pointer: String,
    issued_at: u64,
) -> RegisterRequest {
    let digest = registration_digest(&fingerprint, &metadata, &storage_pointer, issued_at);
    RegisterRequest {
        fingerprint: fingerprint.to_hex(),
        metadata,
        storage_pointer,
        auth: SignedEnvelope {
            caller: key.account_id().to_hex(),
            issued_at,
            signature: sign_digest_hex(key, &digest),
        },
    }
}

fn build_transfer_request(
    key: &KeyPair,
    fingerprint: &Fingerprint,
    new_owner: &AccountId,
    issued_at: u64,
) -> TransferRequest {
    let digest = transfer_digest(fingerprint, new_owner, issued_at);
    TransferRequest {
        new_owner: new_owner.to_hex(),
        auth: SignedEnvelope {
            caller: key.account_id().to_hex(),
            issued_at,
            signature: sign_digest_hex(key, &digest),
        },
    }
}

async fn handle_register(cmd: RegisterCommand, rpc_url: &str) -> Result<()> {
    let RegisterCommand {
        key_file,
        metadata,
        storage_pointer,
        file,
        fingerprint,
    } = cmd;

    let key = load_key(&key_file)?;

    let fingerprint = match (file, fingerprint) {
        (Some(path), _) => {
            let document =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let derived = derive(&document, &metadata);
            println!("Derived fingerprint {} (nonce {})", derived.fingerprint, derived.nonce);
            derived.fingerprint
        }
        (None, Some(hex)) => parse_fingerprint(&hex)?,
        (None, None) => anyhow::bail!("either --file or --fingerprint must be provided"),
    };

    let issued_at = SystemClock::new().now();
    let request = build_register_request(&key, fingerprint, metadata, storage_pointer, issued_at);
    debug!(%fingerprint, issued_at, "submitting registration");

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{rpc_url}/documents"))
        .json(&request)
        .send()
        .await?;

    print_outcome(response, "registration").await
}

async fn handle_transfer(
    key_file: &Path,
    fingerprint: &str,
    new_owner: &str,
    rpc_url: &str,
) -> Result<()> {
    let key = load_key(key_file)?;
    let fingerprint = parse_fingerprint(fingerprint)?;
    let new_owner = AccountId::from_hex(new_owner).context("invalid new owner account id")?;

    let issued_at = SystemClock::new().now();
    let request = build_transfer_request(&key, &fingerprint, &new_owner, issued_at);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{rpc_url}/documents/{fingerprint}/transfer"))
        .json(&request)
        .send()
        .await?;

    print_outcome(response, "transfer").await
}

async fn get_and_print(url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client.get(url).send().await?;
    print_outcome(response, "request").await
}

async fn print_outcome(response: reqwest::Response, action: &str) -> Result<()> {
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("failed to read {action} response body"))?;
    let body = render_body(&text);

    if status.is_success() {
        println!("{body}");
        Ok(())
    } else {
        anyhow::bail!("{action} rejected (status {status}): {body}")
    }
}

/// Pretty-print JSON bodies; anything else is shown as sent.
fn render_body(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use docreg_crypto::{decode_signature, verify_signature};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn register_requires_file_or_fingerprint() {
        let parsed = Cli::try_parse_from([
            "docreg-cli",
            "register",
            "--key-file",
            "k.hex",
            "--metadata",
            "deed",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "docreg-cli",
            "register",
            "--key-file",
            "k.hex",
            "--metadata",
            "deed",
            "--file",
            "a.pdf",
            "--fingerprint",
            "00",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn register_request_signature_verifies() {
        let key = KeyPair::from_secret_bytes(&[5u8; 32]);
        let fingerprint = Fingerprint::from_bytes([0xAA; 32]);
        let request =
            build_register_request(&key, fingerprint, "passport".into(), "Qm123".into(), 77);

        let digest = registration_digest(&fingerprint, "passport", "Qm123", 77);
        let signature = decode_signature(&request.auth.signature).unwrap();
        assert!(verify_signature(&key.account_id(), &digest, &signature).is_ok());
        assert_eq!(request.auth.caller, key.account_id().to_hex());
    }

    #[test]
    fn transfer_request_body_is_flat_json() {
        let key = KeyPair::from_secret_bytes(&[5u8; 32]);
        let request = build_transfer_request(
            &key,
            &Fingerprint::from_bytes([1; 32]),
            &AccountId::from_bytes([2; 32]),
            9,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["issued_at"], 9);
        assert_eq!(json["new_owner"], AccountId::from_bytes([2; 32]).to_hex());
        assert!(json.get("auth").is_none());
    }

    #[test]
    fn non_json_error_body_is_shown_verbatim() {
        assert_eq!(
            render_body("length limit exceeded\n"),
            "length limit exceeded"
        );
        assert_eq!(render_body(""), "");

        let rendered = render_body(r#"{"error":"not_found","message":"no record"}"#);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["error"], "not_found");
        assert!(rendered.contains('\n'));
    }

    #[test]
    fn keygen_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.hex");

        handle_keygen(&path, false).unwrap();
        let first = load_key(&path).unwrap();
        assert!(handle_keygen(&path, false).is_err());
        assert_eq!(load_key(&path).unwrap().account_id(), first.account_id());

        handle_keygen(&path, true).unwrap();
        assert_ne!(load_key(&path).unwrap().account_id(), first.account_id());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use vn_client::keyfile::{load_private_key, save_private_key};
use vn_client::paths::{blobs_dir, keys_dir, settings_path};
use vn_client::{ClientSettings, Messenger, ViewOutcome};
use vn_crypto::{Blob, KeyManager};
use vn_proto::{AutoDeleteMode, IdentityContext, MediaType, Opened};
use vn_store::{CleanupSweeper, FsBlobStore, KeyDirectory, SqliteStore};

#[derive(Parser)]
#[command(name = "vanish-cli")]
#[command(about = "End-to-end encrypted messages that disappear", long_about = None)]
struct Cli {
    /// Data directory (defaults to $VANISH_DATA_DIR, then the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair for an identity and publish its public key
    Keygen {
        identity: String,
        /// Replace an existing key (messages sealed for the old one become unreadable)
        #[arg(long)]
        force: bool,
    },

    /// Send a text message
    Send {
        #[arg(long = "as")]
        identity: String,
        to: String,
        text: String,
        /// Auto-delete mode: none, view, 1m_view, 1h_view, 3h_view, 1m, 3h
        #[arg(long)]
        mode: Option<AutoDeleteMode>,
    },

    /// Send an image, snapshot or video
    SendMedia {
        #[arg(long = "as")]
        identity: String,
        to: String,
        file: PathBuf,
        #[arg(long, default_value = "image")]
        kind: MediaType,
        #[arg(long, default_value = "")]
        caption: String,
        #[arg(long)]
        mode: Option<AutoDeleteMode>,
    },

    /// Print a conversation
    Read {
        #[arg(long = "as")]
        identity: String,
        peer: String,
    },

    /// Open one message (counts as a view for its receiver)
    Open {
        #[arg(long = "as")]
        identity: String,
        id: String,
        /// Where to write decrypted media
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Keep a message out of the cleanup sweep
    Save {
        #[arg(long = "as")]
        identity: String,
        id: String,
        #[arg(long)]
        unsave: bool,
    },

    /// Delete messages whose lifecycle has completed
    Sweep {
        /// Keep sweeping every `sweep_interval_secs` until interrupted
        #[arg(long)]
        watch: bool,
    },
}

struct Env {
    data_dir: PathBuf,
    settings: ClientSettings,
    store: Arc<SqliteStore>,
}

impl Env {
    async fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => vn_client::paths::data_dir()?,
        };
        let settings = ClientSettings::load(&settings_path(&data_dir))?.with_env()?;
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating {}", data_dir.display()))?;
        let store = Arc::new(SqliteStore::open(&settings.db_path(&data_dir)).await?);
        Ok(Self { data_dir, settings, store })
    }

    fn messenger(&self, identity: &str) -> Result<Messenger> {
        let private_key = load_private_key(&keys_dir(&self.data_dir), identity)?
            .ok_or_else(|| anyhow!("no key for {identity}; run `vanish-cli keygen {identity}` first"))?;
        Ok(Messenger::new(
            IdentityContext::new(identity, private_key),
            self.store.clone(),
            self.store.clone(),
            Arc::new(FsBlobStore::new(blobs_dir(&self.data_dir))),
            self.settings.clone(),
        ))
    }
}

fn print(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn opened_json<T>(opened: &Opened<T>, render: impl Fn(&T) -> serde_json::Value) -> serde_json::Value {
    match opened {
        Opened::Plain(value) => render(value),
        Opened::Unavailable(reason) => json!({ "unavailable": reason.to_string() }),
    }
}

fn write_media(out: &Path, blob: &Blob) -> Result<serde_json::Value> {
    std::fs::write(out, &blob.bytes).with_context(|| format!("writing {}", out.display()))?;
    Ok(json!({ "path": out.display().to_string(), "mime_type": blob.mime_type, "bytes": blob.bytes.len() }))
}

async fn keygen(env: &Env, identity: &str, force: bool) -> Result<()> {
    let keys = keys_dir(&env.data_dir);
    if !force && load_private_key(&keys, identity)?.is_some() {
        bail!("{identity} already has a key; pass --force to replace it");
    }
    let manager = KeyManager::new(env.settings.modulus_bits)?;
    tracing::info!(identity, bits = manager.modulus_bits(), "generating key pair");
    let pair = manager.generate_key_pair_async().await?;
    let path = save_private_key(&keys, identity, &pair.private_key)?;
    env.store
        .publish(identity, &KeyManager::export_public_key(&pair.public_key)?)
        .await?;
    print(json!({ "identity": identity, "private_key": path.display().to_string() }))
}

async fn sweep(env: &Env, watch: bool) -> Result<()> {
    let sweeper = CleanupSweeper::new(env.settings.sweep_batch_size);
    let blobs = FsBlobStore::new(blobs_dir(&env.data_dir));
    if !watch {
        let report = sweeper.sweep(env.store.as_ref(), chrono::Utc::now()).await?;
        let blobs_removed = sweeper.purge_blobs(&blobs, &report).await;
        return print(json!({
            "scanned": report.scanned,
            "selected": report.selected,
            "deleted": report.deleted,
            "blobs_removed": blobs_removed,
        }));
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(env.settings.sweep_interval_secs.max(1)));
    tracing::info!(interval_secs = env.settings.sweep_interval_secs, "sweeping until interrupted");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweeper.sweep(env.store.as_ref(), chrono::Utc::now()).await {
                    Ok(report) => {
                        sweeper.purge_blobs(&blobs, &report).await;
                    }
                    Err(e) => tracing::warn!(error = %e, "sweep failed; retrying next tick"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; stopping sweeper");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vanish_cli=info,vn_client=info,vn_store=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env = Env::open(cli.data_dir).await?;

    match cli.command {
        Commands::Keygen { identity, force } => keygen(&env, &identity, force).await?,

        Commands::Send { identity, to, text, mode } => {
            let record = env.messenger(&identity)?.send_text(&to, &text, mode).await?;
            print(json!({ "id": record.id, "expires_at": record.lifecycle.expires_at }))?;
        }

        Commands::SendMedia { identity, to, file, kind, caption, mode } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let mime_type = kind.mime_type().unwrap_or("application/octet-stream");
            let record = env
                .messenger(&identity)?
                .send_media(&to, &caption, &Blob::new(bytes, mime_type), kind, mode)
                .await?;
            print(json!({ "id": record.id, "media_url": record.body.media_url() }))?;
        }

        Commands::Read { identity, peer } => {
            let entries = env.messenger(&identity)?.load_conversation(&peer).await?;
            let rows: Vec<_> = entries
                .iter()
                .map(|e| {
                    json!({
                        "id": e.record.id,
                        "from": e.record.sender_id,
                        "media_type": e.record.media_type(),
                        "text": e.display_text(),
                        "state": e.record.lifecycle.state(),
                        "expires_at": e.record.lifecycle.expires_at,
                        "saved": e.record.lifecycle.is_saved(),
                    })
                })
                .collect();
            print(json!(rows))?;
        }

        Commands::Open { identity, id, out } => match env.messenger(&identity)?.open_message(&id).await? {
            ViewOutcome::Blocked { record } => {
                print(json!({ "id": record.id, "blocked": true, "view_count": record.lifecycle.view_count }))?
            }
            ViewOutcome::Displayed { record, text, media } => {
                let media = match (media, out.as_deref()) {
                    (Some(opened), Some(out)) => match opened {
                        Opened::Plain(blob) => write_media(out, &blob)?,
                        unavailable => opened_json(&unavailable, |_| serde_json::Value::Null),
                    },
                    (Some(opened), None) => {
                        opened_json(&opened, |blob| json!({ "mime_type": blob.mime_type, "bytes": blob.bytes.len() }))
                    }
                    (None, _) => serde_json::Value::Null,
                };
                print(json!({
                    "id": record.id,
                    "text": text.display_text(),
                    "media": media,
                    "state": record.lifecycle.state(),
                    "expires_at": record.lifecycle.expires_at,
                }))?
            }
        },

        Commands::Save { identity, id, unsave } => {
            env.messenger(&identity)?.set_saved(&id, !unsave).await?;
            print(json!({ "id": id, "saved": !unsave }))?;
        }

        Commands::Sweep { watch } => sweep(&env, watch).await?,
    }

    Ok(())
}

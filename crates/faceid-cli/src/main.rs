use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[zbus::proxy(
    interface = "org.faceid.Recognition1",
    default_service = "org.faceid.Recognition1",
    default_path = "/org/faceid/Recognition1"
)]
trait Recognition {
    fn authenticate(&self, image: &[u8]) -> zbus::Result<String>;
    fn enroll(&self, image: &[u8], user_id: &str, name: &str, role: &str) -> zbus::Result<String>;
    fn list_identities(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "faceid", about = "faceid face recognition CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the single face in an image
    Enroll {
        /// Image file containing exactly one face
        #[arg(short, long)]
        image: PathBuf,
        /// Unique identifier for the new identity
        #[arg(short, long)]
        user_id: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Role label (defaults to "user")
        #[arg(short, long, default_value = "")]
        role: String,
    },
    /// Identify the largest face in an image
    Authenticate {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = RecognitionProxy::new(&connection)
        .await
        .context("failed to reach faceidd; is the daemon running?")?;

    let (reply, ok_field) = match cli.command {
        Commands::Enroll {
            image,
            user_id,
            name,
            role,
        } => {
            let bytes = read_image(&image)?;
            tracing::debug!(path = %image.display(), bytes = bytes.len(), "sending enroll");
            let reply = proxy
                .enroll(&bytes, &user_id, &name, &role)
                .await
                .context("Enroll call failed")?;
            (reply, Some("success"))
        }
        Commands::Authenticate { image } => {
            let bytes = read_image(&image)?;
            tracing::debug!(path = %image.display(), bytes = bytes.len(), "sending authenticate");
            let reply = proxy
                .authenticate(&bytes)
                .await
                .context("Authenticate call failed")?;
            (reply, Some("authenticated"))
        }
        Commands::List => (
            proxy
                .list_identities()
                .await
                .context("ListIdentities call failed")?,
            None,
        ),
        Commands::Status => (
            proxy.status().await.context("Status call failed")?,
            None,
        ),
    };

    let json: Value = serde_json::from_str(&reply).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&json)?);

    Ok(if succeeded(&json, ok_field) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Read an image file, refusing anything that is not a recognizable format.
fn read_image(path: &Path) -> Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if image::guess_format(&bytes).is_err() {
        bail!("{} is not a supported image file", path.display());
    }
    Ok(bytes)
}

/// False when the named boolean field is not `true`.
fn succeeded(reply: &Value, ok_field: Option<&str>) -> bool {
    match ok_field {
        Some(field) => reply[field] == Value::Bool(true),
        None => true,
    }
}

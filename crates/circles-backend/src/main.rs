use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use circles_backend::{Backend, BackendConfig, TokenSession};
use circles_client::{ChatRoom, ClientConfig, ClientContext, Notifier, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("circles=debug");

    // Config
    let backend_config = BackendConfig::from_env()?;
    let client_config = ClientConfig::from_env()?;
    let circle_name = std::env::args().nth(1).unwrap_or_else(|| "General".into());

    // Store and session
    let backend = Backend::open(&backend_config)?;
    let session = Arc::new(TokenSession::new(backend_config.jwt_secret.clone()));
    if let Ok(token) = std::env::var("CIRCLES_SESSION_TOKEN") {
        let user_id = session.sign_in(&token)?;
        if let Some(username) = session.username() {
            backend.upsert_profile(user_id, &username).await?;
        }
    }

    let (notifier, mut notices) = Notifier::channel();
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            info!("[{:?}] {}: {}", notice.level, notice.title, notice.description);
        }
    });

    let ctx = ClientContext::from_config(
        &client_config,
        Arc::new(backend.clone()),
        backend.dispatcher().clone(),
        session,
        notifier,
    )?;

    let circle_id = backend.ensure_circle(&circle_name).await?;
    let mut room = ChatRoom::open(ctx, circle_id).await?;
    for message in room.messages() {
        info!(
            "{}: {}",
            message.username.as_deref().unwrap_or("someone"),
            message.content
        );
    }
    info!(
        "Chatting in '{}' from {}; one message per line",
        circle_name,
        backend_config.db_path.display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Err(e) = room.send(&line).await {
            warn!("Message not sent: {}", e);
        }
        room.pump();
    }

    room.close();
    Ok(())
}

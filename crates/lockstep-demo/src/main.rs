//! Lockstep demo: a moderator session driving simulated remote parties.

use lockstep_core::level::{CompletionLevel, EngineLevel};
use lockstep_core::roster::PartyId;
use lockstep_session::application::command_handlers::handle_apply_notification;
use lockstep_session::application::query_handlers::{get_plan_summary, get_session_view};
use lockstep_session::domain::commands::ApplyNotification;
use lockstep_session::{Game, SessionConfig};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod error;
mod party;
mod plan;

use error::DemoError;
use party::{BroadcastTransport, LogStore};
use plan::Tally;

#[tokio::main]
async fn main() -> Result<(), DemoError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Lockstep demo");

    // Read configuration from environment.
    let config = SessionConfig::from_env()?;
    let parties: usize = std::env::var("LOCKSTEP_REMOTE_PARTIES")
        .unwrap_or_else(|_| "2".to_string())
        .parse()
        .map_err(|e| DemoError::Config(format!("LOCKSTEP_REMOTE_PARTIES must be a count: {e}")))?;
    let rounds: u32 = std::env::var("LOCKSTEP_ROUNDS")
        .unwrap_or_else(|_| "2".to_string())
        .parse()
        .map_err(|e| DemoError::Config(format!("LOCKSTEP_ROUNDS must be a count: {e}")))?;

    let plan = plan::sample_plan(rounds)?;

    // Wire the moderator to the simulated parties.
    let (outbound, _) = broadcast::channel(256);
    let (inbound_tx, mut inbound) = mpsc::channel(256);
    let mut game = Game::builder(plan, Tally::default())
        .config(config)
        .transport(BroadcastTransport(outbound.clone()))
        .store(LogStore)
        .build();

    tracing::info!(
        summary = %serde_json::to_string(&get_plan_summary(&game))?,
        "plan built"
    );

    let mut tasks = Vec::with_capacity(parties);
    for _ in 0..parties {
        let party = PartyId::random();
        game.roster_mut().join(party);
        tasks.push(tokio::spawn(party::run_party(
            party,
            outbound.subscribe(),
            inbound_tx.clone(),
        )));
    }
    drop(inbound_tx);

    game.start()?;
    while game.engine_level() == EngineLevel::Running {
        if game.completion() == CompletionLevel::Playing {
            game.mark_done()?;
            continue;
        }
        let Some(notification) = inbound.recv().await else {
            tracing::warn!("all parties left before game over");
            break;
        };
        let command = ApplyNotification {
            correlation_id: Uuid::new_v4(),
            notification,
        };
        handle_apply_notification(&command, &mut game)?;
    }

    let view = get_session_view(&game);
    tracing::info!(
        view = %serde_json::to_string(&view)?,
        rounds = game.data().rounds,
        "session ended"
    );

    // Closing the broadcast channel lets every party task finish.
    drop(game);
    drop(outbound);
    for task in tasks {
        task.await??;
    }

    Ok(())
}

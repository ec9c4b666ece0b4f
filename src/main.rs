use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Commands};

use wallet_portal::backend::BackendClient;
use wallet_portal::chain::{ChainReader, USDC_DECIMALS};
use wallet_portal::config::{self, Config};
use wallet_portal::jobs::withdrawal_recorder::{self, RecorderConfig};
use wallet_portal::models::onramp::OnrampRequest;
use wallet_portal::models::transaction::TransactionQuery;
use wallet_portal::session::{HandoffProvider, ProviderSession, SessionOrchestrator};
use wallet_portal::store::{self, CredentialStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "wallet_portal=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();
    let cfg = config::load()?;

    run(cfg, args.command).await
}

async fn run(cfg: Config, command: Commands) -> anyhow::Result<()> {
    let store = store::open(&cfg)?;
    let client = Arc::new(BackendClient::new(
        cfg.api_url.clone(),
        store.clone(),
        cfg.http_timeout(),
    )?);

    match command {
        Commands::Login { provider_token } => {
            let orchestrator = SessionOrchestrator::new(client, store);
            let provider = HandoffProvider::new();
            provider.sign_in(provider_token).await;

            match orchestrator
                .observe_transition(provider.is_signed_in(), &provider)
                .await
            {
                Some(session) => {
                    println!("Signed in as {} ({})", session.user.wallet_address, session.user.role);
                    print_json(&session.user)
                }
                None => {
                    let state = orchestrator.state();
                    anyhow::bail!(state
                        .error
                        .unwrap_or_else(|| "provider did not supply a token".to_string()))
                }
            }
        }

        Commands::Logout => {
            SessionOrchestrator::new(client, store).logout().await?;
            println!("Signed out.");
            Ok(())
        }

        Commands::Status => print_status(store.as_ref()).await,

        Commands::Refresh => {
            SessionOrchestrator::new(client, store)
                .refresh_session()
                .await
                .context("refresh failed")?;
            println!("Access token refreshed.");
            Ok(())
        }

        Commands::History { kind, page, take } => {
            let page = client
                .list_transactions(&TransactionQuery { kind, page, take })
                .await
                .context("could not load transaction history")?;

            println!("page {} ({} per page), {} total", page.page, page.take, page.total);
            for tx in &page.data {
                println!(
                    "{:<25} {:<10} {:>14} {:<10} {}",
                    tx.created_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                    tx.kind.as_deref().unwrap_or("-"),
                    tx.amount.as_deref().unwrap_or("-"),
                    tx.status.as_deref().unwrap_or("-"),
                    tx.transaction_hash.as_deref().unwrap_or(""),
                );
            }
            Ok(())
        }

        Commands::RecordWithdrawal { tx_hash } => {
            let recorder = withdrawal_recorder::spawn(client, RecorderConfig::from_config(&cfg));
            recorder.enqueue(tx_hash);
            let status = recorder.shutdown().await;

            if status.has_failures() {
                for failed in &status.failed {
                    eprintln!(
                        "warning: withdrawal {} was sent but could not be recorded after {} attempt(s): {}",
                        failed.tx_hash, failed.attempts, failed.error
                    );
                }
            } else {
                println!("Withdrawal recorded.");
            }
            Ok(())
        }

        Commands::Onramp {
            amount,
            currency,
            method,
            client_ip,
        } => {
            let session = client
                .create_onramp(&OnrampRequest {
                    payment_amount: amount,
                    payment_currency: currency,
                    payment_method: method,
                    client_ip,
                })
                .await
                .context("could not start onramp")?;
            println!("{}", session.onramp_url);
            Ok(())
        }

        Commands::Balance { address } => {
            let reader = ChainReader::new(cfg.rpc_url.clone(), cfg.http_timeout())?;
            let native = reader.native_balance(&address).await?;
            let usdc = reader
                .token_balance(&cfg.usdc_address, &address, USDC_DECIMALS)
                .await?;
            println!("ETH  {}", native);
            println!("USDC {}", usdc);
            Ok(())
        }
    }
}

async fn print_status(store: &dyn CredentialStore) -> anyhow::Result<()> {
    let has_access = store.get().await?.is_some();
    let has_refresh = store.refresh_token().await?.is_some();
    if has_access {
        println!("Signed in (backend credentials stored).");
    } else {
        println!("Not signed in.");
    }
    if has_access && !has_refresh {
        println!("warning: no refresh token stored");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

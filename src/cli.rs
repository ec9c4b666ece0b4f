use clap::{Parser, Subcommand};

/// Wallet Portal — backend session client for embedded-wallet users
#[derive(Parser)]
#[command(name = "wallet-portal", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Exchange a provider token for a backend session
    Login {
        /// Token issued by the embedded-wallet provider after its own sign-in
        #[arg(long, env = "PORTAL_PROVIDER_TOKEN", hide_env_values = true)]
        provider_token: String,
    },

    /// Clear stored backend credentials
    Logout,

    /// Show whether backend credentials are stored
    Status,

    /// Trade the stored refresh token for a new access token
    Refresh,

    /// List transaction history, newest first
    History {
        /// Filter by transaction type
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        take: u32,
    },

    /// Record a withdrawal that was already sent on-chain
    RecordWithdrawal {
        #[arg(long)]
        tx_hash: String,
    },

    /// Start a fiat onramp session
    Onramp {
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value = "CARD")]
        method: String,
        #[arg(long)]
        client_ip: Option<String>,
    },

    /// Show native and USDC balances of an address
    Balance {
        #[arg(long)]
        address: String,
    },
}

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "absenbot")]
#[command(author, version, about = "Attendance and invoicing Telegram bot for a music lesson studio", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot and the dashboard API together
    Run,

    /// Run only the Telegram bot
    Bot,

    /// Run only the dashboard API server
    Dashboard {
        /// Listen port (overrides DASHBOARD_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate an invoice for one student and exit
    Invoice {
        /// Student name (case-insensitive)
        nama: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

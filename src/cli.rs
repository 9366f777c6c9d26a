use clap::{Parser, Subcommand};

/// Slipstream rewriting proxy.
#[derive(Parser, Debug)]
#[command(name = "slipstream", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the proxy server
    Serve {
        /// Port to bind. Falls back to SLIPSTREAM_PORT, then 8080.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the origin token for a URL
    Encode {
        /// Any absolute http(s) URL; only its origin goes into the token
        url: String,
    },

    /// Decode an origin token back into the origin it names
    Decode {
        token: String,
    },
}

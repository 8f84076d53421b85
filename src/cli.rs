use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Reconciles embedded-language diagnostics of BitBake recipes")]
pub(crate) struct Cli {
    /// Listen for a client on a TCP port instead of using stdio
    #[arg(long)]
    pub listen: bool,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// Reconcile the workspace snapshots (JSON) and print the published diagnostics
    #[arg(long)]
    pub reconcile: Vec<std::path::PathBuf>,
}

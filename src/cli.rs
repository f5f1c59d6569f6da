use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable detailed debug logging (global)
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Enable verbose logging (global)
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Crawl a target with an authenticated browser session and verify IDOR
    /// candidates by replaying them without credentials
    Scan {
        /// Path to the JSON run configuration
        #[arg(short = 'c', long, default_value = "scan_config.json")]
        config: String,

        /// Output directory for logs and findings (overrides config)
        #[arg(short = 'o', long)]
        out: Option<String>,

        /// Run the browser headless (overrides config)
        #[arg(long)]
        headless: Option<bool>,
    },

    /// Brute-force a login form with username/password lists
    Brute {
        /// Login form URL
        url: String,

        /// File with newline-delimited usernames
        #[arg(short = 'U', long)]
        userlist: String,

        /// File with newline-delimited passwords
        #[arg(short = 'P', long)]
        passlist: String,

        /// Body substring counted as a successful login
        #[arg(long, default_value = "Welcome")]
        success_marker: String,
    },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

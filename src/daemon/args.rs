use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::{collection::source::Framing, processing::upload::DEFAULT_FEED_URL};

/// Options shared by the native host binary and `tabtally serve`.
#[derive(clap::Args, Debug, Clone)]
pub struct HostOptions {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Framing::Lines, help = "How messages are delimited on stdin")]
    pub framing: Framing,
    #[arg(long, env = "TABTALLY_OAUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    #[arg(long = "base-url", default_value = DEFAULT_FEED_URL)]
    pub base_url: String,
}

#[derive(Parser, Debug)]
#[command(name = "tabtally-host", version, about = "Native messaging host recording tab usage")]
pub struct HostArgs {
    #[command(flatten)]
    pub options: HostOptions,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    /// Browsers pass the calling extension's origin.
    #[arg(hide = true)]
    pub origin: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::daemon::collection::source::Framing;

    use super::HostArgs;

    #[test]
    fn test_browser_origin_is_accepted() {
        let args = HostArgs::parse_from([
            "tabtally-host",
            "chrome-extension://abcdefghijklmnop/",
            "--framing",
            "native",
        ]);
        assert_eq!(args.options.framing, Framing::Native);
        assert_eq!(
            args.origin.as_deref(),
            Some("chrome-extension://abcdefghijklmnop/")
        );
        assert!(!args.log_console);
    }
}

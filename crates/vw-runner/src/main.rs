//! # vw-runner
//!
//! Main entry point for the VWAP feed system.
//!
//! Subscribes to the trade feed of every configured instrument, prints a
//! sliding-window VWAP for each trade, and shuts all subscriptions down within
//! a bounded time on Ctrl+C / SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! vw-runner config.json --log-level info
//! vw-runner --instrument BTC-USD --instrument ETH-USD --window 50
//! ```

mod driver;

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vw_core::Instrument;
use vw_core::config::AppConfig;
use vw_core::logging::{LogFormat, init_logging};
use vw_feed::{Dialer, FeedClient, Shutdown, Subscription};

use crate::driver::DriverStats;

/// Sliding-window VWAP over a live exchange trade feed.
#[derive(Parser)]
#[command(
    name = "vw-runner",
    about = "Sliding-window VWAP over a live exchange trade feed"
)]
struct Cli {
    /// Configuration file path (JSON). Defaults apply when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit log records as JSON.
    #[arg(long)]
    log_json: bool,

    /// Instrument to subscribe to (repeatable); replaces the configured list.
    #[arg(short, long = "instrument")]
    instruments: Vec<String>,

    /// Number of most recent trades in each VWAP window.
    #[arg(short, long)]
    window: Option<usize>,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => vw_core::config::load_config(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AppConfig::default(),
        };
        if !self.instruments.is_empty() {
            let instruments = self.instruments.iter().map(|s| Instrument::from(s.as_str()));
            config.instruments = Some(instruments.collect());
        }
        if let Some(window) = self.window {
            config.window_capacity = Some(window);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // 1. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(
        &cli.log_level,
        log_dir.as_deref(),
        &config.module_name(),
        format,
    )?;

    info!(
        "vw-runner starting — feed={}, instruments={}, window={}",
        config.feed_url(),
        config.effective_instruments().len(),
        config.effective_window_capacity(),
    );

    let client = FeedClient::from_config(&config);
    run_app(&client, &config, std::io::stdout, wait_for_shutdown()).await
}

/// Subscribe, print VWAPs through writers from `output` until `shutdown`
/// resolves, then close every subscription against one deadline.
async fn run_app<D, W, O, S>(
    client: &FeedClient<D>,
    config: &AppConfig,
    output: O,
    shutdown: S,
) -> Result<()>
where
    D: Dialer,
    W: Write + Send + 'static,
    O: Fn() -> W,
    S: Future<Output = Result<()>>,
{
    // 2. Subscribe to every instrument
    let instruments = config.effective_instruments();
    let mut subscriptions = client
        .subscribe_all(&instruments)
        .await
        .context("subscribe to all")?;

    // 3. One driver task per subscription
    let window_capacity = config.effective_window_capacity();
    let drivers = spawn_drivers(&mut subscriptions, window_capacity, output);
    info!(
        "printing VWAPs for {} instrument(s) — press Ctrl+C to stop",
        drivers.len()
    );

    // 4. Wait for shutdown signal
    shutdown.await?;
    info!("shutdown signal received");

    // 5. Close all subscriptions against one deadline
    let close_timeout = config.close_timeout();
    let deadline = tokio::time::Instant::now() + close_timeout;
    let results = join_all(subscriptions.iter_mut().map(|sub| sub.close(deadline))).await;
    for (sub, result) in subscriptions.iter().zip(results) {
        match result {
            Ok(Shutdown::Graceful) => {}
            Ok(Shutdown::TimedOut) => warn!("[{}] closed after timeout", sub.instrument()),
            Err(e) => error!("[{}] failed to close subscription: {e}", sub.instrument()),
        }
    }

    // 6. Drivers end once their event queues close
    match tokio::time::timeout(close_timeout, join_all(drivers)).await {
        Ok(finished) => {
            for result in finished {
                if let Err(e) = result {
                    error!("driver task failed: {e}");
                }
            }
        }
        Err(_) => warn!("drivers still running after {close_timeout:?}"),
    }

    info!("all subscriptions closed — goodbye");
    Ok(())
}

fn spawn_drivers<W, O>(
    subscriptions: &mut [Subscription],
    window_capacity: usize,
    output: O,
) -> Vec<JoinHandle<()>>
where
    W: Write + Send + 'static,
    O: Fn() -> W,
{
    let mut drivers = Vec::with_capacity(subscriptions.len());

    for sub in subscriptions {
        let instrument = sub.instrument().clone();
        let Some(events) = sub.take_events() else {
            continue;
        };
        let mut out = output();

        drivers.push(tokio::spawn(async move {
            match driver::run(&instrument, events, window_capacity, &mut out).await {
                Ok(DriverStats { trades, errors, .. }) => info!(
                    "[{instrument}] event stream ended — {trades} trade(s), {errors} error(s)"
                ),
                Err(e) => error!("[{instrument}] writing output failed: {e}"),
            }
        }));
    }

    drivers
}

/// Resolve on Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use vw_feed::FeedSettings;
    use vw_feed::messages::FeedMessage;
    use vw_feed::testing::{Script, ScriptedChannel, ScriptedDialer};

    use super::*;

    /// Cloneable in-memory stdout shared by every driver.
    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl SharedOutput {
        fn lines(&self) -> Vec<String> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn settings() -> FeedSettings {
        FeedSettings {
            url: "wss://feed.test".into(),
            channel_name: "matches".into(),
            extra_headers: HashMap::new(),
            queue_capacity: 10,
        }
    }

    /// A channel that delivers three trades, then blocks in its next read.
    fn scripted_channel() -> (Arc<ScriptedChannel>, Script) {
        let (channel, script) = ScriptedChannel::new();
        for (size, price) in [("3", "6"), ("2", "4"), ("1", "2")] {
            let trade = FeedMessage::trade("", size, price);
            script.send(Ok(trade)).unwrap();
        }
        (channel, script)
    }

    #[tokio::test]
    async fn prints_vwaps_then_shuts_down() {
        let (channels, _scripts): (Vec<_>, Vec<_>) = (0..3).map(|_| scripted_channel()).unzip();
        let client = FeedClient::new(ScriptedDialer::with(channels.clone()), settings());
        let config = AppConfig {
            close_timeout_ms: Some(200),
            ..Default::default()
        };

        let out = SharedOutput::default();
        let printed = out.clone();
        // Interrupt once every trade has been printed.
        let shutdown = async move {
            while printed.lines().len() < 9 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(())
        };

        let output = out.clone();
        let run = run_app(&client, &config, move || output.clone(), shutdown);
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run_app hung")
            .unwrap();

        let mut lines = out.lines();
        lines.sort();
        let mut expected = Vec::new();
        for instrument in ["BTC-USD", "ETH-USD", "ETH-BTC"] {
            expected.push(format!("\"{instrument}\": 6"));
            expected.push(format!("\"{instrument}\": 5.2"));
            expected.push(format!("\"{instrument}\": 4.666666666666667"));
            // The read blocked at shutdown fails once the channel is closed.
            let error = format!("\"{instrument}\" ERROR: read match: channel closed");
            expected.push(error);
        }
        expected.sort();
        assert_eq!(lines, expected);

        for channel in &channels {
            assert_eq!(channel.close_calls(), 1);
        }
    }

    #[tokio::test]
    async fn subscribe_failure_is_returned() {
        let client = FeedClient::new(ScriptedDialer::failing(), settings());
        let out = SharedOutput::default();
        let output = out.clone();

        let err = run_app(
            &client,
            &AppConfig::default(),
            move || output.clone(),
            async { Ok(()) },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().starts_with("subscribe to all"));
        assert!(out.lines().is_empty());
    }

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "vw-runner",
            "-i",
            "SOL-USD",
            "--instrument",
            "ETH-USD",
            "--window",
            "5",
        ]);
        let config = cli.load_config().unwrap();
        assert_eq!(
            config.effective_instruments(),
            vec![Instrument::from("SOL-USD"), Instrument::from("ETH-USD")]
        );
        assert_eq!(config.effective_window_capacity(), 5);
    }

    #[test]
    fn defaults_without_config_file() {
        let cli = Cli::parse_from(["vw-runner"]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.effective_instruments().len(), 3);
        assert_eq!(config.effective_window_capacity(), 200);
        assert_eq!(cli.log_level, "info");
        assert!(!cli.log_json);
    }

    #[test]
    fn invalid_cli_instrument_is_rejected() {
        let cli = Cli::parse_from(["vw-runner", "-i", "BTC-USD", "-i", "BTC-USD"]);
        assert!(cli.load_config().is_err());
    }
}

use tracing::{error, info};

use renewbot::diagnostics::{DiagnosticsSink, Notifier};
use renewbot::{Config, RunResult};

fn print_usage() {
    println!(
        "renewbot {} — dashboard resource renewal bot\n\n\
         USAGE: renewbot [--force]\n\n\
         Configuration is environment-driven; see the RENEWBOT_* variables.\n\
         --force bypasses the scheduling gate and renews regardless of expiry.",
        env!("CARGO_PKG_VERSION")
    );
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if std::env::args().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    info!(
        "renewbot starting: resource {} on {}{}",
        config.server_id,
        config.base_url,
        if config.force { " (force mode)" } else { "" }
    );

    let sink = DiagnosticsSink::new(&config.shot_dir);
    let notifier = Notifier::new(config.telegram_token.clone(), config.telegram_chat.clone());

    let (result, code) = match renewbot::run(&config, &sink).await {
        Ok(result) => (result, 0),
        Err(e) => {
            error!("run failed: {}", e);
            let code = e.exit_code();
            (RunResult::failed(&e, None), code)
        }
    };

    info!("{}", result.summary());
    info!("diagnostics in {}", sink.dir().display());

    // Exactly one outbound notification per run, success or failure.
    notifier.send(&result).await;

    std::process::exit(code);
}

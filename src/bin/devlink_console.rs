use anyhow::{Context, Result};
use devlink::{Session, SessionEvent};
use devlink_console::bin_common::{
    init_tracing, load_config_from_env, parse_args, ConfigType, ConsoleCommand, ConsoleConfig,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = parse_args()
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| load_config_from_env(ConfigType::Console));
    let config = ConsoleConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let builder = Session::builder().config(config.session.clone());
    let session = config.apply_decoder(builder).build().await?;
    session.observe(print_event);

    print_banner(&session);

    if let Err(e) = session.connect().await {
        warn!("Initial connect failed: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C)");
                break;
            }
        };

        let Some(line) = line else {
            break;
        };

        match ConsoleCommand::parse(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => run_command(&session, &config, command).await,
            Err(e) => error!("{}", e),
        }
    }

    session.shutdown().await?;
    info!("Console stopped");
    Ok(())
}

async fn run_command(session: &Session, config: &ConsoleConfig, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Connect => {
            if let Err(e) = session.connect().await {
                error!("Connect failed: {}", e);
            }
        }
        ConsoleCommand::Close => {
            if let Err(e) = session.close().await {
                error!("Close failed: {}", e);
            }
        }
        ConsoleCommand::Status => {
            let m = session.metrics();
            println!(
                "{:?} | sent {} B | received {} B in {} frames | reconnects {} | timeouts {} | pending {}",
                m.state,
                m.bytes_sent,
                m.bytes_received,
                m.frames_received,
                m.reconnect_count,
                m.timeout_count,
                m.outstanding_requests
            );
        }
        ConsoleCommand::Send(text) => {
            let payload = format!("{}{}", text, config.line_ending);
            if let Err(e) = session.send(payload).await {
                error!("Send failed: {}", e);
            }
        }
        ConsoleCommand::Request {
            command,
            success,
            failure,
        } => {
            let payload = format!("{}{}", command, config.line_ending);
            match session.request(payload, success, failure).await {
                Ok(reply) => println!("OK  {}", reply.as_str()),
                Err(e) => match e.rejection() {
                    Some(rejection) => println!("ERR {}", rejection.as_str()),
                    None => error!("Request failed: {}", e),
                },
            }
        }
        ConsoleCommand::Empty | ConsoleCommand::Quit => {}
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Data(frame) => println!("<< {}", frame.to_text_lossy()),
        SessionEvent::Reconnect(notice) => warn!("{}", notice),
        SessionEvent::Error(e) => warn!("Session error: {}", e),
        SessionEvent::Timeout => warn!("Session timed out"),
        SessionEvent::Connect | SessionEvent::Close => {}
    }
}

fn print_banner(session: &Session) {
    info!("");
    info!("========================================");
    info!("Devlink console -> {}:{}", session.host(), session.port());
    info!("Type :status, :close, :connect, :request <ok> <err|-> <cmd>, :quit");
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

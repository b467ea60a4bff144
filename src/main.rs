use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use colloquy::config::AssistantConfig;
use colloquy::runtime::AssistantRuntime;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,colloquy=debug")),
        )
        .init();

    let config = AssistantConfig::load();
    if config.api_key.trim().is_empty() {
        tracing::warn!("api_key is unset; turns will resolve without contacting the endpoint");
    }

    let (completion_tx, completion_rx) = flume::unbounded();

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let runtime = AssistantRuntime::bootstrap(config, completion_tx)?;
    let identity = Uuid::new_v4();
    tracing::info!("Console session started as {}", identity);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        runtime.submit(identity, line.to_string());

        // Single delivery point: completions surface here, one at a time.
        match completion_rx.recv() {
            Ok(completion) => writeln!(stdout, "{}", completion.text)?,
            Err(_) => break,
        }
    }

    runtime.shutdown();
    Ok(())
}

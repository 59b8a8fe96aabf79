use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use vision_core::{
    config::load_settings, AnalyzerEvent, AnalyzerOptions, AuthProvider, HttpBackend,
    ImageAnalyzer, MissingClipboard, NoticeLevel,
};

#[derive(Parser, Debug)]
#[command(name = "vision-cli", about = "Describe images with the vision backend")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the access token from settings and environment.
    #[arg(long)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the account the access token belongs to.
    Whoami,
    /// Upload an image and print its analysis.
    Describe {
        image: PathBuf,
        #[arg(long)]
        question: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(token) = args.token {
        settings.access_token = Some(token);
    }
    let backend = Arc::new(HttpBackend::from_settings(&settings)?);

    match args.command {
        Command::Whoami => {
            backend.login().await.context("sign-in failed")?;
            let user = backend
                .current_session()
                .user
                .ok_or_else(|| anyhow!("not signed in"))?;
            println!("{}", user.email.unwrap_or(user.id.0));
        }
        Command::Describe { image, question } => {
            let analyzer = ImageAnalyzer::new(
                backend.clone(),
                Arc::new(MissingClipboard),
                AnalyzerOptions::from(&settings),
            );
            let notices = tokio::spawn(log_notices(analyzer.subscribe_events()));
            analyzer.mount().await;

            let outcome = describe(&backend, &analyzer, &image, question).await;

            analyzer.unmount().await;
            notices.abort();
            println!("{}", outcome?);
        }
    }
    Ok(())
}

async fn describe(
    backend: &HttpBackend,
    analyzer: &ImageAnalyzer,
    image: &Path,
    question: Option<String>,
) -> Result<String> {
    backend.login().await.context("sign-in failed")?;
    analyzer.select_path(image).await?;
    if let Some(question) = question {
        analyzer.set_custom_question(question).await;
    }
    let result = analyzer
        .analyze()
        .await?
        .ok_or_else(|| anyhow!("no uploaded image to analyze"))?;
    Ok(result.analysis)
}

async fn log_notices(mut events: tokio::sync::broadcast::Receiver<AnalyzerEvent>) {
    loop {
        match events.recv().await {
            Ok(AnalyzerEvent::Notice(notice)) => match notice.level {
                NoticeLevel::Success => tracing::info!("{}", notice.message),
                NoticeLevel::Error => tracing::warn!("{}", notice.message),
            },
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

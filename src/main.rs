mod app;
mod cli;
mod config;
mod paths;
mod provider;
mod questionnaire;
mod report;
mod settings;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    // Resolve and create dirs early.
    let config_dir = paths::config_dir()?;
    let _state_dir = paths::state_dir()?;

    let cfg = config::Config::load_optional(config_dir.join("config.toml"))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    // Settings commands need no provider or HTTP client.
    match &args.cmd {
        Some(cli::Command::SetToken { provider, token }) => {
            return app::cmd_set_token(provider, token.clone());
        }
        Some(cli::Command::Direct { url, token, disable }) => {
            return app::cmd_direct(url.clone(), token.clone(), *disable);
        }
        _ => {}
    }

    let local = settings::load_settings(paths::settings_path()?)?;
    tracing::debug!(loaded = local.is_some(), "local settings");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let provider_name = args
        .provider
        .clone()
        .or_else(|| std::env::var("INTAKE_PROVIDER").ok())
        .or_else(|| cfg.as_ref().and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| "openai".to_string())
        .to_ascii_lowercase();

    let model_flag = args
        .model
        .clone()
        .or_else(|| cfg.as_ref().and_then(|c| c.model.clone()));

    let provider = app::build_provider(
        &http,
        cfg.as_ref(),
        local.as_ref(),
        &provider_name,
        model_flag.as_deref(),
    )?;
    tracing::debug!(provider = provider.name(), "provider ready");

    match args.cmd {
        Some(cli::Command::Generate { context }) => {
            return app::cmd_generate(provider, context.as_deref()).await;
        }
        Some(cli::Command::Report { questions, answers }) => {
            return app::cmd_report(provider.as_ref(), &questions, &answers).await;
        }
        Some(cli::Command::Analyze { case }) => {
            return app::cmd_analyze(provider.as_ref(), &case).await;
        }
        Some(cli::Command::SetToken { .. }) | Some(cli::Command::Direct { .. }) => unreachable!(),
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: intake \"Hello\" or `intake generate`");
    }

    app::cmd_chat(provider.as_ref(), prompt).await
}

use chatmux_browser::BrowserSessionManager;
use chatmux_core::{sanitize_title, Provider, TitleNamer};
use chatmux_inject::{InjectOutcome, Injector, SubmitOptions};
use tracing::debug;

use super::{cancel_on_interrupt, Context};
use crate::naming::HttpTitleNamer;

fn report(provider: Provider, outcome: &InjectOutcome) -> anyhow::Result<()> {
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    if !outcome.ok {
        anyhow::bail!("{}: prompt inserted but could not be sent", provider);
    }
    println!("{}: sent (composer: {})", provider, outcome.composer_strategy);
    Ok(())
}

/// Re-apply the session title to every live tab. Missing tabs are skipped.
async fn apply_title(manager: &BrowserSessionManager, slug: &str, title: &str) {
    let Some(session) = manager.store().get_session(slug) else {
        return;
    };
    for (provider, tab) in &session.tabs {
        match manager.page(&tab.target_id).await {
            Ok(page) => manager.set_title(&page, title).await,
            Err(e) => debug!(slug, %provider, error = %e, "Skipping title for tab"),
        }
    }
}

pub async fn open(
    ctx: &Context,
    provider: Provider,
    slug: &str,
    prompt: Option<String>,
    research: bool,
    incognito: bool,
) -> anyhow::Result<()> {
    let manager = ctx.connect().await?;
    let opened = manager.open_tab(provider, slug).await?;
    println!(
        "{} {} tab for '{}' (target {})",
        if opened.reused { "Reusing" } else { "Opened" },
        provider,
        slug,
        opened.page.target_id()
    );

    if let Some(title) = manager.store().get_session(slug).map(|s| s.title) {
        manager.set_title(&opened.page, &title).await;
    }

    let Some(prompt) = prompt else {
        return Ok(());
    };
    let mut injector =
        Injector::new(provider, ctx.config.inject.clone()).with_cancellation(cancel_on_interrupt());
    let outcome = if opened.reused {
        if research || incognito {
            eprintln!("warning: modes only apply to a new tab; sending as a follow-up");
        }
        injector.followup(&opened.page, &prompt).await?
    } else {
        injector
            .submit(&opened.page, &prompt, SubmitOptions { research, incognito })
            .await?
    };
    report(provider, &outcome)
}

pub async fn send(ctx: &Context, slug: &str, provider: Provider, prompt: &str) -> anyhow::Result<()> {
    let manager = ctx.connect().await?;
    let page = manager.find_page(slug, provider).await?;
    let mut injector =
        Injector::new(provider, ctx.config.inject.clone()).with_cancellation(cancel_on_interrupt());
    let outcome = injector.followup(&page, prompt).await?;
    report(provider, &outcome)
}

pub async fn close(ctx: &Context, slug: &str, provider: Option<Provider>) -> anyhow::Result<()> {
    let manager = ctx.connect().await?;
    match provider {
        Some(provider) => {
            let target = manager
                .store()
                .get_session(slug)
                .and_then(|s| s.tabs.get(&provider).map(|t| t.target_id.clone()))
                .ok_or_else(|| anyhow::anyhow!("no {} tab in session '{}'", provider, slug))?;
            manager.close_tab(&target).await?;
            println!("Closed {} tab of '{}'", provider, slug);
        }
        None => {
            let count = manager.stop_session(slug).await?;
            println!("Stopped '{}' ({} tabs closed)", slug, count);
        }
    }
    Ok(())
}

pub async fn list(ctx: &Context) -> anyhow::Result<()> {
    let registry = ctx.store().load();
    let mut empty = true;
    for session in registry.sessions() {
        empty = false;
        println!(
            "{}  \"{}\"{}  created {}",
            session.slug,
            session.title,
            if session.grouped { "  [grouped]" } else { "" },
            session.created
        );
        for (provider, tab) in &session.tabs {
            let window = tab
                .window_id
                .map_or("-".to_string(), |w| w.to_string());
            let group = tab.group_id.map_or("-".to_string(), |g| g.to_string());
            println!(
                "    {:<8} target {}  window {}  group {}",
                provider.name(),
                tab.target_id,
                window,
                group
            );
        }
    }
    if empty {
        println!("No sessions.");
    }
    Ok(())
}

pub async fn rename(ctx: &Context, slug: &str, title: &str) -> anyhow::Result<()> {
    ctx.store().rename_title(slug, title)?;
    println!("Renamed '{}' to \"{}\"", slug, title);
    match ctx.connect_existing().await {
        Ok(manager) => apply_title(&manager, slug, title).await,
        Err(e) => debug!(error = %e, "No running browser; title applies on next open"),
    }
    Ok(())
}

/// Ask the naming service for a title based on the session's first tab.
pub async fn retitle(ctx: &Context, slug: &str) -> anyhow::Result<()> {
    let namer = HttpTitleNamer::new(&ctx.config.naming)?;
    let manager = ctx.connect().await?;
    let session = manager
        .store()
        .get_session(slug)
        .ok_or_else(|| anyhow::anyhow!("session '{}' not found", slug))?;
    let tab = session
        .tabs
        .values()
        .next()
        .ok_or_else(|| anyhow::anyhow!("session '{}' has no tabs", slug))?;

    let page = manager.page(&tab.target_id).await?;
    let transcript = manager
        .transcript(&page, ctx.config.naming.max_chars)
        .await?;
    let raw = namer.name(&transcript).await?;
    let title = sanitize_title(&raw, ctx.config.naming.max_title_len)
        .ok_or_else(|| anyhow::anyhow!("naming service returned an empty title"))?;

    manager.store().rename_title(slug, &title)?;
    apply_title(&manager, slug, &title).await;
    println!("Renamed '{}' to \"{}\"", slug, title);
    Ok(())
}

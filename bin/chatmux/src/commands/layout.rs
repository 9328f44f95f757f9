use chatmux_browser::{arrange as arrange_windows, toggle_group};
use chatmux_core::{GroupColor, Provider, TargetId};

use super::Context;
use chatmux_browser::BrowserSessionManager;

fn target_of(manager: &BrowserSessionManager, slug: &str, provider: Provider) -> anyhow::Result<TargetId> {
    manager
        .store()
        .get_session(slug)
        .and_then(|s| s.tabs.get(&provider).map(|t| t.target_id.clone()))
        .ok_or_else(|| anyhow::anyhow!("no {} tab in session '{}'", provider, slug))
}

pub async fn arrange(ctx: &Context, max: usize) -> anyhow::Result<()> {
    let manager = ctx.connect().await?;
    let placed = arrange_windows(&manager, max).await?;
    if placed == 0 {
        println!("Nothing to arrange.");
    } else {
        println!("Arranged {} windows", placed);
    }
    Ok(())
}

pub async fn toggle(ctx: &Context, slug: &str, color: Option<GroupColor>) -> anyhow::Result<()> {
    let manager = ctx.connect().await?;
    if toggle_group(&manager, slug, color).await? {
        println!("Grouped '{}'", slug);
    } else {
        println!("Ungrouped '{}'", slug);
    }
    Ok(())
}

pub async fn move_tab(
    ctx: &Context,
    slug: &str,
    provider: Provider,
    name: &str,
    color: Option<GroupColor>,
) -> anyhow::Result<()> {
    let manager = ctx.connect().await?;
    let target = target_of(&manager, slug, provider)?;
    let color = color.unwrap_or(ctx.config.layout.group_color);
    let group = manager.move_to_group(&target, name, color).await?;
    println!("Moved {} tab of '{}' to group \"{}\" ({})", provider, slug, name, group);
    Ok(())
}

pub async fn remove_tab(ctx: &Context, slug: &str, provider: Provider) -> anyhow::Result<()> {
    let manager = ctx.connect().await?;
    let target = target_of(&manager, slug, provider)?;
    manager.remove_from_group(&target).await?;
    println!("Removed {} tab of '{}' from its group", provider, slug);
    Ok(())
}

//! Window tiling and per-session tab grouping.

use chatmux_core::{Bounds, Error, GroupColor, Result, TargetId, WindowId};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::manager::BrowserSessionManager;

/// Most windows a layout covers.
pub const MAX_TILES: usize = 4;

/// Tiles for `count` windows inside `area`:
/// 1 → left half, 2 → halves, 3 → left half plus right quadrants,
/// 4 → quadrants. Counts above four use the four-window table.
pub fn plan_layout(count: usize, area: Bounds) -> Vec<Bounds> {
    let half_w = area.width / 2;
    let half_h = area.height / 2;
    let right = area.left + half_w;
    let lower = area.top + half_h;
    let rest_w = area.width - half_w;
    let rest_h = area.height - half_h;

    let left_half = Bounds::new(area.left, area.top, half_w, area.height);
    let right_half = Bounds::new(right, area.top, rest_w, area.height);
    let top_left = Bounds::new(area.left, area.top, half_w, half_h);
    let top_right = Bounds::new(right, area.top, rest_w, half_h);
    let bottom_left = Bounds::new(area.left, lower, half_w, rest_h);
    let bottom_right = Bounds::new(right, lower, rest_w, rest_h);

    match count.min(MAX_TILES) {
        0 => vec![],
        1 => vec![left_half],
        2 => vec![left_half, right_half],
        3 => vec![left_half, top_right, bottom_right],
        _ => vec![top_left, top_right, bottom_left, bottom_right],
    }
}

/// Windows of ungrouped sessions, ascending and deduplicated, each paired
/// with one of its targets. Tabs the browser no longer lists are skipped.
async fn eligible_windows(manager: &BrowserSessionManager) -> Result<Vec<(WindowId, TargetId)>> {
    let live: HashSet<String> = manager
        .targets()
        .await?
        .into_iter()
        .map(|t| t.target_id)
        .collect();
    let registry = manager.store().load();
    let mut windows: Vec<(WindowId, TargetId)> = registry
        .sessions()
        .filter(|s| !s.grouped)
        .flat_map(|s| s.tabs.values())
        .filter(|t| {
            let alive = live.contains(t.target_id.as_str());
            if !alive {
                debug!(target = %t.target_id, "Skipping closed tab");
            }
            alive
        })
        .filter_map(|t| t.window_id.map(|w| (w, t.target_id.clone())))
        .collect();
    windows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
    windows.dedup_by(|a, b| a.0 == b.0);
    Ok(windows)
}

/// Tile up to `max_windows` ungrouped-session windows. Returns how many were
/// placed; no eligible window is not an error.
pub async fn arrange(manager: &BrowserSessionManager, max_windows: usize) -> Result<usize> {
    let mut windows = eligible_windows(manager).await?;
    windows.truncate(max_windows.min(MAX_TILES));
    if windows.is_empty() {
        debug!("No ungrouped windows to arrange");
        return Ok(0);
    }

    let area = match manager.config().layout.work_area {
        Some(area) => area,
        None => {
            let page = manager.page(&windows[0].1).await?;
            manager.screen_work_area(&page).await?
        }
    };

    let tiles = plan_layout(windows.len(), area);
    for ((window, _), bounds) in windows.iter().zip(tiles) {
        manager.set_window_bounds(*window, bounds).await?;
    }
    info!(windows = windows.len(), "Windows arranged");
    Ok(windows.len())
}

/// Group the session's tabs, or undo that. Returns the new grouped state.
///
/// The group belongs to the slug and only displays the title.
///
/// Ungrouping takes every tab of the session out of its group, gives each tab
/// that shares a window with a sibling its own window again and re-tiles.
/// Tabs the registry does not track are never touched.
pub async fn toggle_group(
    manager: &BrowserSessionManager,
    slug: &str,
    color: Option<GroupColor>,
) -> Result<bool> {
    let session = manager
        .store()
        .get_session(slug)
        .ok_or_else(|| Error::NotFound(format!("session '{}'", slug)))?;
    if session.tabs.is_empty() {
        return Err(Error::NotFound(format!("session '{}' has no tabs", slug)));
    }

    if !session.grouped {
        let color = color.unwrap_or(manager.config().layout.group_color);
        for (provider, tab) in &session.tabs {
            let gid = manager
                .gather_into_session_group(&tab.target_id, slug, &session.title, color)
                .await?;
            debug!(slug, %provider, group = %gid, "Tab added to session group");
        }
        info!(slug, title = %session.title, "Session grouped");
        return Ok(true);
    }

    for tab in session.tabs.values().filter(|t| t.group_id.is_some()) {
        manager.remove_from_group(&tab.target_id).await?;
    }

    let mut seen = HashSet::new();
    for (provider, tab) in &session.tabs {
        let window = match manager.window_bounds(&tab.target_id).await {
            Ok((window, _)) => window,
            Err(e) => {
                warn!(slug, %provider, error = %e, "Window lookup failed; leaving tab in place");
                continue;
            }
        };
        if seen.insert(window) {
            manager.store().update_window(&tab.target_id, window)?;
        } else {
            let own = manager.split_to_window(&tab.target_id).await?;
            debug!(slug, %provider, window = %own, "Tab split into its own window");
            seen.insert(own);
        }
    }

    arrange(manager, MAX_TILES).await?;
    info!(slug, "Session ungrouped");
    Ok(false)
}

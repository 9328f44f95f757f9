use chatmux_core::config::InjectConfig;
use chatmux_core::{Error, Mode, Provider, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{resolve_chain, resolve_with_budget, Budget, Lookup, Resolved};
use crate::dom::{Key, PageDom};
use crate::outcome::{InjectOutcome, SoftDegradation};
use crate::providers::{profile, ProviderProfile};
use crate::toggle::enable_mode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    pub research: bool,
    pub incognito: bool,
}

/// Drives one provider page: mode toggles, composer, send.
///
/// An injector remembers the composer it last filled so follow-ups on the
/// same page skip the lookup while that node is still attached.
pub struct Injector {
    profile: &'static ProviderProfile,
    config: InjectConfig,
    cancel: CancellationToken,
    composer: Option<Resolved>,
}

impl Injector {
    pub fn new(provider: Provider, config: InjectConfig) -> Self {
        Self::with_profile(profile(provider), config)
    }

    pub fn with_profile(profile: &'static ProviderProfile, config: InjectConfig) -> Self {
        Self {
            profile,
            config,
            cancel: CancellationToken::new(),
            composer: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn provider(&self) -> Provider {
        self.profile.provider
    }

    /// Forget the cached composer; the next call resolves it again.
    pub fn invalidate(&mut self) {
        self.composer = None;
    }

    /// First prompt on a freshly opened page, with optional modes.
    pub async fn submit(
        &mut self,
        dom: &dyn PageDom,
        prompt: &str,
        options: SubmitOptions,
    ) -> Result<InjectOutcome> {
        let mut warnings = Vec::new();
        let requested = [
            (Mode::Incognito, options.incognito),
            (Mode::Research, options.research),
        ];
        for (mode, wanted) in requested {
            if wanted {
                warnings.extend(self.apply_mode(dom, mode).await?);
            }
        }
        self.deliver(dom, prompt, warnings).await
    }

    /// Another prompt into a page that already has a conversation.
    pub async fn followup(&mut self, dom: &dyn PageDom, prompt: &str) -> Result<InjectOutcome> {
        self.deliver(dom, prompt, Vec::new()).await
    }

    async fn apply_mode(&mut self, dom: &dyn PageDom, mode: Mode) -> Result<Vec<SoftDegradation>> {
        let provider = self.provider();
        let Some(spec) = self.profile.toggle(mode) else {
            return Ok(vec![SoftDegradation::ModeUnsupported { provider, mode }]);
        };
        let report = enable_mode(dom, provider, spec, &self.config, &self.cancel).await?;
        // toggles may swap the composer node on any provider
        self.invalidate();
        if spec.remounts_composer && report.clicked > 0 {
            debug!(%provider, %mode, "Composer expected to remount");
        }
        Ok(report.warnings)
    }

    fn check(&self, stage: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("{} {}", self.provider(), stage)));
        }
        Ok(())
    }

    async fn composer(&mut self, dom: &dyn PageDom) -> Result<Resolved> {
        if let Some(cached) = &self.composer {
            match dom.is_attached(&cached.element).await {
                Ok(true) => return Ok(cached.clone()),
                Ok(false) => debug!(provider = %self.provider(), "Cached composer detached"),
                Err(e) => debug!(provider = %self.provider(), error = %e, "Cached composer check failed"),
            }
            self.composer = None;
        }

        let budget = Budget::new(self.config.composer_attempts, self.config.composer_interval_ms);
        let detail = match resolve_with_budget(dom, self.profile.composer, budget, &self.cancel).await? {
            Lookup::Found(found) => {
                debug!(provider = %self.provider(), strategy = found.label, "Composer resolved");
                self.composer = Some(found.clone());
                return Ok(found);
            }
            Lookup::NotFound => format!(
                "no strategy matched after {} attempts",
                budget.attempts
            ),
            Lookup::Transient(e) => format!("lookup kept failing: {}", e),
        };
        Err(Error::ComposerNotFound {
            provider: self.provider().to_string(),
            detail,
        })
    }

    /// Poll the send chain until an enabled control appears.
    async fn ready_send(&self, dom: &dyn PageDom) -> Result<Option<Resolved>> {
        let attempts = self.config.ready_attempts.max(1);
        let interval = std::time::Duration::from_millis(self.config.ready_interval_ms);
        for attempt in 1..=attempts {
            self.check("readiness")?;
            if let Some(send) = resolve_chain(dom, self.profile.send).await.found() {
                if is_enabled(dom, &send).await {
                    return Ok(Some(send));
                }
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(None)
    }

    async fn deliver(
        &mut self,
        dom: &dyn PageDom,
        prompt: &str,
        mut warnings: Vec<SoftDegradation>,
    ) -> Result<InjectOutcome> {
        let provider = self.provider();
        self.check("composer")?;

        let mut composer = self.composer(dom).await?;
        if let Err(e) = dom.fill(&composer.element, prompt).await {
            // the node can vanish between lookup and fill
            debug!(%provider, error = %e, "Fill failed, resolving composer again");
            self.invalidate();
            composer = self.composer(dom).await?;
            dom.fill(&composer.element, prompt)
                .await
                .map_err(|e| Error::ComposerNotFound {
                    provider: provider.to_string(),
                    detail: format!("fill failed: {}", e),
                })?;
        }

        let mut sent = false;
        match self.ready_send(dom).await? {
            Some(send) => match dom.click(&send.element).await {
                Ok(()) => sent = true,
                Err(e) => warnings.push(SoftDegradation::SendFailed {
                    provider,
                    error: e.to_string(),
                }),
            },
            None => warnings.push(SoftDegradation::NotReady {
                provider,
                checks: self.config.ready_attempts.max(1),
            }),
        }
        if !sent {
            match dom.press_key(Some(&composer.element), Key::Enter).await {
                Ok(()) => sent = true,
                Err(e) => warnings.push(SoftDegradation::SendFailed {
                    provider,
                    error: e.to_string(),
                }),
            }
        }

        for w in &warnings {
            warn!(%provider, "{}", w);
        }
        info!(%provider, composer = composer.label, sent, "Prompt delivered");

        Ok(InjectOutcome {
            ok: sent,
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
            composer_strategy: composer.label,
        })
    }
}

async fn is_enabled(dom: &dyn PageDom, send: &Resolved) -> bool {
    for attr in ["disabled", "aria-disabled"] {
        match dom.attribute(&send.element, attr).await {
            Ok(None) => {}
            Ok(Some(v)) if attr == "aria-disabled" && v != "true" => {}
            Ok(Some(_)) => return false,
            Err(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Strategy;
    use crate::fake::FakeDom;
    use crate::providers::{ToggleSpec, Verify};

    const COMPOSER: &[Strategy] = &[
        Strategy::css("current", "div#composer"),
        Strategy::css("legacy", "textarea#composer"),
    ];

    const SEND: &[Strategy] = &[Strategy::css("send", "button.send")];

    const PILL: &[Strategy] = &[Strategy::css("pill", "span.pill")];

    static PLAIN: ProviderProfile = ProviderProfile {
        provider: Provider::Gemini,
        composer: COMPOSER,
        send: SEND,
        research: None,
        incognito: None,
    };

    static MODES: ProviderProfile = ProviderProfile {
        provider: Provider::ChatGpt,
        composer: COMPOSER,
        send: SEND,
        research: Some(ToggleSpec {
            mode: Mode::Research,
            trigger: &[Strategy::css("plus", "button.plus")],
            toggle: &[Strategy::text("item", "[role=menuitem]", "Deep research")],
            verify: Verify::Present(PILL),
            remounts_composer: false,
        }),
        incognito: Some(ToggleSpec {
            mode: Mode::Incognito,
            trigger: &[],
            toggle: &[Strategy::css("temp", "button.temp-on")],
            verify: Verify::Present(&[Strategy::css("temp-off", "button.temp-off")]),
            remounts_composer: true,
        }),
    };

    fn injector(profile: &'static ProviderProfile) -> Injector {
        Injector::with_profile(profile, InjectConfig::immediate())
    }

    fn page() -> (FakeDom, u64) {
        let dom = FakeDom::new();
        let composer = dom.add("composer", &["div#composer"]);
        dom.add("send", &["button.send"]);
        (dom, composer)
    }

    #[tokio::test]
    async fn test_plain_submit() {
        let (dom, composer) = page();
        let out = injector(&PLAIN)
            .submit(&dom, "hello", SubmitOptions::default())
            .await
            .unwrap();
        assert!(out.ok);
        assert!(out.warnings.is_empty());
        assert_eq!(out.composer_strategy, "current");
        assert_eq!(dom.value_of(composer), "hello");
        assert_eq!(dom.clicks(), vec!["send"]);
    }

    #[tokio::test]
    async fn test_legacy_composer_is_not_a_warning() {
        let dom = FakeDom::new();
        let legacy = dom.add("composer", &["textarea#composer"]);
        dom.add("send", &["button.send"]);

        let out = injector(&PLAIN)
            .followup(&dom, "hi")
            .await
            .unwrap();
        assert!(out.ok);
        assert!(out.warnings.is_empty());
        assert_eq!(out.composer_strategy, "legacy");
        assert_eq!(dom.value_of(legacy), "hi");
    }

    #[tokio::test]
    async fn test_missing_incognito_toggle_degrades() {
        let (dom, composer) = page();
        let out = injector(&MODES)
            .submit(
                &dom,
                "secret",
                SubmitOptions {
                    incognito: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(out.ok);
        assert_eq!(
            out.warnings,
            vec![
                "chatgpt: incognito toggle not found",
                "chatgpt: incognito not enabled; continuing without it",
            ]
        );
        assert_eq!(dom.value_of(composer), "secret");
    }

    #[tokio::test]
    async fn test_mode_without_profile_row() {
        let (dom, _) = page();
        let out = injector(&PLAIN)
            .submit(
                &dom,
                "x",
                SubmitOptions {
                    research: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(out.ok);
        assert_eq!(
            out.warnings,
            vec!["gemini: research is not supported; continuing without it"]
        );
    }

    #[tokio::test]
    async fn test_incognito_remount_fills_new_composer() {
        let (dom, old) = page();
        dom.add("temp", &["button.temp-on"]);
        dom.on_click("temp", |s| {
            s.detach_named("composer");
            s.add("composer", &["div#composer"]);
            s.add("temp-off", &["button.temp-off"]);
        });

        let mut inj = injector(&MODES);
        let out = inj
            .submit(
                &dom,
                "first",
                SubmitOptions {
                    incognito: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(out.ok);
        assert!(out.warnings.is_empty());

        let fresh = dom.live("composer").unwrap();
        assert_ne!(fresh, old);
        assert_eq!(dom.value_of(fresh), "first");
        assert_eq!(dom.value_of(old), "");

        let before = dom.query_count();
        inj.followup(&dom, "second").await.unwrap();
        assert_eq!(dom.value_of(fresh), "second");
        // cached composer reused, only the send chain was queried
        assert_eq!(dom.query_count() - before, 1);
    }

    #[tokio::test]
    async fn test_followup_after_rerender_resolves_again() {
        let (dom, old) = page();
        let mut inj = injector(&PLAIN);
        inj.followup(&dom, "one").await.unwrap();

        dom.detach(old);
        let fresh = dom.add("composer", &["div#composer"]);
        inj.followup(&dom, "two").await.unwrap();
        assert_eq!(dom.value_of(fresh), "two");
    }

    #[tokio::test]
    async fn test_research_through_portal_menu() {
        let (dom, _) = page();
        dom.add("plus", &["button.plus"]);
        dom.on_click("plus", |s| {
            s.add_with_text("item", &["[role=menuitem]"], "Deep research");
        });
        dom.on_click("item", |s| {
            s.detach_named("item");
            s.add("pill", &["span.pill"]);
        });

        let out = injector(&MODES)
            .submit(
                &dom,
                "dig",
                SubmitOptions {
                    research: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(out.ok);
        assert!(out.warnings.is_empty());
        assert_eq!(dom.clicks(), vec!["plus", "item", "send"]);
    }

    #[tokio::test]
    async fn test_research_unverified_still_sends() {
        let (dom, _) = page();
        dom.add("plus", &["button.plus"]);
        dom.add_with_text("item", &["[role=menuitem]"], "Deep research");

        let out = injector(&MODES)
            .submit(
                &dom,
                "dig",
                SubmitOptions {
                    research: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(out.ok);
        assert_eq!(
            out.warnings,
            vec![
                "chatgpt: research toggle could not be verified after 3 attempts",
                "chatgpt: research not enabled; continuing without it",
            ]
        );
        let item_clicks = dom.clicks().iter().filter(|c| **c == "item").count();
        assert_eq!(item_clicks, 3);
    }

    #[tokio::test]
    async fn test_send_not_ready_falls_back_to_enter() {
        let (dom, _) = page();
        let send = dom.live("send").unwrap();
        dom.set_attr(send, "disabled", "");

        let out = injector(&PLAIN).followup(&dom, "x").await.unwrap();
        assert!(out.ok);
        assert_eq!(
            out.warnings,
            vec!["gemini: send control not ready after 3 checks; sending anyway"]
        );
        assert!(dom.clicks().is_empty());
        assert_eq!(dom.keys(), vec![(Some("composer"), Key::Enter)]);
    }

    #[tokio::test]
    async fn test_send_enabled_by_input() {
        let (dom, _) = page();
        let send = dom.live("send").unwrap();
        dom.set_attr(send, "aria-disabled", "true");
        dom.on_fill("composer", |s| s.set_attr_named("send", "aria-disabled", "false"));

        let out = injector(&PLAIN).followup(&dom, "x").await.unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(dom.clicks(), vec!["send"]);
    }

    #[tokio::test]
    async fn test_composer_not_found() {
        let dom = FakeDom::new();
        dom.add("send", &["button.send"]);
        let err = injector(&PLAIN).followup(&dom, "x").await.unwrap_err();
        match err {
            Error::ComposerNotFound { provider, .. } => assert_eq!(provider, "gemini"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(dom.fills().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_injector() {
        let (dom, _) = page();
        let cancel = CancellationToken::new();
        let mut inj = injector(&MODES).with_cancellation(cancel.clone());
        cancel.cancel();
        let err = inj
            .submit(
                &dom,
                "x",
                SubmitOptions {
                    research: true,
                    incognito: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert!(dom.clicks().is_empty());
        assert!(dom.fills().is_empty());
    }
}

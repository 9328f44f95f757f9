//! Per-provider selector table.
//!
//! Chains are ordered newest UI first, then legacy markup, then a plain
//! textarea/contenteditable fallback. When a site changes its markup the fix
//! belongs here, not in the engine.

use chatmux_core::{Mode, Provider};

use crate::chain::Strategy;

/// How to read back whether a mode took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verify {
    /// An element from `chain` carries `name="value"`.
    Attribute {
        chain: &'static [Strategy],
        name: &'static str,
        value: &'static str,
    },
    /// Some element from `chain` is present (e.g. an "exit incognito" control).
    Present(&'static [Strategy]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleSpec {
    pub mode: Mode,
    /// Menu to open first. Empty when the toggle sits in the page directly.
    pub trigger: &'static [Strategy],
    pub toggle: &'static [Strategy],
    pub verify: Verify,
    /// Turning the mode on replaces the composer node.
    pub remounts_composer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: Provider,
    pub composer: &'static [Strategy],
    pub send: &'static [Strategy],
    pub research: Option<ToggleSpec>,
    pub incognito: Option<ToggleSpec>,
}

impl ProviderProfile {
    pub fn toggle(&self, mode: Mode) -> Option<&ToggleSpec> {
        match mode {
            Mode::Research => self.research.as_ref(),
            Mode::Incognito => self.incognito.as_ref(),
        }
    }
}

pub fn profile(provider: Provider) -> &'static ProviderProfile {
    match provider {
        Provider::ChatGpt => &CHATGPT,
        Provider::Claude => &CLAUDE,
        Provider::Gemini => &GEMINI,
        Provider::Grok => &GROK,
    }
}

// ─── ChatGPT ──────────────────────────────────────────────────────────

const CHATGPT_TEMPORARY_ON: &[Strategy] = &[
    Strategy::css("temporary-on", "button[aria-label='Turn off temporary chat']"),
    Strategy::css("temporary-badge", "[data-testid='temporary-chat-label']"),
];

const CHATGPT_RESEARCH_PILL: &[Strategy] = &[
    Strategy::css("research-pill", "button[data-testid='composer-pill'][aria-label*='research' i]"),
    Strategy::text("research-pill-text", "button.composer-pill", "Deep research"),
];

static CHATGPT: ProviderProfile = ProviderProfile {
    provider: Provider::ChatGpt,
    composer: &[
        Strategy::css("prosemirror", "div#prompt-textarea[contenteditable='true']"),
        Strategy::css("legacy-textarea", "textarea#prompt-textarea"),
        Strategy::css("plaintext", "form [contenteditable='plaintext-only']"),
        Strategy::css("form-textarea", "form textarea"),
    ],
    send: &[
        Strategy::css("send-button", "button[data-testid='send-button']"),
        Strategy::css("composer-submit", "button#composer-submit-button"),
        Strategy::css("send-aria", "button[aria-label='Send prompt']"),
    ],
    research: Some(ToggleSpec {
        mode: Mode::Research,
        trigger: &[
            Strategy::css("plus-menu", "button[data-testid='composer-plus-btn']"),
            Strategy::css("tools-menu", "button[aria-label='Choose tool']"),
        ],
        toggle: &[
            Strategy::text("menu-radio", "[role='menuitemradio']", "Deep research"),
            Strategy::text("menu-item", "[role='menuitem']", "Deep research"),
        ],
        verify: Verify::Present(CHATGPT_RESEARCH_PILL),
        remounts_composer: false,
    }),
    incognito: Some(ToggleSpec {
        mode: Mode::Incognito,
        trigger: &[],
        toggle: &[
            Strategy::css("temporary-off", "button[aria-label='Turn on temporary chat']"),
            Strategy::text("temporary-text", "button", "Temporary chat"),
        ],
        verify: Verify::Present(CHATGPT_TEMPORARY_ON),
        remounts_composer: true,
    }),
};

// ─── Claude ───────────────────────────────────────────────────────────

const CLAUDE_RESEARCH_BUTTON: &[Strategy] = &[
    Strategy::css("research-button", "button[aria-label='Research']"),
    Strategy::text("research-button-text", "fieldset button[aria-pressed]", "Research"),
];

const CLAUDE_INCOGNITO_ON: &[Strategy] = &[
    Strategy::css("incognito-exit", "button[aria-label='Exit incognito']"),
    Strategy::css("incognito-banner", "[data-testid='incognito-mode-indicator']"),
];

static CLAUDE: ProviderProfile = ProviderProfile {
    provider: Provider::Claude,
    composer: &[
        Strategy::css("prosemirror", "div.ProseMirror[contenteditable='true']"),
        Strategy::css("aria-textbox", "div[contenteditable='true'][aria-label*='prompt' i]"),
        Strategy::css("fieldset-textarea", "fieldset textarea"),
    ],
    send: &[
        Strategy::css("send-aria", "button[aria-label='Send message']"),
        Strategy::css("send-aria-legacy", "button[aria-label='Send Message']"),
        Strategy::css("fieldset-submit", "fieldset button[type='submit']"),
    ],
    research: Some(ToggleSpec {
        mode: Mode::Research,
        trigger: &[],
        toggle: CLAUDE_RESEARCH_BUTTON,
        verify: Verify::Attribute {
            chain: CLAUDE_RESEARCH_BUTTON,
            name: "aria-pressed",
            value: "true",
        },
        remounts_composer: false,
    }),
    incognito: Some(ToggleSpec {
        mode: Mode::Incognito,
        trigger: &[],
        toggle: &[
            Strategy::css("incognito-enter", "button[aria-label='Use incognito']"),
            Strategy::text("incognito-text", "button", "Incognito"),
        ],
        verify: Verify::Present(CLAUDE_INCOGNITO_ON),
        remounts_composer: true,
    }),
};

// ─── Gemini ───────────────────────────────────────────────────────────

const GEMINI_RESEARCH_CHIP: &[Strategy] = &[
    Strategy::css("research-chip", "button[aria-label*='Deselect Deep Research' i]"),
    Strategy::text("research-chip-text", "button.toolbox-drawer-item-deselect-button", "Deep Research"),
];

const GEMINI_TEMPORARY: &[Strategy] = &[
    Strategy::css("temporary-button", "button[aria-label='Temporary chat']"),
    Strategy::css("temporary-testid", "button[data-test-id='temp-chat-button']"),
];

static GEMINI: ProviderProfile = ProviderProfile {
    provider: Provider::Gemini,
    composer: &[
        Strategy::css("quill", "rich-textarea div.ql-editor[contenteditable='true']"),
        Strategy::css("quill-bare", "div.ql-editor[contenteditable='true']"),
        Strategy::css("prompt-textarea", "textarea[aria-label*='prompt' i]"),
    ],
    send: &[
        Strategy::css("send-button", "button.send-button"),
        Strategy::css("send-aria", "button[aria-label='Send message']"),
    ],
    research: Some(ToggleSpec {
        mode: Mode::Research,
        trigger: &[
            Strategy::css("toolbox", "button[aria-label='Tools']"),
            Strategy::css("toolbox-drawer", "toolbox-drawer button.toolbox-drawer-button"),
        ],
        toggle: &[
            Strategy::text("drawer-item", "button.toolbox-drawer-item-button", "Deep Research"),
            Strategy::text("menu-checkbox", "[role='menuitemcheckbox']", "Deep Research"),
        ],
        verify: Verify::Present(GEMINI_RESEARCH_CHIP),
        remounts_composer: false,
    }),
    incognito: Some(ToggleSpec {
        mode: Mode::Incognito,
        trigger: &[],
        toggle: GEMINI_TEMPORARY,
        verify: Verify::Attribute {
            chain: GEMINI_TEMPORARY,
            name: "aria-pressed",
            value: "true",
        },
        remounts_composer: false,
    }),
};

// ─── Grok ─────────────────────────────────────────────────────────────

const GROK_DEEPSEARCH: &[Strategy] = &[
    Strategy::css("deepsearch-aria", "button[aria-label='DeepSearch']"),
    Strategy::text("deepsearch-text", "form button", "DeepSearch"),
];

const GROK_PRIVATE_ON: &[Strategy] = &[
    Strategy::css("private-on", "[aria-label='Private chat'][aria-pressed='true']"),
    Strategy::text("private-banner", "div[role='status']", "private"),
];

static GROK: ProviderProfile = ProviderProfile {
    provider: Provider::Grok,
    composer: &[
        Strategy::css("tiptap", "div.tiptap.ProseMirror[contenteditable='true']"),
        Strategy::css("ask-textarea", "textarea[aria-label*='Ask Grok' i]"),
        Strategy::css("form-textarea", "form textarea"),
    ],
    send: &[
        Strategy::css("submit-aria", "button[type='submit'][aria-label='Submit']"),
        Strategy::css("form-submit", "form button[type='submit']"),
    ],
    research: Some(ToggleSpec {
        mode: Mode::Research,
        trigger: &[],
        toggle: GROK_DEEPSEARCH,
        verify: Verify::Attribute {
            chain: GROK_DEEPSEARCH,
            name: "aria-pressed",
            value: "true",
        },
        remounts_composer: false,
    }),
    incognito: Some(ToggleSpec {
        mode: Mode::Incognito,
        trigger: &[],
        toggle: &[
            Strategy::css("private-toggle", "[aria-label='Private chat']"),
            Strategy::text("private-text", "button", "Private"),
        ],
        verify: Verify::Present(GROK_PRIVATE_ON),
        remounts_composer: true,
    }),
};

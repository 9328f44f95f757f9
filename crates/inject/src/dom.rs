use async_trait::async_trait;
use chatmux_core::Result;
use std::fmt;

/// Opaque reference to a live element (a CDP remote object id in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How to find one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// First visible match of a CSS selector.
    Css(&'static str),
    /// First visible match of `css` whose text contains `text`, ignoring case.
    CssText {
        css: &'static str,
        text: &'static str,
    },
}

impl Locator {
    pub fn css(&self) -> &'static str {
        match self {
            Locator::Css(css) | Locator::CssText { css, .. } => *css,
        }
    }

    pub fn text(&self) -> Option<&'static str> {
        match self {
            Locator::Css(_) => None,
            Locator::CssText { text, .. } => Some(*text),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "{}", css),
            Locator::CssText { css, text } => write!(f, "{} ~ \"{}\"", css, text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Escape => "Escape",
        }
    }

    pub fn code(&self) -> &'static str {
        self.name()
    }

    pub fn key_code(&self) -> i64 {
        match self {
            Key::Enter => 13,
            Key::Escape => 27,
        }
    }
}

/// Primitive DOM access against one live page.
///
/// `query` searches from the document root, so menus rendered into portals
/// outside their trigger's subtree are still found. It only returns elements
/// that are attached and visible. Every other method may fail on a handle
/// whose node has since been removed; callers check `is_attached` before
/// reusing an old handle.
#[async_trait]
pub trait PageDom: Send + Sync {
    async fn query(&self, locator: &Locator) -> Result<Option<ElementHandle>>;

    async fn is_attached(&self, element: &ElementHandle) -> Result<bool>;

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Focus `element` and replace its contents with `text`. Works for both
    /// textarea and contenteditable composers.
    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()>;

    /// Press `key`, targeting `element` when given, otherwise the focused node.
    async fn press_key(&self, element: Option<&ElementHandle>, key: Key) -> Result<()>;
}

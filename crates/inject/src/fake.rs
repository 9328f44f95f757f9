//! In-memory page used by the engine tests.

use async_trait::async_trait;
use chatmux_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dom::{ElementHandle, Key, Locator, PageDom};

type Hook = Arc<dyn Fn(&mut FakeState) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub id: u64,
    pub name: &'static str,
    pub selectors: Vec<&'static str>,
    pub text: String,
    pub visible: bool,
    pub attached: bool,
    pub attrs: HashMap<String, String>,
    pub value: String,
}

#[derive(Default)]
pub struct FakeState {
    pub elements: Vec<FakeElement>,
    next_id: u64,
    query_count: usize,
    per_selector_queries: HashMap<&'static str, usize>,
    reveal_after: HashMap<&'static str, usize>,
    failing: HashMap<&'static str, String>,
    pub clicks: Vec<&'static str>,
    pub keys: Vec<(Option<&'static str>, Key)>,
    pub fills: Vec<(&'static str, String)>,
}

impl FakeState {
    pub fn add(&mut self, name: &'static str, selectors: &[&'static str]) -> u64 {
        self.add_with_text(name, selectors, "")
    }

    pub fn add_with_text(&mut self, name: &'static str, selectors: &[&'static str], text: &str) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.elements.push(FakeElement {
            id,
            name,
            selectors: selectors.to_vec(),
            text: text.to_string(),
            visible: true,
            attached: true,
            attrs: HashMap::new(),
            value: String::new(),
        });
        id
    }

    fn get(&self, id: u64) -> Option<&FakeElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut FakeElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Latest attached element with this name.
    pub fn live(&self, name: &str) -> Option<u64> {
        self.elements
            .iter()
            .rev()
            .find(|e| e.name == name && e.attached)
            .map(|e| e.id)
    }

    pub fn detach(&mut self, id: u64) {
        if let Some(e) = self.get_mut(id) {
            e.attached = false;
        }
    }

    pub fn detach_named(&mut self, name: &str) {
        for e in self.elements.iter_mut().filter(|e| e.name == name) {
            e.attached = false;
        }
    }

    pub fn set_attr(&mut self, id: u64, attr: &str, value: &str) {
        if let Some(e) = self.get_mut(id) {
            e.attrs.insert(attr.to_string(), value.to_string());
        }
    }

    pub fn set_attr_named(&mut self, name: &str, attr: &str, value: &str) {
        if let Some(id) = self.live(name) {
            self.set_attr(id, attr, value);
        }
    }

    pub fn remove_attr_named(&mut self, name: &str, attr: &str) {
        if let Some(id) = self.live(name) {
            if let Some(e) = self.get_mut(id) {
                e.attrs.remove(attr);
            }
        }
    }

    fn matches(e: &FakeElement, locator: &Locator) -> bool {
        e.attached
            && e.visible
            && e.selectors.contains(&locator.css())
            && locator
                .text()
                .map_or(true, |t| e.text.to_lowercase().contains(&t.to_lowercase()))
    }

    fn attached_element(&self, handle: &ElementHandle) -> Result<&FakeElement> {
        let id = parse_handle(handle)?;
        match self.get(id) {
            Some(e) if e.attached => Ok(e),
            Some(_) => Err(Error::Cdp("Node is detached from document".into())),
            None => Err(Error::Cdp("Could not find object with given id".into())),
        }
    }
}

fn parse_handle(handle: &ElementHandle) -> Result<u64> {
    handle
        .as_str()
        .strip_prefix("fake-")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Cdp(format!("bad handle {}", handle.as_str())))
}

pub fn handle(id: u64) -> ElementHandle {
    ElementHandle::new(format!("fake-{}", id))
}

#[derive(Default)]
pub struct FakeDom {
    state: Mutex<FakeState>,
    click_hooks: Mutex<HashMap<&'static str, Hook>>,
    fill_hooks: Mutex<HashMap<&'static str, Hook>>,
}

impl FakeDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add(&self, name: &'static str, selectors: &[&'static str]) -> u64 {
        self.with(|s| s.add(name, selectors))
    }

    pub fn add_with_text(&self, name: &'static str, selectors: &[&'static str], text: &str) -> u64 {
        self.with(|s| s.add_with_text(name, selectors, text))
    }

    pub fn set_visible(&self, id: u64, visible: bool) {
        self.with(|s| {
            if let Some(e) = s.get_mut(id) {
                e.visible = visible;
            }
        })
    }

    pub fn detach(&self, id: u64) {
        self.with(|s| s.detach(id))
    }

    pub fn set_attr(&self, id: u64, attr: &str, value: &str) {
        self.with(|s| s.set_attr(id, attr, value))
    }

    pub fn fail_queries_for(&self, css: &'static str, message: &str) {
        self.with(|s| {
            s.failing.insert(css, message.to_string());
        })
    }

    /// Queries for `css` match nothing until the `n`th one.
    pub fn reveal_after_queries(&self, css: &'static str, n: usize) {
        self.with(|s| {
            s.reveal_after.insert(css, n);
        })
    }

    pub fn on_click(&self, name: &'static str, hook: impl Fn(&mut FakeState) + Send + Sync + 'static) {
        self.click_hooks.lock().unwrap().insert(name, Arc::new(hook));
    }

    pub fn on_fill(&self, name: &'static str, hook: impl Fn(&mut FakeState) + Send + Sync + 'static) {
        self.fill_hooks.lock().unwrap().insert(name, Arc::new(hook));
    }

    pub fn query_count(&self) -> usize {
        self.with(|s| s.query_count)
    }

    pub fn clicks(&self) -> Vec<&'static str> {
        self.with(|s| s.clicks.clone())
    }

    pub fn keys(&self) -> Vec<(Option<&'static str>, Key)> {
        self.with(|s| s.keys.clone())
    }

    pub fn fills(&self) -> Vec<(&'static str, String)> {
        self.with(|s| s.fills.clone())
    }

    pub fn value_of(&self, id: u64) -> String {
        self.with(|s| s.get(id).map(|e| e.value.clone()).unwrap_or_default())
    }

    pub fn live(&self, name: &str) -> Option<u64> {
        self.with(|s| s.live(name))
    }

    fn run_hook(&self, hooks: &Mutex<HashMap<&'static str, Hook>>, name: &'static str) {
        let hook = hooks.lock().unwrap().get(name).cloned();
        if let Some(hook) = hook {
            self.with(|s| hook(s));
        }
    }
}

#[async_trait]
impl PageDom for FakeDom {
    async fn query(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        self.with(|s| {
            s.query_count += 1;
            let css = locator.css();
            let seen = {
                let n = s.per_selector_queries.entry(css).or_insert(0);
                *n += 1;
                *n
            };
            if let Some(msg) = s.failing.get(css) {
                return Err(Error::Cdp(msg.clone()));
            }
            if let Some(&after) = s.reveal_after.get(css) {
                if seen < after {
                    return Ok(None);
                }
            }
            Ok(s
                .elements
                .iter()
                .find(|e| FakeState::matches(e, locator))
                .map(|e| handle(e.id)))
        })
    }

    async fn is_attached(&self, element: &ElementHandle) -> Result<bool> {
        let id = parse_handle(element)?;
        Ok(self.with(|s| s.get(id).map_or(false, |e| e.attached)))
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.with(|s| Ok(s.attached_element(element)?.attrs.get(name).cloned()))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let name = self.with(|s| {
            let name = s.attached_element(element)?.name;
            s.clicks.push(name);
            Ok::<_, Error>(name)
        })?;
        self.run_hook(&self.click_hooks, name);
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let name = self.with(|s| {
            let id = s.attached_element(element)?.id;
            let e = s.get_mut(id).ok_or_else(|| Error::Cdp("gone".into()))?;
            e.value = text.to_string();
            let name = e.name;
            s.fills.push((name, text.to_string()));
            Ok::<_, Error>(name)
        })?;
        self.run_hook(&self.fill_hooks, name);
        Ok(())
    }

    async fn press_key(&self, element: Option<&ElementHandle>, key: Key) -> Result<()> {
        self.with(|s| {
            let name = match element {
                Some(el) => Some(s.attached_element(el)?.name),
                None => None,
            };
            s.keys.push((name, key));
            Ok(())
        })
    }
}

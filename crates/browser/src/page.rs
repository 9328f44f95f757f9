//! A live page target reached through its flattened CDP session.

use async_trait::async_trait;
use chatmux_core::{Error, Result, TargetId};
use chatmux_inject::{ElementHandle, Key, Locator, PageDom};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cdp::Transport;

/// Evaluate `expression` in the given session and return its value.
pub(crate) async fn evaluate_in(
    transport: &dyn Transport,
    session_id: &str,
    expression: &str,
) -> Result<Value> {
    let result = transport
        .call(
            Some(session_id),
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
            }),
        )
        .await?;
    check_exception(&result)?;
    Ok(result["result"].get("value").cloned().unwrap_or(Value::Null))
}

fn check_exception(result: &Value) -> Result<()> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details["exception"]["description"]
            .as_str()
            .or_else(|| details["text"].as_str())
            .unwrap_or("script exception");
        return Err(Error::Cdp(text.to_string()));
    }
    Ok(())
}

const QUERY_JS: &str = r#"(() => {
  const css = __CSS__;
  const text = __TEXT__;
  const visible = (el) => {
    if (!el.isConnected) return false;
    const style = getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  for (const el of document.querySelectorAll(css)) {
    if (!visible(el)) continue;
    if (text !== null) {
      const content = (el.innerText || el.textContent || '').toLowerCase();
      if (!content.includes(text)) continue;
    }
    return el;
  }
  return null;
})()"#;

const FILL_JS: &str = r#"function(text) {
  if (!this.isConnected) throw new Error('Node is detached from document');
  this.focus();
  if (this instanceof HTMLTextAreaElement || this instanceof HTMLInputElement) {
    const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(this), 'value').set;
    setter.call(this, text);
    this.dispatchEvent(new Event('input', { bubbles: true }));
    return 'native';
  }
  const range = document.createRange();
  range.selectNodeContents(this);
  const selection = window.getSelection();
  selection.removeAllRanges();
  selection.addRange(range);
  if (text === '') document.execCommand('delete');
  return 'editable';
}"#;

const CLICK_JS: &str = r#"function() {
  if (!this.isConnected) throw new Error('Node is detached from document');
  this.scrollIntoView({ block: 'center' });
  const opts = { bubbles: true, cancelable: true, view: window };
  this.dispatchEvent(new PointerEvent('pointerdown', opts));
  this.dispatchEvent(new MouseEvent('mousedown', opts));
  this.dispatchEvent(new PointerEvent('pointerup', opts));
  this.dispatchEvent(new MouseEvent('mouseup', opts));
  this.click();
}"#;

#[derive(Clone)]
pub struct PageHandle {
    target_id: TargetId,
    session_id: String,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("target_id", &self.target_id)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl PageHandle {
    pub fn new(target_id: TargetId, session_id: String, transport: Arc<dyn Transport>) -> Self {
        Self {
            target_id,
            session_id,
            transport,
        }
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.transport
            .call(Some(&self.session_id), method, params)
            .await
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        evaluate_in(self.transport.as_ref(), &self.session_id, expression).await
    }

    /// Evaluate to a remote object; `None` when the expression yields null.
    pub async fn evaluate_handle(&self, expression: &str) -> Result<Option<ElementHandle>> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": false }),
            )
            .await?;
        check_exception(&result)?;
        Ok(result["result"]["objectId"]
            .as_str()
            .map(ElementHandle::new))
    }

    /// Call `function` with `this` bound to `element`.
    pub async fn call_on(
        &self,
        element: &ElementHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
        let result = self
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": element.as_str(),
                    "functionDeclaration": function,
                    "arguments": arguments,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        check_exception(&result)?;
        Ok(result["result"].get("value").cloned().unwrap_or(Value::Null))
    }

    /// Type text at the current selection, bypassing key events.
    pub async fn insert_text(&self, text: &str) -> Result<()> {
        self.call("Input.insertText", json!({ "text": text })).await?;
        Ok(())
    }

    pub async fn key(&self, key: Key) -> Result<()> {
        for event_type in ["keyDown", "keyUp"] {
            let mut params = json!({
                "type": event_type,
                "key": key.name(),
                "code": key.code(),
                "windowsVirtualKeyCode": key.key_code(),
                "nativeVirtualKeyCode": key.key_code(),
            });
            if event_type == "keyDown" && key == Key::Enter {
                params["text"] = json!("\r");
            }
            self.call("Input.dispatchKeyEvent", params).await?;
        }
        Ok(())
    }
}

fn query_expression(locator: &Locator) -> String {
    let css = Value::String(locator.css().to_string()).to_string();
    let text = match locator.text() {
        Some(t) => Value::String(t.to_lowercase()).to_string(),
        None => "null".to_string(),
    };
    QUERY_JS.replace("__CSS__", &css).replace("__TEXT__", &text)
}

#[async_trait]
impl PageDom for PageHandle {
    async fn query(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        self.evaluate_handle(&query_expression(locator)).await
    }

    async fn is_attached(&self, element: &ElementHandle) -> Result<bool> {
        match self
            .call_on(element, "function() { return this.isConnected; }", vec![])
            .await
        {
            Ok(v) => Ok(v.as_bool().unwrap_or(false)),
            // the remote object was released with its document
            Err(Error::Cdp(msg)) if msg.contains("Could not find object") => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let v = self
            .call_on(
                element,
                "function(name) { return this.getAttribute(name); }",
                vec![json!(name)],
            )
            .await?;
        Ok(v.as_str().map(|s| s.to_string()))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.call_on(element, CLICK_JS, vec![]).await?;
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let kind = self.call_on(element, FILL_JS, vec![json!(text)]).await?;
        if kind.as_str() == Some("editable") && !text.is_empty() {
            // rich editors only observe real input events
            self.insert_text(text).await?;
        }
        Ok(())
    }

    async fn press_key(&self, element: Option<&ElementHandle>, key: Key) -> Result<()> {
        if let Some(el) = element {
            self.call_on(el, "function() { this.focus(); }", vec![]).await?;
        }
        self.key(key).await
    }
}

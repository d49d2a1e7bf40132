//! Selector resolution inside the page
//!
//! A [`Selector`] chain is compiled into a list of `[kind, argument]` steps
//! that a small in-page resolver applies left to right, each step narrowing
//! or replacing the current element set.

use crate::errors::AutomationError;
use crate::selector::Selector;
use serde_json::{json, Value};

const RESOLVER: &str = r#"
const __norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const __textOf = (e) => __norm(e.innerText !== undefined ? e.innerText : e.textContent);
const __isVisible = (e) => {
  if (!(e instanceof Element)) return false;
  const st = window.getComputedStyle(e);
  if (st.visibility === 'hidden' || st.display === 'none') return false;
  const r = e.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
};
const __uniq = (arr) => Array.from(new Set(arr));
const __innermost = (roots, pred) => __uniq(roots.flatMap((r) =>
  (r instanceof Element ? [r] : []).concat(Array.from(r.querySelectorAll('*'))).filter((e) =>
    pred(__textOf(e)) && !Array.from(e.children).some((c) => pred(__textOf(c))))));
const __steps = {
  css: (roots, a) => __uniq(roots.flatMap((r) => Array.from(r.querySelectorAll(a)))),
  xpath: (roots, a) => __uniq(roots.flatMap((r) => {
    const out = [];
    const res = document.evaluate(a, r, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    for (let i = 0; i < res.snapshotLength; i++) {
      const n = res.snapshotItem(i);
      if (n instanceof Element) out.push(n);
    }
    return out;
  })),
  id: (roots, a) => __steps.css(roots, '#' + CSS.escape(a)),
  text: (roots, a) => {
    const t = a.toLowerCase();
    return __innermost(roots, (s) => s.toLowerCase().includes(t));
  },
  exact: (roots, a) => __innermost(roots, (s) => s === a),
  hasText: (roots, a) => {
    const t = a.toLowerCase();
    return roots.filter((e) => e instanceof Element && __textOf(e).toLowerCase().includes(t));
  },
  visible: (roots, a) => roots.filter((e) => __isVisible(e) === a),
  nth: (roots, a) => {
    const i = a < 0 ? roots.length + a : a;
    return i >= 0 && i < roots.length ? [roots[i]] : [];
  },
};
const __resolve = (steps) => {
  let roots = [document];
  for (const [kind, arg] of steps) roots = __steps[kind](roots, arg);
  return roots.filter((e) => e instanceof Element);
};
"#;

fn push_steps(selector: &Selector, out: &mut Vec<Value>) -> Result<(), AutomationError> {
    let step = match selector {
        Selector::Css(s) => json!(["css", s]),
        Selector::XPath(s) => json!(["xpath", s]),
        Selector::Id(s) => json!(["id", s]),
        Selector::Text(s) => json!(["text", s]),
        Selector::ExactText(s) => json!(["exact", s]),
        Selector::HasText(s) => json!(["hasText", s]),
        Selector::Visible(v) => json!(["visible", v]),
        Selector::Nth(n) => json!(["nth", n]),
        Selector::Chain(parts) => {
            for part in parts {
                push_steps(part, out)?;
            }
            return Ok(());
        }
        Selector::Invalid(reason) => {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }
    };
    out.push(step);
    Ok(())
}

/// Wraps `body` in an expression that resolves `selector` into `els` and
/// `el` (the first match, or `undefined`) before running it.
pub fn compile_resolver(selector: &Selector, body: &str) -> Result<String, AutomationError> {
    let mut steps = Vec::new();
    push_steps(selector, &mut steps)?;
    let steps = serde_json::to_string(&steps)
        .map_err(|e| AutomationError::Internal(format!("selector serialize: {e}")))?;
    Ok(format!(
        "(() => {{{RESOLVER}\nconst els = __resolve({steps});\nconst el = els[0];\n{body}\n}})()"
    ))
}

pub(crate) const COUNT: &str = "return els.length;";

pub(crate) const IS_VISIBLE: &str = "return !!el && __isVisible(el);";

pub(crate) const IS_ENABLED: &str = "return !!el && !el.disabled \
    && el.getAttribute('aria-disabled') !== 'true' \
    && !el.classList.contains('p-disabled');";

pub(crate) const TEXT_CONTENT: &str = "return el ? el.textContent : null;";

pub(crate) const SCROLL_INTO_VIEW: &str = "if (!el) return false; \
    el.scrollIntoView({ block: 'center', inline: 'center' }); return true;";

/// Scrolls the first match into view and returns its centre point.
pub(crate) const CLICK_POINT: &str = "if (!el) return null; \
    el.scrollIntoView({ block: 'center', inline: 'center' }); \
    const r = el.getBoundingClientRect(); \
    return { x: r.left + r.width / 2, y: r.top + r.height / 2 };";

/// Body for filling the first match with the JSON string `value`.
pub(crate) fn fill_body(value: &str) -> Result<String, AutomationError> {
    let value = serde_json::to_string(value)
        .map_err(|e| AutomationError::Internal(format!("fill value serialize: {e}")))?;
    Ok(format!(
        "if (!el) return false;
const v = {value};
el.focus();
if (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement) {{
  const proto = el instanceof HTMLInputElement ? HTMLInputElement.prototype : HTMLTextAreaElement.prototype;
  const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
  setter.call(el, v);
}} else if (el.isContentEditable) {{
  el.textContent = v;
}} else {{
  return false;
}}
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
return true;"
    ))
}

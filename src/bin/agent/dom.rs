use anyhow::{Result, anyhow};
use browser_pilot::{NodeRef, StructuralSnapshot};
use headless_chrome::Tab;
use std::sync::Arc;

/// JavaScript evaluated in the page to describe one element.
/// READ-ONLY: inspects the element and its direct children, changes nothing.
///
/// `__SELECTOR__` is replaced by a JSON string literal. The script returns a
/// JSON string, or null if the selector matches nothing:
///   tag, attributes, trimmed text (100 chars), visibility,
///   per-tag child counts, and the first child of each tag as an exemplar.
const STRUCTURE_JS: &str = r#"
(() => {
  const el = document.querySelector(__SELECTOR__);
  if (!el) return null;

  const visible = (e) => e.offsetWidth > 0 && e.offsetHeight > 0;
  const attrs = (e) => {
    const out = {};
    for (const a of e.attributes) out[a.name] = a.value;
    return out;
  };
  const text = (e, max) => (e.textContent || '').trim().slice(0, max);

  const result = {
    tag: el.tagName.toLowerCase(),
    attributes: attrs(el),
    text: text(el, 100),
    visible: visible(el),
    child_counts: {},
    exemplar_children: {}
  };

  for (const child of el.children) {
    const tag = child.tagName.toLowerCase();
    if (!(tag in result.child_counts)) {
      result.child_counts[tag] = 0;
      result.exemplar_children[tag] = {
        tag: tag,
        attributes: attrs(child),
        text: text(child, 50),
        visible: visible(child),
        child_count: child.children.length
      };
    }
    result.child_counts[tag] += 1;
  }

  return JSON.stringify(result);
})()
"#;

/// Capture a structural snapshot of the element matching `node`.
pub fn capture_structure(tab: &Arc<Tab>, node: &NodeRef) -> Result<StructuralSnapshot> {
    let selector = serde_json::to_string(node.as_str())?;
    let script = STRUCTURE_JS.replace("__SELECTOR__", &selector);
    let result = tab.evaluate(&script, false)?;
    let raw = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| anyhow!("no element matches {node}"))?;

    let snapshot: StructuralSnapshot = serde_json::from_str(&raw)?;
    Ok(snapshot.normalized())
}

/// Clear the value of the element matching `selector`.
pub fn clear_value(tab: &Arc<Tab>, selector: &NodeRef) -> Result<()> {
    let selector = serde_json::to_string(selector.as_str())?;
    tab.evaluate(
        &format!("(() => {{ const el = document.querySelector({selector}); if (el && 'value' in el) el.value = ''; }})()"),
        false,
    )?;
    Ok(())
}

/// Get the current page URL.
pub fn get_current_url(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("window.location.href", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "unknown".to_string()))
}

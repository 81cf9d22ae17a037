//! The event type and the small dot-path JSON helpers that sit underneath
//! both the transform operators and the sink batcher's timestamp extraction.
//!
//! A general JSON-path engine is an external collaborator (see the purpose
//! section of the top-level design docs); what lives here is the minimum a
//! handful of fixed operators need: get a value at a dotted path, set one,
//! delete one.

use serde_json::Value;

/// An opaque, JSON-encoded log record. Events are values: once sent on a
/// channel they are never mutated again by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event(String);

impl Event {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Number of bytes the event occupies, used by the batcher's size
    /// accounting (`len()` on the underlying string, not a character count).
    pub fn byte_len(&self) -> usize {
        self.0.len()
    }

    /// Parses the event as JSON and returns the value at `path`, or `None`
    /// if the event is not valid JSON or the path is missing.
    pub fn get(&self, path: &str) -> Option<Value> {
        let doc: Value = serde_json::from_str(&self.0).ok()?;
        get_path(&doc, path).cloned()
    }

    /// Returns the value at `path` rendered as a string: string values are
    /// returned bare, everything else via its JSON representation, matching
    /// gjson's `Value.String()` semantics that the transform operators rely
    /// on.
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Returns a new event with `value` set at `path`, creating intermediate
    /// objects as needed.
    pub fn set(&self, path: &str, value: Value) -> Event {
        let mut doc: Value = serde_json::from_str(&self.0).unwrap_or(Value::Object(Default::default()));
        set_path(&mut doc, path, value);
        Event(doc.to_string())
    }

    /// Returns a new event with the value at `path` removed. A missing path
    /// is a no-op.
    pub fn delete(&self, path: &str) -> Event {
        let mut doc: Value = match serde_json::from_str(&self.0) {
            Ok(v) => v,
            Err(_) => return self.clone(),
        };
        delete_path(&mut doc, path);
        Event(doc.to_string())
    }
}

impl From<String> for Event {
    fn from(s: String) -> Self {
        Event(s)
    }
}

impl From<&str> for Event {
    fn from(s: &str) -> Self {
        Event(s.to_string())
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered sequence of events, the channel message unit between workers.
pub type EventBatch = Vec<Event>;

fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = doc;
    for part in path.split('.') {
        cur = cur.get(part)?;
    }
    Some(cur)
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut cur = doc;
    for part in &parts[..parts.len().saturating_sub(1)] {
        if !cur.is_object() {
            *cur = Value::Object(Default::default());
        }
        let map = cur.as_object_mut().expect("just coerced to object");
        cur = map.entry(part.to_string()).or_insert(Value::Object(Default::default()));
    }
    if !cur.is_object() && parts.len() > 1 {
        *cur = Value::Object(Default::default());
    }
    if let Some(last) = parts.last() {
        if parts.len() == 1 {
            if !doc.is_object() {
                *doc = Value::Object(Default::default());
            }
            doc.as_object_mut()
                .expect("just coerced to object")
                .insert(last.to_string(), value);
        } else {
            cur.as_object_mut()
                .expect("just coerced to object")
                .insert(last.to_string(), value);
        }
    }
}

fn delete_path(doc: &mut Value, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() == 1 {
        if let Some(map) = doc.as_object_mut() {
            map.remove(parts[0]);
        }
        return;
    }
    let mut cur = doc;
    for part in &parts[..parts.len() - 1] {
        match cur.get_mut(part) {
            Some(next) => cur = next,
            None => return,
        }
    }
    if let Some(map) = cur.as_object_mut() {
        map.remove(parts[parts.len() - 1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_delete_round_trip() {
        let e = Event::new(r#"{"a":{"b":1},"severity":"info"}"#);
        assert_eq!(e.get_string("severity").as_deref(), Some("info"));
        assert_eq!(e.get("a.b"), Some(Value::from(1)));

        let e2 = e.set("a.c", Value::from("new"));
        assert_eq!(e2.get_string("a.c").as_deref(), Some("new"));
        // original untouched (events are values)
        assert_eq!(e.get("a.c"), None);

        let e3 = e2.delete("a.b");
        assert_eq!(e3.get("a.b"), None);
        assert_eq!(e3.get_string("a.c").as_deref(), Some("new"));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let e = Event::new("{}");
        let e2 = e.set("newField.sub.graph", Value::from(538));
        assert_eq!(e2.get("newField.sub.graph"), Some(Value::from(538)));
    }

    #[test]
    fn byte_len_counts_bytes_not_chars() {
        let e = Event::new("日本語");
        assert_eq!(e.byte_len(), "日本語".len());
        assert_ne!(e.byte_len(), "日本語".chars().count());
    }
}

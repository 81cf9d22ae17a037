//! Shared helpers for sources that receive a JSON array as a raw string and
//! need to split it into individual event strings without a full parse
//! pass (so malformed trailing data doesn't lose the whole batch).
//! Grounded on `integrations/sources/source_python.go`'s
//! `EventBreakJSONArray`.

/// Splits a JSON array's textual representation into its element strings,
/// tracking brace depth rather than parsing, matching the original's
/// brace-depth comma-splitter.
pub fn event_break_json_array(json: &str) -> Vec<String> {
    let trimmed = json.trim();
    let without_lead = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let inner = without_lead.strip_suffix(']').unwrap_or(without_lead);

    let mut events = Vec::new();
    let mut level: i32 = 0;
    let mut start = 0usize;
    let chars: Vec<char> = inner.chars().collect();
    for (idx, &c) in chars.iter().enumerate() {
        match c {
            '{' => level += 1,
            '}' => level -= 1,
            ',' if level == 0 => {
                let event: String = chars[start..idx].iter().collect();
                events.push(event.trim().to_string());
                start = idx + 1;
            }
            _ => {}
        }
    }
    if start < chars.len() {
        let event: String = chars[start..].iter().collect();
        let event = event.trim();
        if !event.is_empty() {
            events.push(event.to_string());
        }
    }
    events
}

use serde::Serialize;

/// Upper bound on dumped documents so a large registry cannot flood the log.
const MAX_DEBUG_DUMP_CHARS: usize = 16 * 1024;

pub(crate) fn with_pretty_json_debug<T, F>(value: &T, log_action: F)
where
    T: Serialize,
    F: FnOnce(&str),
{
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let mut pretty_json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|error| format!("<pretty serialize failed: {error}>"));
    if let Some((idx, _)) = pretty_json.char_indices().nth(MAX_DEBUG_DUMP_CHARS) {
        pretty_json.truncate(idx);
        pretty_json.push_str("...<truncated>");
    }
    log_action(pretty_json.as_str());
}

use crate::error::ChatError;

/// Default upper bound on user text handed to the CLI, in characters.
pub const MAX_MESSAGE_CHARS: usize = 50_000;

/// Neutralize shell metacharacters before text becomes a CLI argument.
///
/// `$` is escaped; `;`, `|`, `&` and backticks are dropped; newlines
/// become single spaces and carriage returns are removed. Text longer than
/// `max_chars` is rejected outright.
pub fn sanitize_input(input: &str, max_chars: usize) -> Result<String, ChatError> {
    let length = input.chars().count();
    if length > max_chars {
        return Err(ChatError::invalid_input(format!(
            "message exceeds maximum length of {} characters ({} given)",
            max_chars, length
        )));
    }

    let mut sanitized = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '$' => sanitized.push_str("\\$"),
            ';' | '|' | '&' | '`' | '\r' => {}
            '\n' => sanitized.push(' '),
            other => sanitized.push(other),
        }
    }
    Ok(sanitized)
}

//! Server-supplied text (error messages, response bodies) ends up in logs and
//! on the kiosk screen. It is cleaned here first so a hostile or broken reply
//! cannot inject terminal escapes or flood the display.

/// Longest server message shown in a notice.
pub const MAX_NOTICE_CHARS: usize = 160;
/// Longest response body excerpt written to the log.
pub const MAX_LOG_CHARS: usize = 1024;

#[derive(Clone, Copy)]
enum Escape {
    Start,
    Csi,
    Osc,
    OscEsc,
    String,
    StringEsc,
}

/// Strip escape sequences and control characters, fold line breaks and tabs
/// into single spaces, and cut the result at `max_chars`.
pub fn clean(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars));
    let mut esc: Option<Escape> = None;
    let mut count = 0usize;
    let mut pending_space = false;

    for c in input.chars() {
        if let Some(mode) = esc {
            esc = match (mode, c) {
                (Escape::Start, '[') => Some(Escape::Csi),
                (Escape::Start, ']') => Some(Escape::Osc),
                (Escape::Start, 'P' | 'X' | '^' | '_') => Some(Escape::String),
                (Escape::Start, _) => None,
                (Escape::Csi, '@'..='~') => None,
                (Escape::Csi, _) => Some(Escape::Csi),
                (Escape::Osc, '\x07') => None,
                (Escape::Osc, '\x1b') => Some(Escape::OscEsc),
                (Escape::Osc, _) => Some(Escape::Osc),
                (Escape::OscEsc, '\\') => None,
                (Escape::OscEsc, '\x1b') => Some(Escape::OscEsc),
                (Escape::OscEsc, _) => Some(Escape::Osc),
                (Escape::String, '\x1b') => Some(Escape::StringEsc),
                (Escape::String, _) => Some(Escape::String),
                (Escape::StringEsc, '\\') => None,
                (Escape::StringEsc, '\x1b') => Some(Escape::StringEsc),
                (Escape::StringEsc, _) => Some(Escape::String),
            };
            continue;
        }

        if c == '\x1b' {
            esc = Some(Escape::Start);
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if c.is_control() || is_bidi_control(c) {
            continue;
        }

        if count >= max_chars {
            out.push_str("...");
            return out;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
        count += 1;
    }

    out
}

/// Cleaned text suitable for a one-line on-screen notice.
pub fn for_notice(input: &str) -> String {
    clean(input, MAX_NOTICE_CHARS)
}

/// Cleaned text suitable for a log field.
pub fn for_log(input: &str) -> String {
    clean(input, MAX_LOG_CHARS)
}

fn is_bidi_control(c: char) -> bool {
    c == '\u{061C}'
        || c == '\u{200E}'
        || c == '\u{200F}'
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

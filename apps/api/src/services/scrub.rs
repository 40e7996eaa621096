//! Mechanical PII scrubbing applied before any text leaves the process.

/// Minimum digits for a run to be treated as a phone number.
const PHONE_MIN_DIGITS: usize = 9;

/// Replaces e-mail addresses, links and phone numbers with placeholders.
pub fn scrub_contact_details(text: &str) -> String {
    let words: String = text
        .split_inclusive(char::is_whitespace)
        .map(|chunk| {
            let word = chunk.trim_end();
            let trailing = &chunk[word.len()..];
            let core = word.trim_end_matches(|c: char| matches!(c, ',' | ';' | ')' | '.'));
            let punct = &word[core.len()..];
            let replaced = if is_link(core) {
                Some("[LINK]")
            } else if is_email(core) {
                Some("[EMAIL]")
            } else {
                None
            };
            match replaced {
                Some(tag) => format!("{tag}{punct}{trailing}"),
                None => chunk.to_string(),
            }
        })
        .collect();
    scrub_phone_numbers(&words)
}

fn is_email(word: &str) -> bool {
    match word.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

fn is_link(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.")
}

fn scrub_phone_numbers(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let starts_run = chars[i].is_ascii_digit() || (chars[i] == '+' && chars.get(i + 1).map_or(false, |c| c.is_ascii_digit()));
        if !starts_run {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let mut end = i;
        let mut digits = 0;
        let mut last_digit = i;
        while end < chars.len() && is_phone_char(chars[end]) {
            if chars[end].is_ascii_digit() {
                digits += 1;
                last_digit = end;
            }
            end += 1;
        }
        if digits >= PHONE_MIN_DIGITS {
            out.push_str("[PHONE]");
            i = last_digit + 1;
        } else {
            out.extend(&chars[i..end]);
            i = end;
        }
    }
    out
}

fn is_phone_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '+' | '.')
}

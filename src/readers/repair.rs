//! Repair of JSON logs cut off mid-write.
//!
//! The device appends records to an open array; a crash or a full disk
//! leaves the file without its closing brackets, sometimes in the middle of
//! a record. Repair cuts back to the last complete element of the top-level
//! array and closes it. A truncated top-level object cannot be cut back to a
//! whole record, so it is left as is and fails to parse.

use std::borrow::Cow;

/// Return `bytes` unchanged when balanced, otherwise a closed-off copy
pub fn repair_json(bytes: &[u8]) -> Cow<'_, [u8]> {
    let trimmed = trim_trailing(bytes);

    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    // byte offset just past the last complete top-level array element
    let mut safe_cut: Option<usize> = None;

    for (i, &b) in trimmed.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                stack.push(b);
                if stack.as_slice() == b"[" {
                    safe_cut = Some(i + 1);
                }
            }
            b']' | b'}' => {
                stack.pop();
                if stack.as_slice() == b"[" {
                    safe_cut = Some(i + 1);
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() && !in_string {
        return Cow::Borrowed(trimmed);
    }

    let Some(cut) = safe_cut else {
        log::debug!("Truncated JSON has no complete top-level element, left unrepaired");
        return Cow::Borrowed(trimmed);
    };

    let mut repaired = strip_dangling_comma(&trimmed[..cut]).to_vec();
    repaired.push(b']');
    log::debug!(
        "Repaired truncated JSON: kept {} of {} bytes",
        cut,
        trimmed.len()
    );
    Cow::Owned(repaired)
}

fn trim_trailing(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !matches!(b, 0 | b' ' | b'\n' | b'\r' | b'\t'))
        .map(|i| i + 1)
        .unwrap_or(0);
    &bytes[..end]
}

fn strip_dangling_comma(bytes: &[u8]) -> &[u8] {
    let trimmed = trim_trailing(bytes);
    match trimmed.last() {
        Some(b',') => trim_trailing(&trimmed[..trimmed.len() - 1]),
        _ => trimmed,
    }
}

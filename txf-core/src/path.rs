//! Filename helpers shared by both ends of a transfer.
//!
//! All functions treat their input as single-byte characters; anything
//! outside ASCII is passed through unchanged but counted per `char`.

use std::path::MAIN_SEPARATOR;

use crate::protocol::FILE_NAME_LEN;

const DELIMITER: char = '/';
const ESCAPE: char = '%';

/// Rewrites a user supplied path into a local one.
///
/// At most `max_len - 1` input characters are considered; the rest is
/// dropped without error. Within that window:
///
/// * `/` becomes the platform separator,
/// * `:` becomes `.`,
/// * `%` is an escape: the following character is copied verbatim and the
///   `%` itself is dropped. The escaped character still counts toward the
///   window, so an escape on the last position yields nothing.
#[must_use]
pub fn normalize_path(input: &str, max_len: usize) -> String {
    let window = max_len.saturating_sub(1);
    let mut out = String::with_capacity(window);
    let mut chars = input.chars().take(window);

    while let Some(c) = chars.next() {
        match c {
            DELIMITER => out.push(MAIN_SEPARATOR),
            ':' => out.push('.'),
            ESCAPE => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Returns the transferable name of `path`: the part after the last
/// separator, cut to [`FILE_NAME_LEN`] characters.
///
/// Both `/` and the platform separator count as separators. The result may
/// be empty (e.g. for `"dir/"`); callers must reject that.
#[must_use]
pub fn extract_filename(path: &str) -> String {
    let start = path
        .rfind([DELIMITER, MAIN_SEPARATOR])
        .map_or(0, |i| i + 1);

    path[start..].chars().take(FILE_NAME_LEN).collect()
}

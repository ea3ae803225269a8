/// Keyword that introduces a manual tool change inside a G-code comment.
pub const MARKER_KEYWORD: &str = "MANUAL_TOOL_CHANGE T";

/// Tool number of a `; MANUAL_TOOL_CHANGE T<n>` marker, if `line` carries one.
///
/// Only the comment part of the line (after the first `;`) is searched and
/// only the first marker counts. A tool number that does not fit `u32` is
/// not a marker.
pub fn parse_tool_change_marker(line: &str) -> Option<u32> {
    let (_, comment) = line.split_once(';')?;
    let start = comment.find(MARKER_KEYWORD)? + MARKER_KEYWORD.len();
    let tail = &comment[start..];
    let digits_end = tail
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(tail.len());
    if digits_end == 0 {
        return None;
    }
    tail[..digits_end].parse().ok()
}

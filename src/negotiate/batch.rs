//! Packing capability names into `CAP REQ` lines.

use crate::transport::MAX_LINE_LEN;

/// Largest budget whose lines still fit in [`MAX_LINE_LEN`] once framed as
/// `CAP REQ :<names>`.
pub const MAX_REQUEST_BUDGET: usize = MAX_LINE_LEN - "CAP REQ :".len();

/// Default per-line budget for the name list.
///
/// Leaves room under the 512 byte line limit for `CAP REQ :` framing and
/// message tags.
pub const DEFAULT_REQUEST_BUDGET: usize = 450;

/// Pack `names` into space-separated lines.
///
/// A line is flushed before appending a name would bring the accumulated
/// length to `budget` or beyond. A single name that alone reaches the budget
/// gets a line of its own.
pub fn batch_requests<S: AsRef<str>>(names: &[S], budget: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for name in names {
        let name = name.as_ref();
        if !line.is_empty() && line.len() + name.len() >= budget {
            lines.push(line.trim_end().to_owned());
            line.clear();
        }
        line.push_str(name);
        line.push(' ');
    }

    let last = line.trim_end();
    if !last.is_empty() {
        lines.push(last.to_owned());
    }

    lines
}

//! Line-based three-way content merge.
//!
//! Both sides are diffed against the shared base; non-overlapping edits
//! combine cleanly, overlapping ones produce inline conflict markers
//! (`<<<<<<<` local, `|||||||` base when non-empty, `=======`, `>>>>>>>`
//! annotated with the short remote commit id).

use std::ops::Range;

use similar::{capture_diff_slices, Algorithm, DiffOp};

/// Outcome of a three-way merge; both variants carry the merged text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merged {
    Clean(String),
    Conflicted(String),
}

impl Merged {
    pub fn text(&self) -> &str {
        match self {
            Merged::Clean(text) | Merged::Conflicted(text) => text,
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, Merged::Conflicted(_))
    }
}

/// One non-equal region of a two-way diff, in base and side coordinates.
///
/// Overlap tests run in doubled base coordinates where line `i` occupies
/// `[2i, 2i+2)` and the gap before it sits at `2i-1`. A pure insertion
/// then touches a change that ends at its position but not one that starts
/// there, which is what keeps adjacent edits from conflicting.
#[derive(Debug, Clone)]
struct Change {
    base: Range<usize>,
    side: Range<usize>,
}

impl Change {
    fn doubled(&self) -> Range<usize> {
        if self.base.is_empty() {
            // the gap before base line `start`
            (2 * self.base.start).saturating_sub(1)..2 * self.base.start
        } else {
            2 * self.base.start..2 * self.base.end
        }
    }
}

fn changes(ops: &[DiffOp]) -> Vec<Change> {
    ops.iter()
        .filter_map(|op| match *op {
            DiffOp::Equal { .. } => None,
            DiffOp::Delete {
                old_index,
                old_len,
                new_index,
            } => Some(Change {
                base: old_index..old_index + old_len,
                side: new_index..new_index,
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => Some(Change {
                base: old_index..old_index,
                side: new_index..new_index + new_len,
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => Some(Change {
                base: old_index..old_index + old_len,
                side: new_index..new_index + new_len,
            }),
        })
        .collect()
}

/// Merge `local` and `remote` against their common `base`, line by line.
pub fn merge_lines(base: &str, local: &str, remote: &str, remote_label: &str) -> Merged {
    // trivial cases need no diffing
    if local == remote {
        return Merged::Clean(local.to_string());
    }
    if base == local {
        return Merged::Clean(remote.to_string());
    }
    if base == remote {
        return Merged::Clean(local.to_string());
    }

    let base_lines: Vec<&str> = split_lines(base);
    let local_lines: Vec<&str> = split_lines(local);
    let remote_lines: Vec<&str> = split_lines(remote);

    let local_changes = changes(&capture_diff_slices(
        Algorithm::Myers,
        &base_lines,
        &local_lines,
    ));
    let remote_changes = changes(&capture_diff_slices(
        Algorithm::Myers,
        &base_lines,
        &remote_lines,
    ));

    let mut out = String::new();
    let mut conflicted = false;
    let mut base_pos = 0;
    let mut li = 0;
    let mut ri = 0;
    // running (side length - base length) offset of consumed changes
    let mut local_offset: isize = 0;
    let mut remote_offset: isize = 0;

    loop {
        let next_local = local_changes.get(li).map(|c| c.doubled().start);
        let next_remote = remote_changes.get(ri).map(|c| c.doubled().start);
        let dlo = match (next_local, next_remote) {
            (None, None) => break,
            (Some(l), None) => l,
            (None, Some(r)) => r,
            (Some(l), Some(r)) => l.min(r),
        };

        // seed with the change(s) starting exactly at dlo, then grow the
        // hunk while either side strictly overlaps it
        let mut dhi = dlo;
        let local_from = li;
        let remote_from = ri;
        if li < local_changes.len() && local_changes[li].doubled().start == dlo {
            dhi = dhi.max(local_changes[li].doubled().end);
            li += 1;
        }
        if ri < remote_changes.len() && remote_changes[ri].doubled().start == dlo {
            dhi = dhi.max(remote_changes[ri].doubled().end);
            ri += 1;
        }
        loop {
            let mut grew = false;
            while li < local_changes.len() && local_changes[li].doubled().start < dhi {
                dhi = dhi.max(local_changes[li].doubled().end);
                li += 1;
                grew = true;
            }
            while ri < remote_changes.len() && remote_changes[ri].doubled().start < dhi {
                dhi = dhi.max(remote_changes[ri].doubled().end);
                ri += 1;
                grew = true;
            }
            if !grew {
                break;
            }
        }

        // back to base line coordinates
        let lo = (dlo + 1) / 2;
        let hi = dhi / 2;

        // common region before the hunk
        for line in &base_lines[base_pos..lo] {
            out.push_str(line);
        }

        let local_touched = li > local_from;
        let remote_touched = ri > remote_from;

        let local_region = side_region(&local_changes[local_from..li], lo, hi, &mut local_offset);
        let remote_region =
            side_region(&remote_changes[remote_from..ri], lo, hi, &mut remote_offset);
        let local_text = &local_lines[local_region];
        let remote_text = &remote_lines[remote_region];

        if local_touched && remote_touched && local_text != remote_text {
            conflicted = true;
            push_block(&mut out, "<<<<<<< local\n", local_text);
            if hi > lo {
                push_block(&mut out, "||||||| base\n", &base_lines[lo..hi]);
            }
            push_marker(&mut out, "=======\n");
            for line in remote_text {
                out.push_str(line);
            }
            push_marker(&mut out, &format!(">>>>>>> {}\n", remote_label));
        } else if local_touched && (!remote_touched || local_text == remote_text) {
            for line in local_text {
                out.push_str(line);
            }
        } else {
            for line in remote_text {
                out.push_str(line);
            }
        }

        base_pos = hi;
    }

    // common tail
    for line in &base_lines[base_pos..] {
        out.push_str(line);
    }

    if conflicted {
        Merged::Conflicted(out)
    } else {
        Merged::Clean(out)
    }
}

/// Map the base hunk `[lo, hi)` into one side's line range, updating the
/// running offset with the changes consumed by this hunk.
fn side_region(consumed: &[Change], lo: usize, hi: usize, offset: &mut isize) -> Range<usize> {
    let start = (lo as isize + *offset) as usize;
    for change in consumed {
        *offset += change.side.len() as isize - change.base.len() as isize;
    }
    let end = (hi as isize + *offset) as usize;
    start..end
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn push_marker(out: &mut String, marker: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(marker);
}

fn push_block(out: &mut String, marker: &str, lines: &[&str]) {
    push_marker(out, marker);
    for line in lines {
        out.push_str(line);
    }
}

//! Text diffs for long-form fields.
//!
//! Myers' O(ND) algorithm in its linear-space form (bisecting on the middle
//! snake) over word or character tokens, followed by a
//! semantic cleanup pass that folds short equalities sandwiched between edits
//! into the edits, so a rewritten phrase shows as one deletion and one
//! insertion instead of alternating fragments.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSpan {
    pub op: DiffOp,
    pub text: String,
}

impl DiffSpan {
    fn new(op: DiffOp, text: impl Into<String>) -> Self {
        Self { op, text: text.into() }
    }
}

/// Token granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMethod {
    #[default]
    Words,
    Chars,
}

/// How a diff is rendered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffView {
    /// One text with `<del>`/`<ins>` markup.
    #[default]
    Merged,
    /// Old text above new text, each with its own changes marked.
    SideBySide,
    /// Separate diff, new and old sections.
    Tabbed,
}

impl FromStr for DiffView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "merged" => Ok(DiffView::Merged),
            "side_by_side" | "stacked" => Ok(DiffView::SideBySide),
            "tabbed" => Ok(DiffView::Tabbed),
            other => Err(format!("unknown diff view '{other}' (expected merged, side-by-side or tabbed)")),
        }
    }
}

impl fmt::Display for DiffView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffView::Merged => "merged",
            DiffView::SideBySide => "side_by_side",
            DiffView::Tabbed => "tabbed",
        })
    }
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+|\s+|[^\w\s]").unwrap())
}

/// Split into words, whitespace runs and single punctuation marks. The
/// tokens concatenate back to the input.
pub fn tokenize_words(text: &str) -> Vec<&str> {
    word_regex().find_iter(text).map(|m| m.as_str()).collect()
}

fn tokenize_chars(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}

/// Diff two texts and apply semantic cleanup.
pub fn diff(old: &str, new: &str, method: DiffMethod) -> Vec<DiffSpan> {
    let (a, b) = match method {
        DiffMethod::Words => (tokenize_words(old), tokenize_words(new)),
        DiffMethod::Chars => (tokenize_chars(old), tokenize_chars(new)),
    };
    let mut spans: Vec<DiffSpan> = Vec::new();
    for (op, token) in myers(&a, &b) {
        match spans.last_mut() {
            Some(last) if last.op == op => last.text.push_str(token),
            _ => spans.push(DiffSpan::new(op, token)),
        }
    }
    cleanup_semantic(spans)
}

/// Shortest edit script as a token sequence.
fn myers<'t>(a: &[&'t str], b: &[&'t str]) -> Vec<(DiffOp, &'t str)> {
    let mut edits = Vec::with_capacity(a.len() + b.len());
    diff_range(a, b, &mut edits);
    edits
}

/// Strip the common prefix and suffix, then split the remainder at a point
/// on an optimal path and recurse. Memory stays linear in the input.
fn diff_range<'t>(a: &[&'t str], b: &[&'t str], out: &mut Vec<(DiffOp, &'t str)>) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    out.extend(a[..prefix].iter().map(|t| (DiffOp::Equal, *t)));
    let (a, b) = (&a[prefix..], &b[prefix..]);

    let suffix = a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count();
    let (a_mid, b_mid) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);

    if a_mid.is_empty() {
        out.extend(b_mid.iter().map(|t| (DiffOp::Insert, *t)));
    } else if b_mid.is_empty() {
        out.extend(a_mid.iter().map(|t| (DiffOp::Delete, *t)));
    } else {
        match middle_snake(a_mid, b_mid) {
            Some((x, y))
                if x <= a_mid.len() && y <= b_mid.len() && (x, y) != (0, 0) && (x, y) != (a_mid.len(), b_mid.len()) =>
            {
                diff_range(&a_mid[..x], &b_mid[..y], out);
                diff_range(&a_mid[x..], &b_mid[y..], out);
            }
            _ => {
                out.extend(a_mid.iter().map(|t| (DiffOp::Delete, *t)));
                out.extend(b_mid.iter().map(|t| (DiffOp::Insert, *t)));
            }
        }
    }

    out.extend(a[a.len() - suffix..].iter().map(|t| (DiffOp::Equal, *t)));
}

/// Run the forward and reverse searches until they overlap and return the
/// overlap point `(x, y)`. Only two diagonal vectors are kept.
fn middle_snake(a: &[&str], b: &[&str]) -> Option<(usize, usize)> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let offset = max_d;
    let len = 2 * max_d + 2;
    let mut forward = vec![-1isize; len as usize];
    let mut reverse = vec![-1isize; len as usize];
    forward[(offset + 1) as usize] = 0;
    reverse[(offset + 1) as usize] = 0;

    let delta = n - m;
    // With an odd delta the forward front is the one that can close the overlap.
    let front = delta % 2 != 0;
    let (mut k1_start, mut k1_end, mut k2_start, mut k2_end) = (0, 0, 0, 0);

    for d in 0..max_d {
        let mut k1 = -d + k1_start;
        while k1 <= d - k1_end {
            let i = (offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && forward[i - 1] < forward[i + 1]) {
                forward[i + 1]
            } else {
                forward[i - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            forward[i] = x1;
            if x1 > n {
                k1_end += 2;
            } else if y1 > m {
                k1_start += 2;
            } else if front {
                let j = offset + delta - k1;
                if (0..len).contains(&j) && reverse[j as usize] != -1 && x1 >= n - reverse[j as usize] {
                    return Some((x1 as usize, y1 as usize));
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2_start;
        while k2 <= d - k2_end {
            let i = (offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && reverse[i - 1] < reverse[i + 1]) {
                reverse[i + 1]
            } else {
                reverse[i - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < n && y2 < m && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize] {
                x2 += 1;
                y2 += 1;
            }
            reverse[i] = x2;
            if x2 > n {
                k2_end += 2;
            } else if y2 > m {
                k2_start += 2;
            } else if !front {
                let j = offset + delta - k2;
                if (0..len).contains(&j) && forward[j as usize] != -1 {
                    let x1 = forward[j as usize];
                    let y1 = offset + x1 - j;
                    if x1 >= n - x2 && y1 >= 0 {
                        return Some((x1 as usize, y1 as usize));
                    }
                }
            }
            k2 += 2;
        }
    }
    None
}

/// Fold equalities no longer than the edits on both sides of them into
/// those edits, then regroup every run of edits as one deletion followed by
/// one insertion.
pub fn cleanup_semantic(spans: Vec<DiffSpan>) -> Vec<DiffSpan> {
    let mut spans = spans;
    loop {
        let mut changed = false;
        let mut out = Vec::with_capacity(spans.len());
        // Characters edited since the last equality that was kept.
        let mut before = 0;
        for i in 0..spans.len() {
            let len = spans[i].text.chars().count();
            if spans[i].op != DiffOp::Equal {
                before += len;
                out.push(DiffSpan::new(spans[i].op, std::mem::take(&mut spans[i].text)));
                continue;
            }
            let after = edit_len(spans[i + 1..].iter());
            let text = std::mem::take(&mut spans[i].text);
            if before > 0 && after > 0 && len <= before.min(after) {
                out.push(DiffSpan::new(DiffOp::Delete, text.clone()));
                out.push(DiffSpan::new(DiffOp::Insert, text));
                changed = true;
                before += 2 * len;
            } else {
                out.push(DiffSpan::new(DiffOp::Equal, text));
                before = 0;
            }
        }
        spans = regroup(out);
        if !changed {
            return spans;
        }
    }
}

/// Total characters edited from the start of `spans` up to the next equality.
fn edit_len<'s>(spans: impl Iterator<Item = &'s DiffSpan>) -> usize {
    spans
        .take_while(|s| s.op != DiffOp::Equal)
        .map(|s| s.text.chars().count())
        .sum()
}

fn regroup(spans: Vec<DiffSpan>) -> Vec<DiffSpan> {
    let mut out: Vec<DiffSpan> = Vec::new();
    let mut deleted = String::new();
    let mut inserted = String::new();

    for span in spans {
        match span.op {
            DiffOp::Delete => deleted.push_str(&span.text),
            DiffOp::Insert => inserted.push_str(&span.text),
            DiffOp::Equal => {
                flush(&mut out, &mut deleted, &mut inserted);
                if span.text.is_empty() {
                    continue;
                }
                match out.last_mut() {
                    Some(last) if last.op == DiffOp::Equal => last.text.push_str(&span.text),
                    _ => out.push(span),
                }
            }
        }
    }
    flush(&mut out, &mut deleted, &mut inserted);
    out
}

fn flush(out: &mut Vec<DiffSpan>, deleted: &mut String, inserted: &mut String) {
    if !deleted.is_empty() {
        out.push(DiffSpan::new(DiffOp::Delete, std::mem::take(deleted)));
    }
    if !inserted.is_empty() {
        out.push(DiffSpan::new(DiffOp::Insert, std::mem::take(inserted)));
    }
}

/// Old text rebuilt from a diff.
pub fn old_text(spans: &[DiffSpan]) -> String {
    spans.iter().filter(|s| s.op != DiffOp::Insert).map(|s| s.text.as_str()).collect()
}

/// New text rebuilt from a diff.
pub fn new_text(spans: &[DiffSpan]) -> String {
    spans.iter().filter(|s| s.op != DiffOp::Delete).map(|s| s.text.as_str()).collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Merged view with HTML markup.
pub fn render_merged(spans: &[DiffSpan]) -> String {
    spans
        .iter()
        .map(|s| match s.op {
            DiffOp::Equal => escape_html(&s.text),
            DiffOp::Delete => format!("<del>{}</del>", escape_html(&s.text)),
            DiffOp::Insert => format!("<ins>{}</ins>", escape_html(&s.text)),
        })
        .collect()
}

/// Stacked plain-text view: removals marked `[-…-]` in the old text,
/// additions marked `{+…+}` in the new text.
pub fn render_side_by_side(spans: &[DiffSpan]) -> String {
    let mut old = String::new();
    let mut new = String::new();
    for span in spans {
        match span.op {
            DiffOp::Equal => {
                old.push_str(&span.text);
                new.push_str(&span.text);
            }
            DiffOp::Delete => old.push_str(&format!("[-{}-]", span.text)),
            DiffOp::Insert => new.push_str(&format!("{{+{}+}}", span.text)),
        }
    }
    format!("Old:\n{old}\nNew:\n{new}")
}

pub fn render_tabbed(spans: &[DiffSpan]) -> String {
    format!(
        "=== Diff ===\n{}\n=== New ===\n{}\n=== Old ===\n{}",
        render_merged(spans),
        new_text(spans),
        old_text(spans)
    )
}

pub fn render(spans: &[DiffSpan], view: DiffView) -> String {
    match view {
        DiffView::Merged => render_merged(spans),
        DiffView::SideBySide => render_side_by_side(spans),
        DiffView::Tabbed => render_tabbed(spans),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(spans: &[DiffSpan]) -> Vec<(DiffOp, &str)> {
        spans.iter().map(|s| (s.op, s.text.as_str())).collect()
    }

    #[test]
    fn test_identical_and_empty() {
        assert_eq!(ops(&diff("same text", "same text", DiffMethod::Words)), vec![(DiffOp::Equal, "same text")]);
        assert!(diff("", "", DiffMethod::Words).is_empty());
        assert_eq!(ops(&diff("", "new", DiffMethod::Words)), vec![(DiffOp::Insert, "new")]);
        assert_eq!(ops(&diff("old", "", DiffMethod::Chars)), vec![(DiffOp::Delete, "old")]);
    }

    #[test]
    fn test_word_replacement() {
        let spans = diff("BRAF is an oncogene.", "BRAF is a kinase.", DiffMethod::Words);
        assert_eq!(
            ops(&spans),
            vec![
                (DiffOp::Equal, "BRAF is "),
                (DiffOp::Delete, "an oncogene"),
                (DiffOp::Insert, "a kinase"),
                (DiffOp::Equal, "."),
            ]
        );
    }

    #[test]
    fn test_texts_are_recoverable() {
        let old = "The V600E mutation is activating, see PMID 123.";
        let new = "The V600E and V600K mutations are activating; see PMIDs 123, 456.";
        for method in [DiffMethod::Words, DiffMethod::Chars] {
            let spans = diff(old, new, method);
            assert_eq!(old_text(&spans), old);
            assert_eq!(new_text(&spans), new);
        }
    }

    #[test]
    fn test_cleanup_absorbs_short_equalities() {
        let spans = vec![
            DiffSpan::new(DiffOp::Delete, "abc"),
            DiffSpan::new(DiffOp::Insert, "xyz"),
            DiffSpan::new(DiffOp::Equal, " "),
            DiffSpan::new(DiffOp::Delete, "def"),
            DiffSpan::new(DiffOp::Insert, "uvw"),
        ];
        assert_eq!(
            ops(&cleanup_semantic(spans)),
            vec![(DiffOp::Delete, "abc def"), (DiffOp::Insert, "xyz uvw")]
        );
    }

    #[test]
    fn test_renderers() {
        let spans = diff("a < b", "a > b", DiffMethod::Words);
        assert_eq!(render_merged(&spans), "a <del>&lt;</del><ins>&gt;</ins> b");
        assert_eq!(render_side_by_side(&spans), "Old:\na [-<-] b\nNew:\na {+>+} b");
        assert!(render_tabbed(&spans).starts_with("=== Diff ===\n"));
    }

    #[test]
    fn test_fully_rewritten_long_text() {
        let old: Vec<String> = (0..3000).map(|i| format!("alpha{i}")).collect();
        let new: Vec<String> = (0..3000).map(|i| format!("omega{i}")).collect();
        let (old, new) = (old.join(" "), new.join(" "));

        let spans = diff(&old, &new, DiffMethod::Words);

        assert_eq!(old_text(&spans), old);
        assert_eq!(new_text(&spans), new);
        assert_eq!(ops(&spans), vec![(DiffOp::Delete, old.as_str()), (DiffOp::Insert, new.as_str())]);
    }

    #[test]
    fn test_edits_in_long_text_stay_local() {
        let words: Vec<String> = (0..2000).map(|i| format!("w{i}")).collect();
        let old = words.join(" ");
        let mut changed = words.clone();
        changed[10] = "BRAF".to_string();
        changed[1500] = "KRAS".to_string();
        let new = changed.join(" ");

        let spans = diff(&old, &new, DiffMethod::Words);

        let edits: Vec<_> = ops(&spans).into_iter().filter(|(op, _)| *op != DiffOp::Equal).collect();
        assert_eq!(
            edits,
            vec![
                (DiffOp::Delete, "w10"),
                (DiffOp::Insert, "BRAF"),
                (DiffOp::Delete, "w1500"),
                (DiffOp::Insert, "KRAS"),
            ]
        );
        assert_eq!(new_text(&spans), new);
    }

    #[test]
    fn test_diff_view_parse() {
        assert_eq!("side-by-side".parse::<DiffView>().unwrap(), DiffView::SideBySide);
        assert_eq!("Tabbed".parse::<DiffView>().unwrap(), DiffView::Tabbed);
        assert!("sideways".parse::<DiffView>().is_err());
    }
}

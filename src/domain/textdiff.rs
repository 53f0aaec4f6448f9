//! 行级 unified diff

/// 每个变更块前后保留的上下文行数
pub const CONTEXT_LINES: usize = 3;

/// 超过该规模（行数乘积）时不做最长公共子序列，整体视为替换
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Equal(usize),
    Delete(usize),
    Insert(usize),
}

fn line_ops(old: &[&str], new: &[&str]) -> Vec<Op> {
    let (n, m) = (old.len(), new.len());
    if n.saturating_mul(m) > MAX_LCS_CELLS {
        return (0..n).map(Op::Delete).chain((0..m).map(Op::Insert)).collect();
    }

    // lcs[i][j]：old[i..] 与 new[j..] 的最长公共子序列长度
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Equal(i));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    ops.extend((i..n).map(Op::Delete));
    ops.extend((j..m).map(Op::Insert));
    ops
}

/// 变更块在 old/new 中的起始行号（1 起）与行数
fn hunk_header(old_start: usize, old_len: usize, new_start: usize, new_len: usize) -> String {
    // 空范围按惯例指向前一行
    let start = |pos: usize, len: usize| if len == 0 { pos } else { pos + 1 };
    format!(
        "@@ -{},{} +{},{} @@",
        start(old_start, old_len),
        old_len,
        start(new_start, new_len),
        new_len
    )
}

/// 生成 unified diff，内容逐行相同时返回空字符串
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = line_ops(&old_lines, &new_lines);

    let changes: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, Op::Equal(_)))
        .map(|(k, _)| k)
        .collect();
    let Some(&first) = changes.first() else {
        return String::new();
    };

    // 相距不超过两倍上下文的变更合并为一块
    let mut ranges = Vec::new();
    let mut start = first.saturating_sub(CONTEXT_LINES);
    let mut last = first;
    for &k in &changes[1..] {
        if k - last > 2 * CONTEXT_LINES {
            ranges.push((start, (last + CONTEXT_LINES).min(ops.len() - 1)));
            start = k - CONTEXT_LINES;
        }
        last = k;
    }
    ranges.push((start, (last + CONTEXT_LINES).min(ops.len() - 1)));

    // 每个 op 之前已消耗的 old/new 行数
    let mut consumed = Vec::with_capacity(ops.len());
    let (mut o, mut n) = (0, 0);
    for op in &ops {
        consumed.push((o, n));
        match op {
            Op::Equal(_) => {
                o += 1;
                n += 1;
            }
            Op::Delete(_) => o += 1,
            Op::Insert(_) => n += 1,
        }
    }

    let mut out = format!("--- {}\n+++ {}\n", old_label, new_label);
    for (s, e) in ranges {
        let slice = &ops[s..=e];
        let old_len = slice.iter().filter(|op| !matches!(op, Op::Insert(_))).count();
        let new_len = slice.iter().filter(|op| !matches!(op, Op::Delete(_))).count();
        let (old_start, new_start) = consumed[s];
        out.push_str(&hunk_header(old_start, old_len, new_start, new_len));
        out.push('\n');
        for op in slice {
            let (prefix, line) = match *op {
                Op::Equal(i) => (' ', old_lines[i]),
                Op::Delete(i) => ('-', old_lines[i]),
                Op::Insert(j) => ('+', new_lines[j]),
            };
            out.push(prefix);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

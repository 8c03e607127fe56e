//! 从 SELECT 语句推导输出文件表头。
//!
//! 只做词法级别的扫描：定位第一条语句顶层的 select 列表，按顶层逗号拆分字段，
//! 再对每个字段套用别名 / 表限定 / 空白三步启发式规则。不校验 SQL 语法。

/// select 列表的结束关键字（顶层出现即结束）
#[rustfmt::skip]
const LIST_TERMINATORS: [&str; 14] = [
    "from", "into", "where", "group", "having", "order", "limit",
    "offset", "union", "intersect", "except", "window", "fetch", "for",
];

/// 推导表头；无法识别字段列表（如 `select *`）时返回空列表，由调用方视为使用错误
pub fn headers_from_sql(sql: &str) -> Vec<String> {
    let fields = select_fields(sql);
    if let [only] = fields.as_slice() {
        if only == "*" || only.ends_with(".*") {
            return vec![];
        }
    }
    fields.iter().map(|field| header_from_field(field)).collect()
}

/// 单个字段表达式转表头，依次：
/// 1. 小写、去首尾空白、去双引号
/// 2. 含 ` as ` 时取最后一个别名
/// 3. 含 `.` 时取第一个 `.` 之后的一段
/// 4. 仍含空白时取空白分隔后的第二段
///
/// `count(a.b)` 这类带限定名的函数调用会得到 `b)`，保持该行为。
pub fn header_from_field(field: &str) -> String {
    let mut header = field.to_lowercase().trim().replace('"', "");

    if let Some(alias) = last_alias(&header) {
        header = alias.to_string();
    }

    if let Some((_, rest)) = header.split_once('.') {
        header = rest.split('.').next().unwrap_or_default().to_string();
    }

    if header.contains(char::is_whitespace) {
        if let Some(second) = header.split_whitespace().nth(1) {
            header = second.to_string();
        }
    }

    header
}

fn last_alias(expr: &str) -> Option<&str> {
    expr.rmatch_indices("as").find_map(|(idx, _)| {
        let before = expr[..idx].chars().next_back()?;
        let after = expr[idx + 2..].chars().next()?;
        (before.is_whitespace() && after.is_whitespace()).then(|| expr[idx + 2..].trim())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Word(usize, usize),
    Comma(usize),
    Semicolon(usize),
    /// 回到顶层的右括号位置
    Close(usize),
}

/// 第一条语句 select 列表中的字段表达式（原文，已去首尾空白）
fn select_fields(sql: &str) -> Vec<String> {
    let marks = scan(sql);
    let stmt_end = marks
        .iter()
        .find_map(|m| match m {
            Mark::Semicolon(pos) => Some(*pos),
            _ => None,
        })
        .unwrap_or(sql.len());
    let marks: Vec<Mark> = marks.into_iter().take_while(|m| mark_pos(m) < stmt_end).collect();

    let is_word = |m: &Mark, word: &str| matches!(m, Mark::Word(s, e) if sql[*s..*e].eq_ignore_ascii_case(word));

    let Some(select_idx) = marks.iter().position(|m| is_word(m, "select")) else {
        return vec![];
    };
    let mut start = mark_end(&marks[select_idx]);
    let mut rest = select_idx + 1;

    // DISTINCT / DISTINCT ON (...) / ALL
    if let Some(m) = marks.get(rest) {
        if is_word(m, "all") {
            start = mark_end(m);
            rest += 1;
        } else if is_word(m, "distinct") {
            start = mark_end(m);
            rest += 1;
            if marks.get(rest).is_some_and(|m| is_word(m, "on")) {
                if let Some(offset) = marks[rest..].iter().position(|m| matches!(m, Mark::Close(_))) {
                    rest += offset;
                    start = mark_end(&marks[rest]);
                    rest += 1;
                }
            }
        }
    }

    let mut end = stmt_end;
    let mut commas = vec![];
    for m in &marks[rest..] {
        match m {
            Mark::Word(s, _) if LIST_TERMINATORS.iter().any(|t| is_word(m, *t)) => {
                end = *s;
                break;
            }
            Mark::Comma(pos) => commas.push(*pos),
            _ => {}
        }
    }

    let mut fields = vec![];
    let mut field_start = start;
    for pos in commas.into_iter().chain(std::iter::once(end)) {
        let field = strip_comments(&sql[field_start..pos]);
        let field = field.trim();
        if !field.is_empty() {
            fields.push(field.to_string());
        }
        field_start = pos + 1;
    }
    fields
}

/// 去掉字段文本中的 `--` 与 `/* */` 注释，引号内的内容保持原样
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote = None;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                out.push(ch);
            }
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push(' ');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    out
}

fn mark_pos(mark: &Mark) -> usize {
    match mark {
        Mark::Word(s, _) => *s,
        Mark::Comma(pos) | Mark::Semicolon(pos) | Mark::Close(pos) => *pos,
    }
}

fn mark_end(mark: &Mark) -> usize {
    match mark {
        Mark::Word(_, e) => *e,
        Mark::Comma(pos) | Mark::Semicolon(pos) | Mark::Close(pos) => pos + 1,
    }
}

/// 顶层词法扫描：跳过字符串、引号标识符、注释与括号内的内容
fn scan(sql: &str) -> Vec<Mark> {
    let bytes = sql.as_bytes();
    let mut marks = vec![];
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' | b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
            }
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    marks.push(Mark::Close(i));
                }
                i += 1;
            }
            b',' => {
                if depth == 0 {
                    marks.push(Mark::Comma(i));
                }
                i += 1;
            }
            b';' => {
                if depth == 0 {
                    marks.push(Mark::Semicolon(i));
                }
                i += 1;
            }
            _ if is_word_byte(b) => {
                let start = i;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                if depth == 0 {
                    marks.push(Mark::Word(start, i));
                }
            }
            _ => i += 1,
        }
    }
    marks
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

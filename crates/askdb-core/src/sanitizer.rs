//! Validation and rewriting of generated SQL before it reaches the database.
//!
//! Every step is a pure `&str -> String` function so each one can be tested
//! on its own. [`sanitize`] chains them in a fixed order:
//!
//! 1. placeholder removal
//! 2. hallucinated item/description filter removal
//! 3. pending (`balance_qty > 0`) filter injection
//! 4. row cap
//! 5. statement shape validation
//!
//! Clause boundaries (WHERE, GROUP BY, ORDER BY, LIMIT) are only honoured at
//! the top level: text inside string literals and parentheses is skipped, so
//! subqueries and CTE bodies are never rewritten by accident.

use once_cell::sync::Lazy;
use regex::{Captures, Match, Regex};
use tracing::debug;

/// Predicate injected when a question asks about outstanding work.
pub const PENDING_PREDICATE: &str = "balance_qty > 0";

const ALLOWED_PREFIXES: &[&str] = &["SELECT", "WITH"];

const PENDING_KEYWORDS: &[&str] = &[
    "pending",
    "backlog",
    "back log",
    "due",
    "overdue",
    "past due",
    "outstanding",
    "unshipped",
    "balance",
    "balance qty",
    "balance quantity",
];

/// A single-quoted SQL literal, `''` escapes included.
const LITERAL: &str = r"'(?:[^']|'')*'";

static FUZZY_LITERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:item_no|description)\s+I?LIKE\s+'((?:[^']|'')*)'")
        .expect("valid fuzzy literal regex")
});

/// A fuzzy item/description predicate or a parenthesised OR-group of them.
static FUZZY_PREDICATE: Lazy<String> = Lazy::new(|| {
    let single = format!(r"(?:\w+\.)?(?:item_no|description)\s+I?LIKE\s+{LITERAL}");
    format!(r"(?:{single}|\(\s*{single}(?:\s+OR\s+{single})*\s*\))")
});

static CONNECTIVE_PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\s*\b(?:AND|OR)\s*{}", *FUZZY_PREDICATE))
        .expect("valid connective predicate regex")
});

static LEADING_PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\bWHERE\s+{}\s+(?:AND|OR)\s+", *FUZZY_PREDICATE))
        .expect("valid leading predicate regex")
});

/// A filter opening a parenthesised group, e.g. `(item_no LIKE 'x' AND city = 'y')`.
static GROUP_LEADING_PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\(\s*{}\s+(?:AND|OR)\s+", *FUZZY_PREDICATE))
        .expect("valid group leading predicate regex")
});

/// A filter that is the only thing inside a group, e.g. `((item_no LIKE 'x'))`.
static GROUP_SOLE_PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\(\s*{}\s*\)", *FUZZY_PREDICATE))
        .expect("valid group sole predicate regex")
});

static SOLE_PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\bWHERE\s+{}", *FUZZY_PREDICATE))
        .expect("valid sole predicate regex")
});

static PENDING_FILTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbalance_qty\s*>\s*0\b").expect("valid pending regex"));

static WHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").expect("valid regex"));

static OR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bOR\b").expect("valid regex"));

static LIMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("valid regex"));

/// Clauses that may follow a WHERE clause.
static WHERE_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:GROUP\s+BY|HAVING|ORDER\s+BY|LIMIT|OFFSET|UNION|INTERSECT|EXCEPT|WINDOW)\b")
        .expect("valid regex")
});

static COMPOUND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:UNION(?:\s+ALL)?|INTERSECT|EXCEPT)\b").expect("valid regex")
});

/// Clauses a new WHERE clause must be inserted before.
static SUFFIX_CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:GROUP\s+BY|HAVING|ORDER\s+BY|LIMIT)\b").expect("valid regex")
});

static FORBIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(DROP|DELETE|INSERT|UPDATE|ALTER|TRUNCATE|EXEC|CREATE|GRANT|REVOKE)\b")
        .expect("valid forbidden keyword regex")
});

/// Outcome of sanitizing one candidate statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlVerdict {
    /// Safe to execute.
    Accepted(String),
    /// Must not be executed; `reason` is shown to the user verbatim.
    Rejected {
        statement: Option<String>,
        reason: String,
    },
}

impl SqlVerdict {
    fn rejected(statement: Option<&str>, reason: impl Into<String>) -> Self {
        SqlVerdict::Rejected {
            statement: statement.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SqlVerdict::Accepted(_))
    }

    /// The (possibly rewritten) statement, when one was left to inspect.
    pub fn statement(&self) -> Option<&str> {
        match self {
            SqlVerdict::Accepted(sql) => Some(sql),
            SqlVerdict::Rejected { statement, .. } => statement.as_deref(),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SqlVerdict::Accepted(_) => None,
            SqlVerdict::Rejected { reason, .. } => Some(reason),
        }
    }
}

/// Inputs that shape sanitization besides the statement itself.
#[derive(Debug, Clone, Copy)]
pub struct SanitizeOptions<'a> {
    /// The user's original (not rewritten) question.
    pub question: &'a str,
    /// Entities currently in scope; empty means none.
    pub allowed_entities: &'a [String],
    /// Row ceiling for statements without a LIMIT.
    pub row_limit: usize,
}

/// Run the full sanitization chain on a candidate statement.
pub fn sanitize(candidate: &str, opts: &SanitizeOptions<'_>) -> SqlVerdict {
    let sql = remove_bind_params(candidate);
    let sql = remove_hallucinated_filters(&sql, opts.allowed_entities);
    let sql = if implies_pending(opts.question) && !has_pending_filter(&sql) {
        debug!(target: "askdb::sanitizer", "Injecting pending filter");
        add_pending_filter(&sql)
    } else {
        sql
    };
    let sql = enforce_row_cap(&sql, opts.row_limit);
    validate_statement(&sql)
}

/// Replace `:name`, `$1` and `@name` parameter tokens with `''`.
///
/// String literals, quoted identifiers and `::type` casts are left untouched, so a statement
/// without placeholders comes back unchanged.
pub fn remove_bind_params(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match (c, next) {
            ('\'' | '"', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            (':', Some(':')) => {
                out.push_str("::");
                i += 2;
                // the cast's type name follows
                while i < chars.len() && is_word_char(chars[i]) {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            (':', Some(n)) | ('@', Some(n)) if is_word_char(n) => {
                out.push_str("''");
                i = skip_while(&chars, i + 1, is_word_char);
            }
            ('$', Some(n)) if n.is_ascii_digit() => {
                out.push_str("''");
                i = skip_while(&chars, i + 1, |ch| ch.is_ascii_digit());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Drop fuzzy item/description filters on entities that are not in scope.
///
/// A filter stays only when each of its literals (wildcards stripped) is a
/// substring or superstring of an allowed entity. With no allowed entities
/// every such filter goes. The connective goes with the filter, and a WHERE
/// or parenthesised group left without predicates becomes `1=1`.
pub fn remove_hallucinated_filters(sql: &str, allowed: &[String]) -> String {
    let allowed: Vec<String> = allowed
        .iter()
        .map(|a| a.trim().to_uppercase())
        .filter(|a| !a.is_empty())
        .collect();

    let keep = |caps: &Captures<'_>| predicate_in_scope(&caps[0], &allowed);

    let sql = CONNECTIVE_PREDICATE_RE.replace_all(sql, |caps: &Captures<'_>| {
        if keep(caps) {
            caps[0].to_string()
        } else {
            debug!(target: "askdb::sanitizer", "Removing out-of-scope filter: {}", caps[0].trim());
            String::new()
        }
    });
    let sql = LEADING_PREDICATE_RE.replace_all(&sql, |caps: &Captures<'_>| {
        if keep(caps) {
            caps[0].to_string()
        } else {
            debug!(target: "askdb::sanitizer", "Removing out-of-scope leading filter");
            "WHERE ".to_string()
        }
    });
    let sql = GROUP_LEADING_PREDICATE_RE.replace_all(&sql, |caps: &Captures<'_>| {
        if keep(caps) {
            caps[0].to_string()
        } else {
            debug!(target: "askdb::sanitizer", "Removing out-of-scope filter at start of group");
            "(".to_string()
        }
    });
    let sql = SOLE_PREDICATE_RE.replace_all(&sql, |caps: &Captures<'_>| {
        if keep(caps) {
            caps[0].to_string()
        } else {
            debug!(target: "askdb::sanitizer", "Replacing out-of-scope sole filter with 1=1");
            "WHERE 1=1".to_string()
        }
    });
    let sql = GROUP_SOLE_PREDICATE_RE.replace_all(&sql, |caps: &Captures<'_>| {
        if keep(caps) {
            caps[0].to_string()
        } else {
            debug!(target: "askdb::sanitizer", "Replacing out-of-scope grouped filter with 1=1");
            "(1=1)".to_string()
        }
    });

    sql.into_owned()
}

fn predicate_in_scope(predicate: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return false;
    }
    FUZZY_LITERAL_RE.captures_iter(predicate).all(|caps| {
        let token = caps[1].replace('%', "").replace("''", "'");
        let token = token.trim().to_uppercase();
        allowed
            .iter()
            .any(|a| a.contains(token.as_str()) || token.contains(a.as_str()))
    })
}

/// Whether the question asks about outstanding, overdue or pending work.
pub fn implies_pending(question: &str) -> bool {
    let q = question.to_lowercase();
    PENDING_KEYWORDS.iter().any(|k| q.contains(k))
}

/// Whether the statement already filters on a positive balance.
pub fn has_pending_filter(sql: &str) -> bool {
    PENDING_FILTER_RE.is_match(sql)
}

/// Add `balance_qty > 0` to the top-level WHERE clause, creating one if needed.
///
/// Each branch of a UNION/INTERSECT/EXCEPT gets its own filter.
pub fn add_pending_filter(sql: &str) -> String {
    let sql = strip_trailing_semicolons(sql);
    if sql.is_empty() {
        return sql.to_string();
    }
    let mask = top_level_mask(sql);

    let operators: Vec<Match<'_>> = COMPOUND_RE
        .find_iter(sql)
        .filter(|m| mask.get(m.start()).copied().unwrap_or(false))
        .collect();
    if !operators.is_empty() {
        let mut out = String::with_capacity(sql.len() + 20 * (operators.len() + 1));
        let mut start = 0;
        for op in &operators {
            out.push_str(&add_pending_filter(sql[start..op.start()].trim()));
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            start = op.end();
        }
        out.push_str(&add_pending_filter(sql[start..].trim()));
        return out;
    }

    if let Some(where_kw) = find_top_level(&WHERE_RE, sql, &mask, 0) {
        let clause_start = where_kw.end();
        let clause_end = find_top_level(&WHERE_END_RE, sql, &mask, clause_start)
            .map(|m| m.start())
            .unwrap_or(sql.len());
        let clause = sql[clause_start..clause_end].trim();
        let tail = sql[clause_end..].trim();

        let mut out = format!("{} {PENDING_PREDICATE}", sql[..clause_start].trim_end());
        if !clause.is_empty() {
            let has_or = find_top_level(&OR_RE, sql, &mask, clause_start)
                .is_some_and(|m| m.start() < clause_end);
            if has_or {
                out.push_str(&format!(" AND ({clause})"));
            } else {
                out.push_str(&format!(" AND {clause}"));
            }
        }
        if !tail.is_empty() {
            out.push(' ');
            out.push_str(tail);
        }
        return out;
    }

    if let Some(suffix) = find_top_level(&SUFFIX_CLAUSE_RE, sql, &mask, 0) {
        return format!(
            "{} WHERE {PENDING_PREDICATE} {}",
            sql[..suffix.start()].trim_end(),
            &sql[suffix.start()..]
        );
    }

    format!("{sql} WHERE {PENDING_PREDICATE}")
}

/// Append `LIMIT row_limit` unless the statement already has a top-level LIMIT.
pub fn enforce_row_cap(sql: &str, row_limit: usize) -> String {
    let sql = strip_trailing_semicolons(sql);
    if sql.is_empty() {
        return sql.to_string();
    }
    let mask = top_level_mask(sql);
    if find_top_level(&LIMIT_RE, sql, &mask, 0).is_some() {
        sql.to_string()
    } else {
        format!("{sql} LIMIT {row_limit}")
    }
}

/// Accept only a single read-only SELECT/WITH statement.
pub fn validate_statement(sql: &str) -> SqlVerdict {
    let cleaned = strip_trailing_semicolons(sql.trim().trim_start_matches(';'));
    if cleaned.is_empty() {
        return SqlVerdict::rejected(None, "Empty SQL");
    }

    let first_word = cleaned.split_whitespace().next().unwrap_or_default();
    let keyword: String = first_word
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let keyword = if keyword.is_empty() {
        first_word.to_uppercase()
    } else {
        keyword.to_uppercase()
    };
    if !ALLOWED_PREFIXES.contains(&keyword.as_str()) {
        return SqlVerdict::rejected(
            Some(cleaned),
            format!("First keyword must be SELECT/WITH, got '{keyword}'"),
        );
    }

    let upper = cleaned.to_uppercase();
    if let Some(caps) = FORBIDDEN_RE.captures(&upper) {
        return SqlVerdict::rejected(
            Some(cleaned),
            format!("Forbidden keyword detected: {}", &caps[1]),
        );
    }

    let mask = top_level_mask(cleaned);
    if cleaned
        .char_indices()
        .any(|(i, c)| c == ';' && mask[i])
    {
        return SqlVerdict::rejected(Some(cleaned), "Multiple statements are not allowed");
    }

    SqlVerdict::Accepted(cleaned.to_string())
}

fn strip_trailing_semicolons(sql: &str) -> &str {
    sql.trim_end().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn skip_while(chars: &[char], mut i: usize, pred: impl Fn(char) -> bool) -> usize {
    while i < chars.len() && pred(chars[i]) {
        i += 1;
    }
    i
}

/// Per-byte flag: true where the byte sits outside literals, quoted
/// identifiers and parentheses.
fn top_level_mask(sql: &str) -> Vec<bool> {
    let mut mask = vec![false; sql.len()];
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in sql.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => {
                mask[i] = depth == 0;
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                mask[i] = depth == 0;
            }
            _ => mask[i] = depth == 0,
        }
    }

    mask
}

fn find_top_level<'s>(re: &Regex, sql: &'s str, mask: &[bool], from: usize) -> Option<Match<'s>> {
    re.find_iter(sql)
        .find(|m| m.start() >= from && mask.get(m.start()).copied().unwrap_or(false))
}

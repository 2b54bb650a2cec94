use crate::types::SqlValue;

/// SQL text with positional placeholders (`$1`, `$2`, ...) and the values
/// bound to them, in order.
///
/// Values are always sent separately from the text; they are never spliced
/// into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends the value for the next placeholder.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Highest placeholder number referenced outside quoted literals,
    /// identifiers and comments, which is the number of parameters the
    /// server expects.
    pub fn placeholder_count(&self) -> usize {
        placeholder_count(&self.sql)
    }
}

pub(crate) fn placeholder_count(sql: &str) -> usize {
    let chars: Vec<char> = sql.chars().collect();
    let mut highest = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        i = match c {
            '\'' | '"' => skip_past(&chars, i + 1, &[c]),
            '-' if next == Some('-') => skip_past(&chars, i + 2, &['\n']),
            '/' if next == Some('*') => skip_block_comment(&chars, i + 2),
            // `$` inside an identifier such as `price$1`
            '$' if i > 0 && is_identifier_char(chars[i - 1]) => i + 1,
            '$' if next.is_some_and(|d| d.is_ascii_digit()) => {
                let end = (i + 1..chars.len())
                    .find(|&j| !chars[j].is_ascii_digit())
                    .unwrap_or(chars.len());
                let digits: String = chars[i + 1..end].iter().collect();
                if let Ok(n) = digits.parse::<usize>() {
                    highest = highest.max(n);
                }
                end
            }
            '$' => match dollar_tag(&chars, i) {
                Some(tag) => skip_past(&chars, i + tag.len(), &tag),
                None => i + 1,
            },
            _ => i + 1,
        };
    }
    highest
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Index just past the first `end` at or after `from`, or the end of the
/// input if it never closes.
fn skip_past(chars: &[char], from: usize, end: &[char]) -> usize {
    (from..chars.len())
        .find(|&j| chars[j..].starts_with(end))
        .map_or(chars.len(), |j| j + end.len())
}

/// Block comments nest.
fn skip_block_comment(chars: &[char], from: usize) -> usize {
    let mut depth = 1;
    let mut j = from;
    while j < chars.len() {
        match (chars[j], chars.get(j + 1)) {
            ('/', Some('*')) => {
                depth += 1;
                j += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                j += 2;
                if depth == 0 {
                    return j;
                }
            }
            _ => j += 1,
        }
    }
    chars.len()
}

/// The opening `$tag$` of a dollar-quoted string starting at `start`.
/// The tag may be empty (`$$`).
fn dollar_tag(chars: &[char], start: usize) -> Option<Vec<char>> {
    let mut j = start + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    (chars.get(j) == Some(&'$')).then(|| chars[start..=j].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_keeps_order() {
        let query = Query::new("SELECT * FROM users WHERE email = $1 AND id = $2")
            .bind("user3@example.com")
            .bind(7);
        assert_eq!(
            query.params,
            vec![
                SqlValue::Text("user3@example.com".to_string()),
                SqlValue::Int32(7)
            ]
        );
        assert_eq!(query.placeholder_count(), 2);
    }

    #[test]
    fn test_placeholder_count_ignores_literals() {
        assert_eq!(placeholder_count("SELECT '$3', \"$4\" FROM t WHERE a = $1"), 1);
        assert_eq!(placeholder_count("SELECT 1"), 0);
        assert_eq!(placeholder_count("SELECT $2, $1, $2"), 2);
    }

    #[test]
    fn test_placeholder_count_ignores_comments() {
        assert_eq!(placeholder_count("SELECT $1 -- or $5\n, $2"), 2);
        assert_eq!(placeholder_count("SELECT $1 -- trailing $4"), 1);
        assert_eq!(
            placeholder_count("SELECT /* $9 /* nested $8 */ still $7 */ $1"),
            1
        );
    }

    #[test]
    fn test_placeholder_count_ignores_dollar_quotes() {
        assert_eq!(
            placeholder_count("SELECT $$ $4 $$, $fn$ it's $5 $fn$ WHERE a = $1"),
            1
        );
        assert_eq!(placeholder_count("SELECT price$1 FROM t"), 0);
        assert_eq!(placeholder_count("SELECT 'it''s $2', $1"), 1);
        assert_eq!(placeholder_count("SELECT '$2"), 0);
    }
}

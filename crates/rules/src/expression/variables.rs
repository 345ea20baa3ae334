//! Top-level variable discovery for expressions.

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "if", "else", "in", "is", "true", "false", "none", "True", "False",
    "None", "loop",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Prev {
    Start,
    Dot,
    Pipe,
    Is,
    IsNot,
    Other,
}

/// Names of the top-level variables an expression reads, in first-use order.
///
/// Attribute names (`a.b`), filters (`x | upper`), tests (`x is defined`),
/// function calls (`range(3)`), keyword arguments and string literals are
/// not variables.
pub fn referenced_variables(expression: &str) -> Vec<String> {
    let chars: Vec<char> = expression.chars().collect();
    let mut found: Vec<String> = Vec::new();
    let mut prev = Prev::Start;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            i = skip_string(&chars, i);
            prev = Prev::Other;
            continue;
        }

        if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            prev = Prev::Other;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            let next = next_significant(&chars, i);

            let after_accessor = matches!(prev, Prev::Dot | Prev::Pipe | Prev::Is | Prev::IsNot);
            let is_call = next == Some('(');
            let is_kwarg = next == Some('=') && next_after(&chars, i, 1) != Some('=');

            prev = match ident.as_str() {
                "is" => Prev::Is,
                "not" if prev == Prev::Is => Prev::IsNot,
                _ => Prev::Other,
            };

            if after_accessor || is_call || is_kwarg || KEYWORDS.contains(&ident.as_str()) {
                continue;
            }
            if !found.contains(&ident) {
                found.push(ident);
            }
            continue;
        }

        prev = match c {
            '.' => Prev::Dot,
            '|' => Prev::Pipe,
            _ => Prev::Other,
        };
        i += 1;
    }

    found
}

fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

/// The character `offset` positions after the next significant one.
fn next_after(chars: &[char], from: usize, offset: usize) -> Option<char> {
    let pos = chars[from..].iter().position(|c| !c.is_whitespace())?;
    chars.get(from + pos + offset).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_comparison() {
        assert_eq!(referenced_variables("amount > 100 and region == 'US'"), vec!["amount", "region"]);
    }

    #[test]
    fn attributes_and_subscripts_only_count_the_root() {
        assert_eq!(referenced_variables("data.notional > 0 and data['region'] == 'EU'"), vec!["data"]);
    }

    #[test]
    fn string_literals_are_ignored() {
        assert_eq!(referenced_variables("\"it's\" ~ name ~ 'x y z'"), vec!["name"]);
    }

    #[test]
    fn filters_tests_and_calls_are_ignored() {
        assert_eq!(referenced_variables("name | upper"), vec!["name"]);
        assert_eq!(referenced_variables("x is not none and y is defined"), vec!["x", "y"]);
        assert_eq!(referenced_variables("range(3) | length > limit"), vec!["limit"]);
        assert_eq!(referenced_variables("value | round(precision=2)"), vec!["value"]);
    }

    #[test]
    fn conditional_expression_and_keywords() {
        assert_eq!(
            referenced_variables("'HIGH' if totalScore >= 50 else 'LOW'"),
            vec!["totalScore"]
        );
        assert!(referenced_variables("true and not false").is_empty());
    }

    #[test]
    fn numbers_are_not_identifiers() {
        assert_eq!(referenced_variables("1.5e3 * weight"), vec!["weight"]);
    }
}

//! Tokenizer for the expression language.

use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    // Keywords
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub position: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        position,
        message: message.into(),
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "true" | "True" => TokenKind::True,
        "false" | "False" => TokenKind::False,
        "null" | "None" => TokenKind::Null,
        _ => return None,
    })
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        // Numbers: digits with at most one decimal point.
        if c.is_ascii_digit() {
            let mut end = pos;
            let mut seen_dot = false;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '_' {
                    end = i + d.len_utf8();
                    chars.next();
                } else if d == '.' && !seen_dot {
                    // Only part of the number if a digit follows.
                    let mut look = chars.clone();
                    look.next();
                    if matches!(look.peek(), Some((_, n)) if n.is_ascii_digit()) {
                        seen_dot = true;
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
            let text: String = source[pos..end].chars().filter(|&ch| ch != '_').collect();
            let n = text
                .parse::<f64>()
                .map_err(|e| syntax(pos, format!("invalid number {text:?}: {e}")))?;
            tokens.push(Token {
                kind: TokenKind::Number(n),
                position: pos,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut end = pos;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &source[pos..end];
            let kind = keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()));
            tokens.push(Token { kind, position: pos });
            continue;
        }

        if c == '\'' || c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, d)) = chars.next() {
                match d {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, esc)) => text.push(esc),
                        None => break,
                    },
                    d if d == c => {
                        closed = true;
                        break;
                    }
                    d => text.push(d),
                }
            }
            if !closed {
                return Err(syntax(pos, "unterminated string literal"));
            }
            tokens.push(Token {
                kind: TokenKind::Str(text),
                position: pos,
            });
            continue;
        }

        chars.next();
        let next = chars.peek().map(|&(_, n)| n);
        let (kind, two_chars) = match (c, next) {
            ('=', Some('=')) => (TokenKind::EqEq, true),
            ('!', Some('=')) => (TokenKind::NotEq, true),
            ('<', Some('=')) => (TokenKind::LtEq, true),
            ('>', Some('=')) => (TokenKind::GtEq, true),
            ('&', Some('&')) => (TokenKind::And, true),
            ('|', Some('|')) => (TokenKind::Or, true),
            ('!', _) => (TokenKind::Not, false),
            ('<', _) => (TokenKind::Lt, false),
            ('>', _) => (TokenKind::Gt, false),
            ('(', _) => (TokenKind::LParen, false),
            (')', _) => (TokenKind::RParen, false),
            ('[', _) => (TokenKind::LBracket, false),
            (']', _) => (TokenKind::RBracket, false),
            (',', _) => (TokenKind::Comma, false),
            ('.', _) => (TokenKind::Dot, false),
            ('+', _) => (TokenKind::Plus, false),
            ('-', _) => (TokenKind::Minus, false),
            ('*', _) => (TokenKind::Star, false),
            ('/', _) => (TokenKind::Slash, false),
            ('%', _) => (TokenKind::Percent, false),
            ('=', _) => return Err(syntax(pos, "assignment is not supported, use '=='")),
            (other, _) => return Err(syntax(pos, format!("unexpected character {other:?}"))),
        };
        if two_chars {
            chars.next();
        }
        tokens.push(Token { kind, position: pos });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn indexing_and_comparison() {
        assert_eq!(
            kinds("inventory['a'] >= 2"),
            vec![
                TokenKind::Ident("inventory".into()),
                TokenKind::LBracket,
                TokenKind::Str("a".into()),
                TokenKind::RBracket,
                TokenKind::GtEq,
                TokenKind::Number(2.0),
            ]
        );
    }

    #[test]
    fn symbolic_and_word_operators_are_equivalent() {
        assert_eq!(kinds("a && !b"), kinds("a and not b"));
        assert_eq!(kinds("a || b"), kinds("a or b"));
    }

    #[test]
    fn decimal_numbers_and_member_access() {
        assert_eq!(kinds("1.5"), vec![TokenKind::Number(1.5)]);
        assert_eq!(
            kinds("x.y"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Dot,
                TokenKind::Ident("y".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("titles == 'abc").expect_err("should fail");
        assert!(matches!(err, ExpressionError::Syntax { position: 10, .. }));
    }

    #[test]
    fn single_equals_is_rejected() {
        assert!(tokenize("a = 1").is_err());
    }
}

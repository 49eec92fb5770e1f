//! Tokenizer for Gremlin query text

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Int(n) => write!(f, "integer {n}"),
            Self::Float(n) => write!(f, "number {n}"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::Comma => write!(f, "','"),
            Self::Dot => write!(f, "'.'"),
            Self::Semicolon => write!(f, "';'"),
        }
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            c if c.is_whitespace() => pos += 1,
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                pos += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                pos += 1;
            }
            '\'' | '"' => {
                let (value, next) = read_string(&chars, pos)?;
                tokens.push(Token::Str(value));
                pos = next;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(pos + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let (token, next) = read_number(&chars, pos)?;
                tokens.push(token);
                pos = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            }
            other => return Err(SyntaxError::UnexpectedChar(other, pos)),
        }
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), SyntaxError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut pos = start + 1;

    loop {
        let Some(&c) = chars.get(pos) else {
            return Err(SyntaxError::UnterminatedString(start));
        };
        pos += 1;

        if c == quote {
            return Ok((out, pos));
        }
        if c != '\\' {
            out.push(c);
            continue;
        }

        let Some(&escaped) = chars.get(pos) else {
            return Err(SyntaxError::UnterminatedString(start));
        };
        pos += 1;
        match escaped {
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '$' => out.push('$'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'u' => {
                let hex: String = chars.get(pos..pos + 4).unwrap_or_default().iter().collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or(SyntaxError::InvalidEscape('u', pos - 1))?;
                out.push(decoded);
                pos += 4;
            }
            other => return Err(SyntaxError::InvalidEscape(other, pos - 1)),
        }
    }
}

fn read_number(chars: &[char], start: usize) -> Result<(Token, usize), SyntaxError> {
    let mut pos = start;
    if chars[pos] == '-' {
        pos += 1;
    }
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }

    let mut is_float = false;
    if chars.get(pos) == Some(&'.') && chars.get(pos + 1).is_some_and(|c| c.is_ascii_digit()) {
        is_float = true;
        pos += 1;
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if matches!(chars.get(pos), Some('e') | Some('E')) {
        let mut look = pos + 1;
        if matches!(chars.get(look), Some('-') | Some('+')) {
            look += 1;
        }
        if chars.get(look).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            pos = look;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text: String = chars[start..pos].iter().collect();

    let token = match chars.get(pos) {
        Some('L') | Some('l') => {
            pos += 1;
            Token::Int(text.parse().map_err(|_| SyntaxError::InvalidNumber(text.clone()))?)
        }
        Some('d') | Some('D') | Some('f') | Some('F') => {
            pos += 1;
            Token::Float(text.parse().map_err(|_| SyntaxError::InvalidNumber(text.clone()))?)
        }
        _ if is_float => Token::Float(text.parse().map_err(|_| SyntaxError::InvalidNumber(text.clone()))?),
        _ => match text.parse::<i64>() {
            Ok(n) => Token::Int(n),
            Err(_) => Token::Float(text.parse().map_err(|_| SyntaxError::InvalidNumber(text.clone()))?),
        },
    };

    if chars.get(pos).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
        return Err(SyntaxError::InvalidNumber(chars[start..=pos].iter().collect()));
    }

    Ok((token, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_traversal() {
        let tokens = tokenize("g.V(7L).has('key', -2.5d)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("g".into()),
                Token::Dot,
                Token::Ident("V".into()),
                Token::LParen,
                Token::Int(7),
                Token::RParen,
                Token::Dot,
                Token::Ident("has".into()),
                Token::LParen,
                Token::Str("key".into()),
                Token::Comma,
                Token::Float(-2.5),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"'it\'s \\ \n \u0007 "x"' "y\$""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Str("it's \\ \n \u{7} \"x\"".into()),
                Token::Str("y$".into())
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(tokenize("'open"), Err(SyntaxError::UnterminatedString(0))));
        assert!(matches!(tokenize("'\\q'"), Err(SyntaxError::InvalidEscape('q', _))));
        assert!(matches!(tokenize("g#"), Err(SyntaxError::UnexpectedChar('#', 1))));
        assert!(matches!(tokenize("12abc"), Err(SyntaxError::InvalidNumber(_))));
    }
}

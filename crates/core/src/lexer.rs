use crate::error::ParseError;
use crate::source::Line;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifiers: `true`, `false`, `null`, unquoted object keys
    Word(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    /// Numeric literal, kept as written so integers stay integers
    Number(String),
    // Punctuation
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    // End of input
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

/// Lex a run of buffered lines. Tokens keep each line's own number.
pub fn lex_lines<'a, I>(lines: I) -> Result<Vec<Spanned>, ParseError>
where
    I: IntoIterator<Item = &'a Line>,
{
    let mut tokens = Vec::new();
    let mut last_line = 1;
    for line in lines {
        lex_into(&line.text, line.number, &mut tokens)?;
        last_line = line.number;
    }
    tokens.push(Spanned {
        token: Token::Eof,
        line: last_line,
    });
    Ok(tokens)
}

/// Lex a single fragment of text that sits on `line`.
pub fn lex(src: &str, line: u32) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    lex_into(src, line, &mut tokens)?;
    tokens.push(Spanned {
        token: Token::Eof,
        line,
    });
    Ok(tokens)
}

fn lex_into(src: &str, line: u32, tokens: &mut Vec<Spanned>) -> Result<(), ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        // String literal, either quote style
        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut s = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(ParseError::at(line, "unterminated string literal"));
                }
                let sc = chars[pos];
                if sc == quote {
                    pos += 1;
                    break;
                }
                if sc == '\\' {
                    pos += 1;
                    if pos >= chars.len() {
                        return Err(ParseError::at(line, "unterminated escape in string"));
                    }
                    match chars[pos] {
                        '"' => s.push('"'),
                        '\'' => s.push('\''),
                        '\\' => s.push('\\'),
                        '/' => s.push('/'),
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        'u' => {
                            let hex: String = chars.iter().skip(pos + 1).take(4).collect();
                            let ch = u32::from_str_radix(&hex, 16)
                                .ok()
                                .filter(|_| hex.len() == 4)
                                .and_then(char::from_u32)
                                .ok_or_else(|| {
                                    ParseError::at(line, format!("invalid unicode escape '\\u{}'", hex))
                                })?;
                            s.push(ch);
                            pos += 4;
                        }
                        other => {
                            s.push('\\');
                            s.push(other);
                        }
                    }
                    pos += 1;
                    continue;
                }
                s.push(sc);
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                line,
            });
            continue;
        }

        // Number
        if c.is_ascii_digit()
            || (c == '-' && pos + 1 < chars.len() && chars[pos + 1].is_ascii_digit())
        {
            let start = pos;
            pos += 1;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos + 1 < chars.len() && chars[pos] == '.' && chars[pos + 1].is_ascii_digit() {
                pos += 1; // consume '.'
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
                let mut look = pos + 1;
                if look < chars.len() && (chars[look] == '+' || chars[look] == '-') {
                    look += 1;
                }
                if look < chars.len() && chars[look].is_ascii_digit() {
                    pos = look;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let s: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Number(s),
                line,
            });
            continue;
        }

        let punct = match c {
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = punct {
            tokens.push(Spanned { token, line });
            pos += 1;
            continue;
        }

        // Identifier
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_alphanumeric()
                    || chars[pos] == '_'
                    || chars[pos] == '$'
                    || chars[pos] == '-'
                    || chars[pos] == '.')
            {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Word(word),
                line,
            });
            continue;
        }

        return Err(ParseError::at(line, format!("unexpected character '{}'", c)));
    }

    Ok(())
}

/// Net bracket nesting change across `src`, ignoring brackets inside strings.
///
/// Record bodies may span several lines; the record parser keeps reading
/// lines until the running total returns to zero.
pub fn nesting_delta(src: &str) -> i32 {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in src.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth -= 1,
            _ => {}
        }
    }
    depth
}

use std::fmt;
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    Limit,
    In,
    Between,
    Is,
    Null,
    True,
    False,
    Create,
    Table,
    Drop,
    If,
    Exists,
    Show,
    Insert,
    Into,
    Values,
    Distinct,
    Join,
    On,
    Group,
    Order,
    By,
    Having,
    Update,
    Delete,
    Union,

    // Symbols
    Star,
    Comma,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Slash,
    Percent,
    Concat,

    // Literals
    Identifier(String),
    StringLit(String),
    IntLit(i64),
    DecimalLit(f64),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "identifier '{}'", name),
            Token::StringLit(s) => write!(f, "string '{}'", s),
            Token::IntLit(n) => write!(f, "{}", n),
            Token::DecimalLit(d) => write!(f, "{}", d),
            Token::Eof => write!(f, "end of input"),
            Token::Star => write!(f, "'*'"),
            Token::Comma => write!(f, "','"),
            Token::Semicolon => write!(f, "';'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::Eq => write!(f, "'='"),
            Token::NotEq => write!(f, "'!='"),
            Token::Lt => write!(f, "'<'"),
            Token::Le => write!(f, "'<='"),
            Token::Gt => write!(f, "'>'"),
            Token::Ge => write!(f, "'>='"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Concat => write!(f, "'||'"),
            keyword => write!(f, "{}", format!("{:?}", keyword).to_ascii_uppercase()),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_ascii_uppercase().as_str() {
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "AS" => Token::As,
        "LIMIT" => Token::Limit,
        "IN" => Token::In,
        "BETWEEN" => Token::Between,
        "IS" => Token::Is,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "CREATE" => Token::Create,
        "TABLE" => Token::Table,
        "DROP" => Token::Drop,
        "IF" => Token::If,
        "EXISTS" => Token::Exists,
        "SHOW" => Token::Show,
        "INSERT" => Token::Insert,
        "INTO" => Token::Into,
        "VALUES" => Token::Values,
        "DISTINCT" => Token::Distinct,
        "JOIN" => Token::Join,
        "ON" => Token::On,
        "GROUP" => Token::Group,
        "ORDER" => Token::Order,
        "BY" => Token::By,
        "HAVING" => Token::Having,
        "UPDATE" => Token::Update,
        "DELETE" => Token::Delete,
        "UNION" => Token::Union,
        _ => return None,
    };
    Some(token)
}

/// Splits SQL text into tokens. Comments (`-- ...`) and whitespace are
/// skipped; the stream always ends with `Eof`.
pub fn tokenize(sql: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let len = chars.len();
    let offset = |i: usize| chars.get(i).map(|&(pos, _)| pos).unwrap_or(sql.len());
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let (position, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '-' && next == Some('-') {
            while i < len && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }

        let mut push = |token: Token, width: usize| {
            tokens.push(Spanned { token, position });
            width
        };

        let symbol = match (c, next) {
            ('<', Some('=')) => Some((Token::Le, 2)),
            ('<', Some('>')) => Some((Token::NotEq, 2)),
            ('>', Some('=')) => Some((Token::Ge, 2)),
            ('!', Some('=')) => Some((Token::NotEq, 2)),
            ('|', Some('|')) => Some((Token::Concat, 2)),
            ('<', _) => Some((Token::Lt, 1)),
            ('>', _) => Some((Token::Gt, 1)),
            ('=', _) => Some((Token::Eq, 1)),
            ('*', _) => Some((Token::Star, 1)),
            (',', _) => Some((Token::Comma, 1)),
            (';', _) => Some((Token::Semicolon, 1)),
            ('(', _) => Some((Token::LParen, 1)),
            (')', _) => Some((Token::RParen, 1)),
            ('[', _) => Some((Token::LBracket, 1)),
            (']', _) => Some((Token::RBracket, 1)),
            ('+', _) => Some((Token::Plus, 1)),
            ('-', _) => Some((Token::Minus, 1)),
            ('/', _) => Some((Token::Slash, 1)),
            ('%', _) => Some((Token::Percent, 1)),
            _ => None,
        };
        if let Some((token, width)) = symbol {
            i += push(token, width);
            continue;
        }

        // String literals; a doubled quote escapes itself.
        if c == '\'' {
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(Error::parse_at(position, "unterminated string literal")),
                    Some(&(_, '\'')) if chars.get(i + 1).map(|&(_, c)| c) == Some('\'') => {
                        text.push('\'');
                        i += 2;
                    }
                    Some(&(_, '\'')) => {
                        i += 1;
                        break;
                    }
                    Some(&(_, ch)) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            push(Token::StringLit(text), 0);
            continue;
        }

        // Quoted identifiers
        if c == '"' || c == '`' {
            let quote = c;
            let start = i + 1;
            i = start;
            while i < len && chars[i].1 != quote {
                i += 1;
            }
            if i >= len {
                return Err(Error::parse_at(position, "unterminated quoted identifier"));
            }
            let name = sql[offset(start)..offset(i)].to_string();
            i += 1;
            push(Token::Identifier(name), 0);
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            let mut has_dot = false;
            while i < len && (chars[i].1.is_ascii_digit() || (!has_dot && chars[i].1 == '.')) {
                if chars[i].1 == '.' {
                    has_dot = true;
                }
                i += 1;
            }
            let text = &sql[offset(start)..offset(i)];
            let token = if has_dot {
                Token::DecimalLit(
                    text.parse()
                        .map_err(|_| Error::parse_at(position, format!("invalid number '{}'", text)))?,
                )
            } else {
                Token::IntLit(
                    text.parse()
                        .map_err(|_| Error::parse_at(position, format!("integer '{}' out of range", text)))?,
                )
            };
            push(token, 0);
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < len && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let word = &sql[offset(start)..offset(i)];
            push(keyword(word).unwrap_or_else(|| Token::Identifier(word.to_string())), 0);
            continue;
        }

        return Err(Error::parse_at(position, format!("unexpected character '{}'", c)));
    }

    tokens.push(Spanned { token: Token::Eof, position: sql.len() });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<Token> {
        tokenize(sql).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("select a From t"),
            vec![
                Token::Select,
                Token::Identifier("a".into()),
                Token::From,
                Token::Identifier("t".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn operators_and_literals() {
        assert_eq!(
            kinds("a<>1 AND b<=2.5 || 'it''s'"),
            vec![
                Token::Identifier("a".into()),
                Token::NotEq,
                Token::IntLit(1),
                Token::And,
                Token::Identifier("b".into()),
                Token::Le,
                Token::DecimalLit(2.5),
                Token::Concat,
                Token::StringLit("it's".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("SELECT  x -- note\n, 'é' , y").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 8, 18, 20, 25, 27, 28]);
    }

    #[test]
    fn lexical_errors_carry_position() {
        let err = tokenize("SELECT 'open").unwrap_err();
        assert_eq!(err.position, Some(7));
        let err = tokenize("SELECT #").unwrap_err();
        assert_eq!(err.position, Some(7));
    }
}

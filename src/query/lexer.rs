//! Search string tokenizer
//!
//! Produces connective, grouping and term tokens. A term is a bare word, a
//! double-quoted phrase or a `/pattern/` regex, optionally prefixed with
//! `field:`.

use super::ast::TermValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `AND`, `&&`, `&`
    And,
    /// `OR`, `||`, `|`
    Or,
    /// `NOT`, or `!` in front of a term or group
    Not,
    LeftParen,
    RightParen,
    Term {
        field: Option<String>,
        value: TermValue,
    },
    Eof,
}

/// Converts a search string into [`Token`]s.
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenizes the whole input.
    ///
    /// # Errors
    /// Unterminated quotes or regexes, and `field:` with nothing after it.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                break;
            }
            tokens.push(self.next_token()?);
        }

        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, String> {
        match self.current_char() {
            '(' => {
                self.advance();
                Ok(Token::LeftParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RightParen)
            }
            '!' => {
                self.advance();
                Ok(Token::Not)
            }
            '&' => {
                self.advance();
                self.eat('&');
                Ok(Token::And)
            }
            '|' => {
                self.advance();
                self.eat('|');
                Ok(Token::Or)
            }
            '/' => {
                let pattern = self.read_regex()?;
                Ok(Token::Term {
                    field: None,
                    value: TermValue::Regex(pattern),
                })
            }
            '"' => {
                let phrase = self.read_quoted()?;
                Ok(Token::Term {
                    field: None,
                    value: TermValue::Text(phrase),
                })
            }
            _ => self.read_word(),
        }
    }

    // --- Navigation Helpers ---

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn is_word_boundary(c: char) -> bool {
        c.is_whitespace() || c == '(' || c == ')'
    }

    // --- Extraction Logic ---

    /// Reads a bare word, which may turn out to be a keyword or a `field:`
    /// prefix.
    fn read_word(&mut self) -> Result<Token, String> {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if Self::is_word_boundary(c) || c == ':' {
                break;
            }
            word.push(c);
            self.advance();
        }

        if self.peek() == Some(':') && !word.is_empty() {
            self.advance();
            let value = self.read_value()?;
            return Ok(Token::Term {
                field: Some(word),
                value,
            });
        }

        if word.is_empty() {
            // A leading ':' with no field name is just part of the term.
            return self.read_bare().map(|text| Token::Term {
                field: None,
                value: TermValue::Text(text),
            });
        }

        match word.to_uppercase().as_str() {
            "AND" => Ok(Token::And),
            "OR" => Ok(Token::Or),
            "NOT" => Ok(Token::Not),
            _ => Ok(Token::Term {
                field: None,
                value: TermValue::Text(word),
            }),
        }
    }

    /// Value after `field:`
    fn read_value(&mut self) -> Result<TermValue, String> {
        match self.peek() {
            Some('/') => self.read_regex().map(TermValue::Regex),
            Some('"') => self.read_quoted().map(TermValue::Text),
            _ => {
                let text = self.read_bare()?;
                if text.is_empty() {
                    return Err("field without a value".to_string());
                }
                Ok(TermValue::Text(text))
            }
        }
    }

    fn read_bare(&mut self) -> Result<String, String> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if Self::is_word_boundary(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        Ok(text)
    }

    /// `/.../`, where `\/` stands for a literal slash.
    fn read_regex(&mut self) -> Result<String, String> {
        self.advance();
        let mut pattern = String::new();
        while let Some(c) = self.peek() {
            self.advance();
            match c {
                '/' => {
                    if pattern.is_empty() {
                        return Err("empty regex".to_string());
                    }
                    return Ok(pattern);
                }
                '\\' if self.peek() == Some('/') => {
                    self.advance();
                    pattern.push('/');
                }
                '\\' => {
                    pattern.push('\\');
                    if let Some(next) = self.peek() {
                        self.advance();
                        pattern.push(next);
                    }
                }
                c => pattern.push(c),
            }
        }
        Err("unterminated regex".to_string())
    }

    fn read_quoted(&mut self) -> Result<String, String> {
        self.advance();
        let mut phrase = String::new();
        while let Some(c) = self.peek() {
            self.advance();
            match c {
                '"' => return Ok(phrase),
                '\\' if self.peek() == Some('"') => {
                    self.advance();
                    phrase.push('"');
                }
                c => phrase.push(c),
            }
        }
        Err("unterminated quote".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Tokenizer::new(input).tokenize().unwrap()
    }

    fn text(field: Option<&str>, value: &str) -> Token {
        Token::Term {
            field: field.map(String::from),
            value: TermValue::Text(value.to_string()),
        }
    }

    #[test]
    fn test_words_and_keywords() {
        assert_eq!(
            tokens("dune and Emma OR not x"),
            vec![
                text(None, "dune"),
                Token::And,
                text(None, "Emma"),
                Token::Or,
                Token::Not,
                text(None, "x"),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_symbols() {
        assert_eq!(
            tokens("a && b || !(c) & d | e"),
            vec![
                text(None, "a"),
                Token::And,
                text(None, "b"),
                Token::Or,
                Token::Not,
                Token::LeftParen,
                text(None, "c"),
                Token::RightParen,
                Token::And,
                text(None, "d"),
                Token::Or,
                text(None, "e"),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_field_terms() {
        assert_eq!(tokens("count:>=5")[0], text(Some("count"), ">=5"));
        assert_eq!(tokens("url:http://x.y")[0], text(Some("url"), "http://x.y"));
        assert_eq!(tokens("title:\"two words\"")[0], text(Some("title"), "two words"));
        assert_eq!(
            tokens("content:/a b\\/c/")[0],
            Token::Term {
                field: Some("content".into()),
                value: TermValue::Regex("a b/c".into())
            }
        );
    }

    #[test]
    fn test_regex_keeps_escapes() {
        assert_eq!(
            tokens(r"/\d+\s/")[0],
            Token::Term {
                field: None,
                value: TermValue::Regex(r"\d+\s".into())
            }
        );
    }

    #[test]
    fn test_errors() {
        assert!(Tokenizer::new("/open").tokenize().is_err());
        assert!(Tokenizer::new("\"open").tokenize().is_err());
        assert!(Tokenizer::new("title: x").tokenize().is_err());
        assert!(Tokenizer::new("//").tokenize().is_err());
    }
}

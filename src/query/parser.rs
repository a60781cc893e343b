//! Recursive-descent parser for search strings
//!
//! ```text
//! query   := or_expr EOF
//! or_expr := and_expr (OR and_expr)*
//! and_expr:= unary ((AND)? unary)*
//! unary   := (NOT | '!') unary | primary
//! primary := '(' or_expr ')' | term
//! ```
//!
//! Adjacent expressions without a connective are ANDed. Runs of one
//! connective parse into a single flat node. Nesting (`(` and negation) is
//! capped at [`MAX_NESTING`] and the query at [`MAX_TERMS`] terms; past either
//! bound parsing fails and the caller falls back.

use super::ast::QueryNode;
use super::lexer::{Token, Tokenizer};

/// Parses a search string. `Ok(None)` means the string holds no terms.
///
/// # Errors
/// Any token or structure the grammar does not accept.
/// Deepest accepted nesting of groups and negations combined
pub const MAX_NESTING: usize = 16;

/// Most terms one search may hold
pub const MAX_TERMS: usize = 1000;

pub fn parse_query(input: &str) -> Result<Option<QueryNode>, String> {
    let tokens = Tokenizer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    terms: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            terms: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Option<QueryNode>, String> {
        if self.is_at_end() {
            return Ok(None);
        }
        let node = self.parse_or()?;
        if !self.is_at_end() {
            return Err(format!("Unexpected token: {:?}", self.current_token()));
        }
        Ok(Some(node))
    }

    //helpers
    fn current_token(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("query nested too deeply (max {})", MAX_NESTING));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self.current_token(),
            Token::Term { .. } | Token::Not | Token::LeftParen
        )
    }

    fn parse_or(&mut self) -> Result<QueryNode, String> {
        let mut left = self.parse_and()?;
        while matches!(self.current_token(), Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = QueryNode::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<QueryNode, String> {
        let mut left = self.parse_unary()?;
        loop {
            if matches!(self.current_token(), Token::And) {
                self.advance();
            } else if !self.starts_operand() {
                break;
            }
            let right = self.parse_unary()?;
            left = QueryNode::and(left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<QueryNode, String> {
        if matches!(self.current_token(), Token::Not) {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(QueryNode::not(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode, String> {
        match self.current_token().clone() {
            Token::LeftParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_or()?;
                if !matches!(self.current_token(), Token::RightParen) {
                    return Err(format!(
                        "Expected ')', found {:?}",
                        self.current_token()
                    ));
                }
                self.advance();
                self.leave();
                Ok(QueryNode::group(inner))
            }
            Token::Term { field, value } => {
                self.terms += 1;
                if self.terms > MAX_TERMS {
                    return Err(format!("query holds more than {} terms", MAX_TERMS));
                }
                self.advance();
                Ok(match field {
                    Some(field) => QueryNode::Field { field, value },
                    None => QueryNode::Term(value),
                })
            }
            other => Err(format!("Expected a term, found {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::TermValue;

    fn parse(input: &str) -> QueryNode {
        parse_query(input).unwrap().unwrap()
    }

    #[test]
    fn test_bare_terms_implicitly_and() {
        assert_eq!(
            parse("dune emma"),
            QueryNode::and(QueryNode::text("dune"), QueryNode::text("emma"))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(
            parse("a OR b AND c"),
            QueryNode::or(
                QueryNode::text("a"),
                QueryNode::and(QueryNode::text("b"), QueryNode::text("c"))
            )
        );
    }

    #[test]
    fn test_grouping_and_negation() {
        assert_eq!(
            parse("!(a | b) NOT count:3"),
            QueryNode::and(
                QueryNode::not(QueryNode::group(QueryNode::or(
                    QueryNode::text("a"),
                    QueryNode::text("b")
                ))),
                QueryNode::not(QueryNode::field("count", "3"))
            )
        );
    }

    #[test]
    fn test_negated_field() {
        assert_eq!(
            parse("!tags:red"),
            QueryNode::not(QueryNode::field("tags", "red"))
        );
    }

    #[test]
    fn test_regex_term() {
        assert_eq!(
            parse("content:/^x/"),
            QueryNode::Field {
                field: "content".into(),
                value: TermValue::Regex("^x".into())
            }
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(parse_query("   ").unwrap(), None);
    }

    #[test]
    fn test_nesting_is_bounded() {
        let at_limit = format!("{}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(parse_query(&at_limit).unwrap().unwrap().term_count(), 1);
        assert!(parse_query(&format!("{}a", "!".repeat(MAX_NESTING))).is_ok());

        let err = parse_query(&format!("!{}", at_limit)).unwrap_err();
        assert!(err.contains("nested too deeply"), "{}", err);
        assert!(parse_query(&"(".repeat(200_000)).is_err());
        assert!(parse_query(&format!("{}a", "!".repeat(200_000))).is_err());
    }

    #[test]
    fn test_long_conjunction_is_one_flat_node() {
        let input = vec!["w"; 300].join(" ");
        match parse(&input) {
            QueryNode::And(operands) => assert_eq!(operands.len(), 300),
            other => panic!("unexpected {:?}", other),
        }
        let too_many = vec!["w"; MAX_TERMS + 1].join(" ");
        assert!(parse_query(&too_many).is_err());
    }

    #[test]
    fn test_malformed() {
        for bad in ["(a", "a)", "a AND", "OR a", "()", "!", "a || || b", "NOT"] {
            assert!(parse_query(bad).is_err(), "expected error for {:?}", bad);
        }
    }
}

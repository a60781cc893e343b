//! Search query AST
//!
//! Closed set of node shapes, so lowering is an exhaustive match.

/// Literal part of a term
#[derive(Debug, Clone, PartialEq)]
pub enum TermValue {
    /// Bare word or quoted phrase
    Text(String),
    /// `/pattern/`
    Regex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Term with no field, matched against the title
    Term(TermValue),
    /// `field:term`
    Field { field: String, value: TermValue },
    /// Two or more operands joined by AND, flattened
    And(Vec<QueryNode>),
    /// Two or more operands joined by OR, flattened
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    /// Parenthesized sub-expression
    Group(Box<QueryNode>),
}

impl QueryNode {
    /// Appends `right` to `left` when `left` is already an AND.
    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        match left {
            QueryNode::And(mut operands) => {
                operands.push(right);
                QueryNode::And(operands)
            }
            left => QueryNode::And(vec![left, right]),
        }
    }

    /// Appends `right` to `left` when `left` is already an OR.
    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        match left {
            QueryNode::Or(mut operands) => {
                operands.push(right);
                QueryNode::Or(operands)
            }
            left => QueryNode::Or(vec![left, right]),
        }
    }

    pub fn not(inner: QueryNode) -> Self {
        QueryNode::Not(Box::new(inner))
    }

    pub fn group(inner: QueryNode) -> Self {
        QueryNode::Group(Box::new(inner))
    }

    pub fn text(value: impl Into<String>) -> Self {
        QueryNode::Term(TermValue::Text(value.into()))
    }

    pub fn field(field: impl Into<String>, value: impl Into<String>) -> Self {
        QueryNode::Field {
            field: field.into(),
            value: TermValue::Text(value.into()),
        }
    }

    /// Number of leaf terms, used for logging
    pub fn term_count(&self) -> usize {
        match self {
            QueryNode::Term(_) | QueryNode::Field { .. } => 1,
            QueryNode::And(operands) | QueryNode::Or(operands) => {
                operands.iter().map(QueryNode::term_count).sum()
            }
            QueryNode::Not(inner) | QueryNode::Group(inner) => inner.term_count(),
        }
    }
}

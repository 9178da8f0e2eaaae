//! Parser for the filter grammar consumed by the search core's filter
//! iterator tree (see `glint_core::filter`).
//!
//! BNF grammar:
//!
//! ```text
//! filter      = expression EOF
//! expression  = or
//! or          = and (WS* "||" WS* and)*
//! and         = primary (WS* "&&" WS* primary)*
//! primary     = "(" WS* expression WS* ")" | reference | condition
//! reference   = "$" word "(" WS* expression WS* ")"
//! condition   = field ":=" "[" value ("," value)* "]"
//!             | field ":" "[" value ".." value "]"
//!             | field ("!=" | ">=" | "<=" | ">" | "<" | ":") value
//! field       = word
//! value       = word | singleQuoted | doubleQuoted
//! ```

mod condition;
mod error;
mod value;

pub use error::{Error, ErrorKind};
use nom::branch::alt;
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, cut, eof};
use nom::sequence::{delimited, preceded, terminated};
use nom::Finish;
use nom_locate::LocatedSpan;

pub type Span<'a> = LocatedSpan<&'a str, &'a str>;
type IResult<'a, Ret> = nom::IResult<Span<'a>, Ret, Error<'a>>;

const MAX_FILTER_DEPTH: usize = 200;

#[derive(Debug, Clone, Eq)]
pub struct Token<'a> {
    span: Span<'a>,
    value: Option<String>,
}

impl<'a> PartialEq for Token<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl<'a> Token<'a> {
    pub fn new(span: Span<'a>, value: Option<String>) -> Self {
        Self { span, value }
    }

    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.span)
    }

    pub fn parse_finite_float(&self) -> Result<f64, Error<'a>> {
        self.value()
            .parse::<f64>()
            .map_err(|_| Error::new_from_kind(self.span, error::ErrorKind::ExpectedValue))
            .and_then(|v| {
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(Error::new_from_kind(self.span, error::ErrorKind::ExpectedValue))
                }
            })
    }
}

impl<'a> From<Span<'a>> for Token<'a> {
    fn from(span: Span<'a>) -> Self {
        Self { span, value: None }
    }
}

impl<'a> From<&'a str> for Token<'a> {
    fn from(s: &'a str) -> Self {
        Token::from(Span::new_extra(s, s))
    }
}

/// Comparator carried by a filter condition leaf, matching spec §6's
/// `op ∈ { :, :=, :!=, :>, :<, :>=, :<=, :[lo..hi] }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    SetEq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr<'a> {
    Condition { field: Token<'a>, op: Op, values: Vec<Token<'a>> },
    Reference { collection: Token<'a>, inner: Box<FilterExpr<'a>> },
    And(Box<FilterExpr<'a>>, Box<FilterExpr<'a>>),
    Or(Box<FilterExpr<'a>>, Box<FilterExpr<'a>>),
}

fn parse_primary(input: Span) -> IResult<FilterExpr> {
    alt((
        delimited(
            terminated(char('('), multispace0),
            cut(parse_expression),
            cut(preceded(multispace0, char(')'))),
        ),
        |i| condition::parse_reference(i, parse_expression),
        condition::parse_condition,
    ))(input)
}

fn parse_and(input: Span) -> IResult<FilterExpr> {
    let (input, first) = parse_primary(input)?;
    let (input, rest) = nom::multi::many0(preceded(
        delimited(multispace0, nom::bytes::complete::tag("&&"), multispace0),
        cut(parse_primary),
    ))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, node| FilterExpr::And(Box::new(acc), Box::new(node)))))
}

fn parse_or(input: Span) -> IResult<FilterExpr> {
    let (input, first) = parse_and(input)?;
    let (input, rest) = nom::multi::many0(preceded(
        delimited(multispace0, nom::bytes::complete::tag("||"), multispace0),
        cut(parse_and),
    ))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, node| FilterExpr::Or(Box::new(acc), Box::new(node)))))
}

fn parse_expression(input: Span) -> IResult<FilterExpr> {
    delimited(multispace0, parse_or, multispace0)(input)
}

/// Parses a complete filter string into its AST. Returns `Ok` only if the
/// full input is consumed and matched by the grammar.
pub fn parse_filter(input: &str) -> Result<FilterExpr, Error> {
    let span = Span::new_extra(input, input);
    let (_, node) =
        all_consuming(terminated(parse_expression, eof))(span).finish().map(|(rem, node)| (rem, node))?;
    depth_check(&node, 0)?;
    Ok(node)
}

fn depth_check<'a>(expr: &FilterExpr<'a>, depth: usize) -> Result<(), Error<'a>> {
    if depth > MAX_FILTER_DEPTH {
        return Err(Error::new_from_kind(
            Span::new_extra("", ""),
            error::ErrorKind::ExpectedClosingParenthesis,
        ));
    }
    match expr {
        FilterExpr::And(l, r) | FilterExpr::Or(l, r) => {
            depth_check(l, depth + 1)?;
            depth_check(r, depth + 1)
        }
        FilterExpr::Reference { inner, .. } => depth_check(inner, depth + 1),
        FilterExpr::Condition { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_equality() {
        let expr = parse_filter("year:1922").unwrap();
        assert_eq!(
            expr,
            FilterExpr::Condition {
                field: "year".into(),
                op: Op::Eq,
                values: vec!["1922".into()],
            }
        );
    }

    #[test]
    fn parses_and_or_precedence() {
        let expr = parse_filter("a:1 && b:2 || c:3").unwrap();
        // `&&` binds tighter than `||`.
        match expr {
            FilterExpr::Or(l, r) => {
                assert!(matches!(*l, FilterExpr::And(_, _)));
                assert!(matches!(*r, FilterExpr::Condition { .. }));
            }
            other => panic!("expected Or at top level, got {other:?}"),
        }
    }

    #[test]
    fn parses_set_membership() {
        let expr = parse_filter("brand:=[nike,adidas]").unwrap();
        match expr {
            FilterExpr::Condition { op: Op::SetEq, values, .. } => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].value(), "nike");
                assert_eq!(values[1].value(), "adidas");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_range() {
        let expr = parse_filter("points:[10..100]").unwrap();
        match expr {
            FilterExpr::Condition { op: Op::Range, values, .. } => {
                assert_eq!(values[0].value(), "10");
                assert_eq!(values[1].value(), "100");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_not_equal() {
        let expr = parse_filter("status:!=deleted").unwrap();
        assert!(matches!(expr, FilterExpr::Condition { op: Op::NotEq, .. }));
    }

    #[test]
    fn parses_parenthesized_grouping() {
        let expr = parse_filter("(a:1 || b:2) && c:3").unwrap();
        match expr {
            FilterExpr::And(l, r) => {
                assert!(matches!(*l, FilterExpr::Or(_, _)));
                assert!(matches!(*r, FilterExpr::Condition { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_reference_filter() {
        let expr = parse_filter("$Authors(name:=[tolkien])").unwrap();
        match expr {
            FilterExpr::Reference { collection, inner } => {
                assert_eq!(collection.value(), "Authors");
                assert!(matches!(*inner, FilterExpr::Condition { op: Op::SetEq, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_range() {
        assert!(parse_filter("points:[10..]").is_err());
    }
}

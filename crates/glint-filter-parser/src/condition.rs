use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, multispace0};
use nom::combinator::{cut, opt};
use nom::multi::separated_list0;
use nom::sequence::{delimited, preceded, separated_pair};

use crate::error::ErrorKind;
use crate::value::parse_value;
use crate::{Error, FilterExpr, IResult, Op, Span, Token};

/// `op = ":=" | ":!=" | ":>=" | ":<=" | ":>" | ":<" | ":"`
fn parse_op(input: Span) -> IResult<Op> {
    alt((
        nom::combinator::value(Op::SetEq, tag(":=")),
        nom::combinator::value(Op::NotEq, tag(":!=")),
        nom::combinator::value(Op::Gte, tag(":>=")),
        nom::combinator::value(Op::Lte, tag(":<=")),
        nom::combinator::value(Op::Gt, tag(":>")),
        nom::combinator::value(Op::Lt, tag(":<")),
        nom::combinator::value(Op::Eq, tag(":")),
    ))(input)
}

/// `value_list = "[" value ("," value)* "]"`
fn parse_value_list(input: Span) -> IResult<Vec<Token>> {
    delimited(
        char('['),
        separated_list0(delimited(multispace0, char(','), multispace0), parse_value),
        cut(char(']')),
    )(input)
    .map_err(|_| {
        nom::Err::Failure(Error::new_from_kind(input, ErrorKind::ExpectedClosingBracket))
    })
}

/// `range = "[" value ".." value "]"`
fn parse_range(input: Span) -> IResult<(Token, Token)> {
    delimited(
        char('['),
        separated_pair(parse_value, tag(".."), parse_value),
        cut(char(']')),
    )(input)
    .map_err(|_| nom::Err::Failure(Error::new_from_kind(input, ErrorKind::MalformedRange)))
}

/// `condition = field op ( value_list | range | value )`
pub fn parse_condition(input: Span) -> IResult<FilterExpr> {
    let (input, field) = crate::value::word(input)?;
    let (input, op) = parse_op(input)?;

    if let Op::SetEq = op {
        let (input, values) = parse_value_list(input)?;
        return Ok((input, FilterExpr::Condition { field, op, values }));
    }

    if let Op::Eq = op {
        if let Ok((input, (lo, hi))) = parse_range(input) {
            return Ok((input, FilterExpr::Condition { field, op: Op::Range, values: vec![lo, hi] }));
        }
        if let Ok((input, values)) = parse_value_list(input) {
            return Ok((input, FilterExpr::Condition { field, op: Op::SetEq, values }));
        }
    }

    let (input, value) = cut(parse_value)(input)?;
    Ok((input, FilterExpr::Condition { field, op, values: vec![value] }))
}

/// `reference = "$" word "(" expression ")"`
pub fn parse_reference<'a>(
    input: Span<'a>,
    parse_expression: impl Fn(Span<'a>) -> IResult<'a, FilterExpr<'a>>,
) -> IResult<'a, FilterExpr<'a>> {
    let (input, _) = char('$')(input)?;
    let (input, collection) = cut(crate::value::word)(input).map_err(|_| {
        nom::Err::Failure(Error::new_from_kind(input, ErrorKind::MissingCollectionName))
    })?;
    let (input, inner) = delimited(
        char('('),
        preceded(multispace0, parse_expression),
        cut(preceded(multispace0, char(')'))),
    )(input)
    .map_err(|_| {
        nom::Err::Failure(Error::new_from_kind(input, ErrorKind::ExpectedClosingParenthesis))
    })?;
    Ok((input, FilterExpr::Reference { collection, inner: Box::new(inner) }))
}

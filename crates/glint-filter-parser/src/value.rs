use nom::character::complete::char;
use nom::sequence::delimited;
use nom::{InputIter, InputLength, InputTake, Slice};

use crate::error::ErrorKind;
use crate::{Error, IResult, Span, Token};

fn unescape(buf: Span, char_to_escape: char) -> String {
    let to_escape = format!("\\{}", char_to_escape);
    buf.replace(&to_escape, &char_to_escape.to_string())
}

/// Parses a value enclosed in `quote`, unescaping `\quote` along the way.
fn quoted_by(quote: char, input: Span) -> IResult<Token> {
    if input.is_empty() {
        return Ok((input.slice(input.input_len()..), input.into()));
    }

    let mut escaped = false;
    let mut indices = input.iter_indices();

    while let Some((idx, c)) = indices.next() {
        if c == quote {
            let (rem, output) = input.take_split(idx);
            return Ok((rem, Token::new(output, escaped.then(|| unescape(output, quote)))));
        } else if c == '\\' {
            if let Some((_, c)) = indices.next() {
                escaped |= c == quote;
            } else {
                return Err(nom::Err::Error(Error::new_from_kind(input, ErrorKind::ExpectedValue)));
            }
        }
    }

    Ok((input.slice(input.input_len()..), Token::new(input, escaped.then(|| unescape(input, quote)))))
}

fn is_value_component(c: char) -> bool {
    c.is_alphanumeric() || "_-.@/+".contains(c)
}

/// `word = (alphanumeric | _ | - | . | @ | / | +)+`, stopping short of a
/// `..` range separator so that `10..100` tokenizes as `10`, `..`, `100`
/// rather than swallowing the dots into a single word.
pub fn word(input: Span) -> IResult<Token> {
    let mut end = 0;
    let chars: Vec<(usize, char)> = input.iter_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        let (idx, c) = chars[i];
        if !is_value_component(c) {
            break;
        }
        if c == '.' && chars.get(i + 1).map(|(_, c)| *c) == Some('.') {
            break;
        }
        end = idx + c.len_utf8();
        i += 1;
    }
    if end == 0 {
        return Err(nom::Err::Error(Error::new_from_kind(input, ErrorKind::ExpectedValue)));
    }
    let (rem, tok) = input.take_split(end);
    Ok((rem, tok.into()))
}

/// `value = word | singleQuoted | doubleQuoted`
pub fn parse_value(input: Span) -> IResult<Token> {
    if let Ok((rem, value)) = delimited(char('\''), |i| quoted_by('\'', i), char('\''))(input) {
        return Ok((rem, value));
    }
    if let Ok((rem, value)) = delimited(char('"'), |i| quoted_by('"', i), char('"'))(input) {
        return Ok((rem, value));
    }
    word(input)
}

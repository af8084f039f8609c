use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, cut, map, map_res, not, opt, recognize, value as constant};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};
use crate::query::ast::{Arg, Call, CondOp, Value};
use crate::schema::time_quantum::parse_timestamp;

type NomError<'a> = nom::error::Error<&'a str>;

enum Item {
    Child(Call),
    Arg(Arg),
}

/// Deepest `(`/`[` nesting a request may use. Deeper input fails before the
/// recursive parsers run.
pub const MAX_NESTING: usize = 64;

/// Parses a PQL request into its statements. Any syntax error fails the
/// whole request and reports the byte offset where parsing stopped.
pub fn parse(text: &str) -> Result<Vec<Call>> {
    check_nesting(text)?;
    let mut statements = all_consuming(delimited(
        multispace0,
        many0(terminated(call, multispace0)),
        multispace0,
    ));
    match statements.parse(text) {
        Ok((_, calls)) => Ok(calls),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = text.len() - e.input.len();
            Err(Error::parse_at(position, describe(e.input)))
        }
        Err(nom::Err::Incomplete(_)) => Err(Error::parse_at(text.len(), "unexpected end of query")),
    }
}

fn check_nesting(text: &str) -> Result<()> {
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => {
                    depth += 1;
                    if depth > MAX_NESTING {
                        return Err(Error::parse_at(i, format!("nesting deeper than {} levels", MAX_NESTING)));
                    }
                }
                ')' | ']' => depth = depth.saturating_sub(1),
                _ => {}
            },
        }
    }
    Ok(())
}

fn describe(rest: &str) -> String {
    match rest.chars().next() {
        None => "unexpected end of query".to_string(),
        Some(_) => {
            let snippet: String = rest.chars().take(16).collect();
            format!("unexpected input near '{}'", snippet)
        }
    }
}

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = NomError<'a>>
where
    P: Parser<&'a str, Output = O, Error = NomError<'a>>,
{
    delimited(multispace0, inner, multispace0)
}

fn ident(input: &str) -> IResult<&str, &str> {
    recognize((
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    ))
    .parse(input)
}

fn call(input: &str) -> IResult<&str, Call> {
    let (input, name) = terminated(ident, (multispace0, char('('))).parse(input)?;
    let (input, items) = cut(terminated(
        ws(separated_list0(ws(char(',')), item)),
        char(')'),
    ))
    .parse(input)?;

    let mut call = Call::new(name);
    for item in items {
        match item {
            Item::Child(child) => call.children.push(child),
            Item::Arg(arg) => call.args.push(arg),
        }
    }
    Ok((input, call))
}

fn item(input: &str) -> IResult<&str, Item> {
    alt((
        map(call, Item::Child),
        map(between, Item::Arg),
        map(condition, Item::Arg),
        map(keyed, Item::Arg),
        map(literal, |value| Item::Arg(Arg::Positional(value))),
    ))
    .parse(input)
}

fn cond_op(input: &str) -> IResult<&str, CondOp> {
    alt((
        constant(CondOp::Eq, tag("==")),
        constant(CondOp::Neq, tag("!=")),
        constant(CondOp::Lte, tag("<=")),
        constant(CondOp::Gte, tag(">=")),
        constant(CondOp::Lt, tag("<")),
        constant(CondOp::Gt, tag(">")),
    ))
    .parse(input)
}

fn lower_op(input: &str) -> IResult<&str, CondOp> {
    alt((constant(CondOp::Lte, tag("<=")), constant(CondOp::Lt, tag("<")))).parse(input)
}

fn condition(input: &str) -> IResult<&str, Arg> {
    map((ident, ws(cond_op), literal), |(field, op, value)| Arg::Condition {
        field: field.to_string(),
        op,
        value,
    })
    .parse(input)
}

fn between(input: &str) -> IResult<&str, Arg> {
    map(
        (literal, ws(lower_op), ident, ws(lower_op), literal),
        |(low, low_op, field, high_op, high)| Arg::Between {
            low,
            low_op,
            field: field.to_string(),
            high_op,
            high,
        },
    )
    .parse(input)
}

fn keyed(input: &str) -> IResult<&str, Arg> {
    map(
        (ident, ws(terminated(char('='), not(char('=')))), literal),
        |(key, _, value)| Arg::Keyed { key: key.to_string(), value },
    )
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(list, Value::List),
        map(quoted, Value::Str),
        map(timestamp, Value::Timestamp),
        map(float, Value::Float),
        map(integer, Value::Int),
        map(ident, |word| match word {
            "null" => Value::Null,
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Ident(word.to_string()),
        }),
    ))
    .parse(input)
}

fn list(input: &str) -> IResult<&str, Vec<Value>> {
    preceded(
        char('['),
        cut(terminated(ws(separated_list0(ws(char(',')), literal)), char(']'))),
    )
    .parse(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize((opt(char('-')), digit1)), str::parse::<i64>).parse(input)
}

fn float(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize((opt(char('-')), digit1, char('.'), digit1)),
        str::parse::<f64>,
    )
    .parse(input)
}

fn timestamp(input: &str) -> IResult<&str, chrono::NaiveDateTime> {
    map_res(
        recognize((
            digit1,
            char('-'),
            digit1,
            char('-'),
            digit1,
            char('T'),
            digit1,
            char(':'),
            digit1,
            opt((char(':'), digit1)),
        )),
        parse_timestamp,
    )
    .parse(input)
}

/// Single- or double-quoted string with backslash escapes.
fn quoted(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('"' | '\''))) => c,
        _ => return Err(nom::Err::Error(NomError::new(input, nom::error::ErrorKind::Char))),
    };
    let mut out = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[i + c.len_utf8()..], out));
        } else {
            out.push(c);
        }
    }
    Err(nom::Err::Failure(NomError::new(input, nom::error::ErrorKind::Char)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn parses_set_and_row() {
        let calls = parse("Set(10, stats=1)\nRow(stats=1)").unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            Call::new("Set").with_positional(Value::Int(10)).with_keyed("stats", Value::Int(1))
        );
        assert_eq!(calls[1].to_string(), "Row(stats=1)");
    }

    #[test]
    fn parses_conditions() {
        let calls = parse("Row(age > 5) Row(1 < age <= 9) Row(age != null) Row(age == -3)").unwrap();
        assert_eq!(
            calls[0].args[0],
            Arg::Condition { field: "age".into(), op: CondOp::Gt, value: Value::Int(5) }
        );
        assert_eq!(
            calls[1].args[0],
            Arg::Between {
                low: Value::Int(1),
                low_op: CondOp::Lt,
                field: "age".into(),
                high_op: CondOp::Lte,
                high: Value::Int(9),
            }
        );
        assert_eq!(
            calls[2].args[0],
            Arg::Condition { field: "age".into(), op: CondOp::Neq, value: Value::Null }
        );
        assert_eq!(
            calls[3].args[0],
            Arg::Condition { field: "age".into(), op: CondOp::Eq, value: Value::Int(-3) }
        );
    }

    #[test]
    fn parses_literals_and_nesting() {
        let text = r#"Count(Union(Row(name='o\'k'), Row(f=1, from=2024-01-02T03:04, to="2025-01-01T00:00"), ConstRow(columns=[1, 2.5, true])))"#;
        let calls = parse(text).unwrap();
        let union = &calls[0].children[0];
        assert_eq!(union.children.len(), 3);
        assert_eq!(union.children[0].keyed("name"), Some(&Value::Str("o'k".into())));
        assert!(matches!(union.children[1].keyed("from"), Some(Value::Timestamp(_))));
        assert_eq!(
            union.children[2].keyed("columns"),
            Some(&Value::List(vec![Value::Int(1), Value::Float(2.5), Value::Bool(true)]))
        );
    }

    #[test]
    fn display_reparses() {
        let text = "TopN(Row(a=1), stats, n=5)";
        let calls = parse(text).unwrap();
        let again = parse(&calls[0].to_string()).unwrap();
        assert_eq!(calls, again);
    }

    #[test]
    fn errors_report_position() {
        let err = parse("Row(stats=1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.position, Some(11));

        let err = parse("Set(10, stats=1) Row(stats=)").unwrap_err();
        assert_eq!(err.position, Some(26));

        assert!(parse("Row(x=\"open)").is_err());
        assert!(parse("Row(x=1,)").is_err());
        assert!(parse("garbage").is_err());
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let text = "Not(".repeat(10_000);
        let err = parse(&text).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.position, Some(4 * MAX_NESTING + 3));

        let err = parse(&format!("Row(f={}1", "[".repeat(10_000))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);

        let nested = format!("{}All(){}", "Not(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert_eq!(parse(&nested).unwrap()[0].depth(), MAX_NESTING);
        assert!(parse(&format!(r#"Row(name="{}")"#, "(".repeat(100))).is_ok());
    }

    #[test]
    fn empty_query_has_no_statements() {
        assert!(parse("  \n ").unwrap().is_empty());
    }
}

use anyhow::{bail, Result};
use nom::{
    branch::alt,
    bytes::complete::{escaped, tag, take_till1, take_while, take_while1, take_while_m_n},
    character::complete::{anychar, char, none_of, not_line_ending, one_of, satisfy},
    combinator::{eof, map, not, opt, peek, recognize, verify},
    error::{context, VerboseError},
    multi::many1,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

const KEYWORDS: &[&str] = &[
    "txn", "balance", "open", "close", "commodity", "pad", "event", "query", "note", "document",
    "price", "custom", "include", "option", "plugin", "pushtag", "poptag", "pushmeta", "popmeta",
];

const MAX_CURRENCY_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Date,
    Account,
    Currency,
    /// A number or an arithmetic expression without spaces, e.g. `10.00/3`
    Number,
    String,
    Flag,
    Keyword,
    Tag,
    Link,
    /// Metadata key including the trailing colon
    Key,
    Bool,
    Comment,
    Punct,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn is(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }
}

/// One logical line. Multi-line strings keep their line breaks inside the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Width of the leading whitespace, tabs count as 4
    pub indent: usize,
    pub tokens: Vec<Token>,
}

impl Line {
    pub fn is_blank(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub fn lex(input: &str) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    let mut rest = input;
    let mut lineno = 1;
    while !rest.is_empty() {
        let content = rest.trim_start_matches([' ', '\t']);
        let indent = rest[..rest.len() - content.len()]
            .chars()
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum();
        let mut cursor = content;
        let mut tokens = Vec::new();
        loop {
            cursor = cursor.trim_start_matches([' ', '\t']);
            if let Some(remaining) = cursor
                .strip_prefix("\r\n")
                .or_else(|| cursor.strip_prefix('\n'))
            {
                cursor = remaining;
                break;
            }
            if cursor.is_empty() {
                break;
            }
            match token(cursor) {
                Ok((remaining, token)) => {
                    lineno += token.value.matches('\n').count();
                    tokens.push(token);
                    cursor = remaining;
                }
                Err(_) => {
                    let line = cursor.lines().next().unwrap_or_default();
                    bail!("Failed to tokenize line {lineno} at `{line}`");
                }
            }
        }
        lines.push(Line { indent, tokens });
        lineno += 1;
        rest = cursor;
    }
    Ok(lines)
}

fn token(input: &str) -> ParseResult<Token> {
    context(
        "Failed to parse token",
        alt((
            kind(TokenKind::Comment, comment),
            kind(TokenKind::String, string),
            kind(TokenKind::Date, date),
            kind(TokenKind::Number, number),
            kind(TokenKind::Account, account),
            kind(TokenKind::Key, key),
            kind(TokenKind::Keyword, keyword),
            upper_word,
            kind(TokenKind::Tag, tag_or_link('#')),
            kind(TokenKind::Link, tag_or_link('^')),
            kind(TokenKind::Flag, flag),
            kind(TokenKind::Punct, punct),
            kind(TokenKind::Other, other),
        )),
    )(input)
}

fn kind<'a>(
    kind: TokenKind,
    parser: impl FnMut(&'a str) -> ParseResult<'a, &'a str>,
) -> impl FnMut(&'a str) -> ParseResult<'a, Token> {
    map(parser, move |value| Token::new(kind, value))
}

fn comment(input: &str) -> ParseResult<&str> {
    recognize(preceded(char(';'), not_line_ending))(input)
}

fn string(input: &str) -> ParseResult<&str> {
    recognize(delimited(
        char('"'),
        opt(escaped(none_of("\\\""), '\\', anychar)),
        char('"'),
    ))(input)
}

fn date(input: &str) -> ParseResult<&str> {
    let digits = |min, max| take_while_m_n(min, max, |c: char| c.is_ascii_digit());
    terminated(
        recognize(tuple((
            digits(4, 4),
            one_of("-/"),
            digits(1, 2),
            one_of("-/"),
            digits(1, 2),
        ))),
        not(satisfy(|c| c.is_ascii_digit())),
    )(input)
}

/// Must end at whitespace or a delimiter, `10:30` is left to `other`
fn number(input: &str) -> ParseResult<&str> {
    terminated(
        verify(
            take_while1(|c: char| c.is_ascii_digit() || "+-*/().,".contains(c)),
            |value: &str| value.chars().any(|c| c.is_ascii_digit()),
        ),
        peek(alt((
            recognize(satisfy(|c: char| c.is_whitespace() || "{}@;~".contains(c))),
            eof,
        ))),
    )(input)
}

fn account(input: &str) -> ParseResult<&str> {
    let segment = || take_while1(|c: char| c.is_alphanumeric() || c == '-');
    recognize(pair(
        pair(satisfy(|c| c.is_uppercase()), opt(segment())),
        many1(preceded(char(':'), segment())),
    ))(input)
}

fn lower_word(input: &str) -> ParseResult<&str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_lowercase()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
    ))(input)
}

fn key(input: &str) -> ParseResult<&str> {
    recognize(terminated(lower_word, char(':')))(input)
}

fn keyword(input: &str) -> ParseResult<&str> {
    verify(lower_word, |word: &str| KEYWORDS.contains(&word))(input)
}

/// Currencies, `TRUE`/`FALSE` and `NULL` share the same shape
fn upper_word(input: &str) -> ParseResult<Token> {
    map(
        recognize(pair(
            satisfy(|c| c.is_ascii_uppercase()),
            take_while(|c: char| {
                c.is_ascii_uppercase() || c.is_ascii_digit() || "'._-".contains(c)
            }),
        )),
        |word: &str| match word {
            "TRUE" | "FALSE" => Token::new(TokenKind::Bool, word),
            "NULL" => Token::new(TokenKind::Keyword, word),
            _ if is_currency(word) => Token::new(TokenKind::Currency, word),
            _ => Token::new(TokenKind::Other, word),
        },
    )(input)
}

fn is_currency(word: &str) -> bool {
    word.len() <= MAX_CURRENCY_LEN
        && word
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn tag_or_link<'a>(prefix: char) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    recognize(preceded(
        char(prefix),
        take_while1(|c: char| c.is_alphanumeric() || "-_/.".contains(c)),
    ))
}

fn flag(input: &str) -> ParseResult<&str> {
    terminated(
        recognize(one_of("*!&?%")),
        peek(alt((recognize(one_of(" \t\r\n")), eof))),
    )(input)
}

fn punct(input: &str) -> ParseResult<&str> {
    alt((
        tag("{{"),
        tag("}}"),
        tag("@@"),
        recognize(one_of("{}@,~#")),
    ))(input)
}

fn other(input: &str) -> ParseResult<&str> {
    verify(take_till1(|c: char| c.is_whitespace()), |value: &str| {
        !value.starts_with('"')
    })(input)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn kinds(line: &Line) -> Vec<(TokenKind, &str)> {
        line.tokens
            .iter()
            .map(|token| (token.kind, token.value.as_str()))
            .collect()
    }

    #[test]
    fn transaction() {
        let lines = lex(concat!(
            "2024-01-05 * \"Coffee Shop\" \"Latte\" #food ^receipt-1 ; morning\n",
            "  import-id: \"abc\"\n",
            "  Expenses:Food:Coffee    4.50 USD\n",
            "\tAssets:Bank:Checking\n",
        ))
        .unwrap();
        assert_eq!(4, lines.len());
        assert_eq!(0, lines[0].indent);
        assert_eq!(
            vec![
                (TokenKind::Date, "2024-01-05"),
                (TokenKind::Flag, "*"),
                (TokenKind::String, "\"Coffee Shop\""),
                (TokenKind::String, "\"Latte\""),
                (TokenKind::Tag, "#food"),
                (TokenKind::Link, "^receipt-1"),
                (TokenKind::Comment, "; morning"),
            ],
            kinds(&lines[0])
        );
        assert_eq!(2, lines[1].indent);
        assert_eq!(
            vec![(TokenKind::Key, "import-id:"), (TokenKind::String, "\"abc\"")],
            kinds(&lines[1])
        );
        assert_eq!(
            vec![
                (TokenKind::Account, "Expenses:Food:Coffee"),
                (TokenKind::Number, "4.50"),
                (TokenKind::Currency, "USD"),
            ],
            kinds(&lines[2])
        );
        assert_eq!(4, lines[3].indent);
    }

    #[test]
    fn cost_and_price() {
        let lines = lex("  Assets:Stock  10 AAPL {{1,500.00 USD}} @@ -1500 USD\n").unwrap();
        assert_eq!(
            vec![
                (TokenKind::Account, "Assets:Stock"),
                (TokenKind::Number, "10"),
                (TokenKind::Currency, "AAPL"),
                (TokenKind::Punct, "{{"),
                (TokenKind::Number, "1,500.00"),
                (TokenKind::Currency, "USD"),
                (TokenKind::Punct, "}}"),
                (TokenKind::Punct, "@@"),
                (TokenKind::Number, "-1500"),
                (TokenKind::Currency, "USD"),
            ],
            kinds(&lines[0])
        );
    }

    #[rstest]
    #[case("2024-01-01", TokenKind::Date)]
    #[case("2024/1/2", TokenKind::Date)]
    #[case("10.00/3", TokenKind::Number)]
    #[case("10:30", TokenKind::Other)]
    #[case("4.50USD", TokenKind::Other)]
    #[case("open", TokenKind::Keyword)]
    #[case("opening", TokenKind::Other)]
    #[case("TRUE", TokenKind::Bool)]
    #[case("VBTLX", TokenKind::Currency)]
    #[case("USD-", TokenKind::Other)]
    #[case("Liabilities:CreditCard:CapitalOne", TokenKind::Account)]
    #[case("Assets:2024-Savings", TokenKind::Account)]
    #[case("!", TokenKind::Flag)]
    #[case("~", TokenKind::Punct)]
    fn single_token(#[case] input: &str, #[case] expected: TokenKind) {
        let lines = lex(input).unwrap();
        assert_eq!(vec![(expected, input)], kinds(&lines[0]));
    }

    #[test]
    fn multi_line_string() {
        let lines = lex("2024-01-01 note Assets:Cash \"first\nsecond \\\" quoted\"\n\n").unwrap();
        assert_eq!(2, lines.len());
        assert_eq!(
            Token::new(TokenKind::String, "\"first\nsecond \\\" quoted\""),
            lines[0].tokens[3]
        );
        assert!(lines[1].is_blank());
    }

    #[test]
    fn empty_string() {
        let lines = lex("option \"title\" \"\"").unwrap();
        assert_eq!(Token::new(TokenKind::String, "\"\""), lines[0].tokens[2]);
    }

    #[test]
    fn crlf_line_endings() {
        let lines = lex("include \"a.bean\"\r\ninclude \"b.bean\"\r\n").unwrap();
        assert_eq!(2, lines.len());
        assert_eq!(2, lines[1].tokens.len());
    }

    #[test]
    fn unterminated_string() {
        let err = lex("\n2024-01-01 * \"oops\n").unwrap_err();
        assert_eq!("Failed to tokenize line 2 at `\"oops`", err.to_string());
    }
}

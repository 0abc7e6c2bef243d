use anyhow::Result;

use super::lexer::{lex, Line, Token, TokenKind};

/// A line below a directive. Depth 1 holds metadata and postings, depth 2
/// holds posting metadata, depth 0 a column 0 comment between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub depth: usize,
    pub tokens: Vec<Token>,
}

impl Child {
    pub fn new(depth: usize, tokens: Vec<Token>) -> Self {
        Self { depth, tokens }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub header: Vec<Token>,
    pub children: Vec<Child>,
}

impl Directive {
    pub fn date(&self) -> Option<&str> {
        self.header
            .first()
            .filter(|token| token.kind == TokenKind::Date)
            .map(|token| token.value.as_str())
    }

    /// `txn` for transactions (flag or `txn` keyword), the keyword otherwise
    pub fn directive_type(&self) -> Option<&str> {
        let position = usize::from(self.date().is_some());
        let token = self.header.get(position)?;
        match token.kind {
            TokenKind::Flag => Some("txn"),
            TokenKind::Keyword => Some(token.value.as_str()),
            _ => None,
        }
    }

    pub fn is_transaction(&self) -> bool {
        self.date().is_some() && self.directive_type() == Some("txn")
    }

    /// Value of a directive level metadata entry, unquoted if it is a string
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.children
            .iter()
            .filter(|child| child.depth == 1)
            .find(|child| {
                child.tokens.first().is_some_and(|token| {
                    token.kind == TokenKind::Key && token.value.strip_suffix(':') == Some(key)
                })
            })
            .and_then(|child| child.tokens.get(1))
            .map(token_text)
    }

    pub fn string_args(&self) -> impl Iterator<Item = String> + '_ {
        self.header
            .iter()
            .filter(|token| token.kind == TokenKind::String)
            .map(token_text)
    }

    pub fn tokens_mut(&mut self) -> impl Iterator<Item = &mut Token> {
        self.header.iter_mut().chain(
            self.children
                .iter_mut()
                .flat_map(|child| child.tokens.iter_mut()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Blank,
    Comment(Token),
    Directive(Directive),
    /// Indented lines with no directive above them
    Orphan(Vec<Token>),
}

impl Entry {
    fn tokens_mut(&mut self) -> Box<dyn Iterator<Item = &mut Token> + '_> {
        match self {
            Entry::Blank => Box::new(std::iter::empty()),
            Entry::Comment(token) => Box::new(std::iter::once(token)),
            Entry::Directive(directive) => Box::new(directive.tokens_mut()),
            Entry::Orphan(tokens) => Box::new(tokens.iter_mut()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeancountFile {
    pub entries: Vec<Entry>,
}

impl BeancountFile {
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut base_indent = None;
        let mut lines = lex(text)?.into_iter().peekable();
        while let Some(Line { indent, tokens }) = lines.next() {
            if tokens.is_empty() {
                entries.push(Entry::Blank);
                base_indent = None;
                continue;
            }
            if indent == 0 {
                let is_comment =
                    matches!(tokens.as_slice(), [token] if token.kind == TokenKind::Comment);
                if is_comment {
                    let continues_directive = lines
                        .peek()
                        .is_some_and(|next| next.indent > 0 && !next.is_blank());
                    match entries.last_mut() {
                        Some(Entry::Directive(directive)) if continues_directive => {
                            directive.children.push(Child::new(0, tokens));
                        }
                        _ => {
                            base_indent = None;
                            entries.extend(tokens.into_iter().map(Entry::Comment));
                        }
                    }
                    continue;
                }
                base_indent = None;
                entries.push(Entry::Directive(Directive {
                    header: tokens,
                    children: Vec::new(),
                }));
                continue;
            }
            match entries.last_mut() {
                Some(Entry::Directive(directive)) => {
                    let base = *base_indent.get_or_insert(indent);
                    let depth = if indent > base { 2 } else { 1 };
                    directive.children.push(Child::new(depth, tokens));
                }
                _ => entries.push(Entry::Orphan(tokens)),
            }
        }
        Ok(Self { entries })
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Directive(directive) => Some(directive),
            _ => None,
        })
    }

    pub fn includes(&self) -> impl Iterator<Item = String> + '_ {
        self.directives()
            .filter(|directive| {
                directive
                    .header
                    .first()
                    .is_some_and(|token| token.is(TokenKind::Keyword, "include"))
            })
            .filter_map(|directive| directive.string_args().next())
    }

    pub fn tokens_mut(&mut self) -> impl Iterator<Item = &mut Token> {
        self.entries.iter_mut().flat_map(Entry::tokens_mut)
    }
}

/// String tokens lose their quotes and escapes, other tokens are taken as is
pub fn token_text(token: &Token) -> String {
    if token.kind != TokenKind::String {
        return token.value.clone();
    }
    let inner = &token.value[1..token.value.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                result.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Quotes a value as a beancount string token
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEDGER: &str = r#"; Accounts
option "title" "Household"
include "books/*.bean"

2024-01-05 * "Coffee Shop" "Latte"
  import-id: "chase.csv:2"
  ; paid in cash
  Expenses:Food  4.50 USD
    receipt: "r-1.pdf"
  Assets:Cash
2024-01-06 open Assets:Bank USD
  active: TRUE
"#;

    #[test]
    fn entries() {
        let file = BeancountFile::parse(LEDGER).unwrap();
        assert_eq!(6, file.entries.len());
        assert!(matches!(file.entries[0], Entry::Comment(_)));
        assert!(matches!(file.entries[3], Entry::Blank));

        let directives: Vec<_> = file.directives().collect();
        assert_eq!(4, directives.len());
        assert_eq!(Some("option"), directives[0].directive_type());
        let txn = directives[2];
        assert!(txn.is_transaction());
        assert_eq!(Some("2024-01-05"), txn.date());
        assert_eq!(
            vec![1, 1, 1, 2, 1],
            txn.children.iter().map(|child| child.depth).collect::<Vec<_>>()
        );
        assert_eq!(Some("chase.csv:2".to_string()), txn.metadata("import-id"));
        assert_eq!(None, txn.metadata("receipt"));
        assert_eq!(Some("open"), directives[3].directive_type());
        assert!(!directives[3].is_transaction());
    }

    #[test]
    fn metadata_of_non_transaction() {
        let file = BeancountFile::parse(LEDGER).unwrap();
        let open = file.directives().last().unwrap();
        assert_eq!(Some("TRUE".to_string()), open.metadata("active"));
    }

    #[test]
    fn column_zero_comment_inside_transaction() {
        let file = BeancountFile::parse(concat!(
            "2024-01-05 * \"Coffee\"\n",
            "  Expenses:Food  4.50 USD\n",
            "; split with the card\n",
            "  Assets:Cash\n",
            "; after the transaction\n",
            "2024-01-06 open Assets:Bank\n",
        ))
        .unwrap();
        assert_eq!(3, file.entries.len());
        let txn = file.directives().next().unwrap();
        assert_eq!(
            vec![1, 0, 1],
            txn.children.iter().map(|child| child.depth).collect::<Vec<_>>()
        );
        assert!(matches!(file.entries[1], Entry::Comment(_)));
    }

    #[test]
    fn orphan_lines() {
        let file = BeancountFile::parse("\n  Assets:Cash 1 USD\n").unwrap();
        assert!(matches!(file.entries[1], Entry::Orphan(_)));
    }

    #[test]
    fn includes() {
        let file = BeancountFile::parse(LEDGER).unwrap();
        assert_eq!(
            vec!["books/*.bean".to_string()],
            file.includes().collect::<Vec<_>>()
        );
    }

    #[test]
    fn quote_and_unquote() {
        let quoted = quote(r#"say "hi" \o/"#);
        assert_eq!(r#""say \"hi\" \\o/""#, quoted);
        assert_eq!(
            r#"say "hi" \o/"#,
            token_text(&Token::new(TokenKind::String, quoted))
        );
    }
}

use super::lexer::{Token, TokenKind};
use super::parser::{BeancountFile, Child, Entry};

const INDENT: &str = "  ";
const MIN_AMOUNT_GAP: usize = 2;

/// Renders a parsed file in canonical form.
///
/// Posting amounts are aligned in one column for the whole file, so
/// formatting the output again yields the same text.
pub fn format_file(file: &BeancountFile) -> String {
    let columns = AmountColumns::measure(file);
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;
    for entry in &file.entries {
        match entry {
            Entry::Blank => {
                if !previous_blank {
                    lines.push(String::new());
                }
                previous_blank = true;
                continue;
            }
            Entry::Comment(token) => lines.push(token.value.clone()),
            Entry::Directive(directive) => {
                lines.push(join_tokens(&directive.header));
                lines.extend(
                    directive
                        .children
                        .iter()
                        .map(|child| columns.render_child(child)),
                );
            }
            Entry::Orphan(tokens) => lines.push(format!("{INDENT}{}", join_tokens(tokens))),
        }
        previous_blank = false;
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    let mut output = lines.join("\n");
    output.push('\n');
    output
}

/// Single spaces, except inside cost braces and before commas
fn join_tokens<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> String {
    let mut line = String::new();
    let mut previous: Option<&Token> = None;
    for token in tokens {
        if let Some(previous) = previous {
            let opens = previous.kind == TokenKind::Punct
                && matches!(previous.value.as_str(), "{" | "{{");
            let closes = token.kind == TokenKind::Punct
                && matches!(token.value.as_str(), "}" | "}}" | ",");
            if !opens && !closes {
                line.push(' ');
            }
        }
        line.push_str(&token.value);
        previous = Some(token);
    }
    line
}

/// A posting line split into the account part, the number and the rest
struct Posting<'a> {
    account: String,
    number: &'a str,
    rest: &'a [Token],
}

impl<'a> Posting<'a> {
    fn split(tokens: &'a [Token]) -> Option<Self> {
        let (account, remaining) = match tokens {
            [flag, account, remaining @ ..]
                if flag.kind == TokenKind::Flag && account.kind == TokenKind::Account =>
            {
                (format!("{} {}", flag.value, account.value), remaining)
            }
            [account, remaining @ ..] if account.kind == TokenKind::Account => {
                (account.value.clone(), remaining)
            }
            _ => return None,
        };
        match remaining {
            [number, rest @ ..] if number.kind == TokenKind::Number => Some(Self {
                account,
                number: number.value.as_str(),
                rest,
            }),
            _ => None,
        }
    }
}

#[derive(Default)]
struct AmountColumns {
    account_width: usize,
    number_width: usize,
}

impl AmountColumns {
    fn measure(file: &BeancountFile) -> Self {
        let mut columns = Self::default();
        let postings = file
            .directives()
            .flat_map(|directive| directive.children.iter())
            .filter(|child| child.depth == 1)
            .filter_map(|child| Posting::split(&child.tokens));
        for posting in postings {
            columns.account_width = columns.account_width.max(posting.account.chars().count());
            columns.number_width = columns.number_width.max(posting.number.chars().count());
        }
        columns
    }

    fn render_child(&self, child: &Child) -> String {
        let indent = INDENT.repeat(child.depth);
        let posting = (child.depth == 1)
            .then(|| Posting::split(&child.tokens))
            .flatten();
        let Some(posting) = posting else {
            return format!("{indent}{}", join_tokens(&child.tokens));
        };
        let mut line = format!(
            "{indent}{account:<account_width$}{gap}{number:>number_width$}",
            account = posting.account,
            account_width = self.account_width,
            gap = " ".repeat(MIN_AMOUNT_GAP),
            number = posting.number,
            number_width = self.number_width,
        );
        if !posting.rest.is_empty() {
            line.push(' ');
            line.push_str(&join_tokens(posting.rest));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(text: &str) -> String {
        format_file(&BeancountFile::parse(text).unwrap())
    }

    #[test]
    fn canonical_layout() {
        let input = concat!(
            "\n\n",
            "option   \"title\"    \"Books\"\n",
            "\n\n\n",
            "2024-01-05   *  \"Coffee\"   ; morning\n",
            "    import-id:   \"chase.csv:2\"\n",
            "    Expenses:Food     4.50   USD\n",
            "        note: \"latte\"\n",
            "    ! Assets:Bank:Checking   -4.50 USD @ 1 USD\n",
            "    Assets:Cash\n",
            "2024-01-06 balance Assets:Cash    0 USD\n",
            "\n\n",
        );
        let expected = concat!(
            "option \"title\" \"Books\"\n",
            "\n",
            "2024-01-05 * \"Coffee\" ; morning\n",
            "  import-id: \"chase.csv:2\"\n",
            "  Expenses:Food            4.50 USD\n",
            "    note: \"latte\"\n",
            "  ! Assets:Bank:Checking  -4.50 USD @ 1 USD\n",
            "  Assets:Cash\n",
            "2024-01-06 balance Assets:Cash 0 USD\n",
        );
        assert_eq!(expected, format(input));
    }

    #[test]
    fn idempotent() {
        let input = concat!(
            "; comment\n",
            "2024-01-01 open Assets:Cash\n",
            "\n",
            "2024-02-01 txn \"multi\nline\"\n",
            "  Assets:Cash    10.00/3 EUR {1.1 USD, 2024-01-01}\n",
            "  Expenses:Misc  -3.3333 EUR\n",
            "  Equity:Rounding\n",
            "  ; trailing comment\n",
        );
        let once = format(input);
        assert!(once.contains("{1.1 USD, 2024-01-01}"));
        assert_eq!(once, format(&once));
    }

    #[test]
    fn column_zero_comment_keeps_postings_aligned() {
        let input = concat!(
            "2024-01-05 * \"Coffee\"\n",
            "    Expenses:Food   4.50 USD\n",
            "; paid by card\n",
            "    Assets:Bank:Checking  -4.50 USD\n",
        );
        let expected = concat!(
            "2024-01-05 * \"Coffee\"\n",
            "  Expenses:Food          4.50 USD\n",
            "; paid by card\n",
            "  Assets:Bank:Checking  -4.50 USD\n",
        );
        assert_eq!(expected, format(input));
    }

    #[test]
    fn time_like_values_stay_intact() {
        let input = "2024-01-01 custom \"alarm\" 10:30\n";
        assert_eq!(input, format(input));
    }

    #[test]
    fn empty_file() {
        assert_eq!("", format(""));
        assert_eq!("", format("\n\n  \n"));
    }

    #[test]
    fn single_trailing_newline() {
        assert_eq!("include \"a.bean\"\n", format("include \"a.bean\""));
    }
}

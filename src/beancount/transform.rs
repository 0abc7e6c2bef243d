use super::lexer::{Token, TokenKind};
use super::parser::BeancountFile;

/// Rewrites single tokens; `None` keeps the token as it is
pub trait TokenTransform {
    fn transform(&self, token: &Token) -> Option<Token>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameAccount {
    pub from: String,
    pub to: String,
}

impl TokenTransform for RenameAccount {
    fn transform(&self, token: &Token) -> Option<Token> {
        token
            .is(TokenKind::Account, &self.from)
            .then(|| Token::new(TokenKind::Account, self.to.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCurrency {
    pub from: String,
    pub to: String,
}

impl TokenTransform for RenameCurrency {
    fn transform(&self, token: &Token) -> Option<Token> {
        token
            .is(TokenKind::Currency, &self.from)
            .then(|| Token::new(TokenKind::Currency, self.to.clone()))
    }
}

/// Runs every transform over every token, in order. Returns the number of replaced tokens.
pub fn apply_transforms(file: &mut BeancountFile, transforms: &[Box<dyn TokenTransform>]) -> usize {
    let mut replaced = 0;
    for token in file.tokens_mut() {
        for transform in transforms {
            if let Some(new_token) = transform.transform(token) {
                *token = new_token;
                replaced += 1;
            }
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beancount::format_file;

    fn transforms() -> Vec<Box<dyn TokenTransform>> {
        vec![
            Box::new(RenameAccount {
                from: "Assets:Cash".to_string(),
                to: "Assets:Wallet".to_string(),
            }),
            Box::new(RenameCurrency {
                from: "USD".to_string(),
                to: "EUR".to_string(),
            }),
        ]
    }

    #[test]
    fn renames_exact_matches_only() {
        let mut file = BeancountFile::parse(concat!(
            "2024-01-01 open Assets:Cash USD\n",
            "2024-01-01 open Assets:Cash:Coins USDC\n",
            "2024-01-05 * \"Assets:Cash USD\"\n",
            "  Expenses:Food  4.50 USD ; Assets:Cash\n",
            "  Assets:Cash\n",
        ))
        .unwrap();
        assert_eq!(4, apply_transforms(&mut file, &transforms()));
        assert_eq!(
            concat!(
                "2024-01-01 open Assets:Wallet EUR\n",
                "2024-01-01 open Assets:Cash:Coins USDC\n",
                "2024-01-05 * \"Assets:Cash USD\"\n",
                "  Expenses:Food  4.50 EUR ; Assets:Cash\n",
                "  Assets:Wallet\n",
            ),
            format_file(&file)
        );
    }

    #[test]
    fn chained_transforms() {
        let mut file = BeancountFile::parse("2024-01-01 open Assets:A\n").unwrap();
        let transforms: Vec<Box<dyn TokenTransform>> = vec![
            Box::new(RenameAccount {
                from: "Assets:A".to_string(),
                to: "Assets:B".to_string(),
            }),
            Box::new(RenameAccount {
                from: "Assets:B".to_string(),
                to: "Assets:C".to_string(),
            }),
        ];
        apply_transforms(&mut file, &transforms);
        assert_eq!("2024-01-01 open Assets:C\n", format_file(&file));
    }
}

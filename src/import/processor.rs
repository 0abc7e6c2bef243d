use std::{collections::HashSet, path::Path, str::FromStr};

use anyhow::{anyhow, bail, Context as _, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::config::{
    Action, CompiledMatch, ImportDoc, ImportRule, InputConfig, PostingTemplate, TxnTemplate,
};
use super::extract::{extract_csv, ExtractedRow};
use crate::glob::find_files;
use crate::template::{render, Variables};

const DEFAULT_ID: &str = "{{ file }}:{{ lineno }}";
const DEFAULT_DATE: &str = "{{ date }}";
const DEFAULT_FLAG: &str = "*";
const DEFAULT_NARRATION: &str = "{{ desc | default(\"\") }}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    pub number: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPosting {
    pub account: String,
    pub amount: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTransaction {
    pub id: String,
    pub sources: Vec<String>,
    pub date: NaiveDate,
    pub flag: String,
    pub payee: Option<String>,
    pub narration: String,
    /// Target bean file relative to the workdir
    pub file: String,
    pub postings: Vec<GeneratedPosting>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprocessedRow {
    pub file: String,
    pub lineno: usize,
}

#[derive(Debug, Default)]
pub struct ProcessResult {
    pub generated: Vec<GeneratedTransaction>,
    pub ignored: usize,
    pub unprocessed: Vec<UnprocessedRow>,
}

struct CompiledRule<'a> {
    rule: &'a ImportRule,
    matchers: Vec<(&'a str, CompiledMatch)>,
}

impl CompiledRule<'_> {
    fn matches(&self, variables: &Variables) -> bool {
        self.matchers.iter().all(|(field, matcher)| {
            variables
                .get(*field)
                .is_some_and(|value| matcher.is_match(value))
        })
    }
}

/// Runs every input file through the import rules. The first matching rule wins.
pub fn process_imports(doc: &ImportDoc, workdir: &Path) -> Result<ProcessResult> {
    let rules = doc
        .imports
        .iter()
        .map(|rule| {
            let matchers = rule
                .match_rule
                .iter()
                .map(|(field, str_match)| Ok((field.as_str(), str_match.compile()?)))
                .collect::<Result<_>>()?;
            Ok(CompiledRule { rule, matchers })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut result = ProcessResult::default();
    let mut seen_files = HashSet::new();
    for input in &doc.inputs {
        for path in find_files(workdir, &input.match_pattern)? {
            if !seen_files.insert(path.clone()) {
                continue;
            }
            log::info!("Processing file {}", path.display());
            for row in extract_csv(workdir, &path)? {
                process_row(&rules, input, &row, &mut result)?;
            }
        }
    }
    Ok(result)
}

fn process_row(
    rules: &[CompiledRule],
    input: &InputConfig,
    row: &ExtractedRow,
    result: &mut ProcessResult,
) -> Result<()> {
    let Some(rule) = rules.iter().find(|rule| rule.matches(&row.variables)) else {
        log::debug!("No rule matches {}:{}", row.file, row.lineno);
        result.unprocessed.push(UnprocessedRow {
            file: row.file.clone(),
            lineno: row.lineno,
        });
        return Ok(());
    };
    log::debug!(
        "Row {}:{} matches rule {}",
        row.file,
        row.lineno,
        rule.rule.name.as_deref().unwrap_or("<unnamed>")
    );
    for action in &rule.rule.actions {
        match action {
            Action::AddTxn { file, txn } => {
                let file = file
                    .as_deref()
                    .or(input.config.default_file.as_deref())
                    .ok_or_else(|| {
                        anyhow!(
                            "No target file for {}:{}, set file on the action or default_file on the input",
                            row.file,
                            row.lineno
                        )
                    })?;
                let generated = render_txn(txn, file, input, row).with_context(|| {
                    format!(
                        "Failed to generate transaction for {}:{}",
                        row.file, row.lineno
                    )
                })?;
                result.generated.push(generated);
            }
            Action::Ignore => result.ignored += 1,
        }
    }
    Ok(())
}

fn render_txn(
    txn: &TxnTemplate,
    file: &str,
    input: &InputConfig,
    row: &ExtractedRow,
) -> Result<GeneratedTransaction> {
    let variables = &row.variables;
    let template = |value: &Option<String>, default: &str| {
        render(value.as_deref().unwrap_or(default), variables)
    };
    let date = template(&txn.date, DEFAULT_DATE)?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date {date:?}"))?;
    let postings = input
        .config
        .prepend_postings
        .iter()
        .chain(&txn.postings)
        .chain(&input.config.append_postings)
        .map(|posting| render_posting(posting, variables))
        .collect::<Result<_>>()?;
    Ok(GeneratedTransaction {
        id: template(&txn.id, DEFAULT_ID)?,
        sources: vec![row.file.clone()],
        date,
        flag: template(&txn.flag, DEFAULT_FLAG)?,
        payee: txn
            .payee
            .as_deref()
            .map(|payee| render(payee, variables))
            .transpose()?,
        narration: template(&txn.narration, DEFAULT_NARRATION)?,
        file: render(file, variables)?,
        postings,
    })
}

fn render_posting(posting: &PostingTemplate, variables: &Variables) -> Result<GeneratedPosting> {
    let amount = match &posting.amount {
        Some(amount) => Some(Amount {
            number: parse_number(&render(&amount.number, variables)?)?,
            currency: render(&amount.currency, variables)?,
        }),
        None => None,
    };
    Ok(GeneratedPosting {
        account: render(&posting.account, variables)?,
        amount,
    })
}

/// Accepts thousand separators and the double minus a `-{{ amount }}`
/// template produces for negative amounts
pub fn parse_number(text: &str) -> Result<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let digits = cleaned.strip_prefix("--").unwrap_or(&cleaned);
    if digits.is_empty() {
        bail!("Empty number {text:?}");
    }
    Decimal::from_str(digits).map_err(|err| anyhow!("Invalid number {text:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const DOC: &str = r#"
inputs:
  - match: "import-data/*.csv"
    config:
      default_file: "books/import.bean"
      prepend_postings:
        - account: Assets:Bank
          amount:
            number: "{{ amount }}"
            currency: USD
imports:
  - name: Coffee
    match:
      description: "Coffee"
    actions:
      - type: add_txn
        txn:
          payee: "{{ description }}"
          narration: "Coffee"
          postings:
            - account: Expenses:Food:Coffee
              amount:
                number: "-{{ amount }}"
                currency: USD
  - name: Payroll
    match:
      description:
        equals: Payroll
    actions:
      - type: ignore
  - name: Rent
    match:
      description: Rent
    actions:
      - type: add_txn
        file: "books/rent.bean"
        txn:
          id: "rent-{{ date }}"
          flag: "!"
          postings:
            - account: Expenses:Rent
"#;

    fn workdir() -> tempfile::TempDir {
        let tempdir = tempfile::tempdir().unwrap();
        let dir = tempdir.path().join("import-data");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("bank.csv"),
            concat!(
                "Date,Description,Amount\n",
                "2024-01-05,Coffee Shop,-4.50\n",
                "2024-01-06,Payroll,1000\n",
                "2024-01-07,Groceries,-20\n",
                "2024-02-01,Rent,\"-1,200.00\"\n",
            ),
        )
        .unwrap();
        tempdir
    }

    #[test]
    fn process() {
        let workdir = workdir();
        let doc: ImportDoc = serde_yaml::from_str(DOC).unwrap();
        let result = process_imports(&doc, workdir.path()).unwrap();

        assert_eq!(1, result.ignored);
        assert_eq!(
            vec![UnprocessedRow {
                file: "import-data/bank.csv".to_string(),
                lineno: 3
            }],
            result.unprocessed
        );
        assert_eq!(2, result.generated.len());

        let coffee = &result.generated[0];
        assert_eq!("import-data/bank.csv:1", coffee.id);
        assert_eq!(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(), coffee.date);
        assert_eq!("*", coffee.flag);
        assert_eq!(Some("Coffee Shop".to_string()), coffee.payee);
        assert_eq!("books/import.bean", coffee.file);
        assert_eq!(
            vec![
                GeneratedPosting {
                    account: "Assets:Bank".to_string(),
                    amount: Some(Amount {
                        number: Decimal::new(-450, 2),
                        currency: "USD".to_string()
                    })
                },
                GeneratedPosting {
                    account: "Expenses:Food:Coffee".to_string(),
                    amount: Some(Amount {
                        number: Decimal::new(450, 2),
                        currency: "USD".to_string()
                    })
                },
            ],
            coffee.postings
        );

        let rent = &result.generated[1];
        assert_eq!("rent-2024-02-01", rent.id);
        assert_eq!("!", rent.flag);
        assert_eq!("", rent.narration);
        assert_eq!("books/rent.bean", rent.file);
        assert_eq!(
            Some(Decimal::new(-120000, 2)),
            rent.postings[0].amount.as_ref().map(|amount| amount.number)
        );
    }

    #[test]
    fn missing_target_file() {
        let workdir = workdir();
        let mut doc: ImportDoc = serde_yaml::from_str(DOC).unwrap();
        doc.inputs[0].config.default_file = None;
        let err = process_imports(&doc, workdir.path()).unwrap_err();
        assert!(err.to_string().starts_with("No target file for import-data/bank.csv:1"));
    }

    #[rstest]
    #[case("4.50", Decimal::new(450, 2))]
    #[case("-4.50", Decimal::new(-450, 2))]
    #[case("--4.50", Decimal::new(450, 2))]
    #[case("1,200", Decimal::new(1200, 0))]
    #[case(" 7 ", Decimal::new(7, 0))]
    fn numbers(#[case] text: &str, #[case] expected: Decimal) {
        assert_eq!(expected, parse_number(text).unwrap());
    }

    #[test]
    fn invalid_number() {
        assert!(parse_number("abc").is_err());
        assert!(parse_number("").is_err());
    }
}

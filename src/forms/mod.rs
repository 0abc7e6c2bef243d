//! `bh form`: validate form documents and serve them as a local web app

use std::{net::IpAddr, path::Path};

use anyhow::{bail, Result};
use console::style;

mod html;
mod processor;
mod schema;
mod server;

pub use processor::{apply_updates, process_form, FileUpdate};
pub use schema::{format_loc, parse_form_doc, FormDoc, ValidationError, FORM_DOC_PATH};

use crate::terminal::{
    table::{add_row, make_table, print_table},
    BulletPointPrinter, LineWriter,
};

pub fn main_validate(workdir: &Path) -> Result<()> {
    validate(workdir, &BulletPointPrinter::new_stdout())?;
    Ok(())
}

pub fn main_list(workdir: &Path) -> Result<()> {
    let doc = validate(workdir, &BulletPointPrinter::new_stdout())?;
    let mut table = make_table(["Name", "Display name", "Fields", "Operations"]);
    for form in &doc.forms {
        add_row(
            &mut table,
            [
                form.name.clone(),
                form.display_name.clone().unwrap_or_default(),
                form.fields.len().to_string(),
                form.operations.len().to_string(),
            ],
        );
    }
    print_table("Forms", &table);
    Ok(())
}

pub async fn main_server(host: IpAddr, port: u16, workdir: &Path) -> Result<()> {
    let beancount_dir = std::path::absolute(workdir)?;
    server::serve(host, port, beancount_dir).await
}

fn validate<W: LineWriter + Clone>(workdir: &Path, printer: &BulletPointPrinter<W>) -> Result<FormDoc> {
    match schema::validate_doc(&workdir.join(FORM_DOC_PATH))? {
        Ok(doc) => {
            log::info!(
                "Form document is valid, {} forms defined",
                style(doc.forms.len()).green()
            );
            Ok(doc)
        }
        Err(errors) => {
            for error in &errors {
                let loc = format_loc(&error.loc);
                printer.print_item(if loc.is_empty() { "document".to_string() } else { loc });
                printer.indent().print_item(&error.msg);
            }
            bail!("Invalid form document with errors")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::testutils::RecordingLineWriter;

    fn write_doc(workdir: &Path, content: &str) {
        let path = workdir.join(FORM_DOC_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn valid_doc() {
        let tempdir = tempfile::tempdir().unwrap();
        write_doc(tempdir.path(), "forms: []\n");
        main_validate(tempdir.path()).unwrap();
        main_list(tempdir.path()).unwrap();
    }

    #[test]
    fn invalid_doc() {
        let tempdir = tempfile::tempdir().unwrap();
        write_doc(tempdir.path(), "{}");
        let writer = RecordingLineWriter::default();
        let err = validate(tempdir.path(), &BulletPointPrinter::new(writer.clone())).unwrap_err();
        assert_eq!("Invalid form document with errors", err.to_string());
        assert_eq!(
            vec!["• forms".to_string(), "  • Field required".to_string()],
            *writer.lines.borrow()
        );
    }

    #[test]
    fn missing_doc() {
        let tempdir = tempfile::tempdir().unwrap();
        let err = main_validate(tempdir.path()).unwrap_err();
        assert!(err.to_string().ends_with("does not exist"));
    }
}

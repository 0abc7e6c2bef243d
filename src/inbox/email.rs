use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _, Result};
use mailparse::{MailAddr, MailHeaderMap as _, ParsedMail};

/// An archived `.eml` file, named after the email id
#[derive(Debug, Clone)]
pub struct EmailFile {
    pub id: String,
    pub filepath: PathBuf,
    pub subject: String,
    pub from_addresses: Vec<String>,
    pub body: String,
}

impl EmailFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &[u8]) -> Result<Self> {
        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("Cannot derive email id from {}", path.display()))?
            .to_string();
        let mail = mailparse::parse_mail(content)
            .with_context(|| format!("Failed to parse email {}", path.display()))?;
        let subject = mail.headers.get_first_value("Subject").unwrap_or_default();
        let from_addresses = match mail.headers.get_first_header("From") {
            Some(header) => addresses(&mailparse::addrparse_header(header)?),
            None => Vec::new(),
        };
        let body = text_body(&mail)?.unwrap_or_default();
        Ok(Self {
            id,
            filepath: path.to_path_buf(),
            subject,
            from_addresses,
            body,
        })
    }
}

fn addresses(list: &[MailAddr]) -> Vec<String> {
    list.iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(single) => vec![single.addr.clone()],
            MailAddr::Group(group) => group.addrs.iter().map(|single| single.addr.clone()).collect(),
        })
        .collect()
}

/// The first `text/plain` part, or the first `text/html` part if there is no plain one
fn text_body(mail: &ParsedMail) -> Result<Option<String>> {
    if mail.subparts.is_empty() {
        return Ok(Some(mail.get_body()?));
    }
    for mimetype in ["text/plain", "text/html"] {
        if let Some(part) = find_part(mail, mimetype) {
            return Ok(Some(part.get_body()?));
        }
    }
    Ok(None)
}

fn find_part<'a>(mail: &'a ParsedMail<'a>, mimetype: &str) -> Option<&'a ParsedMail<'a>> {
    if mail.subparts.is_empty() {
        return (mail.ctype.mimetype == mimetype).then_some(mail);
    }
    mail.subparts
        .iter()
        .find_map(|part| find_part(part, mimetype))
}

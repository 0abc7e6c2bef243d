//! Beancount ledger files as a lossless token tree.
//!
//! Only the syntax is modelled. There is no booking or balance checking.

mod formatter;
mod lexer;
mod parser;
mod transform;
mod traverse;

pub use formatter::format_file;
pub use lexer::{Token, TokenKind};
pub use parser::{quote, token_text, BeancountFile, Child, Directive, Entry};
pub use transform::{apply_transforms, RenameAccount, RenameCurrency, TokenTransform};
pub use traverse::{traverse, LoadedFile};

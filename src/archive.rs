use std::{
    collections::HashMap,
    io::{Read, Seek, SeekFrom},
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context as _, Result};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::paths::{is_within, normalize_path};

/// Extract a gzip compressed tar file into `workdir`.
///
/// Members are checked before anything is written: absolute paths lose their
/// leading root, while `..` components, links pointing outside of `workdir` and
/// device or fifo members fail the whole extraction. The checks always run,
/// `unsafe_requested` only logs that the request is ignored.
pub fn extract_tar<R: Read + Seek>(
    input: &mut R,
    workdir: &Path,
    unsafe_requested: bool,
) -> Result<()> {
    if unsafe_requested {
        log::warn!("Safe tar extraction is available, ignoring the unsafe tar extract option");
    }

    let start = input.stream_position()?;
    check_members(Archive::new(GzDecoder::new(&mut *input)))?;
    input.seek(SeekFrom::Start(start))?;

    let mut archive = Archive::new(GzDecoder::new(input));
    archive.set_preserve_permissions(false);
    archive
        .unpack(workdir)
        .context("Failed to extract tar file")?;
    Ok(())
}

fn check_members<R: Read>(mut archive: Archive<R>) -> Result<()> {
    for entry in archive.entries()? {
        let entry = entry?;
        let path = entry.path()?.into_owned();
        let member_path = strip_root(&path);
        if member_path
            .components()
            .any(|component| component == Component::ParentDir)
        {
            bail!("Refusing to extract member {} outside of the destination", path.display());
        }
        match entry.header().entry_type() {
            EntryType::Symlink | EntryType::Link => {
                let Some(link_name) = entry.link_name()? else {
                    bail!("Link member {} has no target", path.display());
                };
                let target = if entry.header().entry_type() == EntryType::Symlink {
                    member_path
                        .parent()
                        .unwrap_or(Path::new(""))
                        .join(&link_name)
                } else {
                    link_name.to_path_buf()
                };
                if link_name.has_root() || !is_within(Path::new(""), &target) {
                    bail!(
                        "Refusing to extract link {} pointing to {} outside of the destination",
                        path.display(),
                        link_name.display()
                    );
                }
            }
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                bail!("Refusing to extract special file member {}", path.display());
            }
            _ => {}
        }
    }
    Ok(())
}

fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::RootDir | Component::Prefix(_)))
        .collect()
}

/// Extract emails from an inbox dump. Each member is routed by its file stem (the email id)
/// to the path in `email_output_paths`, relative to `workdir`.
pub fn extract_inbox_tar<R: Read>(
    input: R,
    email_output_paths: &HashMap<String, PathBuf>,
    workdir: &Path,
) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(input));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member_path = entry.path()?.into_owned();
        let Some(email_id) = member_path.file_stem().and_then(|stem| stem.to_str()) else {
            bail!("Unexpected member {} in inbox dump", member_path.display());
        };
        let Some(output_path) = email_output_paths.get(email_id) else {
            bail!("Cannot find output path for email {email_id}");
        };
        let full_output_path = normalize_path(&workdir.join(output_path));
        if !is_within(workdir, &full_output_path) {
            bail!(
                "The email output path {} is not a sub-path of workdir {}",
                output_path.display(),
                workdir.display()
            );
        }
        if let Some(parent) = full_output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!(
            "Writing email {} to {}",
            console::style(email_id).green(),
            console::style(output_path.display()).green()
        );
        entry.set_preserve_permissions(false);
        entry.set_preserve_mtime(false);
        entry.set_unpack_xattrs(false);
        entry
            .unpack(&full_output_path)
            .with_context(|| format!("Failed to write email {email_id}"))?;
    }
    Ok(())
}

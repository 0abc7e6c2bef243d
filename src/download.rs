use std::io::{Seek, SeekFrom};

use anyhow::{Context as _, Result};
use tempfile::{spooled_tempfile, SpooledTempFile};

use crate::api::Downloader;
use crate::crypto::{decrypt_file, EncryptionKey};

/// Downloads and decrypted data stay in memory up to this size, then spill to disk
pub const SPOOLED_FILE_MAX_SIZE: usize = 5 * 1024 * 1024;

/// Download the ciphertext at `url` and decrypt it. The returned file is rewound to the start.
pub async fn download_and_decrypt(
    downloader: &impl Downloader,
    url: &str,
    key: &EncryptionKey,
) -> Result<SpooledTempFile> {
    let mut encrypted_file = spooled_tempfile(SPOOLED_FILE_MAX_SIZE);
    downloader.download(url, &mut encrypted_file).await?;
    encrypted_file.seek(SeekFrom::Start(0))?;

    log::info!("Decrypting downloaded file ...");
    let mut decrypted_file = spooled_tempfile(SPOOLED_FILE_MAX_SIZE);
    decrypt_file(&mut encrypted_file, &mut decrypted_file, key)
        .context("Failed to decrypt downloaded file")?;
    decrypted_file.seek(SeekFrom::Start(0))?;
    Ok(decrypted_file)
}

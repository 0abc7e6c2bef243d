use std::{
    fmt::{Debug, Formatter},
    io::{Read, Write},
};

use aes::Aes256;
use anyhow::{anyhow, bail, Context as _, Result};
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use cbc::cipher::{generic_array::GenericArray, BlockDecryptMut, KeyIvInit};
use crypto_box::{aead::OsRng, SecretKey};
use serde::Deserialize;

pub const CHUNK_SIZE: usize = 4096;
const BLOCK_SIZE: usize = 16;

/// URL-safe base64, padded on encode, accepting both padded and unpadded input
pub const URL_SAFE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Symmetric key and IV for a single dump, delivered inside a sealed box
#[derive(Clone)]
pub struct EncryptionKey {
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl EncryptionKey {
    pub fn new(key: Vec<u8>, iv: Vec<u8>) -> Self {
        Self { key, iv }
    }
}

impl Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey(*****)")
    }
}

#[derive(Deserialize)]
struct EncodedEncryptionKey {
    key: String,
    iv: String,
}

/// Ephemeral keypair, generated per command invocation and never persisted
pub struct DumpKeyPair {
    secret_key: SecretKey,
}

impl DumpKeyPair {
    pub fn generate() -> Self {
        Self {
            secret_key: SecretKey::generate(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> String {
        URL_SAFE_BASE64.encode(self.secret_key.public_key().as_bytes())
    }

    pub fn open_encryption_key(&self, sealed: &str) -> Result<EncryptionKey> {
        let sealed = URL_SAFE_BASE64
            .decode(sealed.trim())
            .context("Encryption key is not valid base64")?;
        let payload = self
            .secret_key
            .unseal(&sealed)
            .map_err(|_| anyhow!("Failed to open sealed encryption key"))?;
        let encoded: EncodedEncryptionKey =
            serde_json::from_slice(&payload).context("Malformed encryption key payload")?;
        Ok(EncryptionKey {
            key: URL_SAFE_BASE64.decode(encoded.key)?,
            iv: URL_SAFE_BASE64.decode(encoded.iv)?,
        })
    }
}

/// First stage: AES-256-CBC block decryption over arbitrary sized input chunks.
/// Bytes not filling a whole block are kept until the next update.
pub struct CbcDecryptStream {
    decryptor: cbc::Decryptor<Aes256>,
    pending: Vec<u8>,
}

impl CbcDecryptStream {
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(&key.key, &key.iv).map_err(
            |_| {
                anyhow!(
                    "Invalid encryption key, expected a 32 bytes key and a 16 bytes iv but got {} and {}",
                    key.key.len(),
                    key.iv.len()
                )
            },
        )?;
        Ok(Self {
            decryptor,
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(input);
        let full_blocks_len = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        let mut blocks: Vec<u8> = self.pending.drain(..full_blocks_len).collect();
        for block in blocks.chunks_exact_mut(BLOCK_SIZE) {
            self.decryptor
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        blocks
    }

    pub fn finalize(self) -> Result<()> {
        if !self.pending.is_empty() {
            bail!("Ciphertext length is not a multiple of the block size");
        }
        Ok(())
    }
}

/// Second stage: streaming PKCS#7 unpadding. The last block is held back
/// until [Pkcs7Unpadder::finalize] because only then it is known to carry the padding.
#[derive(Default)]
pub struct Pkcs7Unpadder {
    held: Vec<u8>,
}

impl Pkcs7Unpadder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        self.held.extend_from_slice(input);
        if self.held.len() <= BLOCK_SIZE {
            return Vec::new();
        }
        let release = self.held.len() - BLOCK_SIZE;
        self.held.drain(..release).collect()
    }

    pub fn finalize(mut self) -> Result<Vec<u8>> {
        if self.held.len() != BLOCK_SIZE {
            bail!("Invalid padding, expected a final block");
        }
        let pad_len = self.held[BLOCK_SIZE - 1] as usize;
        if pad_len == 0 || pad_len > BLOCK_SIZE {
            bail!("Invalid padding length {pad_len}");
        }
        if !self.held[BLOCK_SIZE - pad_len..]
            .iter()
            .all(|byte| *byte as usize == pad_len)
        {
            bail!("Invalid padding bytes");
        }
        self.held.truncate(BLOCK_SIZE - pad_len);
        Ok(self.held)
    }
}

/// Decrypt `input` into `output` chunk by chunk, returns the number of plaintext bytes written
pub fn decrypt_file(
    input: &mut impl Read,
    output: &mut impl Write,
    key: &EncryptionKey,
) -> Result<u64> {
    let mut decrypt_stream = CbcDecryptStream::new(key)?;
    let mut unpadder = Pkcs7Unpadder::new();
    let mut written = 0u64;
    let mut buffer = vec![0; CHUNK_SIZE];
    loop {
        let read = input.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let decrypted = decrypt_stream.update(&buffer[..read]);
        let plaintext = unpadder.update(&decrypted);
        output.write_all(&plaintext)?;
        written += plaintext.len() as u64;
    }
    decrypt_stream.finalize()?;
    let plaintext = unpadder.finalize()?;
    output.write_all(&plaintext)?;
    output.flush()?;
    written += plaintext.len() as u64;
    Ok(written)
}


#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, RngCore, SeedableRng};
    use rstest::rstest;

    use super::testutils::{encrypt, key, seal_encryption_key};
    use super::*;

    fn data(len: usize) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(len as u64);
        let mut data = vec![0; len];
        rng.fill_bytes(&mut data);
        data
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(15)]
    #[case(16)]
    #[case(17)]
    #[case(4095)]
    #[case(4096)]
    #[case(4097)]
    #[case(3 * 4096 + 5)]
    #[case(10 * 4096)]
    fn given_somedata_when_encrypted_then_canbedecrypted(#[case] len: usize) {
        let plaintext = data(len);
        let ciphertext = encrypt(&plaintext, &key(1));

        let mut output = Vec::new();
        let written = decrypt_file(&mut ciphertext.as_slice(), &mut output, &key(1)).unwrap();
        assert_eq!(plaintext, output);
        assert_eq!(len as u64, written);
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(16)]
    #[case(33)]
    fn given_oddchunks_when_streamed_then_sameresult(#[case] piece_len: usize) {
        let plaintext = data(100);
        let ciphertext = encrypt(&plaintext, &key(1));

        let mut decrypt_stream = CbcDecryptStream::new(&key(1)).unwrap();
        let mut unpadder = Pkcs7Unpadder::new();
        let mut output = Vec::new();
        for piece in ciphertext.chunks(piece_len) {
            let decrypted = decrypt_stream.update(piece);
            assert_eq!(0, decrypted.len() % BLOCK_SIZE);
            output.extend(unpadder.update(&decrypted));
        }
        decrypt_stream.finalize().unwrap();
        output.extend(unpadder.finalize().unwrap());
        assert_eq!(plaintext, output);
    }

    #[test]
    fn given_emptyciphertext_then_doesntdecrypt() {
        let mut output = Vec::new();
        let result = decrypt_file(&mut &b""[..], &mut output, &key(1));
        assert!(result.is_err());
    }

    #[test]
    fn given_truncatedciphertext_then_doesntdecrypt() {
        let ciphertext = encrypt(&data(50), &key(1));
        let ciphertext = &ciphertext[..ciphertext.len() - 1];
        let mut output = Vec::new();
        let result = decrypt_file(&mut &ciphertext[..], &mut output, &key(1));
        assert!(result.is_err());
    }

    #[rstest]
    #[case([0u8; 16])]
    #[case([17u8; 16])]
    #[case({ let mut block = [3u8; 16]; block[14] = 2; block })]
    fn given_invalidpadding_then_fails(#[case] last_block: [u8; 16]) {
        let mut unpadder = Pkcs7Unpadder::new();
        assert!(unpadder.update(&last_block).is_empty());
        assert!(unpadder.finalize().is_err());
    }

    #[test]
    fn unpadder_holds_back_last_block() {
        let mut unpadder = Pkcs7Unpadder::new();
        assert!(unpadder.update(&[1; 16]).is_empty());
        assert_eq!(vec![1; 16], unpadder.update(&[16; 16]));
        assert!(unpadder.finalize().unwrap().is_empty());
    }

    #[test]
    fn given_invalidkeylength_then_fails() {
        let key = EncryptionKey::new(b"MOCK_KEY".to_vec(), b"MOCK_IV".to_vec());
        assert!(CbcDecryptStream::new(&key).is_err());
    }

    #[test]
    fn given_sealedkey_when_opened_then_samekey() {
        let keypair = DumpKeyPair::generate();
        let sealed = seal_encryption_key(&keypair.public_key(), &key(5));
        let opened = keypair.open_encryption_key(&sealed).unwrap();
        assert_eq!(key(5).key, opened.key);
        assert_eq!(key(5).iv, opened.iv);
    }

    #[test]
    fn given_differentkeypair_then_cannotopen() {
        let keypair1 = DumpKeyPair::generate();
        let keypair2 = DumpKeyPair::generate();
        let sealed = seal_encryption_key(&keypair1.public_key(), &key(5));
        assert!(keypair2.open_encryption_key(&sealed).is_err());
    }

    #[test]
    fn public_key_is_url_safe_base64() {
        let public_key = DumpKeyPair::generate().public_key();
        assert_eq!(44, public_key.len());
        assert!(!public_key.contains('+') && !public_key.contains('/'));
    }

    #[test]
    fn decode_accepts_missing_padding() {
        assert_eq!(b"ab".to_vec(), URL_SAFE_BASE64.decode("YWI").unwrap());
        assert_eq!(b"ab".to_vec(), URL_SAFE_BASE64.decode("YWI=").unwrap());
    }

    #[test]
    fn encryption_key_is_not_debug_printed() {
        assert_eq!("EncryptionKey(*****)", format!("{:?}", key(1)));
    }
}

//! JWE content encryption: AES-GCM and AES-CBC with HMAC-SHA2 (RFC 7518 §5)

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::CryptoError;
use crate::algorithm::EncryptionAlgorithm;
use crate::error::ConfigurationError;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Output of a content encryption
#[derive(Debug, Clone)]
pub struct EncryptedContent {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Authenticated encryption for one (`enc`, CEK) binding
pub struct AuthenticatedEncryptionProvider {
    encryption: EncryptionAlgorithm,
    key: Zeroizing<Vec<u8>>,
}

impl AuthenticatedEncryptionProvider {
    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if the key length does not match `enc`.
    pub fn new(encryption: EncryptionAlgorithm, key: &[u8]) -> Result<Self, ConfigurationError> {
        if key.len() != encryption.key_length() {
            return Err(ConfigurationError::InvalidKey(format!(
                "{encryption} requires a {}-bit key, got {} bits",
                encryption.key_length() * 8,
                key.len() * 8
            )));
        }
        Ok(Self {
            encryption,
            key: Zeroizing::new(key.to_vec()),
        })
    }

    pub fn encryption(&self) -> EncryptionAlgorithm {
        self.encryption
    }

    /// Encrypt `plaintext` under a fresh random IV
    ///
    /// # Errors
    /// Returns [`CryptoError::Encryption`] if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<EncryptedContent, CryptoError> {
        let mut iv = vec![0u8; self.encryption.iv_length()];
        OsRng.fill_bytes(&mut iv);

        let (ciphertext, tag) = match self.encryption {
            EncryptionAlgorithm::A128Gcm => gcm_encrypt::<Aes128Gcm>(&self.key, &iv, plaintext, aad)?,
            EncryptionAlgorithm::A192Gcm => gcm_encrypt::<Aes192Gcm>(&self.key, &iv, plaintext, aad)?,
            EncryptionAlgorithm::A256Gcm => gcm_encrypt::<Aes256Gcm>(&self.key, &iv, plaintext, aad)?,
            EncryptionAlgorithm::A128CbcHs256 => {
                cbc_hmac_encrypt::<Aes128, Hmac<Sha256>>(&self.key, &iv, plaintext, aad, 16)?
            }
            EncryptionAlgorithm::A192CbcHs384 => {
                cbc_hmac_encrypt::<Aes192, Hmac<Sha384>>(&self.key, &iv, plaintext, aad, 24)?
            }
            EncryptionAlgorithm::A256CbcHs512 => {
                cbc_hmac_encrypt::<Aes256, Hmac<Sha512>>(&self.key, &iv, plaintext, aad, 32)?
            }
        };

        Ok(EncryptedContent {
            iv,
            ciphertext,
            tag,
        })
    }

    /// Verify the tag and decrypt.
    ///
    /// Every failure (bad IV length, tag mismatch, padding) maps to the same
    /// [`CryptoError::Decryption`].
    ///
    /// # Errors
    /// Returns [`CryptoError::Decryption`] if authentication or decryption fails.
    pub fn decrypt(
        &self,
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if iv.len() != self.encryption.iv_length() || tag.len() != self.encryption.tag_length() {
            return Err(CryptoError::Decryption);
        }
        match self.encryption {
            EncryptionAlgorithm::A128Gcm => gcm_decrypt::<Aes128Gcm>(&self.key, iv, ciphertext, tag, aad),
            EncryptionAlgorithm::A192Gcm => gcm_decrypt::<Aes192Gcm>(&self.key, iv, ciphertext, tag, aad),
            EncryptionAlgorithm::A256Gcm => gcm_decrypt::<Aes256Gcm>(&self.key, iv, ciphertext, tag, aad),
            EncryptionAlgorithm::A128CbcHs256 => {
                cbc_hmac_decrypt::<Aes128, Hmac<Sha256>>(&self.key, iv, ciphertext, tag, aad)
            }
            EncryptionAlgorithm::A192CbcHs384 => {
                cbc_hmac_decrypt::<Aes192, Hmac<Sha384>>(&self.key, iv, ciphertext, tag, aad)
            }
            EncryptionAlgorithm::A256CbcHs512 => {
                cbc_hmac_decrypt::<Aes256, Hmac<Sha512>>(&self.key, iv, ciphertext, tag, aad)
            }
        }
    }
}

impl fmt::Debug for AuthenticatedEncryptionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedEncryptionProvider")
            .field("encryption", &self.encryption)
            .finish_non_exhaustive()
    }
}

fn gcm_encrypt<C>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), CryptoError>
where
    C: Aead<NonceSize = U12> + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::Encryption)?;
    let mut sealed = cipher
        .encrypt(GenericArray::from_slice(iv), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encryption)?;
    let tag = sealed.split_off(sealed.len() - 16);
    Ok((sealed, tag))
}

fn gcm_decrypt<C>(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError>
where
    C: Aead<NonceSize = U12> + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::Decryption)?;
    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    cipher
        .decrypt(GenericArray::from_slice(iv), Payload { msg: &sealed, aad })
        .map_err(|_| CryptoError::Decryption)
}

/// RFC 7518 §5.2.2.1 tag: HMAC over AAD || IV || ciphertext || AL, truncated to half the MAC
fn cbc_hmac_tag<M>(mac_key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8], tag_len: usize) -> Result<Vec<u8>, CryptoError>
where
    M: Mac + KeyInit,
{
    let mut mac = <M as Mac>::new_from_slice(mac_key).map_err(|_| CryptoError::Decryption)?;
    let aad_bits = (aad.len() as u64) * 8;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&aad_bits.to_be_bytes());
    let full = mac.finalize().into_bytes();
    Ok(full[..tag_len].to_vec())
}

fn cbc_hmac_encrypt<C, M>(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    aad: &[u8],
    tag_len: usize,
) -> Result<(Vec<u8>, Vec<u8>), CryptoError>
where
    cbc::Encryptor<C>: KeyIvInit + BlockEncryptMut,
    C: aes::cipher::BlockEncryptMut + aes::cipher::BlockCipher,
    M: Mac + KeyInit,
{
    let (mac_key, enc_key) = key.split_at(key.len() / 2);
    let ciphertext = cbc::Encryptor::<C>::new_from_slices(enc_key, iv)
        .map_err(|_| CryptoError::Encryption)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let tag = cbc_hmac_tag::<M>(mac_key, iv, &ciphertext, aad, tag_len)
        .map_err(|_| CryptoError::Encryption)?;
    Ok((ciphertext, tag))
}

fn cbc_hmac_decrypt<C, M>(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError>
where
    cbc::Decryptor<C>: KeyIvInit + BlockDecryptMut,
    C: aes::cipher::BlockDecryptMut + aes::cipher::BlockCipher,
    M: Mac + KeyInit,
{
    let (mac_key, enc_key) = key.split_at(key.len() / 2);
    let expected = cbc_hmac_tag::<M>(mac_key, iv, ciphertext, aad, tag.len())?;
    if !bool::from(expected.ct_eq(tag)) {
        return Err(CryptoError::Decryption);
    }
    cbc::Decryptor::<C>::new_from_slices(enc_key, iv)
        .map_err(|_| CryptoError::Decryption)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7518_a128cbc_hs256_vector() {
        // RFC 7518 appendix B.1
        let key: Vec<u8> = (0u8..32).collect();
        let plaintext = b"A cipher system must not be required to be secret, and it must be able to fall into the hands of the enemy without inconvenience";
        let iv = [
            0x1a, 0xf3, 0x8c, 0x2d, 0xc2, 0xb9, 0x6f, 0xfd, 0xd8, 0x66, 0x94, 0x09, 0x23, 0x41,
            0xbc, 0x04,
        ];
        let aad = [
            0x54, 0x68, 0x65, 0x20, 0x73, 0x65, 0x63, 0x6f, 0x6e, 0x64, 0x20, 0x70, 0x72, 0x69,
            0x6e, 0x63, 0x69, 0x70, 0x6c, 0x65, 0x20, 0x6f, 0x66, 0x20, 0x41, 0x75, 0x67, 0x75,
            0x73, 0x74, 0x65, 0x20, 0x4b, 0x65, 0x72, 0x63, 0x6b, 0x68, 0x6f, 0x66, 0x66, 0x73,
        ];
        let expected_tag = [
            0x65, 0x2c, 0x3f, 0xa3, 0x6b, 0x0a, 0x7c, 0x5b, 0x32, 0x19, 0xfa, 0xb3, 0xa3, 0x0b,
            0xc1, 0xc4,
        ];

        let (ciphertext, tag) =
            cbc_hmac_encrypt::<Aes128, Hmac<Sha256>>(&key, &iv, plaintext, &aad, 16).unwrap();
        assert_eq!(tag, expected_tag);
        assert_eq!(ciphertext.len(), 144);

        let provider =
            AuthenticatedEncryptionProvider::new(EncryptionAlgorithm::A128CbcHs256, &key).unwrap();
        let decrypted = provider.decrypt(&iv, &ciphertext, &tag, &aad).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_every_algorithm_seals_and_opens() {
        for enc in EncryptionAlgorithm::ALL {
            let key = vec![0x5Au8; enc.key_length()];
            let provider = AuthenticatedEncryptionProvider::new(enc, &key).unwrap();
            let sealed = provider.encrypt(b"inner.jws.token", b"protected").unwrap();

            assert_eq!(sealed.iv.len(), enc.iv_length());
            assert_eq!(sealed.tag.len(), enc.tag_length());
            assert_eq!(
                provider
                    .decrypt(&sealed.iv, &sealed.ciphertext, &sealed.tag, b"protected")
                    .unwrap(),
                b"inner.jws.token"
            );
            assert!(matches!(
                provider.decrypt(&sealed.iv, &sealed.ciphertext, &sealed.tag, b"other"),
                Err(CryptoError::Decryption)
            ));
        }
    }

    #[test]
    fn test_tag_tamper_detected() {
        let provider =
            AuthenticatedEncryptionProvider::new(EncryptionAlgorithm::A256CbcHs512, &[7u8; 64])
                .unwrap();
        let sealed = provider.encrypt(b"payload", b"aad").unwrap();
        let mut tag = sealed.tag.clone();
        tag[0] ^= 0x80;

        assert!(matches!(
            provider.decrypt(&sealed.iv, &sealed.ciphertext, &tag, b"aad"),
            Err(CryptoError::Decryption)
        ));
        // truncated tag
        assert!(matches!(
            provider.decrypt(&sealed.iv, &sealed.ciphertext, &sealed.tag[..16], b"aad"),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(matches!(
            AuthenticatedEncryptionProvider::new(EncryptionAlgorithm::A128Gcm, &[0u8; 32]),
            Err(ConfigurationError::InvalidKey(_))
        ));
    }
}

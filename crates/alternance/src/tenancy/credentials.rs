//! API keys and single-use signing links.
//!
//! Plaintext secrets are returned exactly once when issued. Only SHA-256 digests are
//! persisted, and lookups go through the digest (magic links) or the public prefix
//! (API keys).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ids::{ApiKeyId, LivretId, TenantId, UserId};
use crate::workflows::apprenticeship::Signer;

const API_KEY_SCHEME: &str = "alt";
const MAGIC_LINK_SCHEME: &str = "mlk";
const PREFIX_LEN: usize = 8;
const SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub label: String,
    pub prefix: String,
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn matches(&self, token: &str) -> bool {
        digests_match(&self.secret_hash, &hash_token(token))
    }
}

/// Issued key together with the plaintext token shown to the caller once.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key: ApiKey,
    pub token: String,
}

pub fn issue_api_key(
    tenant_id: TenantId,
    user_id: UserId,
    label: &str,
    now: DateTime<Utc>,
) -> IssuedApiKey {
    let prefix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(PREFIX_LEN)
        .collect();
    let secret = Uuid::new_v4().simple().to_string();
    let token = format!("{API_KEY_SCHEME}_{prefix}_{secret}");

    let key = ApiKey {
        id: ApiKeyId::generate(),
        tenant_id,
        user_id,
        label: label.trim().to_string(),
        prefix,
        secret_hash: hash_token(&token),
        created_at: now,
        last_used_at: None,
        revoked_at: None,
    };

    IssuedApiKey { key, token }
}

/// Extract the lookup prefix from a presented API key.
pub fn api_key_prefix(token: &str) -> Result<&str, CredentialError> {
    let mut parts = token.trim().splitn(3, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(API_KEY_SCHEME), Some(prefix), Some(secret))
            if prefix.len() == PREFIX_LEN
                && secret.len() == SECRET_LEN
                && prefix.chars().all(|c| c.is_ascii_hexdigit())
                && secret.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            Ok(prefix)
        }
        _ => Err(CredentialError::Malformed),
    }
}

/// What a magic link lets its holder do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningGrant {
    pub signer: Signer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicToken {
    pub token_hash: String,
    pub tenant_id: TenantId,
    pub livret_id: LivretId,
    pub grant: SigningGrant,
    pub issued_to: UserId,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl MagicToken {
    /// Check that the token can still be used at `now`.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), CredentialError> {
        if self.consumed_at.is_some() {
            return Err(CredentialError::AlreadyUsed);
        }
        if now >= self.expires_at {
            return Err(CredentialError::Expired);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IssuedMagicToken {
    pub token: MagicToken,
    pub plaintext: String,
}

pub fn issue_magic_token(
    tenant_id: TenantId,
    livret_id: LivretId,
    signer: Signer,
    issued_to: UserId,
    now: DateTime<Utc>,
    ttl_hours: i64,
) -> Result<IssuedMagicToken, CredentialError> {
    let expires_at = Duration::try_hours(ttl_hours)
        .filter(|ttl| *ttl > Duration::zero())
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or(CredentialError::InvalidLifetime(ttl_hours))?;
    let plaintext = format!(
        "{MAGIC_LINK_SCHEME}_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );

    Ok(IssuedMagicToken {
        token: MagicToken {
            token_hash: hash_token(&plaintext),
            tenant_id,
            livret_id,
            grant: SigningGrant { signer },
            issued_to,
            expires_at,
            consumed_at: None,
        },
        plaintext,
    })
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hex::encode(hasher.finalize())
}

fn digests_match(left: &str, right: &str) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.bytes()
        .zip(right.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("credentials missing")]
    Missing,
    #[error("credentials malformed")]
    Malformed,
    #[error("credentials not recognized")]
    Unknown,
    #[error("api key revoked")]
    Revoked,
    #[error("tenant is inactive")]
    InactiveTenant,
    #[error("signing link expired")]
    Expired,
    #[error("signing link already used")]
    AlreadyUsed,
    #[error("signing link lifetime of {0} hours cannot be represented")]
    InvalidLifetime(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn issued_api_key_verifies_and_exposes_prefix() {
        let issued = issue_api_key(TenantId::from("tnt_a"), UserId::from("usr_a"), " ci ", now());
        let prefix = api_key_prefix(&issued.token).expect("well formed");
        assert_eq!(prefix, issued.key.prefix);
        assert_eq!(issued.key.label, "ci");
        assert!(issued.key.matches(&issued.token));
        assert!(!issued.key.secret_hash.contains(&issued.token));

        let mut tampered = issued.token.clone();
        tampered.pop();
        tampered.push('x');
        assert!(!issued.key.matches(&tampered));
    }

    #[test]
    fn malformed_api_keys_are_rejected() {
        assert_eq!(api_key_prefix("bearer"), Err(CredentialError::Malformed));
        assert_eq!(
            api_key_prefix("alt_short_0123"),
            Err(CredentialError::Malformed)
        );
        assert_eq!(
            api_key_prefix("xyz_0123abcd_0123456789abcdef0123456789abcdef"),
            Err(CredentialError::Malformed)
        );
    }

    #[test]
    fn magic_tokens_expire_and_are_single_use() {
        let issued = issue_magic_token(
            TenantId::from("tnt_a"),
            LivretId::from("lvt_1"),
            Signer::Tutor,
            UserId::from("usr_t"),
            now(),
            72,
        )
        .expect("token issued");
        assert_eq!(issued.token.token_hash, hash_token(&issued.plaintext));
        assert!(issued.token.check_usable(now()).is_ok());
        assert_eq!(
            issued.token.check_usable(now() + Duration::hours(72)),
            Err(CredentialError::Expired)
        );

        let mut consumed = issued.token.clone();
        consumed.consumed_at = Some(now());
        assert_eq!(
            consumed.check_usable(now()),
            Err(CredentialError::AlreadyUsed)
        );
    }

    #[test]
    fn unrepresentable_link_lifetimes_are_refused() {
        for hours in [0, -1, i64::MAX, 9_000_000_000_000] {
            let result = issue_magic_token(
                TenantId::from("tnt_a"),
                LivretId::from("lvt_1"),
                Signer::Tutor,
                UserId::from("usr_t"),
                now(),
                hours,
            );
            assert!(
                matches!(result, Err(CredentialError::InvalidLifetime(h)) if h == hours),
                "{hours} hours accepted"
            );
        }
    }
}

//! SSH key management handlers (registered users only).

use base64::engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};
use superchat_proto::messages::{
    AddSshKey, DeleteSshKey, ListSshKeys, Message, SshKeyAdded, SshKeyDeleted, SshKeyLabelUpdated,
    SshKeyList, UpdateSshKeyLabel,
};

use crate::error::{HandlerError, HandlerResult};
use crate::hub::now_ms;
use crate::repo::RepoError;
use crate::session::Context;

/// Parse an OpenSSH `authorized_keys`-style line into (key_type,
/// fingerprint). The fingerprint is SHA-256 over the decoded blob in the
/// usual `SHA256:<unpadded base64>` form.
pub fn parse_public_key(line: &str) -> Result<(String, String), HandlerError> {
    let mut parts = line.split_whitespace();
    let key_type = parts
        .next()
        .ok_or_else(|| HandlerError::Validation("empty public key".into()))?;
    let blob64 = parts
        .next()
        .ok_or_else(|| HandlerError::Validation("public key missing base64 blob".into()))?;

    let known = key_type.starts_with("ssh-") || key_type.starts_with("ecdsa-");
    if !known {
        return Err(HandlerError::Validation(format!(
            "unsupported key type '{key_type}'"
        )));
    }
    let blob = BASE64
        .decode(blob64)
        .map_err(|_| HandlerError::Validation("public key blob is not valid base64".into()))?;

    let digest = Sha256::digest(&blob);
    let fingerprint = format!("SHA256:{}", BASE64_NO_PAD.encode(digest));
    Ok((key_type.to_string(), fingerprint))
}

pub async fn add_ssh_key(ctx: &mut Context<'_>, msg: AddSshKey) -> HandlerResult {
    let me = ctx.session.require_user()?.clone();
    let (key_type, fingerprint) = parse_public_key(&msg.public_key)?;

    match ctx
        .hub
        .repo
        .add_ssh_key(me.id, &fingerprint, &key_type, &msg.label, now_ms())
        .await
    {
        Ok(key) => {
            ctx.send(&Message::SshKeyAdded(SshKeyAdded {
                success: true,
                key_id: Some(key.id),
                fingerprint: Some(key.fingerprint),
                message: None,
            }));
            Ok(())
        }
        Err(RepoError::FingerprintConflict) => {
            ctx.send(&Message::SshKeyAdded(SshKeyAdded {
                success: false,
                key_id: None,
                fingerprint: Some(fingerprint),
                message: Some("Key already registered".into()),
            }));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn update_label(ctx: &mut Context<'_>, msg: UpdateSshKeyLabel) -> HandlerResult {
    let me = ctx.session.require_user()?.clone();
    match ctx
        .hub
        .repo
        .update_ssh_key_label(me.id, msg.key_id, &msg.label)
        .await
    {
        Ok(()) => {
            ctx.send(&Message::SshKeyLabelUpdated(SshKeyLabelUpdated {
                success: true,
                message: None,
            }));
            Ok(())
        }
        Err(RepoError::KeyNotFound) => {
            ctx.send(&Message::SshKeyLabelUpdated(SshKeyLabelUpdated {
                success: false,
                message: Some("No such key".into()),
            }));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_ssh_key(ctx: &mut Context<'_>, msg: DeleteSshKey) -> HandlerResult {
    let me = ctx.session.require_user()?.clone();
    let user = ctx
        .hub
        .repo
        .user_by_id(me.id)
        .await?
        .ok_or(HandlerError::RegistrationRequired)?;

    // Never orphan a password-less account.
    if user.password_hash.is_none() && ctx.hub.repo.count_ssh_keys(me.id).await? <= 1 {
        ctx.send(&Message::SshKeyDeleted(SshKeyDeleted {
            success: false,
            message: Some("Cannot remove the last key of a password-less user".into()),
        }));
        return Ok(());
    }

    match ctx.hub.repo.delete_ssh_key(me.id, msg.key_id).await {
        Ok(()) => {
            ctx.send(&Message::SshKeyDeleted(SshKeyDeleted {
                success: true,
                message: None,
            }));
            Ok(())
        }
        Err(RepoError::KeyNotFound) => {
            ctx.send(&Message::SshKeyDeleted(SshKeyDeleted {
                success: false,
                message: Some("No such key".into()),
            }));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn list_ssh_keys(ctx: &mut Context<'_>, _msg: ListSshKeys) -> HandlerResult {
    let me = ctx.session.require_user()?.clone();
    let keys = ctx.hub.repo.list_ssh_keys(me.id).await?;
    ctx.send(&Message::SshKeyList(SshKeyList {
        keys: keys.iter().map(|k| k.info()).collect(),
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ed25519_line() {
        let line = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAtOq2LsoTZnbHK3/B0RYpfYXjvjC6XQ+b2HCYkr5yvP alice@laptop";
        let (key_type, fingerprint) = parse_public_key(line).unwrap();
        assert_eq!(key_type, "ssh-ed25519");
        assert!(fingerprint.starts_with("SHA256:"));
        // Unpadded base64 of a 32-byte digest is 43 chars.
        assert_eq!(fingerprint.len(), "SHA256:".len() + 43);
    }

    #[test]
    fn fingerprint_is_stable() {
        let line = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAtOq2LsoTZnbHK3/B0RYpfYXjvjC6XQ+b2HCYkr5yvP";
        let a = parse_public_key(line).unwrap().1;
        let b = parse_public_key(&format!("{line} with-a-comment")).unwrap().1;
        assert_eq!(a, b, "comment must not affect the fingerprint");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_public_key("").is_err());
        assert!(parse_public_key("rsa AAAA").is_err());
        assert!(parse_public_key("ssh-ed25519 !!!notbase64!!!").is_err());
    }
}

use chrono::offset::Utc;

use crate::{
    error::Error::{self, UserNotFound},
    generator::generate_token_image,
    model::{NewQrToken, QrToken},
    notifier::Notifier,
    store::RecordStore,
};

/// Creates a new token for the user and mails it. The image is rendered once,
/// before the insert; the record is kept even if delivery fails afterwards.
pub fn issue_token(
    store: &dyn RecordStore,
    notifier: &dyn Notifier,
    user_pk: i32,
    revoke_previous: bool,
) -> Result<QrToken, Error> {
    let user = store.find_user(user_pk)?.ok_or(UserNotFound)?;

    if revoke_previous {
        let revoked = store.invalidate_tokens_for_user(user.pk)?;
        if revoked > 0 {
            log::info!("Revoked {} previous QR code(s) of '{}'", revoked, &user.username);
        }
    }

    let generated = generate_token_image(&user)?;
    let token = store.insert_token(NewQrToken {
        fk_user: user.pk,
        created_at: Utc::now(),
        image_name: generated.name,
        image: generated.bytes,
        is_valid: true,
    })?;
    log::info!("Issued QR code {} for '{}'", token.pk, &user.username);

    notifier.send_token(&user, &token).map_err(|e| {
        log::error!("Could not deliver QR code {} to {}: {}", token.pk, &user.email, e);
        e
    })?;

    Ok(token)
}

use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};

use crate::{
    config::SmtpConfig,
    error::Error::{self, MailError},
    model::{QrToken, User},
};

pub const SUBJECT: &str = "Your QR Code";

/// Delivers a freshly issued token to its owner.
pub trait Notifier: Send + Sync {
    fn send_token(&self, user: &User, token: &QrToken) -> Result<(), Error>;
}

pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, Error> {
        let from = config.from.parse::<Mailbox>().map_err(|e| {
            MailError(format!("Invalid sender address '{}': {}", &config.from, e))
        })?;

        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| MailError(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

impl Notifier for SmtpNotifier {
    fn send_token(&self, user: &User, token: &QrToken) -> Result<(), Error> {
        if token.image.is_empty() {
            log::warn!("QR code {} has no image, skipping email", token.pk);
            return Ok(());
        }

        let message = token_message(&self.from, user, token)?;
        self.transport
            .send(&message)
            .map_err(|e| MailError(e.to_string()))?;

        log::info!("Sent QR code {} to {}", token.pk, &user.email);
        Ok(())
    }
}

pub fn message_body(username: &str) -> String {
    format!(
        "Hello {},

Please find your QR code attached. You can use this QR code for access.

Best regards,
QR Code System",
        username
    )
}

pub fn token_message(from: &Mailbox, user: &User, token: &QrToken) -> Result<Message, Error> {
    let to = user
        .email
        .parse::<Mailbox>()
        .map_err(|e| MailError(format!("Invalid recipient address '{}': {}", &user.email, e)))?;
    let png = ContentType::parse("image/png").map_err(|e| MailError(e.to_string()))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(SUBJECT)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(message_body(&user.username)))
                .singlepart(Attachment::new(token.image_name.clone()).body(token.image.clone(), png)),
        )
        .map_err(|e| MailError(e.to_string()))
}

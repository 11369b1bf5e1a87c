use tracing::info;

use ufb_types::models::CodeType;

/// Delivers one-time codes to users.
pub trait Mailer: Send + Sync {
    fn send_code(&self, to: &str, code_type: CodeType, code: &str) -> anyhow::Result<()>;
}

/// Writes codes to the log instead of sending mail. Used when no mail
/// transport is configured.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_code(&self, to: &str, code_type: CodeType, code: &str) -> anyhow::Result<()> {
        info!(to, kind = code_type.as_str(), "Issued verification code {}", code);
        Ok(())
    }
}
